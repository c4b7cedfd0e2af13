//! Read, write and delete values at a field path.
//!
//! Writes never mutate their input. Only the containers on the path from the
//! root to the target are copied; siblings keep sharing storage with the
//! input tree.
//!
//! Strictness differs per operation:
//!
//! | | missing intermediate | scalar intermediate | non-container root |
//! |---|---|---|---|
//! | [`get`] | `Ok(None)` | `Ok(None)` | `NonObjectRoot` |
//! | [`set`] | created | `MissingIntermediate` | `NonObjectRoot` |
//! | [`delete`] | unchanged input | `MissingIntermediate` | `NonObjectRoot` |

use crate::error::{FormError, Result};
use crate::path::{FieldPath, MAX_ARRAY_INDEX, as_index};
use crate::value::{Array, Map, Value};

/// Read the value at `path`. An empty path returns the root itself.
pub fn get<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>> {
    if path.is_empty() {
        return Ok(Some(root));
    }
    let path = FieldPath::parse(path)?;
    get_at(root, &path)
}

/// Read the value at an already parsed path.
pub fn get_at<'a>(root: &'a Value, path: &FieldPath) -> Result<Option<&'a Value>> {
    ensure_container_root(root)?;

    let mut current = root;
    for segment in path.segments() {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => as_index(segment).and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Return a new tree with `value` stored at `path`.
///
/// An empty path replaces the root wholesale. Missing or `Null` intermediates
/// are created: as an array when the following segment is numeric, as an
/// object otherwise. Writing past the end of an array pads it with `Null`;
/// indices above [`MAX_ARRAY_INDEX`] are rejected.
pub fn set(root: &Value, path: &str, value: Value) -> Result<Value> {
    if path.is_empty() {
        return Ok(value);
    }
    let path = FieldPath::parse(path)?;
    set_at(root, &path, value)
}

/// [`set`] for an already parsed path.
pub fn set_at(root: &Value, path: &FieldPath, value: Value) -> Result<Value> {
    ensure_container_root(root)?;
    set_in(root, path, 0, value)
}

fn set_in(node: &Value, path: &FieldPath, depth: usize, value: Value) -> Result<Value> {
    let segments = path.segments();
    let segment = &segments[depth];
    let is_last = depth + 1 == segments.len();

    match node {
        Value::Object(map) => {
            let child = if is_last {
                value
            } else {
                let existing = map.get(segment);
                descend(existing, path, depth, value)?
            };
            Ok(Value::Object(map.update(segment.clone(), child)))
        }
        Value::Array(items) => {
            let index = as_index(segment).ok_or_else(|| FormError::NotAnIndex {
                path: path.to_string(),
                segment: segment.clone(),
            })?;
            if index > MAX_ARRAY_INDEX {
                return Err(FormError::invalid_path(
                    path.as_str(),
                    format!("index {index} exceeds {MAX_ARRAY_INDEX}"),
                ));
            }
            let child = if is_last {
                value
            } else {
                descend(items.get(index), path, depth, value)?
            };
            let mut items: Array = items.clone();
            while items.len() <= index {
                items.push_back(Value::Null);
            }
            items.set(index, child);
            Ok(Value::Array(items))
        }
        other => Err(FormError::MissingIntermediate {
            path: path.to_string(),
            segment: segments[depth.saturating_sub(1)].clone(),
            kind: other.kind_name(),
        }),
    }
}

/// Recurse into the child at `depth`, creating it when absent.
fn descend(existing: Option<&Value>, path: &FieldPath, depth: usize, value: Value) -> Result<Value> {
    match existing {
        Some(child) if child.is_container() => set_in(child, path, depth + 1, value),
        None | Some(Value::Null) => {
            let next = &path.segments()[depth + 1];
            let fresh = if as_index(next).is_some() {
                Value::Array(Array::new())
            } else {
                Value::Object(Map::new())
            };
            set_in(&fresh, path, depth + 1, value)
        }
        Some(scalar) => Err(FormError::MissingIntermediate {
            path: path.to_string(),
            segment: path.segments()[depth].clone(),
            kind: scalar.kind_name(),
        }),
    }
}

/// Return a new tree without the value at `path`.
///
/// Deleting something that is not there returns the input unchanged, sharing
/// its storage. Deleting an array element removes it and shifts the elements
/// after it.
pub fn delete(root: &Value, path: &str) -> Result<Value> {
    if path.is_empty() {
        return Err(FormError::invalid_path(path, "cannot delete the root"));
    }
    let path = FieldPath::parse(path)?;
    delete_at(root, &path)
}

/// [`delete`] for an already parsed path.
pub fn delete_at(root: &Value, path: &FieldPath) -> Result<Value> {
    ensure_container_root(root)?;
    Ok(delete_in(root, path, 0)?.unwrap_or_else(|| root.clone()))
}

/// `Ok(None)` means nothing changed below `node`.
fn delete_in(node: &Value, path: &FieldPath, depth: usize) -> Result<Option<Value>> {
    let segments = path.segments();
    let segment = &segments[depth];
    let is_last = depth + 1 == segments.len();

    match node {
        Value::Object(map) => {
            if is_last {
                if !map.contains_key(segment) {
                    return Ok(None);
                }
                return Ok(Some(Value::Object(map.without(segment))));
            }
            let Some(child) = map.get(segment) else {
                return Ok(None);
            };
            Ok(delete_child(child, path, depth)?
                .map(|child| Value::Object(map.update(segment.clone(), child))))
        }
        Value::Array(items) => {
            let Some(index) = as_index(segment).filter(|&i| i < items.len()) else {
                return Ok(None);
            };
            if is_last {
                let mut items = items.clone();
                items.remove(index);
                return Ok(Some(Value::Array(items)));
            }
            Ok(delete_child(&items[index], path, depth)?.map(|child| {
                let mut items = items.clone();
                items.set(index, child);
                Value::Array(items)
            }))
        }
        _ => Ok(None),
    }
}

fn delete_child(child: &Value, path: &FieldPath, depth: usize) -> Result<Option<Value>> {
    match child {
        Value::Null => Ok(None),
        c if c.is_container() => delete_in(c, path, depth + 1),
        scalar => Err(FormError::MissingIntermediate {
            path: path.to_string(),
            segment: path.segments()[depth].clone(),
            kind: scalar.kind_name(),
        }),
    }
}

fn ensure_container_root(root: &Value) -> Result<()> {
    if root.is_container() {
        Ok(())
    } else {
        Err(FormError::NonObjectRoot {
            kind: root.kind_name(),
        })
    }
}
