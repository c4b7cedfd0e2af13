//! Persistent form model values.
//!
//! The model is a tree of objects and arrays backed by `im` persistent
//! collections. Cloning a [`Value`] is cheap and a path write only copies the
//! spine from the root to the changed node: every untouched branch keeps
//! sharing storage with the previous tree.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Object key marking a serialized file list.
pub const FILES_TAG: &str = "$files";

/// Object storage: ordered, persistent map.
pub type Map = im::OrdMap<String, Value>;

/// Array storage: persistent vector.
pub type Array = im::Vector<Value>;

/// A node of the form model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// Absent or explicitly empty value. Also used for array holes.
    #[default]
    Null,

    /// Boolean value
    Bool(bool),

    /// Numeric value
    Number(serde_json::Number),

    /// UTF-8 string
    String(String),

    /// Indexed children
    Array(Array),

    /// Keyed children
    Object(Map),

    /// Files picked through a file control. Serialised as
    /// `{"$files": [...]}` so it reads back as a file list.
    Files(FileList),
}

impl Value {
    /// Create an empty object value
    #[must_use]
    pub fn object() -> Self {
        Self::Object(Map::new())
    }

    /// Create an empty array value
    #[must_use]
    pub fn array() -> Self {
        Self::Array(Array::new())
    }

    /// Create a string value
    pub fn string(v: impl Into<String>) -> Self {
        Self::String(v.into())
    }

    /// Create a numeric value from a float. Non-finite floats become `Null`.
    #[must_use]
    pub fn float(v: f64) -> Self {
        serde_json::Number::from_f64(v).map_or(Self::Null, Self::Number)
    }

    /// Short type name, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Files(_) => "file list",
        }
    }

    /// Whether this value can hold children addressed by a path segment.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// `true` for `Null`, empty strings, empty arrays, empty objects and empty
    /// file lists.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.trim().is_empty(),
            Self::Array(a) => a.is_empty(),
            Self::Object(o) => o.is_empty(),
            Self::Files(f) => f.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Whether two object values share the same storage.
    ///
    /// Used to observe structural sharing after a path write. Arrays and
    /// scalars are compared by value only, so this returns `false` for them.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Files(a), Self::Files(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }

    /// Convert into a plain `serde_json::Value`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.clone().into()
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => match files_from_json(&map) {
                Some(files) => Self::Files(files),
                None => Self::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, Self::from(v)))
                        .collect(),
                ),
            },
        }
    }
}

/// Recognise `{"$files": [{"name", "size", "type"?}, ...]}`.
fn files_from_json(map: &serde_json::Map<String, serde_json::Value>) -> Option<FileList> {
    if map.len() != 1 {
        return None;
    }
    let entries = map.get(FILES_TAG)?.as_array()?;
    let files = entries
        .iter()
        .map(|entry| {
            let entry = entry.as_object()?;
            let handle = FileHandle::new(entry.get("name")?.as_str()?, entry.get("size")?.as_u64()?);
            Some(match entry.get("type").and_then(serde_json::Value::as_str) {
                Some(media_type) => handle.with_media_type(media_type),
                None => handle,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(FileList::new(files))
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
            Value::Files(files) => {
                let entries = files
                    .iter()
                    .map(|f| {
                        serde_json::json!({
                            "name": f.name,
                            "size": f.size,
                            "type": f.media_type,
                        })
                    })
                    .collect();
                let mut tagged = serde_json::Map::new();
                tagged.insert(FILES_TAG.to_owned(), Self::Array(entries));
                Self::Object(tagged)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::float(value)
    }
}

impl From<FileList> for Value {
    fn from(value: FileList) -> Self {
        Self::Files(value)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::Array(iter.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::Object(iter.into_iter().collect())
    }
}

/// Metadata of a single file picked through a file control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    pub media_type: Option<String>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            media_type: None,
        }
    }

    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// Opaque, shared list of picked files.
///
/// The list is never copied once created; clones share the same allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileList(Arc<[FileHandle]>);

impl FileList {
    #[must_use]
    pub fn new(files: Vec<FileHandle>) -> Self {
        Self(files.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileHandle> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn json_conversion_preserves_structure() {
        let source = json!({
            "name": "Ada",
            "age": 36,
            "tags": ["math", "engines"],
            "address": {"city": "London", "zip": null},
        });

        let value = Value::from(source.clone());
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn files_serialize_under_a_tag() {
        let files = FileList::new(vec![
            FileHandle::new("cv.pdf", 1024).with_media_type("application/pdf"),
            FileHandle::new("notes.txt", 12),
        ]);
        let json = Value::Files(files.clone()).to_json();
        assert_eq!(
            json,
            json!({"$files": [
                {"name": "cv.pdf", "size": 1024, "type": "application/pdf"},
                {"name": "notes.txt", "size": 12, "type": null},
            ]})
        );

        let text = serde_json::to_string(&Value::Files(files.clone())).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, Value::Files(files));
    }

    #[test]
    fn file_lists_and_plain_arrays_stay_distinct() {
        let files = Value::Files(FileList::new(vec![FileHandle::new("a.txt", 3)]));
        let array = Value::from(json!([{"name": "a.txt", "size": 3, "type": null}]));
        assert_ne!(files.to_json(), array.to_json());
        assert!(matches!(Value::from(array.to_json()), Value::Array(_)));
        // Extra keys next to the tag make it an ordinary object.
        let object = Value::from(json!({"$files": [], "other": 1}));
        assert!(matches!(object, Value::Object(_)));
    }

    #[test]
    fn blank_values() {
        assert!(Value::Null.is_blank());
        assert!(Value::from("   ").is_blank());
        assert!(Value::array().is_blank());
        assert!(Value::object().is_blank());
        assert!(!Value::from(0_i64).is_blank());
        assert!(!Value::from(false).is_blank());
        assert!(!Value::from("x").is_blank());
    }

    #[test]
    fn non_finite_float_is_null() {
        assert_eq!(Value::float(f64::NAN), Value::Null);
        assert_eq!(Value::float(1.5).as_f64(), Some(1.5));
    }

    #[test]
    fn clones_share_object_storage() {
        let value = Value::from(json!({"a": {"b": 1}}));
        let copy = value.clone();
        assert!(value.ptr_eq(&copy));
        assert!(!value.ptr_eq(&Value::from(json!({"a": {"b": 1}}))));
    }

    #[test]
    fn serde_round_trip() {
        let value = Value::from(json!({"items": [1, "two", {"three": true}]}));
        let text = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }
}
