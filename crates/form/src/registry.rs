//! Named accessors for every field of a model.
//!
//! UI bindings that address fields by identifier (`profileName`,
//! `setProfileName`, `profileNameShowErrors`) resolve those names here. The
//! table is built once per model shape: every reachable container and leaf
//! path gets a base name (camel-cased segments) and one entry per
//! [`AccessorKind`].

use std::collections::HashMap;

use crate::config::FieldFilter;
use crate::path::FieldPath;
use crate::value::Value;

/// Maximum depth walked when collecting paths
const MAX_DEPTH: usize = 100;

/// What an accessor name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    /// `<base>`
    Value,
    /// `<base>Valid`
    Valid,
    /// `<base>Invalid`
    Invalid,
    /// `<base>Pending`
    Pending,
    /// `<base>Touched`
    Touched,
    /// `<base>Dirty`
    Dirty,
    /// `<base>ShowErrors`
    ShowErrors,
    /// `<base>ShowWarnings`
    ShowWarnings,
    /// `<base>Validation`
    Validation,
    /// `<base>Field`
    Field,
    /// `set<Base>`
    Set,
    /// `markAsTouched<Base>`
    MarkAsTouched,
    /// `touch<Base>`
    Touch,
    /// `markAsDirty<Base>`
    MarkAsDirty,
    /// `reset<Base>`
    Reset,
}

impl AccessorKind {
    pub const ALL: [Self; 15] = [
        Self::Value,
        Self::Valid,
        Self::Invalid,
        Self::Pending,
        Self::Touched,
        Self::Dirty,
        Self::ShowErrors,
        Self::ShowWarnings,
        Self::Validation,
        Self::Field,
        Self::Set,
        Self::MarkAsTouched,
        Self::Touch,
        Self::MarkAsDirty,
        Self::Reset,
    ];

    /// Whether the accessor performs an action rather than reading state.
    #[must_use]
    pub fn is_action(self) -> bool {
        matches!(
            self,
            Self::Set | Self::MarkAsTouched | Self::Touch | Self::MarkAsDirty | Self::Reset
        )
    }

    /// The accessor name for a field with the given base name.
    #[must_use]
    pub fn name_for(self, base: &str) -> String {
        let suffix = match self {
            Self::Value => return base.to_owned(),
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
            Self::Pending => "Pending",
            Self::Touched => "Touched",
            Self::Dirty => "Dirty",
            Self::ShowErrors => "ShowErrors",
            Self::ShowWarnings => "ShowWarnings",
            Self::Validation => "Validation",
            Self::Field => "Field",
            Self::Set => return format!("set{}", capitalize(base)),
            Self::MarkAsTouched => return format!("markAsTouched{}", capitalize(base)),
            Self::Touch => return format!("touch{}", capitalize(base)),
            Self::MarkAsDirty => return format!("markAsDirty{}", capitalize(base)),
            Self::Reset => return format!("reset{}", capitalize(base)),
        };
        format!("{base}{suffix}")
    }
}

/// A resolved accessor name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Accessor {
    pub path: FieldPath,
    pub kind: AccessorKind,
}

/// camelCase base name of a path: `items.0.label` becomes `items0Label`.
#[must_use]
pub fn base_name(path: &FieldPath) -> String {
    let mut segments = path.segments().iter();
    let mut name = segments.next().cloned().unwrap_or_default();
    for segment in segments {
        name.push_str(&capitalize(segment));
    }
    name
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Every addressable path in `model`, parents before children.
///
/// Empty containers contribute their own path. Keys that cannot be written
/// as a path segment (empty, or containing `.`, `[` or `]`) are skipped
/// along with everything below them.
#[must_use]
pub fn collect_paths(model: &Value) -> Vec<FieldPath> {
    let mut paths = Vec::new();
    let mut prefix = Vec::new();
    walk(model, &mut prefix, &mut paths);
    paths
}

fn walk(node: &Value, prefix: &mut Vec<String>, out: &mut Vec<FieldPath>) {
    if prefix.len() >= MAX_DEPTH {
        return;
    }
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                if is_addressable(key) {
                    visit(key.clone(), child, prefix, out);
                }
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                visit(index.to_string(), child, prefix, out);
            }
        }
        _ => {}
    }
}

fn visit(segment: String, child: &Value, prefix: &mut Vec<String>, out: &mut Vec<FieldPath>) {
    prefix.push(segment);
    out.push(FieldPath::from_segments(prefix.clone()));
    if child.is_container() {
        walk(child, prefix, out);
    }
    prefix.pop();
}

fn is_addressable(key: &str) -> bool {
    !key.is_empty() && !key.contains(['.', '[', ']'])
}

/// Accessor table for one model shape.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    shape: Vec<FieldPath>,
    paths: Vec<FieldPath>,
    accessors: HashMap<String, Accessor>,
}

impl FieldRegistry {
    /// Build the table for `model`, keeping only paths `filter` allows.
    #[must_use]
    pub fn build(model: &Value, filter: &FieldFilter) -> Self {
        Self::from_paths(collect_paths(model), filter)
    }

    /// Build the table from already collected paths.
    #[must_use]
    pub fn from_paths(shape: Vec<FieldPath>, filter: &FieldFilter) -> Self {
        let paths: Vec<FieldPath> = shape
            .iter()
            .filter(|path| filter.allows(path.as_str()))
            .cloned()
            .collect();

        let mut accessors: HashMap<String, Accessor> =
            HashMap::with_capacity(paths.len() * AccessorKind::ALL.len());
        for path in &paths {
            let base = base_name(path);
            for kind in AccessorKind::ALL {
                let name = kind.name_for(&base);
                if let Some(existing) = accessors.get(&name) {
                    tracing::trace!(
                        name = %name,
                        kept = %existing.path,
                        dropped = %path,
                        "accessor name collision"
                    );
                    continue;
                }
                accessors.insert(
                    name,
                    Accessor {
                        path: path.clone(),
                        kind,
                    },
                );
            }
        }

        Self {
            shape,
            paths,
            accessors,
        }
    }

    /// Resolve an accessor name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }

    /// The field path behind any generated name.
    #[must_use]
    pub fn path_for(&self, name: &str) -> Option<&FieldPath> {
        self.get(name).map(|accessor| &accessor.path)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.accessors.contains_key(name)
    }

    /// Registered paths, parents before children.
    #[must_use]
    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }

    /// Whether this table was built from exactly `shape`.
    pub(crate) fn has_shape(&self, shape: &[FieldPath]) -> bool {
        self.shape == shape
    }
}
