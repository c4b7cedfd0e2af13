//! Error types for form operations.

/// Result type for form operations.
pub type Result<T> = std::result::Result<T, FormError>;

/// Error type for form and path operations.
///
/// Covers malformed paths, traversal through values that cannot hold
/// children, registry dispatch and lifecycle misuse. Validation failures are
/// never reported through this type: they are data inside a
/// [`ValidationSnapshot`](crate::suite::ValidationSnapshot).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    /// The path string is malformed (empty segment, bad bracket index, ...).
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Path access was attempted on a root that is not an object or array.
    #[error("cannot address a path inside a {kind} root")]
    NonObjectRoot { kind: &'static str },

    /// An existing intermediate value is a scalar where a container was needed.
    #[error("cannot traverse `{segment}` in `{path}`: found {kind}")]
    MissingIntermediate {
        path: String,
        segment: String,
        kind: &'static str,
    },

    /// A non-numeric segment addressed an array.
    #[error("segment `{segment}` in `{path}` is not an array index")]
    NotAnIndex { path: String, segment: String },

    /// No registry accessor exists under the given name.
    #[error("unknown field accessor `{name}`")]
    UnknownAccessor { name: String },

    /// The accessor exists but reads state rather than performing an action.
    #[error("field accessor `{name}` is not callable")]
    NotCallable { name: String },

    /// The form was disposed and no longer accepts mutations.
    #[error("form has been disposed")]
    Disposed,

    /// Form configuration failed validation.
    #[error("invalid form configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl FormError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Broad error category for grouping in logs.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::InvalidPath { .. } => "path",
            Self::NonObjectRoot { .. } => "traversal",
            Self::MissingIntermediate { .. } => "traversal",
            Self::NotAnIndex { .. } => "traversal",
            Self::UnknownAccessor { .. } => "registry",
            Self::NotCallable { .. } => "registry",
            Self::Disposed => "lifecycle",
            Self::InvalidConfig { .. } => "config",
        }
    }

    /// Machine-readable error code for programmatic handling.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidPath { .. } => "FORM_INVALID_PATH",
            Self::NonObjectRoot { .. } => "FORM_NON_OBJECT_ROOT",
            Self::MissingIntermediate { .. } => "FORM_MISSING_INTERMEDIATE",
            Self::NotAnIndex { .. } => "FORM_NOT_AN_INDEX",
            Self::UnknownAccessor { .. } => "FORM_UNKNOWN_ACCESSOR",
            Self::NotCallable { .. } => "FORM_NOT_CALLABLE",
            Self::Disposed => "FORM_DISPOSED",
            Self::InvalidConfig { .. } => "FORM_INVALID_CONFIG",
        }
    }
}
