//! Turning UI input into model values.
//!
//! UI bindings hand the form either a plain value or a description of the
//! control that changed. [`extract`] reduces both to the value that should be
//! written into the model.

use crate::value::{FileList, Value};

/// Kind of input control that produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Checkbox,
    Radio,
    Number,
    Range,
    SelectMultiple,
    SelectOne,
    File,
    TextArea,
    Text,
}

/// Snapshot of the control that changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlTarget {
    pub kind: ControlKind,
    /// Raw string value of the control.
    pub value: String,
    /// Checked state for checkboxes and radios.
    pub checked: bool,
    /// Selected option values, in display order, for multi-selects.
    pub selected: Vec<String>,
    /// Picked files for file controls.
    pub files: Option<FileList>,
}

impl ControlTarget {
    pub fn new(kind: ControlKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            checked: false,
            selected: Vec::new(),
            files: None,
        }
    }

    #[must_use]
    pub fn checkbox(checked: bool) -> Self {
        Self::new(ControlKind::Checkbox, "on").with_checked(checked)
    }

    pub fn radio(value: impl Into<String>, checked: bool) -> Self {
        Self::new(ControlKind::Radio, value).with_checked(checked)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(ControlKind::Text, value)
    }

    pub fn number(value: impl Into<String>) -> Self {
        Self::new(ControlKind::Number, value)
    }

    #[must_use]
    pub fn select_multiple(selected: Vec<String>) -> Self {
        Self {
            selected,
            ..Self::new(ControlKind::SelectMultiple, "")
        }
    }

    #[must_use]
    pub fn file(files: FileList) -> Self {
        Self {
            files: Some(files),
            ..Self::new(ControlKind::File, "")
        }
    }

    #[must_use]
    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }
}

/// A change notification from a UI control. The target may be gone by the
/// time the notification is processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlChange {
    pub target: Option<ControlTarget>,
}

impl ControlChange {
    #[must_use]
    pub fn new(target: ControlTarget) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// A change whose target is no longer available.
    #[must_use]
    pub fn detached() -> Self {
        Self { target: None }
    }
}

/// Input accepted by field setters.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A value to store as-is.
    Raw(Value),
    /// A control change to normalise first.
    Change(ControlChange),
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

macro_rules! raw_input_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Input {
                fn from(value: $ty) -> Self {
                    Self::Raw(Value::from(value))
                }
            }
        )*
    };
}

raw_input_from!(&str, String, bool, i64, f64, serde_json::Value, FileList);

impl From<ControlChange> for Input {
    fn from(change: ControlChange) -> Self {
        Self::Change(change)
    }
}

impl From<ControlTarget> for Input {
    fn from(target: ControlTarget) -> Self {
        Self::Change(ControlChange::new(target))
    }
}

/// Extract the value to store. `None` means "no value" (the field is removed
/// from the model).
#[must_use]
pub fn extract(input: Input) -> Option<Value> {
    match input {
        Input::Raw(value) => Some(value),
        Input::Change(change) => change.target.and_then(control_value),
    }
}

fn control_value(target: ControlTarget) -> Option<Value> {
    match target.kind {
        ControlKind::Checkbox => Some(Value::Bool(target.checked)),
        ControlKind::Radio => target.checked.then(|| Value::String(target.value)),
        ControlKind::Number | ControlKind::Range => Some(parse_number(&target.value)),
        ControlKind::SelectMultiple => Some(
            target
                .selected
                .into_iter()
                .map(Value::String)
                .collect(),
        ),
        ControlKind::File => Some(Value::Files(target.files.unwrap_or_default())),
        ControlKind::SelectOne | ControlKind::TextArea | ControlKind::Text => {
            Some(Value::String(target.value))
        }
    }
}

/// Numeric value when the text parses, otherwise the raw text.
fn parse_number(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    match trimmed.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::float(float),
        _ => Value::String(raw.to_owned()),
    }
}
