//! Per-field views over the form state.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::accessor;
use crate::engine::{Engine, FormState};
use crate::error::Result;
use crate::input::{self, Input};
use crate::path::FieldPath;
use crate::strategy::{self, DisplayInputs};
use crate::suite::ValidationSnapshot;
use crate::value::Value;

/// Error and warning messages of one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationMessages {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Everything the UI needs to render one field, computed from a single
/// [`FormState`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldState {
    pub path: String,
    /// `None` when nothing is stored at the path.
    pub value: Option<Value>,
    /// No errors and nothing pending.
    pub valid: bool,
    /// Has errors. A pending field is neither valid nor invalid.
    pub invalid: bool,
    pub dirty: bool,
    pub touched: bool,
    pub pending: bool,
    pub tested: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub show_errors: bool,
    pub show_warnings: bool,
}

impl FieldState {
    pub(crate) fn project(state: &FormState, key: &str) -> Self {
        let result = state.result();
        let errors = result.errors(key).to_vec();
        let warnings = result.warnings(key).to_vec();
        let pending = result.is_pending(Some(key));
        let tested = result.is_tested(Some(key));
        let touched = state.is_touched(key);

        let inputs = DisplayInputs {
            has_errors: !errors.is_empty(),
            has_warnings: !warnings.is_empty(),
            tested,
            touched,
            submitted: state.submitted(),
            pending,
        };

        Self {
            path: key.to_owned(),
            value: accessor::get(state.model(), key).ok().flatten().cloned(),
            valid: errors.is_empty() && !pending,
            invalid: !errors.is_empty(),
            dirty: state.is_dirty(key),
            touched,
            pending,
            tested,
            show_errors: strategy::should_show_errors(state.display(), inputs),
            show_warnings: strategy::should_show_warnings(inputs),
            errors,
            warnings,
        }
    }

    #[must_use]
    pub fn messages(&self) -> ValidationMessages {
        ValidationMessages {
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Handle for one field of a [`Form`](crate::Form).
///
/// Getters read the latest published state; actions go through the same
/// engine operations as the form itself.
#[derive(Clone)]
pub struct FieldView {
    path: FieldPath,
    engine: Arc<Engine>,
}

impl FieldView {
    pub(crate) fn new(path: FieldPath, engine: Arc<Engine>) -> Self {
        Self { path, engine }
    }

    #[must_use]
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    #[must_use]
    pub fn state(&self) -> FieldState {
        self.engine.state().field(self.path.as_str())
    }

    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.state().value
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.state().valid
    }

    #[must_use]
    pub fn invalid(&self) -> bool {
        self.state().invalid
    }

    #[must_use]
    pub fn dirty(&self) -> bool {
        self.state().dirty
    }

    #[must_use]
    pub fn touched(&self) -> bool {
        self.state().touched
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.state().pending
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.state().errors
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.state().warnings
    }

    #[must_use]
    pub fn show_errors(&self) -> bool {
        self.state().show_errors
    }

    #[must_use]
    pub fn show_warnings(&self) -> bool {
        self.state().show_warnings
    }

    /// Store a new value. Does not mark the field touched.
    pub fn set(&self, input: impl Into<Input>) -> Result<()> {
        self.engine.set(&self.path, input::extract(input.into()))
    }

    pub fn touch(&self) -> Result<ValidationSnapshot> {
        self.engine.touch(&self.path)
    }

    pub fn mark_dirty(&self) -> Result<()> {
        self.engine.mark_dirty(&self.path)
    }

    pub fn reset(&self) -> Result<ValidationSnapshot> {
        self.engine.reset_field(&self.path)
    }

    /// Stream of this field's state, yielding only when it changes.
    #[must_use]
    pub fn watch(&self) -> FieldWatch {
        FieldWatch::new(self.path.clone(), self.engine.watch())
    }
}

impl fmt::Debug for FieldView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldView")
            .field("path", &self.path.as_str())
            .finish_non_exhaustive()
    }
}

/// Change stream for one field.
///
/// Form-wide updates that leave this field's projection unchanged are
/// skipped.
#[derive(Debug)]
pub struct FieldWatch {
    path: FieldPath,
    receiver: watch::Receiver<FormState>,
    last: FieldState,
}

impl FieldWatch {
    fn new(path: FieldPath, mut receiver: watch::Receiver<FormState>) -> Self {
        let last = receiver.borrow_and_update().field(path.as_str());
        Self {
            path,
            receiver,
            last,
        }
    }

    /// The most recently observed state.
    #[must_use]
    pub fn current(&self) -> &FieldState {
        &self.last
    }

    /// Wait for the next change. Returns `None` once the form is disposed
    /// or dropped.
    pub async fn changed(&mut self) -> Option<FieldState> {
        loop {
            self.receiver.changed().await.ok()?;
            let next = {
                let state = self.receiver.borrow_and_update();
                if state.is_disposed() {
                    return None;
                }
                state.field(self.path.as_str())
            };
            if next != self.last {
                self.last = next.clone();
                return Some(next);
            }
        }
    }
}
