//! The validation suite boundary.
//!
//! A [`Suite`] turns a model snapshot into a [`ValidationSnapshot`]. The form
//! never looks inside rules: it only decides when to run the suite and how
//! far, then reads the outcome.
//!
//! Two flavours exist:
//!
//! - **Stateless** suites evaluate from scratch on every call. When a run
//!   leaves async work pending, the engine calls the suite again once that
//!   work settles.
//! - **Stateful** suites keep results between calls and push settled results
//!   to subscribers. The engine never re-runs them on completion.
//!
//! Any `Fn(&Value, Option<&FieldPath>) -> ValidationSnapshot` is a stateless
//! suite. [`RuleSuite`] is a ready-made implementation of both flavours.

pub mod result;
pub mod rules;

use std::fmt;
use std::sync::Arc;

pub use result::{Completion, FieldOutcome, SnapshotBuilder, ValidationSnapshot};
pub use rules::{Rule, RuleSuite, RuleSuiteBuilder, Severity};

use crate::path::FieldPath;
use crate::value::Value;

/// Callback receiving snapshots pushed by a stateful suite.
pub type SnapshotListener = Arc<dyn Fn(ValidationSnapshot) + Send + Sync>;

/// How a suite manages state between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SuiteMode {
    #[default]
    Stateless,
    Stateful,
}

/// A validation rule set the form can run.
pub trait Suite: Send + Sync + 'static {
    /// Evaluate `model`. With `only` set, rules outside that field may be
    /// skipped.
    fn run(&self, model: &Value, only: Option<&FieldPath>) -> ValidationSnapshot;

    fn mode(&self) -> SuiteMode {
        SuiteMode::Stateless
    }

    /// Register for pushed results. Stateless suites return `None`.
    fn subscribe(&self, _listener: SnapshotListener) -> Option<Subscription> {
        None
    }

    /// Latest accumulated result of a stateful suite.
    fn current(&self) -> Option<ValidationSnapshot> {
        None
    }

    /// Forget all accumulated state.
    fn reset(&self) {}

    /// Forget accumulated state for one field and its descendants.
    fn reset_field(&self, _field: &FieldPath) {}
}

impl<F> Suite for F
where
    F: Fn(&Value, Option<&FieldPath>) -> ValidationSnapshot + Send + Sync + 'static,
{
    fn run(&self, model: &Value, only: Option<&FieldPath>) -> ValidationSnapshot {
        self(model, only)
    }
}

/// Handle returned by [`Suite::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
