//! Immutable validation snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};

/// Per-key outcome of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// At least one rule for this key ran.
    pub tested: bool,
    /// At least one async rule for this key has not settled.
    pub pending: bool,
}

/// Resolves once the asynchronous work of a validation run has settled.
///
/// Clones share the same underlying future, so any number of watchers can
/// await one run.
#[derive(Clone)]
pub struct Completion(Shared<BoxFuture<'static, ()>>);

impl Completion {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(future.boxed().shared())
    }

    /// An already settled completion.
    #[must_use]
    pub fn ready() -> Self {
        Self::new(futures::future::ready(()))
    }

    /// Whether some clone of this completion has already run to the end.
    /// Never polls.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.0.peek().is_some()
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_unpin(cx)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.0.peek().is_some())
            .finish()
    }
}

/// Result of one suite run.
///
/// Keys are field paths or group names. Snapshots are immutable; cloning one
/// is a reference count bump.
#[derive(Debug, Clone, Default)]
pub struct ValidationSnapshot {
    fields: Arc<BTreeMap<String, FieldOutcome>>,
    completion: Option<Completion>,
}

impl ValidationSnapshot {
    #[must_use]
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Build a snapshot from ready-made outcomes.
    #[must_use]
    pub fn from_outcomes(fields: BTreeMap<String, FieldOutcome>, completion: Option<Completion>) -> Self {
        Self {
            fields: Arc::new(fields),
            completion,
        }
    }

    /// No errors and nothing pending, for one key or the whole result.
    #[must_use]
    pub fn is_valid(&self, field: Option<&str>) -> bool {
        !self.has_errors(field) && !self.is_pending(field)
    }

    #[must_use]
    pub fn has_errors(&self, field: Option<&str>) -> bool {
        self.any(field, |o| !o.errors.is_empty())
    }

    #[must_use]
    pub fn has_warnings(&self, field: Option<&str>) -> bool {
        self.any(field, |o| !o.warnings.is_empty())
    }

    #[must_use]
    pub fn is_pending(&self, field: Option<&str>) -> bool {
        self.any(field, |o| o.pending)
    }

    #[must_use]
    pub fn is_tested(&self, field: Option<&str>) -> bool {
        self.any(field, |o| o.tested)
    }

    /// Error messages for one key, in rule order.
    #[must_use]
    pub fn errors(&self, field: &str) -> &[String] {
        self.fields.get(field).map_or(&[], |o| o.errors.as_slice())
    }

    #[must_use]
    pub fn warnings(&self, field: &str) -> &[String] {
        self.fields.get(field).map_or(&[], |o| o.warnings.as_slice())
    }

    /// Every key with at least one error.
    #[must_use]
    pub fn all_errors(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .filter(|(_, o)| !o.errors.is_empty())
            .map(|(k, o)| (k.clone(), o.errors.clone()))
            .collect()
    }

    #[must_use]
    pub fn all_warnings(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .filter(|(_, o)| !o.warnings.is_empty())
            .map(|(k, o)| (k.clone(), o.warnings.clone()))
            .collect()
    }

    #[must_use]
    pub fn outcome(&self, field: &str) -> Option<&FieldOutcome> {
        self.fields.get(field)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &FieldOutcome)> {
        self.fields.iter().map(|(k, o)| (k.as_str(), o))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Handle for the run's outstanding async work, if any.
    #[must_use]
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    fn any(&self, field: Option<&str>, predicate: impl Fn(&FieldOutcome) -> bool) -> bool {
        match field {
            Some(key) => self.fields.get(key).is_some_and(&predicate),
            None => self.fields.values().any(predicate),
        }
    }
}

/// Snapshots compare by outcomes. Completion handles are not compared.
impl PartialEq for ValidationSnapshot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields) || self.fields == other.fields
    }
}

/// Incremental construction of a [`ValidationSnapshot`].
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    fields: BTreeMap<String, FieldOutcome>,
    completion: Option<Completion>,
}

impl SnapshotBuilder {
    /// Record that rules for `field` ran.
    #[must_use]
    pub fn tested(mut self, field: &str) -> Self {
        self.entry(field).tested = true;
        self
    }

    /// Record a failed error rule. Marks the field tested.
    #[must_use]
    pub fn error(mut self, field: &str, message: impl Into<String>) -> Self {
        let outcome = self.entry(field);
        outcome.tested = true;
        outcome.errors.push(message.into());
        self
    }

    /// Record a failed warning rule. Marks the field tested.
    #[must_use]
    pub fn warning(mut self, field: &str, message: impl Into<String>) -> Self {
        let outcome = self.entry(field);
        outcome.tested = true;
        outcome.warnings.push(message.into());
        self
    }

    /// Record unsettled async work for `field`. Marks the field tested.
    #[must_use]
    pub fn pending(mut self, field: &str) -> Self {
        let outcome = self.entry(field);
        outcome.tested = true;
        outcome.pending = true;
        self
    }

    #[must_use]
    pub fn completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    #[must_use]
    pub fn build(self) -> ValidationSnapshot {
        ValidationSnapshot::from_outcomes(self.fields, self.completion)
    }

    fn entry(&mut self, field: &str) -> &mut FieldOutcome {
        self.fields.entry(field.to_owned()).or_default()
    }
}
