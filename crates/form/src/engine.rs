//! Validation reconciliation.
//!
//! The engine owns the form state and decides, for every mutation, how much
//! of the suite to run:
//!
//! 1. While any key of the stored result is pending, the suite is not
//!    invoked at all and the stored result is returned as-is.
//! 2. A request without a field, or any request while nothing is touched,
//!    runs the whole suite.
//! 3. A request for the only touched field runs the suite for that field.
//! 4. Any other request runs the whole suite, so errors already surfaced on
//!    other touched fields stay in the result.
//! 5. A field run that did not test the field falls back to a whole run.
//!
//! Every stored result gets a fresh [`ValidationToken`]. Pending async work
//! is watched per token; a completion whose token is no longer current is
//! ignored. For stateless suites a current completion triggers exactly one
//! more whole run. Stateful suites push their settled results through a
//! subscription instead.
//!
//! The state lock is never held while the suite runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use im::OrdSet;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::accessor;
use crate::config::FormConfig;
use crate::error::{FormError, Result};
use crate::field::FieldState;
use crate::path::{self, FieldPath};
use crate::strategy::ErrorDisplayMode;
use crate::suite::{Completion, Subscription, Suite, SuiteMode, ValidationSnapshot};
use crate::value::Value;

/// Identifies one stored validation result. Later results get larger tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ValidationToken(u64);

impl ValidationToken {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Outcome of [`Form::submit`](crate::Form::submit).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub valid: bool,
    pub data: Value,
    pub errors: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// FormState
// ---------------------------------------------------------------------------

/// A consistent snapshot of everything the form tracks.
///
/// Published whole on every change, so observers never see a model from one
/// mutation paired with a result from another.
#[derive(Debug, Clone)]
pub struct FormState {
    model: Value,
    initial: Value,
    result: ValidationSnapshot,
    touched: OrdSet<String>,
    dirty: OrdSet<String>,
    submitted: bool,
    display: ErrorDisplayMode,
    token: ValidationToken,
    revision: u64,
    disposed: bool,
}

impl FormState {
    fn new(model: Value, display: ErrorDisplayMode) -> Self {
        Self {
            initial: model.clone(),
            model,
            result: ValidationSnapshot::default(),
            touched: OrdSet::new(),
            dirty: OrdSet::new(),
            submitted: false,
            display,
            token: ValidationToken::default(),
            revision: 0,
            disposed: false,
        }
    }

    #[must_use]
    pub fn model(&self) -> &Value {
        &self.model
    }

    /// The model the form was created or last reset with.
    #[must_use]
    pub fn initial(&self) -> &Value {
        &self.initial
    }

    #[must_use]
    pub fn result(&self) -> &ValidationSnapshot {
        &self.result
    }

    #[must_use]
    pub fn touched(&self) -> &OrdSet<String> {
        &self.touched
    }

    #[must_use]
    pub fn submitted(&self) -> bool {
        self.submitted
    }

    #[must_use]
    pub fn display(&self) -> ErrorDisplayMode {
        self.display
    }

    #[must_use]
    pub fn token(&self) -> ValidationToken {
        self.token
    }

    /// Bumped whenever the model is replaced.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// A key counts as touched when it or anything below it was touched.
    #[must_use]
    pub fn is_touched(&self, key: &str) -> bool {
        self.touched.iter().any(|p| path::is_within(p, key))
    }

    /// Explicitly marked, or the value differs from the initial model.
    #[must_use]
    pub fn is_dirty(&self, key: &str) -> bool {
        self.dirty.iter().any(|p| path::is_within(p, key))
            || accessor::get(&self.model, key).ok().flatten()
                != accessor::get(&self.initial, key).ok().flatten()
    }

    /// Whether anything in the form is dirty.
    #[must_use]
    pub fn is_form_dirty(&self) -> bool {
        !self.dirty.is_empty() || self.model != self.initial
    }

    /// Project the state of one field or group key.
    #[must_use]
    pub fn field(&self, key: &str) -> FieldState {
        FieldState::project(self, key)
    }

    /// Errors of every key whose errors should currently be shown.
    #[must_use]
    pub fn visible_errors(&self) -> BTreeMap<String, Vec<String>> {
        self.result
            .all_errors()
            .into_iter()
            .filter(|(key, _)| self.field(key).show_errors)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct Core {
    state: FormState,
    /// Token whose completion is being turned into a fresh run.
    refreshing: Option<ValidationToken>,
    /// Paths written since the last debounced validation.
    debounced: Vec<FieldPath>,
    /// A request was answered with a pending result. The next settled
    /// result is followed by one whole run over the current model.
    deferred: bool,
}

enum Plan {
    Full,
    Field(FieldPath),
}

impl Plan {
    fn only(&self) -> Option<&FieldPath> {
        match self {
            Self::Full => None,
            Self::Field(path) => Some(path),
        }
    }
}

pub(crate) struct Engine {
    name: String,
    suite: Arc<dyn Suite>,
    core: Mutex<Core>,
    publisher: watch::Sender<FormState>,
    next_token: AtomicU64,
    debounce: Duration,
    debounce_epoch: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
}

impl Engine {
    pub(crate) fn new(suite: Arc<dyn Suite>, model: Value, config: &FormConfig) -> Arc<Self> {
        let state = FormState::new(model, config.error_display);
        let (publisher, _) = watch::channel(state.clone());
        let engine = Arc::new(Self {
            name: config.name.clone(),
            suite,
            core: Mutex::new(Core {
                state,
                refreshing: None,
                debounced: Vec::new(),
                deferred: false,
            }),
            publisher,
            next_token: AtomicU64::new(0),
            debounce: config.debounce_duration(),
            debounce_epoch: AtomicU64::new(0),
            subscription: Mutex::new(None),
        });

        if engine.suite.mode() == SuiteMode::Stateful {
            let weak = Arc::downgrade(&engine);
            let subscription = engine.suite.subscribe(Arc::new(move |snapshot: ValidationSnapshot| {
                if let Some(engine) = weak.upgrade() {
                    engine.accept_pushed(snapshot);
                }
            }));
            *engine.subscription.lock() = subscription;
        }

        engine
    }

    pub(crate) fn state(&self) -> FormState {
        self.core.lock().state.clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<FormState> {
        self.publisher.subscribe()
    }

    // -- validation ----------------------------------------------------------

    /// Plan, run and store one validation pass.
    pub(crate) fn run_validation(self: &Arc<Self>, field: Option<&FieldPath>) -> ValidationSnapshot {
        let (model, plan) = {
            let mut core = self.core.lock();
            if core.state.result.is_pending(None) {
                tracing::debug!(form = %self.name, field = ?field.map(FieldPath::as_str), "validation pending, returning current result");
                core.deferred = true;
                return core.state.result.clone();
            }
            core.deferred = false;
            let state = &core.state;
            let plan = match field {
                Some(field) if state.touched.len() == 1 && state.touched.contains(field.as_str()) => {
                    Plan::Field(field.clone())
                }
                _ => Plan::Full,
            };
            (state.model.clone(), plan)
        };

        tracing::trace!(form = %self.name, only = ?plan.only().map(FieldPath::as_str), "running suite");
        let mut result = self.suite.run(&model, plan.only());

        if let Plan::Field(field) = &plan
            && !result.is_tested(Some(field.as_str()))
        {
            tracing::debug!(form = %self.name, field = %field, "field untested by filtered run, running whole suite");
            result = self.suite.run(&model, None);
        }

        self.store(result)
    }

    fn store(self: &Arc<Self>, result: ValidationSnapshot) -> ValidationSnapshot {
        let token = ValidationToken(self.next_token.fetch_add(1, Ordering::SeqCst) + 1);
        let pending = result.is_pending(None);
        let rerun = {
            let mut core = self.core.lock();
            if core.state.disposed {
                return result;
            }
            core.state.result = result.clone();
            core.state.token = token;
            core.refreshing = None;
            self.publish(&core);
            !pending && std::mem::take(&mut core.deferred)
        };

        if pending {
            match result.completion() {
                Some(completion) => self.watch_completion(token, completion.clone()),
                None => tracing::warn!(form = %self.name, "suite reported pending work without a completion handle"),
            }
        } else if rerun {
            tracing::debug!(form = %self.name, token = token.get(), "requests arrived while pending, running whole suite");
            return self.run_validation(None);
        }
        result
    }

    fn accept_pushed(self: &Arc<Self>, snapshot: ValidationSnapshot) {
        tracing::trace!(form = %self.name, "suite pushed a result");
        self.store(snapshot);
    }

    fn watch_completion(self: &Arc<Self>, token: ValidationToken, completion: Completion) {
        let Ok(handle) = Handle::try_current() else {
            tracing::trace!(form = %self.name, token = token.get(), "no runtime, completion left to settle()");
            return;
        };
        let engine = Arc::downgrade(self);
        handle.spawn(async move {
            completion.await;
            if let Some(engine) = engine.upgrade() {
                engine.complete(token);
            }
        });
    }

    /// React to the completion of the result stored under `token`. Returns
    /// whether this call replaced the result.
    fn complete(self: &Arc<Self>, token: ValidationToken) -> bool {
        if self.suite.mode() == SuiteMode::Stateful {
            return false;
        }
        let model = {
            let mut core = self.core.lock();
            if core.state.disposed || core.state.token != token || core.refreshing.is_some() {
                tracing::trace!(form = %self.name, token = token.get(), "discarding stale completion");
                return false;
            }
            core.refreshing = Some(token);
            core.deferred = false;
            core.state.model.clone()
        };
        tracing::debug!(form = %self.name, token = token.get(), "async validation settled, refreshing result");
        let result = self.suite.run(&model, None);
        self.store(result);
        true
    }

    /// Wait until the stored result has no pending work.
    pub(crate) async fn settle(self: &Arc<Self>) {
        loop {
            let (token, completion) = {
                let core = self.core.lock();
                let result = &core.state.result;
                match result.completion() {
                    Some(completion) if result.is_pending(None) => (core.state.token, completion.clone()),
                    _ => return,
                }
            };

            completion.await;
            if self.complete(token) {
                continue;
            }

            let unchanged = {
                let core = self.core.lock();
                core.state.token == token && core.refreshing.is_none()
            };
            if unchanged {
                // Nothing else is going to replace this result.
                match self.suite.current() {
                    Some(current) if !current.is_pending(None) => {
                        self.store(current);
                    }
                    _ => return,
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    fn schedule(self: &Arc<Self>, path: &FieldPath) {
        if self.debounce.is_zero() {
            self.run_validation(Some(path));
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            self.run_validation(Some(path));
            return;
        };

        let epoch = {
            let mut core = self.core.lock();
            if !core.debounced.contains(path) {
                core.debounced.push(path.clone());
            }
            self.debounce_epoch.fetch_add(1, Ordering::SeqCst) + 1
        };
        let engine = Arc::downgrade(self);
        let delay = self.debounce;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = engine.upgrade() {
                engine.flush_debounced(epoch);
            }
        });
    }

    fn flush_debounced(self: &Arc<Self>, epoch: u64) {
        if self.debounce_epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let paths = std::mem::take(&mut self.core.lock().debounced);
        match paths.as_slice() {
            [] => {}
            [path] => {
                self.run_validation(Some(path));
            }
            _ => {
                self.run_validation(None);
            }
        }
    }

    fn cancel_debounce(&self, core: &mut Core) {
        core.debounced.clear();
        self.debounce_epoch.fetch_add(1, Ordering::SeqCst);
    }

    // -- mutations -----------------------------------------------------------

    /// Write `value` at `path`, or remove the path when `None`. Never touches.
    pub(crate) fn set(self: &Arc<Self>, path: &FieldPath, value: Option<Value>) -> Result<()> {
        {
            let mut core = self.live()?;
            let model = match value {
                Some(value) => accessor::set_at(&core.state.model, path, value)?,
                None => accessor::delete_at(&core.state.model, path)?,
            };
            core.state.model = model;
            core.state.revision += 1;
            self.publish(&core);
        }
        tracing::trace!(form = %self.name, path = %path, "value written");
        self.schedule(path);
        Ok(())
    }

    pub(crate) fn touch(self: &Arc<Self>, path: &FieldPath) -> Result<ValidationSnapshot> {
        {
            let mut core = self.live()?;
            core.state.touched.insert(path.to_string());
            self.publish(&core);
        }
        Ok(self.run_validation(Some(path)))
    }

    pub(crate) fn mark_dirty(&self, path: &FieldPath) -> Result<()> {
        let mut core = self.live()?;
        core.state.dirty.insert(path.to_string());
        self.publish(&core);
        Ok(())
    }

    pub(crate) fn validate(self: &Arc<Self>, field: Option<&FieldPath>) -> Result<ValidationSnapshot> {
        drop(self.live()?);
        Ok(self.run_validation(field))
    }

    pub(crate) async fn submit(self: &Arc<Self>) -> Result<SubmitOutcome> {
        {
            let mut core = self.live()?;
            core.state.submitted = true;
            self.cancel_debounce(&mut core);
            self.publish(&core);
        }

        self.settle().await;
        self.run_validation(None);
        self.settle().await;

        let state = self.state();
        let outcome = SubmitOutcome {
            valid: state.result.is_valid(None),
            data: state.model.clone(),
            errors: state.result.all_errors(),
        };
        tracing::debug!(form = %self.name, valid = outcome.valid, errors = outcome.errors.len(), "form submitted");
        Ok(outcome)
    }

    /// Restore `model` (or the initial model) and forget all interaction.
    pub(crate) fn reset(self: &Arc<Self>, model: Option<Value>) -> Result<ValidationSnapshot> {
        if let Some(model) = &model
            && !model.is_container()
        {
            return Err(FormError::NonObjectRoot {
                kind: model.kind_name(),
            });
        }
        {
            let mut core = self.live()?;
            if let Some(model) = model {
                core.state.initial = model.clone();
                core.state.model = model;
            } else {
                core.state.model = core.state.initial.clone();
            }
            core.state.touched = OrdSet::new();
            core.state.dirty = OrdSet::new();
            core.state.submitted = false;
            core.state.result = ValidationSnapshot::default();
            core.state.token = ValidationToken(self.next_token.fetch_add(1, Ordering::SeqCst) + 1);
            core.state.revision += 1;
            core.refreshing = None;
            core.deferred = false;
            self.cancel_debounce(&mut core);
            self.publish(&core);
        }
        tracing::debug!(form = %self.name, "form reset");
        self.suite.reset();
        Ok(self.run_validation(None))
    }

    /// Restore one field's initial value and forget its interaction state.
    pub(crate) fn reset_field(self: &Arc<Self>, path: &FieldPath) -> Result<ValidationSnapshot> {
        {
            let mut core = self.live()?;
            let model = match accessor::get_at(&core.state.initial, path)?.cloned() {
                Some(initial) => accessor::set_at(&core.state.model, path, initial)?,
                None => accessor::delete_at(&core.state.model, path)?,
            };
            core.state.model = model;
            core.state.revision += 1;
            let key = path.as_str();
            core.state.touched = without_prefix(&core.state.touched, key);
            core.state.dirty = without_prefix(&core.state.dirty, key);
            core.debounced.retain(|p| !p.is_within(path));
            self.publish(&core);
        }
        self.suite.reset_field(path);
        Ok(self.run_validation(Some(path)))
    }

    /// Stop publishing and release the suite subscription.
    pub(crate) fn dispose(&self) {
        {
            let mut core = self.core.lock();
            if core.state.disposed {
                return;
            }
            core.state.disposed = true;
            self.cancel_debounce(&mut core);
            self.publish(&core);
        }
        let subscription = self.subscription.lock().take();
        drop(subscription);
        tracing::debug!(form = %self.name, "form disposed");
    }

    fn live(&self) -> Result<parking_lot::MutexGuard<'_, Core>> {
        let core = self.core.lock();
        if core.state.disposed {
            return Err(FormError::Disposed);
        }
        Ok(core)
    }

    fn publish(&self, core: &Core) {
        self.publisher.send_replace(core.state.clone());
    }
}

fn without_prefix(set: &OrdSet<String>, prefix: &str) -> OrdSet<String> {
    set.iter()
        .filter(|p| !path::is_within(p, prefix))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::rules::is_filled;
    use crate::suite::{Rule, RuleSuite};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{OnceLock, Weak};

    fn engine_with(suite: RuleSuite, model: serde_json::Value) -> Arc<Engine> {
        Engine::new(Arc::new(suite), Value::from(model), &FormConfig::default())
    }

    fn path(p: &str) -> FieldPath {
        FieldPath::parse(p).unwrap()
    }

    fn two_required() -> RuleSuite {
        RuleSuite::builder()
            .rule(Rule::required("a", "A is required"))
            .rule(Rule::required("b", "B is required"))
            .build()
    }

    #[test]
    fn untouched_request_runs_whole_suite() {
        let engine = engine_with(two_required(), json!({}));
        let result = engine.run_validation(Some(&path("a")));
        assert!(result.is_tested(Some("a")));
        assert!(result.is_tested(Some("b")));
    }

    #[test]
    fn sole_touched_field_runs_alone() {
        let engine = engine_with(two_required(), json!({}));
        let result = engine.touch(&path("a")).unwrap();
        assert!(result.is_tested(Some("a")));
        assert!(!result.is_tested(Some("b")));
    }

    #[test]
    fn second_touched_field_runs_whole_suite() {
        let engine = engine_with(two_required(), json!({}));
        engine.touch(&path("a")).unwrap();
        let result = engine.touch(&path("b")).unwrap();
        assert_eq!(result.errors("a"), ["A is required"]);
        assert_eq!(result.errors("b"), ["B is required"]);
    }

    #[test]
    fn untested_field_falls_back_to_whole_run() {
        let suite = RuleSuite::builder()
            .rule(Rule::required("a.inner", "Inner is required"))
            .rule(Rule::required("b", "B is required"))
            .build();
        let engine = engine_with(suite, json!({"a": {}}));
        let result = engine.touch(&path("c")).unwrap();
        assert!(result.is_tested(Some("b")));
        assert!(result.is_tested(Some("a.inner")));
    }

    #[test]
    fn tokens_increase_with_every_store() {
        let engine = engine_with(two_required(), json!({}));
        engine.run_validation(None);
        let first = engine.state().token();
        engine.run_validation(None);
        assert!(engine.state().token() > first);
    }

    #[test]
    fn set_never_touches() {
        let engine = engine_with(two_required(), json!({}));
        engine.set(&path("a"), Some(Value::from("x"))).unwrap();
        assert!(engine.state().touched().is_empty());
        assert_eq!(
            engine.state().model().to_json(),
            json!({"a": "x"})
        );
    }

    #[test]
    fn undefined_input_removes_the_path() {
        let engine = engine_with(two_required(), json!({"a": "x", "b": "y"}));
        engine.set(&path("a"), None).unwrap();
        assert_eq!(engine.state().model().to_json(), json!({"b": "y"}));
    }

    #[test]
    fn dirty_tracks_explicit_marks_and_value_changes() {
        let engine = engine_with(two_required(), json!({"a": "x"}));
        assert!(!engine.state().is_dirty("a"));
        engine.set(&path("a"), Some(Value::from("y"))).unwrap();
        assert!(engine.state().is_dirty("a"));
        engine.set(&path("a"), Some(Value::from("x"))).unwrap();
        assert!(!engine.state().is_dirty("a"));
        engine.mark_dirty(&path("b")).unwrap();
        assert!(engine.state().is_dirty("b"));
        assert!(engine.state().is_form_dirty());
    }

    #[test]
    fn reset_field_restores_initial_value() {
        let engine = engine_with(two_required(), json!({"a": "x"}));
        engine.set(&path("a"), Some(Value::from("y"))).unwrap();
        engine.set(&path("b"), Some(Value::from("new"))).unwrap();
        engine.touch(&path("a")).unwrap();
        engine.reset_field(&path("a")).unwrap();
        engine.reset_field(&path("b")).unwrap();

        let state = engine.state();
        assert_eq!(state.model().to_json(), json!({"a": "x"}));
        assert!(!state.is_touched("a"));
    }

    #[test]
    fn dispose_rejects_mutations() {
        let engine = engine_with(two_required(), json!({}));
        engine.dispose();
        assert_eq!(engine.touch(&path("a")).unwrap_err(), FormError::Disposed);
        assert_eq!(
            engine.set(&path("a"), Some(Value::Null)).unwrap_err(),
            FormError::Disposed
        );
        assert!(engine.state().is_disposed());
    }

    #[test]
    fn pending_without_runtime_waits_for_settle() {
        let suite = RuleSuite::builder()
            .rule(Rule::remote("name", "Name is taken", |_value: Value| async { false }))
            .build();
        let engine = engine_with(suite.clone(), json!({"name": "ada"}));

        let pending = engine.run_validation(None);
        assert!(pending.is_pending(None));
        engine.run_validation(None);
        assert_eq!(suite.runs(), 1);

        futures::executor::block_on(engine.settle());
        let state = engine.state();
        assert!(!state.result().is_pending(None));
        assert_eq!(state.result().errors("name"), ["Name is taken"]);
        assert_eq!(suite.runs(), 2);
    }

    #[test]
    fn write_during_refresh_is_revalidated() {
        let calls = Arc::new(AtomicU64::new(0));
        let hook: Arc<OnceLock<Weak<Engine>>> = Arc::new(OnceLock::new());
        let suite = {
            let calls = Arc::clone(&calls);
            let hook = Arc::clone(&hook);
            move |model: &Value, _only: Option<&FieldPath>| match calls.fetch_add(1, Ordering::SeqCst) {
                0 => ValidationSnapshot::builder()
                    .pending("a")
                    .completion(Completion::ready())
                    .build(),
                1 => {
                    // Lands after the refresh captured the model.
                    if let Some(engine) = hook.get().and_then(Weak::upgrade) {
                        engine.set(&path("a"), Some(Value::from(""))).unwrap();
                    }
                    ValidationSnapshot::builder().tested("a").build()
                }
                _ if is_filled(model, "a") => ValidationSnapshot::builder().tested("a").build(),
                _ => ValidationSnapshot::builder().error("a", "A is required").build(),
            }
        };
        let engine = Engine::new(
            Arc::new(suite),
            Value::from(json!({"a": "x"})),
            &FormConfig::default(),
        );
        hook.set(Arc::downgrade(&engine)).unwrap();

        assert!(engine.run_validation(None).is_pending(None));
        futures::executor::block_on(engine.settle());

        let state = engine.state();
        assert_eq!(state.model().to_json(), json!({"a": ""}));
        assert_eq!(state.result().errors("a"), ["A is required"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn revision_follows_model_writes() {
        let engine = engine_with(two_required(), json!({"a": "x"}));
        assert_eq!(engine.state().revision(), 0);
        engine.touch(&path("a")).unwrap();
        engine.mark_dirty(&path("a")).unwrap();
        assert_eq!(engine.state().revision(), 0);
        engine.set(&path("a"), Some(Value::from("y"))).unwrap();
        engine.reset_field(&path("a")).unwrap();
        engine.reset(None).unwrap();
        assert_eq!(engine.state().revision(), 3);
    }
}
