//! A rule-table suite.
//!
//! Each [`Rule`] is keyed by a field path or a group name and checks the
//! whole model. Async rules receive the value at their key. Each async rule
//! remembers the check for the last value it saw, so re-running the suite
//! while that check is in flight reuses the same future instead of starting
//! another. A new value replaces the remembered check.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use super::{Completion, SnapshotListener, Subscription, Suite, SuiteMode, ValidationSnapshot};
use crate::accessor;
use crate::path::{self, FieldPath};
use crate::value::Value;

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
type AsyncPredicate = Arc<dyn Fn(Value) -> BoxFuture<'static, bool> + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, bool>>;

/// Look up `field` in `model`, treating malformed or non-model keys as absent.
#[must_use]
pub fn field_value<'a>(model: &'a Value, field: &str) -> Option<&'a Value> {
    accessor::get(model, field).ok().flatten()
}

/// Whether `field` holds a non-blank value.
#[must_use]
pub fn is_filled(model: &Value, field: &str) -> bool {
    field_value(model, field).is_some_and(|v| !v.is_blank())
}

/// What a failing rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

#[derive(Clone)]
enum Check {
    Sync(Predicate),
    Async(AsyncPredicate),
}

/// One validation rule.
#[derive(Clone)]
pub struct Rule {
    field: String,
    message: String,
    severity: Severity,
    when: Option<Predicate>,
    check: Check,
}

impl Rule {
    /// A rule that passes when `check` returns `true` for the model.
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        check: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
            when: None,
            check: Check::Sync(Arc::new(check)),
        }
    }

    /// A rule that fails when the value at `field` is missing or blank.
    pub fn required(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let key = field.clone();
        Self::new(field, message, move |model| is_filled(model, &key))
    }

    /// An async rule. `check` receives the value at `field` (`Null` when
    /// absent).
    pub fn remote<F, Fut>(field: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
            when: None,
            check: Check::Async(Arc::new(move |value| check(value).boxed())),
        }
    }

    /// Report failures as warnings instead of errors.
    #[must_use]
    pub fn warn(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Only run when `condition` holds for the model. A skipped rule leaves
    /// its key untested.
    #[must_use]
    pub fn when(mut self, condition: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.when = Some(Arc::new(condition));
        self
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.check, Check::Async(_))
    }

    fn selected(&self, only: Option<&FieldPath>) -> bool {
        only.is_none_or(|only| path::is_within(&self.field, only.as_str()))
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("field", &self.field)
            .field("message", &self.message)
            .field("severity", &self.severity)
            .field("conditional", &self.when.is_some())
            .field("async", &self.is_async())
            .finish()
    }
}

/// Builder for [`RuleSuite`].
#[derive(Debug, Default)]
pub struct RuleSuiteBuilder {
    rules: Vec<Rule>,
    mode: SuiteMode,
}

impl RuleSuiteBuilder {
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Keep results between runs and push settled async results to
    /// subscribers.
    #[must_use]
    pub fn stateful(mut self) -> Self {
        self.mode = SuiteMode::Stateful;
        self
    }

    #[must_use]
    pub fn build(self) -> RuleSuite {
        RuleSuite {
            inner: Arc::new(Inner {
                rules: self.rules,
                mode: self.mode,
                runs: AtomicUsize::new(0),
                state: Mutex::new(SuiteState::default()),
            }),
        }
    }
}

/// Suite backed by a list of [`Rule`]s. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RuleSuite {
    inner: Arc<Inner>,
}

struct Inner {
    rules: Vec<Rule>,
    mode: SuiteMode,
    runs: AtomicUsize,
    state: Mutex<SuiteState>,
}

#[derive(Default)]
struct SuiteState {
    /// Latest async check per rule index, keyed by the value it was given.
    memo: HashMap<usize, (String, InFlight)>,
    current: Option<ValidationSnapshot>,
    last_model: Option<Value>,
    listeners: Vec<(u64, SnapshotListener)>,
    next_listener: u64,
}

impl RuleSuite {
    #[must_use]
    pub fn builder() -> RuleSuiteBuilder {
        RuleSuiteBuilder::default()
    }

    /// Number of times [`Suite::run`] was called.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.inner.runs.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.inner.rules
    }

    /// Run the selected rules against `model` without touching accumulated
    /// state.
    fn evaluate(&self, model: &Value, only: Option<&FieldPath>) -> ValidationSnapshot {
        let mut builder = ValidationSnapshot::builder();
        let mut waits = Vec::new();

        for (index, rule) in self.inner.rules.iter().enumerate() {
            if !rule.selected(only) {
                continue;
            }
            if rule.when.as_ref().is_some_and(|when| !when(model)) {
                continue;
            }

            let passed = match &rule.check {
                Check::Sync(check) => Some(check(model)),
                Check::Async(check) => {
                    let value = field_value(model, &rule.field).cloned().unwrap_or_default();
                    let future = self.in_flight(index, value, check);
                    let settled = future.peek().copied();
                    if settled.is_none() {
                        waits.push(future);
                    }
                    settled
                }
            };

            builder = match (passed, rule.severity) {
                (None, _) => builder.pending(&rule.field),
                (Some(true), _) => builder.tested(&rule.field),
                (Some(false), Severity::Error) => builder.error(&rule.field, rule.message.clone()),
                (Some(false), Severity::Warning) => {
                    builder.warning(&rule.field, rule.message.clone())
                }
            };
        }

        if !waits.is_empty() {
            builder = builder.completion(self.completion_for(waits));
        }
        builder.build()
    }

    fn in_flight(&self, index: usize, value: Value, check: &AsyncPredicate) -> InFlight {
        let key = value.to_json().to_string();
        let mut state = self.inner.state.lock();
        match state.memo.get(&index) {
            Some((memo_key, future)) if *memo_key == key => future.clone(),
            _ => {
                let future = check(value).shared();
                state.memo.insert(index, (key, future.clone()));
                future
            }
        }
    }

    fn completion_for(&self, waits: Vec<InFlight>) -> Completion {
        let stateful = self.inner.mode == SuiteMode::Stateful;
        let inner = Arc::downgrade(&self.inner);
        Completion::new(async move {
            futures::future::join_all(waits).await;
            if stateful && let Some(inner) = inner.upgrade() {
                RuleSuite { inner }.refresh();
            }
        })
    }

    /// Evaluate and fold the outcome into the accumulated result.
    fn accumulate(&self, model: &Value, only: Option<&FieldPath>) -> ValidationSnapshot {
        let fresh = self.evaluate(model, only);
        let mut state = self.inner.state.lock();
        let merged = match (state.current.as_ref(), only) {
            (Some(previous), Some(only)) => {
                let mut fields: BTreeMap<_, _> = previous
                    .outcomes()
                    .filter(|(key, _)| !path::is_within(key, only.as_str()))
                    .map(|(key, outcome)| (key.to_owned(), outcome.clone()))
                    .collect();
                fields.extend(
                    fresh
                        .outcomes()
                        .map(|(key, outcome)| (key.to_owned(), outcome.clone())),
                );
                let completion = join_completions(previous.completion(), fresh.completion());
                ValidationSnapshot::from_outcomes(fields, completion)
            }
            _ => fresh,
        };
        state.current = Some(merged.clone());
        merged
    }

    /// Re-evaluate every key that was pending and push the result.
    fn refresh(&self) {
        let (model, pending) = {
            let state = self.inner.state.lock();
            let (Some(model), Some(current)) = (&state.last_model, &state.current) else {
                return;
            };
            let pending: Vec<String> = current
                .outcomes()
                .filter(|(_, outcome)| outcome.pending)
                .map(|(key, _)| key.to_owned())
                .collect();
            (model.clone(), pending)
        };

        let mut latest = None;
        for key in pending {
            let Ok(path) = FieldPath::parse(&key) else {
                continue;
            };
            latest = Some(self.accumulate(&model, Some(&path)));
        }
        let Some(snapshot) = latest else {
            return;
        };

        let listeners: Vec<SnapshotListener> = self
            .inner
            .state
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        tracing::trace!(listeners = listeners.len(), "pushing settled suite result");
        for listener in listeners {
            listener(snapshot.clone());
        }
    }
}

fn join_completions(previous: Option<&Completion>, fresh: Option<&Completion>) -> Option<Completion> {
    match (previous.filter(|c| !c.is_settled()), fresh) {
        (None, fresh) => fresh.cloned(),
        (Some(previous), None) => Some(previous.clone()),
        (Some(previous), Some(fresh)) => {
            let (previous, fresh) = (previous.clone(), fresh.clone());
            Some(Completion::new(async move {
                futures::join!(previous, fresh);
            }))
        }
    }
}

impl Suite for RuleSuite {
    fn run(&self, model: &Value, only: Option<&FieldPath>) -> ValidationSnapshot {
        self.inner.runs.fetch_add(1, Ordering::SeqCst);
        match self.inner.mode {
            SuiteMode::Stateless => self.evaluate(model, only),
            SuiteMode::Stateful => {
                self.inner.state.lock().last_model = Some(model.clone());
                self.accumulate(model, only)
            }
        }
    }

    fn mode(&self) -> SuiteMode {
        self.inner.mode
    }

    fn subscribe(&self, listener: SnapshotListener) -> Option<Subscription> {
        if self.inner.mode == SuiteMode::Stateless {
            return None;
        }
        let id = {
            let mut state = self.inner.state.lock();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, listener));
            id
        };
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Some(Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.state.lock().listeners.retain(|(other, _)| *other != id);
            }
        }))
    }

    fn current(&self) -> Option<ValidationSnapshot> {
        match self.inner.mode {
            SuiteMode::Stateless => None,
            SuiteMode::Stateful => self.inner.state.lock().current.clone(),
        }
    }

    fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.current = None;
        state.last_model = None;
        state.memo.clear();
    }

    fn reset_field(&self, field: &FieldPath) {
        let mut state = self.inner.state.lock();
        let Some(current) = state.current.take() else {
            return;
        };
        let fields = current
            .outcomes()
            .filter(|(key, _)| !path::is_within(key, field.as_str()))
            .map(|(key, outcome)| (key.to_owned(), outcome.clone()))
            .collect();
        state.current = Some(ValidationSnapshot::from_outcomes(
            fields,
            current.completion().cloned(),
        ));
    }
}

impl fmt::Debug for RuleSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSuite")
            .field("rules", &self.inner.rules.len())
            .field("mode", &self.inner.mode)
            .field("runs", &self.runs())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FileHandle, FileList};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::Notify;

    fn model(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    fn signup() -> RuleSuite {
        RuleSuite::builder()
            .rule(Rule::required("name", "Name is required"))
            .rule(Rule::required("email", "Email is required"))
            .rule(
                Rule::new("email", "Email looks odd", |m| {
                    field_value(m, "email")
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.contains('@'))
                })
                .when(|m| is_filled(m, "email"))
                .warn(),
            )
            .build()
    }

    #[test]
    fn full_run_tests_every_rule() {
        let snapshot = signup().run(&model(json!({"name": "", "email": ""})), None);
        assert_eq!(snapshot.errors("name"), ["Name is required"]);
        assert_eq!(snapshot.errors("email"), ["Email is required"]);
        assert!(!snapshot.has_warnings(None));
    }

    #[test]
    fn only_filters_to_the_field() {
        let only = FieldPath::parse("name").unwrap();
        let snapshot = signup().run(&model(json!({})), Some(&only));
        assert!(snapshot.is_tested(Some("name")));
        assert!(!snapshot.is_tested(Some("email")));
    }

    #[test]
    fn skipped_condition_leaves_key_untested() {
        let suite = RuleSuite::builder()
            .rule(Rule::required("b", "B is required").when(|m| is_filled(m, "a")))
            .build();
        let snapshot = suite.run(&model(json!({"a": ""})), None);
        assert!(!snapshot.is_tested(Some("b")));

        let snapshot = suite.run(&model(json!({"a": "x"})), None);
        assert_eq!(snapshot.errors("b"), ["B is required"]);
    }

    #[test]
    fn warnings_do_not_block() {
        let snapshot = signup().run(&model(json!({"name": "Ada", "email": "ada"})), None);
        assert!(snapshot.is_valid(None));
        assert_eq!(snapshot.warnings("email"), ["Email looks odd"]);
    }

    #[test]
    fn counts_runs() {
        let suite = signup();
        suite.run(&Value::object(), None);
        suite.run(&Value::object(), None);
        assert_eq!(suite.runs(), 2);
    }

    #[tokio::test]
    async fn async_rules_are_memoised_by_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let suite = {
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            RuleSuite::builder()
                .rule(Rule::remote("username", "Username is taken", move |value| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let gate = Arc::clone(&gate);
                    async move {
                        gate.notified().await;
                        value.as_str() != Some("taken")
                    }
                }))
                .build()
        };

        let taken = model(json!({"username": "taken"}));
        let first = suite.run(&taken, None);
        assert!(first.is_pending(Some("username")));
        let second = suite.run(&taken, None);
        assert!(second.is_pending(Some("username")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        first.completion().unwrap().clone().await;

        let settled = suite.run(&taken, None);
        assert!(!settled.is_pending(None));
        assert_eq!(settled.errors("username"), ["Username is taken"]);
        assert!(settled.completion().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn memo_keeps_only_the_latest_value_per_rule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let suite = {
            let calls = Arc::clone(&calls);
            RuleSuite::builder()
                .rule(Rule::remote("username", "Username is taken", move |value: Value| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { value.as_str() != Some("taken") }
                }))
                .build()
        };

        for name in ["a", "ab", "abc", "abcd"] {
            suite.run(&model(json!({"username": name})), None);
        }
        assert_eq!(suite.inner.state.lock().memo.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        // The latest value is still reused.
        suite.run(&model(json!({"username": "abcd"})), None);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        // A file list and a lookalike array are different inputs.
        let files = Value::Files(FileList::new(vec![FileHandle::new("a", 1)]));
        let lookalike = Value::from(json!([{"name": "a", "size": 1, "type": null}]));
        suite.run(&Value::from_iter([("username".to_owned(), files)]), None);
        suite.run(&Value::from_iter([("username".to_owned(), lookalike)]), None);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn stateful_runs_accumulate() {
        let suite = RuleSuite::builder()
            .rule(Rule::required("name", "Name is required"))
            .rule(Rule::required("email", "Email is required"))
            .stateful()
            .build();
        let empty = model(json!({}));

        suite.run(&empty, Some(&FieldPath::parse("name").unwrap()));
        let snapshot = suite.run(&empty, Some(&FieldPath::parse("email").unwrap()));
        assert!(snapshot.has_errors(Some("name")));
        assert!(snapshot.has_errors(Some("email")));
        assert_eq!(suite.current(), Some(snapshot));

        suite.reset_field(&FieldPath::parse("name").unwrap());
        let current = suite.current().unwrap();
        assert!(!current.is_tested(Some("name")));
        assert!(current.has_errors(Some("email")));

        suite.reset();
        assert!(suite.current().is_none());
    }

    #[tokio::test]
    async fn stateful_suite_pushes_settled_results() {
        let suite = RuleSuite::builder()
            .rule(Rule::remote("username", "Username is taken", |value: Value| async move {
                tokio::task::yield_now().await;
                value.as_str() != Some("taken")
            }))
            .stateful()
            .build();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let subscription = suite
            .subscribe(Arc::new(move |snapshot: ValidationSnapshot| {
                sink.lock().push(snapshot);
            }))
            .unwrap();

        let pending = suite.run(&model(json!({"username": "taken"})), None);
        assert!(pending.is_pending(None));
        assert!(received.lock().is_empty());

        pending.completion().unwrap().clone().await;
        let pushed = received.lock().clone();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].errors("username"), ["Username is taken"]);
        assert!(!pushed[0].is_pending(None));

        drop(subscription);
        assert!(suite.inner.state.lock().listeners.is_empty());
    }

    #[test]
    fn stateless_suite_has_no_subscription() {
        assert!(signup().subscribe(Arc::new(|_: ValidationSnapshot| {})).is_none());
        assert!(signup().current().is_none());
    }
}
