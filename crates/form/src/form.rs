//! The public form handle.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::{FieldFilter, FormConfig};
use crate::engine::{Engine, FormState, SubmitOutcome};
use crate::error::{FormError, Result};
use crate::field::{FieldState, FieldView, ValidationMessages};
use crate::input::{self, Input};
use crate::path::FieldPath;
use crate::registry::{self, AccessorKind, FieldRegistry};
use crate::strategy::ErrorDisplayMode;
use crate::suite::{Suite, ValidationSnapshot};
use crate::value::Value;

/// What reading a registry accessor produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldReading {
    /// `<base>`: the stored value, `None` when absent.
    Value(Option<Value>),
    /// One of the boolean state accessors.
    Flag(bool),
    /// `<base>Validation`
    Messages(ValidationMessages),
    /// `<base>Field`
    Field(FieldState),
    /// An action accessor. Use [`Form::call`] to run it.
    Action { path: FieldPath, kind: AccessorKind },
}

// ---------------------------------------------------------------------------
// FormBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Form`].
pub struct FormBuilder {
    model: Value,
    config: FormConfig,
    suite: Option<Arc<dyn Suite>>,
}

impl FormBuilder {
    #[must_use]
    pub fn new(model: impl Into<Value>) -> Self {
        Self {
            model: model.into(),
            config: FormConfig::default(),
            suite: None,
        }
    }

    #[must_use]
    pub fn suite(mut self, suite: impl Suite) -> Self {
        self.suite = Some(Arc::new(suite));
        self
    }

    #[must_use]
    pub fn config(mut self, config: FormConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    #[must_use]
    pub fn error_display(mut self, mode: ErrorDisplayMode) -> Self {
        self.config.error_display = mode;
        self
    }

    #[must_use]
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.config.debounce = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn fields(mut self, filter: FieldFilter) -> Self {
        self.config.fields = filter;
        self
    }

    /// Validate the configuration, create the form and run the suite once
    /// over the initial model.
    pub fn build(self) -> Result<Form> {
        self.config.validate()?;
        if !self.model.is_container() {
            return Err(FormError::NonObjectRoot {
                kind: self.model.kind_name(),
            });
        }

        let suite: Arc<dyn Suite> = match self.suite {
            Some(suite) => suite,
            None => Arc::new(accept_all),
        };
        let engine = Engine::new(suite, self.model, &self.config);
        engine.run_validation(None);
        tracing::debug!(form = %self.config.name, "form created");

        Ok(Form {
            engine,
            config: self.config,
            views: Mutex::new(HashMap::new()),
            registry: Mutex::new(None),
        })
    }
}

fn accept_all(_: &Value, _: Option<&FieldPath>) -> ValidationSnapshot {
    ValidationSnapshot::default()
}

impl fmt::Debug for FormBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormBuilder")
            .field("config", &self.config)
            .field("has_suite", &self.suite.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// Form state bound to a validation suite.
pub struct Form {
    engine: Arc<Engine>,
    config: FormConfig,
    views: Mutex<HashMap<FieldPath, FieldView>>,
    registry: Mutex<Option<CachedRegistry>>,
}

/// Registry built for one model revision.
struct CachedRegistry {
    revision: u64,
    registry: Arc<FieldRegistry>,
}

impl Form {
    #[must_use]
    pub fn builder(model: impl Into<Value>) -> FormBuilder {
        FormBuilder::new(model)
    }

    #[must_use]
    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    /// A consistent snapshot of the whole form.
    #[must_use]
    pub fn state(&self) -> FormState {
        self.engine.state()
    }

    #[must_use]
    pub fn model(&self) -> Value {
        self.state().model().clone()
    }

    /// The latest stored validation result.
    #[must_use]
    pub fn result(&self) -> ValidationSnapshot {
        self.state().result().clone()
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.state().result().is_valid(None)
    }

    #[must_use]
    pub fn invalid(&self) -> bool {
        self.state().result().has_errors(None)
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.state().result().is_pending(None)
    }

    #[must_use]
    pub fn dirty(&self) -> bool {
        self.state().is_form_dirty()
    }

    #[must_use]
    pub fn submitted(&self) -> bool {
        self.state().submitted()
    }

    /// Errors of every key, visible or not.
    #[must_use]
    pub fn errors(&self) -> BTreeMap<String, Vec<String>> {
        self.state().result().all_errors()
    }

    /// Errors the display mode currently allows to show.
    #[must_use]
    pub fn visible_errors(&self) -> BTreeMap<String, Vec<String>> {
        self.state().visible_errors()
    }

    /// The view for `path`, created on first access and reused afterwards.
    pub fn field(&self, path: &str) -> Result<FieldView> {
        let path = FieldPath::parse(path)?;
        let mut views = self.views.lock();
        let view = views
            .entry(path)
            .or_insert_with_key(|path| FieldView::new(path.clone(), Arc::clone(&self.engine)));
        Ok(view.clone())
    }

    /// Run validation for one field, or the whole form.
    pub fn validate(&self, path: Option<&str>) -> Result<ValidationSnapshot> {
        let path = path.map(FieldPath::parse).transpose()?;
        self.engine.validate(path.as_ref())
    }

    /// Store a value. Does not mark the field touched.
    pub fn set(&self, path: &str, input: impl Into<Input>) -> Result<()> {
        let path = FieldPath::parse(path)?;
        self.engine.set(&path, input::extract(input.into()))
    }

    pub fn touch(&self, path: &str) -> Result<ValidationSnapshot> {
        self.engine.touch(&FieldPath::parse(path)?)
    }

    pub fn mark_dirty(&self, path: &str) -> Result<()> {
        self.engine.mark_dirty(&FieldPath::parse(path)?)
    }

    /// Mark the form submitted, validate everything and wait for async
    /// rules to settle.
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        self.engine.submit().await
    }

    /// Wait until no async validation is pending.
    pub async fn settle(&self) {
        self.engine.settle().await;
    }

    pub fn reset(&self) -> Result<ValidationSnapshot> {
        self.engine.reset(None)
    }

    /// Replace both the model and the initial model, then reset.
    pub fn reset_to(&self, model: impl Into<Value>) -> Result<ValidationSnapshot> {
        self.engine.reset(Some(model.into()))
    }

    pub fn reset_field(&self, path: &str) -> Result<ValidationSnapshot> {
        self.engine.reset_field(&FieldPath::parse(path)?)
    }

    /// Release the suite subscription. Later mutations fail with
    /// [`FormError::Disposed`].
    pub fn dispose(&self) {
        self.engine.dispose();
    }

    /// Receiver for every published state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<FormState> {
        self.engine.watch()
    }

    /// Accessor table for the current model shape.
    ///
    /// Reused as long as the model is unchanged. After a write the model is
    /// walked once; the table is rebuilt only if the set of paths changed.
    pub fn registry(&self) -> Arc<FieldRegistry> {
        let state = self.state();
        let revision = state.revision();
        let mut cached = self.registry.lock();
        if let Some(entry) = cached.as_ref()
            && entry.revision == revision
        {
            return Arc::clone(&entry.registry);
        }
        let shape = registry::collect_paths(state.model());
        if let Some(entry) = cached.as_mut()
            && entry.registry.has_shape(&shape)
        {
            entry.revision = revision;
            return Arc::clone(&entry.registry);
        }
        tracing::trace!(form = %self.config.name, paths = shape.len(), "rebuilding field registry");
        let registry = Arc::new(FieldRegistry::from_paths(shape, &self.config.fields));
        *cached = Some(CachedRegistry {
            revision,
            registry: Arc::clone(&registry),
        });
        registry
    }

    /// Read a registry accessor by name.
    pub fn read(&self, name: &str) -> Result<FieldReading> {
        let registry = self.registry();
        let accessor = registry.get(name).ok_or_else(|| FormError::UnknownAccessor {
            name: name.to_owned(),
        })?;
        let field = self.state().field(accessor.path.as_str());

        Ok(match accessor.kind {
            AccessorKind::Value => FieldReading::Value(field.value),
            AccessorKind::Valid => FieldReading::Flag(field.valid),
            AccessorKind::Invalid => FieldReading::Flag(field.invalid),
            AccessorKind::Pending => FieldReading::Flag(field.pending),
            AccessorKind::Touched => FieldReading::Flag(field.touched),
            AccessorKind::Dirty => FieldReading::Flag(field.dirty),
            AccessorKind::ShowErrors => FieldReading::Flag(field.show_errors),
            AccessorKind::ShowWarnings => FieldReading::Flag(field.show_warnings),
            AccessorKind::Validation => FieldReading::Messages(field.messages()),
            AccessorKind::Field => FieldReading::Field(field),
            kind => FieldReading::Action {
                path: accessor.path.clone(),
                kind,
            },
        })
    }

    /// Run an action accessor by name. `input` is only used by `set<Base>`;
    /// `None` there removes the value.
    pub fn call(&self, name: &str, input: Option<Input>) -> Result<()> {
        let registry = self.registry();
        let accessor = registry.get(name).ok_or_else(|| FormError::UnknownAccessor {
            name: name.to_owned(),
        })?;
        let path = &accessor.path;

        match accessor.kind {
            AccessorKind::Set => self.engine.set(path, input.and_then(input::extract)),
            AccessorKind::Touch | AccessorKind::MarkAsTouched => self.engine.touch(path).map(drop),
            AccessorKind::MarkAsDirty => self.engine.mark_dirty(path),
            AccessorKind::Reset => self.engine.reset_field(path).map(drop),
            _ => Err(FormError::NotCallable {
                name: name.to_owned(),
            }),
        }
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("name", &self.config.name)
            .field("views", &self.views.lock().len())
            .finish_non_exhaustive()
    }
}

impl Drop for Form {
    fn drop(&mut self) {
        self.engine.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{Rule, RuleSuite};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn form() -> Form {
        Form::builder(json!({"profile": {"name": ""}, "tags": []}))
            .suite(
                RuleSuite::builder()
                    .rule(Rule::required("profile.name", "Name is required"))
                    .build(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn build_runs_initial_validation() {
        let form = form();
        assert!(form.invalid());
        assert!(!form.valid());
        assert!(form.visible_errors().is_empty());
        assert_eq!(form.errors()["profile.name"], vec!["Name is required".to_owned()]);
    }

    #[test]
    fn build_rejects_scalar_model() {
        let err = Form::builder("nope").build().unwrap_err();
        assert_eq!(err, FormError::NonObjectRoot { kind: "string" });
    }

    #[test]
    fn build_rejects_bad_filter() {
        let err = Form::builder(json!({}))
            .fields(FieldFilter {
                include: vec!["a..b".into()],
                exclude: Vec::new(),
            })
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "FORM_INVALID_CONFIG");
    }

    #[test]
    fn without_a_suite_everything_is_valid() {
        let form = Form::builder(json!({"a": 1})).build().unwrap();
        assert!(form.valid());
        assert!(!form.pending());
    }

    #[test]
    fn field_views_are_cached() {
        let form = form();
        let a = form.field("profile.name").unwrap();
        let b = form.field("profile.name").unwrap();
        assert_eq!(a.path(), b.path());
        form.field("tags[0]").unwrap();
        assert_eq!(form.views.lock().len(), 2);
        assert!(form.field("tags..0").is_err());
    }

    #[test]
    fn read_and_call_dispatch_by_name() {
        let form = form();
        assert_eq!(
            form.read("profileName").unwrap(),
            FieldReading::Value(Some(Value::from("")))
        );
        assert_eq!(form.read("profileNameTouched").unwrap(), FieldReading::Flag(false));

        form.call("touchProfileName", None).unwrap();
        assert_eq!(form.read("profileNameTouched").unwrap(), FieldReading::Flag(true));
        assert_eq!(form.read("profileNameShowErrors").unwrap(), FieldReading::Flag(true));

        form.call("setProfileName", Some(Input::from("Ada"))).unwrap();
        assert_eq!(form.read("profileNameValid").unwrap(), FieldReading::Flag(true));
        assert!(matches!(
            form.read("resetProfileName").unwrap(),
            FieldReading::Action {
                kind: AccessorKind::Reset,
                ..
            }
        ));

        assert_eq!(
            form.call("profileNameValid", None).unwrap_err(),
            FormError::NotCallable {
                name: "profileNameValid".into()
            }
        );
        assert!(matches!(
            form.read("nope").unwrap_err(),
            FormError::UnknownAccessor { .. }
        ));
    }

    #[test]
    fn registry_is_rebuilt_only_on_shape_change() {
        let form = form();
        let first = form.registry();
        form.set("profile.name", "Ada").unwrap();
        assert!(Arc::ptr_eq(&first, &form.registry()));

        form.set("profile.age", 36_i64).unwrap();
        let second = form.registry();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.contains("profileAge"));
    }

    #[test]
    fn registry_is_keyed_on_model_revision() {
        let form = form();
        let first = form.registry();
        let revision = form.state().revision();
        let cached_revision = || form.registry.lock().as_ref().map(|entry| entry.revision);

        form.touch("profile.name").unwrap();
        form.read("profileNameTouched").unwrap();
        assert_eq!(form.state().revision(), revision);
        assert_eq!(cached_revision(), Some(revision));
        assert!(Arc::ptr_eq(&first, &form.registry()));

        form.set("profile.name", "Ada").unwrap();
        assert_eq!(form.state().revision(), revision + 1);
        form.read("profileName").unwrap();
        assert_eq!(cached_revision(), Some(revision + 1));
        assert!(Arc::ptr_eq(&first, &form.registry()));
    }

    #[test]
    fn reset_to_replaces_initial_model() {
        let form = form();
        form.set("profile.name", "Ada").unwrap();
        form.reset_to(json!({"profile": {"name": "Grace"}})).unwrap();
        assert!(!form.dirty());
        assert_eq!(form.model().to_json(), json!({"profile": {"name": "Grace"}}));

        form.set("profile.name", "Ada").unwrap();
        form.reset().unwrap();
        assert_eq!(form.model().to_json(), json!({"profile": {"name": "Grace"}}));
        assert!(form.reset_to("scalar").is_err());
    }
}
