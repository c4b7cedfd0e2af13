//! # Nebula Form
//!
//! Form state bound to a validation suite.
//!
//! A [`Form`] owns a nested model, a touched set and the latest validation
//! result. Values are written by dot-notation path; every write and touch
//! asks the reconciliation engine how much of the suite to re-run, and the
//! outcome is published as one consistent [`FormState`]. Per-field views,
//! named registry accessors and the error display strategy are projections
//! over that state.
//!
//! ```no_run
//! use nebula_form::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> nebula_form::Result<()> {
//! let suite = RuleSuite::builder()
//!     .rule(Rule::required("email", "Email is required"))
//!     .build();
//! let form = Form::builder(json!({"email": ""})).suite(suite).build()?;
//!
//! form.set("email", "ada@example.com")?;
//! form.touch("email")?;
//! assert!(form.field("email")?.valid());
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod config;
pub mod engine;
pub mod error;
pub mod field;
pub mod form;
pub mod input;
pub mod path;
pub mod registry;
pub mod strategy;
pub mod suite;
pub mod value;

pub use config::{FieldFilter, FormConfig};
pub use engine::{FormState, SubmitOutcome, ValidationToken};
pub use error::{FormError, Result};
pub use field::{FieldState, FieldView, FieldWatch, ValidationMessages};
pub use form::{FieldReading, Form, FormBuilder};
pub use input::{ControlChange, ControlKind, ControlTarget, Input};
pub use path::FieldPath;
pub use registry::{Accessor, AccessorKind, FieldRegistry};
pub use strategy::ErrorDisplayMode;
pub use suite::{Suite, SuiteMode, ValidationSnapshot};
pub use value::Value;

pub mod prelude {
    pub use crate::config::{FieldFilter, FormConfig};
    pub use crate::error::FormError;
    pub use crate::field::{FieldState, FieldView};
    pub use crate::form::{FieldReading, Form};
    pub use crate::input::{ControlChange, ControlKind, ControlTarget, Input};
    pub use crate::path::FieldPath;
    pub use crate::registry::AccessorKind;
    pub use crate::strategy::ErrorDisplayMode;
    pub use crate::suite::{Completion, Rule, RuleSuite, Suite, SuiteMode, ValidationSnapshot};
    pub use crate::value::{FileHandle, FileList, Value};
}
