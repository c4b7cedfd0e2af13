//! When to reveal validation messages to the user.
//!
//! Errors and warnings follow different policies. Errors are gated by the
//! configured [`ErrorDisplayMode`]. Warnings are advisory and show up as soon
//! as a field has been evaluated, has no blocking errors and is not waiting
//! on async work.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormError;

/// Error visibility policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorDisplayMode {
    /// Show errors as soon as the field has been evaluated.
    Immediate,
    /// Show errors once the field was touched or the form was submitted.
    #[default]
    OnTouch,
    /// Show errors of evaluated fields only after a submit attempt.
    OnSubmit,
    /// Never show errors automatically.
    Manual,
}

impl ErrorDisplayMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnTouch => "on-touch",
            Self::OnSubmit => "on-submit",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ErrorDisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorDisplayMode {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "on-touch" => Ok(Self::OnTouch),
            "on-submit" => Ok(Self::OnSubmit),
            "manual" => Ok(Self::Manual),
            other => Err(FormError::InvalidConfig {
                reason: format!("unknown error display mode `{other}`"),
            }),
        }
    }
}

/// Everything the display policy looks at for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayInputs {
    pub has_errors: bool,
    pub has_warnings: bool,
    pub tested: bool,
    pub touched: bool,
    pub submitted: bool,
    pub pending: bool,
}

/// Whether a field's errors should be visible right now.
#[must_use]
pub fn should_show_errors(mode: ErrorDisplayMode, inputs: DisplayInputs) -> bool {
    match mode {
        ErrorDisplayMode::Immediate => inputs.tested && inputs.has_errors,
        ErrorDisplayMode::OnTouch => (inputs.touched || inputs.submitted) && inputs.has_errors,
        ErrorDisplayMode::OnSubmit => inputs.submitted && inputs.tested && inputs.has_errors,
        ErrorDisplayMode::Manual => false,
    }
}

/// Whether a field's warnings should be visible right now.
#[must_use]
pub fn should_show_warnings(inputs: DisplayInputs) -> bool {
    inputs.has_warnings && !inputs.has_errors && inputs.tested && !inputs.pending
}
