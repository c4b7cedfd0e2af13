//! Form configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FormError, Result};
use crate::path::{self, FieldPath};
use crate::strategy::ErrorDisplayMode;

// ---------------------------------------------------------------------------
// FormConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Form`](crate::Form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Label attached to log events.
    pub name: String,
    /// When field errors become visible.
    pub error_display: ErrorDisplayMode,
    /// Delay in milliseconds between a value write and its validation run.
    /// `0` validates synchronously.
    pub debounce: u64,
    /// Which paths get registry accessors.
    pub fields: FieldFilter,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            name: "form".to_owned(),
            error_display: ErrorDisplayMode::default(),
            debounce: 0,
            fields: FieldFilter::default(),
        }
    }
}

impl FormConfig {
    /// Validate form configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FormError::InvalidConfig {
                reason: "name cannot be empty".to_owned(),
            });
        }
        self.fields.validate()
    }

    #[must_use]
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce)
    }
}

// ---------------------------------------------------------------------------
// FieldFilter
// ---------------------------------------------------------------------------

/// Allow and deny lists of path patterns.
///
/// A pattern is either an exact path (`profile.name`) or a prefix wildcard
/// (`profile.*`) matching every path strictly below the prefix. Deny wins
/// over allow, and an empty allow list allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl FieldFilter {
    #[must_use]
    pub fn allows(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| pattern_matches(p, path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| pattern_matches(p, path))
    }

    pub fn validate(&self) -> Result<()> {
        for pattern in self.include.iter().chain(&self.exclude) {
            let exact = pattern.strip_suffix(".*").unwrap_or(pattern);
            if exact.contains('*') {
                return Err(FormError::InvalidConfig {
                    reason: format!("pattern `{pattern}`: `*` is only allowed as a trailing `.*`"),
                });
            }
            FieldPath::parse(exact).map_err(|err| FormError::InvalidConfig {
                reason: format!("pattern `{pattern}`: {err}"),
            })?;
        }
        Ok(())
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix(".*") {
        Some(prefix) => path != prefix && path::is_within(path, prefix),
        None => pattern == path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filter(include: &[&str], exclude: &[&str]) -> FieldFilter {
        FieldFilter {
            include: include.iter().map(|s| (*s).to_owned()).collect(),
            exclude: exclude.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn empty_filter_allows_everything() {
        assert!(FieldFilter::default().allows("anything.at.all"));
    }

    #[test]
    fn wildcard_matches_descendants_only() {
        let f = filter(&["profile.*"], &[]);
        assert!(f.allows("profile.name"));
        assert!(f.allows("profile.address.city"));
        assert!(!f.allows("profile"));
        assert!(!f.allows("profiles.name"));
    }

    #[test]
    fn deny_wins_over_allow() {
        let f = filter(&["profile.*"], &["profile.secret"]);
        assert!(f.allows("profile.name"));
        assert!(!f.allows("profile.secret"));
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(filter(&["a.*.b"], &[]).validate().is_err());
        assert!(filter(&[], &["a..b"]).validate().is_err());
        assert!(filter(&["a.*"], &["b", "c[0]"]).validate().is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: FormConfig =
            serde_json::from_str(r#"{"error_display": "on-submit", "debounce": 250}"#).unwrap();
        assert_eq!(config.name, "form");
        assert_eq!(config.error_display, ErrorDisplayMode::OnSubmit);
        assert_eq!(config.debounce_duration(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_name_is_invalid() {
        let config = FormConfig {
            name: " ".into(),
            ..FormConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().code(), "FORM_INVALID_CONFIG");
    }
}
