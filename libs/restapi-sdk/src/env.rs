//! Prefixed environment lookups.

/// Variable holding the optional prefix prepended to every lookup.
pub const ENV_PREFIX: &str = "ENV_PREFIX";

/// An environment value; `"true"` and `"false"` are read as booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Bool(bool),
    Str(String),
}

impl EnvValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Bool(_) => None,
        }
    }

    /// `true` for `Bool(true)` and for strings that are non-empty and not `"0"`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty() && s != "0",
        }
    }
}

/// Current value of `ENV_PREFIX`, empty when unset.
#[must_use]
pub fn prefix() -> String {
    std::env::var(ENV_PREFIX).unwrap_or_default()
}

/// Full variable name for `name`: prefix + upper-cased name with `.` as `_`.
#[must_use]
pub fn var_name(name: &str) -> String {
    format!("{}{}", prefix(), name.replace('.', "_").to_uppercase())
}

/// Look up `name` (dots allowed, e.g. `restapi.region`).
#[must_use]
pub fn get(name: &str) -> Option<EnvValue> {
    let value = std::env::var(var_name(name)).ok()?;
    Some(match value.as_str() {
        "true" => EnvValue::Bool(true),
        "false" => EnvValue::Bool(false),
        _ => EnvValue::Str(value),
    })
}
