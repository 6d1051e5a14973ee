use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider-neutral content safety level.
///
/// Backends that support safety settings translate this into their own
/// thresholds; the others ignore it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyPolicy {
    /// Block anything with a low probability of harm or more.
    Strict,
    /// Block content with a medium probability of harm or more.
    #[default]
    Moderate,
    /// Do not block.
    Off,
}

impl fmt::Display for SafetyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyPolicy::Strict => write!(f, "strict"),
            SafetyPolicy::Moderate => write!(f, "moderate"),
            SafetyPolicy::Off => write!(f, "off"),
        }
    }
}

/// Error returned when parsing an invalid safety policy string.
#[derive(Debug)]
pub struct SafetyPolicyParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for SafetyPolicyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown safety policy: {} (expected strict, moderate, or off)",
            self.invalid_value
        )
    }
}

impl std::error::Error for SafetyPolicyParseError {}

impl FromStr for SafetyPolicy {
    type Err = SafetyPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" | "on" | "safe" => Ok(SafetyPolicy::Strict),
            "moderate" | "default" => Ok(SafetyPolicy::Moderate),
            "off" | "none" => Ok(SafetyPolicy::Off),
            _ => Err(SafetyPolicyParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}
