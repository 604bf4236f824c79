//! Configuration sources.
//!
//! The NATS constructors never read files or the environment themselves. They
//! receive a [`ConfigSource`], which resolves dotted keys (`nats.tls.cert`) and
//! coerces the raw values into the scalar types the options record needs.
//! [`Settings`] is the layered implementation used by the binary and tests.

mod store;

pub use store::Settings;

use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Error type for configuration lookups and loading
#[derive(Debug)]
pub enum SettingsError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
    InvalidValue {
        key: String,
        expected: &'static str,
        found: String,
    },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io { path, source } => {
                write!(f, "Failed to read config file {}: {}", path.display(), source)
            }
            SettingsError::Parse { path: Some(path), message } => {
                write!(f, "Failed to parse config file {}: {}", path.display(), message)
            }
            SettingsError::Parse { path: None, message } => {
                write!(f, "Failed to parse config: {}", message)
            }
            SettingsError::InvalidValue { key, expected, found } => {
                write!(f, "Invalid value for '{}': expected {}, found {}", key, expected, found)
            }
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A key/value configuration namespace.
///
/// Implementors only provide raw lookup and the "is this key set" predicate;
/// the typed getters are shared so every source coerces values the same way.
/// A typed getter returns `Ok(None)` when the key is absent and an error when
/// the key is present but cannot be coerced.
pub trait ConfigSource {
    /// Resolve a dotted key to its raw value.
    fn lookup(&self, key: &str) -> Option<JsonValue>;

    /// True if the key, or any key nested below it, has a value.
    fn is_set(&self, key: &str) -> bool;

    fn get_string(&self, key: &str) -> Result<Option<String>, SettingsError> {
        match self.lookup(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => coerce_string(&value)
                .map(Some)
                .ok_or_else(|| invalid(key, "string", &value)),
        }
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        match self.lookup(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => coerce_bool(&value)
                .map(Some)
                .ok_or_else(|| invalid(key, "boolean", &value)),
        }
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, SettingsError> {
        match self.lookup(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => coerce_int(&value)
                .map(Some)
                .ok_or_else(|| invalid(key, "integer", &value)),
        }
    }

    fn get_duration(&self, key: &str) -> Result<Option<Duration>, SettingsError> {
        match self.lookup(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => coerce_duration(&value)
                .map(Some)
                .ok_or_else(|| invalid(key, "duration", &value)),
        }
    }

    fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>, SettingsError> {
        match self.lookup(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => coerce_string_list(&value)
                .map(Some)
                .ok_or_else(|| invalid(key, "list of strings", &value)),
        }
    }
}

fn invalid(key: &str, expected: &'static str, found: &JsonValue) -> SettingsError {
    SettingsError::InvalidValue {
        key: key.to_string(),
        expected,
        found: found.to_string(),
    }
}

fn coerce_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "y" | "on" => Some(true),
            "0" | "f" | "false" | "no" | "n" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_int(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        JsonValue::Bool(b) => Some(i64::from(*b)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

// Bare integers are nanoseconds; strings may also carry units ("2s", "1m 30s").
fn coerce_duration(value: &JsonValue) -> Option<Duration> {
    match value {
        JsonValue::Number(n) => n.as_u64().map(Duration::from_nanos),
        JsonValue::String(s) => {
            let s = s.trim();
            match s.parse::<u64>() {
                Ok(nanos) => Some(Duration::from_nanos(nanos)),
                Err(_) => humantime::parse_duration(s).ok(),
            }
        }
        _ => None,
    }
}

fn coerce_string_list(value: &JsonValue) -> Option<Vec<String>> {
    match value {
        JsonValue::Array(items) => items.iter().map(coerce_string).collect(),
        JsonValue::String(s) => Some(s.split_whitespace().map(str::to_string).collect()),
        _ => None,
    }
}
