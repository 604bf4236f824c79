//! Layered settings store.
//!
//! Resolution order, highest first: explicit overrides, environment
//! variables (when enabled), merged configuration documents, defaults.

use std::fs;
use std::path::Path;
use serde_json::{Map, Value as JsonValue};

use super::{ConfigSource, SettingsError};

#[derive(Debug, Clone)]
pub struct Settings {
    overrides: JsonValue,
    config: JsonValue,
    defaults: JsonValue,
    env_prefix: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overrides: JsonValue::Object(Map::new()),
            config: JsonValue::Object(Map::new()),
            defaults: JsonValue::Object(Map::new()),
            env_prefix: None,
        }
    }
}

impl Settings {
    /// Create an empty settings store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a YAML (or JSON) file.
    ///
    /// # Example
    /// ```ignore
    /// use natsmod::Settings;
    ///
    /// let settings = Settings::from_yaml_file("config/nats.yaml")?;
    /// ```
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let mut settings = Self::new();
        settings.merge_yaml_file(path)?;
        Ok(settings)
    }

    /// Merge a YAML file into the configuration layer
    pub fn merge_yaml_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let value = parse_yaml(&contents).map_err(|message| SettingsError::Parse {
            path: Some(path.to_path_buf()),
            message,
        })?;

        tracing::debug!("Loaded settings from {}", path.display());
        self.merge_value(value);
        Ok(())
    }

    /// Merge a YAML document into the configuration layer
    pub fn merge_yaml_str(&mut self, contents: &str) -> Result<(), SettingsError> {
        let value = parse_yaml(contents)
            .map_err(|message| SettingsError::Parse { path: None, message })?;
        self.merge_value(value);
        Ok(())
    }

    /// Deep-merge a value tree into the configuration layer.
    ///
    /// Objects merge key by key; anything else replaces what was there.
    pub fn merge_value(&mut self, value: JsonValue) {
        deep_merge(&mut self.config, normalize_keys(value));
    }

    /// Set an override, taking precedence over every other layer
    pub fn set(&mut self, key: &str, value: impl Into<JsonValue>) {
        insert_path(&mut self.overrides, key, value.into());
    }

    /// Set a default, used only when no other layer has the key
    pub fn set_default(&mut self, key: &str, value: impl Into<JsonValue>) {
        insert_path(&mut self.defaults, key, value.into());
    }

    /// Resolve keys from environment variables.
    ///
    /// `nats.tls.cert` is read from `<PREFIX>_NATS_TLS_CERT`, or `NATS_TLS_CERT`
    /// when the prefix is empty.
    pub fn automatic_env(&mut self, prefix: impl Into<String>) {
        self.env_prefix = Some(prefix.into());
    }

    fn env_key(&self, key: &str) -> Option<String> {
        let prefix = self.env_prefix.as_ref()?;
        let name = key.replace('.', "_").to_ascii_uppercase();
        if prefix.is_empty() {
            Some(name)
        } else {
            Some(format!("{}_{}", prefix.to_ascii_uppercase(), name))
        }
    }

    fn lookup_env(&self, key: &str) -> Option<JsonValue> {
        let name = self.env_key(key)?;
        std::env::var(name).ok().map(JsonValue::String)
    }

    fn env_has_prefix(&self, key: &str) -> bool {
        match self.env_key(key) {
            Some(name) => {
                let nested = format!("{}_", name);
                std::env::vars().any(|(k, _)| k == name || k.starts_with(&nested))
            }
            None => false,
        }
    }

    fn layers(&self) -> [&JsonValue; 3] {
        [&self.overrides, &self.config, &self.defaults]
    }
}

impl ConfigSource for Settings {
    fn lookup(&self, key: &str) -> Option<JsonValue> {
        let key = key.to_ascii_lowercase();

        if let Some(value) = get_path(&self.overrides, &key) {
            return Some(value.clone());
        }
        if let Some(value) = self.lookup_env(&key) {
            return Some(value);
        }
        [&self.config, &self.defaults]
            .into_iter()
            .find_map(|layer| get_path(layer, &key))
            .cloned()
    }

    fn is_set(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();

        self.layers().into_iter().any(|layer| get_path(layer, &key).is_some())
            || self.env_has_prefix(&key)
    }
}

fn parse_yaml(contents: &str) -> Result<JsonValue, String> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(contents)
        .map_err(|e| format!("Failed to parse YAML: {}", e))?;

    let value: JsonValue = serde_yaml::from_value(yaml)
        .map_err(|e| format!("Unsupported YAML value: {}", e))?;

    match value {
        JsonValue::Object(_) => Ok(value),
        JsonValue::Null => Ok(JsonValue::Object(Map::new())),
        other => Err(format!("Expected a mapping at the document root, found {}", other)),
    }
}

// Null leaves count as unset.
fn get_path<'a>(root: &'a JsonValue, key: &str) -> Option<&'a JsonValue> {
    let mut current = root;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        JsonValue::Null => None,
        value => Some(value),
    }
}

fn insert_path(root: &mut JsonValue, key: &str, value: JsonValue) {
    let key = key.to_ascii_lowercase();
    let mut segments = key.split('.').peekable();
    let mut current = root;

    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = JsonValue::Object(Map::new());
        }
        let map = match current.as_object_mut() {
            Some(map) => map,
            None => return,
        };

        if segments.peek().is_none() {
            map.insert(segment.to_string(), normalize_keys(value));
            return;
        }

        current = map
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
}

fn deep_merge(target: &mut JsonValue, source: JsonValue) {
    match (target, source) {
        (JsonValue::Object(target), JsonValue::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

fn normalize_keys(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), normalize_keys(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_settings_have_nothing_set() {
        let settings = Settings::new();
        assert!(!settings.is_set("nats"));
        assert_eq!(settings.lookup("nats.url"), None);
    }

    #[test]
    fn test_default_marks_parent_as_set() {
        let mut settings = Settings::new();
        settings.set_default("nats.url", "nats://localhost:4222");

        assert!(settings.is_set("nats"));
        assert!(settings.is_set("nats.url"));
        assert!(!settings.is_set("nats.tls"));
        assert_eq!(
            settings.get_string("nats.url").unwrap(),
            Some("nats://localhost:4222".to_string())
        );
    }

    #[test]
    fn test_layer_precedence() {
        let mut settings = Settings::new();
        settings.set_default("nats.name", "default");
        settings.merge_yaml_str("nats:\n  name: from-file\n").unwrap();
        assert_eq!(settings.get_string("nats.name").unwrap().as_deref(), Some("from-file"));

        settings.set("nats.name", "override");
        assert_eq!(settings.get_string("nats.name").unwrap().as_deref(), Some("override"));
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut settings = Settings::new();
        settings.merge_yaml_str("NATS:\n  Max_Reconnect: 5\n").unwrap();

        assert!(settings.is_set("nats"));
        assert_eq!(settings.get_int("nats.max_reconnect").unwrap(), Some(5));
        assert_eq!(settings.get_int("NATS.MAX_RECONNECT").unwrap(), Some(5));
    }

    #[test]
    fn test_deep_merge_keeps_siblings() {
        let mut settings = Settings::new();
        settings.merge_value(json!({"nats": {"url": "nats://a:4222", "tls": {"cert": "c.pem"}}}));
        settings.merge_value(json!({"nats": {"tls": {"key": "k.pem"}}}));

        assert_eq!(settings.get_string("nats.url").unwrap().as_deref(), Some("nats://a:4222"));
        assert_eq!(settings.get_string("nats.tls.cert").unwrap().as_deref(), Some("c.pem"));
        assert_eq!(settings.get_string("nats.tls.key").unwrap().as_deref(), Some("k.pem"));
    }

    #[test]
    fn test_null_leaf_is_unset() {
        let mut settings = Settings::new();
        settings.merge_yaml_str("nats:\n").unwrap();
        assert!(!settings.is_set("nats"));
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let mut settings = Settings::new();
        settings.set("nats.timeout", "whenever");

        let err = settings.get_duration("nats.timeout").unwrap_err();
        assert!(err.to_string().contains("nats.timeout"));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "nats:\n  ping_interval: 30s\n  servers:\n    - nats://a:4222").unwrap();

        let settings = Settings::from_yaml_file(file.path()).unwrap();
        assert_eq!(
            settings.get_duration("nats.ping_interval").unwrap(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            settings.get_string_list("nats.servers").unwrap(),
            Some(vec!["nats://a:4222".to_string()])
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Settings::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn test_non_mapping_document_is_rejected() {
        let mut settings = Settings::new();
        let err = settings.merge_yaml_str("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse { path: None, .. }));
    }

    #[test]
    fn test_automatic_env_lookup() {
        std::env::set_var("NATSMOD_STORE_TEST_NATS_USER", "alice");

        let mut settings = Settings::new();
        settings.automatic_env("natsmod_store_test");

        assert!(settings.is_set("nats"));
        assert_eq!(settings.get_string("nats.user").unwrap().as_deref(), Some("alice"));

        std::env::remove_var("NATSMOD_STORE_TEST_NATS_USER");
    }
}
