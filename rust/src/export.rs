//! Projection of configuration fields into environment variables.
//!
//! Only the fields listed in [`EnvVar::ALL`] ever leave the configuration.
//! The list is fixed at compile time; adding an export means adding a
//! variant here and its accessor in `Configuration::env_value`.

use std::fmt::Write as _;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A configuration field that may be exported to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvVar {
    MasterKey,
    TelemetryUrl,
    TelemetryToken,
    DeployEnv,
    Subdomain,
    ServiceName,
    Version,
    AppRegistryPath,
}

impl EnvVar {
    /// Export order.
    pub const ALL: [EnvVar; 8] = [
        EnvVar::MasterKey,
        EnvVar::TelemetryUrl,
        EnvVar::TelemetryToken,
        EnvVar::DeployEnv,
        EnvVar::Subdomain,
        EnvVar::ServiceName,
        EnvVar::Version,
        EnvVar::AppRegistryPath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvVar::MasterKey => "master_key",
            EnvVar::TelemetryUrl => "telemetry_url",
            EnvVar::TelemetryToken => "telemetry_token",
            EnvVar::DeployEnv => "deploy_env",
            EnvVar::Subdomain => "subdomain",
            EnvVar::ServiceName => "service_name",
            EnvVar::Version => "version",
            EnvVar::AppRegistryPath => "app_registry_path",
        }
    }
}

/// Ordered name to value mapping produced by `Configuration::env`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvMap {
    entries: Vec<(String, String)>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, replacing the value of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same entries with every key upper-cased. Values are untouched.
    pub fn upcase_keys(&self) -> EnvMap {
        EnvMap {
            entries: self
                .entries
                .iter()
                .map(|(key, value)| (key.to_uppercase(), value.clone()))
                .collect(),
        }
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = (&str, &mut String)> {
        self.entries.iter_mut().map(|(key, value)| (key.as_str(), value))
    }

    /// `KEY=value` lines, one per entry, as read by dotenv loaders.
    pub fn to_dotenv(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            let _ = writeln!(out, "{key}={}", dotenv_quote(value));
        }
        out
    }

    /// `export KEY='value'` lines suitable for `eval` in a POSIX shell.
    pub fn to_shell_exports(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter() {
            let _ = writeln!(out, "export {key}={}", shell_quote(value));
        }
        out
    }
}

impl IntoIterator for EnvMap {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, String)> for EnvMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = EnvMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for EnvMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

// Single-quoted values are literal to dotenv loaders and docker compose.
// The double-quoted form escapes `$` so nothing is expanded.
fn dotenv_quote(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@+,".contains(c));
    if plain && !value.is_empty() {
        return value.to_string();
    }
    if !value.contains(['\'', '\n']) {
        return format!("'{value}'");
    }
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnvMap {
        let mut map = EnvMap::new();
        map.insert("deploy_env", "staging");
        map.insert("service_name", "billingportal");
        map
    }

    #[test]
    fn export_names_are_snake_case_and_unique() {
        let names: Vec<&str> = EnvVar::ALL.iter().map(EnvVar::as_str).collect();
        assert_eq!(names.first(), Some(&"master_key"));
        assert_eq!(names.last(), Some(&"app_registry_path"));
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
    }

    #[test]
    fn upcase_keeps_order_and_values() {
        let upper = sample().upcase_keys();
        let pairs: Vec<(&str, &str)> = upper.iter().collect();
        assert_eq!(pairs, vec![("DEPLOY_ENV", "staging"), ("SERVICE_NAME", "billingportal")]);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut map = sample();
        map.insert("deploy_env", "production");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("deploy_env"), Some("production"));
    }

    #[test]
    fn shell_exports_escape_single_quotes() {
        let mut map = EnvMap::new();
        map.insert("TOKEN", "it's");
        assert_eq!(map.to_shell_exports(), "export TOKEN='it'\\''s'\n");
    }

    #[test]
    fn dotenv_quotes_only_when_needed() {
        let mut map = EnvMap::new();
        map.insert("A", "hub.docker.com/billing");
        map.insert("B", "two words");
        assert_eq!(map.to_dotenv(), "A=hub.docker.com/billing\nB='two words'\n");
    }

    #[test]
    fn dotenv_quotes_dollar() {
        let mut map = EnvMap::new();
        map.insert("PASSWORD", "pa$word");
        map.insert("TOKEN", "it's $HOME");
        assert_eq!(map.to_dotenv(), "PASSWORD='pa$word'\nTOKEN=\"it's \\$HOME\"\n");
    }

    #[test]
    fn serializes_as_ordered_object() {
        let json = serde_json::to_string(&sample()).expect("serialize");
        assert_eq!(json, r#"{"deploy_env":"staging","service_name":"billingportal"}"#);
    }
}
