//! Redaction of sensitive values before configuration is printed or logged.

use crate::export::EnvMap;

pub const FILTERED: &str = "[FILTERED]";

/// Replaces the value of every entry whose key names a sensitive field.
/// Keys are compared case-insensitively so shell-style names match too.
pub fn redact(mut map: EnvMap, sensitive: &[String]) -> EnvMap {
    for (key, value) in map.values_mut() {
        if sensitive.iter().any(|name| name.eq_ignore_ascii_case(key)) {
            *value = FILTERED.to_string();
        }
    }
    map
}
