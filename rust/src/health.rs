//! Status line reported by the health check.

use crate::config::{ConfigError, Configuration};

pub fn status_body(config: &Configuration) -> Result<String, ConfigError> {
    Ok(format!("VERSION: {}", config.version()?))
}
