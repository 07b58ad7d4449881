//! Process inputs the configuration is derived from. They are captured once at
//! the entry point and handed to `Configuration::new`, so nothing below reads
//! the process environment on its own.

use std::env;

pub const MASTER_KEY_VAR: &str = "HARBOR_PILOT_MASTER_KEY";
pub const APP_NAME_VAR: &str = "HARBOR_PILOT_APP_NAME";
pub const DEPLOY_ENV_VAR: &str = "HARBOR_PILOT_ENV";

pub const DEFAULT_ENGINE_NAME: &str = "harbor_pilot_application";
pub const DEFAULT_DEPLOY_ENV: &str = "development";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Engine name of the host application, e.g. `billing_application`.
    pub engine_name: String,
    /// Environment the host application is running in.
    pub deploy_env: String,
    pub home: String,
    pub master_key: Option<String>,
}

impl HostEnvironment {
    pub fn from_env() -> Self {
        Self {
            engine_name: env::var(APP_NAME_VAR).unwrap_or_else(|_| DEFAULT_ENGINE_NAME.to_string()),
            deploy_env: env::var(DEPLOY_ENV_VAR).unwrap_or_else(|_| DEFAULT_DEPLOY_ENV.to_string()),
            home: env::var("HOME").unwrap_or_default(),
            master_key: non_blank(env::var(MASTER_KEY_VAR).ok()),
        }
    }

    /// Application name with the `_application` suffix token removed.
    pub fn app_name(&self) -> String {
        self.engine_name.replace("_application", "")
    }
}

/// An exported but empty variable counts as unset.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(engine_name: &str) -> HostEnvironment {
        HostEnvironment {
            engine_name: engine_name.to_string(),
            deploy_env: "test".to_string(),
            home: "/home/deploy".to_string(),
            master_key: None,
        }
    }

    #[test]
    fn strips_application_token() {
        assert_eq!(host("billing_portal_application").app_name(), "billing_portal");
        assert_eq!(host("billing").app_name(), "billing");
    }

    #[test]
    fn blank_master_key_is_absent() {
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank(Some("  \n".to_string())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("a2V5".to_string())), Some("a2V5".to_string()));
    }
}
