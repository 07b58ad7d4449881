//! Optional JSON settings file layered over the built-in defaults.
//!
//! Every field is optional; absent fields keep the default. Profiles listed
//! here are added to the profile table, replacing built-ins of the same name.
//! Secrets do not belong in this file: the master key comes from the
//! environment and everything else sensitive from the credentials file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::credentials::CredentialsOptions;
use crate::host::HostEnvironment;
use crate::profile::Profile;

pub const SETTINGS_VAR: &str = "HARBOR_PILOT_SETTINGS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file {} unreadable: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },
    #[error("settings parse failed: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedProfile {
    pub name: String,
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub route_path: Option<String>,
    pub registry_path: Option<String>,
    pub app_name: Option<String>,
    pub service_name: Option<String>,
    pub registry_project_name: Option<String>,
    pub app_registry_path: Option<String>,
    pub docker_user_config_path: Option<String>,
    pub deploy_env: Option<String>,
    pub manager_node: Option<String>,
    pub manager_user: Option<String>,
    pub subdomain: Option<String>,
    pub telemetry_url: Option<String>,
    pub telemetry_token: Option<String>,
    pub version_file: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub profiles: Vec<NamedProfile>,
}

impl Settings {
    /// Credential locations for `host`, with any paths this file overrides.
    pub fn credentials_options(&self, host: &HostEnvironment) -> CredentialsOptions {
        let mut options = CredentialsOptions::for_host(host);
        if let Some(path) = &self.credentials_path {
            options.config_path = path.clone();
        }
        if let Some(path) = &self.key_path {
            options.key_path = path.clone();
        }
        options
    }
}

/// Reads and parses a settings file.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| SettingsError::Io {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    })?;
    let settings: Settings =
        serde_json::from_str(&raw).map_err(|e| SettingsError::Parse(format!("{e}")))?;
    info!(path = %path.display(), profiles = settings.profiles.len(), "settings loaded");
    Ok(settings)
}
