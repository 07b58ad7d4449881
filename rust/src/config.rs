//! Deployment configuration store.
//!
//! A `Configuration` is built once at the entry point from the host
//! environment, optionally layered with a settings file, and passed by
//! reference to whatever needs it. Applying a profile returns a new value;
//! the receiver is left as it was.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::credentials::{CredentialStore, CredentialsError, CredentialsOptions, SecureCredentials};
use crate::export::{EnvMap, EnvVar};
use crate::host::HostEnvironment;
use crate::profile::{Profile, ProfileTable};
use crate::settings::Settings;

pub const DEFAULT_VERSION: &str = "0.1.0";
pub const VERSION_FILENAME: &str = ".version";
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_REGISTRY_PATH: &str = "hub.docker.com";
/// Field name of the master key, always reported as sensitive.
pub const MASTER_KEY_FIELD: &str = "master_key";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("version file {} unreadable: {reason}", .path.display())]
    Version { path: PathBuf, reason: String },
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub route_path: String,
    pub registry_path: String,
    pub app_name: String,
    pub service_name: String,
    pub registry_project_name: String,
    pub docker_user_config_path: String,
    pub master_key: Option<String>,
    pub deploy_env: String,
    pub manager_node: Option<String>,
    pub manager_user: Option<String>,
    pub subdomain: Option<String>,
    pub telemetry_url: Option<String>,
    pub telemetry_token: Option<String>,
    /// Explicit registry path; when unset it is derived from registry and project.
    pub app_registry_path: Option<String>,
    pub version_file: PathBuf,
    profiles: ProfileTable,
    applied_profile: Option<String>,
    // Shared between a configuration and the copies `for_profile` makes, so
    // the version file is read at most once per lineage.
    version: Arc<OnceLock<String>>,
    credentials: Arc<dyn CredentialStore>,
}

impl Configuration {
    pub fn new(host: &HostEnvironment) -> Self {
        let app_name = host.app_name();
        Self {
            route_path: DEFAULT_ROUTE_PATH.to_string(),
            registry_path: DEFAULT_REGISTRY_PATH.to_string(),
            service_name: app_name.replace('_', ""),
            registry_project_name: app_name.clone(),
            app_name,
            docker_user_config_path: format!("{}/.docker/config.json", host.home),
            master_key: host.master_key.clone(),
            deploy_env: host.deploy_env.clone(),
            manager_node: None,
            manager_user: None,
            subdomain: None,
            telemetry_url: None,
            telemetry_token: None,
            app_registry_path: None,
            version_file: PathBuf::from(VERSION_FILENAME),
            profiles: ProfileTable::builtin(),
            applied_profile: None,
            version: Arc::new(OnceLock::new()),
            credentials: Arc::new(SecureCredentials::new(CredentialsOptions::for_host(host))),
        }
    }

    /// Replaces the credential backend consulted by `secrets_to_filter`.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Layers a settings file over the current values.
    pub fn configure(mut self, settings: &Settings) -> Self {
        fn take(slot: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        fn take_opt(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }

        take(&mut self.route_path, &settings.route_path);
        take(&mut self.registry_path, &settings.registry_path);
        take(&mut self.app_name, &settings.app_name);
        take(&mut self.service_name, &settings.service_name);
        take(&mut self.registry_project_name, &settings.registry_project_name);
        take(&mut self.docker_user_config_path, &settings.docker_user_config_path);
        take(&mut self.deploy_env, &settings.deploy_env);
        take_opt(&mut self.app_registry_path, &settings.app_registry_path);
        take_opt(&mut self.manager_node, &settings.manager_node);
        take_opt(&mut self.manager_user, &settings.manager_user);
        take_opt(&mut self.subdomain, &settings.subdomain);
        take_opt(&mut self.telemetry_url, &settings.telemetry_url);
        take_opt(&mut self.telemetry_token, &settings.telemetry_token);
        if let Some(path) = &settings.version_file {
            self.version_file = path.clone();
        }
        for entry in &settings.profiles {
            self.profiles.insert(&entry.name, entry.profile.clone());
        }
        self
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Name of the profile this configuration was derived with, if any.
    pub fn profile(&self) -> Option<&str> {
        self.applied_profile.as_deref()
    }

    /// Returns a copy with the named profile's overrides applied.
    ///
    /// Lookup ignores case. An unknown name yields an unchanged copy.
    pub fn for_profile(&self, name: &str) -> Configuration {
        let mut merged = self.clone();
        match self.profiles.get(name) {
            Some(profile) => {
                debug!(profile = name, deploy_env = %profile.deploy_env, "applying profile");
                merged.apply(profile);
                merged.applied_profile = Some(name.trim().to_lowercase());
            }
            None => debug!(profile = name, "unknown profile, configuration left as is"),
        }
        merged
    }

    fn apply(&mut self, profile: &Profile) {
        self.manager_node = Some(profile.manager_node.clone());
        self.manager_user = Some(profile.manager_user.clone());
        self.subdomain = Some(profile.subdomain.clone());
        self.deploy_env = profile.deploy_env.clone();
    }

    pub fn app_registry_path(&self) -> String {
        match &self.app_registry_path {
            Some(explicit) => explicit.clone(),
            None => format!("{}/{}", self.registry_path, self.registry_project_name),
        }
    }

    /// Application version: first line of the version file, trimmed, or
    /// `DEFAULT_VERSION` when the file does not exist. Read once and cached;
    /// any other read failure is returned and nothing is cached.
    pub fn version(&self) -> Result<&str, ConfigError> {
        if let Some(cached) = self.version.get() {
            return Ok(cached);
        }
        let read = read_version(&self.version_file)?;
        Ok(self.version.get_or_init(|| read))
    }

    /// Credential names plus the master key field, for callers that redact
    /// logged output. Errors from the credential store are passed through.
    pub fn secrets_to_filter(&self) -> Result<Vec<String>, CredentialsError> {
        let mut names = self.credentials.secret_names()?;
        if !names.iter().any(|name| name == MASTER_KEY_FIELD) {
            names.push(MASTER_KEY_FIELD.to_string());
        }
        Ok(names)
    }

    /// Names of the fields exported to the shell, in export order.
    pub fn env_variables(&self) -> Vec<&'static str> {
        EnvVar::ALL.iter().map(EnvVar::as_str).collect()
    }

    pub fn env_value(&self, var: EnvVar) -> Result<Option<String>, ConfigError> {
        let value = match var {
            EnvVar::MasterKey => self.master_key.clone(),
            EnvVar::TelemetryUrl => self.telemetry_url.clone(),
            EnvVar::TelemetryToken => self.telemetry_token.clone(),
            EnvVar::DeployEnv => Some(self.deploy_env.clone()),
            EnvVar::Subdomain => self.subdomain.clone(),
            EnvVar::ServiceName => Some(self.service_name.clone()),
            EnvVar::Version => Some(self.version()?.to_string()),
            EnvVar::AppRegistryPath => Some(self.app_registry_path()),
        };
        Ok(value)
    }

    /// Exported fields that have a value, keyed by field name.
    pub fn env(&self) -> Result<EnvMap, ConfigError> {
        let mut env = EnvMap::new();
        for var in EnvVar::ALL {
            if let Some(value) = self.env_value(var)? {
                env.insert(var.as_str(), value);
            }
        }
        Ok(env)
    }

    /// `env` with upper-cased keys, ready for a subprocess environment.
    pub fn shell_env(&self) -> Result<EnvMap, ConfigError> {
        Ok(self.env()?.upcase_keys())
    }
}

fn read_version(path: &Path) -> Result<String, ConfigError> {
    let version_err = |e: std::io::Error| ConfigError::Version {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    };
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no version file, using default");
            return Ok(DEFAULT_VERSION.to_string());
        }
        Err(e) => return Err(version_err(e)),
    };

    // Only the first line matters; later bytes are never decoded.
    let mut first_line = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut first_line)
        .map_err(version_err)?;
    let line = String::from_utf8(first_line).map_err(|e| ConfigError::Version {
        path: path.to_path_buf(),
        reason: format!("first line is not UTF-8: {e}"),
    })?;

    let version = line.trim();
    if version.is_empty() {
        warn!(path = %path.display(), "version file has an empty first line, using default");
        return Ok(DEFAULT_VERSION.to_string());
    }
    debug!(path = %path.display(), version, "version read");
    Ok(version.to_string())
}
