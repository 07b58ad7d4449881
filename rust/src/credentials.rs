//! Encrypted credentials file. Each entry is sealed individually with the
//! master key and the whole mapping is decrypted once, on first access, then
//! kept in memory for the life of the store.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::crypto::secrets::{EncryptedSecret, SecretVault, SecretVaultError};
use crate::host::{HostEnvironment, MASTER_KEY_VAR};

pub const DEFAULT_CREDENTIALS_PATH: &str = "config/credentials.json.enc";
pub const DEFAULT_KEY_PATH: &str = "config/master.key";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credentials file {} unreadable: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },
    #[error("credentials file {} malformed: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("missing master key; set {env_key} or create {}", .key_path.display())]
    MissingKey { env_key: String, key_path: PathBuf },
    #[error("credential '{name}': {source}")]
    Vault {
        name: String,
        #[source]
        source: SecretVaultError,
    },
    #[error("master key rejected: {0}")]
    InvalidKey(#[source] SecretVaultError),
    #[error("credential '{0}' is not valid UTF-8")]
    Utf8(String),
}

/// Read access the configuration needs from a credential backend.
pub trait CredentialStore: fmt::Debug + Send + Sync {
    /// Names of every stored credential.
    fn secret_names(&self) -> Result<Vec<String>, CredentialsError>;
}

/// Where the credentials live and how to find the key that opens them.
#[derive(Debug, Clone)]
pub struct CredentialsOptions {
    pub config_path: PathBuf,
    pub key_path: PathBuf,
    /// Master key taken from the environment; wins over `key_path`.
    pub master_key: Option<String>,
    /// When false a missing key yields an empty store instead of an error.
    pub raise_if_missing_key: bool,
}

impl Default for CredentialsOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            master_key: None,
            raise_if_missing_key: true,
        }
    }
}

impl CredentialsOptions {
    pub fn for_host(host: &HostEnvironment) -> Self {
        Self {
            master_key: host.master_key.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct SecureCredentials {
    options: CredentialsOptions,
    decrypted: OnceLock<BTreeMap<String, String>>,
}

impl SecureCredentials {
    pub fn new(options: CredentialsOptions) -> Self {
        Self {
            options,
            decrypted: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.options.config_path
    }

    /// The decrypted credential mapping. Read and decrypted on first call only.
    pub fn config(&self) -> Result<&BTreeMap<String, String>, CredentialsError> {
        if let Some(cached) = self.decrypted.get() {
            return Ok(cached);
        }
        let loaded = self.read()?;
        Ok(self.decrypted.get_or_init(|| loaded))
    }

    pub fn get(&self, name: &str) -> Result<Option<&str>, CredentialsError> {
        Ok(self.config()?.get(name).map(String::as_str))
    }

    /// Stores a credential in memory. Call `save` to persist it.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), CredentialsError> {
        self.edit(|map| {
            map.insert(name.to_string(), value.to_string());
        })
    }

    /// Drops a credential in memory, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> Result<bool, CredentialsError> {
        self.edit(|map| map.remove(name).is_some())
    }

    /// Re-encrypts every credential and replaces the file on disk.
    pub fn save(&self) -> Result<(), CredentialsError> {
        let vault = self.vault()?.ok_or_else(|| self.missing_key())?;
        let mut sealed = BTreeMap::new();
        for (name, value) in self.config()? {
            let envelope = vault
                .encrypt_secret(value.as_bytes())
                .map_err(|source| CredentialsError::Vault { name: name.clone(), source })?;
            sealed.insert(name.clone(), envelope);
        }

        let path = &self.options.config_path;
        let body = serde_json::to_vec_pretty(&sealed).map_err(|e| CredentialsError::Parse {
            path: path.clone(),
            reason: format!("{e}"),
        })?;
        write_atomically(path, &body)?;
        info!(path = %path.display(), count = sealed.len(), "credentials saved");
        Ok(())
    }

    fn edit<R>(&mut self, f: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> Result<R, CredentialsError> {
        let mut map = match self.decrypted.take() {
            Some(map) => map,
            None => self.read()?,
        };
        let out = f(&mut map);
        self.decrypted = OnceLock::from(map);
        Ok(out)
    }

    fn read(&self) -> Result<BTreeMap<String, String>, CredentialsError> {
        let path = &self.options.config_path;
        if !path.exists() {
            debug!(path = %path.display(), "no credentials file, starting empty");
            return Ok(BTreeMap::new());
        }

        let Some(vault) = self.vault()? else {
            if self.options.raise_if_missing_key {
                return Err(self.missing_key());
            }
            debug!("no master key available, treating credentials as empty");
            return Ok(BTreeMap::new());
        };

        let raw = fs::read_to_string(path).map_err(|e| CredentialsError::Io {
            path: path.clone(),
            reason: format!("{e}"),
        })?;
        let sealed: BTreeMap<String, EncryptedSecret> =
            serde_json::from_str(&raw).map_err(|e| CredentialsError::Parse {
                path: path.clone(),
                reason: format!("{e}"),
            })?;

        let mut opened = BTreeMap::new();
        for (name, envelope) in sealed {
            let bytes = vault
                .decrypt_secret(&envelope)
                .map_err(|source| CredentialsError::Vault { name: name.clone(), source })?;
            let value = String::from_utf8(bytes).map_err(|_| CredentialsError::Utf8(name.clone()))?;
            opened.insert(name, value);
        }
        debug!(path = %path.display(), count = opened.len(), "credentials decrypted");
        Ok(opened)
    }

    fn vault(&self) -> Result<Option<SecretVault>, CredentialsError> {
        if let Some(key) = self.options.master_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return SecretVault::from_base64(key)
                .map(Some)
                .map_err(CredentialsError::InvalidKey);
        }
        if self.options.key_path.exists() {
            return SecretVault::from_key_file(&self.options.key_path)
                .map(Some)
                .map_err(CredentialsError::InvalidKey);
        }
        Ok(None)
    }

    fn missing_key(&self) -> CredentialsError {
        CredentialsError::MissingKey {
            env_key: MASTER_KEY_VAR.to_string(),
            key_path: self.options.key_path.clone(),
        }
    }
}

impl CredentialStore for SecureCredentials {
    fn secret_names(&self) -> Result<Vec<String>, CredentialsError> {
        Ok(self.config()?.keys().cloned().collect())
    }
}

/// In-memory store, for callers that source credentials elsewhere.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    names: Vec<String>,
}

impl StaticCredentials {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl CredentialStore for StaticCredentials {
    fn secret_names(&self) -> Result<Vec<String>, CredentialsError> {
        Ok(self.names.clone())
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<(), CredentialsError> {
    let io_err = |e: std::io::Error| CredentialsError::Io {
        path: path.to_path_buf(),
        reason: format!("{e}"),
    };
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(io_err)?;
            parent
        }
        None => Path::new("."),
    };
    // Unique staging file in the target directory; dropped (and removed) on any error.
    let mut staging = NamedTempFile::new_in(dir).map_err(io_err)?;
    staging.write_all(body).map_err(io_err)?;
    staging.as_file().sync_all().map_err(io_err)?;
    staging.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &TempDir, master_key: Option<String>) -> CredentialsOptions {
        CredentialsOptions {
            config_path: dir.path().join("config/credentials.json.enc"),
            key_path: dir.path().join("config/master.key"),
            master_key,
            raise_if_missing_key: true,
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = TempDir::new().expect("temp dir");
        let creds = SecureCredentials::new(options(&dir, None));
        assert!(creds.config().expect("empty store").is_empty());
        assert!(creds.secret_names().expect("names").is_empty());
    }

    #[test]
    fn saves_and_reloads_with_env_key() {
        let dir = TempDir::new().expect("temp dir");
        let key = SecretVault::generate_key();

        let mut creds = SecureCredentials::new(options(&dir, Some(key.clone())));
        creds.set("registry_password", "hunter2").expect("set");
        creds.set("telemetry_token", "tok-123").expect("set");
        creds.save().expect("save");

        let on_disk = fs::read_to_string(dir.path().join("config/credentials.json.enc")).expect("read");
        assert!(!on_disk.contains("hunter2"));

        let reloaded = SecureCredentials::new(options(&dir, Some(key)));
        assert_eq!(reloaded.get("registry_password").expect("get"), Some("hunter2"));
        assert_eq!(
            reloaded.secret_names().expect("names"),
            vec!["registry_password".to_string(), "telemetry_token".to_string()]
        );
    }

    #[test]
    fn falls_back_to_key_file() {
        let dir = TempDir::new().expect("temp dir");
        let key = SecretVault::generate_key();
        fs::create_dir_all(dir.path().join("config")).expect("mkdir");
        fs::write(dir.path().join("config/master.key"), format!("{key}\n")).expect("write key");

        let mut creds = SecureCredentials::new(options(&dir, None));
        creds.set("smtp_password", "s3cret").expect("set");
        creds.save().expect("save");

        let reloaded = SecureCredentials::new(options(&dir, Some(key)));
        assert_eq!(reloaded.get("smtp_password").expect("get"), Some("s3cret"));
    }

    #[test]
    fn missing_key_is_an_error_when_file_exists() {
        let dir = TempDir::new().expect("temp dir");
        let mut creds = SecureCredentials::new(options(&dir, Some(SecretVault::generate_key())));
        creds.set("a", "b").expect("set");
        creds.save().expect("save");

        let keyless = SecureCredentials::new(options(&dir, None));
        match keyless.config() {
            Err(CredentialsError::MissingKey { env_key, .. }) => assert_eq!(env_key, MASTER_KEY_VAR),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut lenient = options(&dir, None);
        lenient.raise_if_missing_key = false;
        assert!(SecureCredentials::new(lenient).config().expect("lenient").is_empty());
    }

    #[test]
    fn wrong_key_propagates_vault_error() {
        let dir = TempDir::new().expect("temp dir");
        let mut creds = SecureCredentials::new(options(&dir, Some(SecretVault::generate_key())));
        creds.set("api_key", "abc").expect("set");
        creds.save().expect("save");

        let other = SecureCredentials::new(options(&dir, Some(SecretVault::generate_key())));
        let err = other.config().unwrap_err();
        assert!(matches!(err, CredentialsError::Vault { ref name, .. } if name == "api_key"));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = TempDir::new().expect("temp dir");
        let mut creds = SecureCredentials::new(options(&dir, Some(SecretVault::generate_key())));
        creds.set("a", "1").expect("set");
        assert!(creds.remove("a").expect("remove"));
        assert!(!creds.remove("a").expect("remove"));
    }

    #[test]
    fn save_leaves_only_the_credentials_file() {
        let dir = TempDir::new().expect("temp dir");
        let mut creds = SecureCredentials::new(options(&dir, Some(SecretVault::generate_key())));
        creds.set("registry_password", "hunter2").expect("set");
        creds.save().expect("first save");
        creds.set("registry_password", "hunter3").expect("set");
        creds.save().expect("second save");

        let entries: Vec<String> = fs::read_dir(dir.path().join("config"))
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["credentials.json.enc".to_string()]);
    }

    #[test]
    fn save_without_key_fails() {
        let dir = TempDir::new().expect("temp dir");
        let creds = SecureCredentials::new(options(&dir, None));
        assert!(matches!(creds.save(), Err(CredentialsError::MissingKey { .. })));
    }
}
