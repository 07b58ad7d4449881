//! Harbor Pilot: deployment configuration for containerized applications.
//! Profiles, computed registry paths and encrypted credentials are kept in one
//! place and projected into environment variables for deploy scripts.

pub mod config;
pub mod credentials;
pub mod crypto;
pub mod export;
pub mod filter;
pub mod health;
pub mod host;
pub mod profile;
pub mod settings;

pub use config::{ConfigError, Configuration};
pub use export::{EnvMap, EnvVar};
pub use host::HostEnvironment;
