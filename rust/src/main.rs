//! Command line front end. Deploy scripts call it to obtain the environment
//! for a profile; operators use it to manage the encrypted credentials file.
//! Everything meant for scripts goes to stdout, logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use harbor_pilot::credentials::SecureCredentials;
use harbor_pilot::crypto::secrets::SecretVault;
use harbor_pilot::filter::redact;
use harbor_pilot::health::status_body;
use harbor_pilot::settings::{load_settings, Settings, SETTINGS_VAR};
use harbor_pilot::{Configuration, EnvMap, HostEnvironment};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "harbor-pilot")]
#[command(about = "Export deployment configuration and manage encrypted credentials")]
struct Cli {
    /// JSON settings file layered over the built-in defaults
    #[arg(long, global = true, env = SETTINGS_VAR)]
    settings: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print exported variables for a profile
    Env {
        #[arg(long, short)]
        profile: Option<String>,
        /// Upper-case the variable names
        #[arg(long)]
        shell: bool,
        /// Print sensitive values instead of masking them
        #[arg(long)]
        reveal: bool,
        #[arg(long, value_enum, default_value_t = Format::Lines)]
        format: Format,
    },
    /// Print `export` statements for `eval "$(harbor-pilot export -p staging)"`
    Export {
        #[arg(long, short)]
        profile: Option<String>,
    },
    /// Print the application version
    Version,
    /// Print the health check body
    Status,
    /// List the field names that must be masked in logs
    Secrets,
    /// List the known deployment profiles
    Profiles,
    /// Manage the encrypted credentials file
    Credentials {
        #[command(subcommand)]
        command: CredentialsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CredentialsCommand {
    /// List stored credential names
    Show,
    /// Store a credential and re-encrypt the file
    Set { name: String, value: String },
    /// Delete a credential and re-encrypt the file
    Remove { name: String },
    /// Print a new random master key
    GenerateKey,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Lines,
    Json,
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let host = HostEnvironment::from_env();
    let settings = match &cli.settings {
        Some(path) => load_settings(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    debug!(engine = %host.engine_name, deploy_env = %host.deploy_env, "host environment");

    let options = settings.credentials_options(&host);
    let config = Configuration::new(&host)
        .configure(&settings)
        .with_credentials(Arc::new(SecureCredentials::new(options.clone())));

    match cli.command {
        Command::Env {
            profile,
            shell,
            reveal,
            format,
        } => {
            let config = select_profile(&config, profile.as_deref());
            let mut env = if shell { config.shell_env()? } else { config.env()? };
            if !reveal {
                env = redact(env, &config.secrets_to_filter()?);
            }
            print_env(&env, format)?;
        }
        Command::Export { profile } => {
            let config = select_profile(&config, profile.as_deref());
            print!("{}", config.shell_env()?.to_shell_exports());
        }
        Command::Version => println!("{}", config.version()?),
        Command::Status => println!("{}", status_body(&config)?),
        Command::Secrets => {
            for name in config.secrets_to_filter()? {
                println!("{name}");
            }
        }
        Command::Profiles => {
            for (name, profile) in config.profiles().iter() {
                println!(
                    "{name}\tmanager={}@{}\tsubdomain={}\tdeploy_env={}",
                    profile.manager_user, profile.manager_node, profile.subdomain, profile.deploy_env
                );
            }
        }
        Command::Credentials { command } => {
            run_credentials(SecureCredentials::new(options), command)?;
        }
    }
    Ok(())
}

fn select_profile(config: &Configuration, profile: Option<&str>) -> Configuration {
    match profile {
        Some(name) => {
            if config.profiles().get(name).is_none() {
                warn!(profile = name, "unknown profile, exporting defaults");
            }
            config.for_profile(name)
        }
        None => config.clone(),
    }
}

fn print_env(env: &EnvMap, format: Format) -> Result<()> {
    match format {
        Format::Lines => print!("{}", env.to_dotenv()),
        Format::Json => println!("{}", serde_json::to_string_pretty(env)?),
    }
    Ok(())
}

fn run_credentials(mut credentials: SecureCredentials, command: CredentialsCommand) -> Result<()> {
    match command {
        CredentialsCommand::Show => {
            for name in credentials.config()?.keys() {
                println!("{name}");
            }
        }
        CredentialsCommand::Set { name, value } => {
            credentials.set(&name, &value)?;
            credentials.save()?;
            info!(name = %name, path = %credentials.path().display(), "credential stored");
        }
        CredentialsCommand::Remove { name } => {
            if !credentials.remove(&name)? {
                bail!("no credential named '{name}' in {}", credentials.path().display());
            }
            credentials.save()?;
        }
        CredentialsCommand::GenerateKey => println!("{}", SecretVault::generate_key()),
    }
    Ok(())
}
