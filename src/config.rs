use anyhow::{Context, Result};
use clap::Parser;
use std::env;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;
const DEFAULT_TOKEN_LENGTH: usize = 10;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub max_upload_size: usize,
    pub token_length: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Anonymous token-addressed file drop")]
pub struct Args {
    /// Host to bind to (overrides FILEDROP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILEDROP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded objects are stored (overrides FILEDROP_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Maximum accepted upload size in bytes (overrides FILEDROP_MAX_UPLOAD_SIZE)
    #[arg(long)]
    pub max_upload_size: Option<usize>,

    /// Length of generated download tokens (overrides FILEDROP_TOKEN_LENGTH)
    #[arg(long)]
    pub token_length: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("FILEDROP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("FILEDROP_PORT")?.unwrap_or(DEFAULT_PORT);
        let env_storage =
            env::var("FILEDROP_STORAGE_DIR").unwrap_or_else(|_| "./data/drops".into());
        let env_max_size =
            parse_env("FILEDROP_MAX_UPLOAD_SIZE")?.unwrap_or(DEFAULT_MAX_UPLOAD_SIZE);
        let env_token_length = parse_env("FILEDROP_TOKEN_LENGTH")?.unwrap_or(DEFAULT_TOKEN_LENGTH);

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            max_upload_size: args.max_upload_size.unwrap_or(env_max_size),
            token_length: args.token_length.unwrap_or(env_token_length),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read a numeric environment variable, treating "not present" as None.
fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
