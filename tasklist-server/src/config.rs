//! Configuration for the `Tasklist` API server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasklist-server/config.toml`)
//! 4. Compiled defaults

use std::path::{Path, PathBuf};

use tasklist::blob::DEFAULT_BUCKET;
use tasklist::db::DEFAULT_MAX_CONNECTIONS;
use tasklist::repository::DEFAULT_MAX_BATCH_ITEMS;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerSection,
    database: DatabaseSection,
    storage: StorageSection,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_batch_items: Option<usize>,
}

/// `[database]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DatabaseSection {
    url: Option<String>,
    max_connections: Option<u32>,
}

/// `[storage]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    root: Option<PathBuf>,
    bucket: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the API server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Tasklist JSON API server")]
pub struct CliArgs {
    /// Address to bind the HTTP server to.
    #[arg(short, long, env = "TASKLIST_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/tasklist-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database URL, e.g. `sqlite://tasklist.db`.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Connection pool size.
    #[arg(long)]
    pub max_connections: Option<u32>,

    /// Directory holding attachment blobs.
    #[arg(long)]
    pub blob_root: Option<PathBuf>,

    /// Bucket name that prefixes attachment URLs.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Maximum number of items accepted by one bulk request.
    #[arg(long)]
    pub max_batch: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKLIST_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `127.0.0.1:8080`).
    pub bind_addr: String,
    /// SQLite connection URL.
    pub database_url: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// Directory backing the blob store.
    pub blob_root: PathBuf,
    /// Bucket name stripped from attachment URLs.
    pub bucket: String,
    /// Upper bound on items per bulk request.
    pub max_batch_items: usize,
    /// Log level filter string.
    pub log_level: String,
    /// Optional log file; stderr when `None`.
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            database_url: "sqlite://tasklist.db".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            blob_root: PathBuf::from("./blobs"),
            bucket: DEFAULT_BUCKET.to_string(),
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: ServerConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            database_url: cli
                .database_url
                .clone()
                .or(file.database.url)
                .unwrap_or(defaults.database_url),
            max_connections: cli
                .max_connections
                .or(file.database.max_connections)
                .unwrap_or(defaults.max_connections),
            blob_root: cli
                .blob_root
                .clone()
                .or(file.storage.root)
                .unwrap_or(defaults.blob_root),
            bucket: cli
                .bucket
                .clone()
                .or(file.storage.bucket)
                .unwrap_or(defaults.bucket),
            max_batch_items: cli
                .max_batch
                .or(file.server.max_batch_items)
                .unwrap_or(defaults.max_batch_items),
            log_level: cli.log_level.clone(),
            log_file: cli.log_file.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(explicit_path: Option<&Path>) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("tasklist-server").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
