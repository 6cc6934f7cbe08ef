//! Configuration for the server and client binaries.
//!
//! Mirrors the original's `config_s.json` / `config_c.json` pattern: a JSON
//! file on disk holds the last-used settings, CLI flags (parsed with
//! `clap`) override it for this run, and the merged result is written back
//! so the next run without flags picks up where this one left off.

use std::path::{Path, PathBuf};

use clap::{Args, Parser};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write config file: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for `keepr-server`, merged from `config_s.json` and CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub sqlite_path: String,
    pub private_key_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:50051".into(),
            log_level: "info".into(),
            sqlite_path: "keepr.sqlite".into(),
            private_key_path: "private.pem".into(),
        }
    }
}

/// CLI flags for `keepr-server`. Any flag left unset falls back to the file
/// value, then to [`ServerConfig::default`].
#[derive(Debug, Parser)]
#[command(name = "keepr-server")]
pub struct ServerArgs {
    #[arg(long)]
    pub listen_addr: Option<String>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub sqlite_path: Option<String>,
    #[arg(long)]
    pub private_key_path: Option<String>,
    #[arg(long, default_value = "config_s.json")]
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Loads the config file at `args.config_path` if present, overlays any
    /// flags set on `args`, then rewrites the file with the merged result.
    pub fn load_and_persist(args: &ServerArgs) -> Result<Self, ConfigError> {
        let mut config = load_or_default(&args.config_path)?;

        if let Some(v) = &args.listen_addr {
            config.listen_addr = v.clone();
        }
        if let Some(v) = &args.log_level {
            config.log_level = v.clone();
        }
        if let Some(v) = &args.sqlite_path {
            config.sqlite_path = v.clone();
        }
        if let Some(v) = &args.private_key_path {
            config.private_key_path = v.clone();
        }

        persist(&args.config_path, &config)?;
        Ok(config)
    }
}

/// Settings for `keepr-client`, merged from `config_c.json` and CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_addr: String,
    pub log_level: String,
    pub log_file_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "http://127.0.0.1:50051".into(),
            log_level: "info".into(),
            log_file_path: "keepr-client.log".into(),
        }
    }
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    #[arg(long)]
    pub server_addr: Option<String>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub log_file_path: Option<String>,
    #[arg(long, default_value = "config_c.json")]
    pub config_path: PathBuf,
}

impl ClientConfig {
    pub fn load_and_persist(args: &ClientArgs) -> Result<Self, ConfigError> {
        let mut config = load_or_default(&args.config_path)?;

        if let Some(v) = &args.server_addr {
            config.server_addr = v.clone();
        }
        if let Some(v) = &args.log_level {
            config.log_level = v.clone();
        }
        if let Some(v) = &args.log_file_path {
            config.log_file_path = v.clone();
        }

        persist(&args.config_path, &config)?;
        Ok(config)
    }
}

fn load_or_default<T: Default + for<'de> Deserialize<'de>>(
    path: &Path,
) -> Result<T, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(ConfigError::Read(err)),
    }
}

fn persist<T: Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let contents = serde_json::to_string_pretty(config)?;
    std::fs::write(path, contents).map_err(ConfigError::Write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_or_default_returns_default_when_missing() {
        let config: ServerConfig = load_or_default(Path::new("/nonexistent/config_s.json")).unwrap();
        assert_eq!(config.listen_addr, ServerConfig::default().listen_addr);
    }

    #[test]
    fn server_config_merges_flags_over_file_and_persists() {
        let dir = std::env::temp_dir().join(format!("keepr-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config_s.json");

        let mut file = std::fs::File::create(&config_path).unwrap();
        write!(file, r#"{{"listen_addr":"0.0.0.0:1234","log_level":"debug","sqlite_path":"a.db","private_key_path":"k.pem"}}"#).unwrap();
        drop(file);

        let args = ServerArgs {
            listen_addr: None,
            log_level: Some("warn".into()),
            sqlite_path: None,
            private_key_path: None,
            config_path: config_path.clone(),
        };

        let merged = ServerConfig::load_and_persist(&args).unwrap();
        assert_eq!(merged.listen_addr, "0.0.0.0:1234");
        assert_eq!(merged.log_level, "warn");

        let reloaded: ServerConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
        assert_eq!(reloaded.log_level, "warn");

        std::fs::remove_dir_all(&dir).ok();
    }
}
