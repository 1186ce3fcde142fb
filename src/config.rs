// Server configuration
//
// Line-oriented config file in the redis.conf style: `#` comments, blank
// lines ignored, `key value` pairs with case-insensitive keys. The loaded
// value is passed explicitly into Engine and Server; there is no global.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_FILE: &str = "redis.conf";

const DEFAULT_DATABASES: usize = 16;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Listen port
    pub port: u16,
    /// Enable append-only persistence
    pub append_only: bool,
    /// Append-only file path
    pub append_filename: String,
    /// Advisory client limit; logged, not enforced
    pub max_clients: usize,
    /// Reserved; not enforced
    pub require_pass: String,
    /// Number of logical databases
    pub databases: usize,
    /// Reserved for cluster mode
    pub peers: Vec<String>,
    /// Reserved for cluster mode
    pub self_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 6379,
            append_only: false,
            append_filename: "appendonly.aof".to_string(),
            max_clients: 10000,
            require_pass: String::new(),
            databases: DEFAULT_DATABASES,
            peers: Vec::new(),
            self_addr: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value '{value}' for '{key}' on line {line}")]
    InvalidValue {
        key: String,
        line: usize,
        value: String,
    },
}

impl ServerConfig {
    /// Loads a config file. A missing file falls back to defaults with a
    /// warning; an unreadable or malformed one is a startup failure.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source: err,
            }),
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (index, raw) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                debug!(line = line_no, "ignoring config line without a value");
                continue;
            };
            let key = key.to_lowercase();
            let value = value.trim();
            match key.as_str() {
                "bind" => config.bind = value.to_string(),
                "port" => config.port = parse_value(&key, line_no, value)?,
                "appendonly" => config.append_only = parse_bool(&key, line_no, value)?,
                "appendfilename" => config.append_filename = value.to_string(),
                "maxclients" => config.max_clients = parse_value(&key, line_no, value)?,
                "requirepass" => config.require_pass = value.to_string(),
                "databases" => {
                    let n: i64 = parse_value(&key, line_no, value)?;
                    config.databases = if n <= 0 { DEFAULT_DATABASES } else { n as usize };
                }
                "peers" => {
                    config.peers = value
                        .split(',')
                        .map(|peer| peer.trim().to_string())
                        .filter(|peer| !peer.is_empty())
                        .collect();
                }
                "self" => config.self_addr = value.to_string(),
                _ => debug!(key = %key, "ignoring unknown config key"),
            }
        }
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_value<T: FromStr>(key: &str, line: usize, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        line,
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, line: usize, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            line,
            value: value.to_string(),
        }),
    }
}
