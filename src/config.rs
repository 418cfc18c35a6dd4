//! Configuration for the Seglake gateway

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Region reported by GetBucketLocation and used in SigV4 scopes
    #[serde(default = "default_region")]
    pub region: String,

    /// Gateway credentials for SigV4 verification. When absent, signed
    /// streaming uploads are rejected.
    #[serde(default)]
    pub auth: Option<AuthKeys>,

    /// Maximum object size in bytes accepted on PUT
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
}

/// Access key pair the gateway authenticates against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
}

// Default value functions for serde
fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_object_size() -> u64 {
    5 * 1024 * 1024 * 1024 // 5GB, the S3 single-PUT limit
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            region: default_region(),
            auth: None,
            max_object_size: default_max_object_size(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("cannot read {path}: {e}")))?;
        toml::from_str(&raw).map_err(|e| ConfigError(format!("cannot parse {path}: {e}")))
    }

    /// Load configuration from `SEGLAKE_CONFIG` if set, from `seglake.toml`
    /// if present, otherwise fall back to defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("SEGLAKE_CONFIG") {
            match Self::from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("failed to load {path}: {e}, using defaults");
                    return Self::default();
                }
            }
        }
        if std::path::Path::new("seglake.toml").exists() {
            match Self::from_file("seglake.toml") {
                Ok(config) => return config,
                Err(e) => tracing::warn!("failed to load seglake.toml: {e}, using defaults"),
            }
        }
        Self::default()
    }
}

/// Configuration loading error
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(String);
