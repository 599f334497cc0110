//! Configuration management

use proxystack_core::CredentialStore;
use proxystack_s3::S3ApiConfig;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub s3api: S3ApiConfig,

    /// S3 access keys and the internal accounts they map to
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    pub access_key: String,
    pub account: String,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Reads `path` when given (it must exist), otherwise an optional
    /// `proxystack.toml` in the working directory. `PROXYSTACK__*`
    /// variables override both, e.g. `PROXYSTACK__S3API__ENABLED=true`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("proxystack").required(false),
        };
        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("PROXYSTACK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    /// Read-only credential mapping for the auth middleware
    pub fn credential_store(&self) -> CredentialStore {
        self.credentials
            .iter()
            .map(|c| (c.access_key.clone(), c.account.clone()))
            .collect()
    }
}
