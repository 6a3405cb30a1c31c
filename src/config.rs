//! Tool configuration.
//!
//! Settings live in `devprivops.toml`, looked up like every other artifact
//! (local root first, then global). Every field has a default, so an absent
//! file or a partial file is fine; CLI flags override whatever was loaded.
//!
//! ```toml
//! [endpoint]
//! host = "localhost"
//! port = 3030
//! dataset = "tmp"
//! username = "admin"
//! password = "secret"
//! timeout_secs = 30
//! ```

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::ConfigRoots;

/// Name of the configuration file under a configuration root.
pub const CONFIG_FILE: &str = "devprivops.toml";

/// Errors from configuration loading.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(devprivops::config::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(devprivops::config::parse),
        help("Check the syntax of the file against the documented layout.")
    )]
    Parse { path: String, message: String },

    #[error("invalid file pattern \"{pattern}\": {message}")]
    #[diagnostic(
        code(devprivops::config::invalid_pattern),
        help("`files` entries in uris.yml are regular expressions.")
    )]
    InvalidPattern { pattern: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

/// Where the SPARQL endpoint lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    3030
}
fn default_dataset() -> String {
    "tmp".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dataset: default_dataset(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EndpointConfig {
    /// `http://host:port/dataset`
    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}/{}",
            self.host,
            self.port,
            self.dataset.trim_matches('/')
        )
    }
}

impl Config {
    /// Parse TOML text. `origin` names the source in error messages.
    pub fn from_toml_str(text: &str, origin: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Load `devprivops.toml` from the roots, or defaults if neither has one.
    pub fn discover(roots: &ConfigRoots) -> ConfigResult<Self> {
        match roots.optional_file(CONFIG_FILE) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }
}
