// src/config.rs

//! Credentials and endpoint configuration.
//!
//! The config file lives inside the data directory as `bib.toml`:
//!
//! ```toml
//! # base_url = "https://bib.nacka.se/"   # optional override
//!
//! [[credentials]]
//! username = "alice"
//! password = "secret"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Config file name, resolved relative to the data directory
pub const CONFIG_FILE: &str = "bib.toml";

/// Default remote site when `base_url` is not set
pub const DEFAULT_BASE_URL: &str = "https://bib.nacka.se/";

/// One account to capture
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Parsed contents of `bib.toml`
#[derive(Debug, Deserialize)]
pub struct UserConfig {
    /// Root URL of the remote site; login and API paths hang off it
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Accounts to capture, in order
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl UserConfig {
    /// Load `bib.toml` from the data directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: UserConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        Ok(config)
    }
}
