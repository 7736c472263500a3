//! Layered service configuration.
//!
//! Precedence, lowest first: the service's serde defaults, `service_name`,
//! an optional file (YAML/TOML/JSON by extension), then environment variables
//! shaped like `DEFECTRON__SECTION__KEY`.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

pub const CONFIG_FILE_ENV: &str = "DEFECTRON_CONFIG_FILE";
pub const ENV_PREFIX: &str = "DEFECTRON";

#[derive(Debug, Clone)]
pub struct ConfigSources {
    pub file: Option<PathBuf>,
    pub env_prefix: String,
}

impl ConfigSources {
    /// Sources taken from the process environment.
    pub fn from_env() -> Self {
        Self { file: std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from), env_prefix: ENV_PREFIX.into() }
    }
}

pub fn load_config<T: DeserializeOwned>(service: &str) -> Result<T> {
    load_config_from(service, &ConfigSources::from_env())
}

pub fn load_config_from<T: DeserializeOwned>(service: &str, sources: &ConfigSources) -> Result<T> {
    let mut builder = config::Config::builder().set_default("service_name", service)?;
    if let Some(file) = &sources.file {
        builder = builder.add_source(config::File::from(file.as_path()).required(true));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(&sources.env_prefix)
            .separator("__")
            .try_parsing(true),
    );
    let cfg = builder.build().context("building configuration")?;
    cfg.try_deserialize().context("deserializing configuration")
}
