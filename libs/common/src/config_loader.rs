//! Configuration loading helper functions
//! Merges defaults, an optional config file and prefixed environment variables

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

fn file_figment(path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::config("Config file must have an extension"))?;

    match extension {
        "toml" => Ok(Figment::new().merge(Toml::file(path))),
        "yaml" | "yml" => Ok(Figment::new().merge(Yaml::file(path))),
        "json" => Ok(Figment::new().merge(Json::file(path))),
        _ => Err(Error::config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}

/// Load configuration from defaults, an optional file and prefixed env vars
///
/// Priority (highest to lowest):
/// 1. Environment variables (`{prefix}FIELD`)
/// 2. Config file, when given and present
/// 3. `T::default()`
pub fn load_config_with_env<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = path {
        if path.exists() {
            figment = figment.merge(file_figment(path)?);
        } else {
            warn!("Config file {} not found, using defaults", path.display());
        }
    }

    figment
        .merge(Env::prefixed(env_prefix))
        .extract()
        .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))
}
