//! Zone tracking configuration.
//!
//! Loaded from `zone_config.json` with support for environment variable overrides.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::{resources::TrackingSettings, zones::ZoneDefinition};

pub const BUILTIN_ZONE_CONFIG: &str = include_str!("data/zone_config.json");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ZoneTrackingConfig {
    pub tracking: TrackingSettings,
    pub zones: Vec<ZoneDefinition>,
}

impl ZoneTrackingConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_ZONE_CONFIG).expect("builtin zone config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ZoneConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ZoneConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = ZoneTrackingConfig::from_json_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ZoneConfigError {
    #[error("failed to parse zone config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read zone config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the active zone configuration came from. `None` means builtin.
#[derive(Resource, Debug, Clone, Default)]
pub struct ZoneConfigMetadata {
    path: Option<PathBuf>,
}

impl ZoneConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load zone configuration from `ZONE_CONFIG_PATH`, falling back to the
/// builtin config.
pub fn load_zone_config_from_env() -> (Arc<ZoneTrackingConfig>, ZoneConfigMetadata) {
    if let Some(path) = env::var("ZONE_CONFIG_PATH").ok().map(PathBuf::from) {
        match ZoneTrackingConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "zones::config",
                    path = %path.display(),
                    zones = config.zones.len(),
                    "zone_config.loaded=file"
                );
                return (Arc::new(config), ZoneConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "zones::config",
                    path = %path.display(),
                    error = %err,
                    "zone_config.load_failed"
                );
            }
        }
    }

    let config = ZoneTrackingConfig::builtin();
    tracing::info!(
        target: "zones::config",
        zones = config.zones.len(),
        "zone_config.loaded=builtin"
    );
    (config, ZoneConfigMetadata::new(None))
}
