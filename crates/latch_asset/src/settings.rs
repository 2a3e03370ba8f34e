//! Asset loading settings

use crate::stream::DEFAULT_INITIAL_CAPACITY;
use crate::AssetError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Asset loading settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    /// Starting buffer size when draining a stream of unknown length.
    pub stream_initial_capacity: usize,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            stream_initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

impl AssetSettings {
    pub fn from_json_str(json: &str) -> Result<Self, AssetError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let settings = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        debug!(path = %path.display(), ?settings, "loaded asset settings");
        Ok(settings)
    }

    pub fn to_json_string(&self) -> Result<String, AssetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
