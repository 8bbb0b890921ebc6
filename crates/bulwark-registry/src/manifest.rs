//! Declarative capability manifests.
//!
//! A manifest lists capability definitions without implementations. Loading
//! it registers every definition with a placeholder handler so the catalog
//! can be reviewed before real handlers are wired in.
//!
//! ```toml
//! [[capabilities]]
//! id = "file_read"
//! name = "Read file"
//! permission_tier = "read"
//! timeout_ms = 5000
//!
//! [capabilities.parameters.path]
//! type = "string"
//! required = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::models::CapabilityDefinition;

/// A list of capability definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    #[serde(default)]
    pub capabilities: Vec<CapabilityDefinition>,
}

impl CapabilityManifest {
    pub fn new(capabilities: Vec<CapabilityDefinition>) -> Self {
        Self { capabilities }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a `.json` or `.toml` manifest.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("toml") => Self::from_toml(&text),
            other => Err(RegistryError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
