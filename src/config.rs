//! Declarative YAML configuration for the autograd engine
//!
//! ```yaml
//! grad_enabled: true
//! strict_scalar_root: false
//! check_finite: true
//! retain_graph: false
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine-wide gradient settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradConfig {
    /// Gradient tracking mode of a freshly created context
    pub grad_enabled: bool,

    /// Reject ones-seeding of a root that holds more than one element
    pub strict_scalar_root: bool,

    /// Fail the backward pass when an operation yields NaN or infinite gradients
    pub check_finite: bool,

    /// Keep producing operations attached after backward
    pub retain_graph: bool,
}

impl Default for GradConfig {
    fn default() -> Self {
        Self {
            grad_enabled: true,
            strict_scalar_root: false,
            check_finite: false,
            retain_graph: false,
        }
    }
}

impl GradConfig {
    /// Parse a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
    }

    /// Load a configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML text
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))
    }
}
