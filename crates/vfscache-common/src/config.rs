//! Configuration types for vfscache
//!
//! Loaded from an optional TOML file; command-line flags override it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for the viewer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Cache directory to snapshot
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Record shown as the tree root; discovered from the table when unset
    #[serde(default)]
    pub root_id: Option<u32>,
    /// Worker threads for directory-size aggregation
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Attribute name under which directory children are stored
    #[serde(default = "default_children_attribute")]
    pub children_attribute: String,
    /// Bytes of cached content printed before truncating
    #[serde(default = "default_max_content_preview")]
    pub max_content_preview: usize,
    /// File names inside the cache directory
    #[serde(default)]
    pub files: CacheFiles,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            root_id: None,
            workers: default_workers(),
            children_attribute: default_children_attribute(),
            max_content_preview: default_max_content_preview(),
            files: CacheFiles::default(),
        }
    }
}

impl ViewerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::configuration("workers must be at least 1"));
        }
        if self.children_attribute.is_empty() {
            return Err(Error::configuration("children_attribute must not be empty"));
        }
        Ok(())
    }
}

/// Names of the files that make up one cache
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFiles {
    #[serde(default = "default_records")]
    pub records: String,
    #[serde(default = "default_names")]
    pub names: String,
    /// Page store base name; the store uses two files derived from it
    #[serde(default = "default_attributes")]
    pub attributes: String,
    /// Page store base name; the store uses two files derived from it
    #[serde(default = "default_content")]
    pub content: String,
    #[serde(default = "default_attribute_enum")]
    pub attribute_enum: String,
}

impl Default for CacheFiles {
    fn default() -> Self {
        Self {
            records: default_records(),
            names: default_names(),
            attributes: default_attributes(),
            content: default_content(),
            attribute_enum: default_attribute_enum(),
        }
    }
}

fn default_workers() -> usize {
    8
}

fn default_children_attribute() -> String {
    "FsRecords.DIRECTORY_CHILDREN".to_string()
}

fn default_max_content_preview() -> usize {
    64 * 1024
}

fn default_records() -> String {
    "records.dat".to_string()
}

fn default_names() -> String {
    "names.dat".to_string()
}

fn default_attributes() -> String {
    "attrib.dat".to_string()
}

fn default_content() -> String {
    "content.dat".to_string()
}

fn default_attribute_enum() -> String {
    "vfs_enum_attrib.dat".to_string()
}
