//! Engine configuration and document loading
//!
//! # Configuration File
//!
//! ```yaml
//! # weft.yaml
//! deadline_ms: 2000   # async entry points give up after two seconds
//! max_depth: 128      # deeper documents are reported as LIMIT
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Engine configuration attached to a compiled schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deadline for the async entry points, in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Deepest document level evaluated before reporting a LIMIT error,
    /// capped at [`MAX_DEPTH`]
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Upper bound on `max_depth`; every level costs several stack frames
/// and evaluation runs on the caller's thread
pub const MAX_DEPTH: usize = 128;

fn default_max_depth() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: None,
            max_depth: default_max_depth(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = EngineConfig::load("./weft.yaml")?;
    /// let schema = Schema::compile(&raw, &registry)?.with_config(config);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::ConfigInvalid {
                message: "max_depth must be at least 1".to_string(),
            });
        }
        if self.max_depth > MAX_DEPTH {
            return Err(Error::ConfigInvalid {
                message: format!("max_depth must be at most {MAX_DEPTH}"),
            });
        }
        if self.deadline_ms == Some(0) {
            return Err(Error::ConfigInvalid {
                message: "deadline_ms must be positive when set".to_string(),
            });
        }
        Ok(())
    }

    /// Depth limit in effect, `max_depth` capped at [`MAX_DEPTH`]
    pub fn depth_limit(&self) -> usize {
        self.max_depth.min(MAX_DEPTH)
    }

    /// Deadline as a duration, if one is configured
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Read a schema or document file
///
/// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
/// as JSON. Both land in the same `serde_json::Value` model.
pub fn read_value<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    if is_yaml {
        Ok(serde_yaml::from_str(&contents)?)
    } else {
        Ok(serde_json::from_str(&contents)?)
    }
}
