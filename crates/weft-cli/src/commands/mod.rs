//! CLI command implementations

pub mod report;
pub mod transform;
pub mod validate;

use anyhow::{Context, Result};
use serde_json::Value;
use weft_core::{EngineConfig, Registry, Schema, read_value};

/// Load the engine configuration, falling back to defaults when no file is given
pub fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            tracing::debug!("Loading configuration from {}", path);
            EngineConfig::load(path).context("Failed to load configuration")
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Read and compile a schema file
pub fn load_schema(path: &str, config: EngineConfig) -> Result<Schema> {
    let raw = read_value(path).with_context(|| format!("Failed to read schema {path}"))?;
    let schema = Schema::compile(&raw, &Registry::new())
        .with_context(|| format!("Failed to compile schema {path}"))?;
    tracing::debug!("Compiled {} ({} nodes)", path, schema.node_count());
    Ok(schema.with_config(config))
}

/// Read a JSON or YAML document
pub fn load_document(path: &str) -> Result<Value> {
    read_value(path).with_context(|| format!("Failed to read document {path}"))
}
