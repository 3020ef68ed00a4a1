//! Transform command

use anyhow::{Context, Result};
use weft_core::EngineConfig;

use super::{load_document, load_schema};

/// Run the transform command
pub async fn run(
    schema_path: &str,
    source_path: &str,
    target_path: Option<&str>,
    config: EngineConfig,
) -> Result<()> {
    let schema = load_schema(schema_path, config)?;
    let source = load_document(source_path)?;
    let target = target_path.map(load_document).transpose()?;

    let merged = schema
        .transform_async(&source, target.as_ref())
        .await
        .with_context(|| format!("Failed to transform {source_path}"))?;

    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}
