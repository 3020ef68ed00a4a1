//! Validate command

use anyhow::{Context, Result};
use weft_core::EngineConfig;

use super::{load_document, load_schema};

/// Run the validate command
pub async fn run(schema_path: &str, document_path: &str, config: EngineConfig) -> Result<()> {
    let schema = load_schema(schema_path, config)?;
    let document = load_document(document_path)?;

    schema
        .validate_async(&document)
        .await
        .with_context(|| format!("{document_path} is invalid"))?;

    println!("✓ {document_path} is valid");
    Ok(())
}
