//! Report command

use anyhow::{Result, bail};
use weft_core::EngineConfig;

use super::{load_document, load_schema};

/// Run the report command
pub async fn run(schema_path: &str, document_path: &str, config: EngineConfig) -> Result<()> {
    let schema = load_schema(schema_path, config)?;
    let document = load_document(document_path)?;

    let errors = schema.report_async(&document).await;
    println!("{}", serde_json::to_string_pretty(&errors)?);

    if !errors.is_empty() {
        bail!("{} violation(s) in {}", errors.len(), document_path);
    }
    tracing::info!("✓ {} conforms to {}", document_path, schema_path);
    Ok(())
}
