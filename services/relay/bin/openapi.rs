//! Writes the relay's OpenAPI document to disk.
//!
//! Usage: `openapi [OUTPUT]`, where `OUTPUT` defaults to `openapi.json`.

use anyhow::Context;
use atoms_relay::router::openapi_json;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    let document = openapi_json().context("Failed to render OpenAPI document")?;
    std::fs::write(&path, document).with_context(|| format!("Failed to write {}", path))?;
    println!("OpenAPI document written to {}", path);
    Ok(())
}
