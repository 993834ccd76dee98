//! services/scheduler/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the trigger endpoint. The output path is
//! the first argument, `openapi.json` when omitted.

use scheduler_lib::web::rest::ApiDoc;
use std::path::PathBuf;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let mut doc = ApiDoc::openapi();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();

    std::fs::write(&output, doc.to_pretty_json()?)?;
    for path in doc.paths.paths.keys() {
        println!("documented {}", path);
    }
    println!("✅ OpenAPI document written to {}", output.display());
    Ok(())
}
