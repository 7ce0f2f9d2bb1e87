use std::path::PathBuf;

use anyhow::{Context, Result};

use repcast::{SessionReport, Settings};

pub async fn cmd_report(path: Option<PathBuf>, json: bool, settings: &Settings) -> Result<()> {
    let path = path.unwrap_or_else(|| settings.report.path.clone());
    let report = SessionReport::read_from(&path)
        .await
        .with_context(|| format!("failed to read report {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_text());
    }

    Ok(())
}
