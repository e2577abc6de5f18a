//! Fingerprint command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use reelcheck_core::{Config, Fingerprinter};
use serde_json::json;

use crate::utils::format_offset;

/// Execute the fingerprint command.
pub async fn execute(file: PathBuf, interval: Option<f64>, json: bool, quiet: bool) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(interval) = interval {
        config.sampler.interval_seconds = interval;
    }

    let fingerprinter = Fingerprinter::from_config(&config).context("Invalid configuration")?;
    let set = fingerprinter
        .fingerprint_async(&file, config.sampler.interval_seconds)
        .await
        .with_context(|| format!("Failed to fingerprint {}", file.display()))?;

    if quiet {
        return Ok(());
    }

    if json {
        let frames: Vec<_> = set
            .iter()
            .map(|f| {
                json!({
                    "timestamp_seconds": f.timestamp_seconds,
                    "hash": f.hash.to_hex(),
                })
            })
            .collect();
        let output = json!({
            "file": file.display().to_string(),
            "algorithm": fingerprinter.algorithm(),
            "interval_seconds": config.sampler.interval_seconds,
            "frames": frames,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!(
        "   {} {}",
        "File:".dimmed(),
        file.display().to_string().bold()
    );
    println!("   {} {:?}", "Algorithm:".dimmed(), fingerprinter.algorithm());
    println!("   {} {}", "Frames:".dimmed(), set.len());
    println!();
    for frame in &set {
        println!(
            "   {}  {}",
            format!("{:>9}", format_offset(frame.timestamp_seconds)).dimmed(),
            frame.hash.to_hex()
        );
    }
    Ok(())
}
