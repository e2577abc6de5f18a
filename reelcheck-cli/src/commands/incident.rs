//! Incident command implementation.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use reelcheck_core::{normalize_source_id, IncidentRecord, IncidentStore};

use crate::utils::{format_timestamp, open_store, Store};

/// Execute the incident command.
pub async fn execute(id: String, json: bool, quiet: bool) -> Result<()> {
    let source_id = normalize_source_id(&id).context("Invalid source id")?;

    let found = match open_store().await? {
        Store::Postgres(store) => lookup(&store, &source_id).await?,
        Store::Memory(store) => lookup(&store, &source_id).await?,
    };
    let Some(incident) = found else {
        bail!("No incident found for {source_id}");
    };

    if quiet {
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&incident)?);
        return Ok(());
    }

    println!();
    println!(
        "   {} {}",
        "Incident:".dimmed(),
        incident.canonical_id.bold()
    );
    println!(
        "   {} {}",
        "Created:".dimmed(),
        format_timestamp(&incident.created_at)
    );
    println!(
        "   {} {}",
        "Submissions:".dimmed(),
        incident.resubmission_count
    );
    if incident.known_alias_ids.is_empty() {
        println!("   {} none", "Reposts:".dimmed());
    } else {
        println!("   {}", "Reposts:".dimmed());
        for alias in &incident.known_alias_ids {
            println!("     {alias}");
        }
    }
    Ok(())
}

async fn lookup<S: IncidentStore>(store: &S, source_id: &str) -> Result<Option<IncidentRecord>> {
    store
        .incident(source_id)
        .await
        .context("Failed to look up incident")
}
