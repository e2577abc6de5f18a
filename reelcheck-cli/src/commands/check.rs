//! Check command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use reelcheck_core::{
    normalize_source_id, Config, Fingerprinter, IncidentStore, MatchCandidate, Outcome,
    Resolution, Resolver,
};
use serde_json::json;
use tracing::{debug, info};

use crate::utils::{open_store, Store};

/// Arguments of the check command.
pub struct CheckArgs {
    pub id: String,
    pub file: PathBuf,
    pub interval: Option<f64>,
    pub threshold: Option<u32>,
    pub min_frames: Option<usize>,
    pub dry_run: bool,
    pub json: bool,
}

/// Execute the check command.
pub async fn execute(args: CheckArgs, quiet: bool) -> Result<()> {
    let source_id = normalize_source_id(&args.id).context("Invalid source id")?;

    let mut config = Config::from_env();
    if let Some(interval) = args.interval {
        config.sampler.interval_seconds = interval;
    }
    if let Some(threshold) = args.threshold {
        config.matching.hamming_threshold = threshold;
    }
    if let Some(min_frames) = args.min_frames {
        config.matching.min_matching_frames = min_frames;
    }
    config.validate().context("Invalid configuration")?;
    debug!(?config, "Loaded configuration");

    match open_store().await? {
        Store::Postgres(store) => check(store, &source_id, &args, &config, quiet).await,
        Store::Memory(store) => check(store, &source_id, &args, &config, quiet).await,
    }
}

async fn check<S: IncidentStore>(
    store: S,
    source_id: &str,
    args: &CheckArgs,
    config: &Config,
    quiet: bool,
) -> Result<()> {
    let resolver = Resolver::new(store, config.matching)?;
    let fingerprinter = Fingerprinter::from_config(config)?;

    if args.dry_run {
        let known = resolver.incident(source_id).await?;
        let set = fingerprinter
            .fingerprint_async(&args.file, config.sampler.interval_seconds)
            .await
            .with_context(|| format!("Failed to fingerprint {}", args.file.display()))?;
        let candidates = resolver.find_matches(&set, &config.matching).await?;
        info!(source_id, candidates = candidates.len(), "Dry run complete");

        if quiet {
            return Ok(());
        }
        if args.json {
            let output = json!({
                "source_id": source_id,
                "known_incident": known.map(|i| i.canonical_id),
                "frames": set.len(),
                "candidates": candidates,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_dry_run(source_id, known.map(|i| i.canonical_id), &candidates);
        }
        return Ok(());
    }

    // Known ids are counted without decoding the video again.
    let resolution = match resolver.record_resubmission(source_id).await? {
        Some(resolution) => resolution,
        None => {
            let set = fingerprinter
                .fingerprint_async(&args.file, config.sampler.interval_seconds)
                .await
                .with_context(|| format!("Failed to fingerprint {}", args.file.display()))?;
            resolver
                .resolve_and_store(source_id, &set)
                .await
                .context("Failed to resolve submission")?
        }
    };

    if quiet {
        return Ok(());
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        print_resolution(source_id, &resolution);
    }
    Ok(())
}

fn banner(outcome: Outcome) -> ColoredString {
    match outcome {
        Outcome::New => "║                 NEW                    ║".green().bold(),
        Outcome::ExactResubmission => "║          EXACT RESUBMISSION            ║".cyan().bold(),
        Outcome::Repost => "║                REPOST                  ║".yellow().bold(),
    }
}

fn print_resolution(source_id: &str, resolution: &Resolution) {
    let edge = |s: &str| match resolution.outcome {
        Outcome::New => s.green(),
        Outcome::ExactResubmission => s.cyan(),
        Outcome::Repost => s.yellow(),
    };

    println!();
    println!("{}", edge("╔════════════════════════════════════════╗"));
    println!("{}", banner(resolution.outcome));
    println!("{}", edge("╚════════════════════════════════════════╝"));
    println!();
    println!("   {} {}", "Submission:".dimmed(), source_id);
    println!(
        "   {} {}",
        "Incident:".dimmed(),
        resolution.canonical_id.bold()
    );
    if let Some(matched) = &resolution.matched_against {
        println!("   {} {}", "Matched:".dimmed(), matched);
    }
    if let Some(similarity) = resolution.similarity {
        println!(
            "   {} {:.0}%",
            "Similarity:".dimmed(),
            similarity * 100.0
        );
    }
    println!(
        "   {} {}",
        "Submissions:".dimmed(),
        resolution.resubmission_count
    );
    println!(
        "   {} {}",
        "Frames stored:".dimmed(),
        resolution.frames_stored
    );
}

fn print_dry_run(source_id: &str, known: Option<String>, candidates: &[MatchCandidate]) {
    println!();
    println!("{}", "DRY RUN - nothing will be written".yellow().bold());
    println!();
    println!("   {} {}", "Submission:".dimmed(), source_id);
    match known {
        Some(canonical) => println!(
            "   {} already known (incident {})",
            "Status:".dimmed(),
            canonical.bold()
        ),
        None => println!("   {} not seen before", "Status:".dimmed()),
    }

    if candidates.is_empty() {
        println!("   {} none", "Matches:".dimmed());
        return;
    }
    println!("   {}", "Matches:".dimmed());
    for candidate in candidates {
        println!(
            "     {}  {:>3.0}%  {}/{} frames  best {}  avg {:.1}",
            candidate.candidate_source_id.bold(),
            candidate.similarity_score * 100.0,
            candidate.matching_frame_count,
            candidate.frames_checked,
            candidate.best_distance,
            candidate.average_distance
        );
    }
}
