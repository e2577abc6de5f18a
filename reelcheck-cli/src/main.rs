//! Reelcheck CLI - video fingerprinting and repost resolution tool.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Invalid parameter (interval, threshold, identifier)
  65  Media unreadable
  69  Store unavailable (safe to retry)
  70  Invariant violation";

#[derive(Parser)]
#[command(name = "reelcheck")]
#[command(author, version, about = "Perceptual video fingerprinting and repost resolution", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// When to use colored output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a video and print its frame fingerprints
    Fingerprint {
        /// Path to the video file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Seconds between sampled frames
        #[arg(short, long)]
        interval: Option<f64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Classify a submission as new, an exact resubmission, or a repost
    Check {
        /// Source id or permalink of the submission
        #[arg(value_name = "ID")]
        id: String,

        /// Path to the submitted video
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Seconds between sampled frames
        #[arg(short, long)]
        interval: Option<f64>,

        /// Max per-frame Hamming distance counted as a match
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Matching frames required to call a repost
        #[arg(short, long)]
        min_frames: Option<usize>,

        /// Report matches without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show the incident a source id belongs to
    Incident {
        /// Source id or permalink
        #[arg(value_name = "ID")]
        id: String,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool, quiet: bool, ansi: bool) {
    let default = if verbose {
        "reelcheck=debug"
    } else if quiet {
        "reelcheck=error"
    } else {
        "reelcheck=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let ansi = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::io::stderr().is_terminal(),
    };
    colored::control::set_override(ansi);
    init_logging(cli.verbose, cli.quiet, ansi);

    if let Err(err) = run(cli.command, cli.quiet).await {
        let exit = ExitCode::from_anyhow(&err);
        eprintln!(
            "{} {}",
            "error:".red().bold(),
            exit.message.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(exit.code);
    }
}

async fn run(command: Commands, quiet: bool) -> Result<()> {
    match command {
        Commands::Fingerprint {
            file,
            interval,
            json,
        } => commands::fingerprint::execute(file, interval, json, quiet).await,
        Commands::Check {
            id,
            file,
            interval,
            threshold,
            min_frames,
            dry_run,
            json,
        } => {
            let args = commands::check::CheckArgs {
                id,
                file,
                interval,
                threshold,
                min_frames,
                dry_run,
                json,
            };
            commands::check::execute(args, quiet).await
        }
        Commands::Incident { id, json } => commands::incident::execute(id, json, quiet).await,
    }
}
