use clap::{Parser, Subcommand};
use stager::core::StagerResult;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "stager")]
#[command(about = "Stage, commit and roll back content packages")]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hand off a package from URLs and/or local zips
    Upload {
        /// URL of a zip to download (repeatable)
        #[arg(short, long = "url")]
        urls: Vec<String>,
        /// Local zip to submit (repeatable)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
        /// Overwrite an existing package with the same id
        #[arg(short, long)]
        replace: bool,
        /// Address notified once the handoff finished
        #[arg(short, long)]
        email: Option<String>,
        /// Submission id (generated when omitted)
        #[arg(long)]
        submission_id: Option<String>,
    },
    /// Remove a package
    Remove {
        /// Package id
        id: String,
        /// Version to remove
        #[arg(short, long, required_unless_present = "all", conflicts_with = "all")]
        version: Option<String>,
        /// Remove every version
        #[arg(short, long)]
        all: bool,
    },
    /// Add ledger entries for content folders the ledger does not know about
    Sync,
    /// Group the content packages file by package id
    Sort,
    /// List ledger entries
    List {
        /// Print the ledger as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare two versions (prints -1, 0 or 1)
    Compare { v1: String, v2: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nError: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> StagerResult<()> {
    let config = || cli::load_config(args.config.as_deref());
    match args.command {
        Commands::Compare { ref v1, ref v2 } => cli::compare::run(v1, v2),
        Commands::Upload {
            ref urls,
            ref files,
            replace,
            ref email,
            ref submission_id,
        } => {
            let options = cli::upload::UploadOptions {
                urls: urls.clone(),
                files: files.clone(),
                replace,
                email: email.clone(),
                submission_id: submission_id.clone(),
            };
            cli::upload::run(&config()?, options).await
        }
        Commands::Remove {
            ref id,
            ref version,
            all,
        } => cli::remove::run(&config()?, id, version.as_deref(), all).await,
        Commands::Sync => cli::sync::run(&config()?).await,
        Commands::Sort => cli::sort::run(&config()?).await,
        Commands::List { json } => cli::list::run(&config()?, json).await,
    }
}
