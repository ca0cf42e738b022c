//! claims-batch
//!
//! Inspects claim batch documents and applies operator responses to them.
//!
//! # Usage
//!
//! ```bash
//! claims-batch summary batch.json
//! claims-batch reconcile batch.json response.json --output-dir out/
//! claims-batch next-number 42
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use claims_cli::{init_tracing, load_json, reconcile, summarize, write_batch, CliConfig};
use domain_claims::{BatchAdjudication, ClaimBatch, ClaimsSettings};

#[derive(Parser)]
#[command(name = "claims-batch")]
#[command(about = "Inspect and reconcile insurance claim batches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the totals and guides of a batch document
    Summary {
        /// Batch JSON document
        batch: PathBuf,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Apply an operator response to a batch and print the reconciliation report
    Reconcile {
        /// Batch JSON document
        batch: PathBuf,
        /// Operator response JSON document
        response: PathBuf,
        /// Directory for the updated batch document
        #[arg(long, env = "CLAIMS_CLI_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },
    /// Print the batch number for a sequence value
    NextNumber {
        /// Sequence value
        seq: u64,
        /// Overrides the configured prefix
        #[arg(long)]
        prefix: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = CliConfig::from_env()?;
    init_tracing(&config);

    let cli = Cli::parse();
    match cli.command {
        Commands::Summary { batch, json } => {
            let batch: ClaimBatch = load_json(&batch)?;
            let summary = summarize(&batch);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary);
            }
        }
        Commands::Reconcile {
            batch,
            response,
            output_dir,
        } => {
            let mut claim_batch: ClaimBatch = load_json(&batch)?;
            let adjudication: BatchAdjudication = load_json(&response)?;
            let report = reconcile(&mut claim_batch, &adjudication)?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            let output_dir = output_dir.or_else(|| config.output_dir.as_ref().map(PathBuf::from));
            if let Some(dir) = output_dir {
                let path = write_batch(&claim_batch, &dir)?;
                info!(path = %path.display(), "reconciled batch saved");
            }
        }
        Commands::NextNumber { seq, prefix } => {
            let settings = ClaimsSettings::from_env()?;
            let prefix = prefix.unwrap_or(settings.batch_number_prefix);
            println!("{}", ClaimBatch::next_batch_number(&prefix, seq));
        }
    }

    Ok(())
}
