//! Batch file operations behind the CLI subcommands
//!
//! Batches and operator responses are exchanged as JSON documents in the
//! shape `serde` gives [`ClaimBatch`] and [`BatchAdjudication`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, instrument};

use core_kernel::Money;
use domain_claims::{
    BatchAdjudication, BatchStatus, ClaimBatch, GuideStatus, ReconciliationReport,
};

/// Reads and deserializes a JSON document
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// One guide row in a [`BatchSummary`]
#[derive(Debug, Clone, Serialize)]
pub struct GuideSummary {
    pub guide_number: String,
    pub status: GuideStatus,
    pub line_count: usize,
    pub total_amount: Money,
}

/// Headline figures of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_number: String,
    pub status: BatchStatus,
    pub guide_count: usize,
    pub total_amount: Money,
    pub approved_amount: Option<Money>,
    pub glossed_amount: Option<Money>,
    pub protocol_number: Option<String>,
    pub guides: Vec<GuideSummary>,
}

/// Builds the summary shown by `claims-batch summary`
pub fn summarize(batch: &ClaimBatch) -> BatchSummary {
    BatchSummary {
        batch_number: batch.batch_number().to_string(),
        status: batch.status(),
        guide_count: batch.guide_count(),
        total_amount: batch.total_amount(),
        approved_amount: batch.approved_amount(),
        glossed_amount: batch.glossed_amount(),
        protocol_number: batch.protocol_number().map(str::to_string),
        guides: batch
            .guides()
            .iter()
            .map(|g| GuideSummary {
                guide_number: g.guide_number().to_string(),
                status: g.status(),
                line_count: g.line_count(),
                total_amount: g.total_amount(),
            })
            .collect(),
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch {} ({})", self.batch_number, self.status)?;
        writeln!(f, "  guides:   {}", self.guide_count)?;
        writeln!(f, "  billed:   {}", self.total_amount)?;
        if let Some(approved) = &self.approved_amount {
            writeln!(f, "  approved: {}", approved)?;
        }
        if let Some(glossed) = &self.glossed_amount {
            writeln!(f, "  glossed:  {}", glossed)?;
        }
        if let Some(protocol) = &self.protocol_number {
            writeln!(f, "  protocol: {}", protocol)?;
        }
        for guide in &self.guides {
            writeln!(
                f,
                "  - {} [{}] {} line(s), {}",
                guide.guide_number, guide.status, guide.line_count, guide.total_amount
            )?;
        }
        Ok(())
    }
}

/// Applies an operator response to a batch
///
/// A batch still in `Sent` is moved to `Processing` first.
#[instrument(skip(batch, response), fields(batch_number = %batch.batch_number()))]
pub fn reconcile(
    batch: &mut ClaimBatch,
    response: &BatchAdjudication,
) -> anyhow::Result<ReconciliationReport> {
    if batch.status() == BatchStatus::Sent {
        batch.mark_as_processing()?;
    }
    let report = batch
        .reconcile(response)
        .with_context(|| format!("failed to reconcile batch {}", batch.batch_number()))?;

    info!(
        outcome = %report.outcome,
        discrepancy = %report.discrepancy,
        glossed_discrepancy = %report.glossed_discrepancy,
        unanswered = report.unanswered_guides.len(),
        "batch reconciled"
    );
    Ok(report)
}

/// Writes a batch as pretty JSON to `<dir>/<batch number>.json`
pub fn write_batch(batch: &ClaimBatch, dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.json", batch.batch_number()));
    let json = serde_json::to_string_pretty(batch)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "batch written");
    Ok(path)
}
