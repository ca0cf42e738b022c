//! Operator adjudication responses and reconciliation
//!
//! The operator answers a submitted batch with approved and glossed
//! figures at whatever granularity it chooses: per line, per guide, and for
//! the batch as a whole. The figures at each level are stored as given;
//! [`ReconciliationReport`] shows how far they agree.

use serde::{Deserialize, Serialize};

use core_kernel::{ClaimBatchId, ClaimGuideId, ClaimLineId, Money};

use crate::batch::BatchStatus;
use crate::error::ClaimError;
use crate::guide::{ClaimGuide, GuideStatus};

/// Verdict on one procedure line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAdjudication {
    pub line_id: ClaimLineId,
    pub approved_quantity: u32,
    pub approved_amount: Money,
    #[serde(default)]
    pub gloss_reason: Option<String>,
}

/// Verdict on one guide, optionally broken down per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideAdjudication {
    pub guide_id: ClaimGuideId,
    pub approved_amount: Money,
    #[serde(default)]
    pub gloss_reason: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineAdjudication>,
}

impl GuideAdjudication {
    /// A zero approval that carries a reason is a full rejection
    pub fn is_rejection(&self) -> bool {
        self.approved_amount.is_zero()
            && self
                .gloss_reason
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty())
    }
}

/// The operator's response document for a whole batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAdjudication {
    pub response_file_name: String,
    pub approved_amount: Money,
    pub glossed_amount: Money,
    #[serde(default)]
    pub guides: Vec<GuideAdjudication>,
}

/// Where one guide ended up after reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideOutcome {
    pub guide_id: ClaimGuideId,
    pub guide_number: String,
    pub status: GuideStatus,
    pub billed_amount: Money,
    pub approved_amount: Option<Money>,
    pub glossed_amount: Option<Money>,
}

/// Billed vs approved vs glossed, at guide and batch level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub batch_id: ClaimBatchId,
    pub outcome: BatchStatus,
    pub billed_amount: Money,
    pub guide_approved_amount: Money,
    pub guide_glossed_amount: Money,
    pub batch_approved_amount: Money,
    pub batch_glossed_amount: Money,
    /// `batch_approved_amount - guide_approved_amount`
    pub discrepancy: Money,
    /// `batch_glossed_amount - guide_glossed_amount`
    pub glossed_discrepancy: Money,
    pub guides: Vec<GuideOutcome>,
    /// Guides the response said nothing about; they stay `Sent`
    pub unanswered_guides: Vec<ClaimGuideId>,
}

impl ReconciliationReport {
    /// True when both batch-level figures match the guide-level sums
    pub fn is_balanced(&self) -> bool {
        self.discrepancy.is_zero() && self.glossed_discrepancy.is_zero()
    }
}

impl GuideOutcome {
    pub(crate) fn of(guide: &ClaimGuide) -> Self {
        Self {
            guide_id: guide.id(),
            guide_number: guide.guide_number().to_string(),
            status: guide.status(),
            billed_amount: guide.total_amount(),
            approved_amount: guide.approved_amount(),
            glossed_amount: guide.glossed_amount(),
        }
    }
}

/// Applies a guide verdict, line verdicts first
///
/// Works on a copy of the guide; the original is replaced only if every
/// step succeeded.
pub(crate) fn apply_to_guide(
    guide: &mut ClaimGuide,
    adjudication: &GuideAdjudication,
) -> Result<GuideStatus, ClaimError> {
    if adjudication.guide_id != guide.id() {
        return Err(ClaimError::validation(format!(
            "adjudication for {} applied to guide {}",
            adjudication.guide_id,
            guide.id()
        )));
    }

    let mut working = guide.clone();
    for line in &adjudication.lines {
        working.adjudicate_line(line.line_id, line)?;
    }
    let reason = adjudication.gloss_reason.as_deref().unwrap_or_default();
    if adjudication.is_rejection() {
        working.reject(reason)?;
    } else {
        working.approve(adjudication.approved_amount)?;
        if working.status() == GuideStatus::PartiallyApproved {
            working.record_gloss_reason(reason);
        }
    }

    let status = working.status();
    *guide = working;
    Ok(status)
}
