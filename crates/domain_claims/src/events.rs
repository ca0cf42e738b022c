//! Domain events for guides and batches
//!
//! Guides and batches record what happened to them while they are mutated.
//! The surrounding application drains the events after persisting the
//! aggregate and uses them for audit trails and notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ClaimBatchId, ClaimGuideId, ClaimLineId, Money};

use crate::batch::BatchStatus;

/// Events emitted by [`crate::ClaimGuide`] and [`crate::ClaimBatch`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClaimEvent {
    /// A procedure line was added to a draft guide
    LineAdded {
        guide_id: ClaimGuideId,
        line_id: ClaimLineId,
        guide_total: Money,
        timestamp: DateTime<Utc>,
    },

    /// A procedure line was removed from a draft guide
    LineRemoved {
        guide_id: ClaimGuideId,
        line_id: ClaimLineId,
        guide_total: Money,
        timestamp: DateTime<Utc>,
    },

    GuideSent {
        guide_id: ClaimGuideId,
        total_amount: Money,
        timestamp: DateTime<Utc>,
    },

    GuideApproved {
        guide_id: ClaimGuideId,
        approved_amount: Money,
        timestamp: DateTime<Utc>,
    },

    /// The operator glossed part of the guide
    GuidePartiallyApproved {
        guide_id: ClaimGuideId,
        approved_amount: Money,
        glossed_amount: Money,
        timestamp: DateTime<Utc>,
    },

    GuideRejected {
        guide_id: ClaimGuideId,
        glossed_amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    GuidePaid {
        guide_id: ClaimGuideId,
        timestamp: DateTime<Utc>,
    },

    GuideAttached {
        batch_id: ClaimBatchId,
        guide_id: ClaimGuideId,
        timestamp: DateTime<Utc>,
    },

    GuideDetached {
        batch_id: ClaimBatchId,
        guide_id: ClaimGuideId,
        timestamp: DateTime<Utc>,
    },

    BatchReadyToSend {
        batch_id: ClaimBatchId,
        guide_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The billing XML was produced by the serializer collaborator
    XmlGenerated {
        batch_id: ClaimBatchId,
        file_name: String,
        timestamp: DateTime<Utc>,
    },

    BatchSubmitted {
        batch_id: ClaimBatchId,
        protocol_number: Option<String>,
        timestamp: DateTime<Utc>,
    },

    BatchProcessing {
        batch_id: ClaimBatchId,
        timestamp: DateTime<Utc>,
    },

    /// The operator's response was recorded and classified
    ResponseProcessed {
        batch_id: ClaimBatchId,
        approved_amount: Money,
        glossed_amount: Money,
        outcome: BatchStatus,
        timestamp: DateTime<Utc>,
    },

    BatchRejected {
        batch_id: ClaimBatchId,
        timestamp: DateTime<Utc>,
    },

    BatchPaid {
        batch_id: ClaimBatchId,
        timestamp: DateTime<Utc>,
    },
}

impl ClaimEvent {
    /// Returns the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ClaimEvent::LineAdded { timestamp, .. }
            | ClaimEvent::LineRemoved { timestamp, .. }
            | ClaimEvent::GuideSent { timestamp, .. }
            | ClaimEvent::GuideApproved { timestamp, .. }
            | ClaimEvent::GuidePartiallyApproved { timestamp, .. }
            | ClaimEvent::GuideRejected { timestamp, .. }
            | ClaimEvent::GuidePaid { timestamp, .. }
            | ClaimEvent::GuideAttached { timestamp, .. }
            | ClaimEvent::GuideDetached { timestamp, .. }
            | ClaimEvent::BatchReadyToSend { timestamp, .. }
            | ClaimEvent::XmlGenerated { timestamp, .. }
            | ClaimEvent::BatchSubmitted { timestamp, .. }
            | ClaimEvent::BatchProcessing { timestamp, .. }
            | ClaimEvent::ResponseProcessed { timestamp, .. }
            | ClaimEvent::BatchRejected { timestamp, .. }
            | ClaimEvent::BatchPaid { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the guide this event concerns, if any
    pub fn guide_id(&self) -> Option<ClaimGuideId> {
        match self {
            ClaimEvent::LineAdded { guide_id, .. }
            | ClaimEvent::LineRemoved { guide_id, .. }
            | ClaimEvent::GuideSent { guide_id, .. }
            | ClaimEvent::GuideApproved { guide_id, .. }
            | ClaimEvent::GuidePartiallyApproved { guide_id, .. }
            | ClaimEvent::GuideRejected { guide_id, .. }
            | ClaimEvent::GuidePaid { guide_id, .. }
            | ClaimEvent::GuideAttached { guide_id, .. }
            | ClaimEvent::GuideDetached { guide_id, .. } => Some(*guide_id),
            _ => None,
        }
    }

    /// Returns the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            ClaimEvent::LineAdded { .. } => "LineAdded",
            ClaimEvent::LineRemoved { .. } => "LineRemoved",
            ClaimEvent::GuideSent { .. } => "GuideSent",
            ClaimEvent::GuideApproved { .. } => "GuideApproved",
            ClaimEvent::GuidePartiallyApproved { .. } => "GuidePartiallyApproved",
            ClaimEvent::GuideRejected { .. } => "GuideRejected",
            ClaimEvent::GuidePaid { .. } => "GuidePaid",
            ClaimEvent::GuideAttached { .. } => "GuideAttached",
            ClaimEvent::GuideDetached { .. } => "GuideDetached",
            ClaimEvent::BatchReadyToSend { .. } => "BatchReadyToSend",
            ClaimEvent::XmlGenerated { .. } => "XmlGenerated",
            ClaimEvent::BatchSubmitted { .. } => "BatchSubmitted",
            ClaimEvent::BatchProcessing { .. } => "BatchProcessing",
            ClaimEvent::ResponseProcessed { .. } => "ResponseProcessed",
            ClaimEvent::BatchRejected { .. } => "BatchRejected",
            ClaimEvent::BatchPaid { .. } => "BatchPaid",
        }
    }
}
