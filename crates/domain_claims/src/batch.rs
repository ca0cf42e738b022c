//! Claim batch aggregate
//!
//! A batch bundles the guides a clinic sends to one insurance operator in a
//! single submission. It tracks the generated billing XML, the protocol the
//! operator issued, and the operator's batch-level response.
//!
//! # Lifecycle
//!
//! ```text
//! Draft <-> ReadyToSend -> Sent -> Processing -> Processed     -> Paid
//!                           |                 -> PartiallyPaid -> Paid
//!                           |                 -> Rejected
//!                           +-> Rejected
//! ```
//!
//! Changing the guides of a `ReadyToSend` batch discards the generated XML
//! and returns the batch to `Draft`.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use core_kernel::{
    require_text, ClaimBatchId, ClaimGuideId, ClaimLineId, ClinicId, Currency,
    InsuranceOperatorId, Money, TenantId,
};

use crate::adjudication::{
    apply_to_guide, BatchAdjudication, GuideAdjudication, GuideOutcome, ReconciliationReport,
};
use crate::error::ClaimError;
use crate::events::ClaimEvent;
use crate::guide::{ClaimGuide, GuideStatus};
use crate::line::ClaimLine;
use crate::ports::XmlArtifact;
use crate::settings::ClaimsSettings;

/// Batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Being assembled
    Draft,
    /// Billing XML generated, waiting to be transmitted
    ReadyToSend,
    /// Transmitted to the operator
    Sent,
    /// The operator acknowledged and is reviewing
    Processing,
    /// Approved without gloss
    Processed,
    /// Approved with a gloss
    PartiallyPaid,
    Rejected,
    Paid,
}

impl BatchStatus {
    /// Guides may be added or removed in these states
    pub fn is_editable(&self) -> bool {
        matches!(self, BatchStatus::Draft | BatchStatus::ReadyToSend)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Rejected | BatchStatus::Paid)
    }

    /// Transmitted and waiting on the operator
    pub fn is_awaiting_response(&self) -> bool {
        matches!(self, BatchStatus::Sent | BatchStatus::Processing)
    }

    /// The single source of truth for legal batch transitions
    pub fn can_transition_to(&self, target: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, target),
            (Draft, ReadyToSend)
                | (ReadyToSend, Draft)
                | (ReadyToSend, Sent)
                | (Sent, Processing)
                | (Sent, Rejected)
                | (Processing, Processed)
                | (Processing, PartiallyPaid)
                | (Processing, Rejected)
                | (Processed, Paid)
                | (PartiallyPaid, Paid)
        )
    }

    /// Classifies an operator response by its approved and glossed figures
    pub fn classify_response(approved: &Money, glossed: &Money) -> BatchStatus {
        if approved.is_zero() {
            BatchStatus::Rejected
        } else if glossed.is_zero() {
            BatchStatus::Processed
        } else {
            BatchStatus::PartiallyPaid
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchStatus::Draft => "draft",
            BatchStatus::ReadyToSend => "ready_to_send",
            BatchStatus::Sent => "sent",
            BatchStatus::Processing => "processing",
            BatchStatus::Processed => "processed",
            BatchStatus::PartiallyPaid => "partially_paid",
            BatchStatus::Rejected => "rejected",
            BatchStatus::Paid => "paid",
        };
        f.write_str(label)
    }
}

/// A submission of guides to one insurance operator
///
/// The batch total is the sum of its guide totals and is kept in step with
/// every guide change. The batch-level approved and glossed amounts come
/// from the operator's response and are stored as given, independently of
/// the guide-level figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ClaimBatchRecord")]
pub struct ClaimBatch {
    id: ClaimBatchId,
    tenant_id: TenantId,
    clinic_id: ClinicId,
    insurance_operator_id: InsuranceOperatorId,
    batch_number: String,
    status: BatchStatus,
    currency: Currency,
    guides: Vec<ClaimGuide>,
    total_amount: Money,
    max_guides: Option<usize>,
    protocol_number: Option<String>,
    xml_artifact: Option<XmlArtifact>,
    response_file_name: Option<String>,
    approved_amount: Option<Money>,
    glossed_amount: Option<Money>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    events: Vec<ClaimEvent>,
}

impl ClaimBatch {
    /// Creates an empty draft batch
    ///
    /// # Errors
    ///
    /// Returns a validation error if the clinic or operator is unset or the
    /// batch number is blank.
    pub fn new(
        tenant_id: TenantId,
        clinic_id: ClinicId,
        insurance_operator_id: InsuranceOperatorId,
        batch_number: &str,
    ) -> Result<Self, ClaimError> {
        if clinic_id.is_nil() {
            return Err(ClaimError::validation("batch must belong to a clinic"));
        }
        if insurance_operator_id.is_nil() {
            return Err(ClaimError::validation(
                "batch must be addressed to an insurance operator",
            ));
        }
        let batch_number = require_text("batch_number", batch_number)?;
        let now = Utc::now();

        Ok(Self {
            id: ClaimBatchId::new_v7(),
            tenant_id,
            clinic_id,
            insurance_operator_id,
            batch_number,
            status: BatchStatus::Draft,
            currency: Currency::default(),
            guides: Vec::new(),
            total_amount: Money::zero(Currency::default()),
            max_guides: None,
            protocol_number: None,
            xml_artifact: None,
            response_file_name: None,
            approved_amount: None,
            glossed_amount: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            processed_at: None,
            events: Vec::new(),
        })
    }

    /// Formats the `seq`-th batch number for `prefix`, e.g. `LOTE-000042`
    pub fn next_batch_number(prefix: &str, seq: u64) -> String {
        format!("{}-{:06}", prefix.trim(), seq)
    }

    /// Sets the billing currency of an empty batch
    pub fn with_currency(mut self, currency: Currency) -> Self {
        if self.guides.is_empty() {
            self.currency = currency;
            self.total_amount = Money::zero(currency);
        }
        self
    }

    /// Caps the number of guides the batch accepts
    pub fn with_max_guides(mut self, max_guides: usize) -> Self {
        self.max_guides = Some(max_guides);
        self
    }

    /// Applies currency and size limits from settings
    pub fn with_settings(self, settings: &ClaimsSettings) -> Self {
        self.with_currency(settings.currency)
            .with_max_guides(settings.max_guides_per_batch)
    }

    pub fn id(&self) -> ClaimBatchId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn clinic_id(&self) -> ClinicId {
        self.clinic_id
    }

    pub fn insurance_operator_id(&self) -> InsuranceOperatorId {
        self.insurance_operator_id
    }

    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn max_guides(&self) -> Option<usize> {
        self.max_guides
    }

    pub fn guides(&self) -> &[ClaimGuide] {
        &self.guides
    }

    pub fn guide(&self, guide_id: ClaimGuideId) -> Option<&ClaimGuide> {
        self.guides.iter().find(|g| g.id() == guide_id)
    }

    pub fn guide_count(&self) -> usize {
        self.guides.len()
    }

    /// Sum of the guide totals
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn protocol_number(&self) -> Option<&str> {
        self.protocol_number.as_deref()
    }

    pub fn xml_artifact(&self) -> Option<&XmlArtifact> {
        self.xml_artifact.as_ref()
    }

    pub fn xml_file_name(&self) -> Option<&str> {
        self.xml_artifact.as_ref().map(|a| a.file_name.as_str())
    }

    pub fn response_file_name(&self) -> Option<&str> {
        self.response_file_name.as_deref()
    }

    /// Approved amount as reported by the operator for the whole batch
    pub fn approved_amount(&self) -> Option<Money> {
        self.approved_amount
    }

    /// Glossed amount as reported by the operator for the whole batch
    pub fn glossed_amount(&self) -> Option<Money> {
        self.glossed_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    /// Returns accumulated batch and guide events and clears them
    pub fn take_events(&mut self) -> Vec<ClaimEvent> {
        let mut events = std::mem::take(&mut self.events);
        for guide in &mut self.guides {
            events.extend(guide.take_events());
        }
        events.sort_by_key(|e| e.timestamp());
        events
    }

    /// Adds a guide to an editable batch
    ///
    /// # Errors
    ///
    /// - `IllegalState` once the batch has been sent
    /// - `Validation` if the guide is already present, was built for another
    ///   batch or tenant, bills in another currency, is past `Sent`, or the
    ///   batch is full or its total would overflow
    pub fn add_guide(&mut self, guide: ClaimGuide) -> Result<(), ClaimError> {
        self.ensure_editable("add a guide")?;
        if self.guide(guide.id()).is_some() {
            return Err(ClaimError::validation(format!(
                "guide {} is already in batch {}",
                guide.guide_number(),
                self.batch_number
            )));
        }
        if guide.batch_id() != self.id {
            return Err(ClaimError::validation(format!(
                "guide {} belongs to batch {}",
                guide.guide_number(),
                guide.batch_id()
            )));
        }
        if guide.tenant_id() != self.tenant_id {
            return Err(ClaimError::validation("guide belongs to another tenant"));
        }
        if guide.currency() != self.currency {
            return Err(ClaimError::validation(format!(
                "guide bills in {}, batch bills in {}",
                guide.currency(),
                self.currency
            )));
        }
        if !matches!(guide.status(), GuideStatus::Draft | GuideStatus::Sent) {
            return Err(ClaimError::validation(format!(
                "guide {} is already {}",
                guide.guide_number(),
                guide.status()
            )));
        }
        if let Some(max) = self.max_guides {
            if self.guides.len() >= max {
                return Err(ClaimError::validation(format!(
                    "batch {} is full ({} guides)",
                    self.batch_number, max
                )));
            }
        }
        let total = self.total_with(&guide.total_amount())?;

        self.discard_artifact()?;
        let guide_id = guide.id();
        self.guides.push(guide);
        self.total_amount = total;
        self.touch();

        debug!(batch_id = %self.id, guide_id = %guide_id, guides = self.guides.len(), "guide attached");
        self.events.push(ClaimEvent::GuideAttached {
            batch_id: self.id,
            guide_id,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Removes a guide from an editable batch and hands it back
    ///
    /// Returns `Ok(None)` when no such guide exists.
    pub fn remove_guide(
        &mut self,
        guide_id: ClaimGuideId,
    ) -> Result<Option<ClaimGuide>, ClaimError> {
        self.ensure_editable("remove a guide")?;
        let Some(index) = self.guides.iter().position(|g| g.id() == guide_id) else {
            return Ok(None);
        };

        let remaining = self
            .guides
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, g)| g);
        let total = sum_guide_totals(self.currency, remaining)?;

        self.discard_artifact()?;
        let guide = self.guides.remove(index);
        self.total_amount = total;
        self.touch();

        debug!(batch_id = %self.id, guide_id = %guide_id, guides = self.guides.len(), "guide detached");
        self.events.push(ClaimEvent::GuideDetached {
            batch_id: self.id,
            guide_id,
            timestamp: self.updated_at,
        });
        Ok(Some(guide))
    }

    /// Adds a line to one of the batch's draft guides
    pub fn add_line(&mut self, guide_id: ClaimGuideId, line: ClaimLine) -> Result<(), ClaimError> {
        self.edit_guide(guide_id, |guide| guide.add_line(line))
    }

    /// Removes a line from one of the batch's draft guides
    pub fn remove_line(
        &mut self,
        guide_id: ClaimGuideId,
        line_id: ClaimLineId,
    ) -> Result<bool, ClaimError> {
        let mut removed = false;
        self.edit_guide(guide_id, |guide| {
            removed = guide.remove_line(line_id)?;
            Ok(())
        })?;
        Ok(removed)
    }

    /// Changes the quantity of a line on one of the batch's draft guides
    pub fn update_line_quantity(
        &mut self,
        guide_id: ClaimGuideId,
        line_id: ClaimLineId,
        quantity: u32,
    ) -> Result<(), ClaimError> {
        self.edit_guide(guide_id, |guide| guide.update_line_quantity(line_id, quantity))
    }

    /// Changes the unit price of a line on one of the batch's draft guides
    pub fn update_line_unit_price(
        &mut self,
        guide_id: ClaimGuideId,
        line_id: ClaimLineId,
        unit_price: Money,
    ) -> Result<(), ClaimError> {
        self.edit_guide(guide_id, |guide| {
            guide.update_line_unit_price(line_id, unit_price)
        })
    }

    /// Closes the batch for editing
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the batch has no guides or is not a draft.
    pub fn mark_as_ready_to_send(&mut self) -> Result<(), ClaimError> {
        self.ensure_has_guides()?;
        self.transition_to(BatchStatus::ReadyToSend)?;

        self.events.push(ClaimEvent::BatchReadyToSend {
            batch_id: self.id,
            guide_count: self.guides.len(),
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Records the billing XML produced for this batch
    ///
    /// A draft batch becomes `ReadyToSend`. Generating again before
    /// submission replaces the previous artifact.
    ///
    /// # Errors
    ///
    /// - `Validation` if the file name is blank
    /// - `IllegalState` if the batch has no guides or was already sent
    pub fn generate_xml(&mut self, file_name: &str, path: Option<&str>) -> Result<(), ClaimError> {
        let file_name = require_text("file_name", file_name)?;
        let path = path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        self.ensure_editable("generate XML")?;
        self.ensure_has_guides()?;

        if self.status == BatchStatus::Draft {
            self.transition_to(BatchStatus::ReadyToSend)?;
        } else {
            self.touch();
        }
        self.xml_artifact = Some(XmlArtifact {
            file_name: file_name.clone(),
            path,
        });

        debug!(batch_id = %self.id, file_name = %file_name, "billing XML recorded");
        self.events.push(ClaimEvent::XmlGenerated {
            batch_id: self.id,
            file_name,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Records transmission to the operator
    ///
    /// Every draft guide is sent along with the batch. A blank protocol
    /// number is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no XML was generated, the batch is not
    /// ready to send, or a guide has no lines.
    pub fn submit(&mut self, protocol_number: Option<&str>) -> Result<(), ClaimError> {
        if self.xml_artifact.is_none() {
            return Err(ClaimError::illegal_state(format!(
                "batch {} has no generated XML",
                self.batch_number
            )));
        }
        if !self.status.can_transition_to(BatchStatus::Sent) {
            return Err(ClaimError::transition(self.status, BatchStatus::Sent));
        }
        self.check_submittable()?;

        let mut guides = self.guides.clone();
        for guide in guides
            .iter_mut()
            .filter(|g| g.status() == GuideStatus::Draft)
        {
            guide.mark_as_sent()?;
        }

        self.guides = guides;
        self.transition_to(BatchStatus::Sent)?;
        self.protocol_number = protocol_number
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        self.submitted_at = Some(self.updated_at);

        self.events.push(ClaimEvent::BatchSubmitted {
            batch_id: self.id,
            protocol_number: self.protocol_number.clone(),
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Checks that the batch could be transmitted as it stands
    ///
    /// The batch must still be open, hold at least one guide, and every
    /// guide must be a draft with lines or already sent.
    pub fn check_submittable(&self) -> Result<(), ClaimError> {
        self.ensure_editable("submit")?;
        self.ensure_has_guides()?;
        for guide in &self.guides {
            match guide.status() {
                GuideStatus::Draft if guide.line_count() == 0 => {
                    return Err(ClaimError::illegal_state(format!(
                        "guide {} has no lines to send",
                        guide.guide_number()
                    )));
                }
                GuideStatus::Draft | GuideStatus::Sent => {}
                other => {
                    return Err(ClaimError::illegal_state(format!(
                        "guide {} is already {}",
                        guide.guide_number(),
                        other
                    )));
                }
            }
        }
        Ok(())
    }

    /// The operator acknowledged the batch and started reviewing it
    pub fn mark_as_processing(&mut self) -> Result<(), ClaimError> {
        self.transition_to(BatchStatus::Processing)?;
        self.events.push(ClaimEvent::BatchProcessing {
            batch_id: self.id,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Records the operator's batch-level response
    ///
    /// Nothing approved makes the batch `Rejected`; an approval without
    /// gloss makes it `Processed`; anything else is `PartiallyPaid`.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank file name or a negative or foreign-currency
    ///   amount
    /// - `IllegalState` unless the batch is `Processing`
    pub fn process_response(
        &mut self,
        response_file_name: &str,
        approved_amount: Money,
        glossed_amount: Money,
    ) -> Result<BatchStatus, ClaimError> {
        let response_file_name = require_text("response_file_name", response_file_name)?;
        for (field, amount) in [("approved", &approved_amount), ("glossed", &glossed_amount)] {
            if amount.is_negative() {
                return Err(ClaimError::validation(format!(
                    "{} amount must not be negative",
                    field
                )));
            }
            if amount.currency() != self.currency {
                return Err(ClaimError::validation(format!(
                    "{} amount is in {}, batch bills in {}",
                    field,
                    amount.currency(),
                    self.currency
                )));
            }
        }
        if self.status != BatchStatus::Processing {
            return Err(ClaimError::illegal_state(format!(
                "batch {} cannot take a response while {}",
                self.batch_number, self.status
            )));
        }

        let outcome = BatchStatus::classify_response(&approved_amount, &glossed_amount);
        self.transition_to(outcome)?;
        self.response_file_name = Some(response_file_name);
        self.approved_amount = Some(approved_amount);
        self.glossed_amount = Some(glossed_amount);
        self.processed_at = Some(self.updated_at);

        self.events.push(ClaimEvent::ResponseProcessed {
            batch_id: self.id,
            approved_amount,
            glossed_amount,
            outcome,
            timestamp: self.updated_at,
        });
        Ok(outcome)
    }

    /// Records payment of a processed batch
    pub fn mark_as_paid(&mut self) -> Result<(), ClaimError> {
        self.transition_to(BatchStatus::Paid)?;
        self.events.push(ClaimEvent::BatchPaid {
            batch_id: self.id,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// The operator refused the batch outright
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the batch is `Sent`.
    pub fn reject(&mut self) -> Result<(), ClaimError> {
        if self.status != BatchStatus::Sent {
            return Err(ClaimError::transition(self.status, BatchStatus::Rejected));
        }
        self.transition_to(BatchStatus::Rejected)?;
        self.events.push(ClaimEvent::BatchRejected {
            batch_id: self.id,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Applies the operator's verdict to one guide while the batch is being
    /// processed
    pub fn review_guide(
        &mut self,
        guide_id: ClaimGuideId,
        adjudication: &GuideAdjudication,
    ) -> Result<GuideStatus, ClaimError> {
        self.ensure_processing("review a guide")?;
        let guide = self.guide_slot(guide_id)?;
        let status = apply_to_guide(guide, adjudication)?;
        self.touch();
        Ok(status)
    }

    /// Applies a full operator response
    ///
    /// Guide verdicts are applied first, then the batch-level figures. The
    /// whole response is applied or none of it is.
    ///
    /// # Errors
    ///
    /// - `IllegalState` unless the batch is `Processing`
    /// - `Validation` if a verdict names an unknown guide, names the same
    ///   guide twice, or any verdict is itself invalid
    pub fn reconcile(
        &mut self,
        response: &BatchAdjudication,
    ) -> Result<ReconciliationReport, ClaimError> {
        self.ensure_processing("reconcile")?;

        let mut working = self.clone();
        let mut seen = HashSet::new();
        for adjudication in &response.guides {
            if !seen.insert(adjudication.guide_id) {
                return Err(ClaimError::validation(format!(
                    "guide {} is adjudicated twice",
                    adjudication.guide_id
                )));
            }
            let guide = working.guide_slot(adjudication.guide_id)?;
            apply_to_guide(guide, adjudication)?;
        }
        working.process_response(
            &response.response_file_name,
            response.approved_amount,
            response.glossed_amount,
        )?;

        let report = working.reconciliation_report()?;
        if !report.is_balanced() {
            warn!(
                batch_id = %self.id,
                batch_approved = %report.batch_approved_amount,
                guide_approved = %report.guide_approved_amount,
                batch_glossed = %report.batch_glossed_amount,
                guide_glossed = %report.guide_glossed_amount,
                "batch and guide figures disagree"
            );
        }
        *self = working;
        Ok(report)
    }

    /// Billed, approved and glossed figures of a batch with a response
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if no response has been processed yet.
    pub fn reconciliation_report(&self) -> Result<ReconciliationReport, ClaimError> {
        let (Some(batch_approved), Some(batch_glossed)) =
            (self.approved_amount, self.glossed_amount)
        else {
            return Err(ClaimError::illegal_state(format!(
                "batch {} has no operator response",
                self.batch_number
            )));
        };

        let approved: Vec<Money> = self.guides.iter().filter_map(|g| g.approved_amount()).collect();
        let glossed: Vec<Money> = self.guides.iter().filter_map(|g| g.glossed_amount()).collect();
        let guide_approved = Money::sum(self.currency, &approved)?;
        let guide_glossed = Money::sum(self.currency, &glossed)?;

        Ok(ReconciliationReport {
            batch_id: self.id,
            outcome: self.status,
            billed_amount: self.total_amount,
            guide_approved_amount: guide_approved,
            guide_glossed_amount: guide_glossed,
            batch_approved_amount: batch_approved,
            batch_glossed_amount: batch_glossed,
            discrepancy: batch_approved.checked_sub(&guide_approved)?,
            glossed_discrepancy: batch_glossed.checked_sub(&guide_glossed)?,
            guides: self.guides.iter().map(GuideOutcome::of).collect(),
            unanswered_guides: self
                .guides
                .iter()
                .filter(|g| g.status() == GuideStatus::Sent)
                .map(|g| g.id())
                .collect(),
        })
    }

    /// Records payment of one approved guide
    ///
    /// # Errors
    ///
    /// - `IllegalState` before the operator's response is processed, or if
    ///   the guide cannot be paid
    /// - `Validation` for an unknown guide
    pub fn record_guide_payment(&mut self, guide_id: ClaimGuideId) -> Result<(), ClaimError> {
        if !matches!(
            self.status,
            BatchStatus::Processed | BatchStatus::PartiallyPaid | BatchStatus::Paid
        ) {
            return Err(ClaimError::illegal_state(format!(
                "cannot pay guides of batch {} while {}",
                self.batch_number, self.status
            )));
        }
        self.guide_slot(guide_id)?.mark_as_paid()?;
        self.touch();
        Ok(())
    }

    fn edit_guide<F>(&mut self, guide_id: ClaimGuideId, edit: F) -> Result<(), ClaimError>
    where
        F: FnOnce(&mut ClaimGuide) -> Result<(), ClaimError>,
    {
        self.ensure_editable("change a guide")?;
        let index = self.guide_index(guide_id)?;
        let mut edited = self.guides[index].clone();
        edit(&mut edited)?;
        let others = self
            .guides
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, g)| g);
        let total = sum_guide_totals(self.currency, others.chain([&edited]))?;

        self.discard_artifact()?;
        self.guides[index] = edited;
        self.total_amount = total;
        self.touch();
        Ok(())
    }

    /// Batch total after adding `amount`, refusing a total that overflows
    fn total_with(&self, amount: &Money) -> Result<Money, ClaimError> {
        self.total_amount.checked_add(amount).map_err(|_| {
            ClaimError::validation(format!(
                "batch {} total would overflow adding {}",
                self.batch_number, amount
            ))
        })
    }

    /// Drops the generated XML of a ready batch, which no longer matches
    /// its contents, and reopens the batch
    fn discard_artifact(&mut self) -> Result<(), ClaimError> {
        if self.status == BatchStatus::ReadyToSend {
            self.transition_to(BatchStatus::Draft)?;
            self.xml_artifact = None;
        }
        Ok(())
    }

    fn guide_index(&self, guide_id: ClaimGuideId) -> Result<usize, ClaimError> {
        self.guides
            .iter()
            .position(|g| g.id() == guide_id)
            .ok_or_else(|| {
                ClaimError::validation(format!(
                    "guide {} is not in batch {}",
                    guide_id, self.batch_number
                ))
            })
    }

    fn guide_slot(&mut self, guide_id: ClaimGuideId) -> Result<&mut ClaimGuide, ClaimError> {
        let index = self.guide_index(guide_id)?;
        Ok(&mut self.guides[index])
    }

    fn ensure_editable(&self, action: &str) -> Result<(), ClaimError> {
        if !self.status.is_editable() {
            return Err(ClaimError::illegal_state(format!(
                "cannot {} on batch {} while {}",
                action, self.batch_number, self.status
            )));
        }
        Ok(())
    }

    fn ensure_processing(&self, action: &str) -> Result<(), ClaimError> {
        if self.status != BatchStatus::Processing {
            return Err(ClaimError::illegal_state(format!(
                "cannot {} on batch {} while {}",
                action, self.batch_number, self.status
            )));
        }
        Ok(())
    }

    fn ensure_has_guides(&self) -> Result<(), ClaimError> {
        if self.guides.is_empty() {
            return Err(ClaimError::illegal_state(format!(
                "batch {} has no guides",
                self.batch_number
            )));
        }
        Ok(())
    }

    fn transition_to(&mut self, target: BatchStatus) -> Result<(), ClaimError> {
        if !self.status.can_transition_to(target) {
            return Err(ClaimError::transition(self.status, target));
        }
        let from = self.status;
        self.status = target;
        self.touch();

        info!(batch_id = %self.id, from = %from, to = %target, "batch status changed");
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn sum_guide_totals<'a, I>(currency: Currency, guides: I) -> Result<Money, ClaimError>
where
    I: Iterator<Item = &'a ClaimGuide>,
{
    let totals: Vec<Money> = guides.map(|g| g.total_amount()).collect();
    Money::sum(currency, &totals).map_err(|_| {
        ClaimError::validation(format!("batch total of {} guides overflows", totals.len()))
    })
}

/// Stored form of a [`ClaimBatch`]
///
/// Restoring a batch re-checks what its mutators guarantee: guides are
/// unique and owned by the batch, the stored total matches the guides, the
/// guide limit holds and response figures are usable.
#[derive(Deserialize)]
struct ClaimBatchRecord {
    id: ClaimBatchId,
    tenant_id: TenantId,
    clinic_id: ClinicId,
    insurance_operator_id: InsuranceOperatorId,
    batch_number: String,
    status: BatchStatus,
    currency: Currency,
    guides: Vec<ClaimGuide>,
    total_amount: Money,
    max_guides: Option<usize>,
    protocol_number: Option<String>,
    xml_artifact: Option<XmlArtifact>,
    response_file_name: Option<String>,
    approved_amount: Option<Money>,
    glossed_amount: Option<Money>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ClaimBatchRecord> for ClaimBatch {
    type Error = ClaimError;

    fn try_from(record: ClaimBatchRecord) -> Result<Self, Self::Error> {
        if record.clinic_id.is_nil() || record.insurance_operator_id.is_nil() {
            return Err(ClaimError::validation(format!(
                "batch {} has an unset clinic or operator",
                record.id
            )));
        }
        let batch_number = require_text("batch_number", &record.batch_number)?;

        let mut guide_ids = HashSet::new();
        for guide in &record.guides {
            if !guide_ids.insert(guide.id()) {
                return Err(ClaimError::validation(format!(
                    "guide {} appears twice in batch {}",
                    guide.guide_number(),
                    batch_number
                )));
            }
            if guide.batch_id() != record.id || guide.tenant_id() != record.tenant_id {
                return Err(ClaimError::validation(format!(
                    "guide {} does not belong to batch {}",
                    guide.guide_number(),
                    batch_number
                )));
            }
            if guide.currency() != record.currency {
                return Err(ClaimError::validation(format!(
                    "guide {} bills in {}, batch bills in {}",
                    guide.guide_number(),
                    guide.currency(),
                    record.currency
                )));
            }
        }
        if let Some(max) = record.max_guides {
            if record.guides.len() > max {
                return Err(ClaimError::validation(format!(
                    "batch {} holds {} guides, limit is {}",
                    batch_number,
                    record.guides.len(),
                    max
                )));
            }
        }

        let total = sum_guide_totals(record.currency, record.guides.iter())?;
        if record.total_amount != total {
            return Err(ClaimError::validation(format!(
                "batch {} total {} does not match its guides ({})",
                batch_number, record.total_amount, total
            )));
        }

        for amount in record.approved_amount.iter().chain(record.glossed_amount.iter()) {
            if amount.is_negative() || amount.currency() != record.currency {
                return Err(ClaimError::validation(format!(
                    "batch {} response amount {} is not a valid {} figure",
                    batch_number, amount, record.currency
                )));
            }
        }

        Ok(Self {
            id: record.id,
            tenant_id: record.tenant_id,
            clinic_id: record.clinic_id,
            insurance_operator_id: record.insurance_operator_id,
            batch_number,
            status: record.status,
            currency: record.currency,
            guides: record.guides,
            total_amount: total,
            max_guides: record.max_guides,
            protocol_number: record.protocol_number,
            xml_artifact: record.xml_artifact,
            response_file_name: record.response_file_name,
            approved_amount: record.approved_amount,
            glossed_amount: record.glossed_amount,
            created_at: record.created_at,
            updated_at: record.updated_at,
            submitted_at: record.submitted_at,
            processed_at: record.processed_at,
            events: Vec::new(),
        })
    }
}
