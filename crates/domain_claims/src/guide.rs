//! Claim guide aggregate
//!
//! A guide bills one appointment against one patient insurance link. It owns
//! its procedure lines, keeps their billed total, and carries the operator's
//! approval decision.
//!
//! # Lifecycle
//!
//! ```text
//! Draft -> Sent -> Approved          -> Paid
//!               -> PartiallyApproved -> Paid
//!               -> Rejected
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use core_kernel::{
    require_text, AppointmentId, ClaimBatchId, ClaimGuideId, ClaimLineId, Currency, Money,
    PatientInsuranceId, TenantId,
};

use crate::adjudication::LineAdjudication;
use crate::error::ClaimError;
use crate::events::ClaimEvent;
use crate::line::ClaimLine;

/// Guide status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuideStatus {
    /// Being assembled; lines may change
    Draft,
    /// Submitted to the operator, awaiting a decision
    Sent,
    /// Approved in full
    Approved,
    /// Approved with a gloss
    PartiallyApproved,
    /// Glossed in full
    Rejected,
    /// Payment received
    Paid,
}

impl GuideStatus {
    /// Lines can only be added, removed or repriced in this state
    pub fn is_editable(&self) -> bool {
        matches!(self, GuideStatus::Draft)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GuideStatus::Rejected | GuideStatus::Paid)
    }

    /// The operator has decided on this guide
    pub fn is_adjudicated(&self) -> bool {
        matches!(
            self,
            GuideStatus::Approved
                | GuideStatus::PartiallyApproved
                | GuideStatus::Rejected
                | GuideStatus::Paid
        )
    }

    /// The single source of truth for legal guide transitions
    pub fn can_transition_to(&self, target: GuideStatus) -> bool {
        use GuideStatus::*;
        matches!(
            (self, target),
            (Draft, Sent)
                | (Sent, Approved)
                | (Sent, PartiallyApproved)
                | (Sent, Rejected)
                | (Approved, Paid)
                | (PartiallyApproved, Paid)
        )
    }
}

impl fmt::Display for GuideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GuideStatus::Draft => "draft",
            GuideStatus::Sent => "sent",
            GuideStatus::Approved => "approved",
            GuideStatus::PartiallyApproved => "partially_approved",
            GuideStatus::Rejected => "rejected",
            GuideStatus::Paid => "paid",
        };
        f.write_str(label)
    }
}

/// Kind of guide form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuideType {
    Consultation,
    /// Services, diagnostics and therapy (SP/SADT)
    SpSadt,
    Hospitalization,
    /// Professional fees
    Fees,
    Dental,
}

/// A claim for one appointment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ClaimGuideRecord")]
pub struct ClaimGuide {
    id: ClaimGuideId,
    batch_id: ClaimBatchId,
    tenant_id: TenantId,
    appointment_id: AppointmentId,
    patient_insurance_id: PatientInsuranceId,
    guide_number: String,
    guide_type: GuideType,
    service_date: NaiveDate,
    authorization_number: Option<String>,
    status: GuideStatus,
    currency: Currency,
    lines: Vec<ClaimLine>,
    total_amount: Money,
    approved_amount: Option<Money>,
    glossed_amount: Option<Money>,
    gloss_reason: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<ClaimEvent>,
}

impl ClaimGuide {
    /// Creates a draft guide owned by `batch_id`
    ///
    /// The guide is billed in BRL unless [`ClaimGuide::with_currency`] says
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any reference is unset or the guide
    /// number is blank.
    pub fn new(
        batch_id: ClaimBatchId,
        tenant_id: TenantId,
        appointment_id: AppointmentId,
        patient_insurance_id: PatientInsuranceId,
        guide_number: &str,
        guide_type: GuideType,
        service_date: NaiveDate,
    ) -> Result<Self, ClaimError> {
        if batch_id.is_nil() {
            return Err(ClaimError::validation("guide must belong to a batch"));
        }
        if appointment_id.is_nil() {
            return Err(ClaimError::validation("guide must reference an appointment"));
        }
        if patient_insurance_id.is_nil() {
            return Err(ClaimError::validation(
                "guide must reference a patient insurance link",
            ));
        }
        let guide_number = require_text("guide_number", guide_number)?;
        let currency = Currency::default();
        let now = Utc::now();

        Ok(Self {
            id: ClaimGuideId::new_v7(),
            batch_id,
            tenant_id,
            appointment_id,
            patient_insurance_id,
            guide_number,
            guide_type,
            service_date,
            authorization_number: None,
            status: GuideStatus::Draft,
            currency,
            lines: Vec::new(),
            total_amount: Money::zero(currency),
            approved_amount: None,
            glossed_amount: None,
            gloss_reason: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
            events: Vec::new(),
        })
    }

    /// Sets the billing currency of a new guide
    pub fn with_currency(mut self, currency: Currency) -> Self {
        if self.lines.is_empty() {
            self.currency = currency;
            self.total_amount = Money::zero(currency);
        }
        self
    }

    /// Records the operator's prior-authorization number
    pub fn with_authorization_number(mut self, number: impl Into<String>) -> Self {
        let number = number.into();
        let number = number.trim();
        self.authorization_number = (!number.is_empty()).then(|| number.to_string());
        self
    }

    pub fn id(&self) -> ClaimGuideId {
        self.id
    }

    pub fn batch_id(&self) -> ClaimBatchId {
        self.batch_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn appointment_id(&self) -> AppointmentId {
        self.appointment_id
    }

    pub fn patient_insurance_id(&self) -> PatientInsuranceId {
        self.patient_insurance_id
    }

    pub fn guide_number(&self) -> &str {
        &self.guide_number
    }

    pub fn guide_type(&self) -> GuideType {
        self.guide_type
    }

    pub fn service_date(&self) -> NaiveDate {
        self.service_date
    }

    pub fn authorization_number(&self) -> Option<&str> {
        self.authorization_number.as_deref()
    }

    pub fn status(&self) -> GuideStatus {
        self.status
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn lines(&self) -> &[ClaimLine] {
        &self.lines
    }

    pub fn line(&self, line_id: ClaimLineId) -> Option<&ClaimLine> {
        self.lines.iter().find(|l| l.id() == line_id)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Sum of all line totals, kept current on every change
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn approved_amount(&self) -> Option<Money> {
        self.approved_amount
    }

    pub fn glossed_amount(&self) -> Option<Money> {
        self.glossed_amount
    }

    pub fn gloss_reason(&self) -> Option<&str> {
        self.gloss_reason.as_deref()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns accumulated domain events and clears them
    pub fn take_events(&mut self) -> Vec<ClaimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Adds a procedure line to a draft guide
    ///
    /// # Errors
    ///
    /// - `IllegalState` unless the guide is a draft
    /// - `Validation` if the line is already present, belongs to another
    ///   guide or tenant, or is priced in another currency
    pub fn add_line(&mut self, line: ClaimLine) -> Result<(), ClaimError> {
        self.ensure_editable("add a line")?;
        if self.line(line.id()).is_some() {
            return Err(ClaimError::validation(format!(
                "line {} is already on guide {}",
                line.id(),
                self.guide_number
            )));
        }
        if line.guide_id() != self.id {
            return Err(ClaimError::validation(format!(
                "line {} belongs to guide {}",
                line.id(),
                line.guide_id()
            )));
        }
        if line.tenant_id() != self.tenant_id {
            return Err(ClaimError::validation("line belongs to another tenant"));
        }
        if line.total().currency() != self.currency {
            return Err(ClaimError::validation(format!(
                "line is priced in {}, guide bills in {}",
                line.total().currency(),
                self.currency
            )));
        }

        let total = sum_totals(self.currency, self.lines.iter().chain(std::iter::once(&line)))?;
        let line_id = line.id();
        self.lines.push(line);
        self.total_amount = total;
        self.touch();

        debug!(guide_id = %self.id, line_id = %line_id, total = %total, "line added to guide");
        self.events.push(ClaimEvent::LineAdded {
            guide_id: self.id,
            line_id,
            guide_total: total,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Removes a line from a draft guide
    ///
    /// Returns `Ok(false)` when no such line exists.
    pub fn remove_line(&mut self, line_id: ClaimLineId) -> Result<bool, ClaimError> {
        self.ensure_editable("remove a line")?;
        if self.line(line_id).is_none() {
            return Ok(false);
        }

        let total = sum_totals(
            self.currency,
            self.lines.iter().filter(|l| l.id() != line_id),
        )?;
        self.lines.retain(|l| l.id() != line_id);
        self.total_amount = total;
        self.touch();

        debug!(guide_id = %self.id, line_id = %line_id, total = %total, "line removed from guide");
        self.events.push(ClaimEvent::LineRemoved {
            guide_id: self.id,
            line_id,
            guide_total: total,
            timestamp: self.updated_at,
        });
        Ok(true)
    }

    /// Changes the quantity of a line on a draft guide
    pub fn update_line_quantity(
        &mut self,
        line_id: ClaimLineId,
        quantity: u32,
    ) -> Result<(), ClaimError> {
        self.edit_line(line_id, |line| line.update_quantity(quantity))
    }

    /// Changes the unit price of a line on a draft guide
    pub fn update_line_unit_price(
        &mut self,
        line_id: ClaimLineId,
        unit_price: Money,
    ) -> Result<(), ClaimError> {
        self.edit_line(line_id, |line| line.update_unit_price(unit_price))
    }

    /// Submits the guide to the operator
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the guide has no lines or is not a draft.
    pub fn mark_as_sent(&mut self) -> Result<(), ClaimError> {
        if self.lines.is_empty() {
            return Err(ClaimError::illegal_state(format!(
                "guide {} has no lines to send",
                self.guide_number
            )));
        }
        self.transition_to(GuideStatus::Sent)?;
        self.sent_at = Some(self.updated_at);

        self.events.push(ClaimEvent::GuideSent {
            guide_id: self.id,
            total_amount: self.total_amount,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Records the operator's approval of `amount`
    ///
    /// Approving the full total yields `Approved`; anything less yields
    /// `PartiallyApproved` with the difference glossed. Approving zero on a
    /// guide with a positive total is a partial approval with everything
    /// glossed; use [`ClaimGuide::reject`] to record a reason.
    ///
    /// # Errors
    ///
    /// - `Validation` if the amount is negative, exceeds the total or is in
    ///   another currency
    /// - `IllegalState` unless the guide has been sent
    pub fn approve(&mut self, amount: Money) -> Result<(), ClaimError> {
        if amount.is_negative() {
            return Err(ClaimError::validation("approved amount must not be negative"));
        }
        let glossed = self.total_amount.checked_sub(&amount)?;
        if glossed.is_negative() {
            return Err(ClaimError::validation(format!(
                "approved amount {} exceeds guide total {}",
                amount, self.total_amount
            )));
        }

        let target = if glossed.is_zero() {
            GuideStatus::Approved
        } else {
            GuideStatus::PartiallyApproved
        };
        self.transition_to(target)?;
        self.approved_amount = Some(amount);
        self.glossed_amount = Some(glossed);

        let event = match target {
            GuideStatus::Approved => ClaimEvent::GuideApproved {
                guide_id: self.id,
                approved_amount: amount,
                timestamp: self.updated_at,
            },
            _ => ClaimEvent::GuidePartiallyApproved {
                guide_id: self.id,
                approved_amount: amount,
                glossed_amount: glossed,
                timestamp: self.updated_at,
            },
        };
        self.events.push(event);
        Ok(())
    }

    /// Records a full gloss of the guide
    ///
    /// # Errors
    ///
    /// - `Validation` if the reason is blank
    /// - `IllegalState` unless the guide has been sent
    pub fn reject(&mut self, reason: &str) -> Result<(), ClaimError> {
        let reason = require_text("reason", reason)?;
        self.transition_to(GuideStatus::Rejected)?;
        self.approved_amount = Some(Money::zero(self.currency));
        self.glossed_amount = Some(self.total_amount);
        self.gloss_reason = Some(reason.clone());

        self.events.push(ClaimEvent::GuideRejected {
            guide_id: self.id,
            glossed_amount: self.total_amount,
            reason,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Keeps the operator's explanation for a partial gloss
    pub(crate) fn record_gloss_reason(&mut self, reason: &str) {
        let reason = reason.trim();
        if !reason.is_empty() {
            self.gloss_reason = Some(reason.to_string());
        }
    }

    /// Records payment of an approved or partially approved guide
    pub fn mark_as_paid(&mut self) -> Result<(), ClaimError> {
        self.transition_to(GuideStatus::Paid)?;
        self.events.push(ClaimEvent::GuidePaid {
            guide_id: self.id,
            timestamp: self.updated_at,
        });
        Ok(())
    }

    /// Records the operator's verdict on one line of a sent guide
    ///
    /// # Errors
    ///
    /// - `IllegalState` unless the guide has been sent
    /// - `Validation` for an unknown line or an invalid verdict
    pub fn adjudicate_line(
        &mut self,
        line_id: ClaimLineId,
        adjudication: &LineAdjudication,
    ) -> Result<(), ClaimError> {
        if self.status != GuideStatus::Sent {
            return Err(ClaimError::illegal_state(format!(
                "cannot adjudicate lines of guide {} while {}",
                self.guide_number, self.status
            )));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id() == line_id)
            .ok_or_else(|| {
                ClaimError::validation(format!("line {} is not on this guide", line_id))
            })?;
        line.process_adjudication(
            adjudication.approved_quantity,
            adjudication.approved_amount,
            adjudication.gloss_reason.as_deref(),
        )?;
        self.touch();
        Ok(())
    }

    /// Sum of approved amounts over adjudicated lines
    pub fn lines_approved_amount(&self) -> Result<Money, ClaimError> {
        let approved: Vec<Money> = self.lines.iter().filter_map(|l| l.approved_amount()).collect();
        Ok(Money::sum(self.currency, &approved)?)
    }

    /// Sum of glossed amounts over adjudicated lines
    pub fn lines_glossed_amount(&self) -> Result<Money, ClaimError> {
        let glossed: Vec<Money> = self.lines.iter().filter_map(|l| l.glossed_amount()).collect();
        Ok(Money::sum(self.currency, &glossed)?)
    }

    fn edit_line<F>(&mut self, line_id: ClaimLineId, edit: F) -> Result<(), ClaimError>
    where
        F: FnOnce(&mut ClaimLine) -> Result<(), ClaimError>,
    {
        self.ensure_editable("change a line")?;
        let mut edited = self
            .line(line_id)
            .cloned()
            .ok_or_else(|| {
                ClaimError::validation(format!("line {} is not on this guide", line_id))
            })?;
        edit(&mut edited)?;

        let total = sum_totals(
            self.currency,
            self.lines
                .iter()
                .map(|l| if l.id() == line_id { &edited } else { l }),
        )?;
        if let Some(slot) = self.lines.iter_mut().find(|l| l.id() == line_id) {
            *slot = edited;
        }
        self.total_amount = total;
        self.touch();

        debug!(guide_id = %self.id, line_id = %line_id, total = %total, "line repriced");
        Ok(())
    }

    fn ensure_editable(&self, action: &str) -> Result<(), ClaimError> {
        if !self.status.is_editable() {
            return Err(ClaimError::illegal_state(format!(
                "cannot {} on guide {} while {}",
                action, self.guide_number, self.status
            )));
        }
        Ok(())
    }

    fn transition_to(&mut self, target: GuideStatus) -> Result<(), ClaimError> {
        if !self.status.can_transition_to(target) {
            return Err(ClaimError::transition(self.status, target));
        }
        let from = self.status;
        self.status = target;
        self.touch();

        info!(guide_id = %self.id, from = %from, to = %target, "guide status changed");
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Stored form of a [`ClaimGuide`]
///
/// Restoring a guide re-checks what its mutators guarantee: lines are
/// unique and owned by the guide, the total is the sum of the lines, and
/// approval figures match the status.
#[derive(Deserialize)]
struct ClaimGuideRecord {
    id: ClaimGuideId,
    batch_id: ClaimBatchId,
    tenant_id: TenantId,
    appointment_id: AppointmentId,
    patient_insurance_id: PatientInsuranceId,
    guide_number: String,
    guide_type: GuideType,
    service_date: NaiveDate,
    authorization_number: Option<String>,
    status: GuideStatus,
    currency: Currency,
    lines: Vec<ClaimLine>,
    total_amount: Money,
    approved_amount: Option<Money>,
    glossed_amount: Option<Money>,
    gloss_reason: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ClaimGuideRecord> for ClaimGuide {
    type Error = ClaimError;

    fn try_from(record: ClaimGuideRecord) -> Result<Self, Self::Error> {
        if record.batch_id.is_nil()
            || record.appointment_id.is_nil()
            || record.patient_insurance_id.is_nil()
        {
            return Err(ClaimError::validation(format!(
                "guide {} has an unset reference",
                record.id
            )));
        }
        let guide_number = require_text("guide_number", &record.guide_number)?;

        let mut line_ids = HashSet::new();
        for line in &record.lines {
            if !line_ids.insert(line.id()) {
                return Err(ClaimError::validation(format!(
                    "line {} appears twice on guide {}",
                    line.id(),
                    guide_number
                )));
            }
            if line.guide_id() != record.id || line.tenant_id() != record.tenant_id {
                return Err(ClaimError::validation(format!(
                    "line {} does not belong to guide {}",
                    line.id(),
                    guide_number
                )));
            }
            if line.total().currency() != record.currency {
                return Err(ClaimError::validation(format!(
                    "line {} is priced in {}, guide bills in {}",
                    line.id(),
                    line.total().currency(),
                    record.currency
                )));
            }
        }

        let total = sum_totals(record.currency, record.lines.iter())?;
        if record.total_amount != total {
            return Err(ClaimError::validation(format!(
                "guide {} total {} does not match its lines ({})",
                guide_number, record.total_amount, total
            )));
        }

        match (record.approved_amount, record.glossed_amount) {
            (Some(approved), Some(glossed)) if record.status.is_adjudicated() => {
                if approved.is_negative()
                    || glossed.is_negative()
                    || approved.checked_add(&glossed)? != total
                {
                    return Err(ClaimError::validation(format!(
                        "guide {} approval {} + {} does not add up to {}",
                        guide_number, approved, glossed, total
                    )));
                }
            }
            (None, None) if !record.status.is_adjudicated() => {}
            _ => {
                return Err(ClaimError::validation(format!(
                    "guide {} approval figures do not match status {}",
                    guide_number, record.status
                )));
            }
        }

        Ok(Self {
            id: record.id,
            batch_id: record.batch_id,
            tenant_id: record.tenant_id,
            appointment_id: record.appointment_id,
            patient_insurance_id: record.patient_insurance_id,
            guide_number,
            guide_type: record.guide_type,
            service_date: record.service_date,
            authorization_number: record.authorization_number,
            status: record.status,
            currency: record.currency,
            lines: record.lines,
            total_amount: total,
            approved_amount: record.approved_amount,
            glossed_amount: record.glossed_amount,
            gloss_reason: record.gloss_reason,
            sent_at: record.sent_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
            events: Vec::new(),
        })
    }
}

fn sum_totals<'a, I>(currency: Currency, lines: I) -> Result<Money, ClaimError>
where
    I: Iterator<Item = &'a ClaimLine>,
{
    let totals: Vec<Money> = lines.map(|l| l.total()).collect();
    Ok(Money::sum(currency, &totals)?)
}
