//! Claim lines
//!
//! A claim line is one billed procedure inside a guide: code, description,
//! quantity and unit price, plus the operator's verdict once the guide has
//! been adjudicated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{require_text, ClaimGuideId, ClaimLineId, Money, TenantId};

use crate::error::ClaimError;
use crate::ports::ProcedureReference;

/// The operator's verdict on one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettlement {
    pub approved_quantity: u32,
    pub approved_amount: Money,
    /// Always `total - approved_amount`
    pub glossed_amount: Money,
    pub gloss_reason: Option<String>,
    pub adjudicated_at: DateTime<Utc>,
}

/// One billed procedure within a guide
///
/// # Invariants
///
/// - `total == quantity × unit_price` after every mutation
/// - once settled, `approved_amount + glossed_amount == total`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClaimLineRecord")]
pub struct ClaimLine {
    id: ClaimLineId,
    guide_id: ClaimGuideId,
    tenant_id: TenantId,
    procedure_code: String,
    description: String,
    quantity: u32,
    unit_price: Money,
    total: Money,
    settlement: Option<LineSettlement>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ClaimLine {
    /// Creates a line attached to `guide_id`
    ///
    /// # Errors
    ///
    /// Returns a validation error if the guide id is unset, the code or
    /// description is blank, the quantity is zero or the unit price is
    /// negative.
    pub fn new(
        guide_id: ClaimGuideId,
        procedure_code: &str,
        description: &str,
        quantity: u32,
        unit_price: Money,
        tenant_id: TenantId,
    ) -> Result<Self, ClaimError> {
        if guide_id.is_nil() {
            return Err(ClaimError::validation("line must be attached to a guide"));
        }
        let procedure_code = require_text("procedure_code", procedure_code)?;
        let description = require_text("description", description)?;
        validate_quantity(quantity)?;
        validate_unit_price(&unit_price)?;

        let total = unit_price.times(quantity)?;
        let now = Utc::now();

        Ok(Self {
            id: ClaimLineId::new_v7(),
            guide_id,
            tenant_id,
            procedure_code,
            description,
            quantity,
            unit_price,
            total,
            settlement: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Creates a line from a catalog entry, copying code, description and
    /// reference price so later catalog changes leave the claim untouched
    pub fn from_reference(
        guide_id: ClaimGuideId,
        reference: &ProcedureReference,
        quantity: u32,
        tenant_id: TenantId,
    ) -> Result<Self, ClaimError> {
        Self::new(
            guide_id,
            &reference.code,
            &reference.description,
            quantity,
            reference.reference_price,
            tenant_id,
        )
    }

    pub fn id(&self) -> ClaimLineId {
        self.id
    }

    pub fn guide_id(&self) -> ClaimGuideId {
        self.guide_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn procedure_code(&self) -> &str {
        &self.procedure_code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    /// Returns quantity × unit price
    pub fn total(&self) -> Money {
        self.total
    }

    pub fn settlement(&self) -> Option<&LineSettlement> {
        self.settlement.as_ref()
    }

    pub fn approved_quantity(&self) -> Option<u32> {
        self.settlement.as_ref().map(|s| s.approved_quantity)
    }

    pub fn approved_amount(&self) -> Option<Money> {
        self.settlement.as_ref().map(|s| s.approved_amount)
    }

    pub fn glossed_amount(&self) -> Option<Money> {
        self.settlement.as_ref().map(|s| s.glossed_amount)
    }

    pub fn gloss_reason(&self) -> Option<&str> {
        self.settlement.as_ref().and_then(|s| s.gloss_reason.as_deref())
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Changes the billed quantity and recomputes the total
    ///
    /// A previous settlement no longer matches the new total and is dropped.
    pub fn update_quantity(&mut self, quantity: u32) -> Result<(), ClaimError> {
        validate_quantity(quantity)?;
        let total = self.unit_price.times(quantity)?;

        self.quantity = quantity;
        self.reprice(total);
        Ok(())
    }

    /// Changes the unit price and recomputes the total
    pub fn update_unit_price(&mut self, unit_price: Money) -> Result<(), ClaimError> {
        validate_unit_price(&unit_price)?;
        if unit_price.currency() != self.unit_price.currency() {
            return Err(ClaimError::validation(format!(
                "unit price must be in {}",
                self.unit_price.currency()
            )));
        }
        let total = unit_price.times(self.quantity)?;

        self.unit_price = unit_price;
        self.reprice(total);
        Ok(())
    }

    /// Records the operator's verdict on this line
    ///
    /// The glossed amount is derived as `total - approved_amount`. A reason
    /// is required whenever anything was glossed. Re-adjudication replaces
    /// the previous verdict.
    ///
    /// # Errors
    ///
    /// Returns a validation error if more units are approved than were
    /// billed, the approved amount is negative, in a different currency or
    /// larger than the total, or if a gloss happened without a reason.
    pub fn process_adjudication(
        &mut self,
        approved_quantity: u32,
        approved_amount: Money,
        gloss_reason: Option<&str>,
    ) -> Result<(), ClaimError> {
        validate_approved_quantity(approved_quantity, self.quantity)?;
        if approved_amount.is_negative() {
            return Err(ClaimError::validation("approved amount must not be negative"));
        }
        let glossed_amount = self.total.checked_sub(&approved_amount)?;
        if glossed_amount.is_negative() {
            return Err(ClaimError::validation(format!(
                "approved amount {} exceeds line total {}",
                approved_amount, self.total
            )));
        }

        let gloss_reason = gloss_reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        if glossed_amount.is_positive() && gloss_reason.is_none() {
            return Err(ClaimError::validation(
                "gloss reason is required when the line is not fully approved",
            ));
        }

        let now = Utc::now();
        self.settlement = Some(LineSettlement {
            approved_quantity,
            approved_amount,
            glossed_amount,
            gloss_reason,
            adjudicated_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn is_adjudicated(&self) -> bool {
        self.settlement.is_some()
    }

    /// Approved in full with no gloss reason recorded
    pub fn is_fully_approved(&self) -> bool {
        self.settlement
            .as_ref()
            .is_some_and(|s| s.approved_amount == self.total && s.gloss_reason.is_none())
    }

    /// Something, but not everything, was approved
    pub fn is_partially_approved(&self) -> bool {
        self.settlement.as_ref().is_some_and(|s| {
            s.approved_amount.is_positive() && s.approved_amount.amount() < self.total.amount()
        })
    }

    /// Adjudicated with nothing approved
    pub fn is_rejected(&self) -> bool {
        self.settlement
            .as_ref()
            .is_some_and(|s| s.approved_amount.is_zero())
    }

    fn reprice(&mut self, total: Money) {
        self.total = total;
        self.settlement = None;
        self.updated_at = Utc::now();
    }
}

/// Stored form of a [`ClaimLine`], checked before it becomes one
#[derive(Deserialize)]
struct ClaimLineRecord {
    id: ClaimLineId,
    guide_id: ClaimGuideId,
    tenant_id: TenantId,
    procedure_code: String,
    description: String,
    quantity: u32,
    unit_price: Money,
    total: Money,
    settlement: Option<LineSettlement>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ClaimLineRecord> for ClaimLine {
    type Error = ClaimError;

    fn try_from(record: ClaimLineRecord) -> Result<Self, Self::Error> {
        if record.guide_id.is_nil() {
            return Err(ClaimError::validation("line must be attached to a guide"));
        }
        let procedure_code = require_text("procedure_code", &record.procedure_code)?;
        let description = require_text("description", &record.description)?;
        validate_quantity(record.quantity)?;
        validate_unit_price(&record.unit_price)?;

        let total = record.unit_price.times(record.quantity)?;
        if record.total != total {
            return Err(ClaimError::validation(format!(
                "line {} total {} is not {} x {}",
                record.id, record.total, record.quantity, record.unit_price
            )));
        }
        if let Some(settlement) = &record.settlement {
            validate_approved_quantity(settlement.approved_quantity, record.quantity)?;
            if settlement.approved_amount.is_negative() || settlement.glossed_amount.is_negative() {
                return Err(ClaimError::validation(format!(
                    "line {} has a negative settlement",
                    record.id
                )));
            }
            let settled = settlement
                .approved_amount
                .checked_add(&settlement.glossed_amount)?;
            if settled != total {
                return Err(ClaimError::validation(format!(
                    "line {} settlement {} does not add up to total {}",
                    record.id, settled, total
                )));
            }
        }

        Ok(Self {
            id: record.id,
            guide_id: record.guide_id,
            tenant_id: record.tenant_id,
            procedure_code,
            description,
            quantity: record.quantity,
            unit_price: record.unit_price,
            total,
            settlement: record.settlement,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

fn validate_approved_quantity(approved: u32, billed: u32) -> Result<(), ClaimError> {
    if approved > billed {
        return Err(ClaimError::validation(format!(
            "approved quantity {} exceeds billed quantity {}",
            approved, billed
        )));
    }
    Ok(())
}

fn validate_quantity(quantity: u32) -> Result<(), ClaimError> {
    if quantity == 0 {
        return Err(ClaimError::validation("quantity must be greater than zero"));
    }
    Ok(())
}

fn validate_unit_price(unit_price: &Money) -> Result<(), ClaimError> {
    if unit_price.is_negative() {
        return Err(ClaimError::validation("unit price must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn brl(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::BRL)
    }

    fn line(quantity: u32, price: rust_decimal::Decimal) -> ClaimLine {
        ClaimLine::new(
            ClaimGuideId::new_v7(),
            "40101012",
            "Consulta em consultório",
            quantity,
            brl(price),
            TenantId::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_total_is_computed_eagerly() {
        let line = line(2, dec!(150.00));
        assert_eq!(line.total().amount(), dec!(300.00));
        assert!(!line.is_adjudicated());
    }

    #[test]
    fn test_zero_price_is_allowed() {
        let line = line(1, dec!(0));
        assert!(line.total().is_zero());
    }

    #[test]
    fn test_unset_guide_is_rejected() {
        let result = ClaimLine::new(
            ClaimGuideId::nil(),
            "40101012",
            "Consulta",
            1,
            brl(dec!(10)),
            TenantId::new(),
        );
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_update_quantity_recomputes_total() {
        let mut line = line(2, dec!(150.00));
        line.update_quantity(3).unwrap();
        assert_eq!(line.total().amount(), dec!(450.00));
        assert!(line.updated_at() >= line.created_at());
    }

    #[test]
    fn test_update_drops_stale_settlement() {
        let mut line = line(2, dec!(150.00));
        line.process_adjudication(2, brl(dec!(300.00)), None).unwrap();
        line.update_unit_price(brl(dec!(100.00))).unwrap();
        assert!(!line.is_adjudicated());
        assert_eq!(line.total().amount(), dec!(200.00));
    }

    #[test]
    fn test_failed_update_leaves_line_unchanged() {
        let mut line = line(2, dec!(150.00));
        let before = line.clone();
        assert!(line.update_quantity(0).is_err());
        assert!(line.update_unit_price(brl(dec!(-1))).is_err());
        assert_eq!(line, before);
    }

    #[test]
    fn test_partial_adjudication_requires_reason() {
        let mut line = line(2, dec!(150.00));
        let err = line.process_adjudication(1, brl(dec!(150.00)), None).unwrap_err();
        assert!(err.is_validation());
        assert!(!line.is_adjudicated());
    }

    #[test]
    fn test_partial_adjudication_splits_total() {
        let mut line = line(2, dec!(150.00));
        line.process_adjudication(1, brl(dec!(150.00)), Some("quantidade excedida"))
            .unwrap();
        assert_eq!(line.glossed_amount().unwrap().amount(), dec!(150.00));
        assert!(line.is_partially_approved());
        assert!(!line.is_fully_approved());
        assert!(!line.is_rejected());
    }

    #[test]
    fn test_full_rejection() {
        let mut line = line(1, dec!(80.00));
        line.process_adjudication(0, brl(dec!(0)), Some("sem autorização"))
            .unwrap();
        assert!(line.is_rejected());
        assert_eq!(line.glossed_amount(), Some(line.total()));
    }

    #[test]
    fn test_approval_above_total_is_rejected() {
        let mut line = line(1, dec!(80.00));
        let err = line.process_adjudication(1, brl(dec!(80.01)), None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_approved_quantity_cannot_exceed_billed() {
        let mut line = line(2, dec!(150.00));
        let err = line.process_adjudication(99, brl(dec!(300.00)), None).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("approved quantity 99"));
        assert!(!line.is_adjudicated());
    }

    #[test]
    fn test_stored_line_is_restored() {
        let mut line = line(2, dec!(150.00));
        line.process_adjudication(1, brl(dec!(150.00)), Some("quantidade excedida"))
            .unwrap();
        let json = serde_json::to_value(&line).unwrap();

        let restored: ClaimLine = serde_json::from_value(json).unwrap();
        assert_eq!(restored, line);
    }

    #[test]
    fn test_stored_line_with_wrong_total_is_refused() {
        let line = line(2, dec!(150.00));
        let mut json = serde_json::to_value(&line).unwrap();
        json["total"]["amount"] = serde_json::json!("999.00");

        let err = serde_json::from_value::<ClaimLine>(json).unwrap_err();
        assert!(err.to_string().contains("is not 2 x"));
    }

    #[test]
    fn test_stored_settlement_must_add_up() {
        let mut line = line(2, dec!(150.00));
        line.process_adjudication(2, brl(dec!(300.00)), None).unwrap();
        let mut json = serde_json::to_value(&line).unwrap();
        json["settlement"]["glossed_amount"]["amount"] = serde_json::json!("50.00");

        assert!(serde_json::from_value::<ClaimLine>(json).is_err());
    }
}
