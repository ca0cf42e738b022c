//! Test Data Builders
//!
//! Builders for guides and batches with sensible defaults. Tests set only
//! the fields they care about and can ask for an aggregate already moved
//! along its lifecycle.

use chrono::NaiveDate;
use core_kernel::{
    ClaimBatchId, ClinicId, Currency, InsuranceOperatorId, Money, TenantId,
};
use domain_claims::{ClaimBatch, ClaimGuide, ClaimLine, GuideType};
use rust_decimal::Decimal;

use crate::fixtures::{DateFixtures, IdFixtures, ProcedureFixtures, StringFixtures};

/// One line a builder will add
#[derive(Debug, Clone)]
struct PendingLine {
    code: String,
    description: String,
    quantity: u32,
    unit_price: Money,
}

/// Builder for constructing test guides
pub struct ClaimGuideBuilder {
    batch_id: ClaimBatchId,
    tenant_id: TenantId,
    guide_number: String,
    guide_type: GuideType,
    service_date: NaiveDate,
    authorization_number: Option<String>,
    currency: Currency,
    lines: Vec<PendingLine>,
}

impl Default for ClaimGuideBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimGuideBuilder {
    /// A consultation guide for a fresh batch and tenant, with no lines
    pub fn new() -> Self {
        Self {
            batch_id: ClaimBatchId::new_v7(),
            tenant_id: IdFixtures::tenant_id(),
            guide_number: StringFixtures::guide_number().to_string(),
            guide_type: GuideType::Consultation,
            service_date: DateFixtures::service_date(),
            authorization_number: None,
            currency: Currency::BRL,
            lines: Vec::new(),
        }
    }

    /// A guide that can be added to `batch`
    pub fn for_batch(batch: &ClaimBatch) -> Self {
        Self {
            batch_id: batch.id(),
            tenant_id: batch.tenant_id(),
            currency: batch.currency(),
            ..Self::new()
        }
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.guide_number = number.into();
        self
    }

    pub fn with_type(mut self, guide_type: GuideType) -> Self {
        self.guide_type = guide_type;
        self
    }

    pub fn with_service_date(mut self, date: NaiveDate) -> Self {
        self.service_date = date;
        self
    }

    pub fn with_authorization_number(mut self, number: impl Into<String>) -> Self {
        self.authorization_number = Some(number.into());
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Adds a line priced in the guide's currency
    pub fn with_line(mut self, code: &str, quantity: u32, unit_price: Decimal) -> Self {
        self.lines.push(PendingLine {
            code: code.to_string(),
            description: format!("Procedimento {}", code),
            quantity,
            unit_price: Money::new(unit_price, self.currency),
        });
        self
    }

    /// Adds `quantity` office consultations at the reference price
    pub fn with_consultations(mut self, quantity: u32) -> Self {
        let reference = ProcedureFixtures::consultation();
        self.lines.push(PendingLine {
            code: reference.code,
            description: reference.description,
            quantity,
            unit_price: reference.reference_price,
        });
        self
    }

    /// Adds a single line whose total is `total`
    pub fn with_total(self, total: Decimal) -> Self {
        self.with_line("10101012", 1, total)
    }

    /// Builds a draft guide
    pub fn build(self) -> ClaimGuide {
        let mut guide = ClaimGuide::new(
            self.batch_id,
            self.tenant_id,
            IdFixtures::appointment_id(),
            IdFixtures::patient_insurance_id(),
            &self.guide_number,
            self.guide_type,
            self.service_date,
        )
        .expect("valid guide")
        .with_currency(self.currency);
        if let Some(number) = self.authorization_number {
            guide = guide.with_authorization_number(number);
        }
        for pending in self.lines {
            let line = ClaimLine::new(
                guide.id(),
                &pending.code,
                &pending.description,
                pending.quantity,
                pending.unit_price,
                guide.tenant_id(),
            )
            .expect("valid line");
            guide.add_line(line).expect("line accepted");
        }
        guide
    }

    /// Builds a guide that has been sent to the operator
    pub fn build_sent(self) -> ClaimGuide {
        let mut guide = self.build();
        guide.mark_as_sent().expect("guide can be sent");
        guide
    }
}

/// Builder for constructing test batches
pub struct ClaimBatchBuilder {
    tenant_id: TenantId,
    clinic_id: ClinicId,
    operator_id: InsuranceOperatorId,
    batch_number: String,
    currency: Currency,
    max_guides: Option<usize>,
    guide_totals: Vec<Decimal>,
}

impl Default for ClaimBatchBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimBatchBuilder {
    /// An empty BRL batch
    pub fn new() -> Self {
        Self {
            tenant_id: IdFixtures::tenant_id(),
            clinic_id: IdFixtures::clinic_id(),
            operator_id: IdFixtures::operator_id(),
            batch_number: StringFixtures::batch_number().to_string(),
            currency: Currency::BRL,
            max_guides: None,
            guide_totals: Vec::new(),
        }
    }

    pub fn with_batch_number(mut self, number: impl Into<String>) -> Self {
        self.batch_number = number.into();
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_max_guides(mut self, max_guides: usize) -> Self {
        self.max_guides = Some(max_guides);
        self
    }

    /// Adds one single-line guide per total
    pub fn with_guide_totals(mut self, totals: &[Decimal]) -> Self {
        self.guide_totals.extend_from_slice(totals);
        self
    }

    /// Builds a draft batch
    pub fn build(self) -> ClaimBatch {
        let mut batch = ClaimBatch::new(
            self.tenant_id,
            self.clinic_id,
            self.operator_id,
            &self.batch_number,
        )
        .expect("valid batch")
        .with_currency(self.currency);
        if let Some(max) = self.max_guides {
            batch = batch.with_max_guides(max);
        }
        for (i, total) in self.guide_totals.iter().enumerate() {
            let guide = ClaimGuideBuilder::for_batch(&batch)
                .with_number(format!("G-{:04}", i + 1))
                .with_total(*total)
                .build();
            batch.add_guide(guide).expect("guide accepted");
        }
        batch
    }

    /// Builds a batch with its billing XML generated
    pub fn build_ready(self) -> ClaimBatch {
        let mut batch = self.build();
        batch
            .generate_xml(StringFixtures::xml_file_name(), None)
            .expect("xml can be generated");
        batch
    }

    /// Builds a batch that was submitted with the fixture protocol
    pub fn build_sent(self) -> ClaimBatch {
        let mut batch = self.build_ready();
        batch
            .submit(Some(StringFixtures::protocol_number()))
            .expect("batch can be submitted");
        batch
    }

    /// Builds a batch the operator is reviewing
    pub fn build_processing(self) -> ClaimBatch {
        let mut batch = self.build_sent();
        batch.mark_as_processing().expect("batch can be processed");
        batch
    }
}
