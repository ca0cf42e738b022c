//! Comprehensive tests for domain_claims

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{
    AppointmentId, ClaimBatchId, ClaimGuideId, ClinicId, Currency, InsuranceOperatorId, Money,
    PatientInsuranceId, TenantId,
};

use domain_claims::{
    BatchAdjudication, BatchStatus, ClaimBatch, ClaimGuide, ClaimLine, GuideAdjudication,
    GuideStatus, GuideType, LineAdjudication, ProcedureReference,
};

fn brl(amount: Decimal) -> Money {
    Money::new(amount, Currency::BRL)
}

fn service_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn new_batch() -> ClaimBatch {
    ClaimBatch::new(
        TenantId::new(),
        ClinicId::new(),
        InsuranceOperatorId::new(),
        "LOTE-000001",
    )
    .unwrap()
}

fn new_guide(batch: &ClaimBatch, number: &str) -> ClaimGuide {
    ClaimGuide::new(
        batch.id(),
        batch.tenant_id(),
        AppointmentId::new(),
        PatientInsuranceId::new(),
        number,
        GuideType::Consultation,
        service_date(),
    )
    .unwrap()
}

fn standalone_guide() -> ClaimGuide {
    ClaimGuide::new(
        ClaimBatchId::new_v7(),
        TenantId::new(),
        AppointmentId::new(),
        PatientInsuranceId::new(),
        "G-0001",
        GuideType::SpSadt,
        service_date(),
    )
    .unwrap()
}

fn line_for(guide: &ClaimGuide, quantity: u32, price: Decimal) -> ClaimLine {
    ClaimLine::new(
        guide.id(),
        "40101012",
        "Consulta em consultório",
        quantity,
        brl(price),
        guide.tenant_id(),
    )
    .unwrap()
}

/// A guide holding a single line of the given total
fn guide_with_total(batch: &ClaimBatch, number: &str, total: Decimal) -> ClaimGuide {
    let mut guide = new_guide(batch, number);
    let line = line_for(&guide, 1, total);
    guide.add_line(line).unwrap();
    guide
}

/// A guide with the 2 x 150.00 consultation line, already sent
fn sent_guide() -> ClaimGuide {
    let mut guide = standalone_guide();
    let line = line_for(&guide, 2, dec!(150.00));
    guide.add_line(line).unwrap();
    guide.mark_as_sent().unwrap();
    guide
}

/// A batch in `Processing` holding one guide per total
fn processing_batch(totals: &[Decimal]) -> ClaimBatch {
    let mut batch = new_batch();
    for (i, total) in totals.iter().enumerate() {
        let guide = guide_with_total(&batch, &format!("G-{}", i + 1), *total);
        batch.add_guide(guide).unwrap();
    }
    batch.mark_as_ready_to_send().unwrap();
    batch.generate_xml("LOTE-000001.xml", Some("/billing/out")).unwrap();
    batch.submit(Some("PROT-1")).unwrap();
    batch.mark_as_processing().unwrap();
    batch
}

fn guide_ids(batch: &ClaimBatch) -> Vec<ClaimGuideId> {
    batch.guides().iter().map(|g| g.id()).collect()
}

fn verdict(guide_id: ClaimGuideId, approved: Decimal, reason: Option<&str>) -> GuideAdjudication {
    GuideAdjudication {
        guide_id,
        approved_amount: brl(approved),
        gloss_reason: reason.map(str::to_string),
        lines: Vec::new(),
    }
}

// ============================================================================
// Claim Line Tests
// ============================================================================

mod line_tests {
    use super::*;

    #[test]
    fn test_line_creation_computes_total() {
        let guide = standalone_guide();
        let line = line_for(&guide, 2, dec!(150.00));

        assert_eq!(line.total().amount(), dec!(300.00));
        assert_eq!(line.guide_id(), guide.id());
        assert_eq!(line.procedure_code(), "40101012");
        assert!(line.settlement().is_none());
    }

    #[test]
    fn test_line_creation_rejects_blank_code() {
        let guide = standalone_guide();
        let result = ClaimLine::new(guide.id(), "   ", "Consulta", 1, brl(dec!(10)), guide.tenant_id());
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_line_creation_rejects_blank_description() {
        let guide = standalone_guide();
        let result = ClaimLine::new(guide.id(), "40101012", "", 1, brl(dec!(10)), guide.tenant_id());
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_line_creation_rejects_zero_quantity() {
        let guide = standalone_guide();
        let result =
            ClaimLine::new(guide.id(), "40101012", "Consulta", 0, brl(dec!(10)), guide.tenant_id());
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_line_creation_rejects_negative_price() {
        let guide = standalone_guide();
        let result =
            ClaimLine::new(guide.id(), "40101012", "Consulta", 1, brl(dec!(-0.01)), guide.tenant_id());
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_single_free_procedure_totals_zero() {
        let guide = standalone_guide();
        let line = line_for(&guide, 1, dec!(0));
        assert!(line.total().is_zero());
    }

    #[test]
    fn test_repeated_quantity_update_is_idempotent() {
        let guide = standalone_guide();
        let mut line = line_for(&guide, 2, dec!(150.00));

        line.update_quantity(4).unwrap();
        let first = line.total();
        line.update_quantity(4).unwrap();

        assert_eq!(line.total(), first);
        assert_eq!(line.total().amount(), dec!(600.00));
    }

    #[test]
    fn test_unit_price_in_other_currency_is_rejected() {
        let guide = standalone_guide();
        let mut line = line_for(&guide, 1, dec!(100));
        let err = line
            .update_unit_price(Money::new(dec!(90), Currency::USD))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(line.unit_price().amount(), dec!(100));
    }

    #[test]
    fn test_line_from_catalog_reference_copies_values() {
        let guide = standalone_guide();
        let mut reference = ProcedureReference {
            code: "40301630".to_string(),
            description: "Hemograma completo".to_string(),
            reference_price: brl(dec!(12.50)),
        };
        let line = ClaimLine::from_reference(guide.id(), &reference, 2, guide.tenant_id()).unwrap();

        reference.reference_price = brl(dec!(99.00));
        assert_eq!(line.unit_price().amount(), dec!(12.50));
        assert_eq!(line.total().amount(), dec!(25.00));
        assert_eq!(line.description(), "Hemograma completo");
    }

    #[test]
    fn test_full_approval_is_fully_approved() {
        let guide = standalone_guide();
        let mut line = line_for(&guide, 2, dec!(150.00));
        line.process_adjudication(2, brl(dec!(300.00)), None).unwrap();

        assert!(line.is_fully_approved());
        assert!(!line.is_partially_approved());
        assert!(line.glossed_amount().unwrap().is_zero());
    }

    #[test]
    fn test_readjudication_overwrites_previous_verdict() {
        let guide = standalone_guide();
        let mut line = line_for(&guide, 2, dec!(150.00));
        line.process_adjudication(1, brl(dec!(150.00)), Some("quantidade"))
            .unwrap();
        line.process_adjudication(2, brl(dec!(300.00)), None).unwrap();

        assert_eq!(line.approved_quantity(), Some(2));
        assert!(line.gloss_reason().is_none());
        assert!(line.is_fully_approved());
    }
}

// ============================================================================
// Claim Guide Tests
// ============================================================================

mod guide_tests {
    use super::*;

    #[test]
    fn test_guide_creation() {
        let guide = standalone_guide();
        assert_eq!(guide.status(), GuideStatus::Draft);
        assert!(guide.total_amount().is_zero());
        assert_eq!(guide.currency(), Currency::BRL);
        assert!(guide.approved_amount().is_none());
    }

    #[test]
    fn test_guide_creation_rejects_blank_number() {
        let result = ClaimGuide::new(
            ClaimBatchId::new_v7(),
            TenantId::new(),
            AppointmentId::new(),
            PatientInsuranceId::new(),
            " ",
            GuideType::Consultation,
            service_date(),
        );
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_guide_creation_rejects_unset_appointment() {
        let result = ClaimGuide::new(
            ClaimBatchId::new_v7(),
            TenantId::new(),
            AppointmentId::nil(),
            PatientInsuranceId::new(),
            "G-1",
            GuideType::Consultation,
            service_date(),
        );
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_authorization_number_is_optional() {
        let guide = standalone_guide().with_authorization_number("AUT-778");
        assert_eq!(guide.authorization_number(), Some("AUT-778"));

        let blank = standalone_guide().with_authorization_number("  ");
        assert!(blank.authorization_number().is_none());
    }

    #[test]
    fn test_single_line_guide_total() {
        let mut guide = standalone_guide();
        let line = line_for(&guide, 2, dec!(150.00));
        guide.add_line(line).unwrap();
        assert_eq!(guide.total_amount().amount(), dec!(300.00));
    }

    #[test]
    fn test_remove_line_recomputes_total() {
        let mut guide = standalone_guide();
        let first = line_for(&guide, 2, dec!(150.00));
        let second = line_for(&guide, 1, dec!(80.00));
        let second_id = second.id();
        guide.add_line(first).unwrap();
        guide.add_line(second).unwrap();
        assert_eq!(guide.total_amount().amount(), dec!(380.00));

        assert!(guide.remove_line(second_id).unwrap());
        assert_eq!(guide.total_amount().amount(), dec!(300.00));
        assert_eq!(guide.line_count(), 1);
    }

    #[test]
    fn test_remove_absent_line_is_noop() {
        let mut guide = standalone_guide();
        let line = line_for(&guide, 1, dec!(80.00));
        guide.add_line(line).unwrap();

        let other = line_for(&guide, 1, dec!(10));
        assert!(!guide.remove_line(other.id()).unwrap());
        assert_eq!(guide.total_amount().amount(), dec!(80.00));
    }

    #[test]
    fn test_update_line_through_guide_recomputes_total() {
        let mut guide = standalone_guide();
        let line = line_for(&guide, 2, dec!(150.00));
        let line_id = line.id();
        guide.add_line(line).unwrap();

        guide.update_line_quantity(line_id, 3).unwrap();
        assert_eq!(guide.total_amount().amount(), dec!(450.00));

        guide.update_line_unit_price(line_id, brl(dec!(100.00))).unwrap();
        assert_eq!(guide.total_amount().amount(), dec!(300.00));
    }

    #[test]
    fn test_failed_line_update_leaves_guide_unchanged() {
        let mut guide = standalone_guide();
        let line = line_for(&guide, 2, dec!(150.00));
        let line_id = line.id();
        guide.add_line(line).unwrap();

        assert!(guide.update_line_quantity(line_id, 0).unwrap_err().is_validation());
        assert_eq!(guide.total_amount().amount(), dec!(300.00));
        assert_eq!(guide.line(line_id).unwrap().quantity(), 2);
    }

    #[test]
    fn test_line_in_other_currency_is_rejected() {
        let mut guide = standalone_guide();
        let line = ClaimLine::new(
            guide.id(),
            "40101012",
            "Consulta",
            1,
            Money::new(dec!(50), Currency::USD),
            guide.tenant_id(),
        )
        .unwrap();
        assert!(guide.add_line(line).unwrap_err().is_validation());
        assert_eq!(guide.line_count(), 0);
    }

    #[test]
    fn test_add_line_to_sent_guide_is_illegal() {
        let mut guide = sent_guide();
        let line = line_for(&guide, 1, dec!(10));
        assert!(guide.add_line(line).unwrap_err().is_illegal_state());
        assert_eq!(guide.total_amount().amount(), dec!(300.00));
    }

    #[test]
    fn test_remove_line_from_sent_guide_is_illegal() {
        let mut guide = sent_guide();
        let line_id = guide.lines()[0].id();
        assert!(guide.remove_line(line_id).unwrap_err().is_illegal_state());
        assert_eq!(guide.line_count(), 1);
    }

    #[test]
    fn test_mark_as_sent_records_timestamp() {
        let guide = sent_guide();
        assert_eq!(guide.status(), GuideStatus::Sent);
        assert!(guide.sent_at().is_some());
    }

    #[test]
    fn test_mark_as_sent_twice_is_illegal() {
        let mut guide = sent_guide();
        assert!(guide.mark_as_sent().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_full_approval() {
        let mut guide = sent_guide();
        guide.approve(brl(dec!(300.00))).unwrap();

        assert_eq!(guide.status(), GuideStatus::Approved);
        assert_eq!(guide.approved_amount().unwrap().amount(), dec!(300.00));
        assert!(guide.glossed_amount().unwrap().is_zero());
    }

    #[test]
    fn test_partial_approval() {
        let mut guide = sent_guide();
        guide.approve(brl(dec!(240.00))).unwrap();

        assert_eq!(guide.status(), GuideStatus::PartiallyApproved);
        assert_eq!(guide.glossed_amount().unwrap().amount(), dec!(60.00));
    }

    #[test]
    fn test_approve_draft_is_illegal() {
        let mut guide = standalone_guide();
        let line = line_for(&guide, 1, dec!(100));
        guide.add_line(line).unwrap();

        assert!(guide.approve(brl(dec!(100))).unwrap_err().is_illegal_state());
        assert_eq!(guide.status(), GuideStatus::Draft);
    }

    #[test]
    fn test_approve_negative_is_validation_error() {
        let mut guide = sent_guide();
        assert!(guide.approve(brl(dec!(-1))).unwrap_err().is_validation());
        assert_eq!(guide.status(), GuideStatus::Sent);
    }

    #[test]
    fn test_approve_above_total_is_validation_error() {
        let mut guide = sent_guide();
        assert!(guide.approve(brl(dec!(300.01))).unwrap_err().is_validation());
        assert!(guide.approved_amount().is_none());
    }

    #[test]
    fn test_rejection() {
        let mut guide = sent_guide();
        guide.reject("not authorized").unwrap();

        assert_eq!(guide.status(), GuideStatus::Rejected);
        assert!(guide.approved_amount().unwrap().is_zero());
        assert_eq!(guide.glossed_amount(), Some(guide.total_amount()));
        assert_eq!(guide.gloss_reason(), Some("not authorized"));
    }

    #[test]
    fn test_reject_with_blank_reason_is_validation_error() {
        let mut guide = sent_guide();
        assert!(guide.reject("  ").unwrap_err().is_validation());
        assert_eq!(guide.status(), GuideStatus::Sent);
    }

    #[test]
    fn test_reject_draft_is_illegal() {
        let mut guide = standalone_guide();
        assert!(guide.reject("not authorized").unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_paid_after_approval() {
        let mut guide = sent_guide();
        guide.approve(brl(dec!(240.00))).unwrap();
        guide.mark_as_paid().unwrap();
        assert_eq!(guide.status(), GuideStatus::Paid);
        assert!(guide.status().is_terminal());
    }

    #[test]
    fn test_rejected_guide_cannot_be_paid() {
        let mut guide = sent_guide();
        guide.reject("not authorized").unwrap();
        assert!(guide.mark_as_paid().unwrap_err().is_illegal_state());
        assert_eq!(guide.status(), GuideStatus::Rejected);
    }

    #[test]
    fn test_line_adjudication_requires_sent_guide() {
        let mut guide = standalone_guide();
        let line = line_for(&guide, 1, dec!(100));
        let line_id = line.id();
        guide.add_line(line).unwrap();

        let adjudication = LineAdjudication {
            line_id,
            approved_quantity: 1,
            approved_amount: brl(dec!(100)),
            gloss_reason: None,
        };
        assert!(guide
            .adjudicate_line(line_id, &adjudication)
            .unwrap_err()
            .is_illegal_state());
    }

    #[test]
    fn test_line_adjudications_roll_up() {
        let mut guide = standalone_guide();
        let first = line_for(&guide, 2, dec!(150.00));
        let second = line_for(&guide, 1, dec!(80.00));
        let (first_id, second_id) = (first.id(), second.id());
        guide.add_line(first).unwrap();
        guide.add_line(second).unwrap();
        guide.mark_as_sent().unwrap();

        guide
            .adjudicate_line(
                first_id,
                &LineAdjudication {
                    line_id: first_id,
                    approved_quantity: 1,
                    approved_amount: brl(dec!(150.00)),
                    gloss_reason: Some("quantidade acima do autorizado".to_string()),
                },
            )
            .unwrap();
        guide
            .adjudicate_line(
                second_id,
                &LineAdjudication {
                    line_id: second_id,
                    approved_quantity: 1,
                    approved_amount: brl(dec!(80.00)),
                    gloss_reason: None,
                },
            )
            .unwrap();

        assert_eq!(guide.lines_approved_amount().unwrap().amount(), dec!(230.00));
        assert_eq!(guide.lines_glossed_amount().unwrap().amount(), dec!(150.00));
        assert_eq!(guide.status(), GuideStatus::Sent);
    }
}

// ============================================================================
// Claim Batch Tests
// ============================================================================

mod batch_tests {
    use super::*;

    #[test]
    fn test_batch_creation() {
        let batch = new_batch();
        assert_eq!(batch.status(), BatchStatus::Draft);
        assert_eq!(batch.guide_count(), 0);
        assert!(batch.total_amount().is_zero());
        assert!(batch.protocol_number().is_none());
        assert!(batch.submitted_at().is_none());
    }

    #[test]
    fn test_batch_creation_rejects_unset_clinic() {
        let result = ClaimBatch::new(
            TenantId::new(),
            ClinicId::nil(),
            InsuranceOperatorId::new(),
            "LOTE-000001",
        );
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_batch_totals() {
        let mut batch = new_batch();
        let first = guide_with_total(&batch, "G-1", dec!(300.00));
        let second = guide_with_total(&batch, "G-2", dec!(500.00));
        batch.add_guide(first).unwrap();
        batch.add_guide(second).unwrap();

        assert_eq!(batch.total_amount().amount(), dec!(800.00));
        assert_eq!(batch.guide_count(), 2);
        assert_eq!(batch.total_amount(), batch.total_amount());
        assert_eq!(batch.guide_count(), 2);
    }

    #[test]
    fn test_duplicate_guide_is_validation_error() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        batch.add_guide(guide.clone()).unwrap();

        assert!(batch.add_guide(guide).unwrap_err().is_validation());
        assert_eq!(batch.guide_count(), 1);
    }

    #[test]
    fn test_guide_built_for_other_batch_is_rejected() {
        let mut batch = new_batch();
        let other = new_batch();
        let guide = guide_with_total(&other, "G-1", dec!(300.00));
        assert!(batch.add_guide(guide).unwrap_err().is_validation());
    }

    #[test]
    fn test_batch_capacity() {
        let mut batch = new_batch().with_max_guides(1);
        let first = guide_with_total(&batch, "G-1", dec!(10));
        let second = guide_with_total(&batch, "G-2", dec!(20));
        batch.add_guide(first).unwrap();

        assert!(batch.add_guide(second).unwrap_err().is_validation());
        assert_eq!(batch.guide_count(), 1);
    }

    #[test]
    fn test_remove_guide_hands_it_back() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        let guide_id = guide.id();
        batch.add_guide(guide).unwrap();

        let removed = batch.remove_guide(guide_id).unwrap().unwrap();
        assert_eq!(removed.id(), guide_id);
        assert_eq!(batch.guide_count(), 0);
        assert!(batch.total_amount().is_zero());
    }

    #[test]
    fn test_remove_absent_guide_is_noop() {
        let mut batch = new_batch();
        assert!(batch.remove_guide(ClaimGuideId::new()).unwrap().is_none());
    }

    #[test]
    fn test_line_edits_through_batch_update_total() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        let guide_id = guide.id();
        batch.add_guide(guide).unwrap();

        let extra = line_for(batch.guide(guide_id).unwrap(), 2, dec!(25.00));
        let extra_id = extra.id();
        batch.add_line(guide_id, extra).unwrap();
        assert_eq!(batch.total_amount().amount(), dec!(350.00));

        batch.update_line_quantity(guide_id, extra_id, 4).unwrap();
        assert_eq!(batch.total_amount().amount(), dec!(400.00));

        assert!(batch.remove_line(guide_id, extra_id).unwrap());
        assert_eq!(batch.total_amount().amount(), dec!(300.00));
    }

    #[test]
    fn test_ready_to_send_requires_guides() {
        let mut batch = new_batch();
        assert!(batch.mark_as_ready_to_send().unwrap_err().is_illegal_state());
        assert_eq!(batch.status(), BatchStatus::Draft);
    }

    #[test]
    fn test_generate_xml_rejects_blank_name() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        batch.add_guide(guide).unwrap();

        assert!(batch.generate_xml("  ", None).unwrap_err().is_validation());
        assert!(batch.xml_artifact().is_none());
        assert_eq!(batch.status(), BatchStatus::Draft);
    }

    #[test]
    fn test_generate_xml_moves_draft_to_ready() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        batch.add_guide(guide).unwrap();

        batch.generate_xml("LOTE-000001.xml", Some("/billing/out")).unwrap();
        assert_eq!(batch.status(), BatchStatus::ReadyToSend);
        assert_eq!(batch.xml_file_name(), Some("LOTE-000001.xml"));
        assert_eq!(
            batch.xml_artifact().unwrap().path.as_deref(),
            Some("/billing/out")
        );
    }

    #[test]
    fn test_submit_without_xml_is_illegal() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        batch.add_guide(guide).unwrap();
        batch.mark_as_ready_to_send().unwrap();

        assert!(batch.submit(Some("PROT-1")).unwrap_err().is_illegal_state());
        assert_eq!(batch.status(), BatchStatus::ReadyToSend);
    }

    #[test]
    fn test_submit_sends_draft_guides() {
        let batch = processing_batch(&[dec!(300.00), dec!(500.00)]);
        assert!(batch
            .guides()
            .iter()
            .all(|g| g.status() == GuideStatus::Sent));
        assert_eq!(batch.protocol_number(), Some("PROT-1"));
        assert!(batch.submitted_at().is_some());
    }

    #[test]
    fn test_blank_protocol_is_recorded_as_absent() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        batch.add_guide(guide).unwrap();
        batch.generate_xml("LOTE-000001.xml", None).unwrap();
        batch.submit(Some("   ")).unwrap();

        assert_eq!(batch.status(), BatchStatus::Sent);
        assert!(batch.protocol_number().is_none());
    }

    #[test]
    fn test_add_guide_after_submission_is_illegal() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let late = guide_with_total(&batch, "G-9", dec!(10));
        assert!(batch.add_guide(late).unwrap_err().is_illegal_state());
        assert_eq!(batch.guide_count(), 1);
    }

    #[test]
    fn test_remove_guide_after_submission_is_illegal() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let guide_id = guide_ids(&batch)[0];
        assert!(batch.remove_guide(guide_id).unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_processing_requires_sent() {
        let mut batch = new_batch();
        assert!(batch.mark_as_processing().unwrap_err().is_illegal_state());
        assert_eq!(batch.status(), BatchStatus::Draft);
    }

    #[test]
    fn test_response_with_no_gloss_is_processed() {
        let mut batch = processing_batch(&[dec!(800.00)]);
        let outcome = batch
            .process_response("RESP-1.xml", brl(dec!(800.00)), brl(dec!(0)))
            .unwrap();

        assert_eq!(outcome, BatchStatus::Processed);
        assert_eq!(batch.response_file_name(), Some("RESP-1.xml"));
        assert!(batch.processed_at().is_some());
    }

    #[test]
    fn test_response_with_nothing_approved_is_rejected() {
        let mut batch = processing_batch(&[dec!(800.00)]);
        let outcome = batch
            .process_response("RESP-1.xml", brl(dec!(0)), brl(dec!(800.00)))
            .unwrap();

        assert_eq!(outcome, BatchStatus::Rejected);
        assert!(batch.mark_as_paid().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_response_before_processing_is_illegal() {
        let mut batch = new_batch();
        let err = batch
            .process_response("RESP-1.xml", brl(dec!(10)), brl(dec!(0)))
            .unwrap_err();
        assert!(err.is_illegal_state());
        assert!(batch.approved_amount().is_none());
    }

    #[test]
    fn test_response_with_negative_amount_is_validation_error() {
        let mut batch = processing_batch(&[dec!(800.00)]);
        let err = batch
            .process_response("RESP-1.xml", brl(dec!(800.00)), brl(dec!(-1)))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(batch.status(), BatchStatus::Processing);
    }

    #[test]
    fn test_reject_from_sent() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(300.00));
        batch.add_guide(guide).unwrap();
        batch.generate_xml("LOTE-000001.xml", None).unwrap();
        batch.submit(None).unwrap();

        batch.reject().unwrap();
        assert_eq!(batch.status(), BatchStatus::Rejected);
        assert!(batch.status().is_terminal());
    }

    #[test]
    fn test_reject_while_processing_is_illegal() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        assert!(batch.reject().unwrap_err().is_illegal_state());
        assert_eq!(batch.status(), BatchStatus::Processing);
    }

    #[test]
    fn test_full_batch_lifecycle() {
        let mut batch = new_batch();
        let guide = guide_with_total(&batch, "G-1", dec!(1000.00));
        batch.add_guide(guide).unwrap();

        batch.mark_as_ready_to_send().unwrap();
        batch.generate_xml("LOTE-000001.xml", None).unwrap();
        batch.submit(Some("PROT-1")).unwrap();
        batch.mark_as_processing().unwrap();
        batch
            .process_response("RESP-1.xml", brl(dec!(800)), brl(dec!(200)))
            .unwrap();
        assert_eq!(batch.status(), BatchStatus::PartiallyPaid);

        batch.mark_as_paid().unwrap();
        assert_eq!(batch.status(), BatchStatus::Paid);
    }

    #[test]
    fn test_events_cover_batch_and_guides() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let events = batch.take_events();
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();

        for expected in [
            "LineAdded",
            "GuideAttached",
            "BatchReadyToSend",
            "XmlGenerated",
            "GuideSent",
            "BatchSubmitted",
            "BatchProcessing",
        ] {
            assert!(types.contains(&expected), "missing {}", expected);
        }
        assert!(batch.take_events().is_empty());
    }
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

mod reconciliation_tests {
    use super::*;

    #[test]
    fn test_balanced_reconciliation() {
        let mut batch = processing_batch(&[dec!(300.00), dec!(500.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(740.00)),
            glossed_amount: brl(dec!(60.00)),
            guides: vec![
                verdict(ids[0], dec!(240.00), Some("valor acima da tabela")),
                verdict(ids[1], dec!(500.00), None),
            ],
        };

        let report = batch.reconcile(&response).unwrap();

        assert_eq!(report.outcome, BatchStatus::PartiallyPaid);
        assert_eq!(report.billed_amount.amount(), dec!(800.00));
        assert_eq!(report.guide_approved_amount.amount(), dec!(740.00));
        assert_eq!(report.guide_glossed_amount.amount(), dec!(60.00));
        assert!(report.is_balanced());
        assert!(report.unanswered_guides.is_empty());

        let first = batch.guide(ids[0]).unwrap();
        assert_eq!(first.status(), GuideStatus::PartiallyApproved);
        assert_eq!(first.gloss_reason(), Some("valor acima da tabela"));
        assert_eq!(batch.guide(ids[1]).unwrap().status(), GuideStatus::Approved);
    }

    #[test]
    fn test_batch_figures_are_kept_as_reported() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(299.99)),
            glossed_amount: brl(dec!(0.01)),
            guides: vec![verdict(ids[0], dec!(300.00), None)],
        };

        let report = batch.reconcile(&response).unwrap();

        assert!(!report.is_balanced());
        assert_eq!(report.discrepancy.amount(), dec!(-0.01));
        assert_eq!(report.glossed_discrepancy.amount(), dec!(0.01));
        assert_eq!(batch.approved_amount().unwrap().amount(), dec!(299.99));
        assert_eq!(batch.guide(ids[0]).unwrap().status(), GuideStatus::Approved);
    }

    #[test]
    fn test_matching_approval_with_extra_gloss_is_unbalanced() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(300.00)),
            glossed_amount: brl(dec!(25.00)),
            guides: vec![verdict(ids[0], dec!(300.00), None)],
        };

        let report = batch.reconcile(&response).unwrap();

        assert!(report.discrepancy.is_zero());
        assert_eq!(report.glossed_discrepancy.amount(), dec!(25.00));
        assert!(!report.is_balanced());
    }

    #[test]
    fn test_zero_approval_with_reason_rejects_guide() {
        let mut batch = processing_batch(&[dec!(300.00), dec!(500.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(500.00)),
            glossed_amount: brl(dec!(300.00)),
            guides: vec![
                verdict(ids[0], dec!(0), Some("beneficiário inelegível")),
                verdict(ids[1], dec!(500.00), None),
            ],
        };

        batch.reconcile(&response).unwrap();

        let rejected = batch.guide(ids[0]).unwrap();
        assert_eq!(rejected.status(), GuideStatus::Rejected);
        assert_eq!(rejected.gloss_reason(), Some("beneficiário inelegível"));
    }

    #[test]
    fn test_unanswered_guides_stay_sent() {
        let mut batch = processing_batch(&[dec!(300.00), dec!(500.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(300.00)),
            glossed_amount: brl(dec!(0)),
            guides: vec![verdict(ids[0], dec!(300.00), None)],
        };

        let report = batch.reconcile(&response).unwrap();

        assert_eq!(report.unanswered_guides, vec![ids[1]]);
        assert_eq!(batch.guide(ids[1]).unwrap().status(), GuideStatus::Sent);
    }

    #[test]
    fn test_unknown_guide_leaves_batch_untouched() {
        let mut batch = processing_batch(&[dec!(300.00), dec!(500.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(800.00)),
            glossed_amount: brl(dec!(0)),
            guides: vec![
                verdict(ids[0], dec!(300.00), None),
                verdict(ClaimGuideId::new(), dec!(500.00), None),
            ],
        };

        assert!(batch.reconcile(&response).unwrap_err().is_validation());
        assert_eq!(batch.status(), BatchStatus::Processing);
        assert_eq!(batch.guide(ids[0]).unwrap().status(), GuideStatus::Sent);
        assert!(batch.approved_amount().is_none());
    }

    #[test]
    fn test_guide_adjudicated_twice_is_rejected() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(300.00)),
            glossed_amount: brl(dec!(0)),
            guides: vec![
                verdict(ids[0], dec!(300.00), None),
                verdict(ids[0], dec!(300.00), None),
            ],
        };

        assert!(batch.reconcile(&response).unwrap_err().is_validation());
        assert_eq!(batch.guide(ids[0]).unwrap().status(), GuideStatus::Sent);
    }

    #[test]
    fn test_line_verdicts_are_applied_with_guide() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let guide_id = guide_ids(&batch)[0];
        let line_id = batch.guide(guide_id).unwrap().lines()[0].id();

        let mut guide_verdict = verdict(guide_id, dec!(200.00), Some("glosa parcial"));
        guide_verdict.lines.push(LineAdjudication {
            line_id,
            approved_quantity: 1,
            approved_amount: brl(dec!(200.00)),
            gloss_reason: Some("valor acima da tabela".to_string()),
        });
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(200.00)),
            glossed_amount: brl(dec!(100.00)),
            guides: vec![guide_verdict],
        };

        batch.reconcile(&response).unwrap();

        let guide = batch.guide(guide_id).unwrap();
        let line = guide.line(line_id).unwrap();
        assert_eq!(line.glossed_amount().unwrap().amount(), dec!(100.00));
        assert_eq!(line.gloss_reason(), Some("valor acima da tabela"));
        assert_eq!(guide.lines_approved_amount().unwrap().amount(), dec!(200.00));
    }

    #[test]
    fn test_invalid_line_verdict_fails_whole_response() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let guide_id = guide_ids(&batch)[0];
        let line_id = batch.guide(guide_id).unwrap().lines()[0].id();

        let mut guide_verdict = verdict(guide_id, dec!(200.00), None);
        guide_verdict.lines.push(LineAdjudication {
            line_id,
            approved_quantity: 1,
            approved_amount: brl(dec!(200.00)),
            gloss_reason: None,
        });
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(200.00)),
            glossed_amount: brl(dec!(100.00)),
            guides: vec![guide_verdict],
        };

        assert!(batch.reconcile(&response).unwrap_err().is_validation());
        assert!(!batch.guide(guide_id).unwrap().lines()[0].is_adjudicated());
    }

    #[test]
    fn test_reconcile_before_processing_is_illegal() {
        let mut batch = new_batch();
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(1)),
            glossed_amount: brl(dec!(0)),
            guides: Vec::new(),
        };
        assert!(batch.reconcile(&response).unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_review_single_guide() {
        let mut batch = processing_batch(&[dec!(300.00), dec!(500.00)]);
        let ids = guide_ids(&batch);

        let status = batch
            .review_guide(ids[1], &verdict(ids[1], dec!(450.00), Some("glosa")))
            .unwrap();

        assert_eq!(status, GuideStatus::PartiallyApproved);
        assert_eq!(batch.status(), BatchStatus::Processing);
    }

    #[test]
    fn test_report_requires_response() {
        let batch = processing_batch(&[dec!(300.00)]);
        assert!(batch.reconciliation_report().unwrap_err().is_illegal_state());
    }

    #[test]
    fn test_guide_payment_after_processing() {
        let mut batch = processing_batch(&[dec!(300.00), dec!(500.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(500.00)),
            glossed_amount: brl(dec!(300.00)),
            guides: vec![
                verdict(ids[0], dec!(0), Some("sem autorização")),
                verdict(ids[1], dec!(500.00), None),
            ],
        };
        batch.reconcile(&response).unwrap();

        batch.record_guide_payment(ids[1]).unwrap();
        assert_eq!(batch.guide(ids[1]).unwrap().status(), GuideStatus::Paid);
        assert!(batch
            .record_guide_payment(ids[0])
            .unwrap_err()
            .is_illegal_state());
    }

    #[test]
    fn test_guide_payment_before_response_is_illegal() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let guide_id = guide_ids(&batch)[0];
        assert!(batch
            .record_guide_payment(guide_id)
            .unwrap_err()
            .is_illegal_state());
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut batch = processing_batch(&[dec!(300.00)]);
        let ids = guide_ids(&batch);
        let response = BatchAdjudication {
            response_file_name: "RESP-1.xml".to_string(),
            approved_amount: brl(dec!(300.00)),
            glossed_amount: brl(dec!(0)),
            guides: vec![verdict(ids[0], dec!(300.00), None)],
        };
        let report = batch.reconcile(&response).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "Processed");
        assert_eq!(json["guides"].as_array().unwrap().len(), 1);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn line_total_is_quantity_times_price(
            quantity in 1u32..1_000u32,
            cents in 0i64..10_000_000i64
        ) {
            let guide = standalone_guide();
            let price = Money::from_minor(cents, Currency::BRL);
            let line = ClaimLine::new(guide.id(), "40101012", "Consulta", quantity, price, guide.tenant_id()).unwrap();
            prop_assert_eq!(line.total().amount(), price.amount() * Decimal::from(quantity));
        }

        #[test]
        fn guide_total_is_sum_of_lines(
            lines in prop::collection::vec((1u32..20u32, 0i64..1_000_000i64), 1..15)
        ) {
            let mut guide = standalone_guide();
            let mut expected = Decimal::ZERO;
            for (quantity, cents) in &lines {
                let price = Money::from_minor(*cents, Currency::BRL);
                let line = ClaimLine::new(guide.id(), "40101012", "Consulta", *quantity, price, guide.tenant_id()).unwrap();
                expected += line.total().amount();
                guide.add_line(line).unwrap();
            }
            prop_assert_eq!(guide.total_amount().amount(), expected);
        }

        #[test]
        fn settled_line_splits_total_exactly(
            quantity in 1u32..50u32,
            cents in 1i64..1_000_000i64,
            approved_share in 0u32..=100u32
        ) {
            let guide = standalone_guide();
            let price = Money::from_minor(cents, Currency::BRL);
            let mut line = ClaimLine::new(guide.id(), "40101012", "Consulta", quantity, price, guide.tenant_id()).unwrap();
            let approved = Money::new(
                (line.total().amount() * Decimal::from(approved_share) / Decimal::from(100)).round_dp(2),
                Currency::BRL,
            );
            line.process_adjudication(quantity, approved, Some("glosa")).unwrap();

            let settled = line.approved_amount().unwrap().amount() + line.glossed_amount().unwrap().amount();
            prop_assert_eq!(settled, line.total().amount());
        }

        #[test]
        fn approval_below_total_is_partial(
            total_cents in 2i64..1_000_000i64,
            approved_fraction in 0u32..100u32
        ) {
            let mut guide = standalone_guide();
            let line = ClaimLine::new(
                guide.id(), "40101012", "Consulta", 1,
                Money::from_minor(total_cents, Currency::BRL), guide.tenant_id(),
            ).unwrap();
            guide.add_line(line).unwrap();
            guide.mark_as_sent().unwrap();

            let approved_cents = total_cents * i64::from(approved_fraction) / 100;
            prop_assume!(approved_cents < total_cents);
            guide.approve(Money::from_minor(approved_cents, Currency::BRL)).unwrap();

            prop_assert_eq!(guide.status(), GuideStatus::PartiallyApproved);
            let glossed = guide.glossed_amount().unwrap().amount();
            prop_assert_eq!(glossed + Decimal::new(approved_cents, 2), guide.total_amount().amount());
        }
    }
}
