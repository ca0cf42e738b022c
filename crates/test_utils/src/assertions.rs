//! Custom Test Assertions
//!
//! Assertion helpers that check the roll-up invariants of lines, guides and
//! batches and report which figure is off.

use std::collections::HashSet;

use core_kernel::Money;
use domain_claims::{ClaimBatch, ClaimGuide, ClaimLine};
use rust_decimal::Decimal;

/// Asserts that a Money value has exactly `expected` as its amount
pub fn assert_amount(actual: &Money, expected: Decimal) {
    assert_eq!(
        actual.amount(),
        expected,
        "Expected {} {}, got {}",
        actual.currency().symbol(),
        expected,
        actual
    );
}

/// Asserts `total == quantity × unit price` and, once settled,
/// `approved + glossed == total`
pub fn assert_line_consistent(line: &ClaimLine) {
    let expected = line.unit_price().amount() * Decimal::from(line.quantity());
    assert_eq!(
        line.total().amount(),
        expected,
        "Line {} total {} != {} x {}",
        line.id(),
        line.total(),
        line.quantity(),
        line.unit_price()
    );

    if let Some(settlement) = line.settlement() {
        let settled = settlement.approved_amount.amount() + settlement.glossed_amount.amount();
        assert_eq!(
            settled,
            line.total().amount(),
            "Line {} settlement {} + {} != total {}",
            line.id(),
            settlement.approved_amount,
            settlement.glossed_amount,
            line.total()
        );
    }
}

/// Asserts that a guide's total is the sum of its lines and that its
/// approval split, if any, adds up
pub fn assert_guide_consistent(guide: &ClaimGuide) {
    let mut line_ids = HashSet::new();
    for line in guide.lines() {
        assert!(line_ids.insert(line.id()), "Line {} appears twice", line.id());
        assert_line_consistent(line);
    }

    let expected: Decimal = guide.lines().iter().map(|l| l.total().amount()).sum();
    assert_eq!(
        guide.total_amount().amount(),
        expected,
        "Guide {} total {} != sum of lines {}",
        guide.guide_number(),
        guide.total_amount(),
        expected
    );

    if let (Some(approved), Some(glossed)) = (guide.approved_amount(), guide.glossed_amount()) {
        assert_eq!(
            approved.amount() + glossed.amount(),
            guide.total_amount().amount(),
            "Guide {} split {} + {} != total {}",
            guide.guide_number(),
            approved,
            glossed,
            guide.total_amount()
        );
    }
}

/// Asserts that a batch's total is the sum of its guides, guides are
/// unique, and every guide is consistent
pub fn assert_batch_consistent(batch: &ClaimBatch) {
    let mut guide_ids = HashSet::new();
    for guide in batch.guides() {
        assert!(
            guide_ids.insert(guide.id()),
            "Guide {} appears twice",
            guide.guide_number()
        );
        assert_eq!(guide.batch_id(), batch.id(), "Guide {} belongs elsewhere", guide.guide_number());
        assert_guide_consistent(guide);
    }

    let expected: Decimal = batch.guides().iter().map(|g| g.total_amount().amount()).sum();
    assert_eq!(
        batch.total_amount().amount(),
        expected,
        "Batch {} total {} != sum of guides {}",
        batch.batch_number(),
        batch.total_amount(),
        expected
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{ClaimBatchBuilder, ClaimGuideBuilder};
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    #[test]
    #[should_panic(expected = "Expected R$ 10")]
    fn test_assert_amount_reports_expected_value() {
        assert_amount(&Money::new(dec!(9.99), Currency::BRL), dec!(10));
    }

    #[test]
    fn test_built_aggregates_are_consistent() {
        let guide = ClaimGuideBuilder::new()
            .with_consultations(2)
            .with_line("40304361", 3, dec!(12.50))
            .build();
        assert_guide_consistent(&guide);
        assert_amount(&guide.total_amount(), dec!(337.50));

        let batch = ClaimBatchBuilder::new()
            .with_guide_totals(&[dec!(300.00), dec!(500.00)])
            .build();
        assert_batch_consistent(&batch);
    }
}
