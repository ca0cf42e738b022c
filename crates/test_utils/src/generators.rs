//! Property-Based Test Generators
//!
//! Proptest strategies for claim data that respects domain input rules:
//! positive quantities, non-negative prices, non-blank codes.

use core_kernel::{Currency, Money};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for billing currencies
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::BRL),
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::JPY),
    ]
}

/// Strategy for unit prices in BRL, zero included
pub fn unit_price_strategy() -> impl Strategy<Value = Money> {
    (0i64..5_000_000i64).prop_map(|cents| Money::from_minor(cents, Currency::BRL))
}

/// Strategy for billed quantities
pub fn quantity_strategy() -> impl Strategy<Value = u32> {
    1u32..100u32
}

/// Strategy for eight-digit procedure codes
pub fn procedure_code_strategy() -> impl Strategy<Value = String> {
    "[1-4][0-9]{7}"
}

/// Strategy for `(code, quantity, unit price)` line inputs
pub fn line_input_strategy() -> impl Strategy<Value = (String, u32, Money)> {
    (procedure_code_strategy(), quantity_strategy(), unit_price_strategy())
}

/// Strategy for the line inputs of one guide
pub fn guide_lines_strategy(max_lines: usize) -> impl Strategy<Value = Vec<(String, u32, Money)>> {
    prop::collection::vec(line_input_strategy(), 1..=max_lines.max(1))
}

/// Strategy for guide totals in a batch
pub fn guide_totals_strategy(max_guides: usize) -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(
        (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2)),
        1..=max_guides.max(1),
    )
}

/// Strategy for the share of a total the operator approves, in percent
pub fn approval_percent_strategy() -> impl Strategy<Value = u32> {
    0u32..=100u32
}

/// Approved amount for `percent` of `total`, rounded to cents
pub fn approved_share(total: &Money, percent: u32) -> Money {
    let amount = (total.amount() * Decimal::from(percent) / Decimal::from(100)).round_dp(2);
    Money::new(amount, total.currency())
}
