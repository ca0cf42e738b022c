//! Money types with precise decimal arithmetic
//!
//! Billed, approved and glossed amounts are all fixed-point values. This
//! module wraps `rust_decimal` so that amounts never pass through floating
//! point and always carry their currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Scale every stored amount is rounded to
const STORAGE_SCALE: u32 = 4;

/// Billing currency, serialized as its ISO 4217 code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    BRL,
    USD,
    EUR,
    JPY,
}

impl Currency {
    /// `(code, symbol, minor digits)`
    const fn traits(self) -> (&'static str, &'static str, u32) {
        match self {
            Currency::BRL => ("BRL", "R$", 2),
            Currency::USD => ("USD", "$", 2),
            Currency::EUR => ("EUR", "€", 2),
            Currency::JPY => ("JPY", "¥", 0),
        }
    }

    pub fn code(&self) -> &'static str {
        self.traits().0
    }

    pub fn symbol(&self) -> &'static str {
        self.traits().1
    }

    /// Digits after the decimal point in printed amounts
    pub fn decimal_places(&self) -> u32 {
        self.traits().2
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Arithmetic failure on [`Money`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount in {found} cannot be combined with {expected}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("amount out of range")]
    Overflow,
}

/// A monetary amount with associated currency
///
/// Amounts are stored with 4 decimal places internally. Sums and products
/// of values that were entered at currency precision stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "MoneyRecord")]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

/// Wire form of [`Money`]; rounded to storage scale on the way in
#[derive(Deserialize)]
struct MoneyRecord {
    amount: Decimal,
    currency: Currency,
}

impl From<MoneyRecord> for Money {
    fn from(record: MoneyRecord) -> Self {
        Money::new(record.amount, record.currency)
    }
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(STORAGE_SCALE),
            currency,
        }
    }

    /// Builds an amount from minor units, e.g. centavos for BRL
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self::new(Decimal::new(minor_units, currency.decimal_places()), currency)
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Strictly above zero
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.amount.is_sign_positive()
    }

    /// Strictly below zero
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.amount.is_sign_negative()
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.combine(other, Decimal::checked_add)
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.combine(other, Decimal::checked_sub)
    }

    /// Unit price times a billed quantity
    pub fn times(&self, quantity: u32) -> Result<Money, MoneyError> {
        self.amount
            .checked_mul(Decimal::from(quantity))
            .map(|product| Self::new(product, self.currency))
            .ok_or(MoneyError::Overflow)
    }

    /// Sums amounts starting from zero in `currency`
    ///
    /// Fails on the first amount in another currency.
    pub fn sum<'a, I>(currency: Currency, amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |total, amount| total.checked_add(amount))
    }

    fn combine(
        &self,
        other: &Money,
        op: fn(Decimal, Decimal) -> Option<Decimal>,
    ) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency,
                found: other.currency,
            });
        }
        op(self.amount, other.amount)
            .map(|amount| Self::new(amount, self.currency))
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = self.currency.decimal_places() as usize;
        write!(f, "{} {:.*}", self.currency.symbol(), places, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_currency_is_brl() {
        assert_eq!(Currency::default(), Currency::BRL);
        assert_eq!(serde_json::to_string(&Currency::BRL).unwrap(), "\"BRL\"");
    }

    #[test]
    fn test_from_minor_uses_currency_digits() {
        assert_eq!(Money::from_minor(15050, Currency::BRL).amount(), dec!(150.50));
        assert_eq!(Money::from_minor(1500, Currency::JPY).amount(), dec!(1500));
    }

    #[test]
    fn test_times_quantity() {
        let unit = Money::new(dec!(150.00), Currency::BRL);
        assert_eq!(unit.times(2).unwrap().amount(), dec!(300.00));
        assert!(unit.times(0).unwrap().is_zero());
    }

    #[test]
    fn test_mismatch_names_both_currencies() {
        let brl = Money::new(dec!(100.00), Currency::BRL);
        let usd = Money::new(dec!(100.00), Currency::USD);

        let err = brl.checked_add(&usd).unwrap_err();
        assert_eq!(
            err,
            MoneyError::CurrencyMismatch {
                expected: Currency::BRL,
                found: Currency::USD
            }
        );
        assert_eq!(err.to_string(), "amount in USD cannot be combined with BRL");
    }

    #[test]
    fn test_sum_of_empty_is_zero() {
        let total = Money::sum(Currency::BRL, std::iter::empty()).unwrap();
        assert!(total.is_zero());
        assert_eq!(total.currency(), Currency::BRL);
    }

    #[test]
    fn test_deserialize_rounds_to_storage_scale() {
        let json = r#"{"amount": "10.123456", "currency": "BRL"}"#;
        let m: Money = serde_json::from_str(json).unwrap();
        assert_eq!(m.amount(), dec!(10.1235));
        assert_eq!(m, Money::new(dec!(10.123456), Currency::BRL));
    }

    #[test]
    fn test_display_uses_currency_precision() {
        let m = Money::new(dec!(1234.5), Currency::BRL);
        assert_eq!(m.to_string(), "R$ 1234.50");
    }
}
