//! Money helpers on [`rust_decimal::Decimal`].
//!
//! Prices are plain decimals in the pharmacy's single currency.

use rust_decimal::Decimal;

/// Price times quantity for one sale or order line.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Sum of line totals.
#[must_use]
pub fn sum_totals<I>(totals: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    totals.into_iter().fold(Decimal::ZERO, |acc, total| acc + total)
}
