//! Decimal-to-minor-unit conversion.
//!
//! Order totals arrive from the storefront as major-unit decimals, while the payment provider
//! reports webhook amounts as minor-unit integers. This module converts the former into the
//! latter so the two can be compared safely.

use crate::MinorUnits;

/// ISO 4217 currencies with no minor unit.
const ZERO_DECIMAL_CURRENCIES: [&str; 15] = [
    "CVE", "DJF", "GNF", "IDR", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "VND", "VUV", "XAF",
    "XOF", "XPF",
];

/// ISO 4217 currencies with a three-decimal minor unit.
const THREE_DECIMAL_CURRENCIES: [&str; 7] = ["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

/// Number of minor-unit decimals for the given ISO currency code. Unknown codes use the
/// common two-decimal subdivision.
pub fn currency_decimals(currency: &str) -> u32 {
    let code = currency.to_ascii_uppercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&code.as_str()) {
        0
    } else if THREE_DECIMAL_CURRENCIES.contains(&code.as_str()) {
        3
    } else {
        2
    }
}

/// Converts a major-unit decimal amount into an integer count of minor units.
///
/// Digits beyond the currency's precision are truncated, never rounded:
/// `sanitize(19.999, "EUR")` is 1999 and `sanitize(100.5, "JPY")` is 100.
pub fn sanitize(amount: f64, currency: &str) -> MinorUnits {
    let decimals = currency_decimals(currency);
    let negative = amount < 0.0;
    // Format with guard digits and truncate textually. Scaling the float directly would let
    // representation error leak into the result (333.33 * 100 is 33332.999... in f64).
    let formatted = format!("{:.*}", decimals as usize + 4, amount.abs());
    let (whole, frac) = formatted.split_once('.').unwrap_or((formatted.as_str(), ""));
    let whole = whole.parse::<i64>().unwrap_or(0);
    let frac = if decimals == 0 {
        0
    } else {
        frac[..decimals as usize].parse::<i64>().unwrap_or(0)
    };
    let value = whole * 10i64.pow(decimals) + frac;
    MinorUnits::from(if negative { -value } else { value })
}
