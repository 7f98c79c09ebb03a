//! Fixed-point money and quantity arithmetic.
//!
//! Monetary values are minor units (COP cents) in `i64`; quantities are
//! ten-thousandths in `i64`. All line math is integer round-half-up so the
//! CUFE input and the UBL amounts are bit-identical across runs.

/// Render minor units as `{units}.{cents:02}` with a dot separator and no
/// thousands grouping (the format DIAN hashes and validates).
#[must_use]
pub fn format_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Render a ten-thousandths quantity with four fractional digits.
#[must_use]
pub fn format_quantity(quantity_e4: i64) -> String {
    let sign = if quantity_e4 < 0 { "-" } else { "" };
    let abs = quantity_e4.unsigned_abs();
    format!("{sign}{}.{:04}", abs / 10_000, abs % 10_000)
}

/// Render a two-decimal percentage (e.g. 1900 -> "19.00").
#[must_use]
pub fn format_percent(rate_e2: i64) -> String {
    format_minor(rate_e2)
}

/// Integer division rounding half away from zero.
#[must_use]
pub fn round_half_up(numerator: i128, denominator: i128) -> i64 {
    debug_assert!(denominator > 0);
    let half = denominator / 2;
    let adjusted = if numerator >= 0 {
        numerator + half
    } else {
        numerator - half
    };
    (adjusted / denominator) as i64
}

/// Line total: `round_half_up(quantity * unit_price)`.
#[must_use]
pub fn line_total(quantity_e4: i64, unit_price_minor: i64) -> i64 {
    round_half_up(i128::from(quantity_e4) * i128::from(unit_price_minor), 10_000)
}

/// Per-line tax: `round_half_up(line_total * rate / 100)` with the rate in
/// hundredths of a percent.
#[must_use]
pub fn line_tax(line_total_minor: i64, rate_e2: i64) -> i64 {
    round_half_up(i128::from(line_total_minor) * i128::from(rate_e2), 10_000)
}
