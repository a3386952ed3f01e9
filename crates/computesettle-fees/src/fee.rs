//! Basis-point fee arithmetic.

use computesettle_types::{Amount, constants::BPS_DENOMINATOR};

/// `floor(amount × bps / 10 000)`.
///
/// Computed as `q × bps + floor(r × bps / 10 000)` with
/// `amount = q × 10 000 + r`, so the product never overflows for any
/// `bps <= 10 000`. Larger rates saturate.
#[must_use]
pub fn fee(amount: Amount, bps: u32) -> Amount {
    let bps = Amount::from(bps);
    let whole = amount / BPS_DENOMINATOR;
    let rest = amount % BPS_DENOMINATOR;
    whole
        .saturating_mul(bps)
        .saturating_add(rest * bps / BPS_DENOMINATOR)
}
