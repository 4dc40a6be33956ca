use fixed::types::{I32F32, I64F64};

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. Used for rates,
/// factors, lengths and cost-effectiveness ratios.
pub type Fixed64 = I32F32;

/// Q64.64 fixed-point for products of a rate with a volume or an amount of
/// money. Every `i64` and every `Fixed64` fits without loss.
pub type Wide = I64F64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// A water volume (discharge, capacity, retention) in cubic meters.
pub type Volume = i64;

/// An amount of money in whole currency units.
pub type Money = i64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Widen a fixed-point rate or factor. Lossless.
#[inline]
pub fn widen(v: Fixed64) -> Wide {
    Wide::from_num(v)
}

/// Widen an integer volume or amount into Q64.64. Lossless.
#[inline]
pub fn volume_to_wide(v: Volume) -> Wide {
    Wide::from_num(v)
}

/// `volume * rate` in Q64.64.
#[inline]
pub fn scale(volume: Volume, rate: Fixed64) -> Wide {
    volume_to_wide(volume).saturating_mul(widen(rate))
}

/// Round a Q64.64 amount to the nearest whole unit (half away from zero),
/// saturating at the `i64` range.
#[inline]
pub fn round_wide(v: Wide) -> i64 {
    v.saturating_round().saturating_to_num::<i64>()
}

/// `numerator / denominator` over whole volumes and amounts, narrowed to
/// `Fixed64`. A zero denominator with a positive numerator yields
/// `Fixed64::MAX`; a non-positive numerator always yields zero.
#[inline]
pub fn volume_ratio(numerator: Volume, denominator: Volume) -> Fixed64 {
    if numerator <= 0 {
        return Fixed64::ZERO;
    }
    volume_to_wide(numerator)
        .checked_div(volume_to_wide(denominator))
        .map_or(Fixed64::MAX, Fixed64::saturating_from_num)
}
