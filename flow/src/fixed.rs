//! Fixed-point bilinear interpolation.
//!
//! Patch resampling quantizes the bilinear weights to 14 bits and
//! accumulates in integers; the rounding behavior is part of the tracker's
//! numeric contract, not an approximation of floating-point interpolation.

/// Weight precision in bits.
pub const W_BITS: i32 = 14;

/// Scale from the fixed-point accumulators back to float (1 / 2^20).
pub const FLT_SCALE: f32 = 1.0 / (1 << 20) as f32;

/// Round-half-up rescale after a fixed-point multiply-accumulate.
#[inline]
pub fn descale(v: i32, n: i32) -> i32 {
    (v + (1 << (n - 1))) >> n
}

/// The four bilinear corner weights for fractional offsets `(a, b)`,
/// quantized to `W_BITS`; the last weight absorbs the quantization error so
/// the four always sum to exactly `1 << W_BITS`.
#[inline]
pub fn bilinear_weights(a: f32, b: f32) -> [i32; 4] {
    let one = (1 << W_BITS) as f32;
    let iw00 = ((1.0 - a) * (1.0 - b) * one).round_ties_even() as i32;
    let iw01 = (a * (1.0 - b) * one).round_ties_even() as i32;
    let iw10 = ((1.0 - a) * b * one).round_ties_even() as i32;
    let iw11 = (1 << W_BITS) - iw00 - iw01 - iw10;
    [iw00, iw01, iw10, iw11]
}
