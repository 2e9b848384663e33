//! Patch dissimilarity metrics.
//!
//! Scores are raw sums over the window, not means: the sparse matcher's
//! winner selection and the refiner's zero-as-unknown cache both rely on the
//! unnormalized values. Lower is more similar.

use wide::f32x8;

use parallax_core::{Error, Result};
use parallax_imgproc::GrayImageF32;

/// A small pixel window extracted around a candidate match.
#[derive(Debug, Clone)]
pub struct Patch {
    width: usize,
    height: usize,
    data: PatchData,
}

/// Supported pixel encodings for patch comparison.
#[derive(Debug, Clone)]
pub enum PatchData {
    U8(Vec<u8>),
    F32(Vec<f32>),
    /// Interleaved 2-channel signed 16-bit, where the effective intensity of
    /// a pixel is the mean of its two channels.
    HalfI16(Vec<i16>),
}

impl Patch {
    pub fn from_u8(data: Vec<u8>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data: PatchData::U8(data),
        }
    }

    pub fn from_f32(data: Vec<f32>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data: PatchData::F32(data),
        }
    }

    pub fn from_half_i16(data: Vec<i16>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), 2 * width * height);
        Self {
            width,
            height,
            data: PatchData::HalfI16(data),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn encoding(&self) -> &'static str {
        match self.data {
            PatchData::U8(_) => "u8",
            PatchData::F32(_) => "f32",
            PatchData::HalfI16(_) => "half-i16",
        }
    }
}

impl From<&GrayImageF32> for Patch {
    fn from(img: &GrayImageF32) -> Self {
        Self::from_f32(
            img.as_raw().clone(),
            img.width() as usize,
            img.height() as usize,
        )
    }
}

/// Cost strategy for window comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingCost {
    /// Sum of squared intensity differences.
    Ssd,
    /// Sum of absolute intensity differences.
    Sad,
}

impl MatchingCost {
    pub fn score(&self, a: &Patch, b: &Patch) -> Result<f32> {
        check_comparable(a, b)?;
        Ok(self.score_unchecked(a, b))
    }

    /// Score two windows already known to agree in size and encoding.
    pub(crate) fn score_unchecked(&self, a: &Patch, b: &Patch) -> f32 {
        match (&a.data, &b.data) {
            (PatchData::U8(da), PatchData::U8(db)) => match self {
                MatchingCost::Ssd => ssd_u8(da, db),
                MatchingCost::Sad => sad_u8(da, db),
            },
            (PatchData::F32(da), PatchData::F32(db)) => match self {
                MatchingCost::Ssd => ssd_f32(da, db),
                MatchingCost::Sad => sad_f32(da, db),
            },
            (PatchData::HalfI16(da), PatchData::HalfI16(db)) => match self {
                MatchingCost::Ssd => ssd_half_i16(da, db),
                MatchingCost::Sad => sad_half_i16(da, db),
            },
            _ => f32::INFINITY,
        }
    }
}

/// Sum of squared differences between two windows.
pub fn ssd(a: &Patch, b: &Patch) -> Result<f32> {
    MatchingCost::Ssd.score(a, b)
}

/// Sum of absolute differences between two windows.
pub fn sad(a: &Patch, b: &Patch) -> Result<f32> {
    MatchingCost::Sad.score(a, b)
}

fn check_comparable(a: &Patch, b: &Patch) -> Result<()> {
    if a.width != b.width || a.height != b.height {
        return Err(Error::DimensionMismatch(format!(
            "{}x{} vs {}x{}",
            a.width, a.height, b.width, b.height
        )));
    }
    if std::mem::discriminant(&a.data) != std::mem::discriminant(&b.data) {
        return Err(Error::InvalidInput(format!(
            "patch encodings differ: {} vs {}",
            a.encoding(),
            b.encoding()
        )));
    }
    Ok(())
}

#[inline]
fn lanes(chunk: &[u8]) -> f32x8 {
    f32x8::from(std::array::from_fn::<f32, 8, _>(|i| chunk[i] as f32))
}

#[inline]
fn lanes_f32(chunk: &[f32]) -> f32x8 {
    f32x8::from(std::array::from_fn::<f32, 8, _>(|i| chunk[i]))
}

pub(crate) fn ssd_u8(a: &[u8], b: &[u8]) -> f32 {
    let mut acc = f32x8::ZERO;
    let ca = a.chunks_exact(8);
    let cb = b.chunks_exact(8);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    for (ka, kb) in ca.zip(cb) {
        let d = lanes(ka) - lanes(kb);
        acc += d * d;
    }
    let mut score = acc.reduce_add();
    for (&va, &vb) in ra.iter().zip(rb) {
        let d = va as f32 - vb as f32;
        score += d * d;
    }
    score
}

pub(crate) fn sad_u8(a: &[u8], b: &[u8]) -> f32 {
    let mut acc = f32x8::ZERO;
    let ca = a.chunks_exact(8);
    let cb = b.chunks_exact(8);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    for (ka, kb) in ca.zip(cb) {
        acc += (lanes(ka) - lanes(kb)).abs();
    }
    let mut score = acc.reduce_add();
    for (&va, &vb) in ra.iter().zip(rb) {
        score += (va as f32 - vb as f32).abs();
    }
    score
}

fn ssd_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = f32x8::ZERO;
    let ca = a.chunks_exact(8);
    let cb = b.chunks_exact(8);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    for (ka, kb) in ca.zip(cb) {
        let d = lanes_f32(ka) - lanes_f32(kb);
        acc += d * d;
    }
    let mut score = acc.reduce_add();
    for (&va, &vb) in ra.iter().zip(rb) {
        let d = va - vb;
        score += d * d;
    }
    score
}

fn sad_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut acc = f32x8::ZERO;
    let ca = a.chunks_exact(8);
    let cb = b.chunks_exact(8);
    let (ra, rb) = (ca.remainder(), cb.remainder());
    for (ka, kb) in ca.zip(cb) {
        acc += (lanes_f32(ka) - lanes_f32(kb)).abs();
    }
    let mut score = acc.reduce_add();
    for (&va, &vb) in ra.iter().zip(rb) {
        score += (va - vb).abs();
    }
    score
}

fn ssd_half_i16(a: &[i16], b: &[i16]) -> f32 {
    let mut score = 0.0f32;
    for (pa, pb) in a.chunks_exact(2).zip(b.chunks_exact(2)) {
        let ia = 0.5 * pa[0] as f32 + 0.5 * pa[1] as f32;
        let ib = 0.5 * pb[0] as f32 + 0.5 * pb[1] as f32;
        let d = ia - ib;
        score += d * d;
    }
    score
}

fn sad_half_i16(a: &[i16], b: &[i16]) -> f32 {
    let mut score = 0.0f32;
    for (pa, pb) in a.chunks_exact(2).zip(b.chunks_exact(2)) {
        let ia = 0.5 * pa[0] as f32 + 0.5 * pa[1] as f32;
        let ib = 0.5 * pb[0] as f32 + 0.5 * pb[1] as f32;
        score += (ia - ib).abs();
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_windows_score_zero() {
        let a = Patch::from_u8(vec![10; 25], 5, 5);
        let b = Patch::from_u8(vec![10; 25], 5, 5);
        assert_eq!(ssd(&a, &b).unwrap(), 0.0);
        assert_eq!(sad(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_known_differences() {
        // 11x1 exercises both the SIMD lanes and the scalar remainder.
        let a = Patch::from_u8(vec![10; 11], 11, 1);
        let b = Patch::from_u8(vec![13; 11], 11, 1);
        assert_eq!(ssd(&a, &b).unwrap(), 11.0 * 9.0);
        assert_eq!(sad(&a, &b).unwrap(), 11.0 * 3.0);
    }

    #[test]
    fn test_f32_windows() {
        let a = Patch::from_f32(vec![1.5; 9], 3, 3);
        let b = Patch::from_f32(vec![0.5; 9], 3, 3);
        assert_eq!(ssd(&a, &b).unwrap(), 9.0);
        assert_eq!(sad(&a, &b).unwrap(), 9.0);
    }

    #[test]
    fn test_half_i16_mean_intensity() {
        // Channels (4, 8) average to 6; (2, 2) to 2: difference 4 per pixel.
        let a = Patch::from_half_i16(vec![4, 8, 4, 8], 2, 1);
        let b = Patch::from_half_i16(vec![2, 2, 2, 2], 2, 1);
        assert_eq!(sad(&a, &b).unwrap(), 8.0);
        assert_eq!(ssd(&a, &b).unwrap(), 32.0);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let a = Patch::from_u8(vec![0; 25], 5, 5);
        let b = Patch::from_u8(vec![0; 9], 3, 3);
        assert!(ssd(&a, &b).is_err());
        assert!(sad(&a, &b).is_err());
    }

    #[test]
    fn test_encoding_mismatch_is_rejected() {
        let a = Patch::from_u8(vec![0; 9], 3, 3);
        let b = Patch::from_f32(vec![0.0; 9], 3, 3);
        assert!(ssd(&a, &b).is_err());
    }

    #[test]
    fn test_simd_matches_scalar() {
        let a: Vec<u8> = (0..64).map(|i| (i * 7 % 251) as u8).collect();
        let b: Vec<u8> = (0..64).map(|i| (i * 13 % 239) as u8).collect();

        let expected_ssd: f32 = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| {
                let d = x as f32 - y as f32;
                d * d
            })
            .sum();
        let expected_sad: f32 = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| (x as f32 - y as f32).abs())
            .sum();

        let pa = Patch::from_u8(a, 8, 8);
        let pb = Patch::from_u8(b, 8, 8);
        assert_eq!(ssd(&pa, &pb).unwrap(), expected_ssd);
        assert_eq!(sad(&pa, &pb).unwrap(), expected_sad);
    }
}
