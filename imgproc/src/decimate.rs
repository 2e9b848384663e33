//! Exact integer decimation.

use image::{ImageBuffer, Pixel};

use crate::{ImgprocError, Result};

/// Keep every `decimation`-th pixel in both directions.
///
/// Unlike an area resize this never blends values, which matters for depth
/// images where averaging across an occlusion edge invents geometry. The
/// image dimensions must divide exactly.
pub fn decimate<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    decimation: u32,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel + 'static,
{
    if decimation == 0 {
        return Err(ImgprocError::InvalidParameters(
            "decimation must be at least 1".to_string(),
        ));
    }
    if decimation == 1 {
        return Ok(image.clone());
    }
    let (w, h) = image.dimensions();
    if w % decimation != 0 || h % decimation != 0 {
        return Err(ImgprocError::InvalidParameters(format!(
            "decimation of {w}x{h} by {decimation} is not exact"
        )));
    }

    let mut out = ImageBuffer::new(w / decimation, h / decimation);
    for y in 0..h / decimation {
        for x in 0..w / decimation {
            out.put_pixel(x, y, *image.get_pixel(x * decimation, y * decimation));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_decimate_picks_exact_pixels() {
        let mut img = GrayImage::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                img.put_pixel(x, y, Luma([(y * 8 + x) as u8]));
            }
        }

        let out = decimate(&img, 2).unwrap();
        assert_eq!(out.dimensions(), (4, 4));
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 2);
        assert_eq!(out.get_pixel(0, 1)[0], 16);
    }

    #[test]
    fn test_decimate_requires_exact_division() {
        let img = GrayImage::new(9, 8);
        assert!(decimate(&img, 2).is_err());
        assert!(decimate(&img, 0).is_err());
    }
}
