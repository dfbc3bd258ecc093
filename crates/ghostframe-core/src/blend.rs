use crate::error::{PipelineError, PipelineResult};
use crate::video::frame::{Frame, Pixels};

/// Per-sample motion extraction: invert the ghost, add with saturation,
/// invert the result. Equal samples cancel to 255 (white); divergence
/// darkens. All arithmetic is unsigned-saturating, so there is no
/// underflow path.
#[inline]
pub fn blend_sample(live: u8, ghost: u8) -> u8 {
    255 - live.saturating_add(255 - ghost)
}

/// Blend a live frame against the ghost frame `offset` frames behind it.
///
/// Pure and order-sensitive: `blend(a, b)` differs from `blend(b, a)` in
/// general because the complement sits on the ghost side. In color mode the
/// formula applies to each channel independently. Requires identical shapes,
/// which the decoder guarantees for frames of one run.
pub fn blend(live: &Frame, ghost: &Frame) -> PipelineResult<Frame> {
    if live.shape() != ghost.shape() {
        return Err(PipelineError::ShapeMismatch {
            expected: ghost.shape(),
            actual: live.shape(),
        });
    }

    let samples: Vec<u8> = live
        .samples()
        .iter()
        .zip(ghost.samples())
        .map(|(&l, &g)| blend_sample(l, g))
        .collect();

    let (width, height, channels) = live.shape();
    // Length is exactly live's sample count, so reconstruction cannot fail.
    let pixels = Pixels::from_raw(width, height, channels, samples)
        .ok_or_else(|| PipelineError::Other(anyhow::anyhow!("blend produced a malformed buffer")))?;

    Ok(Frame {
        pixels,
        frame_number: live.frame_number,
        timestamp_seconds: live.timestamp_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::{ColorMode, Frame};
    use image::{GrayImage, RgbImage};

    fn gray(width: u32, height: u32, fill: u8) -> Frame {
        Frame {
            pixels: Pixels::Gray(GrayImage::from_pixel(width, height, image::Luma([fill]))),
            frame_number: 0,
            timestamp_seconds: 0.0,
        }
    }

    #[test]
    fn sample_formula_matches_complement_add_complement() {
        for a in [0u8, 1, 100, 127, 128, 200, 254, 255] {
            for b in [0u8, 1, 100, 127, 128, 200, 254, 255] {
                let expected = 255 - (a as u16 + (255 - b as u16)).min(255) as u8;
                assert_eq!(blend_sample(a, b), expected, "a={a} b={b}");
            }
        }
    }

    #[test]
    fn equal_samples_cancel_to_white() {
        for v in 0..=255u8 {
            assert_eq!(blend_sample(v, v), 255);
        }
    }

    #[test]
    fn order_matters() {
        // live=10 ghost=200: 255 - min(255, 10 + 55) = 190
        // live=200 ghost=10: 255 - min(255, 200 + 245) = 0
        assert_eq!(blend_sample(10, 200), 190);
        assert_eq!(blend_sample(200, 10), 0);
    }

    #[test]
    fn saturation_pins_to_zero() {
        // 255 - min(255, 256) = 0, the exact arithmetic a signed or wrapping
        // implementation would get wrong.
        assert_eq!(blend_sample(128, 127), 0);
        assert_eq!(blend_sample(255, 0), 0);
    }

    #[test]
    fn identical_frames_blend_to_white() {
        let a = gray(3, 2, 90);
        let out = blend(&a, &a).unwrap();
        assert_eq!(out.shape(), (3, 2, 1));
        assert!(out.samples().iter().all(|&s| s == 255));
    }

    #[test]
    fn color_channels_blend_independently() {
        let live = Frame::from_rgb(
            RgbImage::from_pixel(1, 1, image::Rgb([10, 200, 128])),
            ColorMode::Color,
            0,
            0.0,
        );
        let ghost = Frame::from_rgb(
            RgbImage::from_pixel(1, 1, image::Rgb([200, 10, 127])),
            ColorMode::Color,
            0,
            0.0,
        );
        let out = blend(&live, &ghost).unwrap();
        assert_eq!(out.samples(), &[190, 0, 0]);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let a = gray(2, 2, 0);
        let b = gray(3, 2, 0);
        assert!(matches!(
            blend(&a, &b),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }
}
