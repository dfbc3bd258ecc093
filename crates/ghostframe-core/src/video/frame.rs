use image::{DynamicImage, GrayImage, RgbImage};

/// Whether a run processes single-channel luma or full RGB frames.
///
/// Fixed for the lifetime of one run; the decoder applies it uniformly to
/// every frame it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Grayscale,
    Color,
}

impl ColorMode {
    pub fn channels(self) -> u8 {
        match self {
            ColorMode::Grayscale => 1,
            ColorMode::Color => 3,
        }
    }
}

/// Pixel storage for a frame, one variant per supported channel count.
#[derive(Debug, Clone)]
pub enum Pixels {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl Pixels {
    /// Rebuild pixel storage from a raw sample buffer. Returns `None` when
    /// the buffer length does not match `width * height * channels`.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Pixels> {
        match channels {
            1 => GrayImage::from_raw(width, height, data).map(Pixels::Gray),
            3 => RgbImage::from_raw(width, height, data).map(Pixels::Rgb),
            _ => None,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Pixels::Gray(img) => img.width(),
            Pixels::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Pixels::Gray(img) => img.height(),
            Pixels::Rgb(img) => img.height(),
        }
    }

    pub fn channels(&self) -> u8 {
        match self {
            Pixels::Gray(_) => 1,
            Pixels::Rgb(_) => 3,
        }
    }

    /// Raw samples in row-major order, `channels` bytes per pixel.
    pub fn samples(&self) -> &[u8] {
        match self {
            Pixels::Gray(img) => img.as_raw(),
            Pixels::Rgb(img) => img.as_raw(),
        }
    }
}

/// A single decoded video frame with metadata.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The frame's sample data.
    pub pixels: Pixels,
    /// Absolute frame number from the start of the source (0-based).
    pub frame_number: u64,
    /// Elapsed seconds from the start of the source.
    pub timestamp_seconds: f64,
}

impl Frame {
    /// Build a frame from decoded RGB data, converting to luma when the run
    /// is configured grayscale.
    pub fn from_rgb(
        image: RgbImage,
        color_mode: ColorMode,
        frame_number: u64,
        timestamp_seconds: f64,
    ) -> Frame {
        let pixels = match color_mode {
            ColorMode::Color => Pixels::Rgb(image),
            ColorMode::Grayscale => Pixels::Gray(DynamicImage::ImageRgb8(image).into_luma8()),
        };
        Frame {
            pixels,
            frame_number,
            timestamp_seconds,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn channels(&self) -> u8 {
        self.pixels.channels()
    }

    /// `(width, height, channels)` — the shape every frame of a run shares.
    pub fn shape(&self) -> (u32, u32, u8) {
        (self.width(), self.height(), self.channels())
    }

    pub fn samples(&self) -> &[u8] {
        self.pixels.samples()
    }
}
