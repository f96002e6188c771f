//! Play-button decoration for thumbnails.
//!
//! Renders a centred overlay (filled disc, border ring, right-pointing
//! triangle) from primitive pixel writes, alpha-composites it onto the
//! source image and re-encodes the result as JPEG.
//!
//! All geometry uses floor/truncation so the output is reproducible for a
//! given input and configuration.

use crate::error::{MonitorError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};

/// Overlay edge length as a fraction of the smaller image dimension.
pub const DEFAULT_SIZE_FRACTION: f64 = 0.30;

/// Disc radius as a fraction of the overlay radius; the rest is the ring.
pub const DEFAULT_RING_RATIO: f64 = 0.90;

/// JPEG quality of the decorated artifact.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// MIME type of the decorated artifact.
pub const DECORATED_CONTENT_TYPE: &str = "image/jpeg";

/// Decoration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoratorConfig {
    /// Overlay size `k` in `S = floor(k * min(W, H))`.
    pub size_fraction: f64,
    /// Inner disc threshold `b` in `d <= r * b`.
    pub ring_ratio: f64,
    /// Triangle height as a fraction of the overlay size.
    pub triangle_ratio: f64,
    /// How far left of centre the triangle starts, as a fraction of its height.
    pub triangle_offset_ratio: f64,
    /// Widest triangle row as a fraction of its height.
    pub triangle_width_ratio: f64,
    /// Disc colour, RGBA.
    pub disc_rgba: [u8; 4],
    /// Ring colour, RGBA.
    pub ring_rgba: [u8; 4],
    /// Triangle colour, RGBA.
    pub triangle_rgba: [u8; 4],
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for DecoratorConfig {
    fn default() -> Self {
        Self {
            size_fraction: DEFAULT_SIZE_FRACTION,
            ring_ratio: DEFAULT_RING_RATIO,
            triangle_ratio: 0.4,
            triangle_offset_ratio: 0.2,
            triangle_width_ratio: 0.7,
            disc_rgba: [0xff, 0x00, 0x00, 0xe6],
            ring_rgba: [0xff, 0xff, 0xff, 0xee],
            triangle_rgba: [0xff, 0xff, 0xff, 0xff],
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl DecoratorConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<()> {
        if !(self.size_fraction > 0.0 && self.size_fraction <= 1.0) {
            return Err(MonitorError::Config(format!(
                "decorator.size_fraction must be in (0, 1], got {}",
                self.size_fraction
            )));
        }
        if !(self.ring_ratio > 0.0 && self.ring_ratio < 1.0) {
            return Err(MonitorError::Config(format!(
                "decorator.ring_ratio must be in (0, 1), got {}",
                self.ring_ratio
            )));
        }
        if !(self.triangle_ratio > 0.0 && self.triangle_ratio <= 1.0) {
            return Err(MonitorError::Config(format!(
                "decorator.triangle_ratio must be in (0, 1], got {}",
                self.triangle_ratio
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(MonitorError::Config(format!(
                "decorator.jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Where the overlay lands on the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayGeometry {
    /// Overlay edge length in pixels.
    pub size: u32,
    /// Left edge of the overlay on the source image.
    pub left: u32,
    /// Top edge of the overlay on the source image.
    pub top: u32,
}

impl OverlayGeometry {
    /// Centre an overlay of `floor(fraction * min(width, height))` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Decode`] when either dimension is zero.
    pub fn compute(width: u32, height: u32, fraction: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MonitorError::Decode(format!(
                "image has zero dimension ({width}x{height})"
            )));
        }
        let size = (fraction * f64::from(width.min(height))).floor() as u32;
        let size = size.min(width.min(height));
        Ok(Self {
            size,
            left: (width - size) / 2,
            top: (height - size) / 2,
        })
    }
}

/// Composites the play-button overlay onto raster images.
#[derive(Debug, Clone, Default)]
pub struct Decorator {
    config: DecoratorConfig,
}

impl Decorator {
    /// Create a decorator with the given settings.
    pub fn new(config: DecoratorConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &DecoratorConfig {
        &self.config
    }

    /// Decorate `image_bytes` and return JPEG bytes of the same dimensions.
    ///
    /// # Errors
    ///
    /// - [`MonitorError::Decode`] if the bytes are not a readable image or
    ///   have a zero dimension
    /// - [`MonitorError::Encode`] if JPEG encoding fails
    pub fn decorate(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let source = image::load_from_memory(image_bytes)
            .map_err(|e| MonitorError::Decode(format!("cannot decode image: {e}")))?;
        let (width, height) = source.dimensions();
        let geometry = OverlayGeometry::compute(width, height, self.config.size_fraction)?;

        let mut canvas = source.to_rgba8();
        if geometry.size > 0 {
            let overlay = self.render_overlay(geometry.size);
            imageops::overlay(
                &mut canvas,
                &overlay,
                i64::from(geometry.left),
                i64::from(geometry.top),
            );
        }

        encode_jpeg(canvas, self.config.jpeg_quality)
    }

    /// Draw the overlay on a transparent `size x size` canvas.
    pub fn render_overlay(&self, size: u32) -> RgbaImage {
        let mut overlay = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
        if size == 0 {
            return overlay;
        }

        let radius = f64::from(size) / 2.0;
        let inner = radius * self.config.ring_ratio;
        let centre = f64::from(size / 2);

        let disc = Rgba(self.config.disc_rgba);
        let ring = Rgba(self.config.ring_rgba);
        for y in 0..size {
            for x in 0..size {
                let dx = f64::from(x) - centre;
                let dy = f64::from(y) - centre;
                let distance = (dx * dx + dy * dy).sqrt();
                if distance <= inner {
                    overlay.put_pixel(x, y, disc);
                } else if distance <= radius {
                    overlay.put_pixel(x, y, ring);
                }
            }
        }

        self.fill_triangle(&mut overlay, centre);
        overlay
    }

    /// Right-pointing triangle by per-row scanline fill.
    fn fill_triangle(&self, overlay: &mut RgbaImage, centre: f64) {
        let size = i64::from(overlay.width());
        let tri = f64::from(overlay.width()) * self.config.triangle_ratio;
        let half = tri / 2.0;
        if half <= 0.0 {
            return;
        }

        let left = centre - tri * self.config.triangle_offset_ratio;
        let top = centre - half;
        let colour = Rgba(self.config.triangle_rgba);

        let mut row = 0u32;
        while f64::from(row) < tri {
            let from_middle = (f64::from(row) - half).abs();
            let width = (half - from_middle) / half * tri * self.config.triangle_width_ratio;

            let y = (top + f64::from(row)).floor() as i64;
            if (0..size).contains(&y) {
                let start = (left.floor() as i64).max(0);
                let end = ((left + width).floor() as i64).min(size - 1);
                for x in start..=end {
                    overlay.put_pixel(x as u32, y as u32, colour);
                }
            }
            row += 1;
        }
    }
}

fn encode_jpeg(canvas: RgbaImage, quality: u8) -> Result<Vec<u8>> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| MonitorError::Encode(format!("cannot encode JPEG: {e}")))?;
    Ok(buf)
}
