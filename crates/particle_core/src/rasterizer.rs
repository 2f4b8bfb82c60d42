//! Produce the pixels that particles get sampled from. Either an uploaded image fitted to the
//! canvas, or, when there's no image, a procedurally drawn geometric mandala.

use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use glam::Vec2;
use snafu::ResultExt as _;

use crate::errors::{ImageDecodeSnafu, InvalidDimensionsSnafu, ParticleError};

/// How much of the canvas an uploaded image is allowed to fill.
const IMAGE_FIT: f32 = 0.8;

/// The outer radius of the procedural pattern, as a fraction of the canvas' shortest side.
const PATTERN_RADIUS: f32 = 0.4;

/// Length of each arm of the procedural pattern's chevrons.
const CHEVRON_LENGTH: f32 = 40.0;

/// Stroke colour of the procedural pattern.
const STROKE: image::Rgba<u8> = image::Rgba([255, 255, 255, 255]);

/// Background colour of the procedural pattern.
const BACKGROUND: image::Rgba<u8> = image::Rgba([0, 0, 0, 255]);

/// Where the pixels to sample come from.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub enum Source {
    /// No image, so draw the built-in geometric pattern.
    #[default]
    Procedural,
    /// A decoded image.
    Image(Arc<image::RgbaImage>),
}

/// Decode the bytes of an image file (PNG, JPEG) into RGBA pixels.
///
/// # Errors
/// If the bytes aren't a supported image.
#[inline]
pub fn decode_image(bytes: &[u8]) -> Result<image::RgbaImage, ParticleError> {
    let image = image::load_from_memory(bytes).context(ImageDecodeSnafu)?;
    tracing::debug!(
        "Decoded {}x{} image",
        image.width(),
        image.height()
    );
    Ok(image.into_rgba8())
}

/// Produce a `width`x`height` RGBA pixel buffer from the given source.
///
/// # Errors
/// If either dimension is 0.
#[inline]
pub fn rasterize(
    source: &Source,
    width: u32,
    height: u32,
) -> Result<image::RgbaImage, ParticleError> {
    if width == 0 || height == 0 {
        return InvalidDimensionsSnafu { width, height }.fail();
    }

    let pixels = match source {
        Source::Procedural => draw_procedural_pattern(width, height),
        Source::Image(image) => draw_fitted_image(image, width, height),
    };
    Ok(pixels)
}

/// Scale the image to fit the canvas, keeping its aspect ratio, and centre it on an otherwise
/// transparent canvas.
///
/// The fitted image rarely lands on whole pixels. Every canvas pixel it touches gets drawn, with
/// its alpha scaled by how much of the pixel is covered, so odd sizes stay centred and keep their
/// edges.
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Image dimensions comfortably fit in an f32, and alphas are at most 255"
)]
fn draw_fitted_image(image: &image::RgbaImage, width: u32, height: u32) -> image::RgbaImage {
    let mut canvas = image::RgbaImage::new(width, height);
    let (image_width, image_height) = image.dimensions();
    if image_width == 0 || image_height == 0 {
        return canvas;
    }

    let scale = (width as f32 / image_width as f32).min(height as f32 / image_height as f32)
        * IMAGE_FIT;
    let size = Vec2::new(image_width as f32, image_height as f32) * scale;
    let near = (Vec2::new(width as f32, height as f32) - size) / 2.0;
    let far = near + size;

    tracing::trace!(
        "Fitting {image_width}x{image_height} image as {}x{} at ({}, {})",
        size.x,
        size.y,
        near.x,
        near.y
    );
    let scaled = image::imageops::resize(
        image,
        (size.x.ceil() as u32).max(1),
        (size.y.ceil() as u32).max(1),
        image::imageops::FilterType::Triangle,
    );

    for y in covered_span(near.y, far.y, height) {
        let row_coverage = coverage(y, near.y, far.y);
        let source_y = source_index(y, near.y, size.y, scaled.height());
        for x in covered_span(near.x, far.x, width) {
            let area = row_coverage * coverage(x, near.x, far.x);
            let source_x = source_index(x, near.x, size.x, scaled.width());
            let mut pixel = *scaled.get_pixel(source_x, source_y);
            pixel.0[3] = (f32::from(pixel.0[3]) * area).ceil() as u8;
            canvas.put_pixel(x, y, pixel);
        }
    }
    canvas
}

/// Every pixel that `low..high` touches, even partially.
#[expect(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "Values are clamped to the canvas before casting"
)]
fn covered_span(low: f32, high: f32, limit: u32) -> std::ops::Range<u32> {
    let start = low.floor().clamp(0.0, limit as f32) as u32;
    let end = high.ceil().clamp(0.0, limit as f32) as u32;
    start..end
}

/// How much of the 1 pixel wide `pixel` lies inside `low..high`.
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "Canvas dimensions comfortably fit in an f32"
)]
fn coverage(pixel: u32, low: f32, high: f32) -> f32 {
    let pixel = pixel as f32;
    ((pixel + 1.0).min(high) - pixel.max(low)).clamp(0.0, 1.0)
}

/// The index into a `samples` long row or column of the scaled image that lies under the centre
/// of `pixel`.
#[expect(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "The result is clamped to the scaled image"
)]
fn source_index(pixel: u32, low: f32, length: f32, samples: u32) -> u32 {
    let centre = (pixel as f32 + 0.5).clamp(low, low + length);
    let index = ((centre - low) / length * samples as f32) as u32;
    index.min(samples.saturating_sub(1))
}

/// Draw the symmetric geometric pattern used when there's no uploaded image. There's no
/// randomness and no anti-aliasing, so the same dimensions always give the same pixels.
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "Canvas dimensions comfortably fit in an f32"
)]
fn draw_procedural_pattern(width: u32, height: u32) -> image::RgbaImage {
    let mut canvas = image::RgbaImage::from_pixel(width, height, BACKGROUND);
    let centre = Vec2::new(width as f32 / 2.0, height as f32 / 2.0);
    let max_radius = (width.min(height) as f32) * PATTERN_RADIUS;
    let at = |angle: f32, radius: f32| centre + Vec2::from_angle(angle) * radius;

    // Outer ring
    for angle in symmetry(12) {
        let outer = at(angle, max_radius);
        let inner = at(angle + PI / 6.0, max_radius * 0.8);
        stroke_line(&mut canvas, outer, inner, 3.0);
        stroke_line(&mut canvas, inner, centre, 3.0);
    }

    // Inner chevrons
    for angle in symmetry(6) {
        let point = at(angle, max_radius * 0.5);
        let left_arm = point + Vec2::from_angle(angle + 2.0) * CHEVRON_LENGTH;
        let right_arm = point + Vec2::from_angle(angle - 2.0) * CHEVRON_LENGTH;
        stroke_line(&mut canvas, point, left_arm, 2.0);
        stroke_line(&mut canvas, point, right_arm, 2.0);
    }

    // Core circuit
    stroke_circle(&mut canvas, centre, max_radius * 0.15, 2.0);
    for angle in symmetry(8) {
        stroke_line(
            &mut canvas,
            at(angle, max_radius * 0.15),
            at(angle, max_radius * 0.3),
            2.0,
        );
    }

    canvas
}

/// Equally spaced angles around a full turn.
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "The number of sides is tiny"
)]
fn symmetry(sides: u16) -> impl Iterator<Item = f32> {
    let step = TAU / f32::from(sides);
    (0..sides).map(move |side| side as f32 * step)
}

/// The range of pixel indexes whose centres could fall between `low` and `high`.
#[expect(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "Values are clamped to the canvas before casting"
)]
fn pixel_span(low: f32, high: f32, limit: u32) -> std::ops::Range<u32> {
    let start = low.floor().clamp(0.0, limit as f32) as u32;
    let end = (high.ceil() + 1.0).clamp(0.0, limit as f32) as u32;
    start..end
}

/// Stroke a straight line with square caps, like a 2D canvas with `lineCap = "square"`.
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "Canvas dimensions comfortably fit in an f32"
)]
fn stroke_line(canvas: &mut image::RgbaImage, from: Vec2, to: Vec2, line_width: f32) {
    let half = line_width / 2.0;
    let direction = (to - from).normalize_or_zero();
    let start = from - direction * half;
    let end = to + direction * half;
    let axis = end - start;
    let length_squared = axis.length_squared();
    let normal = if length_squared > 0.0 {
        axis.perp() / length_squared.sqrt()
    } else {
        Vec2::ZERO
    };

    let (width, height) = canvas.dimensions();
    let columns = pixel_span(start.x.min(end.x) - half, start.x.max(end.x) + half, width);
    let rows = pixel_span(start.y.min(end.y) - half, start.y.max(end.y) + half, height);
    for y in rows {
        for x in columns.clone() {
            let pixel_centre = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let offset = pixel_centre - start;
            let is_inside = if length_squared > 0.0 {
                let along = offset.dot(axis) / length_squared;
                let across = offset.dot(normal).abs();
                (0.0..=1.0).contains(&along) && across <= half
            } else {
                offset.x.abs() <= half && offset.y.abs() <= half
            };
            if is_inside {
                canvas.put_pixel(x, y, STROKE);
            }
        }
    }
}

/// Stroke the outline of a circle.
#[expect(
    clippy::as_conversions,
    clippy::cast_precision_loss,
    reason = "Canvas dimensions comfortably fit in an f32"
)]
fn stroke_circle(canvas: &mut image::RgbaImage, centre: Vec2, radius: f32, line_width: f32) {
    let half = line_width / 2.0;
    let reach = radius + half;
    let (width, height) = canvas.dimensions();
    let columns = pixel_span(centre.x - reach, centre.x + reach, width);
    let rows = pixel_span(centre.y - reach, centre.y + reach, height);
    for y in rows {
        for x in columns.clone() {
            let pixel_centre = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            if (pixel_centre.distance(centre) - radius).abs() <= half {
                canvas.put_pixel(x, y, STROKE);
            }
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    fn white_image(width: u32, height: u32) -> Source {
        Source::Image(Arc::new(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([255, 255, 255, 255]),
        )))
    }

    #[test]
    fn procedural_pattern_is_deterministic() {
        let first = rasterize(&Source::Procedural, 200, 150).unwrap();
        let second = rasterize(&Source::Procedural, 200, 150).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn procedural_pattern_has_white_strokes_on_black() {
        let pixels = rasterize(&Source::Procedural, 200, 150).unwrap();
        assert_eq!(*pixels.get_pixel(0, 0), BACKGROUND);
        // Every spoke of the outer ring meets in the centre.
        assert_eq!(*pixels.get_pixel(100, 75), STROKE);

        let white = pixels.pixels().filter(|pixel| **pixel == STROKE).count();
        assert!(white > 100);
        assert!(white < 200 * 150 / 2);
    }

    #[test]
    fn tiny_canvases_dont_panic() {
        let pixels = rasterize(&Source::Procedural, 1, 1).unwrap();
        assert_eq!(pixels.dimensions(), (1, 1));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let error = rasterize(&Source::Procedural, 0, 10).unwrap_err();
        assert!(matches!(
            error,
            ParticleError::InvalidDimensions {
                width: 0,
                height: 10
            }
        ));
    }

    #[test]
    fn images_are_fitted_and_centred() {
        let pixels = rasterize(&white_image(10, 10), 100, 50).unwrap();
        // Scale is min(100/10, 50/10) * 0.8 = 4, so the image is 40x40 at (30, 5).
        assert_eq!(pixels.get_pixel(30, 5).0, [255, 255, 255, 255]);
        assert_eq!(pixels.get_pixel(69, 44).0, [255, 255, 255, 255]);
        assert_eq!(pixels.get_pixel(29, 5).0[3], 0);
        assert_eq!(pixels.get_pixel(70, 44).0[3], 0);
        assert_eq!(pixels.get_pixel(30, 45).0[3], 0);
    }

    #[test]
    fn tiny_images_cover_tiny_canvases() {
        // 1.6x1.6 at (0.2, 0.2), so every pixel is 64% covered.
        let pixels = rasterize(&white_image(2, 2), 2, 2).unwrap();
        for pixel in pixels.pixels() {
            assert_eq!(pixel.0, [255, 255, 255, 164]);
        }
    }

    #[test]
    fn odd_sized_images_stay_centred_and_keep_their_edges() {
        for size in [3, 4, 7] {
            let pixels = rasterize(&white_image(size, size), size, size).unwrap();
            for (x, y, pixel) in pixels.enumerate_pixels() {
                assert!(
                    pixel.0[..3].iter().all(|channel| *channel > 250),
                    "({x}, {y}) of {size} isn't white"
                );
                assert!(pixel.0[3] > 0, "({x}, {y}) of {size} is transparent");
            }

            let last = size - 1;
            let corner = pixels.get_pixel(0, 0).0[3];
            for (x, y) in [(last, 0), (0, last), (last, last)] {
                assert!(
                    pixels.get_pixel(x, y).0[3].abs_diff(corner) <= 1,
                    "corners of {size} are lopsided"
                );
            }
        }
    }

    #[test]
    fn partly_covered_edges_are_fainter() {
        // 5.6x5.6 at (0.7, 0.7)
        let pixels = rasterize(&white_image(7, 7), 7, 7).unwrap();
        assert!(pixels.get_pixel(3, 3).0[3] > 250);
        assert!(pixels.get_pixel(0, 3).0[3] < pixels.get_pixel(1, 3).0[3]);
        assert!(pixels.get_pixel(0, 0).0[3] < pixels.get_pixel(0, 3).0[3]);
    }

    #[test]
    fn garbage_bytes_arent_an_image() {
        let error = decode_image(b"definitely not a PNG").unwrap_err();
        assert!(matches!(error, ParticleError::ImageDecode { .. }));
    }
}
