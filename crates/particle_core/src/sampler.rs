//! Turn a pixel buffer into particles. Each bright enough pixel on a grid becomes a particle
//! anchored to that pixel, starting somewhere random on the canvas.

use glam::Vec2;
use rand::seq::SliceRandom as _;
use rand::Rng;

use crate::errors::{InvalidInputSnafu, ParticleError};
use crate::particles::{ParticleSet, GLYPH_ALPHABET};

/// Pixels must be brighter than this, on average across their RGB channels, to spawn a particle.
const BRIGHTNESS_THRESHOLD: f32 = 30.0;

/// Pixels must be more opaque than this to spawn a particle.
const ALPHA_THRESHOLD: u8 = 0;

/// Sample an RGBA buffer every `gap` pixels, in row-major order.
///
/// # Errors
/// If the dimensions are 0, the gap is 0, or the buffer's length isn't `width * height * 4`.
#[inline]
pub fn sample<R: Rng>(
    pixels: &[u8],
    width: u32,
    height: u32,
    gap: u32,
    rng: &mut R,
) -> Result<ParticleSet, ParticleError> {
    if width == 0 || height == 0 {
        return InvalidInputSnafu {
            reason: format!("dimensions must be non-zero, got {width}x{height}"),
        }
        .fail();
    }
    if gap == 0 {
        return InvalidInputSnafu {
            reason: "sampling gap must be at least 1".to_owned(),
        }
        .fail();
    }
    let expected = u64::from(width) * u64::from(height) * 4;
    if u64::try_from(pixels.len()).ok() != Some(expected) {
        return InvalidInputSnafu {
            reason: format!(
                "{width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            ),
        }
        .fail();
    }

    let row_length = usize::try_from(width).unwrap_or(usize::MAX) * 4;
    let step = usize::try_from(gap).unwrap_or(usize::MAX);
    let mut particles = ParticleSet::default();

    #[expect(
        clippy::as_conversions,
        clippy::cast_precision_loss,
        reason = "Canvas dimensions comfortably fit in an f32"
    )]
    let (width_f32, height_f32) = (width as f32, height as f32);

    for (y, row) in pixels.chunks_exact(row_length).enumerate().step_by(step) {
        for (x, pixel) in row.chunks_exact(4).enumerate().step_by(step) {
            let &[red, green, blue, alpha] = pixel else {
                continue;
            };
            if !is_bright(red, green, blue, alpha) {
                continue;
            }

            #[expect(
                clippy::as_conversions,
                clippy::cast_precision_loss,
                reason = "Canvas dimensions comfortably fit in an f32"
            )]
            let origin = Vec2::new(x as f32, y as f32);
            let position = Vec2::new(
                rng.gen_range(0.0..width_f32),
                rng.gen_range(0.0..height_f32),
            );
            let glyph = GLYPH_ALPHABET.choose(rng).copied().unwrap_or('0');
            particles.push(origin, position, glyph);
        }
    }

    tracing::debug!(
        "Sampled {} particles from {width}x{height} pixels with a gap of {gap}",
        particles.len()
    );
    Ok(particles)
}

/// Sample an already decoded image.
///
/// # Errors
/// See [`sample`].
#[inline]
pub fn sample_image<R: Rng>(
    image: &image::RgbaImage,
    gap: u32,
    rng: &mut R,
) -> Result<ParticleSet, ParticleError> {
    sample(image.as_raw(), image.width(), image.height(), gap, rng)
}

/// Whether a pixel passes the threshold for spawning a particle.
fn is_bright(red: u8, green: u8, blue: u8, alpha: u8) -> bool {
    let brightness = (f32::from(red) + f32::from(green) + f32::from(blue)) / 3.0;
    alpha > ALPHA_THRESHOLD && brightness > BRIGHTNESS_THRESHOLD
}
