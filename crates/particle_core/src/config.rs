//! All the variables that can be tuned for the particle field

use std::str::FromStr as _;

use snafu::ResultExt as _;

use crate::canvas::Colour;
use crate::errors::{InvalidColourSnafu, InvalidConfigSnafu, ParticleError};

/// All the tunable parameters of the particle field. This is owned by whoever hosts the
/// simulation and handed to it as a snapshot.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
#[expect(
    clippy::exhaustive_structs,
    reason = "Hosts build this with struct update syntax, as if it were JSON"
)]
pub struct ParticleConfig {
    /// The side of a particle's square, or half the font size of its glyph.
    pub particle_size: f32,
    /// The stride in pixels between sampled points of the source image.
    pub gap: u32,
    /// The radius in pixels around the pointer in which particles are repelled.
    pub mouse_radius: f32,
    /// The per-frame velocity damping.
    pub friction: f32,
    /// The fraction of the distance to its origin that a particle accelerates by each frame.
    pub ease: f32,
    /// The hex colour of all the particles.
    pub colour: String,
    /// Render particles as glyphs rather than squares.
    pub is_matrix_mode: bool,
}

impl Default for ParticleConfig {
    #[inline]
    fn default() -> Self {
        Self {
            particle_size: 2.0,
            gap: 5,
            mouse_radius: 150.0,
            friction: 0.92,
            ease: 0.1,
            colour: "#00ff41".to_owned(),
            is_matrix_mode: false,
        }
    }
}

/// The parameters that only affect the motion of particles. These can change at any time
/// without needing to resample the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub struct Physics {
    /// See [`ParticleConfig::mouse_radius`]
    pub mouse_radius: f32,
    /// See [`ParticleConfig::ease`]
    pub ease: f32,
    /// See [`ParticleConfig::friction`]
    pub friction: f32,
}

impl Physics {
    /// Instantiate
    #[inline]
    #[must_use]
    pub const fn new(mouse_radius: f32, ease: f32, friction: f32) -> Self {
        Self {
            mouse_radius,
            ease,
            friction,
        }
    }
}

/// The parameters that, when changed, require the particles to be rebuilt from scratch.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct SamplingKey {
    /// See [`ParticleConfig::gap`]
    pub gap: u32,
    /// See [`ParticleConfig::particle_size`]
    pub particle_size: f32,
    /// See [`ParticleConfig::colour`]
    pub colour: String,
}

impl ParticleConfig {
    /// Take a snapshot of just the physics parameters.
    #[inline]
    #[must_use]
    pub const fn physics(&self) -> Physics {
        Physics::new(self.mouse_radius, self.ease, self.friction)
    }

    /// The parameters that decide whether a new config needs a full resample.
    #[inline]
    #[must_use]
    pub fn sampling_key(&self) -> SamplingKey {
        SamplingKey {
            gap: self.gap,
            particle_size: self.particle_size,
            colour: self.colour.clone(),
        }
    }

    /// Parse the hex colour into normalised RGBA.
    ///
    /// # Errors
    /// If the colour isn't valid hex.
    #[inline]
    pub fn parsed_colour(&self) -> Result<Colour, ParticleError> {
        parse_colour(&self.colour)
    }

    /// Check that all the parameters are within their allowed ranges.
    ///
    /// # Errors
    /// The first parameter found to be out of range.
    #[inline]
    pub fn validate(&self) -> Result<(), ParticleError> {
        if !(self.particle_size > 0.0) {
            return InvalidConfigSnafu {
                reason: format!("particle_size must be > 0, got {}", self.particle_size),
            }
            .fail();
        }
        if self.gap < 1 {
            return InvalidConfigSnafu {
                reason: "gap must be at least 1".to_owned(),
            }
            .fail();
        }
        if !(self.mouse_radius > 0.0) {
            return InvalidConfigSnafu {
                reason: format!("mouse_radius must be > 0, got {}", self.mouse_radius),
            }
            .fail();
        }
        if !(self.friction > 0.0 && self.friction < 1.0) {
            return InvalidConfigSnafu {
                reason: format!("friction must be between 0 and 1, got {}", self.friction),
            }
            .fail();
        }
        if !(self.ease > 0.0 && self.ease <= 1.0) {
            return InvalidConfigSnafu {
                reason: format!("ease must be in (0, 1], got {}", self.ease),
            }
            .fail();
        }
        self.parsed_colour()?;

        Ok(())
    }
}

/// Parse a CSS-style hex colour (`#00ff41` or `#0f4`) into normalised RGBA.
///
/// # Errors
/// If the string isn't valid hex.
#[inline]
pub fn parse_colour(colour: &str) -> Result<Colour, ParticleError> {
    let rgb = palette::Srgb::<u8>::from_str(colour.trim()).context(InvalidColourSnafu {
        colour: colour.to_owned(),
    })?;
    let normalised: palette::Srgb<f32> = rgb.into_format();
    Ok((normalised.red, normalised.green, normalised.blue, 1.0))
}
