//! The particle field without any runtime attached. Every tick has to be triggered manually,
//! which makes it ideal for tests, and it's what [`crate::active_simulation::ActiveSimulation`]
//! drives from its Tokio task.

use glam::Vec2;

use crate::canvas::{Canvas, TRAIL_OPACITY};
use crate::config::ParticleConfig;
use crate::errors::{InvalidDimensionsSnafu, ParticleError};
use crate::fps::Fps;
use crate::particles::{ParticleSet, RenderStyle};
use crate::rasterizer::Source;

/// A single rendered frame of the particle field.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Frame {
    /// The pixels and glyphs of the frame.
    pub canvas: Canvas,
    /// Recent frames per second, for display only.
    pub fps: f64,
    /// The number of live particles.
    pub particle_count: usize,
}

/// Everything needed to build a new particle set. It doesn't borrow the simulation, so it can be
/// run on another thread whilst the simulation keeps ticking with its current particles.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ResampleRequest {
    /// The generation the resulting particles belong to.
    pub generation: u64,
    /// What to sample.
    pub source: Source,
    /// Canvas width
    pub width: u32,
    /// Canvas height
    pub height: u32,
    /// Sampling stride
    pub gap: u32,
}

impl ResampleRequest {
    /// Rasterize the source and sample it into particles.
    ///
    /// # Errors
    /// If the canvas dimensions or the gap are invalid.
    #[inline]
    pub fn run<R: rand::Rng>(self, rng: &mut R) -> Result<Resampled, ParticleError> {
        let pixels = crate::rasterizer::rasterize(&self.source, self.width, self.height)?;
        let particles = crate::sampler::sample_image(&pixels, self.gap, rng)?;
        Ok(Resampled {
            generation: self.generation,
            particles,
        })
    }
}

/// A freshly built particle set, waiting to be installed.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Resampled {
    /// The generation of the request that built this.
    pub generation: u64,
    /// The new particles.
    pub particles: ParticleSet,
}

/// A steppable particle field.
#[derive(Debug)]
#[non_exhaustive]
pub struct Simulation {
    /// What the particles are drawn on. It's never cleared, only faded.
    pub canvas: Canvas,
    /// The live particles.
    particles: ParticleSet,
    /// The current config snapshot.
    config: ParticleConfig,
    /// How particles are drawn, derived from the config.
    style: RenderStyle,
    /// Where particles are sampled from.
    source: Source,
    /// Incremented whenever the particles need rebuilding. Builds from older generations are
    /// ignored.
    generation: u64,
    /// Frame rate estimate.
    fps: Fps,
}

impl Simulation {
    /// Create an empty simulation. Nothing is drawn until particles are sampled.
    ///
    /// # Errors
    /// If either dimension is 0 or the config is invalid.
    #[inline]
    pub fn new(width: u32, height: u32, config: ParticleConfig) -> Result<Self, ParticleError> {
        Self::check_dimensions(width, height)?;
        config.validate()?;
        let style = Self::style_for(&config)?;
        Ok(Self {
            canvas: Canvas::new(width, height),
            particles: ParticleSet::default(),
            config,
            style,
            source: Source::Procedural,
            generation: 0,
            fps: Fps::default(),
        })
    }

    /// Surfaces need at least one pixel.
    fn check_dimensions(width: u32, height: u32) -> Result<(), ParticleError> {
        if width == 0 || height == 0 {
            return InvalidDimensionsSnafu { width, height }.fail();
        }
        Ok(())
    }

    /// The render style implied by a config.
    fn style_for(config: &ParticleConfig) -> Result<RenderStyle, ParticleError> {
        Ok(RenderStyle::new(
            config.particle_size,
            config.parsed_colour()?,
            config.is_matrix_mode,
        ))
    }

    /// Canvas width
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.canvas.width
    }

    /// Canvas height
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.canvas.height
    }

    /// The live particles.
    #[inline]
    #[must_use]
    pub const fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    /// The current config.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// What particles are currently sampled from.
    #[inline]
    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Make any in-flight resample stale.
    #[inline]
    pub fn invalidate(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Advance the field by one frame: fade the previous frame, move every particle, then draw
    /// every particle.
    #[inline]
    pub fn tick(&mut self, pointer: Option<Vec2>) {
        self.fps.tick();
        self.canvas.fade(TRAIL_OPACITY);
        self.particles.update(pointer, &self.config.physics());
        self.particles.draw(&mut self.canvas, &self.style);
    }

    /// A snapshot of the current frame.
    #[inline]
    #[must_use]
    pub fn frame(&self) -> Frame {
        Frame {
            canvas: self.canvas.clone(),
            fps: self.fps.current(),
            particle_count: self.particles.len(),
        }
    }

    /// Replace the config. Physics and render mode changes apply to the current particles on the
    /// next tick. Returns `true` when the change also needs a resample.
    ///
    /// # Errors
    /// If the new config is invalid, in which case the current config is kept.
    #[inline]
    pub fn set_config(&mut self, config: ParticleConfig) -> Result<bool, ParticleError> {
        config.validate()?;
        let style = Self::style_for(&config)?;
        let is_resample_needed = config.sampling_key() != self.config.sampling_key();
        tracing::debug!("New particle config (resample needed: {is_resample_needed}): {config:?}");
        self.config = config;
        self.style = style;
        Ok(is_resample_needed)
    }

    /// Set the source of future resamples. The source is only ever changed here and by a reset, so
    /// anything that resamples afterwards, however it's triggered, builds from this source.
    #[inline]
    pub fn set_image(&mut self, source: Source) {
        self.source = source;
        self.invalidate();
    }

    /// Resize the canvas. The current particles stay until a resample replaces them.
    ///
    /// # Errors
    /// If either dimension is 0.
    #[inline]
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ParticleError> {
        Self::check_dimensions(width, height)?;
        tracing::debug!("Resizing particle canvas to {width}x{height}");
        self.canvas.resize(width, height);
        self.invalidate();
        Ok(())
    }

    /// Start a new generation and describe how to build its particles from the current source.
    #[inline]
    pub fn request_resample(&mut self) -> ResampleRequest {
        ResampleRequest {
            generation: self.invalidate(),
            source: self.source.clone(),
            width: self.canvas.width,
            height: self.canvas.height,
            gap: self.config.gap,
        }
    }

    /// Swap in a new particle set, all at once. Returns `false`, and changes nothing, if the
    /// particles were built for an old generation.
    #[inline]
    pub fn install(&mut self, resampled: Resampled) -> bool {
        if resampled.generation != self.generation {
            tracing::debug!(
                "Ignoring stale particles from generation {} (current is {})",
                resampled.generation,
                self.generation
            );
            return false;
        }

        tracing::debug!(
            "Installing {} particles from generation {}",
            resampled.particles.len(),
            resampled.generation
        );
        self.particles = resampled.particles;
        true
    }

    /// Rebuild the particles from the current source, right now. Returns the number of particles.
    ///
    /// # Errors
    /// If rasterizing or sampling fails.
    #[inline]
    pub fn resample<R: rand::Rng>(&mut self, rng: &mut R) -> Result<usize, ParticleError> {
        let resampled = self.request_resample().run(rng)?;
        let count = resampled.particles.len();
        self.install(resampled);
        Ok(count)
    }

    /// Remove every particle and the current image, and return the config to its defaults.
    ///
    /// # Errors
    /// If the default colour somehow doesn't parse.
    #[inline]
    pub fn reset(&mut self) -> Result<(), ParticleError> {
        tracing::debug!("Resetting particle field");
        let config = ParticleConfig::default();
        self.style = Self::style_for(&config)?;
        self.config = config;
        self.particles.clear();
        self.source = Source::Procedural;
        self.canvas.resize(self.canvas.width, self.canvas.height);
        self.invalidate();
        Ok(())
    }
}
