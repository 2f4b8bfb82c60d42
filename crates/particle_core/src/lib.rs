//! # Particle Core
//! An interactive particle field. An image, or a generated geometric pattern when there's no
//! image, is sampled into particles that each remember the pixel they came from. Every frame
//! they're pushed away from the pointer, pulled back to their origin, and damped.
//!
//! There are 2 convenience modules for running the field: [`Simulation`] and
//! [`ActiveSimulation`]. The former must be stepped through manually and is aimed at testing,
//! whilst the latter runs in a Tokio task and can only be interacted with through channels.
//!
//! Drawing happens on a plain [`Canvas`] of RGBA pixels and glyphs, so hosts are free to render
//! it however they like.

#![expect(clippy::pub_use, reason = "How else are you supposed re-export??")]

pub mod active_simulation;
pub mod canvas;
pub mod config;
pub mod errors;
pub mod fps;
pub mod particles;
pub mod rasterizer;
pub mod sampler;
pub mod simulation;

pub use active_simulation::ActiveSimulation;
pub use canvas::Canvas;
pub use config::ParticleConfig;
pub use errors::ParticleError;
pub use simulation::Simulation;

/// All the control signals for a running simulation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Protocol {
    /// End the simulation loop.
    End,
    /// Resize the canvas and resample.
    Resize {
        /// Canvas width in pixels
        width: u32,
        /// Canvas height in pixels
        height: u32,
    },
    /// Decode the bytes of an image file and sample particles from it.
    LoadImage(std::sync::Arc<[u8]>),
    /// Forget the current image and go back to the procedural pattern.
    ClearImage,
    /// Clear all the particles and return the config to its defaults.
    Reset,
}
