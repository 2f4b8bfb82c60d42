//! The particles themselves. They're stored as a structure of arrays, so a particle's identity
//! is just its index, and each physics step is independent of every other particle.
//!
//! All the physics is single precision, using `glam`'s `Vec2`. Canvases are at most a few
//! thousand pixels across, so `f32` keeps well under a thousandth of a pixel of error there. But
//! it does mean a long run won't match a double precision replay of the same inputs bit for bit,
//! only to within that tolerance.

use glam::Vec2;
use rayon::prelude::*;

use crate::canvas::{Canvas, Colour};
use crate::config::Physics;

/// The characters that particles are drawn as in matrix mode.
pub const GLYPH_ALPHABET: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
];

/// Below this squared distance the pointer's repulsion stops growing.
const SATURATION_DISTANCE_SQUARED: f32 = 50.0;

/// The repulsion force applied inside the saturation distance.
const SATURATED_FORCE: f32 = -20.0;

/// The moving parts of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[non_exhaustive]
pub struct Kinematics {
    /// Where the particle is currently drawn.
    pub position: Vec2,
    /// How far it'll move next frame.
    pub velocity: Vec2,
}

impl Kinematics {
    /// Instantiate
    #[inline]
    #[must_use]
    pub const fn new(position: Vec2, velocity: Vec2) -> Self {
        Self { position, velocity }
    }
}

/// How every particle in the set gets drawn. This comes from the current config on every tick,
/// so it applies to all particles at once without resampling.
#[derive(Debug, Clone, Copy, PartialEq)]
#[non_exhaustive]
pub struct RenderStyle {
    /// Side of a particle's square. Glyphs are drawn at twice this.
    pub size: f32,
    /// Fill colour
    pub colour: Colour,
    /// Draw glyphs instead of squares
    pub is_matrix_mode: bool,
}

impl RenderStyle {
    /// Instantiate
    #[inline]
    #[must_use]
    pub const fn new(size: f32, colour: Colour, is_matrix_mode: bool) -> Self {
        Self {
            size,
            colour,
            is_matrix_mode,
        }
    }
}

/// Advance a single particle by one frame.
///
/// The pointer pushes the particle away when it's within the mouse radius, the particle's origin
/// pulls it back like a spring, and friction damps the result. There's no time delta, so the
/// motion is tied to the frame rate.
#[inline]
#[must_use]
pub fn step(
    current: Kinematics,
    origin: Vec2,
    pointer: Option<Vec2>,
    physics: &Physics,
) -> Kinematics {
    let mut velocity = current.velocity;

    if let Some(pointer) = pointer {
        let delta = pointer - current.position;
        let distance_squared = delta.length_squared();
        if distance_squared < physics.mouse_radius * physics.mouse_radius {
            let angle = delta.y.atan2(delta.x);
            let force = if distance_squared < SATURATION_DISTANCE_SQUARED {
                SATURATED_FORCE
            } else {
                -physics.mouse_radius / distance_squared.sqrt()
            };
            velocity += Vec2::from_angle(angle) * force;
        }
    }

    velocity += (origin - current.position) * physics.ease;
    velocity *= physics.friction;

    Kinematics::new(current.position + velocity, velocity)
}

/// Advance a particle, putting it back at rest on its origin if the maths ever produces a
/// non-finite number.
fn step_or_settle(
    current: Kinematics,
    origin: Vec2,
    pointer: Option<Vec2>,
    physics: &Physics,
) -> Kinematics {
    let next = step(current, origin, pointer, physics);
    if next.position.is_finite() && next.velocity.is_finite() {
        next
    } else {
        tracing::warn!("Non-finite particle state {next:?}, settling it back at {origin}");
        Kinematics::new(origin, Vec2::ZERO)
    }
}

/// `ParticleSet`
#[derive(Debug, Clone, Default, PartialEq)]
#[non_exhaustive]
pub struct ParticleSet {
    /// Current positions
    positions: Vec<Vec2>,
    /// Current velocities
    velocities: Vec<Vec2>,
    /// The rest position that each particle returns to. Never changes after creation.
    origins: Vec<Vec2>,
    /// The character each particle is drawn as in matrix mode.
    glyphs: Vec<char>,
}

impl ParticleSet {
    /// An empty set with room for `capacity` particles.
    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            origins: Vec::with_capacity(capacity),
            glyphs: Vec::with_capacity(capacity),
        }
    }

    /// Add a stationary particle.
    #[inline]
    pub fn push(&mut self, origin: Vec2, position: Vec2, glyph: char) {
        self.positions.push(position);
        self.velocities.push(Vec2::ZERO);
        self.origins.push(origin);
        self.glyphs.push(glyph);
    }

    /// The number of particles.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Whether there are no particles at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Remove every particle.
    #[inline]
    pub fn clear(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.origins.clear();
        self.glyphs.clear();
    }

    /// Every particle's origin, in sampling order.
    #[inline]
    #[must_use]
    pub fn origins(&self) -> &[Vec2] {
        &self.origins
    }

    /// Every particle's current position.
    #[inline]
    #[must_use]
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    /// Every particle's matrix mode glyph.
    #[inline]
    #[must_use]
    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    /// The moving parts of a single particle.
    #[inline]
    #[must_use]
    pub fn kinematics(&self, index: usize) -> Option<Kinematics> {
        Some(Kinematics::new(
            *self.positions.get(index)?,
            *self.velocities.get(index)?,
        ))
    }

    /// Overwrite the moving parts of a single particle.
    #[inline]
    pub fn set_kinematics(&mut self, index: usize, kinematics: Kinematics) {
        if let (Some(position), Some(velocity)) = (
            self.positions.get_mut(index),
            self.velocities.get_mut(index),
        ) {
            *position = kinematics.position;
            *velocity = kinematics.velocity;
        }
    }

    /// Advance every particle by one frame, in parallel.
    #[inline]
    pub fn update(&mut self, pointer: Option<Vec2>, physics: &Physics) {
        self.positions
            .par_iter_mut()
            .zip(self.velocities.par_iter_mut())
            .zip(self.origins.par_iter())
            .for_each(|((position, velocity), origin)| {
                let next =
                    step_or_settle(Kinematics::new(*position, *velocity), *origin, pointer, physics);
                *position = next.position;
                *velocity = next.velocity;
            });
    }

    /// Advance just one particle by one frame. Returns `None` if there's no such particle.
    #[inline]
    pub fn update_one(
        &mut self,
        index: usize,
        pointer: Option<Vec2>,
        physics: &Physics,
    ) -> Option<Kinematics> {
        let origin = *self.origins.get(index)?;
        let next = step_or_settle(self.kinematics(index)?, origin, pointer, physics);
        self.set_kinematics(index, next);
        Some(next)
    }

    /// Draw every particle onto the canvas, as either a square or its glyph.
    #[inline]
    pub fn draw(&self, canvas: &mut Canvas, style: &RenderStyle) {
        for (position, glyph) in self.positions.iter().zip(&self.glyphs) {
            if style.is_matrix_mode {
                canvas.draw_glyph(
                    *glyph,
                    position.x,
                    position.y,
                    style.size * 2.0,
                    style.colour,
                );
            } else {
                canvas.fill_rect(position.x, position.y, style.size, style.size, style.colour);
            }
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests aren't so strict")]
mod test {
    use super::*;
    use crate::config::ParticleConfig;

    fn physics() -> Physics {
        ParticleConfig::default().physics()
    }

    #[test]
    fn spring_pulls_towards_origin() {
        let start = Kinematics::new(Vec2::new(10.0, 0.0), Vec2::ZERO);
        let next = step(start, Vec2::ZERO, None, &physics());
        // (0 - 10) * 0.1 * 0.92
        assert!((next.velocity.x - -0.92).abs() < 0.0001);
        assert!((next.position.x - 9.08).abs() < 0.0001);
        assert!(next.velocity.y.abs() < f32::EPSILON);
    }

    #[test]
    fn pointer_outside_radius_has_no_effect() {
        let start = Kinematics::new(Vec2::new(10.0, 10.0), Vec2::new(1.0, -1.0));
        let far = Some(Vec2::new(500.0, 500.0));
        assert_eq!(
            step(start, Vec2::new(10.0, 10.0), far, &physics()),
            step(start, Vec2::new(10.0, 10.0), None, &physics())
        );
    }

    #[test]
    fn pointer_repels() {
        let start = Kinematics::new(Vec2::new(100.0, 100.0), Vec2::ZERO);
        let pointer = Some(Vec2::new(110.0, 100.0));
        let next = step(start, Vec2::new(100.0, 100.0), pointer, &physics());
        // Force is -150 / 10, pushing away from the pointer along x.
        assert!((next.velocity.x - -15.0 * 0.92).abs() < 0.001);
        assert!(next.position.x < 100.0);
    }

    #[test]
    fn repulsion_saturates_close_to_the_pointer() {
        let start = Kinematics::new(Vec2::ZERO, Vec2::ZERO);
        // Squared distance of 10
        let pointer = Some(Vec2::new(3.0, 1.0));
        let next = step(start, Vec2::ZERO, pointer, &physics());
        let length = 10.0_f32.sqrt();
        let expected = Vec2::new(3.0 / length, 1.0 / length) * -20.0 * 0.92;
        assert!((next.velocity - expected).length() < 0.0001);
    }

    #[test]
    fn pointer_directly_on_a_particle_is_finite() {
        let start = Kinematics::new(Vec2::new(5.0, 5.0), Vec2::ZERO);
        let next = step(start, Vec2::new(5.0, 5.0), Some(Vec2::new(5.0, 5.0)), &physics());
        assert!(next.position.is_finite());
        assert!((next.velocity.length() - 20.0 * 0.92).abs() < 0.001);
    }

    #[test]
    fn converges_on_origin() {
        let origin = Vec2::new(50.0, 50.0);
        let mut current = Kinematics::new(Vec2::new(150.0, 50.0), Vec2::ZERO);
        let mut early_peak: f32 = 0.0;
        let mut later_peak: f32 = 0.0;
        for tick in 0..500 {
            current = step(current, origin, None, &physics());
            let distance = current.position.distance(origin);
            if tick < 100 {
                early_peak = early_peak.max(distance);
            } else if tick < 200 {
                later_peak = later_peak.max(distance);
            }
        }
        assert!(later_peak < early_peak);
        assert!(current.position.distance(origin) < 1.0);
    }

    #[test]
    fn batch_and_individual_updates_match() {
        let mut set = ParticleSet::with_capacity(3);
        set.push(Vec2::new(0.0, 0.0), Vec2::new(30.0, 10.0), 'A');
        set.push(Vec2::new(20.0, 5.0), Vec2::new(22.0, 7.0), 'B');
        set.push(Vec2::new(40.0, 40.0), Vec2::new(0.0, 90.0), 'C');
        let pointer = Some(Vec2::new(21.0, 6.0));

        let mut individually = set.clone();
        for _ in 0..10 {
            set.update(pointer, &physics());
        }
        // Only ever touch particle 1, others must stay put.
        for _ in 0..10 {
            individually.update_one(1, pointer, &physics()).unwrap();
        }
        assert_eq!(set.kinematics(1), individually.kinematics(1));
        assert_eq!(
            individually.kinematics(0).unwrap().position,
            Vec2::new(30.0, 10.0)
        );

        for index in [0, 2] {
            for _ in 0..10 {
                individually.update_one(index, pointer, &physics()).unwrap();
            }
        }
        assert_eq!(set, individually);
    }

    #[test]
    fn non_finite_state_is_settled() {
        let mut set = ParticleSet::with_capacity(1);
        set.push(Vec2::new(1.0, 2.0), Vec2::new(f32::NAN, 0.0), '0');
        set.update(None, &physics());
        let kinematics = set.kinematics(0).unwrap();
        assert_eq!(kinematics.position, Vec2::new(1.0, 2.0));
        assert_eq!(kinematics.velocity, Vec2::ZERO);
    }

    #[test]
    fn updating_an_empty_set_is_fine() {
        let mut set = ParticleSet::default();
        set.update(Some(Vec2::ZERO), &physics());
        assert!(set.is_empty());
        assert!(set.update_one(0, None, &physics()).is_none());
    }

    #[test]
    fn draws_squares_or_glyphs() {
        let colour = (0.0, 1.0, 0.0, 1.0);
        let mut set = ParticleSet::with_capacity(1);
        set.push(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0), '7');

        let mut canvas = Canvas::new(4, 4);
        set.draw(&mut canvas, &RenderStyle::new(2.0, colour, false));
        assert_eq!(canvas.pixel(2, 2).unwrap(), colour);
        assert!(canvas.glyph(1, 1).is_none());

        let mut canvas = Canvas::new(4, 4);
        set.draw(&mut canvas, &RenderStyle::new(2.0, colour, true));
        let glyph = canvas.glyph(1, 1).unwrap();
        assert_eq!(glyph.character, '7');
        assert!((glyph.font_size - 4.0).abs() < f32::EPSILON);
        assert_eq!(canvas.pixel(1, 1).unwrap(), crate::canvas::BLACK);
    }
}
