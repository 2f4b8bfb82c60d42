//! A convenience module for running a [`Simulation`] in a Tokio task.
//!
//! The simulation can't be touched directly once it's running. Instead, pointer positions and
//! config changes are published on watch channels (the latest value always wins), control
//! signals go over a broadcast channel, and rendered frames come back on an mpsc channel.
//! Decoding images and rebuilding particles happen on Tokio's blocking pool, so the frame loop
//! keeps ticking with the current particles until the new ones are ready.

use std::sync::Arc;

use glam::Vec2;

use crate::config::ParticleConfig;
use crate::errors::ParticleError;
use crate::rasterizer::Source;
use crate::simulation::{Frame, Resampled, Simulation};
use crate::Protocol;

/// Microseconds in a second.
const ONE_MICROSECOND: u64 = 1_000_000;

/// Config for starting an active simulation.
#[derive(Debug, Clone)]
#[expect(
    clippy::exhaustive_structs,
    reason = "Config reads best as a struct literal based on `Config::default()`"
)]
pub struct Config {
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// The target number of ticks per second.
    pub frame_rate: u32,
    /// The initial particle config.
    pub particles: ParticleConfig,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            width: 100,
            height: 60,
            frame_rate: 30,
            particles: ParticleConfig::default(),
        }
    }
}

/// Notable things that happened inside the running simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// An uploaded image couldn't be decoded. The field falls back to the procedural pattern.
    ImageDecodeFailure(String),
    /// A new particle set was swapped in.
    Resampled {
        /// The number of particles in the new set.
        count: usize,
    },
}

/// Results of work done on the blocking pool.
enum Work {
    /// An uploaded image has been decoded.
    Decoded {
        /// Which upload this was.
        image_generation: u64,
        /// The decoded pixels.
        result: Result<image::RgbaImage, ParticleError>,
    },
    /// A new particle set has been built.
    Resampled(Result<Resampled, ParticleError>),
}

/// The state owned by the simulation's Tokio task.
struct Runner {
    /// The simulation itself.
    simulation: Simulation,
    /// Control signals.
    control_rx: tokio::sync::broadcast::Receiver<Protocol>,
    /// The latest pointer position.
    pointer_rx: tokio::sync::watch::Receiver<Option<Vec2>>,
    /// The latest particle config.
    config_rx: tokio::sync::watch::Receiver<ParticleConfig>,
    /// Rendered frames.
    frame_tx: tokio::sync::mpsc::Sender<Frame>,
    /// Notable events.
    event_tx: tokio::sync::mpsc::Sender<Event>,
    /// Sends results from the blocking pool back to the loop.
    work_tx: tokio::sync::mpsc::Sender<Work>,
    /// Receives results from the blocking pool.
    work_rx: tokio::sync::mpsc::Receiver<Work>,
    /// Target ticks per second.
    frame_rate: u32,
    /// When the previous tick happened.
    last_frame_tick: std::time::Instant,
    /// Incremented for every image upload, clear and reset. Decodes from older uploads are
    /// ignored.
    image_generation: u64,
}

impl Runner {
    /// The main loop. Only returns on [`Protocol::End`].
    async fn run(mut self) {
        tracing::debug!("Starting particle simulation loop");
        self.spawn_resample();

        #[expect(
            clippy::integer_division_remainder_used,
            reason = "`tokio::select!` generates this."
        )]
        loop {
            tokio::select! {
                () = Self::sleep_until_next_frame_tick(self.last_frame_tick, self.frame_rate) => {
                    self.last_frame_tick = std::time::Instant::now();
                    self.tick();
                }
                result = self.control_rx.recv() => {
                    match result {
                        Ok(Protocol::End) => break,
                        Ok(message) => self.handle_protocol_message(message),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("Particle simulation missed {missed} control messages");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                Ok(()) = self.config_rx.changed() => self.handle_config_change(),
                Some(work) = self.work_rx.recv() => self.handle_work(work),
            }
        }

        tracing::debug!("Particle simulation loop finished");
    }

    /// Sleep until the next tick is due.
    async fn sleep_until_next_frame_tick(last_frame_tick: std::time::Instant, frame_rate: u32) {
        let target = ONE_MICROSECOND.wrapping_div(frame_rate.max(1).into());
        let target_frame_rate_micro = std::time::Duration::from_micros(target);
        if let Some(wait) = target_frame_rate_micro.checked_sub(last_frame_tick.elapsed()) {
            tokio::time::sleep(wait).await;
        }
    }

    /// Advance the field and send the resulting frame.
    fn tick(&mut self) {
        let pointer = *self.pointer_rx.borrow();
        self.simulation.tick(pointer);

        match self.frame_tx.try_send(self.simulation.frame()) {
            Ok(()) => (),
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("Frame receiver is busy, dropping frame");
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Nobody is listening for frames");
            }
        }
    }

    /// Let whoever is listening know that something happened.
    fn emit(&self, event: Event) {
        if let Err(error) = self.event_tx.try_send(event) {
            tracing::trace!("Couldn't send particle event: {error:?}");
        }
    }

    /// Handle control signals.
    fn handle_protocol_message(&mut self, message: Protocol) {
        tracing::debug!("Particle simulation received protocol message: {message:?}");

        match message {
            Protocol::End => (),
            Protocol::Resize { width, height } => {
                match self.simulation.resize(width, height) {
                    Ok(()) => self.spawn_resample(),
                    Err(error) => tracing::error!("Couldn't resize particle canvas: {error}"),
                }
            }
            Protocol::LoadImage(bytes) => {
                self.image_generation = self.image_generation.wrapping_add(1);
                self.spawn_decode(bytes);
            }
            Protocol::ClearImage => {
                self.image_generation = self.image_generation.wrapping_add(1);
                self.simulation.set_image(Source::Procedural);
                self.spawn_resample();
            }
            Protocol::Reset => {
                self.image_generation = self.image_generation.wrapping_add(1);
                if let Err(error) = self.simulation.reset() {
                    tracing::error!("Couldn't reset particle field: {error}");
                }
                self.spawn_resample();
            }
        }
    }

    /// Apply the latest particle config.
    fn handle_config_change(&mut self) {
        let config = self.config_rx.borrow_and_update().clone();
        match self.simulation.set_config(config) {
            Ok(true) => self.spawn_resample(),
            Ok(false) => (),
            Err(error) => tracing::error!("Ignoring invalid particle config: {error}"),
        }
    }

    /// Handle results coming back from the blocking pool.
    fn handle_work(&mut self, work: Work) {
        match work {
            Work::Decoded {
                image_generation,
                result,
            } => {
                if image_generation != self.image_generation {
                    tracing::debug!("Ignoring stale image upload {image_generation}");
                    return;
                }

                match result {
                    Ok(image) => {
                        self.simulation.set_image(Source::Image(Arc::new(image)));
                        self.spawn_resample();
                    }
                    Err(error) => {
                        let reason = match std::error::Error::source(&error) {
                            Some(source) => format!("{error}: {source}"),
                            None => error.to_string(),
                        };
                        tracing::warn!("Falling back to procedural pattern: {reason}");
                        self.emit(Event::ImageDecodeFailure(reason));
                        self.simulation.set_image(Source::Procedural);
                        self.spawn_resample();
                    }
                }
            }
            Work::Resampled(Ok(resampled)) => {
                let count = resampled.particles.len();
                if self.simulation.install(resampled) {
                    self.emit(Event::Resampled { count });
                }
            }
            Work::Resampled(Err(error)) => {
                tracing::error!("Couldn't build particles: {error}");
            }
        }
    }

    /// Rebuild the particles from the current source.
    /// The particles are built on the blocking pool.
    fn spawn_resample(&mut self) {
        let request = self.simulation.request_resample();
        let work_tx = self.work_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = request.run(&mut rand::thread_rng());
            if work_tx.blocking_send(Work::Resampled(result)).is_err() {
                tracing::trace!("Simulation ended before resample finished");
            }
        });
    }

    /// Decode an uploaded image on the blocking pool.
    fn spawn_decode(&self, bytes: Arc<[u8]>) {
        let work_tx = self.work_tx.clone();
        let image_generation = self.image_generation;
        tokio::task::spawn_blocking(move || {
            let result = crate::rasterizer::decode_image(&bytes);
            let work = Work::Decoded {
                image_generation,
                result,
            };
            if work_tx.blocking_send(work).is_err() {
                tracing::trace!("Simulation ended before image was decoded");
            }
        });
    }
}

/// A particle simulation running in a Tokio task.
#[non_exhaustive]
pub struct ActiveSimulation {
    /// The task handle to the running simulation loop.
    pub task_handle: tokio::task::JoinHandle<()>,
    /// Rendered frames. Frames are dropped rather than queued when this isn't read quickly
    /// enough.
    pub frame_rx: tokio::sync::mpsc::Receiver<Frame>,
    /// Notable events like image decode failures.
    pub event_rx: tokio::sync::mpsc::Receiver<Event>,
    /// Control signals like resizing and shutting down.
    control_tx: tokio::sync::broadcast::Sender<Protocol>,
    /// The latest pointer position.
    pointer_tx: tokio::sync::watch::Sender<Option<Vec2>>,
    /// The latest particle config.
    config_tx: tokio::sync::watch::Sender<ParticleConfig>,
}

impl ActiveSimulation {
    /// Start a simulation running in a Tokio task. It begins with the procedural pattern.
    ///
    /// # Errors
    /// If the dimensions or particle config are invalid.
    #[inline]
    pub fn start(config: Config) -> Result<Self, ParticleError> {
        let simulation = Simulation::new(config.width, config.height, config.particles.clone())?;

        let (control_tx, control_rx) = tokio::sync::broadcast::channel(64);
        let (pointer_tx, pointer_rx) = tokio::sync::watch::channel(None);
        let (config_tx, config_rx) = tokio::sync::watch::channel(config.particles);
        let (frame_tx, frame_rx) = tokio::sync::mpsc::channel(1);
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(16);
        let (work_tx, work_rx) = tokio::sync::mpsc::channel(4);

        let runner = Runner {
            simulation,
            control_rx,
            pointer_rx,
            config_rx,
            frame_tx,
            event_tx,
            work_tx,
            work_rx,
            frame_rate: config.frame_rate,
            last_frame_tick: std::time::Instant::now(),
            image_generation: 0,
        };
        let task_handle = tokio::spawn(runner.run());

        Ok(Self {
            task_handle,
            frame_rx,
            event_rx,
            control_tx,
            pointer_tx,
            config_tx,
        })
    }

    /// Whether the simulation loop is still going.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Move the pointer, or remove it with `None`. Only the latest position is ever used.
    #[inline]
    pub fn set_pointer(&self, pointer: Option<Vec2>) {
        self.pointer_tx.send_replace(pointer);
    }

    /// The most recently published particle config.
    #[inline]
    #[must_use]
    pub fn config(&self) -> ParticleConfig {
        self.config_tx.borrow().clone()
    }

    /// Publish a new particle config. Changes to the gap, size or colour rebuild the particles.
    ///
    /// # Errors
    /// If the config is invalid, in which case nothing is published.
    #[inline]
    pub fn update_config(&self, config: ParticleConfig) -> Result<(), ParticleError> {
        config.validate()?;
        self.config_tx.send_replace(config);
        Ok(())
    }

    /// Sample particles from the bytes of an image file. Decode failures are reported on
    /// [`Self::event_rx`].
    ///
    /// # Errors
    /// If the simulation has already ended.
    #[inline]
    pub fn load_image(
        &self,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<usize, tokio::sync::broadcast::error::SendError<Protocol>> {
        self.control_tx.send(Protocol::LoadImage(bytes.into()))
    }

    /// Go back to the procedural pattern.
    ///
    /// # Errors
    /// If the simulation has already ended.
    #[inline]
    pub fn clear_image(&self) -> Result<usize, tokio::sync::broadcast::error::SendError<Protocol>> {
        self.control_tx.send(Protocol::ClearImage)
    }

    /// Resize the canvas, which rebuilds the particles.
    ///
    /// # Errors
    /// If the simulation has already ended.
    #[inline]
    pub fn resize(
        &self,
        width: u32,
        height: u32,
    ) -> Result<usize, tokio::sync::broadcast::error::SendError<Protocol>> {
        self.control_tx.send(Protocol::Resize { width, height })
    }

    /// Clear the image and particles, and return the config to its defaults.
    ///
    /// # Errors
    /// If the simulation has already ended.
    #[inline]
    pub fn reset(&self) -> Result<usize, tokio::sync::broadcast::error::SendError<Protocol>> {
        self.config_tx.send_replace(ParticleConfig::default());
        self.control_tx.send(Protocol::Reset)
    }

    /// Signal the simulation loop to end.
    ///
    /// # Errors
    /// If the simulation has already ended.
    #[inline]
    pub fn kill(&self) -> Result<usize, tokio::sync::broadcast::error::SendError<Protocol>> {
        tracing::debug!("`kill()` called on `ActiveSimulation`");
        self.control_tx.send(Protocol::End)
    }

    /// End the simulation loop and wait for it to finish.
    ///
    /// # Errors
    /// If the simulation task panicked.
    #[inline]
    pub async fn stop(&mut self) -> Result<(), ParticleError> {
        if self.is_running() {
            if let Err(error) = self.kill() {
                tracing::trace!("Simulation ended whilst stopping: {error:?}");
            }
        }

        if let Err(error) = (&mut self.task_handle).await {
            snafu::whatever!("Particle simulation task failed: {error:?}");
        }
        Ok(())
    }
}

impl Drop for ActiveSimulation {
    #[inline]
    fn drop(&mut self) {
        if !self.is_running() {
            return;
        }

        let result = self.kill();
        if let Err(error) = result {
            tracing::error!("{error:?}");
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

    fn start() -> ActiveSimulation {
        ActiveSimulation::start(Config {
            width: 40,
            height: 30,
            frame_rate: 120,
            ..Config::default()
        })
        .unwrap()
    }

    async fn next_event(simulation: &mut ActiveSimulation) -> Event {
        tokio::time::timeout(TIMEOUT, simulation.event_rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    /// Wait for `count` particles to be installed, then check that they stay.
    async fn settle_on(simulation: &mut ActiveSimulation, count: usize) {
        loop {
            if next_event(simulation).await == (Event::Resampled { count }) {
                break;
            }
        }

        let mut frames = Vec::new();
        tokio::time::timeout(TIMEOUT, async {
            while frames.len() < 10 {
                let frame = simulation.frame_rx.recv().await.unwrap();
                if frame.particle_count == count || !frames.is_empty() {
                    frames.push(frame.particle_count);
                }
            }
        })
        .await
        .unwrap();
        assert!(frames.iter().all(|frame_count| *frame_count == count));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn starts_with_the_procedural_pattern() {
        let mut simulation = start();
        let Event::Resampled { count } = next_event(&mut simulation).await else {
            panic!("Expected particles");
        };
        assert!(count > 0);

        let frame = tokio::time::timeout(TIMEOUT, simulation.frame_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.canvas.width, 40);
        assert_eq!(frame.canvas.height, 30);

        simulation.stop().await.unwrap();
        assert!(!simulation.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_images_fall_back_to_the_pattern() {
        let mut simulation = start();
        next_event(&mut simulation).await;

        simulation.load_image(b"not an image".to_vec()).unwrap();
        let event = next_event(&mut simulation).await;
        assert!(matches!(event, Event::ImageDecodeFailure(_)));
        let event = next_event(&mut simulation).await;
        assert!(matches!(event, Event::Resampled { .. }));
        assert!(simulation.is_running());

        simulation.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_configs_are_not_published() {
        let simulation = start();
        let broken = ParticleConfig {
            ease: 0.0,
            ..ParticleConfig::default()
        };
        assert!(simulation.update_config(broken).is_err());
        assert_eq!(simulation.config(), ParticleConfig::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reset_publishes_default_config() {
        let mut simulation = start();
        simulation
            .update_config(ParticleConfig {
                mouse_radius: 500.0,
                ..ParticleConfig::default()
            })
            .unwrap();
        simulation.reset().unwrap();
        assert_eq!(simulation.config(), ParticleConfig::default());
        simulation.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn the_latest_image_upload_wins() {
        let mut simulation = start();
        next_event(&mut simulation).await;

        simulation.load_image(white_png(10, 10)).unwrap();
        simulation.load_image(white_png(20, 2)).unwrap();

        // The 20x2 image is fitted to 32x3.2 at (4, 13.4), so with a gap of 5 only row 15 is
        // sampled, in 7 columns.
        settle_on(&mut simulation, 7).await;
        simulation.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn config_changes_whilst_loading_keep_the_image() {
        let mut simulation = start();
        next_event(&mut simulation).await;

        simulation.load_image(white_png(2, 2)).unwrap();
        simulation
            .update_config(ParticleConfig {
                gap: 4,
                ..ParticleConfig::default()
            })
            .unwrap();

        // 24x24 at (8, 3), sampled every 4 pixels.
        settle_on(&mut simulation, 36).await;
        assert_eq!(simulation.config().gap, 4);
        simulation.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resizes_whilst_loading_keep_the_image() {
        let mut simulation = start();
        next_event(&mut simulation).await;

        simulation.load_image(white_png(2, 2)).unwrap();
        simulation.resize(40, 60).unwrap();

        // 32x32 at (4, 14), sampled every 5 pixels.
        settle_on(&mut simulation, 49).await;
        simulation.stop().await.unwrap();
    }
}
