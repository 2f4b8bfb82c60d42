//! The particle field as seen from the terminal. This is where mouse movements become the
//! pointer, keybindings tweak the particle config, and simulation frames become terminal
//! surfaces.

use std::sync::Arc;

use color_eyre::eyre::Result;
use particle_core::active_simulation::{self, ActiveSimulation, Event};
use particle_core::simulation::Frame;
use particle_core::ParticleConfig;

use crate::config::input::KeybindingAction;
use crate::run::Protocol;
use crate::shared_state::SharedState;
use crate::surface::Surface;

/// How much the radius changes for each keypress.
const RADIUS_STEP: f32 = 10.0;
/// The smallest adjustable radius.
const MIN_RADIUS: f32 = 20.0;
/// The biggest adjustable radius.
const MAX_RADIUS: f32 = 1000.0;
/// How much the particle size changes for each keypress.
const SIZE_STEP: f32 = 1.0;
/// The smallest adjustable particle size.
const MIN_SIZE: f32 = 1.0;
/// The biggest adjustable particle size.
const MAX_SIZE: f32 = 10.0;
/// How much the ease changes for each keypress.
const EASE_STEP: f32 = 0.01;
/// The smallest adjustable ease.
const MIN_EASE: f32 = 0.01;
/// The biggest adjustable ease.
const MAX_EASE: f32 = 0.5;

/// Owns the running simulation and connects it to the rest of the app.
pub(crate) struct Field {
    /// Shared app state
    state: Arc<SharedState>,
    /// The running particle simulation
    simulation: ActiveSimulation,
    /// Where finished surfaces are sent for rendering
    surfaces_tx: tokio::sync::mpsc::Sender<Surface>,
    /// The colours that the colour key cycles through
    colours: Vec<String>,
    /// Whether to overlay the FPS and particle count
    show_status: bool,
    /// An image given on the command line. It takes precedence over the config's image.
    cli_image: Option<std::path::PathBuf>,
    /// The image from the config file, so that we know when it changes.
    config_image: Option<std::path::PathBuf>,
}

impl Field {
    /// Start the particle field and run it until the user quits or the app ends.
    pub async fn start(
        state: Arc<SharedState>,
        surfaces_tx: tokio::sync::mpsc::Sender<Surface>,
        cli_args: &crate::cli_args::CliArgs,
    ) -> Result<()> {
        let mut protocol_rx = state.protocol_tx.subscribe();
        let tty_size = state.get_tty_size().await;
        let config = state.config.read().await.clone();

        let mut particles = config.particles.clone();
        if cli_args.matrix {
            particles.is_matrix_mode = true;
            state.config.write().await.particles.is_matrix_mode = true;
        }

        let simulation = ActiveSimulation::start(active_simulation::Config {
            width: u32::from(tty_size.width).max(1),
            height: canvas_height(tty_size.height),
            frame_rate: config.frame_rate,
            particles,
        })?;

        let mut field = Self {
            state,
            simulation,
            surfaces_tx,
            colours: config.colours,
            show_status: config.show_status,
            cli_image: cli_args.image.clone(),
            config_image: config.image,
        };

        if let Some(path) = field.current_image() {
            field.load_image(&path).await;
        }

        let result = field.run(&mut protocol_rx).await;
        field.simulation.stop().await?;
        result
    }

    /// The main loop.
    async fn run(
        &mut self,
        protocol_rx: &mut tokio::sync::broadcast::Receiver<Protocol>,
    ) -> Result<()> {
        tracing::debug!("Starting particle field loop");

        #[expect(
            clippy::integer_division_remainder_used,
            reason = "`tokio::select!` generates this."
        )]
        loop {
            tokio::select! {
                Some(frame) = self.simulation.frame_rx.recv() => {
                    self.handle_frame(frame).await;
                }
                Some(event) = self.simulation.event_rx.recv() => {
                    self.handle_event(event).await;
                }
                result = protocol_rx.recv() => {
                    match result {
                        Ok(Protocol::End) => break,
                        Ok(message) => {
                            let is_quitting = self.handle_protocol_message(message).await;
                            if is_quitting {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("Particle field missed {missed} protocol messages");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }

            if !self.simulation.is_running() {
                color_eyre::eyre::bail!("The particle simulation stopped unexpectedly");
            }
        }

        tracing::debug!("Leaving particle field loop");
        Ok(())
    }

    /// The image to show: either from the CLI or from the config.
    fn current_image(&self) -> Option<std::path::PathBuf> {
        self.cli_image.clone().or_else(|| self.config_image.clone())
    }

    /// Convert a frame into a surface and send it to the renderer.
    async fn handle_frame(&self, frame: Frame) {
        let (Ok(width), Ok(height)) = (
            usize::try_from(frame.canvas.width),
            usize::try_from(frame.canvas.height.div_euclid(2)),
        ) else {
            return;
        };

        let mut surface = Surface::from_canvas(&frame.canvas, width, height);
        if self.show_status {
            let mut status = format!(
                "FPS: {:.0} | Particles: {}",
                frame.fps, frame.particle_count
            );
            if let Some(message) = self.state.get_status().await {
                status = format!("{status} | {message}");
            }
            surface.add_text(0, 0, status, None);
        }

        match self.surfaces_tx.try_send(surface) {
            Ok(()) => (),
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("Renderer is busy, dropping frame");
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Renderer has gone, dropping frame");
            }
        }
    }

    /// Handle notable things that happened inside the simulation.
    async fn handle_event(&self, event: Event) {
        match event {
            Event::ImageDecodeFailure(reason) => {
                tracing::warn!("Image couldn't be decoded: {reason}");
                self.state
                    .set_status(Some(format!("Image error: {reason}")))
                    .await;
            }
            Event::Resampled { count } => {
                tracing::debug!("Particle field rebuilt with {count} particles");
            }
            _ => tracing::trace!("Unhandled simulation event: {event:?}"),
        }
    }

    /// Handle messages from the global app protocol. Returns `true` when the user wants to quit.
    #[expect(clippy::wildcard_enum_match_arm, reason = "It's our internal protocol")]
    async fn handle_protocol_message(&mut self, message: Protocol) -> bool {
        match message {
            Protocol::Resize { width, height } => {
                self.simulation.set_pointer(None);
                let result = self
                    .simulation
                    .resize(u32::from(width).max(1), canvas_height(height));
                if let Err(error) = result {
                    tracing::error!("Couldn't resize particle field: {error:?}");
                }
            }
            Protocol::Input(input) => {
                if let termwiz::input::InputEvent::Mouse(mouse) = input.event {
                    self.simulation
                        .set_pointer(Some(pointer_from_cell(mouse.x, mouse.y)));
                }
            }
            Protocol::KeybindEvent(action) => return self.handle_action(&action).await,
            Protocol::Config(config) => self.handle_config_change(config).await,
            _ => (),
        }

        false
    }

    /// Apply a user's keypress. Returns `true` when the user wants to quit.
    #[expect(
        clippy::wildcard_enum_match_arm,
        reason = "Everything else is a config adjustment"
    )]
    async fn handle_action(&mut self, action: &KeybindingAction) -> bool {
        tracing::debug!("Handling keybinding action: {action:?}");

        match action {
            KeybindingAction::Quit => return true,
            KeybindingAction::Reset => {
                self.cli_image = None;
                self.config_image = None;
                if let Err(error) = self.simulation.reset() {
                    tracing::error!("Couldn't reset particle field: {error:?}");
                }
                self.state.config.write().await.particles = ParticleConfig::default();
                self.state.set_status(Some("Reset".to_owned())).await;
            }
            _ => {
                let current = self.simulation.config();
                if let Some(adjusted) = adjust(&current, &self.colours, action) {
                    self.publish_particle_config(adjusted).await;
                }
            }
        }

        false
    }

    /// Send a new particle config to the simulation and keep a copy in the shared state.
    async fn publish_particle_config(&self, config: ParticleConfig) {
        match self.simulation.update_config(config.clone()) {
            Ok(()) => {
                self.state.config.write().await.particles = config;
            }
            Err(error) => {
                tracing::warn!("Particle config rejected: {error:?}");
                self.state.set_status(Some(error.to_string())).await;
            }
        }
    }

    /// The config file changed.
    async fn handle_config_change(&mut self, config: crate::config::main::Config) {
        self.colours = config.colours;
        self.show_status = config.show_status;
        self.publish_particle_config(config.particles).await;

        if config.image == self.config_image {
            return;
        }
        self.config_image = config.image;
        if self.cli_image.is_some() {
            return;
        }

        match self.config_image.clone() {
            Some(path) => self.load_image(&path).await,
            None => {
                if let Err(error) = self.simulation.clear_image() {
                    tracing::error!("Couldn't clear image: {error:?}");
                }
            }
        }
    }

    /// Read an image file and hand it to the simulation to decode.
    async fn load_image(&self, path: &std::path::Path) {
        tracing::debug!("Loading image: {path:?}");
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                if let Err(error) = self.simulation.load_image(bytes) {
                    tracing::error!("Couldn't send image to particle field: {error:?}");
                }
            }
            Err(error) => {
                tracing::warn!("Couldn't read image {path:?}: {error:?}");
                self.state
                    .set_status(Some(format!(
                        "Couldn't read {}: {error}",
                        path.display()
                    )))
                    .await;
            }
        }
    }
}

/// Every terminal row holds 2 canvas pixels.
fn canvas_height(rows: u16) -> u32 {
    (u32::from(rows) * 2).max(1)
}

/// Terminals report mouse positions as 1-based cells. The pointer goes in the middle of the cell.
fn pointer_from_cell(x: u16, y: u16) -> glam::Vec2 {
    glam::Vec2::new(
        f32::from(x.saturating_sub(1)) + 0.5,
        f32::from(y.saturating_sub(1)) * 2.0 + 1.0,
    )
}

/// Round to 2 decimal places so that repeated steps don't accumulate floating point noise.
fn round_to_hundredths(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// The colour after the current one, going back to the start at the end of the list. Colours
/// that aren't in the list move to the first colour.
fn next_colour(colours: &[String], current: &str) -> Option<String> {
    let maybe_index = colours
        .iter()
        .position(|colour| colour.eq_ignore_ascii_case(current));
    let next = match maybe_index {
        Some(index) => colours.get(index + 1).or_else(|| colours.first()),
        None => colours.first(),
    };
    next.cloned()
}

/// Apply a keybinding action to the particle config. Returns `None` when nothing changes, for
/// example when a value is already at its limit.
pub(crate) fn adjust(
    config: &ParticleConfig,
    colours: &[String],
    action: &KeybindingAction,
) -> Option<ParticleConfig> {
    let mut adjusted = config.clone();
    match action {
        KeybindingAction::ToggleMatrixMode => adjusted.is_matrix_mode = !config.is_matrix_mode,
        KeybindingAction::CycleColour => adjusted.colour = next_colour(colours, &config.colour)?,
        KeybindingAction::IncreaseRadius => {
            adjusted.mouse_radius = (config.mouse_radius + RADIUS_STEP).clamp(MIN_RADIUS, MAX_RADIUS);
        }
        KeybindingAction::DecreaseRadius => {
            adjusted.mouse_radius = (config.mouse_radius - RADIUS_STEP).clamp(MIN_RADIUS, MAX_RADIUS);
        }
        KeybindingAction::IncreaseSize => {
            adjusted.particle_size = (config.particle_size + SIZE_STEP).clamp(MIN_SIZE, MAX_SIZE);
        }
        KeybindingAction::DecreaseSize => {
            adjusted.particle_size = (config.particle_size - SIZE_STEP).clamp(MIN_SIZE, MAX_SIZE);
        }
        KeybindingAction::IncreaseEase => {
            adjusted.ease = round_to_hundredths(config.ease + EASE_STEP).clamp(MIN_EASE, MAX_EASE);
        }
        KeybindingAction::DecreaseEase => {
            adjusted.ease = round_to_hundredths(config.ease - EASE_STEP).clamp(MIN_EASE, MAX_EASE);
        }
        KeybindingAction::IncreaseGap => adjusted.gap = config.gap.saturating_add(1),
        KeybindingAction::DecreaseGap => adjusted.gap = config.gap.saturating_sub(1).max(1),
        KeybindingAction::Reset | KeybindingAction::Quit => return None,
    }

    (adjusted != *config).then_some(adjusted)
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    fn colours() -> Vec<String> {
        ["#00ff41", "#00ffff", "#ff0055"]
            .map(ToOwned::to_owned)
            .to_vec()
    }

    #[test]
    fn radius_steps_within_limits() {
        let config = ParticleConfig::default();
        let bigger = adjust(&config, &[], &KeybindingAction::IncreaseRadius).unwrap();
        assert!((bigger.mouse_radius - 160.0).abs() < f32::EPSILON);

        let at_max = ParticleConfig {
            mouse_radius: MAX_RADIUS,
            ..ParticleConfig::default()
        };
        assert!(adjust(&at_max, &[], &KeybindingAction::IncreaseRadius).is_none());

        let near_min = ParticleConfig {
            mouse_radius: 25.0,
            ..ParticleConfig::default()
        };
        let smaller = adjust(&near_min, &[], &KeybindingAction::DecreaseRadius).unwrap();
        assert!((smaller.mouse_radius - MIN_RADIUS).abs() < f32::EPSILON);
    }

    #[test]
    fn size_stops_at_one() {
        let config = ParticleConfig {
            particle_size: 1.0,
            ..ParticleConfig::default()
        };
        assert!(adjust(&config, &[], &KeybindingAction::DecreaseSize).is_none());
        let bigger = adjust(&config, &[], &KeybindingAction::IncreaseSize).unwrap();
        assert!((bigger.particle_size - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn ease_steps_are_rounded() {
        let mut config = ParticleConfig::default();
        for _ in 0..3 {
            config = adjust(&config, &[], &KeybindingAction::IncreaseEase).unwrap();
        }
        assert!((config.ease - 0.13).abs() < 1e-6);

        let at_min = ParticleConfig {
            ease: MIN_EASE,
            ..ParticleConfig::default()
        };
        assert!(adjust(&at_min, &[], &KeybindingAction::DecreaseEase).is_none());
    }

    #[test]
    fn gap_never_reaches_zero() {
        let config = ParticleConfig {
            gap: 1,
            ..ParticleConfig::default()
        };
        assert!(adjust(&config, &[], &KeybindingAction::DecreaseGap).is_none());
        let wider = adjust(&config, &[], &KeybindingAction::IncreaseGap).unwrap();
        assert_eq!(wider.gap, 2);
    }

    #[test]
    fn colours_cycle_and_wrap() {
        let config = ParticleConfig::default();
        let next = adjust(&config, &colours(), &KeybindingAction::CycleColour).unwrap();
        assert_eq!(next.colour, "#00ffff");

        let last = ParticleConfig {
            colour: "#FF0055".to_owned(),
            ..ParticleConfig::default()
        };
        let wrapped = adjust(&last, &colours(), &KeybindingAction::CycleColour).unwrap();
        assert_eq!(wrapped.colour, "#00ff41");

        assert!(adjust(&config, &[], &KeybindingAction::CycleColour).is_none());
    }

    #[test]
    fn unknown_colours_go_to_the_first() {
        let config = ParticleConfig {
            colour: "#123456".to_owned(),
            ..ParticleConfig::default()
        };
        let next = adjust(&config, &colours(), &KeybindingAction::CycleColour).unwrap();
        assert_eq!(next.colour, "#00ff41");
    }

    #[test]
    fn matrix_mode_toggles() {
        let config = ParticleConfig::default();
        let toggled = adjust(&config, &[], &KeybindingAction::ToggleMatrixMode).unwrap();
        assert!(toggled.is_matrix_mode);
        let back = adjust(&toggled, &[], &KeybindingAction::ToggleMatrixMode).unwrap();
        assert!(!back.is_matrix_mode);
    }

    #[test]
    fn reset_and_quit_are_not_adjustments() {
        let config = ParticleConfig::default();
        assert!(adjust(&config, &[], &KeybindingAction::Reset).is_none());
        assert!(adjust(&config, &[], &KeybindingAction::Quit).is_none());
    }

    #[test]
    fn mouse_cells_become_pixels() {
        let pointer = pointer_from_cell(1, 1);
        assert!((pointer.x - 0.5).abs() < f32::EPSILON);
        assert!((pointer.y - 1.0).abs() < f32::EPSILON);

        let pointer = pointer_from_cell(10, 5);
        assert!((pointer.x - 9.5).abs() < f32::EPSILON);
        assert!((pointer.y - 9.0).abs() < f32::EPSILON);
    }

    #[test]
    fn rows_hold_two_pixels() {
        assert_eq!(canvas_height(24), 48);
        assert_eq!(canvas_height(0), 1);
    }
}
