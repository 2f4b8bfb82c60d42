//! Render particle field frames to the user's terminal

use std::io::Write as _;
use std::sync::Arc;

use color_eyre::eyre::Result;
use tokio::sync::mpsc;

use termwiz::escape::csi::{DecPrivateMode, DecPrivateModeCode, Mode, CSI};
use termwiz::surface::Change as TermwizChange;
use termwiz::terminal::buffered::BufferedTerminal;
use termwiz::terminal::{ScreenSize, Terminal as TermwizTerminal};

use crate::shared_state::SharedState;
use crate::surface::Surface;

/// The mouse modes we need. Any-event tracking is what reports the pointer moving even when no
/// button is pressed, and SGR encoding supports coordinates past column 223.
const MOUSE_MODES: [DecPrivateModeCode; 2] =
    [DecPrivateModeCode::AnyEventMouse, DecPrivateModeCode::SGRMouse];

/// `Render`
pub(crate) struct Renderer {
    /// Shared app state
    pub state: Arc<SharedState>,
    /// The terminal's width
    pub width: u16,
    /// The terminal's height
    pub height: u16,
}

impl Renderer {
    /// Create a renderer to render to a user's terminal
    pub fn new(state: Arc<SharedState>) -> Result<Self> {
        let size = Self::get_users_tty_size()?;
        Ok(Self {
            state,
            width: size.cols.try_into()?,
            height: size.rows.try_into()?,
        })
    }

    /// Instantiate and run
    pub fn start(
        state: Arc<SharedState>,
        surfaces_rx: mpsc::Receiver<Surface>,
        protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let protocol_rx = protocol_tx.subscribe();
        tokio::spawn(async move {
            match Self::new(Arc::clone(&state)) {
                Ok(mut renderer) => {
                    let result = renderer
                        .run(surfaces_rx, protocol_rx, protocol_tx.clone())
                        .await;

                    if let Err(error) = result {
                        crate::run::broadcast_protocol_end(&protocol_tx);
                        return Err(error);
                    };
                }
                Err(error) => {
                    crate::run::broadcast_protocol_end(&protocol_tx);
                    return Err(error);
                }
            };

            Ok(())
        })
    }

    /// We need this just because `BufferedTerminal::new()` doesn't accept `Box<dyn Terminal>`
    fn get_termwiz_terminal() -> Result<impl TermwizTerminal> {
        let capabilities = termwiz::caps::Capabilities::new_from_env()?;
        Ok(termwiz::terminal::new_terminal(capabilities)?)
    }

    /// Just for initialisation
    pub fn get_users_tty_size() -> Result<ScreenSize> {
        let mut terminal = Self::get_termwiz_terminal()?;
        Ok(terminal.get_screen_size()?)
    }

    /// Turn mouse reporting on or off.
    fn set_mouse_reporting(is_enabled: bool) -> Result<()> {
        let mut stdout = std::io::stdout();
        for code in MOUSE_MODES {
            let mode = if is_enabled {
                Mode::SetDecPrivateMode(DecPrivateMode::Code(code))
            } else {
                Mode::ResetDecPrivateMode(DecPrivateMode::Code(code))
            };
            write!(stdout, "{}", CSI::Mode(mode))?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Get the user's current terminal size and propogate it
    pub async fn handle_resize<T: TermwizTerminal + Send>(
        &mut self,
        terminal: &mut BufferedTerminal<T>,
        protocol_tx: &tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> Result<()> {
        let is_resized = terminal.check_for_resize()?;
        if !is_resized {
            return Ok(());
        }

        terminal.repaint()?;

        let (width, height) = terminal.dimensions();
        self.width = width.try_into()?;
        self.height = height.try_into()?;
        tracing::debug!("Terminal resized to {}x{}", self.width, self.height);
        self.state.set_tty_size(self.width, self.height).await;
        protocol_tx.send(crate::run::Protocol::Resize {
            width: self.width,
            height: self.height,
        })?;

        Ok(())
    }

    /// Listen for frames from the particle field.
    /// It lives in its own method so that we can catch any errors and ensure that the user's
    /// terminal is always returned to cooked mode.
    async fn run(
        &mut self,
        mut surfaces: mpsc::Receiver<Surface>,
        mut protocol_rx: tokio::sync::broadcast::Receiver<crate::run::Protocol>,
        protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> Result<()> {
        tracing::debug!("Putting user's terminal into raw mode");
        let mut users_terminal = Self::get_termwiz_terminal()?;
        users_terminal.set_raw_mode()?;
        users_terminal.enter_alternate_screen()?;
        Self::set_mouse_reporting(true)?;
        let mut terminal = BufferedTerminal::new(users_terminal)?;
        terminal.add_change(TermwizChange::CursorVisibility(
            termwiz::surface::CursorVisibility::Hidden,
        ));

        let result = self
            .render_loop(&mut terminal, &mut surfaces, &mut protocol_rx, &protocol_tx)
            .await;

        tracing::debug!("Setting user's terminal to cooked mode");
        Self::set_mouse_reporting(false)?;
        terminal.add_change(TermwizChange::CursorVisibility(
            termwiz::surface::CursorVisibility::Visible,
        ));
        terminal.flush()?;
        terminal.terminal().exit_alternate_screen()?;
        terminal.terminal().set_cooked_mode()?;

        result
    }

    /// Draw every frame that arrives until the app ends.
    async fn render_loop<T: TermwizTerminal + Send>(
        &mut self,
        terminal: &mut BufferedTerminal<T>,
        surfaces: &mut mpsc::Receiver<Surface>,
        protocol_rx: &mut tokio::sync::broadcast::Receiver<crate::run::Protocol>,
        protocol_tx: &tokio::sync::broadcast::Sender<crate::run::Protocol>,
    ) -> Result<()> {
        tracing::debug!("Starting render loop");
        #[expect(
            clippy::integer_division_remainder_used,
            reason = "`tokio::select!` generates this."
        )]
        loop {
            tokio::select! {
                Some(surface) = surfaces.recv() => {
                    self.handle_resize(terminal, protocol_tx).await?;
                    Self::render(&surface, terminal)?;
                }
                Ok(message) = protocol_rx.recv() => {
                    if matches!(message, crate::run::Protocol::End) {
                        break;
                    }
                }
                // Even without frames, for example if the particle field is empty, keep track
                // of resizes.
                () = tokio::time::sleep(std::time::Duration::from_millis(250)) => {
                    self.handle_resize(terminal, protocol_tx).await?;
                }
            }
        }
        tracing::debug!("Exited render loop");

        Ok(())
    }

    /// Do a single render to the user's actual terminal. It uses a diffing algorithm to make
    /// the minimum number of changes.
    fn render<T: TermwizTerminal>(
        surface: &Surface,
        terminal: &mut BufferedTerminal<T>,
    ) -> Result<()> {
        tracing::trace!("Rendering {}x{} frame", surface.width, surface.height);
        terminal.draw_from_screen(&surface.surface, 0, 0);
        terminal.flush()?;
        Ok(())
    }
}
