//! Handle all the raw input directly from the end user.

use std::io::Read as _;
use std::sync::Arc;

use color_eyre::eyre::Result;

use crate::config::input::KeybindingAction;
use crate::run::Protocol;

/// Bytes from STDIN
pub type BytesFromSTDIN = [u8; 128];

/// Input from STDIN that has been parsed into known mouse/keyboard/etc events.
#[derive(Debug, Clone)]
pub(crate) struct ParsedInput {
    /// The raw bytes that made up the parsed event
    pub bytes: BytesFromSTDIN,
    /// The parsed event
    pub event: termwiz::input::InputEvent,
}

/// Handle input from the user
pub(crate) struct RawInput {
    /// Shared app state, for the keybindings and the protocol channel.
    state: Arc<crate::shared_state::SharedState>,
}

impl RawInput {
    /// Start a thread to listen and parse the end user's STDIN and forward it to the rest of the
    /// application.
    pub fn start(
        state: Arc<crate::shared_state::SharedState>,
    ) -> std::thread::JoinHandle<std::result::Result<(), color_eyre::eyre::Error>> {
        // The Tokio docs actually suggest using `std::thread` to listen on STDIN for interactive
        // applications.
        std::thread::spawn(move || -> Result<()> {
            let protocol_for_shutdown = state.protocol_tx.clone();
            let input = Self { state };
            let result = input.consume_stdin();
            if let Err(error) = result {
                crate::run::broadcast_protocol_end(&protocol_for_shutdown);
                return Err(error);
            }
            Ok(())
        })
    }

    /// Listen to the end user's STDIN and try to parse all the bytes into events.
    fn consume_stdin(&self) -> Result<()> {
        tracing::debug!("Starting to listen on STDIN");

        let stdin = std::io::stdin();
        let mut reader = std::io::BufReader::new(stdin);
        let mut parser = termwiz::input::InputParser::new();

        loop {
            let mut buffer: BytesFromSTDIN = [0; 128];
            match reader.read(&mut buffer[..]) {
                Ok(0) => {
                    tracing::debug!("STDIN closed");
                    crate::run::broadcast_protocol_end(&self.state.protocol_tx);
                    return Ok(());
                }
                Ok(n) => {
                    if let Some(bytes) = buffer.get(0..n) {
                        tracing::trace!("Received STDIN input: {bytes:x?}");

                        parser.parse(
                            bytes,
                            |event| {
                                self.parsed_bytes_callback(event, buffer);
                            },
                            // More bytes could still be on their way, so don't yet treat a lone
                            // ESC as the Escape key.
                            n == buffer.len(),
                        );
                    } else {
                        tracing::warn!("Couldn't get bytes from STDIN input buffer");
                    }
                }
                Err(err) => {
                    return Err(color_eyre::eyre::Error::new(err));
                }
            }
        }
    }

    /// The callback for when the input parser detects known keyboard/mouse events.
    fn parsed_bytes_callback(&self, event: termwiz::input::InputEvent, bytes: BytesFromSTDIN) {
        tracing::trace!("Parsed input event: {event:?}");

        #[expect(
            clippy::wildcard_enum_match_arm,
            reason = "Pastes, wakes, etc have no meaning for the particle field"
        )]
        let message = match &event {
            termwiz::input::InputEvent::Key(key_event) => {
                let key_event = normalise_key_event(key_event.clone());
                let keybindings = self.state.keybindings.blocking_read();
                let maybe_action = crate::config::input::find_action(&keybindings, &key_event);
                drop(keybindings);

                match maybe_action {
                    Some(action) => Protocol::KeybindEvent(action),
                    None if is_interrupt(&key_event) => {
                        Protocol::KeybindEvent(KeybindingAction::Quit)
                    }
                    None => return,
                }
            }
            termwiz::input::InputEvent::Mouse(_) => Protocol::Input(ParsedInput {
                bytes,
                event: event.clone(),
            }),
            _ => return,
        };

        let result = self.state.protocol_tx.send(message);
        if let Err(error) = result {
            tracing::error!("Error sending input event from thread to task: {error:?}");
        }
    }
}

/// Terminals report shifted letters inconsistently: sometimes just the uppercase letter, sometimes
/// also with the `SHIFT` modifier. Keybindings are written as just the uppercase letter.
fn normalise_key_event(mut key_event: termwiz::input::KeyEvent) -> termwiz::input::KeyEvent {
    if let termwiz::input::KeyCode::Char(character) = key_event.key {
        if key_event.modifiers.contains(termwiz::input::Modifiers::SHIFT)
            && character.is_alphabetic()
        {
            key_event.modifiers.remove(termwiz::input::Modifiers::SHIFT);
            if let Some(uppercase) = character.to_uppercase().next() {
                key_event.key = termwiz::input::KeyCode::Char(uppercase);
            }
        }
    }
    key_event
}

/// In raw mode CTRL+C doesn't send `SIGINT`, so we have to handle it ourselves.
fn is_interrupt(key_event: &termwiz::input::KeyEvent) -> bool {
    key_event.modifiers == termwiz::input::Modifiers::CTRL
        && key_event.key == termwiz::input::KeyCode::Char('c')
}

#[cfg(test)]
mod test {
    use termwiz::input::{KeyCode, KeyEvent, Modifiers};

    use super::*;

    #[test]
    fn shifted_letters_become_uppercase() {
        let shifted = KeyEvent {
            key: KeyCode::Char('g'),
            modifiers: Modifiers::SHIFT,
        };
        assert_eq!(
            normalise_key_event(shifted),
            KeyEvent {
                key: KeyCode::Char('G'),
                modifiers: Modifiers::NONE,
            }
        );
    }

    #[test]
    fn shifted_symbols_are_left_alone() {
        let shifted = KeyEvent {
            key: KeyCode::Char('+'),
            modifiers: Modifiers::SHIFT,
        };
        assert_eq!(normalise_key_event(shifted.clone()), shifted);
    }

    #[test]
    fn ctrl_c_interrupts() {
        assert!(is_interrupt(&KeyEvent {
            key: KeyCode::Char('c'),
            modifiers: Modifiers::CTRL,
        }));
        assert!(!is_interrupt(&KeyEvent {
            key: KeyCode::Char('c'),
            modifiers: Modifiers::NONE,
        }));
    }
}
