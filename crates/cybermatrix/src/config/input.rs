//! User-defined keybindings for the control keys.

/// The user config for defining keybindings.
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Eq, Debug, Clone)]
pub(crate) struct KeybindingConfigRaw {
    /// The modifier keys, like `CTRL`, `SHIFT`, etc.
    pub mods: Option<String>,
    /// The actual key, like a 'x' or `PageUp`.
    pub key: String,
}

/// All the possible actions a user can trigger on the particle field.
#[derive(serde::Serialize, serde::Deserialize, PartialEq, Eq, Debug, Clone, Hash)]
#[serde(rename_all = "snake_case")]
pub(crate) enum KeybindingAction {
    /// Switch between drawing particles as squares and as glyphs.
    ToggleMatrixMode,
    /// Move to the next colour in the configured list of colours.
    CycleColour,
    /// Grow the pointer's area of repulsion.
    IncreaseRadius,
    /// Shrink the pointer's area of repulsion.
    DecreaseRadius,
    /// Bigger particles.
    IncreaseSize,
    /// Smaller particles.
    DecreaseSize,
    /// Particles return to their origin faster.
    IncreaseEase,
    /// Particles return to their origin slower.
    DecreaseEase,
    /// Fewer particles.
    IncreaseGap,
    /// More particles.
    DecreaseGap,
    /// Forget the image and go back to the default settings.
    Reset,
    /// Exit.
    Quit,
}

/// All the active user-configured keybindings.
pub(crate) type KeybindingsRaw = std::collections::HashMap<KeybindingAction, KeybindingConfigRaw>;

/// The user keybindings converted to native `termwiz::input::KeyEvent`s.
pub(crate) type KeybindingsAsEvents =
    std::collections::HashMap<KeybindingAction, termwiz::input::KeyEvent>;

/// Find the action, if any, bound to a key event.
pub(crate) fn find_action(
    keybindings: &KeybindingsAsEvents,
    event: &termwiz::input::KeyEvent,
) -> Option<KeybindingAction> {
    keybindings
        .iter()
        .find(|(_, key_event)| *key_event == event)
        .map(|(action, _)| action.clone())
}

impl TryFrom<KeybindingConfigRaw> for termwiz::input::KeyEvent {
    type Error = std::io::Error;

    /// `termwiz::input::KeyEvent` doesn't have an `impl From<String>`, but it does derive
    /// `serde::Deserialize`, so the `toml` crate works as a stepping stone between our config
    /// syntax and Termwiz's. That avoids having to map all the keycodes and modifiers by hand.
    fn try_from(binding: KeybindingConfigRaw) -> std::result::Result<Self, Self::Error> {
        let key = if binding.key.chars().count() == 1 {
            format!("{{ Char = \"{}\" }}", binding.key)
        } else {
            format!("\"{}\"", binding.key)
        };

        let config = format!(
            "
                modifiers = {{ bits = 0 }}
                key = {key}
            ",
        );

        let mut key_event = toml::from_str::<Self>(&config).map_err(|error| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid key ({binding:?}): {}", error.message()),
            )
        })?;

        if let Some(modifiers) = binding.mods {
            key_event.modifiers = modifiers.try_into().map_err(|error| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Couldn't parse keybinding modifier: {error:?}"),
                )
            })?;
        }

        Ok(key_event)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests aren't so strict")]
mod test {
    use super::*;

    fn parse(config: &str) -> termwiz::input::KeyEvent {
        let parsed: KeybindingConfigRaw = toml::from_str(config).unwrap();
        parsed.try_into().unwrap()
    }

    #[test]
    fn plain_character() {
        let expected = termwiz::input::KeyEvent {
            modifiers: termwiz::input::Modifiers::NONE,
            key: termwiz::input::KeyCode::Char('m'),
        };
        assert_eq!(parse(r#"key = "m""#), expected);
    }

    #[test]
    fn symbols_are_characters_too() {
        let expected = termwiz::input::KeyEvent {
            modifiers: termwiz::input::Modifiers::NONE,
            key: termwiz::input::KeyCode::Char(']'),
        };
        assert_eq!(parse(r#"key = "]""#), expected);
    }

    #[test]
    fn named_key_with_modifiers() {
        let config = r#"
            mods = "CTRL|SHIFT"
            key = "UpArrow"
        "#;
        let expected = termwiz::input::KeyEvent {
            modifiers: termwiz::input::Modifiers::CTRL | termwiz::input::Modifiers::SHIFT,
            key: termwiz::input::KeyCode::UpArrow,
        };
        assert_eq!(parse(config), expected);
    }

    #[test]
    fn unknown_keys_are_errors() {
        let raw = KeybindingConfigRaw {
            mods: None,
            key: "NotAKey".to_owned(),
        };
        let result: Result<termwiz::input::KeyEvent, _> = raw.try_into();
        assert!(result.is_err());
    }

    #[test]
    fn finds_bound_actions() {
        let mut keybindings = KeybindingsAsEvents::new();
        keybindings.insert(KeybindingAction::Reset, parse(r#"key = "r""#));
        keybindings.insert(KeybindingAction::Quit, parse(r#"key = "q""#));

        let event = termwiz::input::KeyEvent {
            modifiers: termwiz::input::Modifiers::NONE,
            key: termwiz::input::KeyCode::Char('q'),
        };
        assert_eq!(
            find_action(&keybindings, &event),
            Some(KeybindingAction::Quit)
        );

        let unbound = termwiz::input::KeyEvent {
            modifiers: termwiz::input::Modifiers::NONE,
            key: termwiz::input::KeyCode::Char('z'),
        };
        assert_eq!(find_action(&keybindings, &unbound), None);
    }
}
