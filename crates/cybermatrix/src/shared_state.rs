//! Here we store all the shared data that the app's tasks and threads might use.
//! Access is mediated with locks to support asynchronicity

use std::sync::Arc;

use tokio::sync::RwLock;

/// The size of the user's terminal
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "It's very unlikely that this is going to have any more fields added to it"
)]
pub struct TTYSize {
    /// Width of the TTY
    pub width: u16,
    /// Height of the TTY
    pub height: u16,
}

/// All the shared data the app uses
#[non_exhaustive]
pub(crate) struct SharedState {
    /// The channel on which all protocol messages are sent.
    pub protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    /// Location of the config directory.
    pub config_path: RwLock<std::path::PathBuf>,
    /// Name of the main config file.
    pub main_config_file: RwLock<std::path::PathBuf>,
    /// User config
    pub config: RwLock<crate::config::main::Config>,
    /// All the user-configured keybindings.
    pub keybindings: RwLock<crate::config::input::KeybindingsAsEvents>,
    /// Just the size of the user's terminal.
    pub tty_size: RwLock<TTYSize>,
    /// Is the application logging?
    pub is_logging: RwLock<bool>,
    /// A short message for the user, shown in the status line.
    pub status: RwLock<Option<String>>,
}

impl SharedState {
    /// Initialise the shared state
    pub fn init() -> Arc<Self> {
        let (protocol_tx, _) = tokio::sync::broadcast::channel(1024);
        let state = Self {
            protocol_tx,
            config_path: RwLock::default(),
            main_config_file: RwLock::new(crate::cli_args::DEFAULT_CONFIG_FILE_NAME.into()),
            config: RwLock::default(),
            keybindings: RwLock::default(),
            tty_size: RwLock::default(),
            is_logging: RwLock::default(),
            status: RwLock::default(),
        };
        Arc::new(state)
    }

    /// Get a read lock and return the current TTY size
    pub async fn get_tty_size(&self) -> TTYSize {
        let tty_size = self.tty_size.read().await;
        *tty_size
    }

    /// Get a write lock and set the a new TTY size
    pub async fn set_tty_size(&self, width: u16, height: u16) {
        let mut tty_size = self.tty_size.write().await;
        *tty_size = TTYSize { width, height };
    }

    /// Get a read lock and return the current status message.
    pub async fn get_status(&self) -> Option<String> {
        self.status.read().await.clone()
    }

    /// Get a write lock and replace the status message.
    pub async fn set_status(&self, message: Option<String>) {
        if let Some(text) = &message {
            tracing::debug!("Status: {text}");
        }
        *self.status.write().await = message;
    }
}
