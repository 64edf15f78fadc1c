//! Here we store all the shared data that the app's systems might use.
//! Access is mediated with locks to support asynchronicity.

use std::sync::Arc;

use color_eyre::eyre::Result;
use tokio::sync::RwLock;

/// The size of the user's terminal.
#[derive(Default, Debug, Copy, Clone)]
#[expect(
    clippy::exhaustive_structs,
    reason = "It's very unlikely that this is going to have any more fields added to it"
)]
pub struct TTYSize {
    /// Width of the TTY in columns.
    pub width: u16,
    /// Height of the TTY in rows.
    pub height: u16,
}

/// All the shared data the app uses.
#[non_exhaustive]
pub struct SharedState {
    /// The channel on which all Festoon protocol messages are sent.
    pub protocol_tx: tokio::sync::broadcast::Sender<crate::run::Protocol>,
    /// Location of the config directory.
    pub config_path: RwLock<std::path::PathBuf>,
    /// User config.
    pub config: RwLock<crate::config::Config>,
    /// Just the size of the user's terminal. All the effects follow this.
    pub tty_size: RwLock<TTYSize>,
    /// Whether the card's message is currently revealed.
    pub is_revealed: RwLock<bool>,
    /// Is the application logging?
    pub is_logging: RwLock<bool>,
}

impl SharedState {
    /// Initialise the shared state.
    pub fn init(width: u16, height: u16) -> Arc<Self> {
        let (protocol_tx, _) = tokio::sync::broadcast::channel(1024);
        Arc::new(Self {
            protocol_tx,
            config_path: RwLock::default(),
            config: RwLock::default(),
            tty_size: RwLock::new(TTYSize { width, height }),
            is_revealed: RwLock::default(),
            is_logging: RwLock::default(),
        })
    }

    /// Convenience method to initialise the shared state with the user's terminal's size.
    pub fn init_with_users_tty_size() -> Result<Arc<Self>> {
        let tty_size = crate::renderer::Renderer::get_users_tty_size()?;
        Ok(Self::init(
            tty_size.cols.try_into()?,
            tty_size.rows.try_into()?,
        ))
    }

    /// Get a read lock and return the current TTY size.
    pub async fn get_tty_size(&self) -> TTYSize {
        let tty_size = self.tty_size.read().await;
        *tty_size
    }

    /// Get a write lock and set a new TTY size.
    pub async fn set_tty_size(&self, width: u16, height: u16) {
        let mut tty_size = self.tty_size.write().await;
        *tty_size = TTYSize { width, height };
    }

    /// Get a read lock and return whether the card is currently revealed.
    pub async fn get_is_revealed(&self) -> bool {
        let is_revealed = self.is_revealed.read().await;
        *is_revealed
    }

    /// Get a write lock and set whether the card is revealed.
    pub async fn set_is_revealed(&self, value: bool) {
        let mut is_revealed = self.is_revealed.write().await;
        *is_revealed = value;
    }
}
