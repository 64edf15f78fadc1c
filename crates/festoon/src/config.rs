//! All of the user config for Festoon.

use color_eyre::eyre::ContextCompat as _;
use color_eyre::eyre::Result;

/// A copy of the default config file. It gets copied to the user's config folder the first time
/// they start Festoon.
static DEFAULT_CONFIG: &str = include_str!("../default_config.toml");

/// The valid log levels. Based on our `tracing` crate.
#[derive(serde::Serialize, serde::Deserialize, clap::ValueEnum, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Error
    Error,
    /// Warnings
    Warn,
    /// Info
    Info,
    /// Debug
    Debug,
    /// Trace
    Trace,
    /// No logging
    Off,
}

/// The greeting on the front of the card.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Greeting {
    /// The card's title, shown before and after reveal.
    pub title: String,
    /// The hidden message, revealed on request.
    pub message: String,
}

impl Default for Greeting {
    fn default() -> Self {
        Self {
            title: "A little something for you".into(),
            message: "Happy birthday! Wishing you a year of good things.".into(),
        }
    }
}

/// Managing user config.
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// The maximum log level.
    pub log_level: LogLevel,
    /// The location of the log file.
    pub log_path: std::path::PathBuf,
    /// Target frame rate for all the animations.
    pub frame_rate: u32,
    /// The directory containing photos and sprite images. Relative paths are resolved against
    /// the current working directory.
    pub assets_dir: std::path::PathBuf,
    /// The greeting text.
    pub greeting: Greeting,
    /// The snowfall played at reveal.
    pub snow: crate::effects::snow::Config,
    /// The floating cake decorations.
    pub cakes: crate::effects::cakes::Config,
    /// The photo gallery.
    pub gallery: crate::gallery::view::Config,
}

impl Default for Config {
    fn default() -> Self {
        let log_directory = match dirs::state_dir() {
            Some(directory) => directory,
            None => std::path::PathBuf::new().join("./"),
        };
        let log_path = log_directory.join("festoon").join("festoon.log");

        Self {
            log_level: LogLevel::Off,
            log_path,
            frame_rate: 30,
            assets_dir: "assets".into(),
            greeting: Greeting::default(),
            snow: crate::effects::snow::Config::default(),
            cakes: crate::effects::cakes::Config::default(),
            gallery: crate::gallery::view::Config::default(),
        }
    }
}

impl Config {
    /// Canonical path to the config directory.
    pub async fn directory(
        state: &std::sync::Arc<crate::shared_state::SharedState>,
    ) -> std::path::PathBuf {
        state.config_path.read().await.clone()
    }

    /// Get the stable location of Festoon's config directory on the user's system.
    pub fn default_directory() -> Result<std::path::PathBuf> {
        Ok(dirs::config_dir()
            .context("Couldn't get standard config directory")?
            .join("festoon"))
    }

    /// Figure out where our config is being stored, and create the directory if needed.
    pub async fn setup_directory(
        maybe_custom_path: Option<std::path::PathBuf>,
        state: &std::sync::Arc<crate::shared_state::SharedState>,
    ) -> Result<()> {
        let path = match maybe_custom_path {
            None => Self::default_directory()?,
            Some(path_string) => std::path::PathBuf::new().join(path_string),
        };

        std::fs::create_dir_all(path.clone())?;
        *state.config_path.write().await = path;

        Ok(())
    }

    /// Canonical path to the main config file.
    pub async fn main_config_path(
        state: &std::sync::Arc<crate::shared_state::SharedState>,
    ) -> std::path::PathBuf {
        let directory = Self::directory(state).await;
        directory.join(crate::cli_args::DEFAULT_CONFIG_FILE_NAME)
    }

    /// Load the main config, writing out the shipped default config first if the user doesn't
    /// have one yet.
    pub async fn load(state: &std::sync::Arc<crate::shared_state::SharedState>) -> Result<Self> {
        let config_path = Self::main_config_path(state).await;
        if !config_path.exists() {
            std::fs::write(config_path.clone(), DEFAULT_CONFIG)?;
        }

        tracing::info!("Loading the main Festoon config from: {config_path:?}");
        let result = std::fs::read_to_string(config_path.clone());
        match result {
            Ok(data) => {
                tracing::trace!("Using config file:\n{data}");
                Ok(toml::from_str::<Self>(&data)?)
            }
            Err(err) => {
                tracing::error!("Loading config: {err:?}");
                color_eyre::eyre::bail!(
                    "Couldn't load config at {config_path:?}: {}",
                    err.to_string()
                );
            }
        }
    }

    /// Load the main config into the shared state.
    pub async fn load_config_into_shared_state(
        state: &std::sync::Arc<crate::shared_state::SharedState>,
    ) -> Result<Self> {
        let mut config_state = state.config.write().await;
        let new_config = Self::load(state).await?;
        *config_state = new_config.clone();
        drop(config_state);

        Ok(new_config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shipped_default_config_parses() {
        let config = toml::from_str::<Config>(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.gallery.autoplay_interval_ms, 2000);
        assert!(!config.gallery.ordered);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = toml::from_str::<Config>("").unwrap();
        assert!(config.snow.enabled);
        assert!(config.cakes.enabled);
        assert_eq!(config.gallery.max_photos, 20);
    }
}
