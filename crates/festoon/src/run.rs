//! Main entrypoint for running Festoon.

use std::sync::Arc;

use clap::Parser as _;
use color_eyre::eyre::{ContextCompat as _, Result};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

use crate::cli_args::CliArgs;
use crate::input::Input;
use crate::renderer::Renderer;
use crate::shared_state::SharedState;

/// A frame of one effect's canvas, on its way to the renderer.
#[non_exhaustive]
pub enum FrameUpdate {
    /// A complete canvas for one compositing layer.
    Layer(crate::canvas::Canvas),
}

/// Commands to control the various tasks/threads.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum Protocol {
    /// A signal to indicate that a system has successfully started.
    Initialised(String),
    /// The entire application is exiting.
    End,
    /// User's TTY is resized.
    Resize {
        /// Width of new terminal.
        width: u16,
        /// Height of new terminal.
        height: u16,
    },
    /// Festoon's configuration.
    Config(crate::config::Config),
    /// A semantic user action parsed from STDIN.
    Action(crate::input::Action),
    /// The card's message was just revealed (`true`) or hidden again (`false`).
    Reveal(bool),
    /// A photo probe resolved successfully.
    PhotoDiscovered(std::path::PathBuf),
}

/// Main entrypoint.
pub async fn run(state_arc: &Arc<SharedState>) -> Result<()> {
    let protocol_tx = state_arc.protocol_tx.clone();
    setup(state_arc).await?;

    let (renderer, frames_tx) = Renderer::start(Arc::clone(state_arc), protocol_tx.clone());
    let input_thread_handle = Input::start(protocol_tx.clone());
    let effects_handle = crate::loader::start_effects(Arc::clone(state_arc), frames_tx);

    wait_for_end(protocol_tx.subscribe()).await;

    effects_handle.await??;
    renderer.await??;
    if input_thread_handle.is_finished() {
        // The STDIN loop can't exit of its own accord, so only join it if it finished because of
        // its own error.
        input_thread_handle
            .join()
            .map_err(|err| color_eyre::eyre::eyre!("STDIN handle: {err:?}"))??;
    }

    tracing::trace!("Leaving Festoon's main `run()` function");
    Ok(())
}

/// Block until something broadcasts the protocol `End` message.
pub async fn wait_for_end(mut protocol: tokio::sync::broadcast::Receiver<Protocol>) {
    loop {
        match protocol.recv().await {
            Ok(Protocol::End) | Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            Ok(_) | Err(_) => (),
        }
    }
}

/// Signal all task/thread loops to exit.
///
/// We keep it in its own function because we need to handle the error separately. If the error
/// were to be bubbled with `?` as usual, there's a chance it would never be logged, because the
/// protocol end signal is itself what allows the central error handler to even be reached.
pub fn broadcast_protocol_end(protocol_tx: &tokio::sync::broadcast::Sender<Protocol>) {
    tracing::debug!("Broadcasting the protocol `End` message to all listeners");
    let result = protocol_tx.send(Protocol::End);
    if let Err(error) = result {
        tracing::error!("{error:?}");
    }
}

/// Prepare the application to start.
async fn setup(state: &Arc<SharedState>) -> Result<()> {
    let cli_args = CliArgs::parse();

    let directory_result =
        crate::config::Config::setup_directory(cli_args.config_dir.clone(), state).await;
    if let Err(directory_error) = directory_result {
        color_eyre::eyre::bail!("Error setting up config directory: {directory_error:?}");
    }

    let config_result = crate::config::Config::load_config_into_shared_state(state).await;
    if let Err(config_error) = config_result {
        let path = crate::config::Config::main_config_path(state).await;
        color_eyre::eyre::bail!(
            "Bad config file: {config_error:?}\n\nConfig path: {}",
            path.display()
        );
    }

    apply_cli_overrides(&cli_args, state).await;
    setup_logging(cli_args, state).await?;

    tracing::info!("Starting Festoon");
    tracing::debug!("Loaded config: {:?}", state.config.read().await);

    Ok(())
}

/// CLI arguments beat the config file.
async fn apply_cli_overrides(cli_args: &CliArgs, state: &Arc<SharedState>) {
    let mut config = state.config.write().await;
    if let Some(assets_dir) = cli_args.assets_dir.clone() {
        config.assets_dir = assets_dir;
    }
    if cli_args.ordered_gallery {
        config.gallery.ordered = true;
    }
}

/// Setup logging.
async fn setup_logging(cli_args: CliArgs, state: &Arc<SharedState>) -> Result<()> {
    let are_log_filters_manually_set = std::env::var("FESTOON_LOG").is_ok();
    let mut path = state.config.read().await.log_path.clone();

    if let Some(cli_override_path) = cli_args.log_path {
        path = cli_override_path;
    }

    let mut level = state.config.read().await.log_level.clone();
    if let Some(cli_override_level) = cli_args.log_level {
        level = cli_override_level;
    }
    let level_as_string = format!("{level:?}").to_lowercase();

    let is_loggable =
        !matches!(level, crate::config::LogLevel::Off) || are_log_filters_manually_set;

    if !is_loggable {
        return Ok(());
    }

    let directory = path.parent().context("Couldn't get log path's parent")?;
    std::fs::create_dir_all(directory)?;
    let file = std::fs::File::create(path.clone())?;
    state.config.write().await.log_path = path;

    let filters = if are_log_filters_manually_set {
        if let Ok(user_filters) = std::env::var("FESTOON_LOG") {
            std::env::set_var("RUST_LOG", user_filters);
        }

        tracing_subscriber::EnvFilter::builder()
            .with_default_directive("error".parse()?)
            .from_env_lossy()
    } else {
        tracing_subscriber::EnvFilter::builder()
            .with_default_directive("off".parse()?)
            .from_env_lossy()
            .add_directive(format!("festoon={level_as_string}").parse()?)
            .add_directive(format!("tests={level_as_string}").parse()?)
    };

    let logfile_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_filter(filters);

    tracing_subscriber::registry().with(logfile_layer).init();

    let mut is_logging = state.is_logging.write().await;
    *is_logging = true;
    drop(is_logging);

    Ok(())
}
