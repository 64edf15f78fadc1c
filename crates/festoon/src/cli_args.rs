//! All the CLI arguments for Festoon.

/// The name of the main config file in the config directory.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "festoon.toml";

/// An animated greeting card for your terminal
#[derive(clap::Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
#[non_exhaustive]
pub struct CliArgs {
    /// Use a custom config directory.
    #[arg(long)]
    pub config_dir: Option<std::path::PathBuf>,

    /// The directory containing the card's photos and sprites. Overrides the config file.
    #[arg(short, long)]
    pub assets_dir: Option<std::path::PathBuf>,

    /// Override the configured log file path.
    #[arg(long)]
    pub log_path: Option<std::path::PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    pub log_level: Option<crate::config::LogLevel>,

    /// Show photos in their numeric order instead of the order in which they were found.
    #[arg(long)]
    pub ordered_gallery: bool,
}
