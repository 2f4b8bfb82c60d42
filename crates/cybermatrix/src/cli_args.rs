//! All the CLI arguments for Cybermatrix

/// The default name of the main config file.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "cybermatrix.toml";

/// An interactive particle field for your terminal. Move the mouse through it to scatter the
/// particles.
#[derive(clap::Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
#[non_exhaustive]
pub(crate) struct CliArgs {
    /// An image (PNG or JPEG) to build the particles from. Overrides the config file.
    #[arg(short, long)]
    pub image: Option<std::path::PathBuf>,

    /// Start in matrix mode, drawing particles as hex digits.
    #[arg(short, long)]
    pub matrix: bool,

    /// Use a custom config directory.
    #[arg(long)]
    pub config_dir: Option<std::path::PathBuf>,

    /// The name of the main config file inside the config directory.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE_NAME)]
    pub main_config: std::path::PathBuf,

    /// Override the log level from the config file.
    #[arg(long, value_enum)]
    pub log_level: Option<crate::config::main::LogLevel>,

    /// Override the log file path from the config file.
    #[arg(long)]
    pub log_path: Option<std::path::PathBuf>,
}
