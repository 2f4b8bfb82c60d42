//! Wires the terminal, STDIN, config watcher and particle field together, and tears them down in
//! order when the field exits.

use std::sync::Arc;

use clap::Parser as _;
use color_eyre::eyre::{ContextCompat as _, Result};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

use crate::cli_args::CliArgs;
use crate::config::main::{Config, LogLevel};
use crate::raw_input::RawInput;
use crate::renderer::Renderer;
use crate::shared_state::SharedState;

/// Env var for fine grained log filters, in `RUST_LOG` syntax.
const LOG_FILTER_ENV: &str = "CYBERMATRIX_LOG";

/// The crates whose logs are wanted when filters come from the config's log level.
const LOGGED_CRATES: [&str; 3] = ["particle_core", "cybermatrix", "tests"];

/// Messages broadcast between the renderer, STDIN reader, config watcher and particle field.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub(crate) enum Protocol {
    /// Everything should shut down.
    End,
    /// The terminal changed size, in cells.
    Resize {
        /// Columns
        width: u16,
        /// Rows
        height: u16,
    },
    /// A key press or mouse event.
    Input(crate::raw_input::ParsedInput),
    /// The config file was edited.
    Config(Config),
    /// A key press matched one of the configured keybindings.
    KeybindEvent(crate::config::input::KeybindingAction),
}

/// Start every task, run the particle field until it exits, then wait for the rest to finish.
pub(crate) async fn run(state_arc: &Arc<SharedState>) -> Result<()> {
    let protocol_tx = state_arc.protocol_tx.clone();
    let cli_args = setup(state_arc).await?;

    let (surfaces_tx, surfaces_rx) = tokio::sync::mpsc::channel(1);
    let renderer = Renderer::start(Arc::clone(state_arc), surfaces_rx, protocol_tx.clone());
    let config_handle = Config::watch(Arc::clone(state_arc));
    let input_thread_handle = RawInput::start(Arc::clone(state_arc));

    log_panics();
    let field_result =
        crate::field::Field::start(Arc::clone(state_arc), surfaces_tx, &cli_args).await;
    tracing::debug!("Particle field exited");
    broadcast_protocol_end(&protocol_tx);

    // A blocked STDIN read never sees `End`, so the thread is only joined when it's already
    // stopped with its own error.
    if input_thread_handle.is_finished() {
        input_thread_handle
            .join()
            .map_err(|err| color_eyre::eyre::eyre!("STDIN handle: {err:?}"))??;
    }
    renderer.await??;
    config_handle.await??;
    field_result?;

    Ok(())
}

/// Send panics to the log file. Printing them would only draw over the field, and they'd vanish
/// along with the alternate screen.
fn log_panics() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map_or_else(
            || "unknown location".to_owned(),
            |location| format!("{}:{}", location.file(), location.line()),
        );
        tracing::error!("Panic at {location}: {}", panic_message(info.payload()));
    }));
}

/// The text of a panic, if it has any.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("<non-string panic payload>")
}

/// Tell every task to stop. A failed send is only logged, since returning it would skip the
/// shutdown that lets `main()` report it.
pub(crate) fn broadcast_protocol_end(protocol_tx: &tokio::sync::broadcast::Sender<Protocol>) {
    tracing::debug!("Broadcasting `End`");
    if let Err(error) = protocol_tx.send(Protocol::End) {
        tracing::error!("{error:?}");
    }
}

/// Parse the CLI, load the config, start logging and record the terminal size.
async fn setup(state: &Arc<SharedState>) -> Result<CliArgs> {
    let cli_args = CliArgs::parse();
    state
        .main_config_file
        .write()
        .await
        .clone_from(&cli_args.main_config);

    if let Err(error) = Config::setup_directory(cli_args.config_dir.clone(), state).await {
        color_eyre::eyre::bail!("Error setting up config directory: {error:?}");
    }
    if let Err(error) = Config::load_config_into_shared_state(state).await {
        let path = Config::main_config_path(state).await;
        color_eyre::eyre::bail!("Bad config file: {error:?}\n\nConfig path: {}", path.display());
    }

    setup_logging(&cli_args, state).await?;
    tracing::info!("Starting Cybermatrix");
    tracing::debug!("Loaded config: {:?}", state.config.read().await);

    let tty_size = Renderer::get_users_tty_size()?;
    state
        .set_tty_size(tty_size.cols.try_into()?, tty_size.rows.try_into()?)
        .await;

    Ok(cli_args)
}

/// Log to a file, never the terminal, since the field owns the whole screen. Nothing is set up
/// when the level is `off` and `CYBERMATRIX_LOG` isn't set.
async fn setup_logging(cli_args: &CliArgs, state: &Arc<SharedState>) -> Result<()> {
    let user_filters = std::env::var(LOG_FILTER_ENV).ok();
    let (config_path, config_level) = {
        let config = state.config.read().await;
        (config.log_path.clone(), config.log_level.clone())
    };
    let path = cli_args.log_path.clone().unwrap_or(config_path);
    let level = cli_args.log_level.clone().unwrap_or(config_level);

    let Some(filters) = log_filters(&level, user_filters.as_deref())? else {
        return Ok(());
    };

    let directory = path.parent().context("Couldn't get log path's parent")?;
    std::fs::create_dir_all(directory)?;
    let file = std::fs::File::create(&path)?;
    let logfile_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_filter(filters);
    let registry = tracing_subscriber::registry().with(logfile_layer);

    // `tokio=trace,runtime=trace` in `CYBERMATRIX_LOG` makes the console more useful.
    if std::env::var_os("ENABLE_TOKIO_CONSOLE") == Some("1".into()) {
        registry.with(console_subscriber::spawn()).init();
    } else {
        registry.init();
    }

    // For the exit message.
    state.config.write().await.log_path = path;
    *state.is_logging.write().await = true;

    Ok(())
}

/// Build the log filters. User supplied filters win over the config's level, which only applies
/// to our own crates.
fn log_filters(
    level: &LogLevel,
    user_filters: Option<&str>,
) -> Result<Option<tracing_subscriber::EnvFilter>> {
    if let Some(filters) = user_filters {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive("error".parse()?)
            .parse_lossy(filters);
        return Ok(Some(filter));
    }

    if matches!(level, LogLevel::Off) {
        return Ok(None);
    }

    let level_name = format!("{level:?}").to_lowercase();
    let mut filter = tracing_subscriber::EnvFilter::new("off");
    for name in LOGGED_CRATES {
        filter = filter.add_directive(format!("{name}={level_name}").parse()?);
    }
    Ok(Some(filter))
}
