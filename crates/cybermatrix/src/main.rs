//! Cybermatrix: a particle field in the terminal that scatters away from the mouse.

pub mod cli_args;
/// Settings from the config file and keybindings.
pub mod config {
    pub mod input;
    pub mod main;
}
pub mod field;
pub mod raw_input;
pub mod renderer;
pub mod run;
pub mod shared_state;
pub mod surface;

use color_eyre::eyre::Result;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let state = shared_state::SharedState::init();
    let result = run::run(&state).await;

    let is_logging = *state.is_logging.read().await;
    let log_path = state.config.read().await.log_path.clone();
    report_exit(&result, is_logging.then_some(log_path.as_path()));
    Ok(())
}

/// Tell the user how the session ended, and where to find the logs if there are any.
#[expect(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "The terminal is ours again once the field has exited"
)]
fn report_exit(result: &Result<()>, log_path: Option<&std::path::Path>) {
    match (result, log_path) {
        (Ok(()), Some(path)) => println!("Logs saved to {}", path.display()),
        (Ok(()), None) => (),
        (Err(error), maybe_path) => {
            tracing::error!("{error:?}");
            eprintln!("Error: {error}");
            if let Some(path) = maybe_path {
                eprintln!("See {} for more details", path.display());
            }
        }
    }
}
