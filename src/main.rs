use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use hass_ws::config::DEFAULT_CONNECT_TIMEOUT_SECS;
use hass_ws::{CommandRequest, Error, SessionConfig, Timeouts};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid JSON data argument: {0}")]
    InvalidData(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] Error),
}

#[derive(Parser, Debug)]
#[command(
    name = "hass-ws",
    about = "Send one command to a Home Assistant WebSocket API and print the result"
)]
struct Cli {
    /// Hub base URL; `https` selects TLS.
    #[arg(long, env = "HASS_URL", default_value = "http://homeassistant.local:8123")]
    url: String,

    /// Long-lived access token.
    #[arg(long, env = "HASS_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout: u64,

    /// Give up on a silent hub after this many seconds. Blocks forever when unset.
    #[arg(long)]
    read_timeout: Option<u64>,

    /// Command type, e.g. `get_states` or `call_service`.
    command_type: String,

    /// Extra command fields as a JSON object.
    data: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli).and_then(|result| print_json(&result)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", render_error(&error));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Value, CliError> {
    let extra = cli
        .data
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()?;
    let request = CommandRequest::new(cli.command_type.as_str(), extra)?;
    let timeouts = Timeouts {
        connect: Duration::from_secs(cli.connect_timeout),
        read: cli.read_timeout.map(Duration::from_secs),
    };
    let config = SessionConfig::new(&cli.url, cli.token.as_str())?.with_timeouts(timeouts);

    tracing::debug!(?config, command = %request.command_type, "starting session");
    Ok(hass_ws::run(&config, &request)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

/// Line written to stderr for a failed run.
fn render_error(error: &CliError) -> String {
    match error {
        CliError::Session(Error::AuthInvalid { message }) => {
            serde_json::json!({ "error": "auth_invalid", "message": message }).to_string()
        }
        CliError::Session(Error::CommandFailed { error }) => error.to_string(),
        CliError::Session(other) => format!("error[{}]: {other}", other.code()),
        CliError::InvalidData(_) => format!("error[E_INVALID_DATA]: {error}"),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
