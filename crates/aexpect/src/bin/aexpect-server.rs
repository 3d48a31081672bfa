//! aexpect-server: the spawner process.
//!
//! Reads the startup parameters from standard input, announces readiness on
//! standard output and services the child until it exits. Logs go to
//! standard error, filtered by `AEXPECT_LOG` (default `warn`).

use std::process::ExitCode;

use aexpect::config::SessionConfig;
use aexpect::server::{StartupParams, serve};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "AEXPECT_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // Standard output carries the readiness line, so logs stay on stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

async fn run() -> aexpect::Result<i32> {
    let config = SessionConfig::from_env();
    let params = StartupParams::read_from(BufReader::new(tokio::io::stdin()))
        .await
        .map_err(|e| aexpect::ExpectError::io_context("reading startup parameters", e))?;
    serve(params, tokio::io::stdout(), &config).await
}

fn main() -> ExitCode {
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Could not create runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(status) => {
            tracing::debug!(status, "Spawner exited");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Spawner failed");
            ExitCode::FAILURE
        }
    }
}
