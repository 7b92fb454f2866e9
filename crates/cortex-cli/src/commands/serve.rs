//! `cortex serve`, plus the auto-launch helper every other subcommand calls
//! when nothing answers on the configured host/port.

use std::time::Duration;

use clap::Args;
use tokio::process::Command;
use tokio::time::sleep;

use crate::client::CortexClient;
use crate::error::{CliError, CliResult};

#[derive(Args)]
pub struct ServeArgs {
    /// Data directory root passed through to `cortex-server`.
    #[arg(long)]
    data_folder: Option<std::path::PathBuf>,
}

/// Runs `cortex-server` in the foreground, forwarding the resolved
/// host/port and waiting for it to exit.
pub async fn run(args: ServeArgs, host: &str, port: u16) -> CliResult<()> {
    let mut command = Command::new("cortex-server");
    command.arg("--host").arg(host).arg("--port").arg(port.to_string());
    if let Some(data_folder) = &args.data_folder {
        command.arg("--data-folder").arg(data_folder);
    }

    let status = command
        .status()
        .await
        .map_err(|e| CliError::runtime(format!("failed to launch cortex-server: {e}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(CliError::runtime(format!("cortex-server exited with {status}")))
    }
}

/// Spawns `cortex-server` detached and polls `/healthz` until it answers
/// or a fixed number of attempts are exhausted.
pub async fn ensure_running(host: &str, port: u16, client: &CortexClient) -> CliResult<()> {
    tracing::info!(host, port, "no cortex-server reachable, launching one");
    Command::new("cortex-server")
        .arg("--host")
        .arg(host)
        .arg("--port")
        .arg(port.to_string())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| CliError::runtime(format!("no server reachable at {}, and failed to launch one: {e}", client.base_url())))?;

    for _ in 0..40 {
        if client.is_reachable().await {
            return Ok(());
        }
        sleep(Duration::from_millis(250)).await;
    }

    Err(CliError::runtime(format!("cortex-server did not become reachable at {}", client.base_url())))
}
