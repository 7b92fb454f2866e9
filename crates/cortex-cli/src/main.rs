//! Cortex CLI: a thin HTTP client for `cortex-server`, not a parser
//! framework of its own. Mirrors `dashflow-cli`'s `Cli`/`Commands` shape,
//! scaled down to the subcommands §6 names.

mod client;
mod commands;
mod error;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use client::CortexClient;
use commands::{engines, models, ps, serve};
use error::CliError;

#[derive(Parser)]
#[command(name = "cortex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cortex local inference control plane client", long_about = None)]
struct Cli {
    /// cortex-server host, overriding the default loopback address.
    #[arg(long, global = true, default_value_t = cortex_config::Config::defaults().host)]
    host: String,

    /// cortex-server port.
    #[arg(long, global = true, default_value_t = cortex_config::Config::defaults().port)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Engine family/variant operations: list, install, uninstall, use
    Engines(engines::EnginesArgs),

    /// Model operations: list, pull, run
    Models(models::ModelsArgs),

    /// List currently loaded engine families
    Ps(ps::PsArgs),

    /// Start (or confirm) the cortex-server process
    Serve(serve::ServeArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => serve::run(args, &cli.host, cli.port).await,
        Commands::Engines(args) => {
            with_server(&cli.host, cli.port, |client| engines::run(args, client)).await
        }
        Commands::Models(args) => {
            with_server(&cli.host, cli.port, |client| models::run(args, client)).await
        }
        Commands::Ps(args) => with_server(&cli.host, cli.port, |client| ps::run(args, client)).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

/// Every non-`serve` subcommand needs a reachable server; launch one if
/// nothing answers on `host:port`, then run `body` against it.
async fn with_server<F, Fut>(host: &str, port: u16, body: F) -> Result<(), CliError>
where
    F: FnOnce(&CortexClient) -> Fut,
    Fut: std::future::Future<Output = Result<(), CliError>>,
{
    let base_url = format!("http://{host}:{port}");
    let client = CortexClient::new(base_url);
    if !client.is_reachable().await {
        serve::ensure_running(host, port, &client).await?;
    }
    body(&client).await
}
