//! `cortex engines list/install/uninstall/use`.

use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use crate::client::CortexClient;
use crate::error::CliResult;

#[derive(Args)]
pub struct EnginesArgs {
    #[command(subcommand)]
    command: EnginesCommand,
}

#[derive(Subcommand)]
enum EnginesCommand {
    /// List installed engine entries
    List,

    /// Install a variant of an engine family
    Install(InstallArgs),

    /// Uninstall every installed variant of an engine family
    Uninstall(UninstallArgs),

    /// Set the default variant used when loading a family
    Use(UseArgs),
}

#[derive(Args)]
struct InstallArgs {
    /// Engine family, e.g. `llama-cpp`
    family: String,

    /// Release version; defaults to the latest upstream release
    #[arg(long)]
    version: Option<String>,

    /// Variant tag; defaults to the best match for this host
    #[arg(long)]
    variant: Option<String>,
}

#[derive(Args)]
struct UninstallArgs {
    family: String,
}

#[derive(Args)]
struct UseArgs {
    family: String,

    #[arg(long)]
    version: String,

    #[arg(long)]
    variant: String,
}

#[derive(Debug, Deserialize)]
struct EngineEntry {
    name: String,
    variant: String,
    version: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct InstallRequest {
    version: Option<String>,
    variant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstalledVariant {
    tag: String,
}

#[derive(Debug, Serialize)]
struct SetDefaultRequest {
    version: String,
    variant: String,
}

pub async fn run(args: EnginesArgs, client: &CortexClient) -> CliResult<()> {
    match args.command {
        EnginesCommand::List => list(client).await,
        EnginesCommand::Install(args) => install(args, client).await,
        EnginesCommand::Uninstall(args) => uninstall(args, client).await,
        EnginesCommand::Use(args) => use_default(args, client).await,
    }
}

async fn list(client: &CortexClient) -> CliResult<()> {
    let entries: Vec<EngineEntry> = client.get("/v1/engines").await?;
    if entries.is_empty() {
        println!("no engines installed");
        return Ok(());
    }
    println!("{:<20} {:<24} {:<12} {:<8}", "FAMILY", "VARIANT", "VERSION", "STATUS");
    for entry in entries {
        println!("{:<20} {:<24} {:<12} {:<8}", entry.name, entry.variant, entry.version, entry.status);
    }
    Ok(())
}

async fn install(args: InstallArgs, client: &CortexClient) -> CliResult<()> {
    let request = InstallRequest { version: args.version, variant: args.variant };
    let installed: InstalledVariant = client.post(&format!("/v1/engines/{}/install", args.family), &request).await?;
    println!("installed {} variant {}", args.family, installed.tag);
    Ok(())
}

async fn uninstall(args: UninstallArgs, client: &CortexClient) -> CliResult<()> {
    let _: serde_json::Value = client.delete(&format!("/v1/engines/{}", args.family)).await?;
    println!("uninstalled {}", args.family);
    Ok(())
}

async fn use_default(args: UseArgs, client: &CortexClient) -> CliResult<()> {
    let request = SetDefaultRequest { version: args.version.clone(), variant: args.variant.clone() };
    let _: serde_json::Value = client.post(&format!("/v1/engines/{}/default", args.family), &request).await?;
    println!("{} now defaults to {} {}", args.family, args.version, args.variant);
    Ok(())
}
