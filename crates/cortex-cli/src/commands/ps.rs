//! `cortex ps` — list engine families currently holding a loaded handle.

use clap::Args;
use serde::Deserialize;

use crate::client::CortexClient;
use crate::error::CliResult;

#[derive(Args)]
pub struct PsArgs;

#[derive(Debug, Deserialize)]
struct ModelsListResponse {
    data: Vec<String>,
}

pub async fn run(_args: PsArgs, client: &CortexClient) -> CliResult<()> {
    let response: ModelsListResponse = client.get("/inferences/server/models").await?;
    if response.data.is_empty() {
        println!("no engines loaded");
        return Ok(());
    }
    println!("{:<20} {:<8}", "FAMILY", "STATUS");
    for family in response.data {
        println!("{family:<20} {:<8}", "loaded");
    }
    Ok(())
}
