//! `cortex models list/pull/run`.

use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use crate::client::CortexClient;
use crate::error::CliResult;

#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List loaded engine families
    List,

    /// Download (install) a model's engine variant
    Pull(PullArgs),

    /// Load a model and run a single prompt against it
    Run(RunArgs),
}

#[derive(Args)]
struct PullArgs {
    model: String,

    #[arg(long)]
    version: Option<String>,

    #[arg(long)]
    variant: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    model: String,

    /// Prompt text sent as a single user message
    #[arg(long)]
    prompt: String,

    #[arg(long)]
    version: Option<String>,

    #[arg(long)]
    variant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsListResponse {
    data: Vec<String>,
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
struct LoadModelRequest {
    model: String,
    version: Option<String>,
    variant: Option<String>,
    multimodal: bool,
    preprompt: String,
    user_turn_marker: String,
}

#[derive(Debug, Deserialize)]
struct LoadModelResponse {
    loaded: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

pub async fn run(args: ModelsArgs, client: &CortexClient) -> CliResult<()> {
    match args.command {
        ModelsCommand::List => list(client).await,
        ModelsCommand::Pull(args) => pull(args, client).await,
        ModelsCommand::Run(args) => run_prompt(args, client).await,
    }
}

async fn list(client: &CortexClient) -> CliResult<()> {
    let response: ModelsListResponse = client.get("/inferences/server/models").await?;
    if response.data.is_empty() {
        println!("no models loaded");
        return Ok(());
    }
    for family in response.data {
        println!("{family}");
    }
    Ok(())
}

async fn pull(args: PullArgs, client: &CortexClient) -> CliResult<()> {
    let request = InstallRequest { version: args.version, variant: args.variant };
    let installed: InstalledVariant = client.post(&format!("/v1/engines/{}/install", args.model), &request).await?;
    println!("pulled {} variant {}", args.model, installed.tag);
    Ok(())
}

async fn run_prompt(args: RunArgs, client: &CortexClient) -> CliResult<()> {
    let load_request = LoadModelRequest {
        model: args.model.clone(),
        version: args.version,
        variant: args.variant,
        multimodal: false,
        preprompt: String::new(),
        user_turn_marker: String::new(),
    };
    let loaded: LoadModelResponse = client.post("/inferences/server/loadmodel", &load_request).await?;
    if !loaded.loaded {
        return Err(crate::error::CliError::runtime(format!("{} failed to load", args.model)));
    }

    let chat_request = ChatCompletionRequest {
        model: args.model,
        messages: vec![ChatMessage { role: "user", content: args.prompt }],
        stream: false,
    };
    let response: ChatCompletionResponse = client.post("/v1/chat/completions", &chat_request).await?;
    let content = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .unwrap_or_default();
    println!("{content}");
    Ok(())
}
