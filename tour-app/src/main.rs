//! llm-tour: runnable recipes for an OpenAI-compatible API.

mod recipes;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tour_llm::{BlockingLlmClient, ClientConfig, LlmClient, ReasoningEffort};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "llm-tour", version, about = "Recipes for an OpenAI-compatible LLM API")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    /// API key sent as a bearer token.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL override, e.g. a proxy or a compatible provider.
    #[arg(long, global = true, env = "BASE_URL")]
    base_url: Option<String>,

    /// Model used instead of each recipe's default.
    #[arg(long, global = true, env = "MODEL")]
    model: Option<String>,
}

impl ConnectionArgs {
    fn to_config(&self) -> tour_llm::Result<ClientConfig> {
        ClientConfig::from_lookup(|key| match key {
            "OPENAI_API_KEY" => self.api_key.clone(),
            "BASE_URL" => self.base_url.clone(),
            "MODEL" => self.model.clone(),
            _ => None,
        })
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Single response with system instructions.
    Respond {
        #[arg(default_value = "How do I check whether a Python object is an instance of a class?")]
        prompt: String,
        /// Use the blocking client instead of async.
        #[arg(long)]
        blocking: bool,
    },
    /// Single chat completion.
    Chat {
        #[arg(default_value = "Say this is a test")]
        prompt: String,
    },
    /// Stream a response, printing text as it arrives.
    Stream {
        #[arg(default_value = "Write a one-sentence bedtime story about a unicorn.")]
        prompt: String,
        /// Use the blocking client instead of async.
        #[arg(long)]
        blocking: bool,
    },
    /// Describe a local image.
    Image {
        #[arg(long, default_value = "image.png")]
        path: PathBuf,
        #[arg(default_value = "What is in this image?")]
        prompt: String,
    },
    /// Offer a weather function and print the raw response.
    Functions {
        #[arg(default_value = "What is the weather like in Beijing today?")]
        prompt: String,
    },
    /// Response with an explicit reasoning effort.
    Reasoning {
        #[arg(long, value_enum, default_value_t = Effort::Medium)]
        effort: Effort,
        #[arg(
            default_value = "Write a bash script that takes a matrix represented as a string with format '[1,2],[3,4],[5,6]' and prints the transpose in the same format."
        )]
        prompt: String,
    },
    /// Step-by-step structured output; prints the refusal if the model declines.
    Structured {
        #[arg(default_value = "I fixed a bug in a GitHub repository. How do I get it merged into main?")]
        prompt: String,
    },
    /// Text-only realtime session over WebSocket.
    Realtime {
        #[arg(default_value = "Say hello!")]
        prompt: String,
    },
    /// Plain and streamed chat against the configured MODEL (required).
    Compat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Effort {
    Minimal,
    Low,
    Medium,
    High,
}

impl From<Effort> for ReasoningEffort {
    fn from(e: Effort) -> Self {
        match e {
            Effort::Minimal => ReasoningEffort::Minimal,
            Effort::Low => ReasoningEffort::Low,
            Effort::Medium => ReasoningEffort::Medium,
            Effort::High => ReasoningEffort::High,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be set.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("load .env: {e}"));
        }
    }
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();
    let config = cli.connection.to_config()?;
    tracing::debug!(?config, "client config resolved");

    // Blocking recipes run without any async runtime on this thread.
    match cli.command {
        Command::Respond {
            prompt,
            blocking: true,
        } => recipes::respond_blocking(&BlockingLlmClient::new(config)?, &prompt),
        Command::Stream {
            prompt,
            blocking: true,
        } => recipes::stream_blocking(&BlockingLlmClient::new(config)?, &prompt),
        command => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run(config, command)),
    }
}

async fn run(config: ClientConfig, command: Command) -> anyhow::Result<()> {
    let client = || LlmClient::new(config.clone());
    match command {
        Command::Respond { prompt, .. } => recipes::respond(&client()?, &prompt).await,
        Command::Chat { prompt } => recipes::chat(&client()?, &prompt).await,
        Command::Stream { prompt, .. } => recipes::stream(&client()?, &prompt).await,
        Command::Image { path, prompt } => recipes::image(&client()?, &path, &prompt).await,
        Command::Functions { prompt } => recipes::functions(&client()?, &prompt).await,
        Command::Reasoning { effort, prompt } => {
            recipes::reasoning(&client()?, &prompt, effort.into()).await
        }
        Command::Structured { prompt } => recipes::structured(&client()?, &prompt).await,
        Command::Compat => recipes::compat(&client()?).await,
        Command::Realtime { prompt } => recipes::realtime(&config, &prompt).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) => EnvFilter::new("warn,llm_tour=info,tour_app=info,tour_llm=info"),
    };
    let log_format = std::env::var("LLM_TOUR_LOG_FORMAT")
        .unwrap_or_else(|_| "compact".to_string())
        .to_ascii_lowercase();

    // Recipe output goes to stdout; logs stay on stderr.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported LLM_TOUR_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::debug!(
        log_format = %log_format,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
