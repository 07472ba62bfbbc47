//! Hearth CLI - drive the local assistant from a terminal.

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

/// Hearth - a local chat and image assistant sharing one GPU
#[derive(Parser)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant, one message per line on stdin
    Chat {
        /// User the conversation belongs to
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Generate an image and print where it was written
    Imagine {
        /// Text prompt for the image
        prompt: String,
        /// User requesting the image
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Show whether the managed services are up
    Status,

    /// Stop a managed service
    Stop {
        #[arg(value_enum)]
        service: ServiceArg,
    },

    /// Show the effective configuration
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum ServiceArg {
    /// The Ollama chat server
    Chat,
    /// The ComfyUI image server
    Image,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Chat { user } => commands::chat::run(&user).await,
            Commands::Imagine { prompt, user } => commands::imagine::run(&prompt, &user).await,
            Commands::Status => commands::status::run().await,
            Commands::Stop { service } => commands::stop::run(service.into()).await,
            Commands::Info => commands::info::run(),
        }
    })
}

impl From<ServiceArg> for hearth_chat::ServiceKind {
    fn from(arg: ServiceArg) -> Self {
        match arg {
            ServiceArg::Chat => hearth_chat::ServiceKind::Chat,
            ServiceArg::Image => hearth_chat::ServiceKind::Image,
        }
    }
}
