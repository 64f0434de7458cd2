use anyhow::{Context, Result};
use cellbox_core::config::{HistoryConfig, SandboxConfig};
use cellbox_core::runtime::DockerIsolateRuntime;
use cellbox_core::{SandboxError, SandboxService};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(
    name = "cellbox",
    version = "0.1.0",
    about = "Run untrusted code modules in cached, network-less sandboxes"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "info")]
    log_level: String,

    #[clap(
        long,
        default_value = ".cellbox/prompts.json",
        help = "File the prompt history persists to"
    )]
    history_file: PathBuf,

    #[clap(long, default_value = "30", help = "Per-invocation timeout in seconds")]
    timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a module against an input and print the response body
    Run {
        #[clap(help = "Module source file; omit to run the built-in uppercase module")]
        file: Option<PathBuf>,

        #[clap(long, short, default_value = "", help = "Input text passed to the module")]
        input: String,
    },
    /// Print the recorded prompt history, oldest first
    History,
    /// Remove all recorded prompts
    ClearHistory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(LevelFilter::Info))
        .init();

    let config = SandboxConfig {
        history: HistoryConfig {
            path: Some(cli.history_file.clone()),
            ..Default::default()
        },
        ..Default::default()
    };

    let runtime = DockerIsolateRuntime::connect(cli.timeout)
        .map_err(|e| anyhow::anyhow!("sandbox runtime unavailable: {}", e))?
        .with_image(config.execution.image.clone());
    let service = SandboxService::with_runtime(Arc::new(runtime), &config).await?;

    match cli.command {
        Commands::Run { file, input } => {
            let code = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading module from {:?}", path))?,
                None => String::new(),
            };
            service.record_prompt(&input).await;
            match service.execute(&code, &input, &input).await {
                Ok(outcome) => {
                    log::debug!(
                        "status={} content-type={}",
                        outcome.status,
                        outcome.content_type
                    );
                    println!("{}", outcome.body);
                }
                Err(SandboxError::RuntimeUnavailable(msg)) => {
                    anyhow::bail!("sandboxed execution is not available here: {}", msg)
                }
                Err(err) => anyhow::bail!("{}", err),
            }
        }
        Commands::History => {
            for prompt in service.list_prompts().await {
                println!("{}", prompt);
            }
        }
        Commands::ClearHistory => {
            service.clear_prompts().await?;
            log::info!("Prompt history cleared");
        }
    }

    Ok(())
}
