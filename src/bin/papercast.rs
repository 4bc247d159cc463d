use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use papercast::{load_settings, BatchOrchestrator, OpenAiClient};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse()?;
    let settings = load_settings(&args.settings)?;
    settings
        .validate()
        .context("settings validation failed, nothing was processed")?;

    let client = Arc::new(OpenAiClient::new(&settings));
    let orchestrator = BatchOrchestrator::new(&settings, client);
    let input_dir = args.input.unwrap_or_else(|| settings.input_dir.clone());
    let report = orchestrator.run(&input_dir)?;
    println!("{}", report.describe());

    Ok(())
}

struct CliArgs {
    settings: PathBuf,
    input: Option<PathBuf>,
}

impl CliArgs {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let mut settings = PathBuf::from("settings.toml");
        let mut input = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--settings" | "-s" => {
                    let value = args
                        .next()
                        .context("Expected a file path after --settings")?;
                    settings = PathBuf::from(value);
                }
                "--input" | "-i" => {
                    let value = args
                        .next()
                        .context("Expected a directory path after --input")?;
                    input = Some(PathBuf::from(value));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument '{other}'. Run with --help for usage instructions."
                    ));
                }
            }
        }
        Ok(Self { settings, input })
    }
}

fn print_usage() {
    println!("papercast - summarize a folder of research papers");
    println!("Usage: cargo run --bin papercast -- [options]");
    println!("Options:");
    println!("  --settings <path>   Settings file to load (default: settings.toml)");
    println!("  --input <dir>       Input directory override (default: from settings)");
}
