use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod bot;
mod chunk;
mod classify;
mod columns;
mod config;
mod error;
mod extract;
mod headers;
mod models;
mod pipeline;
mod report;
mod session;
mod sheet;

use crate::config::Config;
use crate::error::ProcessingError;

#[derive(Parser)]
#[command(name = "sheet-report")]
#[command(about = "Summary reports for schedule, grade and homework spreadsheets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the report type from the header row
    Classify {
        #[arg(long)]
        file: PathBuf,
    },
    /// Build a report from the first sheet of a file
    Report {
        #[arg(long)]
        file: PathBuf,
        /// Skip detection and use this mode (see `modes`)
        #[arg(long)]
        mode: Option<String>,
        /// Longest message to emit, in characters
        #[arg(long)]
        max_len: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List the available report modes
    Modes,
    /// Answer chat updates read as JSON lines from stdin
    Serve,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a pipeline::Report,
    chunks: &'a [String],
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Classify { file } => {
            let rows = sheet::read_first_sheet_rows(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            match rows.first().and_then(|header| classify::classify(header)) {
                Some(shape) => println!("{} ({})", shape.label(), shape.mode_id()),
                None => println!("unknown"),
            }
        }
        Commands::Report {
            file,
            mode,
            max_len,
            format,
        } => {
            let mode = mode.as_deref().map(bot::parse_mode).transpose()?;
            let config = config.with_overrides(max_len, mode);
            let rows = sheet::read_first_sheet_rows(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;

            let report = match pipeline::build_report(&rows, config.default_mode) {
                Ok(report) => report,
                Err(ProcessingError::NoData) => {
                    println!("{}", ProcessingError::NoData);
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            let chunks = chunk::chunk(&report.text, config.max_message_len);

            match format {
                OutputFormat::Text => {
                    for (position, part) in chunks.iter().enumerate() {
                        if position > 0 {
                            println!("---");
                        }
                        println!("{part}");
                    }
                }
                OutputFormat::Json => {
                    let output = JsonOutput {
                        report: &report,
                        chunks: &chunks,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
        }
        Commands::Modes => {
            println!("Detection order:");
            for (_, shape) in classify::CLASSIFICATION_ORDER.iter() {
                println!("- {} ({})", shape.mode_id(), shape.label());
            }
        }
        Commands::Serve => {
            let modes = Arc::new(session::ModeStore::new());
            let dispatcher = bot::Dispatcher::new(modes, config.max_message_len);
            bot::serve(dispatcher).await?;
        }
    }

    Ok(())
}
