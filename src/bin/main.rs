//! Pkgscope CLI - analyse compiled packages out of process
//!
//! Usage:
//!   pkgscope analyse <spec-file> [--out <file>]
//!
//! Examples:
//!   pkgscope analyse packaging.spec
//!   pkgscope analyse packaging.spec --out graph.json --config ./pkgscope.toml

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use pkgscope::{AnalysisClient, AnalysisRequest, Settings};

#[derive(Parser)]
#[command(name = "pkgscope")]
#[command(about = "Pkgscope - out-of-process static analysis of compiled packages")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a pkgscope.toml (defaults to the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse the packages described by a spec file
    Analyse {
        /// Path to the packaging spec
        spec: PathBuf,

        /// Where to write the resulting document (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Commands::Analyse { spec, out } => {
            let spec_bytes = fs::read(&spec)?;
            let output_file =
                std::env::temp_dir().join(format!("pkgscope-{}.tmp", uuid::Uuid::new_v4()));
            let request = AnalysisRequest::new(spec_bytes, output_file);

            let token = CancellationToken::new();
            let interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });

            let mut client = AnalysisClient::new(settings);
            let document = client.analyse(request, token).await?;

            let json = serde_json::to_string_pretty(&document)?;
            match out {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}
