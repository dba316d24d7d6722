use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate enrollment validation CLI")]
struct Cli {
    /// Base URL of a running facegated instance
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a photo batch for validation and enrollment
    Enroll {
        /// Subject identifier the photos belong to
        #[arg(short, long)]
        user: String,
        /// Photo files to submit (5 to 8 by default)
        #[arg(required = true)]
        photos: Vec<PathBuf>,
    },
    /// Show daemon status
    Status,
}

/// Wire shape of the daemon's validation response.
#[derive(Debug, Deserialize)]
struct Report {
    #[serde(rename = "fotosValidas")]
    valid_photos: Vec<String>,
    #[serde(rename = "errores")]
    errors: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Enroll { user, photos } => {
            let mut form = reqwest::multipart::Form::new().text("usuarioId", user);

            for path in &photos {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("could not read {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "photo.jpg".to_string());
                form = form.part(
                    "fotos",
                    reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                );
            }

            let response = client
                .post(format!("{}/api/fotos/validar", cli.server))
                .multipart(form)
                .send()
                .await
                .context("could not reach facegated")?;

            let status = response.status();
            let report: Report = response
                .json()
                .await
                .with_context(|| format!("unexpected response (HTTP {status})"))?;

            if !report.valid_photos.is_empty() {
                println!("accepted ({}):", report.valid_photos.len());
                for name in &report.valid_photos {
                    println!("  {name}");
                }
            }
            if !report.errors.is_empty() {
                println!("errors ({}):", report.errors.len());
                for error in &report.errors {
                    println!("  {error}");
                }
            }

            if report.valid_photos.is_empty() {
                bail!("no photos were accepted");
            }
        }
        Commands::Status => {
            let body = client
                .get(format!("{}/health", cli.server))
                .send()
                .await
                .context("could not reach facegated")?
                .text()
                .await?;
            println!("{body}");
        }
    }

    Ok(())
}
