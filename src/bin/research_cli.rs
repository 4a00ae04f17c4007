//! Runs one research batch from a competitor file and prints the batch report as JSON.
//!
//! Without a file, `COMPETITORS_PATH` or `config/competitors.{toml,json}` is used.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use competitor_research::ai_bootstrap::AppRuntime;
use competitor_research::analyze::report::MetricsRequest;
use competitor_research::ingest::config::{load_competitors_default, load_competitors_from};

#[derive(Debug, Parser)]
#[command(name = "research_cli", version, about = "Competitor research batch runner")]
struct Cli {
    /// Name of the company the competitors are researched for
    company_name: String,
    /// TOML or JSON file with competitor names and websites
    competitors_file: Option<PathBuf>,
    /// Focus area added to the general research question
    #[arg(long, default_value = "")]
    focus: String,
    /// Also write digest and metrics reports for the new run
    #[arg(long)]
    reports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let competitors = match &cli.competitors_file {
        Some(p) => load_competitors_from(p)?,
        None => load_competitors_default()?,
    };
    if competitors.is_empty() {
        bail!("no competitors to research");
    }

    let rt = AppRuntime::from_env()?;
    let batch = rt
        .pipeline
        .submit(&cli.company_name, competitors, &cli.focus, rt.store.as_ref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&batch)?);

    if cli.reports {
        let request = MetricsRequest::from_display_names::<&str>(&[]);
        let reports = rt
            .reports
            .generate(
                batch.run_id,
                &[],
                &request,
                rt.store.as_ref(),
                rt.notifier.as_deref(),
            )
            .await?;
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}
