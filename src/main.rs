use clap::Parser;
use colored::*;
use stargazer_loader::cli::Cli;
use stargazer_loader::config::Config;
use stargazer_loader::loader::open_store;
use stargazer_loader::orchestrator::Orchestrator;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_cli(&cli)?);
    let sources = config.select(cli.source.as_deref())?;

    println!("{}", "Stargazer Extract & Load".bold().green());
    println!("{}\n", "=".repeat(50).dimmed());
    println!(
        "📦 {} source(s), {} workers per source, {} sources at a time",
        sources.len(),
        config.fetch.workers,
        config.source_concurrency
    );
    if config.default_credential.is_none() && sources.iter().all(|s| s.credential.is_none()) {
        println!("{}", "⚠️  No GitHub token set, requests are limited to 60/hr".yellow());
    }

    let store = open_store(&config.store).await?;
    let orchestrator = Orchestrator::start(config.clone(), store).await?;

    let summary = orchestrator.run(&sources).await;

    println!("\n📊 Summary:");
    for report in &summary.succeeded {
        println!(
            "  {} {} → {} ({} rows, {} pages, {:.1}s)",
            "✅".green(),
            report.source.bold(),
            report.table,
            report.rows_loaded,
            report.pages,
            report.elapsed.as_secs_f64()
        );
    }
    for failure in &summary.failed {
        println!(
            "  {} {} failed during {}: {}",
            "❌".red(),
            failure.source_name.bold(),
            failure.phase,
            failure.cause
        );
        println!(
            "     re-run with: {}",
            format!("stargazer-loader --source {}", failure.source_name).dimmed()
        );
    }

    orchestrator.shutdown().await;

    if summary.is_success() {
        println!("\n{} {} rows loaded", "✅".green(), summary.total_rows());
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "\n{} {} of {} sources failed",
            "🛑".red(),
            summary.failed.len(),
            summary.failed.len() + summary.succeeded.len()
        );
        Ok(ExitCode::FAILURE)
    }
}
