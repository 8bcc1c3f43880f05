use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trend_pipeline::{
    PipelineOrchestrator,
    cli::{
        commands::{Cli, Commands},
        params::{parse_list, read_instruments},
    },
    config::{PipelineConfig, load_config_path},
    models::PerformanceRecord,
};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_record(record: &PerformanceRecord, provenance: bool) -> Result<()> {
    if provenance {
        print_json(record)
    } else {
        print_json(&record.values())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_path(path).with_context(|| format!("loading config {path}"))?,
        None => PipelineConfig::default(),
    };
    let default_horizon = config.pipeline.default_horizon_days;
    let pipeline = PipelineOrchestrator::from_config(&config)?;

    match &cli.command {
        Commands::Days {
            date,
            count,
            direction,
        } => {
            let days = pipeline.resolve_trading_days(date, *count, *direction).await?;
            print_json(&days)?;
        }

        Commands::Performance {
            instrument,
            base_date,
            horizon,
            dates,
        } => {
            let record = match (dates, base_date) {
                (Some(dates), _) => {
                    pipeline
                        .get_instrument_performance(instrument, &parse_list(dates))
                        .await?
                }
                (None, Some(base_date)) => {
                    pipeline
                        .get_performance(instrument, base_date, horizon.unwrap_or(default_horizon))
                        .await?
                }
                (None, None) => anyhow::bail!("either --base-date or --dates is required"),
            };
            print_record(&record, cli.provenance)?;
        }

        Commands::Week { instrument, date } => {
            let record = pipeline.get_trailing_week(instrument, date).await?;
            print_record(&record, cli.provenance)?;
        }

        Commands::Matrix {
            instruments,
            source,
            input,
            base_date,
            horizon,
        } => {
            let ids = read_instruments(*source, instruments.as_deref(), input.as_deref())?;
            let matrix = pipeline
                .get_trend_matrix(&ids, base_date, horizon.unwrap_or(default_horizon))
                .await?;
            if cli.provenance {
                print_json(&matrix)?;
            } else {
                print_json(&matrix.values())?;
            }
        }
    }

    let stats = pipeline.cache_stats();
    info!(
        performance_entries = stats.performance.entries,
        aggregate_entries = stats.aggregate.entries,
        "done"
    );
    Ok(())
}
