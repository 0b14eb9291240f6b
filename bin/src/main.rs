//! CLI for fd-prep panel preparation.
//!
//! Reads CSV panels, runs one preparation stage and writes the result back
//! as CSV. Stage settings come from an optional JSON config file, with
//! command-line flags taking precedence.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fd_prep::{
    CrossSectionalStandardizer, FactorNeutralizer, PrepConfig, QuarterDeltaReconstructor,
    QuarterlyReportTable, ReferenceStats, reference_stats,
};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fd-prep")]
#[command(about = "Fundamental and factor panel preparation", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct single-quarter deltas from cumulative reports
    Quarters {
        /// Wide CSV with one column per fiscal period (e.g. 2019Q2)
        input: PathBuf,
        /// Output CSV
        #[arg(long, short)]
        output: PathBuf,
        /// Instrument identifier column
        #[arg(long, default_value = "symbol")]
        id_column: String,
        /// First fiscal year with a zero baseline
        #[arg(long)]
        first_year: Option<i32>,
        /// Last fiscal year with a zero baseline
        #[arg(long)]
        last_year: Option<i32>,
    },
    /// Regress factors on log market cap and industry dummies, keep residuals
    Neutralize {
        /// Long CSV panel with date, symbol, market cap, industry and factors
        input: PathBuf,
        /// Output CSV
        #[arg(long, short)]
        output: PathBuf,
        /// Industry universe, comma separated
        #[arg(long, value_delimiter = ',')]
        industries: Vec<String>,
    },
    /// Z-score factors against per-period reference statistics
    Standardize {
        /// Long CSV panel with a period column and factors
        input: PathBuf,
        /// Output CSV
        #[arg(long, short)]
        output: PathBuf,
        /// Factors to standardize, comma separated
        #[arg(long, value_delimiter = ',')]
        factors: Vec<String>,
        /// Period key column
        #[arg(long)]
        period_column: Option<String>,
        /// Per-period means; computed from the input when omitted
        #[arg(long, requires = "std")]
        mean: Option<PathBuf>,
        /// Per-period standard deviations; computed from the input when omitted
        #[arg(long, requires = "mean")]
        std: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PrepConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PrepConfig::default(),
    };

    match cli.command {
        Commands::Quarters {
            input,
            output,
            id_column,
            first_year,
            last_year,
        } => {
            if let Some(year) = first_year {
                config.quarters.first_year = year;
            }
            if let Some(year) = last_year {
                config.quarters.last_year = year;
            }
            run_quarters(&config, &input, &output, &id_column)
        }
        Commands::Neutralize {
            input,
            output,
            industries,
        } => {
            if !industries.is_empty() {
                config.neutralize.industries = industries;
            }
            run_neutralize(&config, &input, &output)
        }
        Commands::Standardize {
            input,
            output,
            factors,
            period_column,
            mean,
            std,
        } => {
            if !factors.is_empty() {
                config.standardize.factors = factors;
            }
            if let Some(period) = period_column {
                config.standardize.period_column = period;
            }
            let reference = mean.zip(std);
            run_standardize(&config, &input, &output, reference)
        }
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}

/// Reconstruct quarterly deltas for a wide report table.
fn run_quarters(config: &PrepConfig, input: &Path, output: &Path, id_column: &str) -> Result<()> {
    let reports = read_csv(input)?;
    let table = QuarterlyReportTable::from_dataframe(&reports, id_column)?;
    let deltas = QuarterDeltaReconstructor::with_config(config.quarters).reconstruct(&table)?;

    let mut df = deltas.to_dataframe(id_column)?;
    write_csv(&mut df, output)?;

    info!(
        instruments = deltas.height(),
        periods = deltas.width(),
        output = %output.display(),
        "wrote quarterly deltas"
    );
    Ok(())
}

/// Neutralize every factor column of a long panel.
fn run_neutralize(config: &PrepConfig, input: &Path, output: &Path) -> Result<()> {
    if config.neutralize.industries.is_empty() {
        bail!("no industry universe configured; pass --industries or set neutralize.industries");
    }

    let panel = read_csv(input)?;
    let result = FactorNeutralizer::with_config(config.neutralize.clone()).neutralize(&panel)?;

    let mut df = result.panel;
    write_csv(&mut df, output)?;

    for failure in &result.diagnostics {
        println!("skipped {} on {}: {}", failure.factor, failure.date, failure.error);
    }
    info!(
        rows = df.height(),
        skipped = result.diagnostics.len(),
        output = %output.display(),
        "wrote neutralized panel"
    );
    Ok(())
}

/// Standardize factors against supplied or in-sample reference statistics.
fn run_standardize(
    config: &PrepConfig,
    input: &Path,
    output: &Path,
    reference: Option<(PathBuf, PathBuf)>,
) -> Result<()> {
    let settings = &config.standardize;
    let panel = read_csv(input)?;

    let stats = match reference {
        Some((mean, std)) => ReferenceStats {
            mean: read_csv(&mean)?,
            std: read_csv(&std)?,
        },
        None => reference_stats(&panel, &settings.period_column, &settings.factors)?,
    };

    let mut df = CrossSectionalStandardizer::with_config(settings.clone()).standardize(
        &panel,
        &stats.mean,
        &stats.std,
    )?;
    write_csv(&mut df, output)?;

    info!(
        rows = df.height(),
        factors = settings.factors.len(),
        output = %output.display(),
        "wrote standardized panel"
    );
    Ok(())
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .with_context(|| format!("reading {}", path.display()))
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("writing {}", path.display()))
}
