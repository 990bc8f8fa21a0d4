//! blast-ppv - Blast Vibration Predictor
//!
//! Records blast vibration measurements, fits the scaled-distance
//! attenuation law per lithology and predicts PPV for planned blasts.
//!
//! # Usage
//!
//! ```bash
//! # Record a measurement (refits that lithology)
//! blast-ppv add --distance 120 --charge 25 --vibration 3.4 --lithology granite
//!
//! # Bulk import a survey export (refits everything)
//! blast-ppv import survey_2024.xlsx
//!
//! # Predict PPV for a planned blast
//! blast-ppv predict --distance 200 --charge 40 --lithology granite
//! ```
//!
//! # Environment Variables
//!
//! - `BLAST_PPV_CONFIG`: Path to the site config TOML (default: ./blast_ppv.toml)
//! - `BLAST_PPV_DB`: Database directory, same as `--db`
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use blast_ppv::config::{self, SiteConfig};
use blast_ppv::{FitReport, VibrationEngine};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "blast-ppv")]
#[command(about = "Blast vibration prediction from per-lithology attenuation fits")]
#[command(version)]
struct CliArgs {
    /// Site config TOML (overrides BLAST_PPV_CONFIG and ./blast_ppv.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Measurement database directory (overrides storage.path)
    #[arg(long, global = true, env = "BLAST_PPV_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Record one measurement and refit its lithology
    Add {
        /// Distance from blast to monitoring point (m)
        #[arg(long)]
        distance: f64,
        /// Charge per delay (kg)
        #[arg(long)]
        charge: f64,
        /// Measured peak particle velocity (mm/s)
        #[arg(long)]
        vibration: f64,
        /// Rock type
        #[arg(long)]
        lithology: String,
    },

    /// Import measurements from a CSV or Excel/ODS file and refit all lithologies
    Import {
        /// .csv, .xlsx, .xls or .ods file with distance, charge, vibration and lithology columns
        file: PathBuf,
    },

    /// Recompute attenuation models
    Refit {
        /// Only this lithology (default: all)
        #[arg(long)]
        lithology: Option<String>,
    },

    /// Predict vibration for a planned blast
    Predict {
        /// Distance from blast to monitoring point (m)
        #[arg(long)]
        distance: f64,
        /// Charge per delay (kg)
        #[arg(long)]
        charge: f64,
        /// Rock type
        #[arg(long)]
        lithology: String,
    },

    /// List stored measurements, newest first
    List {
        /// Show at most this many rows
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List lithologies and their current models
    Lithologies,

    /// Print the effective configuration as TOML
    Config,
}

// ============================================================================
// Subcommands
// ============================================================================

fn print_fit(report: &FitReport) {
    println!(
        "  {}: K = {:.4}, alpha = {:.4} ({} point(s), {} excluded, R² = {:.3})",
        report.lithology,
        report.k,
        report.alpha,
        report.points_used,
        report.points_excluded,
        report.r_squared
    );
}

fn run_add(
    engine: &VibrationEngine,
    distance: f64,
    charge: f64,
    vibration: f64,
    lithology: &str,
) -> Result<()> {
    let (id, fit) = engine
        .record_measurement(distance, charge, vibration, lithology)
        .context("Failed to record measurement")?;

    println!("Stored measurement #{id}");
    match fit {
        Some(report) => {
            println!("Model updated:");
            print_fit(&report);
        }
        None => println!("Not enough data to fit '{}' yet", lithology.trim()),
    }
    Ok(())
}

fn run_import(engine: &VibrationEngine, file: &Path, max_errors: usize) -> Result<()> {
    let outcome = engine
        .import_file(file)
        .with_context(|| format!("Failed to import {}", file.display()))?;

    println!("{}", outcome.report.summary(max_errors));
    let skipped = outcome.skipped_lithologies();
    if !skipped.is_empty() {
        println!("Not fitted:");
        for (lithology, reason) in skipped {
            println!("  {lithology}: {reason}");
        }
    }
    if outcome.report.imported() > 0 {
        run_lithologies(engine)?;
    }
    Ok(())
}

fn run_refit(engine: &VibrationEngine, lithology: Option<&str>) -> Result<()> {
    if let Some(lithology) = lithology {
        let report = engine
            .refit(lithology)
            .with_context(|| format!("Failed to refit '{lithology}'"))?;
        print_fit(&report);
        return Ok(());
    }

    let summary = engine.refit_all().context("Refit pass failed")?;
    for report in summary.fitted.values() {
        print_fit(report);
    }
    for (lithology, reason) in &summary.skipped {
        println!("  {lithology}: skipped ({reason})");
    }
    if summary.fitted.is_empty() && summary.skipped.is_empty() {
        println!("No measurements stored");
    }
    Ok(())
}

fn run_predict(engine: &VibrationEngine, distance: f64, charge: f64, lithology: &str) -> Result<()> {
    let text = engine
        .predict_text(distance, charge, lithology)
        .context("Prediction failed")?;
    println!("{text}");
    Ok(())
}

fn run_list(engine: &VibrationEngine, limit: Option<usize>) -> Result<()> {
    let rows = engine.list_measurements().context("Failed to read measurements")?;
    if rows.is_empty() {
        println!("No measurements stored");
        return Ok(());
    }

    println!(
        "{:>6}  {:>10}  {:>10}  {:>10}  {:<16}  {:>10}  {:>8}  {}",
        "id", "dist (m)", "charge(kg)", "ppv (mm/s)", "lithology", "K", "alpha", "recorded"
    );
    let shown = limit.unwrap_or(rows.len());
    for row in rows.iter().take(shown) {
        let (k, alpha) = row.coefficients().map_or_else(
            || ("-".to_string(), "-".to_string()),
            |(k, a)| (format!("{k:.3}"), format!("{a:.4}")),
        );
        println!(
            "{:>6}  {:>10.2}  {:>10.2}  {:>10.3}  {:<16}  {:>10}  {:>8}  {}",
            row.id,
            row.distance,
            row.charge,
            row.vibration,
            row.lithology,
            k,
            alpha,
            row.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    if rows.len() > shown {
        println!("... {} more", rows.len() - shown);
    }
    Ok(())
}

fn run_lithologies(engine: &VibrationEngine) -> Result<()> {
    let lithologies = engine.list_lithologies().context("Failed to read lithologies")?;
    if lithologies.is_empty() {
        println!("No lithologies recorded");
        return Ok(());
    }
    for lithology in lithologies {
        match engine.model_for(&lithology)? {
            Some(model) => println!(
                "  {lithology}: K = {:.4}, alpha = {:.4} (fitted {})",
                model.k,
                model.alpha,
                model.fitted_at.format("%Y-%m-%d %H:%M")
            ),
            None => println!("  {lithology}: no model yet"),
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    // Initialize logging (stderr keeps stdout for command output)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    // Load site configuration
    let mut site_config = match &args.config {
        Some(path) => SiteConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SiteConfig::load(),
    };
    if let Some(db) = args.db {
        site_config.storage.path = db;
    }
    if site_config.site.operator.is_empty() {
        info!(site = %site_config.site.name, "Site configuration ready");
    } else {
        info!(
            site = %site_config.site.name,
            operator = %site_config.site.operator,
            "Site configuration ready"
        );
    }

    if let SubCommand::Config = args.command {
        print!("{}", site_config.to_toml().context("Failed to render config")?);
        return Ok(());
    }

    let max_errors = site_config.import.max_reported_errors;
    config::init(site_config.clone());

    if let Some(parent) = site_config.storage.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let engine = VibrationEngine::open(&site_config).with_context(|| {
        format!(
            "Failed to open measurement database {}",
            site_config.storage.path.display()
        )
    })?;

    let outcome = match &args.command {
        SubCommand::Add {
            distance,
            charge,
            vibration,
            lithology,
        } => run_add(&engine, *distance, *charge, *vibration, lithology),
        SubCommand::Import { file } => run_import(&engine, file, max_errors),
        SubCommand::Refit { lithology } => run_refit(&engine, lithology.as_deref()),
        SubCommand::Predict {
            distance,
            charge,
            lithology,
        } => run_predict(&engine, *distance, *charge, lithology),
        SubCommand::List { limit } => run_list(&engine, *limit),
        SubCommand::Lithologies => run_lithologies(&engine),
        SubCommand::Config => Ok(()),
    };

    if let Err(e) = engine.flush() {
        warn!(error = %e, "Final flush failed");
    }
    outcome
}
