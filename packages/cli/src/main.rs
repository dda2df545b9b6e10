#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the device risk pipeline.
//!
//! Joins a flagged device list against a customer onboarding export,
//! enriches the matches with reverse-geocoded regions (through the
//! persistent region cache), classifies each customer into a risk tier,
//! and reports and exports the results.

mod pipeline;
mod report;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use device_risk_geocoder::cache::{DEFAULT_CACHE_FILE, RegionCache};
use device_risk_geocoder::service_registry::{ProviderConfig, all_services};
use device_risk_models::UNKNOWN_REGION;

#[derive(Parser)]
#[command(name = "device_risk", about = "Flagged-device customer risk segmentation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: load, resolve regions, classify, report, export
    Run(RunArgs),
    /// Show what the region cache currently holds
    CacheStats {
        /// Region cache file
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache_path: PathBuf,
    },
    /// List the embedded reverse geocoding services
    Services,
}

/// Arguments for the `run` subcommand.
#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// CSV of flagged device IDs (first column, with header row)
    #[arg(long)]
    pub flagged: PathBuf,
    /// Onboarding/usage export CSV (requires `DEVICE_ID`, `CIF`, `LATITUDE`,
    /// `LONGITUDE`, `CREATED_TIME`; `REGION` optional)
    #[arg(long)]
    pub onboarding: PathBuf,
    /// Region cache file
    #[arg(long, default_value = DEFAULT_CACHE_FILE)]
    pub cache_path: PathBuf,
    /// Pause after each geocoding request in milliseconds (defaults to the
    /// service's configured rate limit)
    #[arg(long)]
    pub delay_ms: Option<u64>,
    /// Reverse geocoding endpoint (overrides `DEVICE_RISK_GEOCODER_URL` and
    /// the embedded service config)
    #[arg(long)]
    pub geocoder_url: Option<String>,
    /// Preferred language for region names (defaults to the service config)
    #[arg(long)]
    pub language: Option<String>,
    /// Skip reverse geocoding entirely; every region is reported as unknown
    #[arg(long)]
    pub no_geocode: bool,
    /// Directory for the results CSV and heatmap
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
    /// Heatmap file name, relative to `--output-dir`
    #[arg(long, default_value = "risk_heatmap.geojson")]
    pub heatmap: PathBuf,
    /// Do not export the heatmap
    #[arg(long)]
    pub skip_heatmap: bool,
    /// Number of regions to list in each ranking
    #[arg(long, default_value = "10")]
    pub top_n: usize,
}

/// Percentage of cached coordinates that resolved to the unknown sentinel;
/// zero for an empty cache.
#[allow(clippy::cast_precision_loss)]
fn unknown_share(unknown: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        unknown as f64 / total as f64 * 100.0
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = device_risk_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => pipeline::run(&args, &multi).await?,
        Commands::CacheStats { cache_path } => {
            let cache = RegionCache::load(&cache_path)?;
            let unknown = cache.iter().filter(|(_, r)| *r == UNKNOWN_REGION).count();
            println!("Cache file:   {}", cache_path.display());
            println!("Coordinates:  {}", cache.len());
            println!(
                "Unknown:      {unknown} ({:.1}%)",
                unknown_share(unknown, cache.len())
            );
        }
        Commands::Services => {
            println!("{:<12} {:<8} {:<10} URL", "ID", "ENABLED", "DELAY");
            println!("{}", "-".repeat(70));
            for svc in &all_services() {
                let ProviderConfig::Nominatim { rate_limit_ms, .. } = &svc.provider;
                println!(
                    "{:<12} {:<8} {:<10} {}",
                    svc.id,
                    svc.enabled,
                    format!("{rate_limit_ms}ms"),
                    svc.base_url()
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_share_of_empty_cache_is_zero() {
        assert!(unknown_share(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_share_is_a_percentage() {
        assert!((unknown_share(1, 4) - 25.0).abs() < 1e-9);
        assert!((unknown_share(3, 3) - 100.0).abs() < 1e-9);
    }
}
