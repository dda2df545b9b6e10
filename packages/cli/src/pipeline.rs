//! End-to-end risk pipeline.
//!
//! load -> filter -> resolve regions -> classify -> report -> export, with
//! the region cache loaded once before resolution and saved once after,
//! even when resolution is interrupted with Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use device_risk_cli_utils::{MultiProgress, ResolutionBar};
use device_risk_geocoder::ReverseGeocoder;
use device_risk_geocoder::cache::RegionCache;
use device_risk_geocoder::nominatim::NominatimClient;
use device_risk_geocoder::progress::ProgressCallback;
use device_risk_geocoder::resolver::RegionResolver;
use device_risk_geocoder::service_registry::default_service;
use device_risk_ingest::export::{export_heatmap, results_file_name, write_results_csv};
use device_risk_ingest::{filter_by_devices, load_flagged_devices, load_onboarding};
use device_risk_models::DeviceRecord;
use device_risk_scoring::analysis::{cohort_scores, region_scores};
use device_risk_scoring::classifier::classify;
use device_risk_scoring::summary::summarize;
use tokio::task::JoinHandle;

use crate::RunArgs;
use crate::report;

/// Exit status used when a second interrupt forces the process down.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Runs the full pipeline against the configured geocoding service.
///
/// # Errors
///
/// See [`execute`].
pub async fn run(args: &RunArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let service = default_service().ok_or("No enabled geocoding service configured")?;
    let base_url = args
        .geocoder_url
        .clone()
        .or_else(|| std::env::var("DEVICE_RISK_GEOCODER_URL").ok());
    let client =
        NominatimClient::from_service(&service, base_url.as_deref(), args.language.as_deref())?;
    let delay = args
        .delay_ms
        .map_or_else(|| service.rate_limit(), Duration::from_millis);

    log::info!(
        "Geocoding via {} ({}ms between requests)",
        service.name,
        delay.as_millis()
    );

    let stop = Arc::new(AtomicBool::new(false));
    let interrupt = spawn_interrupt_handler(Arc::clone(&stop));

    let outcome = execute(args, client, delay, &stop, || {
        ResolutionBar::start(multi, "Resolving regions")
    })
    .await;

    interrupt.abort();
    outcome.map(|_| ())
}

/// Listens for Ctrl-C for the whole run.
///
/// The first interrupt sets `stop`, which the resolver checks between
/// records. An interrupt arriving once `stop` is already set exits the
/// process immediately.
fn spawn_interrupt_handler(stop: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if stop.swap(true, Ordering::SeqCst) {
                log::warn!("Interrupted, exiting");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            log::warn!(
                "Interrupt received, stopping after the current record (press Ctrl-C again to exit now)"
            );
        }
    })
}

/// Runs every pipeline stage and returns the path of the results CSV.
///
/// Schema validation of the onboarding export happens before the region
/// cache is touched, so a missing column never leaves a partial cache
/// behind. When the export already carries regions the cache is neither
/// loaded nor saved. `stop` is checked between records during region
/// resolution; after that stage it is set, so any further interrupt is
/// treated as a request to exit.
///
/// # Errors
///
/// Returns an error if an input file is missing a required column or
/// cannot be read, the region cache is corrupt, resolution is interrupted,
/// or an export cannot be written.
pub async fn execute<G: ReverseGeocoder>(
    args: &RunArgs,
    geocoder: G,
    delay: Duration,
    stop: &AtomicBool,
    progress: impl FnOnce() -> Arc<dyn ProgressCallback>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let start = Instant::now();
    log::info!("=== Risk pipeline started ===");

    let flagged = load_flagged_devices(&args.flagged)?;
    let onboarding = load_onboarding(&args.onboarding)?;
    let mut records = filter_by_devices(onboarding.records, &flagged);

    if onboarding.has_region_column {
        log::info!("Export already has a REGION column, skipping region mapping");
    } else if args.no_geocode {
        log::info!("Region mapping disabled (--no-geocode)");
    } else {
        resolve_regions(args, geocoder, delay, &mut records, stop, progress()).await?;
    }
    stop.store(true, Ordering::SeqCst);

    let results = classify(&records);
    log::info!("Risk scoring complete for {} customers", results.len());

    report::print_cohorts(&cohort_scores(&results));
    report::print_regions(&region_scores(&results), args.top_n);
    match summarize(&results) {
        Ok(summary) => report::print_impact(&summary),
        Err(e) => log::warn!("{e}"),
    }

    std::fs::create_dir_all(&args.output_dir)?;

    if !args.skip_heatmap {
        export_heatmap(&args.output_dir.join(&args.heatmap), &records)?;
    }

    let results_path = args
        .output_dir
        .join(results_file_name(&chrono::Local::now().naive_local()));
    write_results_csv(&results_path, &results)?;

    log::info!(
        "=== Risk pipeline finished in {:.1}s; results in {} ===",
        start.elapsed().as_secs_f64(),
        results_path.display()
    );

    Ok(results_path)
}

/// Resolves regions for every record, loading and saving the cache around
/// the pass. The cache is saved even when the pass was stopped early.
async fn resolve_regions<G: ReverseGeocoder>(
    args: &RunArgs,
    geocoder: G,
    delay: Duration,
    records: &mut [DeviceRecord],
    stop: &AtomicBool,
    progress: Arc<dyn ProgressCallback>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache = RegionCache::load(&args.cache_path)?;
    let mut resolver = RegionResolver::new(geocoder, cache, delay);

    log::info!("Mapping coordinates to regions...");
    let stats = resolver.resolve_all(records, stop, &progress).await;

    log::info!(
        "Region mapping: {} resolved, {} from cache, {} looked up, {} failed, {} without location",
        stats.resolved,
        stats.cache_hits,
        stats.lookups,
        stats.failures,
        stats.no_location
    );

    resolver.into_cache().save(&args.cache_path)?;

    if stats.cancelled {
        return Err(
            "Region resolution interrupted; resolved coordinates were saved to the cache".into(),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use device_risk_geocoder::progress::null_progress;
    use device_risk_geocoder::{GeocodeError, ReverseAddress};

    use super::*;

    /// Answers every coordinate with a fixed city and optionally raises
    /// `stop` after a number of calls.
    struct CountingGeocoder {
        calls: AtomicUsize,
        stop_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl CountingGeocoder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                stop_after: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ReverseGeocoder for CountingGeocoder {
        async fn reverse(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<Option<ReverseAddress>, GeocodeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, flag)) = &self.stop_after
                && n >= *limit
            {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(Some(ReverseAddress {
                components: BTreeMap::from([("city".to_string(), "Bandung".to_string())]),
            }))
        }
    }

    fn work_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "device_risk_pipeline_{}_{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn args(dir: &Path, onboarding: &str) -> RunArgs {
        let flagged = dir.join("flagged.csv");
        std::fs::write(&flagged, "DEVICE_ID\nd1\nd2\n").unwrap();
        let onboarding_path = dir.join("onboarding.csv");
        std::fs::write(&onboarding_path, onboarding).unwrap();

        RunArgs {
            flagged,
            onboarding: onboarding_path,
            cache_path: dir.join("region_cache.json"),
            delay_ms: None,
            geocoder_url: None,
            language: None,
            no_geocode: false,
            output_dir: dir.join("out"),
            heatmap: PathBuf::from("heatmap.geojson"),
            skip_heatmap: true,
            top_n: 5,
        }
    }

    fn results_written(dir: &Path) -> bool {
        std::fs::read_dir(dir.join("out")).is_ok_and(|entries| {
            entries.filter_map(Result::ok).any(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("risk_scoring_per_cif_")
            })
        })
    }

    #[tokio::test]
    async fn region_column_bypasses_the_cache() {
        let dir = work_dir("region_column");
        let args = args(
            &dir,
            "DEVICE_ID,CIF,LATITUDE,LONGITUDE,CREATED_TIME,REGION\n\
             d1,C1,-6.9,107.6,2024-03-01,Bandung\n\
             d2,C2,-6.2,106.8,2024-03-01,Jakarta\n",
        );
        // Loading this would fail the run.
        std::fs::write(&args.cache_path, "not json").unwrap();

        let geocoder = CountingGeocoder::new();
        let results = execute(
            &args,
            Arc::clone(&geocoder),
            Duration::ZERO,
            &AtomicBool::new(false),
            null_progress,
        )
        .await
        .unwrap();

        assert!(results.exists());
        assert_eq!(geocoder.calls(), 0);
        assert_eq!(std::fs::read_to_string(&args.cache_path).unwrap(), "not json");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_column_fails_before_the_cache_is_touched() {
        let dir = work_dir("missing_column");
        let args = args(
            &dir,
            "DEVICE_ID,CIF,LATITUDE,CREATED_TIME\nd1,C1,-6.9,2024-03-01\n",
        );

        let geocoder = CountingGeocoder::new();
        let err = execute(
            &args,
            Arc::clone(&geocoder),
            Duration::ZERO,
            &AtomicBool::new(false),
            null_progress,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("LONGITUDE"), "{err}");
        assert_eq!(geocoder.calls(), 0);
        assert!(!args.cache_path.exists());
        assert!(!results_written(&dir));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn interrupted_resolution_saves_cache_and_skips_classification() {
        let dir = work_dir("interrupted");
        let args = args(
            &dir,
            "DEVICE_ID,CIF,LATITUDE,LONGITUDE,CREATED_TIME\n\
             d1,C1,-6.9,107.6,2024-03-01\n\
             d2,C2,-6.2,106.8,2024-03-01\n",
        );

        let stop = Arc::new(AtomicBool::new(false));
        let geocoder = Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            stop_after: Some((1, Arc::clone(&stop))),
        });
        let err = execute(
            &args,
            Arc::clone(&geocoder),
            Duration::ZERO,
            &stop,
            null_progress,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("interrupted"), "{err}");
        assert_eq!(geocoder.calls(), 1);
        let cache = RegionCache::load(&args.cache_path).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(!results_written(&dir));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn completed_run_persists_cache_and_results() {
        let dir = work_dir("completed");
        let args = args(
            &dir,
            "DEVICE_ID,CIF,LATITUDE,LONGITUDE,CREATED_TIME\n\
             d1,C1,-6.9,107.6,2024-03-01\n\
             d2,C1,-6.9,107.6,2024-04-01\n\
             d3,C9,-6.2,106.8,2024-03-01\n",
        );

        let stop = AtomicBool::new(false);
        let geocoder = CountingGeocoder::new();
        let results = execute(&args, Arc::clone(&geocoder), Duration::ZERO, &stop, null_progress)
            .await
            .unwrap();

        // d3 is not flagged; d1 and d2 share one rounded coordinate.
        assert_eq!(geocoder.calls(), 1);
        assert_eq!(RegionCache::load(&args.cache_path).unwrap().len(), 1);
        assert_eq!(
            std::fs::read_to_string(&results).unwrap(),
            "CIF,Risk_Score,Risk_Label,Region,Cohort\nC1,3,Critical,Bandung,2024-03\n"
        );
        assert!(stop.load(Ordering::SeqCst));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
