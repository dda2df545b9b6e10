#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the `device_risk` binary.
//!
//! Region resolution is the only long pass in a run: at the public
//! geocoder's one-request-per-second pace a cold cache of a few thousand
//! coordinates takes about an hour. [`ResolutionBar`] renders that pass,
//! and [`init_logger`] keeps log lines from tearing through the bar.

use std::sync::Arc;
use std::time::Duration;

use device_risk_geocoder::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const BAR_TEMPLATE: &str =
    "  {msg} {wide_bar:.cyan/dim} {pos}/{len} records ({per_sec}) [{elapsed}<{eta}]";

/// Progress over the records of one region resolution pass.
///
/// Shows a spinner until the resolver reports how many records it will
/// walk, then a bar with throughput, which makes a cache-hit-heavy run
/// easy to tell apart from one paced by live lookups.
pub struct ResolutionBar {
    bar: ProgressBar,
    counting_style: ProgressStyle,
}

impl ResolutionBar {
    /// Adds a resolution bar to `multi`, labelled with `message`.
    #[must_use]
    pub fn start(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        let counting_style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        Arc::new(Self {
            bar,
            counting_style,
        })
    }
}

impl ProgressCallback for ResolutionBar {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counting_style.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the global logger and returns the [`MultiProgress`] every bar
/// of the run is drawn on.
///
/// Filters come from `RUST_LOG`; without it the pipeline logs at `info`,
/// which covers stage boundaries and the resolution counters. Output goes
/// through `indicatif-log-bridge` so a log line never lands in the middle
/// of a redrawing bar.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    let logger = builder.build();
    let level = logger.filter();

    // A second call (tests, embedding) keeps the first logger.
    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}
