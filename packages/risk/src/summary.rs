//! Impacted-customer summary.

use std::collections::BTreeMap;

use device_risk_models::{ImpactSummary, RiskLabel, RiskResult};
use thiserror::Error;

/// Errors producing an [`ImpactSummary`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    /// There are no customers to take percentages of.
    #[error("No customers classified; impact percentages are undefined")]
    NoCustomers,
}

/// Counts customers by tier and computes the transient vs. non-transient
/// split.
///
/// Every count is taken over distinct CIFs. If a CIF appears more than once
/// its first result is the one counted, so the two percentages always sum
/// to 100.
///
/// # Errors
///
/// Returns [`SummaryError::NoCustomers`] for an empty result set instead
/// of dividing by zero.
pub fn summarize(results: &[RiskResult]) -> Result<ImpactSummary, SummaryError> {
    let mut labels: BTreeMap<&str, RiskLabel> = BTreeMap::new();
    for r in results {
        labels.entry(r.cif.as_str()).or_insert(r.label);
    }

    let total = labels.len();
    if total == 0 {
        return Err(SummaryError::NoCustomers);
    }

    let count = |label: RiskLabel| labels.values().filter(|&&l| l == label).count();
    let transient_count = count(RiskLabel::Transient);
    let non_transient_count = total - transient_count;

    Ok(ImpactSummary {
        total,
        transient_count,
        non_transient_count,
        transient_pct: percent(transient_count, total),
        non_transient_pct: percent(non_transient_count, total),
        by_label: RiskLabel::all()
            .iter()
            .map(|&label| (label, count(label)))
            .collect(),
    })
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, total: usize) -> f64 {
    part as f64 / total as f64 * 100.0
}
