//! Cohort and region aggregates over classified customers.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use device_risk_models::{CohortStat, RegionStat, RiskResult, YearMonth};

/// Mean risk score per onboarding cohort, oldest cohort first.
///
/// Customers without a cohort are grouped together and listed last.
#[must_use]
pub fn cohort_scores(results: &[RiskResult]) -> Vec<CohortStat> {
    let mut groups: BTreeMap<Option<YearMonth>, (usize, u64)> = BTreeMap::new();
    for r in results {
        let entry = groups.entry(r.cohort).or_default();
        entry.0 += 1;
        entry.1 += u64::from(r.score);
    }

    let mut stats: Vec<CohortStat> = groups
        .into_iter()
        .map(|(cohort, (customers, total))| CohortStat {
            cohort,
            customers,
            mean_score: mean(total, customers),
        })
        .collect();

    // `None` sorts first in a BTreeMap; move it to the end.
    stats.sort_by_key(|s| (s.cohort.is_none(), s.cohort));
    stats
}

/// Region aggregates ranked two ways.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionScores {
    /// Regions by descending total risk score.
    pub by_total: Vec<RegionStat>,
    /// Regions by descending mean risk score per customer.
    pub by_mean: Vec<RegionStat>,
}

/// Sums and averages risk scores per dominant region.
///
/// Ties in either ranking are ordered by region name.
#[must_use]
pub fn region_scores(results: &[RiskResult]) -> RegionScores {
    let mut groups: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for r in results {
        let entry = groups.entry(r.region.as_str()).or_default();
        entry.0 += 1;
        entry.1 += u64::from(r.score);
    }

    let stats: Vec<RegionStat> = groups
        .into_iter()
        .map(|(region, (customers, total_score))| RegionStat {
            region: region.to_string(),
            customers,
            total_score,
            mean_score: mean(total_score, customers),
        })
        .collect();

    let mut by_total = stats.clone();
    by_total.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| a.region.cmp(&b.region))
    });

    let mut by_mean = stats;
    by_mean.sort_by(|a, b| {
        b.mean_score
            .partial_cmp(&a.mean_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.region.cmp(&b.region))
    });

    RegionScores { by_total, by_mean }
}

#[allow(clippy::cast_precision_loss)]
fn mean(total: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}
