//! Console tables for a finished run.

use device_risk_models::{CohortStat, ImpactSummary};
use device_risk_scoring::analysis::RegionScores;

pub fn print_impact(summary: &ImpactSummary) {
    println!();
    println!("=== Impacted customers ===");
    println!("Total customers:        {}", summary.total);
    println!(
        "Transient:              {} ({:.1}%)",
        summary.transient_count, summary.transient_pct
    );
    println!(
        "Persistent or higher:   {} ({:.1}%)",
        summary.non_transient_count, summary.non_transient_pct
    );
    println!();
    println!("{:<14} {:>10}", "LABEL", "CUSTOMERS");
    println!("{}", "-".repeat(25));
    for (label, count) in &summary.by_label {
        println!("{:<14} {count:>10}", label.as_ref());
    }
}

pub fn print_cohorts(cohorts: &[CohortStat]) {
    if cohorts.is_empty() {
        return;
    }

    println!();
    println!("=== Mean risk score by onboarding cohort ===");
    println!("{:<10} {:>10} {:>10}", "COHORT", "CUSTOMERS", "MEAN");
    println!("{}", "-".repeat(32));
    for stat in cohorts {
        let cohort = stat
            .cohort
            .map_or_else(|| "(none)".to_string(), |c| c.to_string());
        println!(
            "{cohort:<10} {:>10} {:>10.2}",
            stat.customers, stat.mean_score
        );
    }
}

pub fn print_regions(scores: &RegionScores, top_n: usize) {
    if scores.by_total.is_empty() {
        return;
    }

    println!();
    println!("=== Top {top_n} regions by total risk score ===");
    println!("{:<30} {:>10} {:>8}", "REGION", "CUSTOMERS", "TOTAL");
    println!("{}", "-".repeat(50));
    for stat in scores.by_total.iter().take(top_n) {
        println!(
            "{:<30} {:>10} {:>8}",
            stat.region, stat.customers, stat.total_score
        );
    }

    println!();
    println!("=== Top {top_n} regions by mean risk score ===");
    println!("{:<30} {:>10} {:>8}", "REGION", "CUSTOMERS", "MEAN");
    println!("{}", "-".repeat(50));
    for stat in scores.by_mean.iter().take(top_n) {
        println!(
            "{:<30} {:>10} {:>8.2}",
            stat.region, stat.customers, stat.mean_score
        );
    }
}
