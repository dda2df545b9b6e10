//! Per-customer risk classification.

use std::collections::{BTreeMap, BTreeSet};

use device_risk_models::{DeviceRecord, RiskLabel, RiskResult, UNKNOWN_REGION, YearMonth};

/// Maps activity-month and device cardinality onto a risk tier.
///
/// | months | devices | label |
/// |---|---|---|
/// | 1 | 1 | Transient |
/// | >1 | 1 | Persistent |
/// | 1 | >1 | Multi-device |
/// | >1 | >1 | Critical |
///
/// Anything outside the table (a customer with no valid month, for
/// instance) falls back to `Transient`.
#[must_use]
pub const fn decide(months: usize, devices: usize) -> RiskLabel {
    match (months, devices) {
        (m, d) if m > 1 && d > 1 => RiskLabel::Critical,
        (m, 1) if m > 1 => RiskLabel::Persistent,
        (1, d) if d > 1 => RiskLabel::MultiDevice,
        _ => RiskLabel::Transient,
    }
}

/// Classifies every customer in `records`.
///
/// Returns one [`RiskResult`] per distinct CIF, ordered by CIF. The
/// output does not depend on the order of `records`.
#[must_use]
pub fn classify(records: &[DeviceRecord]) -> Vec<RiskResult> {
    let mut groups: BTreeMap<&str, Vec<&DeviceRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.cif.as_str()).or_default().push(record);
    }

    log::debug!(
        "Classifying {} customers from {} records",
        groups.len(),
        records.len()
    );

    groups
        .into_iter()
        .map(|(cif, group)| classify_customer(cif, &group))
        .collect()
}

fn classify_customer(cif: &str, group: &[&DeviceRecord]) -> RiskResult {
    let periods: BTreeSet<YearMonth> = group.iter().filter_map(|r| r.period()).collect();

    let device_ids: BTreeSet<&str> = group
        .iter()
        .filter_map(|r| r.device_id.as_deref())
        .collect();
    // A group with no device identifiers at all is one unidentified device.
    let devices = device_ids.len().max(1);

    let cohort = group
        .iter()
        .filter_map(|r| r.created_at)
        .min()
        .map(|earliest| YearMonth::of(&earliest));

    let label = decide(periods.len(), devices);

    RiskResult {
        cif: cif.to_string(),
        score: label.score(),
        label,
        region: dominant_region(group),
        cohort,
        months: periods.len(),
        devices,
    }
}

/// Most frequent non-null region in the group.
///
/// Ties go to the lexicographically smallest name so the answer does not
/// depend on row order. [`UNKNOWN_REGION`] if no record carries a region.
fn dominant_region(group: &[&DeviceRecord]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for region in group.iter().filter_map(|r| r.region.as_deref()) {
        *counts.entry(region).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (region, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((region, count));
        }
    }

    best.map_or_else(|| UNKNOWN_REGION.to_string(), |(region, _)| region.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn rec(cif: &str, device: &str, date: Option<(i32, u32, u32)>, region: Option<&str>) -> DeviceRecord {
        DeviceRecord {
            device_id: Some(device.to_string()),
            cif: cif.to_string(),
            latitude: Some(-6.2),
            longitude: Some(106.8),
            created_at: date.map(|(y, m, d)| {
                NaiveDate::from_ymd_opt(y, m, d)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap()
            }),
            region: region.map(str::to_string),
        }
    }

    fn only(results: &[RiskResult], cif: &str) -> RiskResult {
        results.iter().find(|r| r.cif == cif).unwrap().clone()
    }

    #[test]
    fn decision_table_is_exhaustive() {
        assert_eq!(decide(1, 1), RiskLabel::Transient);
        assert_eq!(decide(2, 1), RiskLabel::Persistent);
        assert_eq!(decide(5, 1), RiskLabel::Persistent);
        assert_eq!(decide(1, 2), RiskLabel::MultiDevice);
        assert_eq!(decide(1, 7), RiskLabel::MultiDevice);
        assert_eq!(decide(2, 2), RiskLabel::Critical);
        assert_eq!(decide(12, 3), RiskLabel::Critical);
    }

    #[test]
    fn zero_valid_months_falls_back_to_transient() {
        assert_eq!(decide(0, 1), RiskLabel::Transient);
        assert_eq!(decide(0, 4), RiskLabel::Transient);
        assert_eq!(decide(3, 0), RiskLabel::Transient);
    }

    #[test]
    fn empty_input_yields_no_results() {
        assert!(classify(&[]).is_empty());
    }

    #[test]
    fn same_month_same_device_is_transient() {
        let results = classify(&[
            rec("C1", "D1", Some((2024, 3, 2)), Some("Bandung")),
            rec("C1", "D1", Some((2024, 3, 28)), Some("Bandung")),
        ]);
        let c1 = only(&results, "C1");
        assert_eq!((c1.months, c1.devices), (1, 1));
        assert_eq!(c1.score, 1);
        assert_eq!(c1.label, RiskLabel::Transient);
    }

    #[test]
    fn two_months_same_device_is_persistent() {
        let results = classify(&[
            rec("C2", "D1", Some((2024, 1, 15)), None),
            rec("C2", "D1", Some((2024, 3, 15)), None),
        ]);
        let c2 = only(&results, "C2");
        assert_eq!((c2.months, c2.devices), (2, 1));
        assert_eq!(c2.score, 2);
        assert_eq!(c2.label, RiskLabel::Persistent);
    }

    #[test]
    fn same_month_two_devices_is_multi_device() {
        let results = classify(&[
            rec("C3", "D1", Some((2024, 3, 1)), None),
            rec("C3", "D2", Some((2024, 3, 9)), None),
        ]);
        let c3 = only(&results, "C3");
        assert_eq!((c3.months, c3.devices), (1, 2));
        assert_eq!(c3.score, 2);
        assert_eq!(c3.label, RiskLabel::MultiDevice);
    }

    #[test]
    fn two_months_two_devices_is_critical() {
        let results = classify(&[
            rec("C4", "D1", Some((2024, 1, 3)), None),
            rec("C4", "D2", Some((2024, 3, 3)), None),
        ]);
        let c4 = only(&results, "C4");
        assert_eq!((c4.months, c4.devices), (2, 2));
        assert_eq!(c4.score, 3);
        assert_eq!(c4.label, RiskLabel::Critical);
    }

    #[test]
    fn one_result_per_customer_ordered_by_cif() {
        let results = classify(&[
            rec("B", "D1", Some((2024, 1, 1)), None),
            rec("A", "D2", Some((2024, 1, 1)), None),
            rec("B", "D1", Some((2024, 1, 2)), None),
            rec("C", "D3", None, None),
        ]);
        let cifs: Vec<_> = results.iter().map(|r| r.cif.as_str()).collect();
        assert_eq!(cifs, ["A", "B", "C"]);
    }

    #[test]
    fn missing_timestamps_are_excluded_from_months_but_not_fatal() {
        let results = classify(&[
            rec("C5", "D1", None, None),
            rec("C5", "D1", Some((2024, 2, 10)), None),
            rec("C6", "D1", None, None),
            rec("C6", "D2", None, None),
        ]);
        let c5 = only(&results, "C5");
        assert_eq!(c5.months, 1);
        assert_eq!(c5.label, RiskLabel::Transient);
        assert_eq!(c5.cohort.map(|c| c.to_string()).as_deref(), Some("2024-02"));

        let c6 = only(&results, "C6");
        assert_eq!((c6.months, c6.devices), (0, 2));
        assert_eq!(c6.label, RiskLabel::Transient);
        assert_eq!(c6.cohort, None);
    }

    #[test]
    fn cohort_is_month_of_earliest_record() {
        let results = classify(&[
            rec("C7", "D1", Some((2024, 5, 1)), None),
            rec("C7", "D1", Some((2023, 11, 30)), None),
            rec("C7", "D1", Some((2024, 2, 14)), None),
        ]);
        let c7 = only(&results, "C7");
        assert_eq!(c7.cohort.map(|c| c.to_string()).as_deref(), Some("2023-11"));
        assert_eq!(c7.months, 3);
    }

    #[test]
    fn blank_device_ids_count_as_one_device() {
        let mut a = rec("C8", "x", Some((2024, 1, 1)), None);
        let mut b = rec("C8", "x", Some((2024, 2, 1)), None);
        a.device_id = None;
        b.device_id = None;
        let c8 = only(&classify(&[a, b]), "C8");
        assert_eq!(c8.devices, 1);
        assert_eq!(c8.label, RiskLabel::Persistent);
    }

    #[test]
    fn region_is_most_frequent_non_null() {
        let results = classify(&[
            rec("C9", "D1", Some((2024, 1, 1)), Some("Bekasi")),
            rec("C9", "D1", Some((2024, 1, 2)), Some("Jakarta Timur")),
            rec("C9", "D1", Some((2024, 1, 3)), None),
            rec("C9", "D1", Some((2024, 1, 4)), Some("Jakarta Timur")),
        ]);
        assert_eq!(only(&results, "C9").region, "Jakarta Timur");
    }

    #[test]
    fn region_is_unknown_when_all_null() {
        let results = classify(&[rec("C10", "D1", Some((2024, 1, 1)), None)]);
        assert_eq!(only(&results, "C10").region, UNKNOWN_REGION);
    }

    #[test]
    fn region_ties_go_to_smallest_name_regardless_of_row_order() {
        let forward = [
            rec("C11", "D1", Some((2024, 1, 1)), Some("Surabaya")),
            rec("C11", "D1", Some((2024, 1, 2)), Some("Malang")),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(only(&classify(&forward), "C11").region, "Malang");
        assert_eq!(only(&classify(&reversed), "C11").region, "Malang");
    }

    #[test]
    fn unknown_sentinel_counts_as_a_region() {
        let results = classify(&[
            rec("C12", "D1", Some((2024, 1, 1)), Some(UNKNOWN_REGION)),
            rec("C12", "D1", Some((2024, 1, 2)), Some(UNKNOWN_REGION)),
            rec("C12", "D1", Some((2024, 1, 3)), Some("Medan")),
        ]);
        assert_eq!(only(&results, "C12").region, UNKNOWN_REGION);
    }

    #[test]
    fn classification_ignores_input_order() {
        let records = vec![
            rec("C1", "D1", Some((2024, 1, 1)), Some("A")),
            rec("C2", "D2", Some((2024, 2, 1)), Some("B")),
            rec("C1", "D3", Some((2024, 4, 1)), Some("B")),
            rec("C2", "D2", Some((2024, 2, 5)), Some("B")),
        ];
        let mut shuffled = records.clone();
        shuffled.rotate_left(3);
        assert_eq!(classify(&records), classify(&shuffled));
    }
}
