//! Result and heatmap export.

use std::io::{BufWriter, Write as _};
use std::path::Path;

use chrono::NaiveDateTime;
use device_risk_models::{DeviceRecord, RiskResult};
use thiserror::Error;

/// Below this many located points the heatmap is flagged as thin.
pub const HEATMAP_MIN_POINTS: usize = 10;

/// Above this many located points the heatmap is flagged as heavy.
pub const HEATMAP_MAX_POINTS: usize = 10_000;

/// Errors writing export files.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Timestamped file name for the per-customer results export.
#[must_use]
pub fn results_file_name(now: &NaiveDateTime) -> String {
    format!("risk_scoring_per_cif_{}.csv", now.format("%Y%m%d_%H%M"))
}

/// Writes one row per customer with columns
/// `CIF,Risk_Score,Risk_Label,Region,Cohort`.
///
/// # Errors
///
/// Returns [`ExportError`] if the file cannot be written.
pub fn write_results_csv(path: &Path, results: &[RiskResult]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["CIF", "Risk_Score", "Risk_Label", "Region", "Cohort"])?;

    for r in results {
        let score = r.score.to_string();
        let cohort = r.cohort.map(|c| c.to_string()).unwrap_or_default();
        writer.write_record([
            r.cif.as_str(),
            score.as_str(),
            r.label.as_ref(),
            r.region.as_str(),
            cohort.as_str(),
        ])?;
    }

    writer.flush()?;
    log::info!(
        "Exported risk scores for {} customers to {}",
        results.len(),
        path.display()
    );
    Ok(())
}

/// Writes a `GeoJSON` `FeatureCollection` of every record with both
/// coordinates present, suitable for rendering as a heatmap layer.
///
/// Returns the number of points written.
///
/// # Errors
///
/// Returns [`ExportError`] if the file cannot be written.
pub fn export_heatmap(path: &Path, records: &[DeviceRecord]) -> Result<usize, ExportError> {
    log::info!("Exporting location heatmap...");

    let features: Vec<geojson::Feature> = records
        .iter()
        .filter_map(|r| {
            let (lat, lon) = (r.latitude?, r.longitude?);
            let mut properties = serde_json::Map::new();
            properties.insert("cif".to_string(), r.cif.clone().into());
            properties.insert(
                "device_id".to_string(),
                r.device_id.clone().map_or(serde_json::Value::Null, Into::into),
            );
            properties.insert(
                "region".to_string(),
                r.region.clone().map_or(serde_json::Value::Null, Into::into),
            );
            Some(geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![lon, lat]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect();

    let points = features.len();
    if points < HEATMAP_MIN_POINTS {
        log::warn!("Only {points} located records; the heatmap may not be representative");
    } else if points > HEATMAP_MAX_POINTS {
        log::warn!("{points} located records; rendering the heatmap may be slow");
    }

    let collection = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush()?;

    log::info!("Heatmap with {points} points saved to {}", path.display());
    Ok(points)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use device_risk_models::RiskLabel;

    use super::*;

    fn temp_path(name: &str, ext: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "device_risk_export_{}_{name}.{ext}",
            std::process::id()
        ))
    }

    #[test]
    fn results_file_name_is_timestamped() {
        let now = NaiveDate::from_ymd_opt(2025, 2, 7)
            .unwrap()
            .and_hms_opt(16, 5, 59)
            .unwrap();
        assert_eq!(results_file_name(&now), "risk_scoring_per_cif_20250207_1605.csv");
    }

    #[test]
    fn writes_results_csv() {
        let path = temp_path("results", "csv");
        let results = vec![
            RiskResult {
                cif: "C1".to_string(),
                score: 2,
                label: RiskLabel::MultiDevice,
                region: "Jakarta Selatan".to_string(),
                cohort: Some("2024-03".parse().unwrap()),
                months: 1,
                devices: 2,
            },
            RiskResult {
                cif: "C2".to_string(),
                score: 1,
                label: RiskLabel::Transient,
                region: "Unknown".to_string(),
                cohort: None,
                months: 0,
                devices: 1,
            },
        ];
        write_results_csv(&path, &results).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "CIF,Risk_Score,Risk_Label,Region,Cohort\n\
             C1,2,Multi-device,Jakarta Selatan,2024-03\n\
             C2,1,Transient,Unknown,\n"
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn heatmap_skips_records_without_coordinates() {
        let path = temp_path("heatmap", "geojson");
        let record = |lat: Option<f64>, lon: Option<f64>| DeviceRecord {
            device_id: Some("d1".to_string()),
            cif: "C1".to_string(),
            latitude: lat,
            longitude: lon,
            created_at: None,
            region: Some("Bandung".to_string()),
        };
        let points = export_heatmap(
            &path,
            &[
                record(Some(-6.9), Some(107.6)),
                record(None, Some(107.6)),
                record(Some(0.0), Some(0.0)),
            ],
        )
        .unwrap();
        assert_eq!(points, 2);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        let first = &json["features"][0];
        assert_eq!(first["geometry"]["coordinates"], serde_json::json!([107.6, -6.9]));
        assert_eq!(first["properties"]["region"], "Bandung");
        std::fs::remove_file(&path).unwrap();
    }
}
