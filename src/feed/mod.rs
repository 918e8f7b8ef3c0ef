use crate::types::PositionSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod mock;
pub mod replay;

/// Route ids the upstream feed uses as placeholders for unassigned runs.
/// Samples carrying them are dropped at ingestion.
pub const PLACEHOLDER_ROUTE_IDS: [&str; 2] = ["RTTA_REV", "RTTA_DEF"];

/// One decoded vehicle-position record as handed over by the feed
/// collaborator. Decoding the wire format happens upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub entity_id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub schedule_relationship: i32,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub retrieved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read feed payload: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to decode feed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Source of decoded vehicle-position records for one poll.
pub trait FeedSource {
    fn poll(&mut self) -> Result<Vec<VehicleRecord>, FeedError>;
}

fn is_placeholder_route(route_id: &str) -> bool {
    PLACEHOLDER_ROUTE_IDS.contains(&route_id)
}

/// Turn one poll's records into storable samples. Records without a trip or
/// route assignment, or carrying a placeholder route, are dropped; each kept
/// record gets a fresh sample id. `polled_at` stamps records the feed did not
/// timestamp itself.
pub fn prepare_samples(records: Vec<VehicleRecord>, polled_at: DateTime<Utc>) -> Vec<PositionSample> {
    records
        .into_iter()
        .filter_map(|record| {
            let trip_id = record.trip_id.filter(|id| !id.is_empty())?;
            let route_id = record
                .route_id
                .filter(|id| !id.is_empty() && !is_placeholder_route(id))?;
            Some(PositionSample {
                sample_id: Uuid::new_v4(),
                entity_id: record.entity_id,
                trip_id,
                route_id,
                schedule_relationship: record.schedule_relationship,
                latitude: record.latitude,
                longitude: record.longitude,
                vehicle_id: record.vehicle_id,
                label: record.label,
                retrieved_at: record.retrieved_at.unwrap_or(polled_at),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(entity_id: &str, trip_id: Option<&str>, route_id: Option<&str>) -> VehicleRecord {
        VehicleRecord {
            entity_id: entity_id.to_string(),
            trip_id: trip_id.map(str::to_string),
            route_id: route_id.map(str::to_string),
            schedule_relationship: 0,
            latitude: Some(-33.8675),
            longitude: Some(151.2070),
            vehicle_id: Some("vehicle-1".to_string()),
            label: Some("08:00 Central to Hornsby".to_string()),
            retrieved_at: None,
        }
    }

    #[test]
    fn keeps_assigned_records_and_stamps_poll_time() {
        let polled_at = Utc.with_ymd_and_hms(2025, 8, 15, 8, 0, 0).unwrap();
        let records = vec![record("e1", Some("T100"), Some("NSN_2a"))];

        let samples = prepare_samples(records, polled_at);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].trip_id, "T100");
        assert_eq!(samples[0].route_id, "NSN_2a");
        assert_eq!(samples[0].retrieved_at, polled_at);
    }

    #[test]
    fn drops_placeholder_and_unassigned_routes() {
        let polled_at = Utc.with_ymd_and_hms(2025, 8, 15, 8, 0, 0).unwrap();
        let records = vec![
            record("e1", Some("T100"), Some("RTTA_REV")),
            record("e2", Some("T101"), Some("RTTA_DEF")),
            record("e3", Some("T102"), Some("")),
            record("e4", Some("T103"), None),
            record("e5", None, Some("NSN_2a")),
            record("e6", Some("T104"), Some("NSN_2a")),
        ];

        let samples = prepare_samples(records, polled_at);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].trip_id, "T104");
    }

    #[test]
    fn feed_timestamps_take_precedence() {
        let polled_at = Utc.with_ymd_and_hms(2025, 8, 15, 8, 0, 0).unwrap();
        let stamped = Utc.with_ymd_and_hms(2025, 8, 15, 7, 59, 30).unwrap();
        let mut rec = record("e1", Some("T100"), Some("NSN_2a"));
        rec.retrieved_at = Some(stamped);

        let samples = prepare_samples(vec![rec], polled_at);

        assert_eq!(samples[0].retrieved_at, stamped);
    }

    #[test]
    fn sample_ids_are_unique() {
        let polled_at = Utc.with_ymd_and_hms(2025, 8, 15, 8, 0, 0).unwrap();
        let records = vec![
            record("e1", Some("T100"), Some("NSN_2a")),
            record("e2", Some("T100"), Some("NSN_2a")),
        ];

        let samples = prepare_samples(records, polled_at);

        assert_ne!(samples[0].sample_id, samples[1].sample_id);
    }
}
