use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One vehicle-position sample as written by ingestion. Immutable once stored;
/// old rows age out of relevance through the windowed queries.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    pub sample_id: Uuid,
    pub entity_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub schedule_relationship: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub vehicle_id: Option<String>,
    /// Free-text vehicle label; the first token is the scheduled start "HH:MM".
    pub label: Option<String>,
    pub retrieved_at: DateTime<Utc>,
}

/// Route display metadata from the schedule reference data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub route_id: String,
    pub route_short_name: String,
    pub route_long_name: Option<String>,
    pub route_color: Option<String>,
}

/// A position sample joined against its route metadata, as returned by the
/// trailing-window query.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WindowRow {
    pub sample_id: Uuid,
    pub entity_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub schedule_relationship: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub vehicle_id: Option<String>,
    pub label: Option<String>,
    pub retrieved_at: DateTime<Utc>,
    pub route_short_name: String,
    pub route_long_name: Option<String>,
    pub route_color: Option<String>,
}

impl WindowRow {
    pub fn route_info(&self) -> RouteInfo {
        RouteInfo {
            route_id: self.route_id.clone(),
            route_short_name: self.route_short_name.clone(),
            route_long_name: self.route_long_name.clone(),
            route_color: self.route_color.clone(),
        }
    }
}

/// A GTFS service-day time: seconds since midnight of the service day.
/// Values at or past 86400 belong to the following calendar day
/// (the GTFS "25:10:00" convention for trips running past midnight).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ServiceTime(i32);

impl ServiceTime {
    pub fn from_seconds(seconds: i32) -> Self {
        Self(seconds)
    }

    pub fn seconds(self) -> i32 {
        self.0
    }

    /// Parse "HH:MM:SS" or "HH:MM"; hours may exceed 24.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(':');
        let hours: i32 = parts.next()?.parse().ok()?;
        let minutes: i32 = parts.next()?.parse().ok()?;
        let seconds: i32 = match parts.next() {
            Some(s) => s.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
            return None;
        }
        Some(Self(hours * 3600 + minutes * 60 + seconds))
    }

    /// Whole days past the service day this time spills into.
    pub fn rollover_days(self) -> u64 {
        (self.0 / 86_400).max(0) as u64
    }

    /// Time-of-day component with any rollover removed.
    pub fn time_of_day(self) -> NaiveTime {
        let wrapped = self.0.rem_euclid(86_400) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(wrapped, 0)
            .unwrap_or(NaiveTime::MIN)
    }

    /// Anchor this service time to a concrete local timestamp on the given
    /// service day, rolling times past 24:00:00 into the following day.
    pub fn on_service_day(self, service_day: NaiveDate, tz: Tz) -> Option<DateTime<Tz>> {
        let date = service_day.checked_add_days(Days::new(self.rollover_days()))?;
        date.and_time(self.time_of_day())
            .and_local_timezone(tz)
            .earliest()
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.rem_euclid(86_400);
        write!(
            f,
            "{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    }
}

/// One scheduled stop of a trip. The highest stop_sequence row is the final
/// stop of the run.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ScheduleStop {
    pub trip_id: String,
    pub stop_sequence: i32,
    pub arrival_time: ServiceTime,
    pub departure_time: ServiceTime,
}

/// A persisted delayed-trip row. Present iff the most recent cycle classified
/// the trip as stalled.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DelayedTrip {
    pub trip_id: String,
    pub route_name: Option<String>,
    pub trip_start: NaiveTime,
    pub trip_end: NaiveTime,
    pub active: bool,
    pub map_link: Option<String>,
    pub idle_minutes: i32,
    pub is_idle: bool,
}

/// Per-trip travel metrics derived from the trailing window. Recomputed every
/// cycle, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TripMetrics {
    pub trip_id: String,
    pub total_distance_km: f64,
    pub avg_speed_kmh: f64,
    pub last_position: Option<(f64, f64)>,
}
