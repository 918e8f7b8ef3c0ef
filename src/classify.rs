use crate::types::{ScheduleStop, TripMetrics};
use chrono::{DateTime, NaiveTime};
use chrono_tz::Tz;

/// Where a trip sits in its lifecycle for the current cycle. Re-derived every
/// cycle; the only persisted trip state is the delayed-trip table.
#[derive(Debug, Clone, PartialEq)]
pub enum TripStatus {
    /// Moving during the window; never a delay candidate.
    Active,
    /// Zero displacement but the scheduled start is still ahead.
    NotYetStarted,
    /// Zero displacement and the final scheduled arrival has passed.
    Ended,
    /// Inconsistent data for this trip; excluded from tracking this cycle.
    Invalid(InvalidReason),
    /// Started, not ended, and not moving: a delay candidate.
    Stalled(DelayDraft),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvalidReason {
    /// No usable "HH:MM" start token in the vehicle label.
    StartLabel,
    /// No schedule rows exist for the trip.
    MissingSchedule,
}

/// What a stalled trip contributes to delay-tracking reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayDraft {
    pub trip_id: String,
    pub route_name: Option<String>,
    pub trip_start: NaiveTime,
    pub trip_end: NaiveTime,
    pub map_link: Option<String>,
}

/// Scheduled start parsed from the first token of a vehicle label.
pub fn start_from_label(label: Option<&str>) -> Option<NaiveTime> {
    let token = label?.split_whitespace().next()?;
    NaiveTime::parse_from_str(token, "%H:%M").ok()
}

pub fn map_link(position: Option<(f64, f64)>) -> Option<String> {
    position.map(|(lat, lon)| format!("https://www.google.com/maps?q={lat},{lon}"))
}

/// Decide one trip's lifecycle state for this cycle.
///
/// Zero average speed alone cannot distinguish a train waiting at the depot
/// from one genuinely stuck, so the scheduled start and final arrival bound
/// the stalled classification on both sides. `final_stop` is the trip's
/// highest-sequence schedule row, or None when the trip has no schedule data.
pub fn classify_trip(
    metrics: &TripMetrics,
    label: Option<&str>,
    route_name: Option<&str>,
    final_stop: Option<&ScheduleStop>,
    now: DateTime<Tz>,
) -> TripStatus {
    if metrics.avg_speed_kmh != 0.0 {
        return TripStatus::Active;
    }

    let Some(trip_start) = start_from_label(label) else {
        return TripStatus::Invalid(InvalidReason::StartLabel);
    };
    let tz = now.timezone();
    let service_day = now.date_naive();
    let Some(start_at) = service_day
        .and_time(trip_start)
        .and_local_timezone(tz)
        .earliest()
    else {
        return TripStatus::Invalid(InvalidReason::StartLabel);
    };
    if now < start_at {
        return TripStatus::NotYetStarted;
    }

    let Some(stop) = final_stop else {
        return TripStatus::Invalid(InvalidReason::MissingSchedule);
    };
    let Some(end_at) = stop.arrival_time.on_service_day(service_day, tz) else {
        return TripStatus::Invalid(InvalidReason::MissingSchedule);
    };
    if now >= end_at {
        return TripStatus::Ended;
    }

    TripStatus::Stalled(DelayDraft {
        trip_id: metrics.trip_id.clone(),
        route_name: route_name.map(str::to_string),
        trip_start,
        trip_end: stop.arrival_time.time_of_day(),
        map_link: map_link(metrics.last_position),
    })
}

impl TripStatus {
    /// Whether the trip keeps its metrics entry in the display output.
    /// Mirrors the tracking rules: moving and stalled trips are shown with
    /// speeds, the rest fall back to an empty metrics slot.
    pub fn retains_metrics(&self) -> bool {
        matches!(self, TripStatus::Active | TripStatus::Stalled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServiceTime;
    use chrono::TimeZone;
    use chrono_tz::Australia::Sydney;

    fn metrics(avg_speed_kmh: f64) -> TripMetrics {
        TripMetrics {
            trip_id: "T100".to_string(),
            total_distance_km: if avg_speed_kmh > 0.0 { 3.2 } else { 0.0 },
            avg_speed_kmh,
            last_position: Some((-33.80, 151.20)),
        }
    }

    fn final_stop(arrival: &str) -> ScheduleStop {
        ScheduleStop {
            trip_id: "T100".to_string(),
            stop_sequence: 24,
            arrival_time: ServiceTime::parse(arrival).expect("arrival time"),
            departure_time: ServiceTime::parse(arrival).expect("departure time"),
        }
    }

    fn sydney(h: u32, m: u32) -> DateTime<Tz> {
        Sydney.with_ymd_and_hms(2025, 8, 15, h, m, 0).unwrap()
    }

    #[test]
    fn moving_trip_is_active() {
        let status = classify_trip(
            &metrics(45.2),
            Some("08:00 Central to Hornsby"),
            Some("North Shore Line"),
            Some(&final_stop("23:00:00")),
            sydney(8, 5),
        );
        assert_eq!(status, TripStatus::Active);
    }

    #[test]
    fn future_start_is_not_yet_started() {
        let status = classify_trip(
            &metrics(0.0),
            Some("09:30 Central to Hornsby"),
            None,
            Some(&final_stop("23:00:00")),
            sydney(8, 5),
        );
        assert_eq!(status, TripStatus::NotYetStarted);
    }

    #[test]
    fn started_and_not_ended_is_stalled() {
        let status = classify_trip(
            &metrics(0.0),
            Some("08:00 Central to Hornsby"),
            Some("North Shore Line"),
            Some(&final_stop("23:00:00")),
            sydney(8, 5),
        );
        match status {
            TripStatus::Stalled(draft) => {
                assert_eq!(draft.trip_id, "T100");
                assert_eq!(draft.route_name.as_deref(), Some("North Shore Line"));
                assert_eq!(draft.trip_start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
                assert_eq!(draft.trip_end, NaiveTime::from_hms_opt(23, 0, 0).unwrap());
                assert_eq!(
                    draft.map_link.as_deref(),
                    Some("https://www.google.com/maps?q=-33.8,151.2")
                );
            }
            other => panic!("expected stalled, got {other:?}"),
        }
    }

    #[test]
    fn passed_final_arrival_is_ended() {
        let status = classify_trip(
            &metrics(0.0),
            Some("08:00 Central to Hornsby"),
            None,
            Some(&final_stop("09:00:00")),
            sydney(9, 30),
        );
        assert_eq!(status, TripStatus::Ended);
    }

    #[test]
    fn missing_schedule_is_invalid() {
        let status = classify_trip(
            &metrics(0.0),
            Some("08:00 Central to Hornsby"),
            None,
            None,
            sydney(8, 5),
        );
        assert_eq!(status, TripStatus::Invalid(InvalidReason::MissingSchedule));
    }

    #[test]
    fn unparseable_label_is_invalid() {
        for label in [None, Some(""), Some("Hornsby via Strathfield"), Some("8am run")] {
            let status = classify_trip(
                &metrics(0.0),
                label,
                None,
                Some(&final_stop("23:00:00")),
                sydney(8, 5),
            );
            assert_eq!(
                status,
                TripStatus::Invalid(InvalidReason::StartLabel),
                "label {label:?}"
            );
        }
    }

    #[test]
    fn arrival_past_midnight_counts_as_next_day() {
        // 25:10 service time means 01:10 tomorrow; at 23:30 today the trip
        // has not ended yet.
        let status = classify_trip(
            &metrics(0.0),
            Some("23:00 Central to Hornsby"),
            None,
            Some(&final_stop("25:10:00")),
            sydney(23, 30),
        );
        assert!(matches!(status, TripStatus::Stalled(_)));
    }

    #[test]
    fn moving_trip_skips_schedule_checks_entirely() {
        // no label and no schedule rows, but the trip is moving
        let status = classify_trip(&metrics(62.8), None, None, None, sydney(8, 5));
        assert_eq!(status, TripStatus::Active);
    }
}
