use crate::types::WindowRow;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Travel summary attached to a trip in the display output. Built from
/// the trip's window metrics; trips excluded from evaluation have none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripSummary {
    pub trip_id: String,
    pub total_km: f64,
    pub avg_kmh: f64,
    pub map_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainEntry {
    pub trip_id: String,
    pub avg_speed: Option<f64>,
    pub map_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripGroup {
    pub route_id: String,
    pub route_name: Option<String>,
    pub train_data: Vec<TrainEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteGroup {
    pub route_name: String,
    pub route_colour: Option<String>,
    pub trip_data: Vec<TripGroup>,
}

/// Group window rows into the nested display structure: short route name at
/// the top, route id under it, one train entry per distinct trip.
///
/// Rows arrive ordered by (short name, trip id, retrieval time desc); the
/// first row seen for a trip wins and later duplicates are skipped, so each
/// train entry reflects the trip's newest sample.
pub fn build_route_groups(rows: &[WindowRow], summaries: &[TripSummary]) -> Vec<RouteGroup> {
    let by_trip: HashMap<&str, &TripSummary> = summaries
        .iter()
        .map(|summary| (summary.trip_id.as_str(), summary))
        .collect();

    let mut groups: Vec<RouteGroup> = Vec::new();
    let mut processed: HashSet<&str> = HashSet::new();

    for row in rows {
        if row.route_short_name.is_empty() || !processed.insert(row.trip_id.as_str()) {
            continue;
        }

        let route = row.route_info();
        let group_index = groups
            .iter()
            .position(|g| g.route_name == route.route_short_name)
            .unwrap_or_else(|| {
                groups.push(RouteGroup {
                    route_name: route.route_short_name.clone(),
                    route_colour: route.route_color.clone(),
                    trip_data: Vec::new(),
                });
                groups.len() - 1
            });
        let group = &mut groups[group_index];

        let trip_index = group
            .trip_data
            .iter()
            .position(|t| t.route_id == route.route_id)
            .unwrap_or_else(|| {
                group.trip_data.push(TripGroup {
                    route_id: route.route_id.clone(),
                    route_name: route.route_long_name.clone(),
                    train_data: Vec::new(),
                });
                group.trip_data.len() - 1
            });
        let trips = &mut group.trip_data[trip_index];

        let summary = by_trip.get(row.trip_id.as_str());
        trips.train_data.push(TrainEntry {
            trip_id: row.trip_id.clone(),
            avg_speed: summary.map(|s| s.avg_kmh),
            map_link: summary.and_then(|s| s.map_link.clone()),
        });
    }

    groups
}
