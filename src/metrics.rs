use crate::types::{TripMetrics, WindowRow};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two lat/lon points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance travelled and average speed over one trip's window samples.
///
/// Samples are ordered by retrieval time internally, so the input order does
/// not matter. Pairs with a missing coordinate on either end contribute no
/// distance but still count toward the elapsed window. A single sample (or an
/// empty set) yields zero distance and zero speed.
pub fn distance_and_avg_speed<'a, I>(trip_id: &str, rows: I) -> TripMetrics
where
    I: IntoIterator<Item = &'a WindowRow>,
{
    let mut ordered: Vec<&WindowRow> = rows.into_iter().collect();
    ordered.sort_by_key(|row| row.retrieved_at);

    let mut total_km = 0.0;
    for pair in ordered.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        if let (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) =
            (prev.latitude, prev.longitude, curr.latitude, curr.longitude)
        {
            total_km += haversine_km(lat1, lon1, lat2, lon2);
        }
    }

    let elapsed_hours = match (ordered.first(), ordered.last()) {
        (Some(first), Some(last)) => {
            (last.retrieved_at - first.retrieved_at).num_seconds() as f64 / 3600.0
        }
        _ => 0.0,
    };
    let avg_kmh = if elapsed_hours > 0.0 {
        total_km / elapsed_hours
    } else {
        0.0
    };

    let last_position = ordered
        .iter()
        .rev()
        .find_map(|row| match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        });

    TripMetrics {
        trip_id: trip_id.to_string(),
        total_distance_km: round_to(total_km, 3),
        avg_speed_kmh: round_to(avg_kmh, 2),
        last_position,
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}
