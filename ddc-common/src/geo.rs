//! Great-circle distance and linear interpolation helpers shared by the dispatcher's
//! feasibility checks and the drone simulator's movement ticks.

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine distance in kilometers between two points.
pub fn haversine_km(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Component-wise linear interpolation toward `target` at fraction `speed` of the remaining gap.
pub fn step_toward(from: LatLon, target: LatLon, speed: f64) -> LatLon {
    LatLon::new(
        from.lat + speed * (target.lat - from.lat),
        from.lon + speed * (target.lon - from.lon),
    )
}

/// True once both axes are within `eps` degrees of the target — used to decide a drone has
/// effectively reached its charge point.
pub fn close_enough(from: LatLon, target: LatLon, eps: f64) -> bool {
    (from.lat - target.lat).abs() <= eps && (from.lon - target.lon).abs() <= eps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_same_point() {
        let p = LatLon::new(41.9, 12.5);
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Rome to Naples, roughly 190km apart.
        let rome = LatLon::new(41.9028, 12.4964);
        let naples = LatLon::new(40.8518, 14.2681);
        let d = haversine_km(rome, naples);
        assert!((180.0..=210.0).contains(&d), "got {d}");
    }

    #[test]
    fn step_toward_reaches_target_at_speed_one() {
        let from = LatLon::new(0.0, 0.0);
        let target = LatLon::new(1.0, -1.0);
        let next = step_toward(from, target, 1.0);
        assert_eq!(next, target);
    }

    #[test]
    fn step_toward_partial_speed_moves_proportionally() {
        let from = LatLon::new(0.0, 0.0);
        let target = LatLon::new(10.0, 0.0);
        let next = step_toward(from, target, 0.25);
        assert!((next.lat - 2.5).abs() < 1e-9);
    }
}
