use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, String> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(format!("latitude {lat} must be within [-90, 90]"));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(format!("longitude {lng} must be within [-180, 180]"));
        }

        Ok(Self { lat, lng })
    }

    /// Re-checks a point that arrived through deserialization.
    pub fn validated(self) -> Result<Self, String> {
        Self::new(self.lat, self.lng)
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Straight-line length of a stop sequence. Stops without coordinates are
/// skipped and counted so callers can flag them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteLength {
    pub distance_km: f64,
    pub unlocated_stops: usize,
}

pub fn route_length<'a, I>(stops: I) -> RouteLength
where
    I: IntoIterator<Item = Option<&'a GeoPoint>>,
{
    let mut distance_km = 0.0;
    let mut unlocated_stops = 0;
    let mut previous: Option<&GeoPoint> = None;

    for stop in stops {
        match stop {
            Some(point) => {
                if let Some(prev) = previous {
                    distance_km += haversine_km(prev, point);
                }
                previous = Some(point);
            }
            None => unlocated_stops += 1,
        }
    }

    RouteLength {
        distance_km,
        unlocated_stops,
    }
}
