use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const MIN_ADDRESS_LEN: usize = 5;

// Anchor for mock geocoding; every address lands within ~0.1 degrees of it.
const GEOCODE_ANCHOR: GeoPoint = GeoPoint {
    lat: 6.5244,
    lng: 3.3792,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodedAddress {
    pub address: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeCheck {
    pub within_range: bool,
    pub distance_km: f64,
}

/// Great-circle distance in kilometres, rounded to two decimals.
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    round2(haversine_km(a, b))
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn is_within_range(origin: &GeoPoint, destination: &GeoPoint, max_km: f64) -> RangeCheck {
    let distance_km = distance_km(origin, destination);
    RangeCheck {
        within_range: distance_km <= max_km,
        distance_km,
    }
}

/// Validates a free-form address and resolves it to a stable coordinate.
///
/// There is no live geocoder behind this: the coordinate is derived from a
/// hash of the normalized text, so the same address always maps to the same
/// point.
pub fn validate_and_geocode(address: &str) -> Result<GeocodedAddress, AppError> {
    let normalized = normalize_address(address);

    if normalized.chars().count() < MIN_ADDRESS_LEN {
        return Err(AppError::InvalidAddress(format!(
            "address must be at least {MIN_ADDRESS_LEN} characters"
        )));
    }

    let offset = f64::from(address_hash(&normalized) % 1000) / 10_000.0;

    Ok(GeocodedAddress {
        location: GeoPoint {
            lat: GEOCODE_ANCHOR.lat + offset,
            lng: GEOCODE_ANCHOR.lng + offset,
        },
        address: normalized,
    })
}

fn normalize_address(address: &str) -> String {
    address.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn address_hash(text: &str) -> u32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        })
        .unsigned_abs()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
