use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Bicycle,
    Motorcycle,
    Car,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub vehicle_type: VehicleType,
    pub vehicle_plate: String,
    pub license_number: String,
    pub verification: VerificationStatus,
    pub is_online: bool,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DriverProfile {
    /// Verified, online and located: the only couriers offered new orders.
    pub fn is_matchable(&self) -> bool {
        self.verification == VerificationStatus::Verified && self.is_online && self.location.is_some()
    }

    pub fn set_location(&mut self, location: GeoPoint, now: DateTime<Utc>) {
        self.location = Some(location);
        self.location_updated_at = Some(now);
    }
}
