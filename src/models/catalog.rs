use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Uuid,
    /// User that owns the restaurant and staffs its kitchen.
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub name: String,
    /// Minor currency units.
    pub price: i64,
    pub available: bool,
}
