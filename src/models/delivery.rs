use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn allowed_targets(self) -> &'static [DeliveryStatus] {
        use DeliveryStatus::*;

        match self {
            Pending => &[Assigned, Cancelled],
            Assigned => &[InTransit, Cancelled],
            InTransit => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    /// A courier holding a delivery in one of these states is busy.
    pub fn is_active(self) -> bool {
        matches!(self, DeliveryStatus::Assigned | DeliveryStatus::InTransit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::InTransit => "IN_TRANSIT",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub address: String,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn new(
        id: Uuid,
        order_id: Uuid,
        pickup: GeoPoint,
        dropoff: GeoPoint,
        address: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            driver_id: None,
            pickup,
            dropoff,
            address,
            status: DeliveryStatus::Pending,
            created_at: now,
            assigned_at: None,
            completed_at: None,
        }
    }

    pub fn is_claimable(&self) -> bool {
        self.status == DeliveryStatus::Pending && self.driver_id.is_none()
    }

    pub fn transition(&mut self, next: DeliveryStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::AlreadyTerminal(format!(
                "delivery {} is already {}",
                self.id, self.status
            )));
        }

        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "delivery {} -> {next}",
                self.status
            )));
        }

        self.status = next;
        if next == DeliveryStatus::Delivered {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}
