use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::delivery::DeliveryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn allowed_targets(self) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[OutForDelivery, Cancelled],
            OutForDelivery => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_targets().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line item with its price frozen at placement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub menu_item_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub delivery_address: Option<String>,
    pub delivery_location: Option<GeoPoint>,
    pub delivery_id: Option<Uuid>,
    pub status: OrderStatus,
    pub status_history: Vec<StatusChange>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewOrder {
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub delivery_address: Option<String>,
    pub delivery_location: Option<GeoPoint>,
    pub delivery_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl Order {
    pub fn new(id: Uuid, params: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_id: params.customer_id,
            restaurant_id: params.restaurant_id,
            items: params.items,
            subtotal: params.subtotal,
            delivery_fee: params.delivery_fee,
            total: params.subtotal + params.delivery_fee,
            delivery_address: params.delivery_address,
            delivery_location: params.delivery_location,
            delivery_id: params.delivery_id,
            status: OrderStatus::Pending,
            status_history: vec![StatusChange {
                status: OrderStatus::Pending,
                at: now,
            }],
            notes: params.notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Single point where order status changes are validated and applied.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::AlreadyTerminal(format!(
                "order {} is already {}",
                self.id, self.status
            )));
        }

        if !self.status.can_transition_to(next) {
            let allowed = self
                .status
                .allowed_targets()
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AppError::InvalidTransition(format!(
                "{} -> {next}; allowed: {allowed}",
                self.status
            )));
        }

        self.status = next;
        self.updated_at = now;
        self.status_history.push(StatusChange { status: next, at: now });
        Ok(())
    }

    /// Mirrors a courier-reported delivery status onto the order.
    ///
    /// Returns `true` when the order status changed. Repeating a status the
    /// order already has is a no-op.
    pub fn sync_from_delivery(
        &mut self,
        delivery_status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let target = match delivery_status {
            DeliveryStatus::InTransit => OrderStatus::OutForDelivery,
            DeliveryStatus::Delivered => OrderStatus::Delivered,
            _ => return Ok(false),
        };

        if self.status == target {
            return Ok(false);
        }

        self.transition(target, now)?;
        Ok(true)
    }

    pub fn is_delivery(&self) -> bool {
        self.delivery_id.is_some()
    }
}
