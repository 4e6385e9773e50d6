//! Lifecycle events and the rooms they are routed to.

pub mod router;
pub mod subscriptions;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::models::delivery::DeliveryStatus;
use crate::models::order::{Order, OrderItem, OrderStatus};
use crate::models::payment::{PaymentMethod, PaymentStatus};

/// A named subscription channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Restaurant(Uuid),
    Customer(Uuid),
    Driver(Uuid),
    Order(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Restaurant(id) => write!(f, "restaurant:{id}"),
            Room::Customer(id) => write!(f, "customer:{id}"),
            Room::Driver(id) => write!(f, "driver:{id}"),
            Room::Order(id) => write!(f, "order:{id}"),
        }
    }
}

impl Serialize for Room {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub restaurant_id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub items: Vec<OrderItem>,
    pub delivery_address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderEvent {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            restaurant_id: order.restaurant_id,
            customer_id: order.customer_id,
            status: order.status,
            subtotal: order.subtotal,
            delivery_fee: order.delivery_fee,
            total: order.total,
            items: order.items.clone(),
            delivery_address: order.delivery_address.clone(),
            notes: order.notes.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewOrderAvailable {
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    pub restaurant_id: Uuid,
    pub distance_km: f64,
    pub delivery_fee: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverAssigned {
    pub order_id: Uuid,
    pub delivery_id: Uuid,
    pub driver_id: Uuid,
    pub status: DeliveryStatus,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStatusUpdate {
    pub order_id: Uuid,
    pub delivery_id: Uuid,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingUpdate {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentUpdated {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub reference: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum LifecycleEvent {
    #[serde(rename = "order:created")]
    OrderCreated(OrderEvent),
    #[serde(rename = "order:updated")]
    OrderUpdated(OrderEvent),
    #[serde(rename = "order:cancelled")]
    OrderCancelled(OrderEvent),
    #[serde(rename = "driver:new_order")]
    NewOrderAvailable(NewOrderAvailable),
    #[serde(rename = "order:driver_assigned")]
    DriverAssigned(DriverAssigned),
    #[serde(rename = "delivery:status_update")]
    DeliveryStatusUpdate(DeliveryStatusUpdate),
    #[serde(rename = "order:tracking_update")]
    TrackingUpdate(TrackingUpdate),
    #[serde(rename = "payment:updated")]
    PaymentUpdated(PaymentUpdated),
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::OrderCreated(_) => "order:created",
            LifecycleEvent::OrderUpdated(_) => "order:updated",
            LifecycleEvent::OrderCancelled(_) => "order:cancelled",
            LifecycleEvent::NewOrderAvailable(_) => "driver:new_order",
            LifecycleEvent::DriverAssigned(_) => "order:driver_assigned",
            LifecycleEvent::DeliveryStatusUpdate(_) => "delivery:status_update",
            LifecycleEvent::TrackingUpdate(_) => "order:tracking_update",
            LifecycleEvent::PaymentUpdated(_) => "payment:updated",
        }
    }
}

/// Fire-and-forget publication of lifecycle events.
///
/// Implementations log delivery problems themselves; callers never see them,
/// so a failed publish cannot unwind a state change that already happened.
pub trait EventPublisher: Send + Sync {
    /// Delivers `event` once to every connection subscribed to any of `rooms`.
    fn publish(&self, rooms: &[Room], event: &LifecycleEvent);
}

/// Rooms that follow an order: its restaurant, its customer and its tracking room.
pub fn order_rooms(order: &Order) -> [Room; 3] {
    [
        Room::Restaurant(order.restaurant_id),
        Room::Customer(order.customer_id),
        Room::Order(order.id),
    ]
}
