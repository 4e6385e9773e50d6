use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::router::{ConnectionId, RoomRouter};
use crate::events::{LifecycleEvent, Room, TrackingUpdate};
use crate::geo::GeoPoint;
use crate::models::identity::{Actor, Role};
use crate::store::Store;

/// Messages a websocket client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "join:restaurant")]
    JoinRestaurant { restaurant_id: Uuid },
    #[serde(rename = "leave:restaurant")]
    LeaveRestaurant { restaurant_id: Uuid },
    #[serde(rename = "join:customer")]
    JoinCustomer { customer_id: Uuid },
    #[serde(rename = "leave:customer")]
    LeaveCustomer { customer_id: Uuid },
    #[serde(rename = "join:driver")]
    JoinDriver { driver_id: Uuid },
    #[serde(rename = "leave:driver")]
    LeaveDriver { driver_id: Uuid },
    #[serde(rename = "join:order")]
    JoinOrder { order_id: Uuid },
    #[serde(rename = "leave:order")]
    LeaveOrder { order_id: Uuid },
    #[serde(rename = "driver:location_update")]
    LocationUpdate { lat: f64, lng: f64 },
}

/// Direct replies to a single connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerMessage {
    Joined { room: Room },
    Left { room: Room },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Applies client messages: room membership checks and courier location relay.
pub struct SubscriptionHandler {
    store: Arc<Store>,
    rooms: Arc<RoomRouter>,
}

impl SubscriptionHandler {
    pub fn new(store: Arc<Store>, rooms: Arc<RoomRouter>) -> Self {
        Self { store, rooms }
    }

    /// Handles one message; returns the reply for the sender, if any.
    pub fn handle(&self, connection: ConnectionId, actor: &Actor, message: ClientMessage) -> Option<ServerMessage> {
        let result = match message {
            ClientMessage::JoinRestaurant { restaurant_id } => {
                self.join(connection, actor, Room::Restaurant(restaurant_id))
            }
            ClientMessage::JoinCustomer { customer_id } => {
                self.join(connection, actor, Room::Customer(customer_id))
            }
            ClientMessage::JoinDriver { driver_id } => {
                self.join(connection, actor, Room::Driver(driver_id))
            }
            ClientMessage::JoinOrder { order_id } => self.join(connection, actor, Room::Order(order_id)),
            ClientMessage::LeaveRestaurant { restaurant_id } => {
                Ok(self.leave(connection, Room::Restaurant(restaurant_id)))
            }
            ClientMessage::LeaveCustomer { customer_id } => {
                Ok(self.leave(connection, Room::Customer(customer_id)))
            }
            ClientMessage::LeaveDriver { driver_id } => Ok(self.leave(connection, Room::Driver(driver_id))),
            ClientMessage::LeaveOrder { order_id } => Ok(self.leave(connection, Room::Order(order_id))),
            ClientMessage::LocationUpdate { lat, lng } => {
                self.relay_location(connection, actor, GeoPoint::new(lat, lng))
                    .map(|_| None)
            }
        };

        match result {
            Ok(reply) => reply,
            Err(err) => {
                debug!(connection_id = connection, error = %err, "client message rejected");
                Some(ServerMessage::error(err.to_string()))
            }
        }
    }

    fn join(&self, connection: ConnectionId, actor: &Actor, room: Room) -> Result<Option<ServerMessage>, AppError> {
        self.authorize(actor, &room)?;
        if !self.rooms.join(connection, room) {
            return Ok(None);
        }
        Ok(Some(ServerMessage::Joined { room }))
    }

    fn leave(&self, connection: ConnectionId, room: Room) -> Option<ServerMessage> {
        self.rooms.leave(connection, &room);
        Some(ServerMessage::Left { room })
    }

    /// Rooms are readable only by the parties to what they track.
    fn authorize(&self, actor: &Actor, room: &Room) -> Result<(), AppError> {
        let allowed = match room {
            Room::Restaurant(restaurant_id) => {
                actor.is_admin()
                    || (actor.role == Role::Kitchen
                        && self
                            .store
                            .restaurant(restaurant_id)
                            .is_some_and(|restaurant| restaurant.owner_id == actor.user_id))
            }
            Room::Customer(customer_id) => *customer_id == actor.user_id,
            Room::Driver(driver_id) => {
                actor.role == Role::Driver
                    && self
                        .store
                        .driver_for_user(&actor.user_id)
                        .is_some_and(|profile| profile.id == *driver_id)
            }
            Room::Order(order_id) => self.can_follow_order(actor, order_id),
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("not allowed to join {room}")))
        }
    }

    fn can_follow_order(&self, actor: &Actor, order_id: &Uuid) -> bool {
        let Some(order) = self.store.order(order_id) else {
            return false;
        };
        if actor.is_admin() || order.customer_id == actor.user_id {
            return true;
        }

        let owns_restaurant = self
            .store
            .restaurant(&order.restaurant_id)
            .is_some_and(|restaurant| restaurant.owner_id == actor.user_id);
        if owns_restaurant {
            return true;
        }

        let Some(profile) = self.store.driver_for_user(&actor.user_id) else {
            return false;
        };
        order
            .delivery_id
            .and_then(|delivery_id| self.store.delivery(&delivery_id))
            .is_some_and(|delivery| delivery.driver_id == Some(profile.id))
    }

    /// Records the courier's position and forwards it to whoever follows the
    /// order it is currently delivering.
    fn relay_location(&self, connection: ConnectionId, actor: &Actor, location: GeoPoint) -> Result<(), AppError> {
        if actor.role != Role::Driver {
            return Err(AppError::Forbidden("only couriers report location".to_string()));
        }
        if !location.is_valid() {
            return Err(AppError::Validation("invalid coordinates".to_string()));
        }

        let profile = self
            .store
            .driver_for_user(&actor.user_id)
            .ok_or_else(|| AppError::NotFound("driver profile not found".to_string()))?;

        let now = Utc::now();
        self.store
            .update_driver(&profile.id, |driver| driver.set_location(location, now))?;

        let Some(delivery) = self.store.active_delivery_for_driver(&profile.id) else {
            return Ok(());
        };

        let delivered = self.rooms.publish_except(
            &[Room::Order(delivery.order_id)],
            &LifecycleEvent::TrackingUpdate(TrackingUpdate {
                order_id: delivery.order_id,
                driver_id: profile.id,
                lat: location.lat,
                lng: location.lng,
                timestamp: now,
            }),
            Some(connection),
        );
        if delivered == 0 {
            warn!(order_id = %delivery.order_id, "tracking update had no listeners");
        }
        Ok(())
    }
}
