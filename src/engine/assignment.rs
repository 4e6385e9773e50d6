use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::engine::queue::MatchRequest;
use crate::error::AppError;
use crate::events::{
    order_rooms, DeliveryStatusUpdate, DriverAssigned, EventPublisher, LifecycleEvent,
    NewOrderAvailable, OrderEvent, Room,
};
use crate::geo::{distance_km, GeoPoint};
use crate::integrations::notification::{self, NotificationSink};
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::driver::{DriverProfile, VerificationStatus};
use crate::models::identity::{Actor, Role};
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct AvailableDelivery {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub distance_km: f64,
    pub restaurant_name: Option<String>,
    pub restaurant_address: Option<String>,
    pub delivery_fee: i64,
}

/// Owns deliveries: courier matching, claiming and status progression.
pub struct DeliveryAssignment {
    store: Arc<Store>,
    events: Arc<dyn EventPublisher>,
    notifier: Arc<dyn NotificationSink>,
    config: DispatchConfig,
    metrics: Metrics,
}

impl DeliveryAssignment {
    pub fn new(
        store: Arc<Store>,
        events: Arc<dyn EventPublisher>,
        notifier: Arc<dyn NotificationSink>,
        config: DispatchConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            events,
            notifier,
            config,
            metrics,
        }
    }

    /// Open deliveries whose drop-off lies within `radius_km`, nearest first.
    pub fn find_eligible_orders(&self, driver_location: &GeoPoint, radius_km: f64) -> Vec<AvailableDelivery> {
        let mut available: Vec<AvailableDelivery> = self
            .store
            .open_deliveries()
            .into_iter()
            .filter_map(|delivery| {
                let distance_km = distance_km(driver_location, &delivery.dropoff);
                if distance_km > radius_km {
                    return None;
                }

                let order = self.store.order(&delivery.order_id)?;
                let restaurant = self.store.restaurant(&order.restaurant_id);
                Some(AvailableDelivery {
                    distance_km,
                    restaurant_name: restaurant.as_ref().map(|r| r.name.clone()),
                    restaurant_address: restaurant.map(|r| r.address),
                    delivery_fee: order.delivery_fee,
                    delivery,
                })
            })
            .collect();

        available.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        available
    }

    pub fn available_for_driver(
        &self,
        actor: &Actor,
        radius_km: Option<f64>,
    ) -> Result<Vec<AvailableDelivery>, AppError> {
        let profile = self.driver_profile(actor)?;
        let location = profile.location.ok_or_else(|| {
            AppError::Validation("driver location not set; go online first".to_string())
        })?;

        let radius_km = radius_km.unwrap_or(self.config.available_orders_radius_km);
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::Validation("radius_km must be positive".to_string()));
        }

        Ok(self.find_eligible_orders(&location, radius_km))
    }

    /// Claims `delivery_id` for `driver_id`. Losing a race is reported as
    /// `NoLongerAvailable`.
    pub fn assign(&self, delivery_id: Uuid, driver_id: Uuid) -> Result<Delivery, AppError> {
        let delivery = match self.store.claim_delivery(&delivery_id, driver_id, Utc::now()) {
            Ok(delivery) => delivery,
            Err(AppError::NoLongerAvailable(id)) => {
                self.metrics
                    .assignment_attempts_total
                    .with_label_values(&["lost_race"])
                    .inc();
                info!(delivery_id = %delivery_id, driver_id = %driver_id, "delivery already claimed");
                return Err(AppError::NoLongerAvailable(id));
            }
            Err(err) => return Err(err),
        };

        self.metrics
            .assignment_attempts_total
            .with_label_values(&["assigned"])
            .inc();
        info!(delivery_id = %delivery.id, order_id = %delivery.order_id, driver_id = %driver_id, "driver assigned");

        let mut rooms = vec![Room::Order(delivery.order_id)];
        if let Some(order) = self.store.order(&delivery.order_id) {
            rooms.push(Room::Customer(order.customer_id));
        }
        self.events.publish(
            &rooms,
            &LifecycleEvent::DriverAssigned(DriverAssigned {
                order_id: delivery.order_id,
                delivery_id: delivery.id,
                driver_id,
                status: delivery.status,
                assigned_at: delivery.assigned_at.unwrap_or_else(Utc::now),
            }),
        );

        Ok(delivery)
    }

    pub fn accept(&self, actor: &Actor, delivery_id: Uuid) -> Result<Delivery, AppError> {
        let profile = self.driver_profile(actor)?;
        if profile.verification != VerificationStatus::Verified {
            return Err(AppError::Forbidden("driver is not verified".to_string()));
        }

        self.assign(delivery_id, profile.id)
    }

    /// Advances a delivery along its state machine on behalf of its courier.
    ///
    /// `IN_TRANSIT` and `DELIVERED` also move the parent order; both writes
    /// happen under the delivery's lock, and neither happens if the order
    /// rejects the change.
    pub fn update_delivery_status(
        &self,
        delivery_id: Uuid,
        driver_id: Uuid,
        new_status: DeliveryStatus,
    ) -> Result<Delivery, AppError> {
        if self.store.delivery(&delivery_id).is_none() {
            return Err(AppError::NotFound(format!("delivery {delivery_id} not found")));
        }

        let now = Utc::now();
        let (delivery, synced_order) = {
            let mut entry = self
                .store
                .deliveries
                .get_mut(&delivery_id)
                .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

            if entry.driver_id != Some(driver_id) {
                return Err(AppError::NotYourDelivery(delivery_id.to_string()));
            }

            let mut next = entry.clone();
            next.transition(new_status, now)?;

            let synced_order = match new_status {
                DeliveryStatus::InTransit | DeliveryStatus::Delivered => {
                    let mut order = self.store.orders.get_mut(&next.order_id).ok_or_else(|| {
                        AppError::NotFound(format!("order {} not found", next.order_id))
                    })?;
                    let changed = order.sync_from_delivery(new_status, now)?;
                    changed.then(|| order.clone())
                }
                _ => None,
            };

            *entry = next.clone();
            (next, synced_order)
        };

        if delivery.status.is_terminal() {
            self.store.release_driver(&driver_id, &delivery.id);
        }

        info!(delivery_id = %delivery.id, status = %delivery.status, "delivery status updated");

        self.events.publish(
            &[Room::Order(delivery.order_id)],
            &LifecycleEvent::DeliveryStatusUpdate(DeliveryStatusUpdate {
                order_id: delivery.order_id,
                delivery_id: delivery.id,
                status: delivery.status,
                timestamp: now,
            }),
        );

        if let Some(order) = synced_order {
            self.metrics
                .order_transitions_total
                .with_label_values(&[order.status.as_str()])
                .inc();
            self.events.publish(
                &order_rooms(&order),
                &LifecycleEvent::OrderUpdated(OrderEvent::from(&order)),
            );
            notification::order_update(&self.notifier, order.customer_id, order.id, order.status.as_str());
        }

        Ok(delivery)
    }

    pub fn update_for_actor(
        &self,
        actor: &Actor,
        delivery_id: Uuid,
        new_status: DeliveryStatus,
    ) -> Result<Delivery, AppError> {
        let profile = self.driver_profile(actor)?;
        self.update_delivery_status(delivery_id, profile.id, new_status)
    }

    /// Pushes `driver:new_order` to every matchable courier near the drop-off.
    ///
    /// Advisory only: couriers still have to claim the delivery.
    pub fn notify_nearby_drivers(&self, request: &MatchRequest) -> usize {
        let still_open = self
            .store
            .delivery(&request.delivery_id)
            .is_some_and(|delivery| delivery.is_claimable());
        if !still_open {
            debug!(delivery_id = %request.delivery_id, "delivery no longer open; skipping match");
            return 0;
        }

        let mut notified = 0;
        for driver in self.store.matchable_drivers() {
            let Some(location) = driver.location else {
                continue;
            };

            let distance_km = distance_km(&location, &request.dropoff);
            if distance_km > self.config.driver_match_radius_km {
                continue;
            }

            self.events.publish(
                &[Room::Driver(driver.id)],
                &LifecycleEvent::NewOrderAvailable(NewOrderAvailable {
                    delivery_id: request.delivery_id,
                    order_id: request.order_id,
                    restaurant_id: request.restaurant_id,
                    distance_km,
                    delivery_fee: request.delivery_fee,
                }),
            );
            notified += 1;
        }

        notified
    }

    fn driver_profile(&self, actor: &Actor) -> Result<DriverProfile, AppError> {
        if actor.role != Role::Driver {
            warn!(user_id = %actor.user_id, "non-driver attempted a courier operation");
            return Err(AppError::Forbidden("courier role required".to_string()));
        }

        self.store
            .driver_for_user(&actor.user_id)
            .ok_or_else(|| AppError::NotFound("driver profile not found".to_string()))
    }
}
