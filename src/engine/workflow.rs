use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::pricing::{LineItemRequest, PricingEngine};
use crate::engine::queue::{MatchQueue, MatchRequest};
use crate::error::AppError;
use crate::events::{order_rooms, EventPublisher, LifecycleEvent, OrderEvent, Room};
use crate::geo::{is_within_range, validate_and_geocode};
use crate::integrations::notification::{self, NotificationSink};
use crate::models::catalog::Restaurant;
use crate::models::delivery::Delivery;
use crate::models::identity::Actor;
use crate::models::order::{NewOrder, Order, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    pub restaurant_id: Uuid,
    pub items: Vec<LineItemRequest>,
    pub delivery_address: Option<String>,
    pub notes: Option<String>,
}

/// Owns orders and their status workflow.
///
/// Event fan-out and courier matching are handed in at construction; both are
/// fire-and-forget relative to the state change that triggers them.
pub struct OrderWorkflow {
    store: Arc<Store>,
    pricing: PricingEngine,
    events: Arc<dyn EventPublisher>,
    matcher: MatchQueue,
    notifier: Arc<dyn NotificationSink>,
    metrics: Metrics,
}

impl OrderWorkflow {
    pub fn new(
        store: Arc<Store>,
        pricing: PricingEngine,
        events: Arc<dyn EventPublisher>,
        matcher: MatchQueue,
        notifier: Arc<dyn NotificationSink>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            pricing,
            events,
            matcher,
            notifier,
            metrics,
        }
    }

    pub async fn create_order(&self, customer: &Actor, request: PlaceOrder) -> Result<Order, AppError> {
        let restaurant = self
            .store
            .restaurant(&request.restaurant_id)
            .ok_or_else(|| AppError::NotFound(format!("restaurant {} not found", request.restaurant_id)))?;

        let item_ids: Vec<Uuid> = request.items.iter().map(|line| line.menu_item_id).collect();
        let catalog = self.store.catalog_for(&restaurant.id, &item_ids);
        let priced = self.pricing.compute_subtotal(&request.items, &catalog)?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let delivery = match request.delivery_address.as_deref() {
            Some(address) => {
                let geocoded = validate_and_geocode(address)?;
                let range = is_within_range(
                    &restaurant.location,
                    &geocoded.location,
                    self.pricing.max_delivery_km(),
                );
                if !range.within_range {
                    return Err(AppError::OutOfRange {
                        distance_km: range.distance_km,
                        max_km: self.pricing.max_delivery_km(),
                    });
                }

                Some((
                    Delivery::new(
                        Uuid::new_v4(),
                        order_id,
                        restaurant.location,
                        geocoded.location,
                        geocoded.address,
                        now,
                    ),
                    range.distance_km,
                ))
            }
            None => None,
        };

        let delivery_fee = self
            .pricing
            .compute_delivery_fee(delivery.as_ref().map(|(_, distance_km)| *distance_km));
        let delivery = delivery.map(|(delivery, _)| delivery);

        let order = Order::new(
            order_id,
            NewOrder {
                customer_id: customer.user_id,
                restaurant_id: restaurant.id,
                items: priced.items,
                subtotal: priced.subtotal,
                delivery_fee,
                delivery_address: delivery.as_ref().map(|d| d.address.clone()),
                delivery_location: delivery.as_ref().map(|d| d.dropoff),
                delivery_id: delivery.as_ref().map(|d| d.id),
                notes: request.notes.filter(|notes| !notes.trim().is_empty()),
            },
            now,
        );

        self.store.place_order(order.clone(), delivery.clone());
        self.metrics.orders_placed_total.inc();
        info!(
            order_id = %order.id,
            restaurant_id = %order.restaurant_id,
            total = order.total,
            delivery = delivery.is_some(),
            "order placed"
        );

        self.events.publish(
            &[Room::Restaurant(order.restaurant_id), Room::Customer(order.customer_id)],
            &LifecycleEvent::OrderCreated(OrderEvent::from(&order)),
        );

        if let Some(delivery) = delivery {
            let request = MatchRequest {
                delivery_id: delivery.id,
                order_id: order.id,
                restaurant_id: order.restaurant_id,
                dropoff: delivery.dropoff,
                delivery_fee: order.delivery_fee,
            };
            if let Err(err) = self.matcher.enqueue(request).await {
                warn!(order_id = %order.id, error = %err, "failed to queue courier matching");
            }
        }

        Ok(order)
    }

    pub fn list_mine(&self, actor: &Actor) -> Vec<Order> {
        self.store.orders_for_customer(&actor.user_id)
    }

    /// Visible to the customer, the restaurant owner, the assigned courier and admins.
    pub fn get(&self, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.load(order_id)?;
        if actor.is_admin() || order.customer_id == actor.user_id {
            return Ok(order);
        }

        let restaurant = self.restaurant_of(&order)?;
        if restaurant.owner_id == actor.user_id || self.is_assigned_courier(actor, &order) {
            return Ok(order);
        }

        Err(AppError::Forbidden("you do not have access to this order".to_string()))
    }

    pub fn list_for_restaurant(
        &self,
        actor: &Actor,
        restaurant_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, AppError> {
        let restaurant = self
            .store
            .restaurant(&restaurant_id)
            .ok_or_else(|| AppError::NotFound(format!("restaurant {restaurant_id} not found")))?;

        if !actor.is_admin() && restaurant.owner_id != actor.user_id {
            return Err(AppError::Forbidden("you do not own this restaurant".to_string()));
        }

        Ok(self.store.orders_for_restaurant(&restaurant_id, status))
    }

    pub fn update_status(
        &self,
        actor: &Actor,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Order, AppError> {
        let order = self.load(order_id)?;
        let restaurant = self.restaurant_of(&order)?;
        if !actor.is_admin() && restaurant.owner_id != actor.user_id {
            return Err(AppError::Forbidden("you do not own this restaurant".to_string()));
        }

        let now = Utc::now();
        let updated = self.store.update_order(&order_id, |order| {
            if order.is_delivery()
                && matches!(new_status, OrderStatus::OutForDelivery | OrderStatus::Delivered)
                && !order.status.is_terminal()
            {
                return Err(AppError::InvalidTransition(format!(
                    "{} -> {new_status}; delivery orders advance from the courier's status",
                    order.status
                )));
            }
            order.transition(new_status, now)
        })?;

        self.metrics
            .order_transitions_total
            .with_label_values(&[new_status.as_str()])
            .inc();
        info!(order_id = %order_id, status = %new_status, "order status updated");

        let mut rooms = order_rooms(&updated).to_vec();
        if new_status == OrderStatus::Cancelled {
            if let Some(driver_id) = self.release_delivery(&updated) {
                rooms.push(Room::Driver(driver_id));
            }
        }

        self.events.publish(
            &rooms,
            &LifecycleEvent::OrderUpdated(OrderEvent::from(&updated)),
        );
        notification::order_update(&self.notifier, updated.customer_id, updated.id, new_status.as_str());

        Ok(updated)
    }

    /// Customers may cancel only while the kitchen has not started; the
    /// restaurant owner and admins may cancel any non-terminal order.
    pub fn cancel(&self, actor: &Actor, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.load(order_id)?;
        let restaurant = self.restaurant_of(&order)?;

        let is_customer = order.customer_id == actor.user_id;
        let is_staff = actor.is_admin() || restaurant.owner_id == actor.user_id;
        if !is_customer && !is_staff {
            return Err(AppError::Forbidden("you cannot cancel this order".to_string()));
        }

        let now = Utc::now();
        let cancelled = self.store.update_order(&order_id, |order| {
            if order.status.is_terminal() {
                return Err(AppError::AlreadyTerminal(format!(
                    "order {} is already {}",
                    order.id, order.status
                )));
            }
            if !is_staff && !matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed) {
                return Err(AppError::Forbidden(
                    "customers can only cancel orders that are PENDING or CONFIRMED".to_string(),
                ));
            }
            order.transition(OrderStatus::Cancelled, now)
        })?;

        self.metrics
            .order_transitions_total
            .with_label_values(&[OrderStatus::Cancelled.as_str()])
            .inc();
        info!(order_id = %order_id, cancelled_by = %actor.user_id, "order cancelled");

        let mut rooms = order_rooms(&cancelled).to_vec();
        if let Some(driver_id) = self.release_delivery(&cancelled) {
            rooms.push(Room::Driver(driver_id));
        }
        self.events.publish(
            &rooms,
            &LifecycleEvent::OrderCancelled(OrderEvent::from(&cancelled)),
        );

        Ok(cancelled)
    }

    /// Cancels the order's delivery, returning the courier that held it.
    fn release_delivery(&self, order: &Order) -> Option<Uuid> {
        let delivery = self.store.cancel_delivery_of(order, Utc::now())?;
        info!(delivery_id = %delivery.id, order_id = %order.id, "delivery cancelled with order");
        delivery.driver_id
    }

    fn load(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.store
            .order(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }

    fn restaurant_of(&self, order: &Order) -> Result<Restaurant, AppError> {
        self.store
            .restaurant(&order.restaurant_id)
            .ok_or_else(|| AppError::NotFound(format!("restaurant {} not found", order.restaurant_id)))
    }

    fn is_assigned_courier(&self, actor: &Actor, order: &Order) -> bool {
        let Some(profile) = self.store.driver_for_user(&actor.user_id) else {
            return false;
        };
        order
            .delivery_id
            .and_then(|delivery_id| self.store.delivery(&delivery_id))
            .is_some_and(|delivery| delivery.driver_id == Some(profile.id))
    }
}
