//! In-memory persistence.
//!
//! Every map is a `DashMap`, so a mutation only locks the shard holding the
//! entity it touches. Where a method needs guards on more than one map it
//! takes them in this order and never the reverse:
//!
//! `wallets -> orders -> payment_by_order -> payments` and
//! `active_by_driver -> deliveries -> orders`.

pub mod seed;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::catalog::{MenuItem, Restaurant};
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::driver::DriverProfile;
use crate::models::order::{Order, OrderStatus};
use crate::models::payment::{Payment, PaymentStatus};

#[derive(Default)]
pub struct Store {
    pub restaurants: DashMap<Uuid, Restaurant>,
    pub menu_items: DashMap<Uuid, MenuItem>,
    pub orders: DashMap<Uuid, Order>,
    pub deliveries: DashMap<Uuid, Delivery>,
    pub drivers: DashMap<Uuid, DriverProfile>,
    pub payments: DashMap<Uuid, Payment>,
    /// Customer wallet balances in minor units.
    pub wallets: DashMap<Uuid, i64>,
    driver_by_user: DashMap<Uuid, Uuid>,
    payment_refs: DashMap<String, Uuid>,
    payment_by_order: DashMap<Uuid, Uuid>,
    /// Driver id -> the delivery it currently holds.
    active_by_driver: DashMap<Uuid, Uuid>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- catalog ----

    pub fn insert_restaurant(&self, restaurant: Restaurant) {
        self.restaurants.insert(restaurant.id, restaurant);
    }

    pub fn insert_menu_item(&self, item: MenuItem) {
        self.menu_items.insert(item.id, item);
    }

    pub fn restaurant(&self, id: &Uuid) -> Option<Restaurant> {
        self.restaurants.get(id).map(|entry| entry.value().clone())
    }

    /// Looks up the requested items, keeping only those on `restaurant_id`'s menu.
    pub fn catalog_for(&self, restaurant_id: &Uuid, item_ids: &[Uuid]) -> HashMap<Uuid, MenuItem> {
        item_ids
            .iter()
            .filter_map(|id| self.menu_items.get(id))
            .filter(|item| item.restaurant_id == *restaurant_id)
            .map(|item| (item.id, item.value().clone()))
            .collect()
    }

    // ---- orders ----

    /// Persists an order together with its optional delivery.
    ///
    /// The delivery row is written first; every delivery query skips rows whose
    /// order is absent, so the order insert is the single commit point.
    pub fn place_order(&self, order: Order, delivery: Option<Delivery>) {
        if let Some(delivery) = delivery {
            self.deliveries.insert(delivery.id, delivery);
        }
        self.orders.insert(order.id, order);
    }

    pub fn order(&self, id: &Uuid) -> Option<Order> {
        self.orders.get(id).map(|entry| entry.value().clone())
    }

    /// Applies `mutate` under the order's entry lock and returns the result.
    pub fn update_order<F>(&self, id: &Uuid, mutate: F) -> Result<Order, AppError>
    where
        F: FnOnce(&mut Order) -> Result<(), AppError>,
    {
        let mut order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        mutate(&mut order)?;
        Ok(order.clone())
    }

    pub fn orders_for_customer(&self, customer_id: &Uuid) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.customer_id == *customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn orders_for_restaurant(
        &self,
        restaurant_id: &Uuid,
        status: Option<OrderStatus>,
    ) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.restaurant_id == *restaurant_id)
            .filter(|entry| status.map_or(true, |status| entry.status == status))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    // ---- deliveries ----

    pub fn delivery(&self, id: &Uuid) -> Option<Delivery> {
        self.deliveries
            .get(id)
            .filter(|delivery| self.orders.contains_key(&delivery.order_id))
            .map(|entry| entry.value().clone())
    }

    /// Unassigned deliveries whose order is committed and still open.
    pub fn open_deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .iter()
            .filter(|entry| entry.is_claimable())
            .map(|entry| entry.value().clone())
            .filter(|delivery| self.order_is_open(&delivery.order_id))
            .collect()
    }

    fn order_is_open(&self, order_id: &Uuid) -> bool {
        self.orders
            .get(order_id)
            .is_some_and(|order| !order.status.is_terminal())
    }

    /// Claims a delivery for a driver with a single conditional write.
    ///
    /// The write only happens if the delivery is still `PENDING` with no
    /// driver; otherwise the caller lost the race and gets `NoLongerAvailable`.
    /// The driver's active-delivery slot is held for the duration, so the same
    /// driver cannot claim two deliveries concurrently.
    pub fn claim_delivery(
        &self,
        delivery_id: &Uuid,
        driver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Delivery, AppError> {
        if !self
            .deliveries
            .get(delivery_id)
            .is_some_and(|delivery| self.orders.contains_key(&delivery.order_id))
        {
            return Err(AppError::NotFound(format!("delivery {delivery_id} not found")));
        }

        let order_open = self
            .deliveries
            .get(delivery_id)
            .is_some_and(|delivery| self.order_is_open(&delivery.order_id));
        if !order_open {
            return Err(AppError::NoLongerAvailable(delivery_id.to_string()));
        }

        let slot = match self.active_by_driver.entry(driver_id) {
            Entry::Occupied(held) => {
                let still_active = self
                    .deliveries
                    .get(held.get())
                    .is_some_and(|delivery| delivery.status.is_active());
                if still_active {
                    return Err(AppError::Conflict(format!(
                        "driver {driver_id} already has an active delivery"
                    )));
                }
                Entry::Occupied(held)
            }
            vacant => vacant,
        };

        let claimed = {
            let mut delivery = self
                .deliveries
                .get_mut(delivery_id)
                .ok_or_else(|| AppError::NotFound(format!("delivery {delivery_id} not found")))?;

            if !delivery.is_claimable() {
                return Err(AppError::NoLongerAvailable(delivery_id.to_string()));
            }

            delivery.transition(DeliveryStatus::Assigned, now)?;
            delivery.driver_id = Some(driver_id);
            delivery.assigned_at = Some(now);
            delivery.clone()
        };

        slot.insert(claimed.id);
        Ok(claimed)
    }

    /// Releases the driver's slot if it still points at `delivery_id`.
    pub fn release_driver(&self, driver_id: &Uuid, delivery_id: &Uuid) {
        self.active_by_driver
            .remove_if(driver_id, |_, held| held == delivery_id);
    }

    pub fn active_delivery_for_driver(&self, driver_id: &Uuid) -> Option<Delivery> {
        let delivery_id = *self.active_by_driver.get(driver_id)?;
        self.deliveries
            .get(&delivery_id)
            .filter(|delivery| delivery.status.is_active())
            .map(|entry| entry.value().clone())
    }

    /// Cancels the order's delivery unless it already finished.
    pub fn cancel_delivery_of(&self, order: &Order, now: DateTime<Utc>) -> Option<Delivery> {
        let delivery_id = order.delivery_id?;
        let cancelled = {
            let mut delivery = self.deliveries.get_mut(&delivery_id)?;
            if delivery.status.is_terminal() {
                return None;
            }
            delivery.transition(DeliveryStatus::Cancelled, now).ok()?;
            delivery.clone()
        };

        if let Some(driver_id) = cancelled.driver_id {
            self.release_driver(&driver_id, &cancelled.id);
        }
        Some(cancelled)
    }

    // ---- drivers ----

    pub fn insert_driver(&self, profile: DriverProfile) -> Result<DriverProfile, AppError> {
        match self.driver_by_user.entry(profile.user_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(
                "driver profile already exists".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(profile.id);
                self.drivers.insert(profile.id, profile.clone());
                Ok(profile)
            }
        }
    }

    pub fn driver_for_user(&self, user_id: &Uuid) -> Option<DriverProfile> {
        let driver_id = *self.driver_by_user.get(user_id)?;
        self.drivers.get(&driver_id).map(|entry| entry.value().clone())
    }

    pub fn update_driver<F>(&self, driver_id: &Uuid, mutate: F) -> Result<DriverProfile, AppError>
    where
        F: FnOnce(&mut DriverProfile),
    {
        let mut profile = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        mutate(&mut profile);
        Ok(profile.clone())
    }

    pub fn matchable_drivers(&self) -> Vec<DriverProfile> {
        self.drivers
            .iter()
            .filter(|entry| entry.is_matchable())
            .map(|entry| entry.value().clone())
            .collect()
    }

    // ---- payments ----

    /// Records a new payment for an order.
    ///
    /// Fails with `Conflict` while the order already has a pending or
    /// successful payment; a failed one may be retried.
    pub fn begin_payment(&self, payment: Payment) -> Result<Payment, AppError> {
        match self.payment_by_order.entry(payment.order_id) {
            Entry::Occupied(mut latest) => {
                let blocking = self
                    .payments
                    .get(latest.get())
                    .map(|existing| existing.status)
                    .filter(|status| *status != PaymentStatus::Failed);
                if let Some(status) = blocking {
                    return Err(AppError::Conflict(format!(
                        "order {} already has a {status} payment",
                        payment.order_id
                    )));
                }
                latest.insert(payment.id);
            }
            Entry::Vacant(slot) => {
                slot.insert(payment.id);
            }
        }

        self.payment_refs
            .insert(payment.reference.clone(), payment.id);
        self.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    /// Pays for an order out of the customer's wallet in one step.
    ///
    /// The wallet guard is held throughout, so the balance check, the debit,
    /// the SUCCESS payment row and the PENDING -> CONFIRMED move either all
    /// happen or none do. Returns the payment and, when the order was
    /// confirmed by this call, the updated order.
    pub fn pay_from_wallet(
        &self,
        customer_id: &Uuid,
        payment: Payment,
        now: DateTime<Utc>,
    ) -> Result<(Payment, Option<Order>), AppError> {
        let mut balance = self
            .wallets
            .get_mut(customer_id)
            .ok_or_else(|| AppError::Validation("customer has no wallet".to_string()))?;

        if *balance < payment.amount {
            return Err(AppError::Validation(format!(
                "insufficient wallet balance: {} available, {} required",
                *balance, payment.amount
            )));
        }

        let mut order = self
            .orders
            .get_mut(&payment.order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", payment.order_id)))?;

        if order.status.is_terminal() {
            return Err(AppError::AlreadyTerminal(format!(
                "order {} is already {}",
                order.id, order.status
            )));
        }

        let confirmed = if order.status == OrderStatus::Pending {
            let mut next = order.clone();
            next.transition(OrderStatus::Confirmed, now)?;
            Some(next)
        } else {
            None
        };

        let payment = self.begin_payment(payment)?;
        if let Some(next) = &confirmed {
            *order = next.clone();
        }
        *balance -= payment.amount;

        Ok((payment, confirmed))
    }

    /// Moves a PENDING payment to a terminal status.
    ///
    /// Returns the payment and whether this call changed it; once terminal a
    /// payment is returned untouched.
    pub fn settle_payment(
        &self,
        payment_id: &Uuid,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(Payment, bool), AppError> {
        let mut payment = self
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| AppError::NotFound(format!("payment {payment_id} not found")))?;

        if payment.status.is_terminal() {
            return Ok((payment.clone(), false));
        }

        payment.status = status;
        payment.updated_at = now;
        Ok((payment.clone(), true))
    }

    pub fn payment_id_by_reference(&self, reference: &str) -> Option<Uuid> {
        self.payment_refs.get(reference).map(|entry| *entry.value())
    }

    pub fn latest_payment_for_order(&self, order_id: &Uuid) -> Option<Payment> {
        let payment_id = *self.payment_by_order.get(order_id)?;
        self.payments.get(&payment_id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::models::order::NewOrder;

    fn committed_delivery(store: &Store) -> Delivery {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let point = GeoPoint::new(6.52, 3.38);
        let delivery = Delivery::new(
            Uuid::new_v4(),
            order_id,
            point,
            point,
            "4 Awolowo Road".to_string(),
            now,
        );
        let order = Order::new(
            order_id,
            NewOrder {
                customer_id: Uuid::new_v4(),
                restaurant_id: Uuid::new_v4(),
                items: Vec::new(),
                subtotal: 0,
                delivery_fee: 500,
                delivery_address: Some(delivery.address.clone()),
                delivery_location: Some(point),
                delivery_id: Some(delivery.id),
                notes: None,
            },
            now,
        );
        store.place_order(order, Some(delivery.clone()));
        delivery
    }

    #[test]
    fn second_claim_loses() {
        let store = Store::new();
        let delivery = committed_delivery(&store);

        let first = store
            .claim_delivery(&delivery.id, Uuid::new_v4(), Utc::now())
            .unwrap();
        assert_eq!(first.status, DeliveryStatus::Assigned);

        let second = store.claim_delivery(&delivery.id, Uuid::new_v4(), Utc::now());
        assert!(matches!(second, Err(AppError::NoLongerAvailable(_))));
    }

    #[test]
    fn finished_order_hides_its_delivery() {
        let store = Store::new();
        let delivery = committed_delivery(&store);
        assert_eq!(store.open_deliveries().len(), 1);

        store.orders.get_mut(&delivery.order_id).unwrap().status = OrderStatus::Delivered;

        assert!(store.open_deliveries().is_empty());
        let driver = Uuid::new_v4();
        let err = store.claim_delivery(&delivery.id, driver, Utc::now());
        assert!(matches!(err, Err(AppError::NoLongerAvailable(_))));
        assert!(store.active_delivery_for_driver(&driver).is_none());
    }

    #[test]
    fn driver_holds_one_active_delivery() {
        let store = Store::new();
        let first = committed_delivery(&store);
        let second = committed_delivery(&store);
        let driver = Uuid::new_v4();

        store.claim_delivery(&first.id, driver, Utc::now()).unwrap();
        let err = store.claim_delivery(&second.id, driver, Utc::now());
        assert!(matches!(err, Err(AppError::Conflict(_))));
        assert!(store.delivery(&second.id).unwrap().is_claimable());
    }

    fn wallet_payment(order: &Order) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.total,
            currency: "NGN".to_string(),
            method: crate::models::payment::PaymentMethod::Wallet,
            status: PaymentStatus::Success,
            reference: format!("WAL-{}", Uuid::new_v4()),
            provider: "INTERNAL_WALLET".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn wallet_payment_debits_and_confirms() {
        let store = Store::new();
        let delivery = committed_delivery(&store);
        let order = store.order(&delivery.order_id).unwrap();
        store.wallets.insert(order.customer_id, 10_000);

        let (payment, confirmed) = store
            .pay_from_wallet(&order.customer_id, wallet_payment(&order), Utc::now())
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(confirmed.unwrap().status, OrderStatus::Confirmed);
        assert_eq!(*store.wallets.get(&order.customer_id).unwrap(), 9_500);
    }

    #[test]
    fn short_wallet_changes_nothing() {
        let store = Store::new();
        let delivery = committed_delivery(&store);
        let order = store.order(&delivery.order_id).unwrap();
        store.wallets.insert(order.customer_id, 100);

        let err = store.pay_from_wallet(&order.customer_id, wallet_payment(&order), Utc::now());

        assert!(matches!(err, Err(AppError::Validation(_))));
        assert_eq!(*store.wallets.get(&order.customer_id).unwrap(), 100);
        assert_eq!(store.order(&order.id).unwrap().status, OrderStatus::Pending);
        assert!(store.latest_payment_for_order(&order.id).is_none());
    }

    #[test]
    fn settled_payment_is_not_revisited() {
        let store = Store::new();
        let delivery = committed_delivery(&store);
        let order = store.order(&delivery.order_id).unwrap();
        let mut pending = wallet_payment(&order);
        pending.status = PaymentStatus::Pending;
        let pending = store.begin_payment(pending).unwrap();

        let (_, changed) = store
            .settle_payment(&pending.id, PaymentStatus::Failed, Utc::now())
            .unwrap();
        assert!(changed);

        let (payment, changed) = store
            .settle_payment(&pending.id, PaymentStatus::Success, Utc::now())
            .unwrap();
        assert!(!changed);
        assert_eq!(payment.status, PaymentStatus::Failed);
    }

    #[test]
    fn uncommitted_delivery_is_invisible() {
        let store = Store::new();
        let point = GeoPoint::new(6.52, 3.38);
        let orphan = Delivery::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            point,
            point,
            "9 Allen Avenue".to_string(),
            Utc::now(),
        );
        store.deliveries.insert(orphan.id, orphan.clone());

        assert!(store.open_deliveries().is_empty());
        assert!(store.delivery(&orphan.id).is_none());
        assert!(matches!(
            store.claim_delivery(&orphan.id, Uuid::new_v4(), Utc::now()),
            Err(AppError::NotFound(_))
        ));
    }
}
