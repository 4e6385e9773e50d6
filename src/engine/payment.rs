use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::error::AppError;
use crate::events::{order_rooms, EventPublisher, LifecycleEvent, OrderEvent, PaymentUpdated, Room};
use crate::integrations::gateway::{format_amount, payment_reference, GatewayRequest, PaymentGateway};
use crate::integrations::notification::{self, NotificationSink};
use crate::models::identity::Actor;
use crate::models::order::{Order, OrderStatus};
use crate::models::payment::{Payment, PaymentMethod, PaymentStatus};
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub const WALLET_PROVIDER: &str = "INTERNAL_WALLET";

/// What the customer gets back when starting a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub reference: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub redirect_url: Option<String>,
    pub instructions: Option<String>,
}

pub struct PaymentOrchestrator {
    store: Arc<Store>,
    events: Arc<dyn EventPublisher>,
    notifier: Arc<dyn NotificationSink>,
    gateway: Arc<dyn PaymentGateway>,
    config: PaymentConfig,
    metrics: Metrics,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<Store>,
        events: Arc<dyn EventPublisher>,
        notifier: Arc<dyn NotificationSink>,
        gateway: Arc<dyn PaymentGateway>,
        config: PaymentConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            events,
            notifier,
            gateway,
            config,
            metrics,
        }
    }

    pub async fn initiate(
        self: &Arc<Self>,
        payer: &Actor,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<PaymentInitiation, AppError> {
        let order = self
            .store
            .order(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.customer_id != payer.user_id {
            return Err(AppError::Forbidden("only the ordering customer can pay".to_string()));
        }
        if order.status.is_terminal() {
            return Err(AppError::AlreadyTerminal(format!(
                "order {} is already {}",
                order.id, order.status
            )));
        }

        match method {
            PaymentMethod::Cash => Err(AppError::Validation(
                "cash payments are not supported".to_string(),
            )),
            PaymentMethod::Wallet => self.pay_from_wallet(payer, &order),
            _ => self.start_gateway_payment(&order, method).await,
        }
    }

    fn pay_from_wallet(&self, payer: &Actor, order: &Order) -> Result<PaymentInitiation, AppError> {
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.total,
            currency: self.config.currency.clone(),
            method: PaymentMethod::Wallet,
            status: PaymentStatus::Success,
            reference: payment_reference("WAL"),
            provider: WALLET_PROVIDER.to_string(),
            created_at: now,
            updated_at: now,
        };

        let (payment, confirmed) = self.store.pay_from_wallet(&payer.user_id, payment, now)?;
        self.metrics
            .payments_settled_total
            .with_label_values(&[PaymentStatus::Success.as_str()])
            .inc();
        info!(
            order_id = %order.id,
            reference = %payment.reference,
            amount = payment.amount,
            "wallet payment completed"
        );

        self.publish_payment(&payment, order.customer_id);
        if let Some(order) = confirmed {
            self.publish_confirmed(&order);
        }
        notification::dispatch(
            &self.notifier,
            order.customer_id,
            "Payment Successful".to_string(),
            format!(
                "{} was paid from your wallet",
                format_amount(payment.amount, &payment.currency)
            ),
        );

        Ok(PaymentInitiation {
            payment_id: payment.id,
            order_id: payment.order_id,
            reference: payment.reference,
            method: payment.method,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
            redirect_url: None,
            instructions: None,
        })
    }

    async fn start_gateway_payment(
        self: &Arc<Self>,
        order: &Order,
        method: PaymentMethod,
    ) -> Result<PaymentInitiation, AppError> {
        // Checked again atomically by begin_payment; this just avoids a wasted
        // provider round trip.
        if let Some(existing) = self.store.latest_payment_for_order(&order.id) {
            if existing.status != PaymentStatus::Failed {
                return Err(AppError::Conflict(format!(
                    "order {} already has a {} payment",
                    order.id, existing.status
                )));
            }
        }

        let init = self
            .gateway
            .initialize(GatewayRequest {
                order_id: order.id,
                amount: order.total,
                currency: &self.config.currency,
                method,
            })
            .await
            .map_err(|err| match err {
                AppError::Validation(message) => AppError::Validation(message),
                other => AppError::UpstreamUnavailable(format!("payment gateway: {other}")),
            })?;

        let now = Utc::now();
        let payment = self.store.begin_payment(Payment {
            id: Uuid::new_v4(),
            order_id: order.id,
            amount: order.total,
            currency: self.config.currency.clone(),
            method,
            status: PaymentStatus::Pending,
            reference: init.reference,
            provider: init.provider,
            created_at: now,
            updated_at: now,
        })?;

        info!(
            order_id = %order.id,
            reference = %payment.reference,
            method = ?method,
            "payment initiated"
        );
        self.publish_payment(&payment, order.customer_id);
        self.schedule_settlement(payment.reference.clone());

        Ok(PaymentInitiation {
            payment_id: payment.id,
            order_id: payment.order_id,
            reference: payment.reference,
            method: payment.method,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
            redirect_url: init.redirect_url,
            instructions: init.instructions,
        })
    }

    /// Applies a provider outcome to the payment behind `reference`.
    ///
    /// Replays are harmless: once a payment is terminal it is returned as is
    /// and nothing else happens.
    pub fn settle(&self, reference: &str, status: PaymentStatus) -> Result<Payment, AppError> {
        if status == PaymentStatus::Pending {
            return Err(AppError::Validation(
                "settlement status must be SUCCESS or FAILED".to_string(),
            ));
        }

        let payment_id = self
            .store
            .payment_id_by_reference(reference)
            .ok_or_else(|| AppError::NotFound(format!("payment {reference} not found")))?;

        let (payment, changed) = self.store.settle_payment(&payment_id, status, Utc::now())?;
        if !changed {
            debug!(reference, status = %payment.status, "payment already settled");
            return Ok(payment);
        }

        self.metrics
            .payments_settled_total
            .with_label_values(&[status.as_str()])
            .inc();
        info!(order_id = %payment.order_id, reference, status = %status, "payment settled");

        let Some(order) = self.store.order(&payment.order_id) else {
            warn!(order_id = %payment.order_id, reference, "settled payment has no order");
            return Ok(payment);
        };
        self.publish_payment(&payment, order.customer_id);

        match status {
            PaymentStatus::Success => {
                self.confirm_order(&payment);
                notification::dispatch(
                    &self.notifier,
                    order.customer_id,
                    "Payment Successful".to_string(),
                    format!(
                        "Payment of {} received",
                        format_amount(payment.amount, &payment.currency)
                    ),
                );
            }
            _ => notification::dispatch(
                &self.notifier,
                order.customer_id,
                "Payment Failed".to_string(),
                "Your payment could not be completed. Please try again.".to_string(),
            ),
        }

        Ok(payment)
    }

    /// Visible to the paying customer, the restaurant owner and admins.
    pub fn payment_status(&self, actor: &Actor, order_id: Uuid) -> Result<Payment, AppError> {
        let order = self
            .store
            .order(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        let owns_restaurant = self
            .store
            .restaurant(&order.restaurant_id)
            .is_some_and(|restaurant| restaurant.owner_id == actor.user_id);
        if !actor.is_admin() && order.customer_id != actor.user_id && !owns_restaurant {
            return Err(AppError::Forbidden("you do not have access to this order".to_string()));
        }

        self.store
            .latest_payment_for_order(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("no payment for order {order_id}")))
    }

    /// Stands in for the provider callback.
    ///
    /// With a settlement delay shorter than the payment timeout the payment
    /// succeeds after the delay; otherwise it is abandoned as FAILED once the
    /// timeout passes. A zero delay disables the simulated success.
    pub fn schedule_settlement(self: &Arc<Self>, reference: String) {
        let delay = Duration::from_millis(self.config.settlement_delay_ms);
        let timeout = Duration::from_secs(self.config.payment_timeout_secs);
        let (wait, outcome) = if !delay.is_zero() && delay < timeout {
            (delay, PaymentStatus::Success)
        } else {
            (timeout, PaymentStatus::Failed)
        };

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Err(err) = orchestrator.settle(&reference, outcome) {
                warn!(reference = %reference, error = %err, "scheduled settlement failed");
            }
        });
    }

    fn confirm_order(&self, payment: &Payment) {
        let now = Utc::now();
        let mut confirmed = false;
        let result = self.store.update_order(&payment.order_id, |order| {
            if order.status == OrderStatus::Pending {
                order.transition(OrderStatus::Confirmed, now)?;
                confirmed = true;
            }
            Ok(())
        });

        match result {
            Ok(order) if confirmed => self.publish_confirmed(&order),
            Ok(order) => warn!(
                order_id = %order.id,
                status = %order.status,
                "payment succeeded but order is no longer pending"
            ),
            Err(err) => warn!(order_id = %payment.order_id, error = %err, "failed to confirm paid order"),
        }
    }

    fn publish_confirmed(&self, order: &Order) {
        self.metrics
            .order_transitions_total
            .with_label_values(&[OrderStatus::Confirmed.as_str()])
            .inc();
        self.events.publish(
            &order_rooms(order),
            &LifecycleEvent::OrderUpdated(OrderEvent::from(order)),
        );
        notification::order_update(&self.notifier, order.customer_id, order.id, order.status.as_str());
    }

    fn publish_payment(&self, payment: &Payment, customer_id: Uuid) {
        self.events.publish(
            &[Room::Customer(customer_id), Room::Order(payment.order_id)],
            &LifecycleEvent::PaymentUpdated(PaymentUpdated {
                order_id: payment.order_id,
                payment_id: payment.id,
                reference: payment.reference.clone(),
                method: payment.method,
                status: payment.status,
                amount: payment.amount,
            }),
        );
    }
}
