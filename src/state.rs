use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::assignment::DeliveryAssignment;
use crate::engine::payment::PaymentOrchestrator;
use crate::engine::pricing::PricingEngine;
use crate::engine::queue::{MatchQueue, MatchRequest};
use crate::engine::workflow::OrderWorkflow;
use crate::events::router::RoomRouter;
use crate::events::subscriptions::SubscriptionHandler;
use crate::events::EventPublisher;
use crate::integrations::gateway::{MockGateway, PaymentGateway};
use crate::integrations::identity::IdentityProvider;
use crate::integrations::notification::{LogNotificationSink, NotificationSink};
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<Store>,
    pub rooms: Arc<RoomRouter>,
    pub identity: Arc<dyn IdentityProvider>,
    pub workflow: OrderWorkflow,
    pub deliveries: Arc<DeliveryAssignment>,
    pub payments: Arc<PaymentOrchestrator>,
    pub subscriptions: SubscriptionHandler,
    pub metrics: Metrics,
}

impl AppState {
    /// Builds the state with the in-process gateway and log-only notifications.
    pub fn new(
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
    ) -> (Self, mpsc::Receiver<MatchRequest>) {
        Self::with_collaborators(
            config,
            identity,
            Arc::new(MockGateway),
            Arc::new(LogNotificationSink),
        )
    }

    pub fn with_collaborators(
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
    ) -> (Self, mpsc::Receiver<MatchRequest>) {
        let metrics = Metrics::new();
        let store = Arc::new(Store::new());
        let rooms = Arc::new(RoomRouter::new(config.event_buffer_size, metrics.clone()));
        let events: Arc<dyn EventPublisher> = rooms.clone();
        let (matcher, match_rx) = MatchQueue::new(config.match_queue_size, metrics.clone());

        let workflow = OrderWorkflow::new(
            Arc::clone(&store),
            PricingEngine::new(config.pricing),
            Arc::clone(&events),
            matcher,
            Arc::clone(&notifier),
            metrics.clone(),
        );
        let deliveries = Arc::new(DeliveryAssignment::new(
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&notifier),
            config.dispatch,
            metrics.clone(),
        ));
        let payments = Arc::new(PaymentOrchestrator::new(
            Arc::clone(&store),
            events,
            notifier,
            gateway,
            config.payments.clone(),
            metrics.clone(),
        ));
        let subscriptions = SubscriptionHandler::new(Arc::clone(&store), Arc::clone(&rooms));

        (
            Self {
                store,
                rooms,
                identity,
                workflow,
                deliveries,
                payments,
                subscriptions,
                metrics,
            },
            match_rx,
        )
    }
}
