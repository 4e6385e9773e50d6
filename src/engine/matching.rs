use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::assignment::DeliveryAssignment;
use crate::engine::queue::MatchRequest;
use crate::observability::metrics::Metrics;

/// Advertises each queued delivery to nearby couriers until the queue closes.
pub async fn run_matching_engine(
    assignment: Arc<DeliveryAssignment>,
    metrics: Metrics,
    mut match_rx: mpsc::Receiver<MatchRequest>,
) {
    info!("matching engine started");

    while let Some(request) = match_rx.recv().await {
        metrics.match_queue_depth.dec();

        let start = Instant::now();
        let notified = assignment.notify_nearby_drivers(&request);
        metrics
            .match_latency_seconds
            .observe(start.elapsed().as_secs_f64());

        if notified == 0 {
            info!(order_id = %request.order_id, "no couriers in range; order stays open");
        } else {
            info!(order_id = %request.order_id, couriers = notified, "order advertised");
        }
    }

    warn!("matching engine stopped: queue channel closed");
}
