use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::observability::metrics::Metrics;

/// A freshly placed delivery order waiting to be advertised to couriers.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub delivery_id: Uuid,
    pub order_id: Uuid,
    pub restaurant_id: Uuid,
    pub dropoff: GeoPoint,
    pub delivery_fee: i64,
}

#[derive(Clone)]
pub struct MatchQueue {
    tx: mpsc::Sender<MatchRequest>,
    metrics: Metrics,
}

impl MatchQueue {
    pub fn new(size: usize, metrics: Metrics) -> (Self, mpsc::Receiver<MatchRequest>) {
        let (tx, rx) = mpsc::channel(size.max(1));
        (Self { tx, metrics }, rx)
    }

    pub async fn enqueue(&self, request: MatchRequest) -> Result<(), AppError> {
        self.metrics.match_queue_depth.inc();
        self.tx.send(request).await.map_err(|err| {
            self.metrics.match_queue_depth.dec();
            AppError::Internal(format!("match queue send failed: {err}"))
        })
    }
}
