//! Paper order gateway: accepts every order without touching the venue.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use super::types::{OrderOutcome, OrderRequest};
use super::OrderGateway;

/// Simulated gateway used when no signing collaborator is configured.
#[derive(Debug, Default)]
pub struct PaperGateway {
    orders: Vec<OrderRequest>,
    index: HashMap<String, usize>,
    /// Probability that a submit acknowledgement is dropped
    ack_loss: f64,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the acknowledgement of a share of submits.
    ///
    /// The order is still recorded, so a later status query reports it as
    /// accepted. This drives the reconciliation path without a live venue.
    pub fn with_ack_loss(mut self, rate: f64) -> Self {
        self.ack_loss = rate.clamp(0.0, 1.0);
        self
    }

    /// Orders submitted so far, oldest first.
    #[cfg(test)]
    pub fn orders(&self) -> &[OrderRequest] {
        &self.orders
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit(&mut self, order: &OrderRequest) -> OrderOutcome {
        self.index
            .insert(order.correlation_id.clone(), self.orders.len());
        self.orders.push(order.clone());

        if self.ack_loss > 0.0 && rand::thread_rng().gen_bool(self.ack_loss) {
            warn!(cloid = %order.correlation_id, "[PAPER] Acknowledgement dropped");
            return OrderOutcome::Unknown {
                reason: "simulated acknowledgement loss".to_string(),
            };
        }

        info!(
            side = ?order.side,
            price = %order.price,
            size = %order.size,
            tif = %order.tif,
            reduce_only = order.reduce_only,
            cloid = %order.correlation_id,
            "[PAPER] Order accepted"
        );

        OrderOutcome::Accepted {
            order_id: Some(format!("paper-{}", self.orders.len())),
        }
    }

    async fn status(&mut self, correlation_id: &str) -> OrderOutcome {
        match self.index.get(correlation_id) {
            Some(position) => OrderOutcome::Accepted {
                order_id: Some(format!("paper-{}", position + 1)),
            },
            None => OrderOutcome::Rejected {
                reason: format!("unknown order {correlation_id}"),
            },
        }
    }
}
