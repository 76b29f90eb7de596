use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// Events emitted by the order and payment services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: String,
    },
    OrderStatusChanged {
        order_id: String,
        old_status: String,
        new_status: String,
    },
    PaymentInitiated {
        order_id: String,
        gateway_order_id: String,
    },
    PaymentCaptured {
        order_id: String,
        gateway_payment_id: String,
    },
    PaymentFailed {
        order_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, surfacing each event in the logs. Downstream
/// consumers (notification fan-out, analytics) hang off this loop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated { order_id } => {
                info!(%order_id, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "event: order status changed");
            }
            Event::PaymentInitiated {
                order_id,
                gateway_order_id,
            } => {
                info!(%order_id, %gateway_order_id, "event: payment initiated");
            }
            Event::PaymentCaptured {
                order_id,
                gateway_payment_id,
            } => {
                info!(%order_id, %gateway_payment_id, "event: payment captured");
            }
            Event::PaymentFailed { order_id } => {
                info!(%order_id, "event: payment failed");
            }
        }
    }
}
