use crate::entities::cart::CartStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
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

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Event delivery is best-effort; domain state is already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(i64),
    CartLineUpserted {
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    },
    CartLineRemoved {
        cart_id: i64,
        line_id: i64,
    },
    CartStatusChanged {
        cart_id: i64,
        old_status: CartStatus,
        new_status: CartStatus,
    },

    // Stock events
    StockLevelSet {
        product_id: i64,
        quantity: i32,
    },
    StockDecremented {
        product_id: i64,
        quantity: i32,
        transaction_id: Uuid,
    },

    // Payment events
    PaymentProcessed {
        payment_id: i64,
        cart_id: i64,
        reference_number: String,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Define a trait for handling events. Handlers implementing this trait will process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the event channel, logging each event. Downstream consumers
/// (notifications, analytics) subscribe here when they exist.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentProcessed {
                payment_id,
                cart_id,
                reference_number,
            } => {
                info!(payment_id, cart_id, %reference_number, "payment recorded for cart");
            }
            Event::StockDecremented {
                product_id,
                quantity,
                transaction_id,
            } => {
                info!(product_id, quantity, %transaction_id, "stock decremented");
            }
            Event::CartStatusChanged {
                cart_id,
                old_status,
                new_status,
            } => {
                info!(
                    cart_id,
                    from = old_status.as_str(),
                    to = new_status.as_str(),
                    "cart transitioned"
                );
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event channel closed; processing loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender.send(Event::CartCreated(42)).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Event::CartCreated(42))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out
        sender.send_or_log(Event::CartCreated(1)).await;
    }

    #[test]
    fn generic_event_carries_message() {
        let event = Event::with_data("hello".to_string());
        match event {
            Event::Generic { message, .. } => assert_eq!(message, "hello"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
