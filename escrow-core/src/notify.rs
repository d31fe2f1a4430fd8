//! Outbound user notifications
//!
//! Delivery (email, push) lives outside the core. The core only hands a
//! notification to a [`Notifier`] after the state change has committed and
//! never waits on, or fails because of, delivery.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A notification handed to the delivery layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Fire-and-forget notification sink.
///
/// Implementations must not block; anything slow belongs behind a queue.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: &str, event_type: &str, payload: &serde_json::Value);
}

/// Logs notifications instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, user_id: &str, event_type: &str, _payload: &serde_json::Value) {
        info!(user_id, event_type, "Notification");
    }
}

/// Queues notifications on an unbounded channel for a delivery worker
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end for the delivery worker
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, user_id: &str, event_type: &str, payload: &serde_json::Value) {
        let notification = Notification {
            user_id: user_id.to_string(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
        };
        if self.sender.send(notification).is_err() {
            warn!(user_id, event_type, "Notification dropped: delivery worker gone");
        }
    }
}
