//! Applies the side effects of committed domain events

use std::sync::Arc;

use tracing::{error, warn};

use super::bus::SharedEventBus;
use super::types::DomainEvent;
use crate::audit::{AdminAction, AdminActionRecorder};
use crate::notify::Notifier;

/// Outcome of dispatching a batch of events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub events: usize,
    pub audit_records: usize,
    pub audit_failures: usize,
    pub notifications: usize,
}

/// Routes events to the audit log, the notifier and the event bus.
///
/// Runs strictly after the transition that produced the events has
/// committed; nothing here can undo or fail that transition.
#[derive(Clone)]
pub struct EventDispatcher {
    recorder: AdminActionRecorder,
    notifier: Arc<dyn Notifier>,
    bus: SharedEventBus,
}

impl EventDispatcher {
    pub fn new(
        recorder: AdminActionRecorder,
        notifier: Arc<dyn Notifier>,
        bus: SharedEventBus,
    ) -> Self {
        Self {
            recorder,
            notifier,
            bus,
        }
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn recorder(&self) -> &AdminActionRecorder {
        &self.recorder
    }

    /// Dispatch events in order
    pub async fn dispatch(&self, events: &[DomainEvent]) -> DispatchReport {
        let mut report = DispatchReport {
            events: events.len(),
            ..DispatchReport::default()
        };

        for event in events {
            if let Some(action) = AdminAction::from_event(event) {
                match self.recorder.record(action).await {
                    Ok(_) => report.audit_records += 1,
                    Err(e) => {
                        error!(
                            event_type = event.event_type(),
                            error = %e,
                            "Failed to record admin action"
                        );
                        report.audit_failures += 1;
                    }
                }
            }

            let recipients = event.recipients();
            if !recipients.is_empty() {
                match serde_json::to_value(event) {
                    Ok(payload) => {
                        for user_id in recipients {
                            self.notifier.notify(user_id, event.event_type(), &payload);
                            report.notifications += 1;
                        }
                    }
                    Err(e) => warn!(
                        event_type = event.event_type(),
                        error = %e,
                        "Skipping notifications: event not serializable"
                    ),
                }
            }

            self.bus.publish(event.clone());
        }

        report
    }
}
