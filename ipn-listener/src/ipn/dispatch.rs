//! Ordered, failure-isolated event delivery.
//!
//! Subscribers run one after another in registration order. An error or a
//! panic in one subscriber is logged and delivery moves on to the next.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{error, info};

use super::event::IpnEvent;

/// Failure reported by a subscriber.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Consumer of classified IPN events.
///
/// Delivery is at-least-once: the gateway may send the same callback more
/// than once, and nothing upstream deduplicates it.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn handle(&self, event: &IpnEvent) -> Result<(), SubscriberError>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Holds the registration-time subscriber list.
#[derive(Clone, Default)]
pub struct Dispatcher {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Registration order is delivery order.
    pub fn subscribe(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver an event to every subscriber.
    pub async fn dispatch(&self, event: &IpnEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for subscriber in &self.subscribers {
            let result = AssertUnwindSafe(subscriber.handle(event))
                .catch_unwind()
                .await;

            match result {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(
                        subscriber = subscriber.name(),
                        event_id = %event.id(),
                        event = %event.kind(),
                        error = %e,
                        "subscriber_failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    error!(
                        subscriber = subscriber.name(),
                        event_id = %event.id(),
                        event = %event.kind(),
                        "subscriber_panicked"
                    );
                }
            }
        }

        info!(
            event_id = %event.id(),
            event = %event.kind(),
            delivered = report.delivered,
            failed = report.failed,
            "ipn_event_dispatched"
        );

        report
    }
}
