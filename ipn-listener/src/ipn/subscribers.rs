//! Built-in subscribers.

use async_trait::async_trait;
use tracing::{info, warn};

use super::dispatch::{Subscriber, SubscriberError};
use super::event::IpnEvent;

/// Records every classified event to the log.
#[derive(Debug, Default, Clone)]
pub struct EventLogger;

#[async_trait]
impl Subscriber for EventLogger {
    async fn handle(&self, event: &IpnEvent) -> Result<(), SubscriberError> {
        let message = event.message();

        if event.is_valid() {
            info!(
                event = %event.kind(),
                event_id = %event.id(),
                txn_type = message.get("txn_type").unwrap_or(""),
                payment_status = message.get("payment_status").unwrap_or(""),
                mc_gross = message.get("mc_gross").unwrap_or(""),
                mc_currency = message.get("mc_currency").unwrap_or(""),
                "ipn_event_logged"
            );
        } else {
            warn!(
                event = %event.kind(),
                event_id = %event.id(),
                outcome = event.outcome().as_str(),
                field_count = message.len(),
                "ipn_event_logged"
            );
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "event_logger"
    }
}
