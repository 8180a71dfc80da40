//! Recording and scripted doubles for the outbound collaborators.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::interfaces::notifier::{NotificationKind, Notifier, NotifyError};
use crate::interfaces::tracking::{ShipmentTracking, TrackingError, TrackingLookup};

/// One captured notification trigger.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipient: String,
    pub kind: NotificationKind,
    pub context: serde_json::Value,
}

/// Notifier double that records every dispatch.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    /// Everything dispatched so far, in order.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().expect("notifier lock").clone()
    }

    /// Make subsequent dispatches fail, for best-effort-path tests.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("notifier lock") = failing;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipient: &str,
        kind: NotificationKind,
        context: serde_json::Value,
    ) -> Result<(), NotifyError> {
        if *self.failing.lock().expect("notifier lock") {
            return Err(NotifyError::Rejected { status: 503 });
        }
        self.sent
            .lock()
            .expect("notifier lock")
            .push(SentNotification {
                recipient: recipient.to_string(),
                kind,
                context,
            });
        Ok(())
    }
}

/// Tracking double returning scripted shipments per waybill.
#[derive(Default)]
pub struct ScriptedTracker {
    responses: Mutex<HashMap<String, ShipmentTracking>>,
    failing: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTracker {
    /// Script the response for a waybill.
    pub fn script(&self, waybill_id: &str, tracking: ShipmentTracking) {
        self.responses
            .lock()
            .expect("tracker lock")
            .insert(waybill_id.to_string(), tracking);
    }

    /// Make lookups for a waybill fail with a provider error.
    pub fn fail(&self, waybill_id: &str) {
        self.failing
            .lock()
            .expect("tracker lock")
            .push(waybill_id.to_string());
    }

    /// Delay every lookup, for per-call timeout tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("tracker lock") = Some(delay);
    }
}

#[async_trait]
impl TrackingLookup for ScriptedTracker {
    async fn lookup(
        &self,
        waybill_id: &str,
        _courier_code: &str,
    ) -> Result<ShipmentTracking, TrackingError> {
        let delay = *self.delay.lock().expect("tracker lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing
            .lock()
            .expect("tracker lock")
            .iter()
            .any(|w| w == waybill_id)
        {
            return Err(TrackingError::Rejected { status: 500 });
        }
        self.responses
            .lock()
            .expect("tracker lock")
            .get(waybill_id)
            .cloned()
            .ok_or(TrackingError::Rejected { status: 404 })
    }
}
