//! Interval driver for the reconciler binary.
//!
//! Deployments without an external cron run this long-lived loop; the HTTP
//! cron endpoints hit the same [`Reconciler`] methods, so both triggers may
//! coexist and overlap safely.

use std::sync::Arc;

use tokio::time::interval;
use tracing::{error, info};

use crate::config::ReconcilerConfig;
use crate::services::reconciler::Reconciler;

/// Drives the two pollers on their configured cadences.
pub struct ReconcilerScheduler {
    reconciler: Arc<Reconciler>,
    config: ReconcilerConfig,
}

impl ReconcilerScheduler {
    pub fn new(reconciler: Arc<Reconciler>, config: ReconcilerConfig) -> Self {
        Self { reconciler, config }
    }

    /// Run both poll loops indefinitely.
    pub async fn run(&self) {
        info!(
            check_delivery_interval = ?self.config.check_delivery_interval(),
            auto_complete_interval = ?self.config.auto_complete_interval(),
            "starting reconciler scheduler"
        );

        let delivery = async {
            let mut ticker = interval(self.config.check_delivery_interval());
            loop {
                ticker.tick().await;
                if let Err(e) = self.reconciler.check_deliveries().await {
                    error!(error = %e, "delivery-status poll failed");
                }
            }
        };

        let completion = async {
            let mut ticker = interval(self.config.auto_complete_interval());
            loop {
                ticker.tick().await;
                if let Err(e) = self.reconciler.auto_complete().await {
                    error!(error = %e, "auto-completion poll failed");
                }
            }
        };

        tokio::join!(delivery, completion);
    }
}
