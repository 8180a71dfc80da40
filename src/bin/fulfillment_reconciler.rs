//! fulfillment-reconciler: long-lived poll loop.
//!
//! Runs the delivery-status and auto-completion polls on their configured
//! cadences for deployments without an external cron. Shares the SQLite
//! store with fulfillment-server; overlapping runs are safe.

use std::sync::Arc;

use tracing::{error, info, warn};

use ecomaggie_fulfillment::clients::{BiteshipTracker, HttpNotifier, LogNotifier};
use ecomaggie_fulfillment::config::Config;
use ecomaggie_fulfillment::interfaces::notifier::Notifier;
use ecomaggie_fulfillment::interfaces::order_store::OrderStore;
use ecomaggie_fulfillment::interfaces::tracking::TrackingLookup;
use ecomaggie_fulfillment::services::{Reconciler, ReconcilerScheduler, TransitionApplier};
use ecomaggie_fulfillment::storage::{self, SqliteOrderStore};
use ecomaggie_fulfillment::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e.to_string()
    })?;

    info!("Starting fulfillment-reconciler");

    let pool = storage::connect(&config.storage.database_url).await?;
    let store = Arc::new(SqliteOrderStore::new(pool));
    store.init().await?;
    let store: Arc<dyn OrderStore> = store;

    let notifier: Arc<dyn Notifier> = match &config.notifier.endpoint {
        Some(endpoint) => Arc::new(HttpNotifier::new(&config.notifier, endpoint.clone())?),
        None => {
            warn!("no notifier endpoint configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };
    let tracking: Arc<dyn TrackingLookup> = Arc::new(BiteshipTracker::new(&config.tracking)?);

    let applier = Arc::new(TransitionApplier::new(
        Arc::clone(&store),
        notifier,
        config.business.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        store,
        applier,
        tracking,
        config.reconciler.clone(),
    ));

    let scheduler = ReconcilerScheduler::new(reconciler, config.reconciler.clone());
    scheduler.run().await;
    Ok(())
}
