//! Biteship tracking lookup client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::TrackingConfig;
use crate::interfaces::tracking::{
    Result, ShipmentTracking, TrackingError, TrackingEvent, TrackingLookup,
};

/// Courier aggregator lookup over Biteship's public tracking endpoint.
pub struct BiteshipTracker {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl BiteshipTracker {
    pub fn new(config: &TrackingConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TrackingResponse {
    status: Option<String>,
    #[serde(default)]
    history: Vec<TrackingHistoryItem>,
}

#[derive(Debug, Deserialize)]
struct TrackingHistoryItem {
    status: Option<String>,
    note: Option<String>,
    updated_at: Option<String>,
}

#[async_trait]
impl TrackingLookup for BiteshipTracker {
    async fn lookup(&self, waybill_id: &str, courier_code: &str) -> Result<ShipmentTracking> {
        let url = format!(
            "{}/v1/trackings/{}/couriers/{}",
            self.base_url, waybill_id, courier_code
        );

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackingError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: TrackingResponse = response.json().await?;
        let shipment_status = body
            .status
            .ok_or_else(|| TrackingError::Malformed("missing status field".to_string()))?;

        let history = body
            .history
            .into_iter()
            .filter_map(|item| {
                let status = item.status?;
                let tracked_at = item
                    .updated_at
                    .as_deref()
                    .and_then(parse_courier_timestamp)
                    .unwrap_or_else(Utc::now);
                Some(TrackingEvent {
                    status,
                    note: item.note,
                    location: None,
                    tracked_at,
                })
            })
            .collect();

        debug!(
            waybill = %waybill_id,
            courier = %courier_code,
            status = %shipment_status,
            "tracking lookup completed"
        );

        Ok(ShipmentTracking {
            status: shipment_status,
            history,
        })
    }
}

fn parse_courier_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
