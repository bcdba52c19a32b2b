use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::errors::AppResult;
use crate::records::Coordinates;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Single free-text lookup against a geocoding provider. `Ok(None)` means
/// "this query resolved to nothing"; implementations may also fail hard,
/// which the cascade treats the same as a miss for that attempt.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, query: &str) -> AppResult<Option<Coordinates>>;
}

/// Client for the OpenStreetMap Nominatim search endpoint. Never retries on
/// its own; the cascade retries at a higher level with different query text.
pub struct NominatimClient {
    http: reqwest::Client,
    endpoint: String,
}

impl NominatimClient {
    pub fn new(config: &SyncConfig) -> AppResult<Self> {
        // Nominatim's usage policy requires an identifying User-Agent;
        // anonymous clients risk being blocked.
        let http = reqwest::Client::builder()
            .user_agent(config.geocoder_user_agent.clone())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.geocoder_endpoint.clone(),
        })
    }
}

#[derive(Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn resolve(&self, query: &str) -> AppResult<Option<Coordinates>> {
        if query.trim().is_empty() {
            return Ok(None);
        }

        // Transport and HTTP failures both map to "no coordinates" so a
        // flaky provider never aborts a batch, but they are logged apart
        // from plain not-found results to keep outages diagnosable.
        let response = match self
            .http
            .get(&self.endpoint)
            .query(&[("format", "json"), ("q", query), ("limit", "1")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(?err, query, "geocoding request failed at transport level");
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, query, "geocoding service returned error status");
            return Ok(None);
        }

        let results: Vec<NominatimResult> = match response.json().await {
            Ok(results) => results,
            Err(err) => {
                warn!(?err, query, "geocoding response was not valid JSON");
                return Ok(None);
            }
        };

        let Some(first) = results.into_iter().next() else {
            debug!(query, "geocoding service found nothing");
            return Ok(None);
        };

        match (first.lat.parse::<f64>(), first.lon.parse::<f64>()) {
            (Ok(lat), Ok(lng)) => {
                debug!(
                    query,
                    lat,
                    lng,
                    display_name = first.display_name.as_deref().unwrap_or(""),
                    "geocoding hit"
                );
                Ok(Some(Coordinates { lat, lng }))
            }
            _ => {
                warn!(query, "geocoding result carried unparseable coordinates");
                Ok(None)
            }
        }
    }
}
