use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::geocode::Geocoder;
use crate::limiter::RateLimiter;
use crate::records::Coordinates;

// Brazilian CEP: five digits, optional hyphen, three digits.
static POSTAL_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5}-?\d{3}\b").unwrap());
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    Exact,
    ContextAdded,
    PoiSearch,
    AggressiveClean,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Exact => "Exact",
            Strategy::ContextAdded => "ContextAdded",
            Strategy::PoiSearch => "PoiSearch",
            Strategy::AggressiveClean => "AggressiveClean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CascadeHit {
    pub strategy: Strategy,
    pub query: String,
    pub coordinates: Coordinates,
}

/// Definitive failure for one record: every applicable strategy missed.
#[derive(Debug, Clone)]
pub struct CascadeMiss {
    pub tried: Vec<Strategy>,
    pub final_query: String,
}

/// Ordered address-resolution attempts of increasing aggressiveness. Stops at
/// the first strategy that yields coordinates; the shared rate limiter is
/// awaited before every outbound call.
pub struct FallbackCascade {
    geocoder: Arc<dyn Geocoder>,
    limiter: Arc<RateLimiter>,
    config: SyncConfig,
}

impl FallbackCascade {
    pub fn new(geocoder: Arc<dyn Geocoder>, limiter: Arc<RateLimiter>, config: SyncConfig) -> Self {
        Self {
            geocoder,
            limiter,
            config,
        }
    }

    pub async fn resolve(
        &self,
        title: &str,
        raw_address: &str,
    ) -> Result<CascadeHit, CascadeMiss> {
        let attempts = self.build_attempts(title, raw_address);
        let mut tried = Vec::with_capacity(attempts.len());
        let mut final_query = raw_address.trim().to_string();

        for (strategy, query) in attempts {
            self.limiter.wait().await;
            tried.push(strategy);
            final_query = query.clone();

            match self.geocoder.resolve(&query).await {
                Ok(Some(coordinates)) => {
                    debug!(
                        strategy = strategy.as_str(),
                        query,
                        "cascade strategy resolved address"
                    );
                    return Ok(CascadeHit {
                        strategy,
                        query,
                        coordinates,
                    });
                }
                Ok(None) => {
                    debug!(strategy = strategy.as_str(), query, "strategy missed");
                }
                Err(err) => {
                    warn!(
                        ?err,
                        strategy = strategy.as_str(),
                        query,
                        "geocoder failed during cascade attempt"
                    );
                }
            }
        }

        Err(CascadeMiss { tried, final_query })
    }

    fn build_attempts(&self, title: &str, raw_address: &str) -> Vec<(Strategy, String)> {
        let raw = raw_address.trim();
        let mut attempts = vec![(Strategy::Exact, raw.to_string())];

        // Only worth adding context when the address does not already
        // mention the country.
        if !contains_any(raw, &self.config.country_aliases) {
            attempts.push((
                Strategy::ContextAdded,
                format!("{raw}, {}, {}", self.config.region, self.config.country),
            ));
        }

        attempts.push((Strategy::PoiSearch, self.poi_query(title, raw)));
        attempts.push((
            Strategy::AggressiveClean,
            clean_address(raw, &self.config),
        ));
        attempts
    }

    fn poi_query(&self, title: &str, raw_address: &str) -> String {
        let city = self
            .config
            .known_cities
            .iter()
            .find(|city| contains_ci(raw_address, city))
            .unwrap_or(&self.config.fallback_city);
        format!(
            "{title}, {city}, {}, {}",
            self.config.region, self.config.country
        )
    }
}

/// Last-resort query construction: drop everything a geocoder tends to choke
/// on (postal codes, region/country tokens, generic neighborhood words, loose
/// house numbers), normalize separators, and anchor the result to the
/// fallback city.
pub fn clean_address(raw_address: &str, config: &SyncConfig) -> String {
    let mut text = POSTAL_CODE.replace_all(raw_address, " ").into_owned();

    let tokens: Vec<&String> = config
        .region_aliases
        .iter()
        .chain(config.country_aliases.iter())
        .chain(config.noise_words.iter())
        .collect();
    if !tokens.is_empty() {
        let alternation = tokens
            .iter()
            .map(|token| regex::escape(token))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"(?i)\b(?:{alternation})\b");
        // tokens are escaped literals, the alternation always compiles
        let stripper = Regex::new(&pattern).expect("escaped token alternation");
        text = stripper.replace_all(&text, " ").into_owned();
    }

    text = DIGIT_RUN.replace_all(&text, " ").into_owned();

    let cleaned = text
        .split(',')
        .map(|segment| MULTI_SPACE.replace_all(segment.trim(), " ").into_owned())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    if contains_ci(&cleaned, &config.fallback_city) {
        cleaned
    } else if cleaned.is_empty() {
        config.fallback_city.clone()
    } else {
        format!("{cleaned}, {}", config.fallback_city)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| contains_ci(haystack, needle))
}
