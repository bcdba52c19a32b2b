use std::{env, io};

use tracing::debug;

const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
const DEFAULT_USER_AGENT: &str = "duosync-geo/0.1 (life tracker map sync)";
const DEFAULT_RATE_LIMIT_MS: u64 = 1_000;

/// Tunables for one reconciliation run. The address heuristics (indicator
/// substrings, city names, alias lists) are lookup tables rather than
/// hardcoded constants so the cascade can be pointed at another locale.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub geocoder_endpoint: String,
    pub geocoder_user_agent: String,
    pub rate_limit_ms: u64,
    pub database_file_name: String,
    /// Substrings that mark a schema field as address-like, matched
    /// case-insensitively against field names.
    pub address_field_indicators: Vec<String>,
    pub region: String,
    pub country: String,
    /// Spellings of the region that should be recognized (and stripped by
    /// the aggressive cleaner), lowercase.
    pub region_aliases: Vec<String>,
    pub country_aliases: Vec<String>,
    /// Cities recognized inside raw addresses for the POI query.
    pub known_cities: Vec<String>,
    pub fallback_city: String,
    /// Generic neighborhood words the aggressive cleaner removes.
    pub noise_words: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            geocoder_endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            geocoder_user_agent: DEFAULT_USER_AGENT.to_string(),
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            database_file_name: "duosync.db".to_string(),
            address_field_indicators: to_strings(&["endereço", "address", "local"]),
            region: "Rio Grande do Norte".to_string(),
            country: "Brasil".to_string(),
            region_aliases: to_strings(&["rio grande do norte", "rn"]),
            country_aliases: to_strings(&["brasil", "brazil"]),
            known_cities: to_strings(&[
                "Natal",
                "Parnamirim",
                "Mossoró",
                "Tibau do Sul",
                "Pipa",
                "São Miguel do Gostoso",
            ]),
            fallback_city: "Natal".to_string(),
            noise_words: to_strings(&[
                "centro",
                "bairro",
                "conjunto",
                "loteamento",
                "zona norte",
                "zona sul",
            ]),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        Self {
            geocoder_endpoint: env::var("GEOCODER_ENDPOINT")
                .unwrap_or(defaults.geocoder_endpoint),
            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .unwrap_or(defaults.geocoder_user_agent),
            rate_limit_ms: parse_u64("SYNC_RATE_LIMIT_MS", defaults.rate_limit_ms),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or(defaults.database_file_name),
            address_field_indicators: parse_list(
                "SYNC_ADDRESS_FIELD_INDICATORS",
                defaults.address_field_indicators,
            ),
            region: env::var("SYNC_REGION").unwrap_or(defaults.region),
            country: env::var("SYNC_COUNTRY").unwrap_or(defaults.country),
            region_aliases: parse_list("SYNC_REGION_ALIASES", defaults.region_aliases),
            country_aliases: parse_list("SYNC_COUNTRY_ALIASES", defaults.country_aliases),
            known_cities: parse_list("SYNC_KNOWN_CITIES", defaults.known_cities),
            fallback_city: env::var("SYNC_FALLBACK_CITY").unwrap_or(defaults.fallback_city),
            noise_words: parse_list("SYNC_NOISE_WORDS", defaults.noise_words),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_list(key: &str, default: Vec<String>) -> Vec<String> {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    let values: Vec<String> = raw
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();
    if values.is_empty() {
        default
    } else {
        values
    }
}
