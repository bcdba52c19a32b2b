pub mod cascade;
pub mod config;
pub mod errors;
pub mod extract;
pub mod geocode;
pub mod limiter;
pub mod reconcile;
pub mod records;
pub mod store;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cascade::{clean_address, CascadeHit, CascadeMiss, FallbackCascade, Strategy};
pub use config::SyncConfig;
pub use errors::{AppError, AppResult};
pub use extract::{extract_address, ExtractedAddress};
pub use geocode::{Geocoder, NominatimClient};
pub use limiter::RateLimiter;
pub use reconcile::{LocationReconciler, SyncSummary};
pub use records::{
    CandidateRecord, Coordinates, FieldDescriptor, FieldType, PropertyValue, RecordSink,
    RecordSource, RecordStatus, RecordUpdate,
};
pub use store::SqliteStore;

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,duosync_geo=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
