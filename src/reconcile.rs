use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cascade::FallbackCascade;
use crate::config::SyncConfig;
use crate::errors::AppResult;
use crate::extract::{extract_address, ExtractedAddress};
use crate::geocode::Geocoder;
use crate::limiter::RateLimiter;
use crate::records::{RecordSink, RecordSource, RecordUpdate};

/// Outcome of one reconciliation run. `logs` holds one human-readable line
/// per record, in processing order, plus a trailing line per failed write.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub success: bool,
    pub total_found: usize,
    pub updated: usize,
    pub logs: Vec<String>,
}

/// Walks all completed records, decides per record whether resolution is
/// needed, runs the fallback cascade, and applies staged updates as
/// independent writes once the whole batch has been examined.
pub struct LocationReconciler {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn RecordSink>,
    cascade: FallbackCascade,
    indicators: Vec<String>,
}

impl LocationReconciler {
    pub fn new(
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn RecordSink>,
        geocoder: Arc<dyn Geocoder>,
        config: SyncConfig,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(config.rate_limit_ms)));
        let indicators = config.address_field_indicators.clone();
        Self {
            source,
            sink,
            cascade: FallbackCascade::new(geocoder, limiter, config),
            indicators,
        }
    }

    pub async fn run(&self, force_update: bool) -> AppResult<SyncSummary> {
        // The skip decision is made per record, so fetch the full completed
        // set; a fetch failure is the one fatal error of a run.
        let candidates = match self.source.fetch_candidates(false).await {
            Ok(candidates) => candidates,
            Err(err) => {
                error!(?err, "failed to fetch candidate records");
                return Err(err);
            }
        };

        let total_found = candidates.len();
        info!(total_found, force_update, "starting location reconciliation");

        let mut logs = Vec::with_capacity(total_found);
        let mut staged: Vec<RecordUpdate> = Vec::new();

        for record in &candidates {
            let address =
                match extract_address(&record.schema, &record.properties, &self.indicators) {
                    ExtractedAddress::NoAddressField => {
                        logs.push(format!(
                            "Skipped: {} (No address field found in category)",
                            record.title
                        ));
                        continue;
                    }
                    ExtractedAddress::EmptyValue => {
                        logs.push(format!("Skipped: {} (Empty address value)", record.title));
                        continue;
                    }
                    ExtractedAddress::Found(address) => address,
                };

            if !force_update && record.coordinates.is_some() {
                logs.push(format!(
                    "Skipped: {} (Already has coordinates)",
                    record.title
                ));
                continue;
            }

            match self.cascade.resolve(&record.title, &address).await {
                Ok(hit) => {
                    logs.push(format!(
                        "Synced: {} -> {} ({}, {}) [{}]",
                        record.title,
                        hit.query,
                        hit.coordinates.lat,
                        hit.coordinates.lng,
                        hit.strategy.as_str()
                    ));
                    staged.push(RecordUpdate {
                        record_id: record.id.clone(),
                        address,
                        coordinates: hit.coordinates,
                        geocoded_at: Utc::now(),
                    });
                }
                Err(miss) => {
                    let tried = miss
                        .tried
                        .iter()
                        .map(|strategy| strategy.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    logs.push(format!(
                        "Failed to geocode: {} -> {} (tried: {})",
                        record.title, miss.final_query, tried
                    ));
                }
            }
        }

        // Writes are independent; one failure must not block the rest, and
        // the updated count only reflects writes that actually landed.
        let mut updated = 0;
        for update in &staged {
            match self.sink.apply(update).await {
                Ok(()) => updated += 1,
                Err(err) => {
                    warn!(?err, record_id = %update.record_id, "staged update failed to persist");
                    logs.push(format!("Update failed: {} ({err})", update.record_id));
                }
            }
        }

        info!(total_found, updated, "location reconciliation finished");
        Ok(SyncSummary {
            success: true,
            total_found,
            updated,
            logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::errors::AppError;
    use crate::records::{
        CandidateRecord, Coordinates, FieldDescriptor, FieldType, PropertyValue, RecordStatus,
    };

    use super::*;

    struct FixedSource {
        records: Vec<CandidateRecord>,
        fail: bool,
    }

    #[async_trait]
    impl RecordSource for FixedSource {
        async fn fetch_candidates(
            &self,
            _only_unresolved: bool,
        ) -> AppResult<Vec<CandidateRecord>> {
            if self.fail {
                return Err(AppError::Config("store unavailable".into()));
            }
            Ok(self.records.clone())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        applied: Mutex<Vec<RecordUpdate>>,
        reject_ids: Vec<String>,
    }

    #[async_trait]
    impl RecordSink for CollectingSink {
        async fn apply(&self, update: &RecordUpdate) -> AppResult<()> {
            if self.reject_ids.contains(&update.record_id) {
                return Err(AppError::Config("write rejected".into()));
            }
            self.applied.lock().push(update.clone());
            Ok(())
        }
    }

    struct AlwaysHits {
        calls: AtomicUsize,
    }

    impl AlwaysHits {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Geocoder for AlwaysHits {
        async fn resolve(&self, _query: &str) -> AppResult<Option<Coordinates>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Coordinates {
                lat: -5.795,
                lng: -35.211,
            }))
        }
    }

    struct NeverHits {
        calls: AtomicUsize,
    }

    impl NeverHits {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Geocoder for NeverHits {
        async fn resolve(&self, _query: &str) -> AppResult<Option<Coordinates>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn address_schema() -> Vec<FieldDescriptor> {
        vec![FieldDescriptor {
            id: "addr".into(),
            name: "Endereço".into(),
            field_type: FieldType::Address,
        }]
    }

    fn record(
        id: &str,
        title: &str,
        schema: Vec<FieldDescriptor>,
        address: Option<&str>,
        coordinates: Option<Coordinates>,
    ) -> CandidateRecord {
        let mut properties = HashMap::new();
        if let Some(address) = address {
            properties.insert("addr".to_string(), PropertyValue::Text(address.into()));
        }
        CandidateRecord {
            id: id.into(),
            title: title.into(),
            status: RecordStatus::Realized,
            properties,
            schema,
            coordinates,
        }
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            rate_limit_ms: 0,
            ..SyncConfig::default()
        }
    }

    fn reconciler(
        records: Vec<CandidateRecord>,
        geocoder: Arc<dyn Geocoder>,
        sink: Arc<CollectingSink>,
    ) -> LocationReconciler {
        let source = Arc::new(FixedSource {
            records,
            fail: false,
        });
        LocationReconciler::new(source, sink, geocoder, test_config())
    }

    #[tokio::test]
    async fn mixed_batch_matches_expected_summary() {
        // (a) no address field, (b) fresh record resolved via Exact,
        // (c) already has coordinates and force is off.
        let records = vec![
            record("a", "Sem campo", Vec::new(), None, None),
            record(
                "b",
                "Restaurante",
                address_schema(),
                Some("Av. Roberto Freire, 100"),
                None,
            ),
            record(
                "c",
                "Já resolvido",
                address_schema(),
                Some("Rua Velha, 1"),
                Some(Coordinates { lat: 1.0, lng: 2.0 }),
            ),
        ];
        let geocoder = Arc::new(AlwaysHits::new());
        let sink = Arc::new(CollectingSink::default());
        let summary = reconciler(records, geocoder.clone(), sink.clone())
            .run(false)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.total_found, 3);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.logs.len(), 3);
        assert!(summary.logs[0].contains("No address field found"));
        assert!(summary.logs[1].contains("[Exact]"));
        assert!(summary.logs[2].contains("Already has coordinates"));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);

        let applied = sink.applied.lock();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].record_id, "b");
        assert_eq!(applied[0].address, "Av. Roberto Freire, 100");
    }

    #[tokio::test]
    async fn skips_without_any_network_call() {
        let records = vec![
            record("a", "Sem campo", Vec::new(), None, None),
            record("b", "Vazio", address_schema(), Some("   "), None),
        ];
        let geocoder = Arc::new(AlwaysHits::new());
        let sink = Arc::new(CollectingSink::default());
        let summary = reconciler(records, geocoder.clone(), sink)
            .run(false)
            .await
            .unwrap();

        assert_eq!(summary.updated, 0);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert!(summary.logs[0].contains("No address field found"));
        assert!(summary.logs[1].contains("Empty address value"));
    }

    #[tokio::test]
    async fn force_update_re_resolves_existing_coordinates() {
        let records = vec![record(
            "a",
            "Forçado",
            address_schema(),
            Some("Rua Potengi, 500"),
            Some(Coordinates { lat: 9.0, lng: 9.0 }),
        )];
        let geocoder = Arc::new(AlwaysHits::new());
        let sink = Arc::new(CollectingSink::default());
        let summary = reconciler(records, geocoder.clone(), sink.clone())
            .run(true)
            .await
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        let applied = sink.applied.lock();
        assert_eq!(applied[0].coordinates, Coordinates { lat: -5.795, lng: -35.211 });
    }

    #[tokio::test]
    async fn second_run_is_idempotent_once_coordinates_exist() {
        let fresh = vec![record(
            "a",
            "Novo",
            address_schema(),
            Some("Rua do Sol, 20"),
            None,
        )];
        let geocoder = Arc::new(AlwaysHits::new());
        let sink = Arc::new(CollectingSink::default());
        let first = reconciler(fresh, geocoder.clone(), sink.clone())
            .run(false)
            .await
            .unwrap();
        assert_eq!(first.updated, 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);

        // same record, now carrying the coordinates the first run wrote
        let resolved_coords = sink.applied.lock()[0].coordinates;
        let second_batch = vec![record(
            "a",
            "Novo",
            address_schema(),
            Some("Rua do Sol, 20"),
            Some(resolved_coords),
        )];
        let second = reconciler(second_batch, geocoder.clone(), sink)
            .run(false)
            .await
            .unwrap();

        assert_eq!(second.updated, 0);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert!(second.logs[0].contains("Already has coordinates"));
    }

    #[tokio::test]
    async fn total_cascade_failure_logs_diagnostics_and_stages_nothing() {
        let records = vec![record(
            "a",
            "Perdido",
            address_schema(),
            Some("Rua Inexistente, 999"),
            None,
        )];
        let geocoder = Arc::new(NeverHits::new());
        let sink = Arc::new(CollectingSink::default());
        let summary = reconciler(records, geocoder.clone(), sink.clone())
            .run(false)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.updated, 0);
        // no country in the raw address, so all four strategies fire
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 4);
        assert!(summary.logs[0].contains("Failed to geocode: Perdido"));
        assert!(summary.logs[0].contains("Exact, ContextAdded, PoiSearch, AggressiveClean"));
        assert!(sink.applied.lock().is_empty());
    }

    #[tokio::test]
    async fn one_failed_write_does_not_block_the_rest() {
        let records = vec![
            record("a", "Primeiro", address_schema(), Some("Rua Um, 1"), None),
            record("b", "Segundo", address_schema(), Some("Rua Dois, 2"), None),
        ];
        let geocoder = Arc::new(AlwaysHits::new());
        let sink = Arc::new(CollectingSink {
            applied: Mutex::new(Vec::new()),
            reject_ids: vec!["a".to_string()],
        });
        let summary = reconciler(records, geocoder, sink.clone())
            .run(false)
            .await
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(sink.applied.lock()[0].record_id, "b");
        assert!(summary
            .logs
            .iter()
            .any(|line| line.starts_with("Update failed: a")));
    }

    #[tokio::test]
    async fn fetch_failure_aborts_the_run() {
        let source = Arc::new(FixedSource {
            records: Vec::new(),
            fail: true,
        });
        let sink = Arc::new(CollectingSink::default());
        let reconciler = LocationReconciler::new(
            source,
            sink,
            Arc::new(AlwaysHits::new()),
            test_config(),
        );

        let err = reconciler.run(false).await.expect_err("fetch fails");
        assert!(err.to_string().contains("store unavailable"));
    }
}
