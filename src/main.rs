use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use duosync_geo::{
    init_tracing, LocationReconciler, NominatimClient, RecordSink, RecordSource, SqliteStore,
    SyncConfig,
};

/// Resolve addresses of completed items to map coordinates.
#[derive(Debug, Parser)]
#[command(name = "duosync-geo", version)]
struct Cli {
    /// Re-resolve records that already have coordinates.
    #[arg(long)]
    force: bool,
    /// Path to the item database (defaults to DATABASE_FILE_NAME).
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    let db_path = cli
        .db
        .unwrap_or_else(|| PathBuf::from(&config.database_file_name));
    let store = Arc::new(SqliteStore::open(&db_path).context("opening item store")?);
    let geocoder = Arc::new(NominatimClient::new(&config).context("building geocoding client")?);

    let source: Arc<dyn RecordSource> = store.clone();
    let sink: Arc<dyn RecordSink> = store;
    let reconciler = LocationReconciler::new(source, sink, geocoder, config);

    let summary = reconciler
        .run(cli.force)
        .await
        .context("reconciliation run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
