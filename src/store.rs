use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::records::{
    CandidateRecord, Coordinates, FieldDescriptor, PropertyValue, RecordSink, RecordSource,
    RecordStatus, RecordUpdate,
};

/// SQLite-backed item/category store. Mirrors the life tracker's data model:
/// categories own the user-defined schema, items carry the property bag plus
/// the resolved address/coordinate columns.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path)?;
        configure(&connection)?;
        run_migrations(&connection)?;
        info!(path = %path.display(), "item store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(connection)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> AppResult<Self> {
        let connection = Connection::open_in_memory()?;
        configure(&connection)?;
        run_migrations(&connection)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(connection)),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn insert_category(
        &self,
        id: &str,
        title: &str,
        schema: &[FieldDescriptor],
    ) -> AppResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO categories (id, title, template_schema) VALUES (?1, ?2, ?3)",
            params![id, title, serde_json::to_string(schema)?],
        )?;
        Ok(())
    }

    pub fn insert_item(
        &self,
        id: &str,
        category_id: &str,
        title: &str,
        status: RecordStatus,
        properties: &HashMap<String, PropertyValue>,
    ) -> AppResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO items (id, category_id, title, status, properties_value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                category_id,
                title,
                status.as_str(),
                serde_json::to_string(properties)?
            ],
        )?;
        Ok(())
    }
}

fn configure(conn: &Connection) -> AppResult<()> {
    conn.pragma_update(None, "foreign_keys", 1_i64)?;
    // journal_mode reports the resulting mode as a row
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            template_schema TEXT NOT NULL DEFAULT '[]'
        );
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL REFERENCES categories(id),
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Planned',
            properties_value TEXT NOT NULL DEFAULT '{}',
            address TEXT,
            latitude REAL,
            longitude REAL,
            geocoded_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);",
    )?;
    Ok(())
}

struct ItemRow {
    id: String,
    title: String,
    status: String,
    properties_json: String,
    schema_json: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn parse_candidate(row: ItemRow) -> AppResult<CandidateRecord> {
    let schema: Vec<FieldDescriptor> = serde_json::from_str(&row.schema_json)
        .map_err(|err| AppError::Parse(format!("template_schema of item {}: {err}", row.id)))?;
    let properties: HashMap<String, PropertyValue> = serde_json::from_str(&row.properties_json)
        .map_err(|err| AppError::Parse(format!("properties_value of item {}: {err}", row.id)))?;

    // coordinates count only when both halves are present
    let coordinates = match (row.latitude, row.longitude) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        _ => None,
    };

    Ok(CandidateRecord {
        id: row.id,
        title: row.title,
        status: RecordStatus::parse(&row.status)?,
        properties,
        schema,
        coordinates,
    })
}

#[async_trait]
impl RecordSource for SqliteStore {
    async fn fetch_candidates(&self, only_unresolved: bool) -> AppResult<Vec<CandidateRecord>> {
        let rows = {
            let conn = self.conn.lock();
            let sql = if only_unresolved {
                "SELECT i.id, i.title, i.status, i.properties_value, c.template_schema,
                        i.latitude, i.longitude
                 FROM items i JOIN categories c ON c.id = i.category_id
                 WHERE i.status = 'Realized' AND i.latitude IS NULL
                 ORDER BY i.id"
            } else {
                "SELECT i.id, i.title, i.status, i.properties_value, c.template_schema,
                        i.latitude, i.longitude
                 FROM items i JOIN categories c ON c.id = i.category_id
                 WHERE i.status = 'Realized'
                 ORDER BY i.id"
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| {
                Ok(ItemRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    status: row.get(2)?,
                    properties_json: row.get(3)?,
                    schema_json: row.get(4)?,
                    latitude: row.get(5)?,
                    longitude: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(parse_candidate).collect()
    }
}

#[async_trait]
impl RecordSink for SqliteStore {
    async fn apply(&self, update: &RecordUpdate) -> AppResult<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE items
             SET address = ?1, latitude = ?2, longitude = ?3, geocoded_at = ?4
             WHERE id = ?5",
            params![
                update.address,
                update.coordinates.lat,
                update.coordinates.lng,
                update
                    .geocoded_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                update.record_id
            ],
        )?;
        if affected == 0 {
            return Err(AppError::Config(format!(
                "no item with id {} to update",
                update.record_id
            )));
        }
        Ok(())
    }
}
