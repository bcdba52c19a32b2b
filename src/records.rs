use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Planned,
    Realized,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Planned => "Planned",
            RecordStatus::Realized => "Realized",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "Planned" => Ok(RecordStatus::Planned),
            "Realized" => Ok(RecordStatus::Realized),
            _ => Err(AppError::Parse(format!("unknown item status: {value}"))),
        }
    }
}

/// Declared type of a schema field. Only `Address` is meaningful here, but
/// the full enumeration is kept so stored schemas round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Checkbox,
    Date,
    Link,
    Rating,
    Select,
    Tags,
    Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// One value in an item's dynamic property bag. Values are heterogeneous;
/// shapes this core does not understand land in `Other` and are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Flag(bool),
    Tags(Vec<String>),
    Empty,
    Other(serde_json::Value),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Latitude/longitude pair. Always produced together; a record never ends up
/// with one half of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub title: String,
    pub status: RecordStatus,
    pub properties: HashMap<String, PropertyValue>,
    pub schema: Vec<FieldDescriptor>,
    pub coordinates: Option<Coordinates>,
}

/// Staged persistence write for one successfully resolved record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordUpdate {
    pub record_id: String,
    pub address: String,
    pub coordinates: Coordinates,
    pub geocoded_at: DateTime<Utc>,
}

/// Query capability over the backing store. A failure here aborts the whole
/// reconciliation run.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Returns all `Realized` records; with `only_unresolved` the store may
    /// additionally filter to records whose coordinates are null.
    async fn fetch_candidates(&self, only_unresolved: bool) -> AppResult<Vec<CandidateRecord>>;
}

/// Per-record update capability. Calls are independent; one failed write
/// must not prevent the others from being attempted.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn apply(&self, update: &RecordUpdate) -> AppResult<()>;
}
