//! Domain payloads
//!
//! Collaborators hand back JSON. [`DomainData::decode`] checks the envelope
//! for the requested key and produces a typed value; a shape mismatch is a
//! [`FetchError::Parse`]. Row contents stay opaque: normalizing spreadsheet
//! rows is the collaborator's job.

use crate::error::FetchError;
use crate::key::{DomainKey, YearMonth};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One normalized spreadsheet row
pub type Row = Map<String, Value>;

/// Months with stored snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyIndex {
    /// Known months, as reported upstream
    pub months: Vec<YearMonth>,
    /// Most recent month, if any
    #[serde(default)]
    pub latest_month: Option<YearMonth>,
    /// Free-form metadata per month
    #[serde(default)]
    pub meta_by_month: BTreeMap<String, Value>,
}

/// Aggregates computed upstream for a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    /// Number of rows in the snapshot
    pub total_rows: u64,
    /// Mean progress percentage
    pub avg_progress_pct: f64,
    /// Total headcount
    pub total_manpower: f64,
}

/// Rows and summary for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot rows
    pub rows: Vec<Row>,
    /// Precomputed aggregates
    pub summary: SnapshotSummary,
}

/// Snapshot endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySnapshot {
    /// Month the snapshot belongs to
    pub month: YearMonth,
    /// Snapshot body
    pub snapshot: Snapshot,
}

#[derive(Deserialize)]
struct RowsEnvelope {
    data: Vec<Row>,
}

#[derive(Deserialize)]
struct InsightsEnvelope {
    insights: Value,
}

/// Decoded data for any domain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "domain", content = "data", rename_all = "camelCase")]
pub enum DomainData {
    /// Progress rows
    Progress(Vec<Row>),
    /// Manpower rows
    Manpower(Vec<Row>),
    /// Generated insights, opaque
    AiInsights(Value),
    /// Risk register rows
    Risk(Vec<Row>),
    /// Month index
    MonthlyIndex(MonthlyIndex),
    /// One month's snapshot
    MonthlySnapshot(MonthlySnapshot),
}

impl DomainData {
    /// Decode a collaborator payload for `key`
    ///
    /// # Errors
    /// `FetchError::Parse` if the payload does not match the domain's envelope,
    /// or if a snapshot belongs to a different month than requested
    pub fn decode(key: &DomainKey, payload: Value) -> Result<Self, FetchError> {
        let data = match key {
            DomainKey::Progress => Self::Progress(rows(payload)?),
            DomainKey::Manpower => Self::Manpower(rows(payload)?),
            DomainKey::Risk => Self::Risk(rows(payload)?),
            DomainKey::AiInsights => {
                let envelope: InsightsEnvelope = serde_json::from_value(payload)?;
                Self::AiInsights(envelope.insights)
            }
            DomainKey::MonthlyIndex => Self::MonthlyIndex(serde_json::from_value(payload)?),
            DomainKey::MonthlySnapshot(requested) => {
                let snapshot: MonthlySnapshot = serde_json::from_value(payload)?;
                if &snapshot.month != requested {
                    return Err(FetchError::Parse(format!(
                        "snapshot for {} returned for {requested}",
                        snapshot.month
                    )));
                }
                Self::MonthlySnapshot(snapshot)
            }
        };
        Ok(data)
    }

    /// Number of rows carried, zero for non-tabular data
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Progress(rows) | Self::Manpower(rows) | Self::Risk(rows) => rows.len(),
            Self::MonthlySnapshot(snapshot) => snapshot.snapshot.rows.len(),
            Self::MonthlyIndex(index) => index.months.len(),
            Self::AiInsights(_) => 0,
        }
    }
}

fn rows(payload: Value) -> Result<Vec<Row>, FetchError> {
    let envelope: RowsEnvelope = serde_json::from_value(payload)?;
    Ok(envelope.data)
}
