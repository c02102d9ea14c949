// src/model.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a survey as reported by the vendor dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyStatus {
    Active,
    Paused,
    Closed,
    Unknown,
}

impl SurveyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SurveyStatus::Active => "active",
            SurveyStatus::Paused => "paused",
            SurveyStatus::Closed => "closed",
            SurveyStatus::Unknown => "unknown",
        }
    }
}

/// Canonical per-survey record. All presentation layers consume this shape;
/// fields the vendor sends but we do not model yet stay in `raw`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyState {
    pub id: String,
    pub title: String,
    pub status: SurveyStatus,
    pub target: u64,
    pub completes: u64,
    pub cpi: f64,
    pub current_cost: f64,
    /// Length of interview in minutes, when the vendor reports it.
    pub loi: Option<f64>,
    /// Incidence rate normalized to the (0, 1] range; `None` when the source
    /// value was missing or non-positive.
    pub incidence_rate: Option<f64>,
    #[serde(rename = "_raw", default, skip_serializing_if = "Value::is_null")]
    pub raw: Value,
}

/// Per-quota record scoped to a survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaState {
    pub quota_id: String,
    pub group_key: String,
    pub display_name: String,
    pub achieved: u64,
    pub required_count: u64,
    pub current_target: u64,
    pub currently_open: u64,
    pub in_progress: u64,
}

/// Everything observed in one polling cycle. The scheduler keeps exactly the
/// most recent snapshot for diffing; no history beyond one prior cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub surveys: BTreeMap<String, SurveyState>,
    pub quotas: BTreeMap<String, Vec<QuotaState>>,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Self {
            surveys: BTreeMap::new(),
            quotas: BTreeMap::new(),
            taken_at,
        }
    }
}

/// Fields tracked by the change detector, in the order they are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeField {
    Appeared,
    Disappeared,
    Status,
    Completes,
    Target,
    Cpi,
    CurrentCost,
    QuotaAchieved,
    QuotaCurrentlyOpen,
}

/// One side of a field comparison. Serialized untagged so sinks receive plain
/// JSON values rather than enum wrappers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Absent,
    Status(SurveyStatus),
    Count(u64),
    Decimal(f64),
    Text(String),
}

/// Produced by the change detector, consumed once by the dispatcher, then
/// discarded. `quota_id` is set only for quota-level changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub survey_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_id: Option<String>,
    pub field: ChangeField,
    pub old: FieldValue,
    pub new: FieldValue,
    pub observed_at: DateTime<Utc>,
}
