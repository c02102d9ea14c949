// src/normalize.rs
//
// Converts raw vendor payloads into the canonical `SurveyState` /
// `QuotaState` shapes. The vendor renames fields between dashboard releases,
// so every lookup goes through an ordered candidate-key list; the first key
// that yields a usable value wins.

use serde::Deserialize;
use serde_json::Value;

use crate::fetch::{RawQuota, RawSurvey};
use crate::model::{QuotaState, SurveyState, SurveyStatus};

const TITLE_KEYS: &[&str] = &["title", "survey_title", "survey_localization_title"];
const STATUS_KEYS: &[&str] = &["status", "ps_survey_status", "state"];
const TARGET_KEYS: &[&str] = &["target", "completes_required", "required_completes", "goal"];
const COMPLETES_KEYS: &[&str] = &["completes", "total_completes", "fielded"];
const CPI_KEYS: &[&str] = &["cpi", "cost_per_interview"];
const COST_KEYS: &[&str] = &["currentCost", "current_cost", "total_cost"];
const LOI_KEYS: &[&str] = &["loi", "expected_loi", "length_of_interview"];
const IR_KEYS: &[&str] = &[
    "incidence_rate",
    "expected_ir",
    "current_incidence",
    "incidence",
];

pub fn normalize_survey(id: &str, raw: &RawSurvey) -> SurveyState {
    let v = &raw.0;
    SurveyState {
        id: id.to_string(),
        title: pick_string(v, TITLE_KEYS).unwrap_or_else(|| "Untitled Survey".to_string()),
        status: map_status(pick(v, STATUS_KEYS)),
        target: pick_count(v, TARGET_KEYS),
        completes: pick_count(v, COMPLETES_KEYS),
        cpi: pick_f64(v, CPI_KEYS).unwrap_or(0.0),
        current_cost: pick_f64(v, COST_KEYS).unwrap_or(0.0),
        loi: pick_f64(v, LOI_KEYS).filter(|x| *x > 0.0),
        incidence_rate: pick_f64(v, IR_KEYS).and_then(normalize_incidence),
        raw: v.clone(),
    }
}

pub fn normalize_quota(raw: &RawQuota) -> QuotaState {
    let v = &raw.0;
    let required_count = pick_count(v, &["required_count", "required"]);
    QuotaState {
        quota_id: pick_string(v, &["quota_id", "id"]).unwrap_or_default(),
        group_key: pick_string(v, &["group_key", "group"])
            .unwrap_or_else(|| "General".to_string()),
        display_name: quota_display_name(raw),
        achieved: pick_count(v, &["achieved", "fielded"]),
        required_count,
        current_target: pick(v, &["current_target"])
            .and_then(as_u64)
            .unwrap_or(required_count),
        currently_open: pick_count(v, &["currently_open", "open"]),
        in_progress: pick_count(v, &["in_progress"]),
    }
}

/// Normalize the vendor's incidence value to a (0, 1] fraction.
///
/// Observed source conventions, in priority order: already a fraction,
/// a 0-100 percentage, or a percent-of-percent encoding with two implied
/// decimal shifts. Non-positive input means "unknown", not zero.
pub fn normalize_incidence(raw: f64) -> Option<f64> {
    if raw <= 0.0 {
        None
    } else if raw <= 1.0 {
        Some(raw)
    } else if raw <= 100.0 {
        Some(raw / 100.0)
    } else {
        Some(raw / 10_000.0)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawCriterion {
    #[serde(default)]
    qualification_name: String,
    #[serde(default)]
    condition_names: Vec<String>,
    #[serde(default)]
    range_sets: Vec<RawRange>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRange {
    from: Option<i64>,
    to: Option<i64>,
}

/// Build a human-readable quota name from its criteria.
///
/// Gender contributes the first condition name, Age contributes the first
/// complete range as "{from}-{to} yr". Other qualifications are not
/// reflected in the name. Falls back to the quota's own title, then to
/// "General Quota".
pub fn quota_display_name(raw: &RawQuota) -> String {
    let fallback = || {
        pick_string(&raw.0, &["quota_title", "title"])
            .unwrap_or_else(|| "General Quota".to_string())
    };

    let criteria: Vec<RawCriterion> = match raw.0.get("criteria") {
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
        None => Vec::new(),
    };
    if criteria.is_empty() {
        return fallback();
    }

    let mut parts = Vec::new();
    for criterion in &criteria {
        match criterion.qualification_name.as_str() {
            "Gender" => {
                if let Some(first) = criterion.condition_names.first() {
                    parts.push(first.clone());
                }
            }
            "Age" => {
                if let Some(range) = criterion.range_sets.first() {
                    if let (Some(from), Some(to)) = (range.from, range.to) {
                        parts.push(format!("{from}-{to} yr"));
                    }
                }
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        fallback()
    } else {
        parts.join(", ")
    }
}

fn map_status(v: Option<&Value>) -> SurveyStatus {
    match v {
        Some(Value::Number(n)) => status_from_code(n.as_i64().unwrap_or(-1)),
        Some(Value::String(s)) => {
            if let Ok(code) = s.parse::<i64>() {
                return status_from_code(code);
            }
            match s.to_ascii_lowercase().as_str() {
                "live" | "active" => SurveyStatus::Active,
                "paused" | "pause" => SurveyStatus::Paused,
                "closed" | "complete" | "completed" => SurveyStatus::Closed,
                _ => SurveyStatus::Unknown,
            }
        }
        _ => SurveyStatus::Unknown,
    }
}

// Vendor status codes: 11 live, 22 paused, 33 closed.
fn status_from_code(code: i64) -> SurveyStatus {
    match code {
        11 => SurveyStatus::Active,
        22 => SurveyStatus::Paused,
        33 => SurveyStatus::Closed,
        _ => SurveyStatus::Unknown,
    }
}

fn pick<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| v.get(k))
        .find(|val| !val.is_null())
}

fn pick_string(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match v.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn pick_f64(v: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| v.get(k).and_then(as_f64))
}

/// Counts default to 0 when absent or non-numeric; negatives clamp to 0 so
/// downstream arithmetic never sees a bogus value.
fn pick_count(v: &Value, keys: &[&str]) -> u64 {
    pick(v, keys).and_then(as_u64).unwrap_or(0)
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    as_f64(v).map(|x| if x.is_sign_negative() { 0 } else { x as u64 })
}
