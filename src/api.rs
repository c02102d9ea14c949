// src/api.rs
//
// Read-only query surface over the most recently completed snapshot. Never
// triggers a fetch; freshness is the poller's job, and responses carry a
// `stale` flag when the latest cycle failed.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;

use crate::model::{QuotaState, SurveyState};
use crate::poller::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/surveys", get(list_surveys))
        .route("/api/quotas/{survey_id}", get(survey_quotas))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct SurveysResp {
    surveys: BTreeMap<String, SurveyState>,
    taken_at: Option<DateTime<Utc>>,
    stale: bool,
}

async fn list_surveys(State(state): State<AppState>) -> Json<SurveysResp> {
    let view = state.store.current();
    // No completed cycle yet reads as empty and explicitly stale.
    let stale = view.stale || view.snapshot.is_none();
    let (surveys, taken_at) = match view.snapshot {
        Some(snap) => (snap.surveys, Some(snap.taken_at)),
        None => (BTreeMap::new(), None),
    };
    Json(SurveysResp {
        surveys,
        taken_at,
        stale,
    })
}

#[derive(serde::Serialize)]
struct QuotasResp {
    survey_id: String,
    quotas: Vec<QuotaState>,
    taken_at: DateTime<Utc>,
    stale: bool,
}

async fn survey_quotas(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
) -> Result<Json<QuotasResp>, StatusCode> {
    let view = state.store.current();
    let Some(snap) = view.snapshot else {
        return Err(StatusCode::NOT_FOUND);
    };
    if !snap.surveys.contains_key(&survey_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let quotas = snap.quotas.get(&survey_id).cloned().unwrap_or_default();
    Ok(Json(QuotasResp {
        survey_id,
        quotas,
        taken_at: snap.taken_at,
        stale: view.stale,
    }))
}
