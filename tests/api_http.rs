// tests/api_http.rs
//
// HTTP-level tests for the query Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use survey_pulse::api::{create_router, AppState};
use survey_pulse::model::{QuotaState, Snapshot, SurveyState, SurveyStatus};
use survey_pulse::poller::SnapshotStore;

const BODY_LIMIT: usize = 1024 * 1024;

fn sample_snapshot() -> Snapshot {
    let mut snap = Snapshot::new(Utc::now());
    snap.surveys.insert(
        "A".into(),
        SurveyState {
            id: "A".into(),
            title: "Tracker".into(),
            status: SurveyStatus::Active,
            target: 100,
            completes: 40,
            cpi: 2.0,
            current_cost: 80.0,
            loi: Some(10.0),
            incidence_rate: Some(0.45),
            raw: serde_json::Value::Null,
        },
    );
    snap.quotas.insert(
        "A".into(),
        vec![QuotaState {
            quota_id: "1".into(),
            group_key: "Gender".into(),
            display_name: "Male".into(),
            achieved: 18,
            required_count: 50,
            current_target: 50,
            currently_open: 10,
            in_progress: 3,
        }],
    );
    snap
}

fn router_with(store: SnapshotStore) -> Router {
    create_router(AppState { store })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Option<Json>) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, serde_json::from_slice(&bytes).ok())
}

#[tokio::test]
async fn healthz_returns_ok() {
    let app = router_with(SnapshotStore::new());
    let req = Request::builder()
        .method("GET")
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn surveys_endpoint_serves_latest_snapshot() {
    let store = SnapshotStore::new();
    store.publish(sample_snapshot());

    let (status, body) = get_json(router_with(store), "/api/surveys").await;
    assert_eq!(status, StatusCode::OK);
    let v = body.unwrap();
    assert_eq!(v["stale"], false);
    assert!(v["taken_at"].is_string());
    assert_eq!(v["surveys"]["A"]["completes"], 40);
    assert_eq!(v["surveys"]["A"]["status"], "active");
}

#[tokio::test]
async fn surveys_endpoint_is_stale_before_first_cycle() {
    let (status, body) = get_json(router_with(SnapshotStore::new()), "/api/surveys").await;
    assert_eq!(status, StatusCode::OK);
    let v = body.unwrap();
    assert_eq!(v["stale"], true);
    assert!(v["surveys"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn surveys_endpoint_flags_staleness_after_failed_cycle() {
    let store = SnapshotStore::new();
    store.publish(sample_snapshot());
    store.mark_stale();

    let (_, body) = get_json(router_with(store), "/api/surveys").await;
    let v = body.unwrap();
    assert_eq!(v["stale"], true);
    // last-known-good data still served
    assert_eq!(v["surveys"]["A"]["completes"], 40);
}

#[tokio::test]
async fn quotas_endpoint_serves_quotas_for_known_survey() {
    let store = SnapshotStore::new();
    store.publish(sample_snapshot());

    let (status, body) = get_json(router_with(store), "/api/quotas/A").await;
    assert_eq!(status, StatusCode::OK);
    let v = body.unwrap();
    assert_eq!(v["survey_id"], "A");
    assert_eq!(v["quotas"][0]["display_name"], "Male");
    assert_eq!(v["quotas"][0]["achieved"], 18);
}

#[tokio::test]
async fn quotas_endpoint_404s_for_unknown_survey() {
    let store = SnapshotStore::new();
    store.publish(sample_snapshot());

    let (status, _) = get_json(router_with(store), "/api/quotas/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quotas_endpoint_404s_before_first_cycle() {
    let (status, _) = get_json(router_with(SnapshotStore::new()), "/api/quotas/A").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
