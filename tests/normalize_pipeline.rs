// tests/normalize_pipeline.rs
//
// Parse vendor-shaped fixtures through the envelope/normalize/diff pipeline,
// the same path a live poll cycle takes.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use serde_json::Value;

use survey_pulse::diff::{diff, DiffOptions};
use survey_pulse::fetch::{index_surveys, parse_list, RawQuota};
use survey_pulse::model::{ChangeField, FieldValue, Snapshot, SurveyState, SurveyStatus};
use survey_pulse::normalize::{normalize_quota, normalize_survey};

fn surveys_from_fixture(raw: &str) -> BTreeMap<String, SurveyState> {
    let body: Value = serde_json::from_str(raw).expect("fixture is valid json");
    let indexed = index_surveys(parse_list(body).expect("fixture envelope parses"));
    indexed
        .iter()
        .map(|(id, raw)| (id.clone(), normalize_survey(id, raw)))
        .collect()
}

#[test]
fn wrapped_fixture_normalizes_both_surveys() {
    let surveys = surveys_from_fixture(include_str!("fixtures/surveys_page1.json"));
    assert_eq!(surveys.len(), 2);

    let tracker = &surveys["4711"];
    assert_eq!(tracker.title, "Brand Tracker US");
    assert_eq!(tracker.status, SurveyStatus::Active);
    assert_eq!(tracker.target, 100);
    assert_eq!(tracker.completes, 40);
    assert_eq!(tracker.loi, Some(12.5));
    assert_eq!(tracker.incidence_rate, Some(0.45));

    let snack = &surveys["ax-9"];
    assert_eq!(snack.status, SurveyStatus::Paused);
    assert_eq!(snack.target, 200);
    assert_eq!(snack.incidence_rate, Some(0.3));
}

#[test]
fn flat_fixture_skips_record_without_id() {
    let surveys = surveys_from_fixture(include_str!("fixtures/surveys_page2.json"));
    assert_eq!(surveys.len(), 1);
    assert_eq!(surveys["4711"].completes, 55);
}

#[test]
fn quota_fixture_synthesizes_display_names() {
    let body: Value =
        serde_json::from_str(include_str!("fixtures/quotas.json")).expect("valid json");
    let quotas: Vec<_> = parse_list(body)
        .expect("quota envelope parses")
        .into_iter()
        .map(RawQuota)
        .collect();
    let normalized: Vec<_> = quotas.iter().map(normalize_quota).collect();

    let names: Vec<&str> = normalized.iter().map(|q| q.display_name.as_str()).collect();
    assert_eq!(names, vec!["Male", "Female, 18-34 yr", "Heavy Users"]);

    // current_target defaults to required_count unless the vendor sent one
    assert_eq!(normalized[0].current_target, 50);
    assert_eq!(normalized[1].current_target, 40);
    assert_eq!(normalized[2].group_key, "General");
}

#[test]
fn diffing_two_fixture_pages_yields_change_and_disappearance() {
    let taken_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let mut prev = Snapshot::new(taken_at);
    prev.surveys = surveys_from_fixture(include_str!("fixtures/surveys_page1.json"));
    let mut cur = Snapshot::new(taken_at + chrono::Duration::minutes(2));
    cur.surveys = surveys_from_fixture(include_str!("fixtures/surveys_page2.json"));

    let events = diff(Some(&prev), &cur, &DiffOptions::default());

    // survey 4711: completes 40 -> 55 and cost 100 -> 137.5; ax-9 disappeared
    let fields: Vec<ChangeField> = events.iter().map(|e| e.field).collect();
    assert_eq!(
        fields,
        vec![
            ChangeField::Completes,
            ChangeField::CurrentCost,
            ChangeField::Disappeared
        ]
    );
    assert_eq!(events[0].old, FieldValue::Count(40));
    assert_eq!(events[0].new, FieldValue::Count(55));
    assert_eq!(events[2].survey_id, "ax-9");
}
