// src/diff.rs
//
// Pure comparison of two snapshots. No I/O, no mutation of inputs; two diffs
// of identical inputs produce byte-identical event sequences (surveys sorted
// by id, fields in declared order).

use std::collections::BTreeSet;

use crate::model::{ChangeEvent, ChangeField, FieldValue, Snapshot, SurveyState};

#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    /// Epsilon for decimal fields (cpi, current cost) so floating-point noise
    /// does not trigger spurious events. Integers compare exactly.
    pub epsilon: f64,
    /// Quota-level diffing; survey-level events may be all downstream
    /// consumers need, so this is opt-in.
    pub include_quotas: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            include_quotas: false,
        }
    }
}

/// Compare the previous snapshot (absent on the first cycle) with the
/// current one. Surveys new to `current` emit a single "appeared" event;
/// surveys gone from `current` emit a single "disappeared" event.
pub fn diff(prev: Option<&Snapshot>, current: &Snapshot, opts: &DiffOptions) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let observed_at = current.taken_at;

    let Some(prev) = prev else {
        for (id, survey) in &current.surveys {
            events.push(ChangeEvent {
                survey_id: id.clone(),
                quota_id: None,
                field: ChangeField::Appeared,
                old: FieldValue::Absent,
                new: FieldValue::Text(survey.title.clone()),
                observed_at,
            });
        }
        return events;
    };

    let ids: BTreeSet<&String> = prev.surveys.keys().chain(current.surveys.keys()).collect();

    for id in ids {
        match (prev.surveys.get(id), current.surveys.get(id)) {
            (None, Some(cur)) => events.push(ChangeEvent {
                survey_id: id.clone(),
                quota_id: None,
                field: ChangeField::Appeared,
                old: FieldValue::Absent,
                new: FieldValue::Text(cur.title.clone()),
                observed_at,
            }),
            (Some(old), None) => events.push(ChangeEvent {
                survey_id: id.clone(),
                quota_id: None,
                field: ChangeField::Disappeared,
                old: FieldValue::Text(old.title.clone()),
                new: FieldValue::Absent,
                observed_at,
            }),
            (Some(old), Some(cur)) => {
                diff_survey(old, cur, opts, &mut events, observed_at);
                if opts.include_quotas {
                    diff_quotas(prev, current, id, &mut events, observed_at);
                }
            }
            (None, None) => unreachable!("id came from one of the two maps"),
        }
    }

    events
}

fn diff_survey(
    old: &SurveyState,
    cur: &SurveyState,
    opts: &DiffOptions,
    events: &mut Vec<ChangeEvent>,
    observed_at: chrono::DateTime<chrono::Utc>,
) {
    let mut push = |field, old_v, new_v| {
        events.push(ChangeEvent {
            survey_id: cur.id.clone(),
            quota_id: None,
            field,
            old: old_v,
            new: new_v,
            observed_at,
        });
    };

    if old.status != cur.status {
        push(
            ChangeField::Status,
            FieldValue::Status(old.status),
            FieldValue::Status(cur.status),
        );
    }
    if old.completes != cur.completes {
        push(
            ChangeField::Completes,
            FieldValue::Count(old.completes),
            FieldValue::Count(cur.completes),
        );
    }
    if old.target != cur.target {
        push(
            ChangeField::Target,
            FieldValue::Count(old.target),
            FieldValue::Count(cur.target),
        );
    }
    if (old.cpi - cur.cpi).abs() > opts.epsilon {
        push(
            ChangeField::Cpi,
            FieldValue::Decimal(old.cpi),
            FieldValue::Decimal(cur.cpi),
        );
    }
    if (old.current_cost - cur.current_cost).abs() > opts.epsilon {
        push(
            ChangeField::CurrentCost,
            FieldValue::Decimal(old.current_cost),
            FieldValue::Decimal(cur.current_cost),
        );
    }
}

fn diff_quotas(
    prev: &Snapshot,
    current: &Snapshot,
    survey_id: &str,
    events: &mut Vec<ChangeEvent>,
    observed_at: chrono::DateTime<chrono::Utc>,
) {
    let empty = Vec::new();
    let old_quotas = prev.quotas.get(survey_id).unwrap_or(&empty);
    let cur_quotas = current.quotas.get(survey_id).unwrap_or(&empty);

    // Quotas are matched by id; additions and removals carry no events of
    // their own (the survey-level events cover lifecycle).
    for cur in cur_quotas {
        let Some(old) = old_quotas.iter().find(|q| q.quota_id == cur.quota_id) else {
            continue;
        };
        let mut push = |field, old_v, new_v| {
            events.push(ChangeEvent {
                survey_id: survey_id.to_string(),
                quota_id: Some(cur.quota_id.clone()),
                field,
                old: old_v,
                new: new_v,
                observed_at,
            });
        };
        if old.achieved != cur.achieved {
            push(
                ChangeField::QuotaAchieved,
                FieldValue::Count(old.achieved),
                FieldValue::Count(cur.achieved),
            );
        }
        if old.currently_open != cur.currently_open {
            push(
                ChangeField::QuotaCurrentlyOpen,
                FieldValue::Count(old.currently_open),
                FieldValue::Count(cur.currently_open),
            );
        }
    }
}
