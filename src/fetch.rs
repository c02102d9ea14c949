// src/fetch.rs
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::session::Session;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status {code}")]
    Status { code: u16 },
    #[error("malformed response body: {0}")]
    Malformed(String),
}

impl FetchError {
    /// 401/403 mean the token was revoked server-side even if our local
    /// expiry window says it is still good.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, FetchError::Status { code: 401 | 403 })
    }
}

/// Raw vendor survey payload, kept opaque. Field extraction happens in the
/// normalizer, which knows the vendor's shifting key names.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct RawSurvey(pub Value);

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct RawQuota(pub Value);

/// The two read operations against the dashboard. No retries here; retry
/// policy belongs to the poll scheduler.
#[async_trait]
pub trait SurveySource: Send + Sync {
    async fn fetch_surveys(
        &self,
        session: &Session,
    ) -> Result<BTreeMap<String, RawSurvey>, FetchError>;

    async fn fetch_quotas(
        &self,
        session: &Session,
        survey_id: &str,
    ) -> Result<Vec<RawQuota>, FetchError>;
}

// --- tolerant variants of the list envelope ---
// The vendor has shipped all of these shapes at one point or another.

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListEnvelope {
    Flat(Vec<Value>),
    Surveys { surveys: Vec<Value> },
    Quotas { quotas: Vec<Value> },
    Data { data: Vec<Value> },
}

impl ListEnvelope {
    fn into_items(self) -> Vec<Value> {
        match self {
            ListEnvelope::Flat(v) => v,
            ListEnvelope::Surveys { surveys } => surveys,
            ListEnvelope::Quotas { quotas } => quotas,
            ListEnvelope::Data { data } => data,
        }
    }
}

pub fn parse_list(body: Value) -> Result<Vec<Value>, FetchError> {
    let env: ListEnvelope =
        serde_json::from_value(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(env.into_items())
}

/// Pull a stable survey id out of a raw record, whichever key the vendor used.
pub fn survey_key(item: &Value) -> Option<String> {
    for key in ["survey_id", "ps_survey_id", "id"] {
        match item.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Index raw survey records by id. Records without any recognizable id are
/// logged and skipped; partial data beats no data for a monitoring system.
pub fn index_surveys(items: Vec<Value>) -> BTreeMap<String, RawSurvey> {
    let mut out = BTreeMap::new();
    for item in items {
        match survey_key(&item) {
            Some(id) => {
                out.insert(id, RawSurvey(item));
            }
            None => {
                tracing::warn!("survey record without id, skipping");
                counter!("survey_records_skipped_total").increment(1);
            }
        }
    }
    out
}

pub struct HttpFetcher {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn get_json(&self, session: &Session, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&session.token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl SurveySource for HttpFetcher {
    async fn fetch_surveys(
        &self,
        session: &Session,
    ) -> Result<BTreeMap<String, RawSurvey>, FetchError> {
        let body = self.get_json(session, "/api/surveys?state=live").await?;
        let items = parse_list(body)?;
        Ok(index_surveys(items))
    }

    async fn fetch_quotas(
        &self,
        session: &Session,
        survey_id: &str,
    ) -> Result<Vec<RawQuota>, FetchError> {
        let body = self
            .get_json(session, &format!("/api/surveys/{survey_id}/quotas"))
            .await?;
        let items = parse_list(body)?;
        Ok(items.into_iter().map(RawQuota).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_accepts_flat_array() {
        let items = parse_list(json!([{"survey_id": 1}, {"survey_id": 2}])).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn envelope_accepts_surveys_wrapper() {
        let items = parse_list(json!({"surveys": [{"survey_id": "a"}]})).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn envelope_accepts_quotas_and_data_wrappers() {
        assert_eq!(parse_list(json!({"quotas": [{}]})).unwrap().len(), 1);
        assert_eq!(parse_list(json!({"data": [{}, {}]})).unwrap().len(), 2);
    }

    #[test]
    fn envelope_rejects_non_list_body() {
        let err = parse_list(json!({"surveys": "nope"})).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn survey_key_handles_numbers_and_alternate_names() {
        assert_eq!(survey_key(&json!({"survey_id": 4711})).as_deref(), Some("4711"));
        assert_eq!(
            survey_key(&json!({"ps_survey_id": "ps-1"})).as_deref(),
            Some("ps-1")
        );
        assert_eq!(survey_key(&json!({"id": "x"})).as_deref(), Some("x"));
        assert_eq!(survey_key(&json!({"title": "no id"})), None);
    }

    #[test]
    fn records_without_id_are_skipped_not_fatal() {
        let indexed = index_surveys(vec![
            json!({"survey_id": 7, "title": "ok"}),
            json!({"title": "orphan"}),
        ]);
        assert_eq!(indexed.len(), 1);
        assert!(indexed.contains_key("7"));
    }

    #[test]
    fn auth_expiry_detection() {
        assert!(FetchError::Status { code: 401 }.is_auth_expired());
        assert!(FetchError::Status { code: 403 }.is_auth_expired());
        assert!(!FetchError::Status { code: 500 }.is_auth_expired());
        assert!(!FetchError::Network("x".into()).is_auth_expired());
    }
}
