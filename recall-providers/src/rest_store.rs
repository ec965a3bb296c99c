//! Request building and response parsing for a PostgREST-style activity
//! table (`/rest/v1/<table>`).

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use recall_core::{ActivityRecord, PersistenceError};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::request::{Body, HttpRequest};

#[derive(Clone, PartialEq, Eq)]
pub struct RestStoreConfig {
    pub base_url: String,
    // Project key sent as `apikey`.
    pub api_key: String,
    pub table: String,
}

impl std::fmt::Debug for RestStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStoreConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

/// The signed-in principal the rows belong to.
#[derive(Clone, PartialEq, Eq)]
pub struct RestSession {
    pub access_token: String,
    pub user_id: String,
}

impl std::fmt::Debug for RestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSession")
            .field("access_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

fn table_url(cfg: &RestStoreConfig) -> String {
    let base = cfg.base_url.trim_end_matches('/');
    let table = cfg.table.trim_matches('/');
    format!("{base}/rest/v1/{table}")
}

fn auth_headers(cfg: &RestStoreConfig, session: &RestSession) -> Vec<(String, String)> {
    vec![
        ("apikey".into(), cfg.api_key.clone()),
        (
            "Authorization".into(),
            format!("Bearer {}", session.access_token),
        ),
    ]
}

pub fn build_insert_request(
    cfg: &RestStoreConfig,
    session: &RestSession,
    activity: &str,
    notes: Option<&str>,
) -> HttpRequest {
    let payload = json!([{
        "activity_type": activity,
        "notes": notes.unwrap_or(""),
        "user_id": session.user_id,
    }]);

    let mut headers = auth_headers(cfg, session);
    headers.push(("Content-Type".into(), "application/json".into()));
    headers.push(("Prefer".into(), "return=representation".into()));

    HttpRequest {
        method: "POST".into(),
        url: table_url(cfg),
        headers,
        body: Body::Json(payload.to_string()),
    }
}

pub fn build_list_request(cfg: &RestStoreConfig, session: &RestSession) -> HttpRequest {
    let mut url = table_url(cfg);
    url.push_str("?select=*&order=created_at.desc&user_id=eq.");
    url.push_str(&url::form_urlencoded::byte_serialize(session.user_id.as_bytes()).collect::<String>());

    let mut headers = auth_headers(cfg, session);
    headers.push(("Accept".into(), "application/json".into()));

    HttpRequest {
        method: "GET".into(),
        url,
        headers,
        body: Body::Empty,
    }
}

/// Maps a non-2xx response onto the persistence error taxonomy.
pub fn status_error(status: u16, body: &[u8]) -> PersistenceError {
    let detail = error_detail(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        401 | 403 => PersistenceError::NotAuthenticated,
        400..=499 => PersistenceError::Rejected(detail),
        _ => PersistenceError::Unavailable(detail),
    }
}

fn error_detail(body: &[u8]) -> Option<String> {
    let v: Value = serde_json::from_slice(body).ok()?;
    ["message", "error_description", "error", "hint"]
        .iter()
        .find_map(|k| v.get(*k).and_then(|m| m.as_str()))
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct ActivityRow {
    id: Value,
    activity_type: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    created_at: DateTime<Utc>,
}

impl ActivityRow {
    fn into_record(self) -> ActivityRecord {
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        ActivityRecord {
            id,
            activity: self.activity_type,
            confidence: self.confidence,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            recorded_at_unix_ms: self.created_at.timestamp_millis(),
        }
    }
}

pub fn parse_activity_rows(body: &[u8]) -> anyhow::Result<Vec<ActivityRecord>> {
    let rows: Vec<ActivityRow> = serde_json::from_slice(body).context("decode activity rows")?;
    Ok(rows.into_iter().map(ActivityRow::into_record).collect())
}

/// An insert with `return=representation` echoes the stored row.
pub fn parse_inserted_row(body: &[u8]) -> anyhow::Result<ActivityRecord> {
    parse_activity_rows(body)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("insert returned no rows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RestStoreConfig {
        RestStoreConfig {
            base_url: "https://db.example.com/".into(),
            api_key: "anon".into(),
            table: "activities".into(),
        }
    }

    fn session() -> RestSession {
        RestSession {
            access_token: "tok".into(),
            user_id: "user 1".into(),
        }
    }

    #[test]
    fn insert_request_carries_row_and_auth() {
        let req = build_insert_request(&cfg(), &session(), "eating", Some("lunch"));
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://db.example.com/rest/v1/activities");
        assert_eq!(req.header("apikey"), Some("anon"));
        assert_eq!(req.header("authorization"), Some("Bearer tok"));
        assert_eq!(req.header("prefer"), Some("return=representation"));

        let Body::Json(body) = req.body else {
            panic!("expected json body");
        };
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v[0]["activity_type"], "eating");
        assert_eq!(v[0]["notes"], "lunch");
        assert_eq!(v[0]["user_id"], "user 1");
    }

    #[test]
    fn missing_notes_are_sent_empty() {
        let req = build_insert_request(&cfg(), &session(), "drinking", None);
        let Body::Json(body) = req.body else {
            panic!("expected json body");
        };
        assert!(body.contains(r#""notes":"""#));
    }

    #[test]
    fn list_request_filters_by_user_newest_first() {
        let req = build_list_request(&cfg(), &session());
        assert_eq!(req.method, "GET");
        assert!(req.url.contains("order=created_at.desc"));
        assert!(req.url.ends_with("user_id=eq.user+1"));
    }

    #[test]
    fn parses_rows_with_numeric_and_uuid_ids() {
        let body = br#"[
            {"id": 7, "activity_type": "eating", "notes": "", "created_at": "2024-12-01T10:00:00Z"},
            {"id": "3f1c", "activity_type": "drinking", "notes": "water", "created_at": "2024-12-01T09:00:00.500+00:00"}
        ]"#;
        let rows = parse_activity_rows(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "7");
        assert_eq!(rows[0].notes, None);
        assert_eq!(rows[0].recorded_at_unix_ms, 1_733_047_200_000);
        assert_eq!(rows[1].id, "3f1c");
        assert_eq!(rows[1].notes.as_deref(), Some("water"));
        assert_eq!(rows[1].recorded_at_unix_ms, 1_733_043_600_500);
    }

    #[test]
    fn empty_insert_response_is_an_error() {
        assert!(parse_inserted_row(b"[]").is_err());
    }

    #[test]
    fn statuses_map_to_persistence_errors() {
        assert_eq!(status_error(401, b""), PersistenceError::NotAuthenticated);
        assert_eq!(
            status_error(409, br#"{"message":"duplicate key"}"#),
            PersistenceError::Rejected("duplicate key".into())
        );
        assert_eq!(
            status_error(503, b"oops"),
            PersistenceError::Unavailable("HTTP 503".into())
        );
    }
}
