use async_trait::async_trait;
use recall_core::{ActivityRecord, PersistenceError};
use recall_engine::traits::{ActivityStore, IdentityProvider};
use recall_providers::rest_store::{
    RestSession, RestStoreConfig, build_insert_request, build_list_request, parse_activity_rows,
    parse_inserted_row, status_error,
};
use recall_providers::runtime::execute;

/// Activities stored in a remote REST table, scoped to the signed-in user.
#[derive(Debug, Clone)]
pub struct RestActivityStore {
    cfg: RestStoreConfig,
    session: Option<RestSession>,
}

impl RestActivityStore {
    pub fn new(cfg: RestStoreConfig, session: Option<RestSession>) -> Self {
        Self { cfg, session }
    }

    fn session(&self) -> Result<&RestSession, PersistenceError> {
        self.session.as_ref().ok_or(PersistenceError::NotAuthenticated)
    }
}

#[async_trait]
impl ActivityStore for RestActivityStore {
    async fn record_event(
        &self,
        activity: &str,
        notes: Option<&str>,
    ) -> Result<ActivityRecord, PersistenceError> {
        let session = self.session()?;
        let req = build_insert_request(&self.cfg, session, activity, notes);

        let resp = execute(&req)
            .await
            .map_err(|e| PersistenceError::Unavailable(format!("{e:#}")))?;
        if !resp.is_success() {
            let err = status_error(resp.status, &resp.body);
            log::warn!("Activity insert failed: status={} ({err})", resp.status);
            return Err(err);
        }

        parse_inserted_row(&resp.body)
            .map_err(|e| PersistenceError::Unavailable(format!("{e:#}")))
    }

    async fn list_events(&self) -> Result<Vec<ActivityRecord>, PersistenceError> {
        let session = self.session()?;
        let req = build_list_request(&self.cfg, session);

        let resp = execute(&req)
            .await
            .map_err(|e| PersistenceError::Unavailable(format!("{e:#}")))?;
        if !resp.is_success() {
            return Err(status_error(resp.status, &resp.body));
        }

        parse_activity_rows(&resp.body).map_err(|e| PersistenceError::Unavailable(format!("{e:#}")))
    }
}

impl IdentityProvider for RestActivityStore {
    fn is_authenticated(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.access_token.trim().is_empty() && !s.user_id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer, session: Option<RestSession>) -> RestActivityStore {
        RestActivityStore::new(
            RestStoreConfig {
                base_url: server.uri(),
                api_key: "anon".into(),
                table: "activities".into(),
            },
            session,
        )
    }

    fn session() -> RestSession {
        RestSession {
            access_token: "tok".into(),
            user_id: "u1".into(),
        }
    }

    #[tokio::test]
    async fn record_event_posts_and_parses_the_stored_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/activities"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(201).set_body_string(
                r#"[{"id":12,"activity_type":"eating","notes":"soup","created_at":"2024-12-01T12:00:00Z"}]"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let record = store(&server, Some(session()))
            .record_event("eating", Some("soup"))
            .await
            .unwrap();
        assert_eq!(record.id, "12");
        assert_eq!(record.activity, "eating");
        assert_eq!(record.notes.as_deref(), Some("soup"));
    }

    #[tokio::test]
    async fn list_events_filters_by_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/activities"))
            .and(query_param("user_id", "eq.u1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"id":"b","activity_type":"drinking","created_at":"2024-12-01T12:00:00Z"},
                    {"id":"a","activity_type":"eating","created_at":"2024-12-01T11:00:00Z"}]"#,
            ))
            .mount(&server)
            .await;

        let rows = store(&server, Some(session())).list_events().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "b");
    }

    #[tokio::test]
    async fn without_a_session_nothing_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let s = store(&server, None);
        assert!(!s.is_authenticated());
        assert_eq!(
            s.record_event("eating", None).await,
            Err(PersistenceError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn expired_token_maps_to_not_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"message":"JWT expired"}"#),
            )
            .mount(&server)
            .await;

        let err = store(&server, Some(session()))
            .record_event("eating", None)
            .await
            .unwrap_err();
        assert_eq!(err, PersistenceError::NotAuthenticated);
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = store(&server, Some(session())).list_events().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
    }
}
