//! Handler for the activity detection tool.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use recall_core::{ActivityRecord, DetectedActivity, PersistenceError, ToolInvocation};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::dispatcher::ToolHandler;
use crate::traits::ActivityStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    /// Accepted and added to the local log.
    Logged(ActivityRecord),
    /// Below the confidence threshold.
    Ignored { activity: String, confidence: f64 },
    /// Arguments did not parse.
    Invalid(String),
    Stored(ActivityRecord),
    PersistFailed(PersistenceError),
}

#[derive(Clone)]
pub struct ActivityMonitor {
    store: Arc<dyn ActivityStore>,
    // Newest first.
    log: Arc<Mutex<Vec<ActivityRecord>>>,
    events: broadcast::Sender<ActivityEvent>,
}

impl ActivityMonitor {
    pub fn new(store: Arc<dyn ActivityStore>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            log: Arc::new(Mutex::new(Vec::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.events.subscribe()
    }

    pub fn log(&self) -> Vec<ActivityRecord> {
        self.log.lock().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Replaces the local log with what the store holds.
    pub async fn refresh(&self) -> Result<usize, PersistenceError> {
        let records = self.store.list_events().await?;
        let n = records.len();
        *self.log.lock() = records;
        Ok(n)
    }

    pub fn handler(&self) -> ToolHandler {
        let monitor = self.clone();
        Arc::new(move |invocation: &ToolInvocation| -> Result<Value, String> {
            Ok(monitor.handle(invocation))
        })
    }

    /// Applies the confidence policy to one invocation. Always reports
    /// success to the model, with `logged` telling whether it was kept.
    pub fn handle(&self, invocation: &ToolInvocation) -> Value {
        let detected = match DetectedActivity::from_args(&invocation.args) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Malformed activity arguments: {e}");
                self.publish(ActivityEvent::Invalid(e.to_string()));
                return json!({ "success": true, "logged": false });
            }
        };

        let confidence = detected.effective_confidence();
        if !detected.is_retained() {
            log::info!(
                "Ignoring {} detection (confidence {confidence:.2})",
                detected.activity
            );
            self.publish(ActivityEvent::Ignored {
                activity: detected.activity,
                confidence,
            });
            return json!({ "success": true, "logged": false });
        }

        if !detected.is_monitored() {
            log::debug!("Logging unlisted activity {:?}", detected.activity);
        }

        let record = ActivityRecord {
            id: uuid::Uuid::new_v4().to_string(),
            activity: detected.activity.clone(),
            confidence: Some(confidence),
            notes: detected.notes.clone(),
            recorded_at_unix_ms: now_ms(),
        };
        self.log.lock().insert(0, record.clone());
        log::info!("Activity logged: {} ({confidence:.2})", record.activity);
        self.publish(ActivityEvent::Logged(record));

        spawn_persist(
            self.store.clone(),
            self.events.clone(),
            detected.activity,
            detected.notes,
        );

        json!({ "success": true, "logged": true })
    }

    fn publish(&self, event: ActivityEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

fn spawn_persist(
    store: Arc<dyn ActivityStore>,
    events: broadcast::Sender<ActivityEvent>,
    activity: String,
    notes: Option<String>,
) {
    tokio::spawn(async move {
        let event = match store.record_event(&activity, notes.as_deref()).await {
            Ok(record) => ActivityEvent::Stored(record),
            Err(e) => {
                log::error!("Failed to store {activity} activity: {e}");
                ActivityEvent::PersistFailed(e)
            }
        };
        let _ = events.send(event);
    });
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<ActivityRecord>>,
        fail: Option<PersistenceError>,
    }

    #[async_trait]
    impl ActivityStore for MemoryStore {
        async fn record_event(
            &self,
            activity: &str,
            notes: Option<&str>,
        ) -> Result<ActivityRecord, PersistenceError> {
            if let Some(e) = &self.fail {
                return Err(e.clone());
            }
            let record = ActivityRecord {
                id: format!("row-{}", self.rows.lock().len()),
                activity: activity.into(),
                confidence: None,
                notes: notes.map(str::to_string),
                recorded_at_unix_ms: 1,
            };
            self.rows.lock().insert(0, record.clone());
            Ok(record)
        }

        async fn list_events(&self) -> Result<Vec<ActivityRecord>, PersistenceError> {
            Ok(self.rows.lock().clone())
        }
    }

    fn invocation(args: Value) -> ToolInvocation {
        ToolInvocation {
            id: "call-1".into(),
            name: recall_core::ACTIVITY_TOOL_NAME.into(),
            args,
        }
    }

    #[tokio::test]
    async fn confident_detection_is_logged_and_stored() {
        let store = Arc::new(MemoryStore::default());
        let monitor = ActivityMonitor::new(store.clone());
        let mut events = monitor.subscribe();

        let reply = monitor.handle(&invocation(
            json!({"activity": "eating", "confidence": 0.93, "notes": "toast"}),
        ));
        assert_eq!(reply, json!({"success": true, "logged": true}));

        let log = monitor.log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].confidence, Some(0.93));

        assert!(matches!(events.recv().await.unwrap(), ActivityEvent::Logged(_)));
        match events.recv().await.unwrap() {
            ActivityEvent::Stored(r) => {
                assert_eq!(r.activity, "eating");
                assert_eq!(r.notes.as_deref(), Some("toast"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(store.rows.lock().len(), 1);
    }

    #[tokio::test]
    async fn low_confidence_is_ignored_but_acknowledged() {
        let store = Arc::new(MemoryStore::default());
        let monitor = ActivityMonitor::new(store.clone());
        let mut events = monitor.subscribe();

        let reply = monitor.handle(&invocation(json!({"activity": "drinking", "confidence": 0.89})));
        assert_eq!(reply["success"], true);
        assert_eq!(reply["logged"], false);
        assert!(monitor.log().is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            ActivityEvent::Ignored {
                activity: "drinking".into(),
                confidence: 0.89
            }
        );

        tokio::task::yield_now().await;
        assert!(store.rows.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_confidence_counts_as_confident() {
        let monitor = ActivityMonitor::new(Arc::new(MemoryStore::default()));
        let reply = monitor.handle(&invocation(json!({"activity": "taking medication"})));
        assert_eq!(reply["logged"], true);
        assert_eq!(monitor.log()[0].confidence, Some(0.95));
    }

    #[tokio::test]
    async fn newest_entries_come_first() {
        let monitor = ActivityMonitor::new(Arc::new(MemoryStore::default()));
        monitor.handle(&invocation(json!({"activity": "eating"})));
        monitor.handle(&invocation(json!({"activity": "drinking"})));

        let names: Vec<_> = monitor.log().into_iter().map(|r| r.activity).collect();
        assert_eq!(names, vec!["drinking", "eating"]);

        monitor.clear_log();
        assert!(monitor.log().is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_still_reply_success() {
        let monitor = ActivityMonitor::new(Arc::new(MemoryStore::default()));
        let mut events = monitor.subscribe();

        let reply = monitor.handle(&invocation(json!({"confidence": 0.99})));
        assert_eq!(reply, json!({"success": true, "logged": false}));
        assert!(matches!(events.recv().await.unwrap(), ActivityEvent::Invalid(_)));
    }

    #[tokio::test]
    async fn persistence_failure_is_surfaced_as_an_event() {
        let store = Arc::new(MemoryStore {
            fail: Some(PersistenceError::NotAuthenticated),
            ..MemoryStore::default()
        });
        let monitor = ActivityMonitor::new(store);
        let mut events = monitor.subscribe();

        monitor.handle(&invocation(json!({"activity": "eating"})));
        assert!(matches!(events.recv().await.unwrap(), ActivityEvent::Logged(_)));
        assert_eq!(
            events.recv().await.unwrap(),
            ActivityEvent::PersistFailed(PersistenceError::NotAuthenticated)
        );
        // The local entry survives a failed store.
        assert_eq!(monitor.log().len(), 1);
    }

    #[tokio::test]
    async fn refresh_loads_the_stored_history() {
        let store = Arc::new(MemoryStore::default());
        store.record_event("eating", None).await.unwrap();
        store.record_event("drinking", None).await.unwrap();

        let monitor = ActivityMonitor::new(store);
        assert_eq!(monitor.refresh().await.unwrap(), 2);
        assert_eq!(monitor.log()[0].activity, "drinking");
    }

    #[test]
    fn handler_wraps_handle() {
        let monitor = ActivityMonitor::new(Arc::new(MemoryStore::default()));
        let handler = monitor.handler();
        let out = handler(&invocation(json!({"activity": "eating", "confidence": 0.1}))).unwrap();
        assert_eq!(out["logged"], false);
    }
}
