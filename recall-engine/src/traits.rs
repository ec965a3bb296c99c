use std::sync::Arc;

use async_trait::async_trait;
use recall_core::{ActivityRecord, LiveConfig, LiveEvent, OutboundChunk, PersistenceError, ToolResult};
use tokio::sync::mpsc;

/// Opens duplex sessions with the remote generation service.
///
/// `open` resolves once the service has acknowledged the setup; any error
/// is a failed handshake.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    async fn open(&self, config: &LiveConfig) -> anyhow::Result<LiveLink>;
}

/// One open session: a sender for outbound traffic and the inbound stream.
///
/// The transport reports a remote drop as `LiveEvent::Closed` or by ending
/// the stream.
pub struct LiveLink {
    pub outbound: Arc<dyn LiveSender>,
    pub inbound: mpsc::Receiver<LiveEvent>,
}

#[async_trait]
pub trait LiveSender: Send + Sync {
    /// Non-blocking. Returns false when the chunk was dropped.
    fn send_realtime_input(&self, chunk: OutboundChunk) -> bool;

    fn send_tool_response(&self, results: Vec<ToolResult>) -> bool;

    async fn close(&self);
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn record_event(
        &self,
        activity: &str,
        notes: Option<&str>,
    ) -> Result<ActivityRecord, PersistenceError>;

    /// Newest first.
    async fn list_events(&self) -> Result<Vec<ActivityRecord>, PersistenceError>;
}

pub trait IdentityProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;
}
