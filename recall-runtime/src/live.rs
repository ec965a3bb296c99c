use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use recall_core::{LiveConfig, OutboundChunk, ToolResult};
use recall_engine::traits::{LiveLink, LiveSender, LiveTransport};
use recall_providers::gemini_live::{GeminiLiveConfig, GeminiLiveHandle, spawn_live_session};

/// Opens sessions against the Gemini Live websocket.
#[derive(Debug, Clone)]
pub struct GeminiLiveTransport {
    cfg: GeminiLiveConfig,
}

impl GeminiLiveTransport {
    pub fn new(cfg: GeminiLiveConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn open(&self, config: &LiveConfig) -> anyhow::Result<LiveLink> {
        let (handle, inbound) = spawn_live_session(self.cfg.clone(), config).await?;
        Ok(LiveLink {
            outbound: Arc::new(GeminiLiveSender::new(handle)),
            inbound,
        })
    }
}

struct GeminiLiveSender {
    handle: GeminiLiveHandle,
    dropped: AtomicU64,
}

impl GeminiLiveSender {
    fn new(handle: GeminiLiveHandle) -> Self {
        Self {
            handle,
            dropped: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl LiveSender for GeminiLiveSender {
    fn send_realtime_input(&self, chunk: OutboundChunk) -> bool {
        if self.handle.try_send_realtime_input(chunk) {
            return true;
        }
        let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if n == 1 || n % 100 == 0 {
            log::warn!("Live command queue full or closed; dropped {n} media chunks");
        }
        false
    }

    fn send_tool_response(&self, results: Vec<ToolResult>) -> bool {
        let ok = self.handle.try_send_tool_response(results);
        if !ok {
            log::warn!("Tool response dropped: live session is closed");
        }
        ok
    }

    async fn close(&self) {
        if !self.handle.is_closed() {
            self.handle.shutdown().await;
        }
    }
}
