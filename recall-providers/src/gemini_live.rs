use std::time::Duration;

use anyhow::{Context, anyhow};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use recall_core::{
    ContentPart, LiveConfig, LiveEvent, OutboundChunk, ServerContent, ToolCall, ToolResult,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};
use url::Url;

const WS_SEND_TIMEOUT: Duration = Duration::from_secs(3);
const MEDIA_QUEUE: usize = 256;

fn should_log_backpressure(dropped: u64) -> bool {
    dropped > 0 && (dropped == 1 || dropped % 50 == 0)
}

#[derive(Clone, PartialEq, Eq)]
pub struct GeminiLiveConfig {
    pub ws_url: Url,
    pub api_key: String,
    pub connect_timeout: Duration,
    // Time allowed between the socket opening and `setupComplete`.
    pub setup_timeout: Duration,
}

impl std::fmt::Debug for GeminiLiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveConfig")
            .field("ws_url", &self.ws_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("connect_timeout", &self.connect_timeout)
            .field("setup_timeout", &self.setup_timeout)
            .finish()
    }
}

impl GeminiLiveConfig {
    pub fn new(ws_url: &str, api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            ws_url: Url::parse(ws_url).context("parse live websocket url")?,
            api_key: api_key.into(),
            connect_timeout: Duration::from_secs(10),
            setup_timeout: Duration::from_secs(10),
        })
    }

    pub fn production(api_key: impl Into<String>) -> anyhow::Result<Self> {
        Self::new(recall_core::DEFAULT_LIVE_URL, api_key)
    }
}

#[derive(Debug)]
enum LiveCmd {
    Media(OutboundChunk),
    ToolResponse(Vec<ToolResult>),
    Shutdown,
}

/// Outbound side of an open live session. Cloning shares the session.
///
/// Media goes through a bounded queue and may be dropped under
/// backpressure. Tool responses and shutdown use their own unbounded queue
/// so they are never refused while the session is alive.
#[derive(Clone)]
pub struct GeminiLiveHandle {
    media: mpsc::Sender<LiveCmd>,
    control: mpsc::UnboundedSender<LiveCmd>,
}

impl GeminiLiveHandle {
    /// Queues a media chunk without waiting. Returns false when the session
    /// is gone or its media queue is full.
    pub fn try_send_realtime_input(&self, chunk: OutboundChunk) -> bool {
        self.media.try_send(LiveCmd::Media(chunk)).is_ok()
    }

    /// Returns false only when the session is gone.
    pub fn try_send_tool_response(&self, results: Vec<ToolResult>) -> bool {
        self.control.send(LiveCmd::ToolResponse(results)).is_ok()
    }

    pub async fn send_tool_response(&self, results: Vec<ToolResult>) -> anyhow::Result<()> {
        self.control
            .send(LiveCmd::ToolResponse(results))
            .map_err(|_| anyhow!("live session closed"))
    }

    pub async fn shutdown(&self) {
        let _ = self.control.send(LiveCmd::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

/// Opens the websocket, sends `setup` and waits for `setupComplete`.
///
/// The returned receiver yields every inbound event after the handshake.
/// A remote close or read failure is reported as `LiveEvent::Closed`; an
/// explicit `shutdown()` is not.
pub async fn spawn_live_session(
    cfg: GeminiLiveConfig,
    live: &LiveConfig,
) -> anyhow::Result<(GeminiLiveHandle, mpsc::Receiver<LiveEvent>)> {
    if cfg.api_key.trim().is_empty() {
        return Err(anyhow!("missing Gemini API key"));
    }

    let url = build_live_ws_url(&cfg);
    let req = url
        .as_str()
        .into_client_request()
        .context("build websocket request")?;

    let (mut ws, _resp) =
        tokio::time::timeout(cfg.connect_timeout, tokio_tungstenite::connect_async(req))
            .await
            .map_err(|_| anyhow!("live connect timed out"))?
            .context("connect live websocket")?;

    ws.send(Message::Text(build_setup_message(live).into()))
        .await
        .context("send setup message")?;

    tokio::time::timeout(cfg.setup_timeout, async {
        while let Some(msg) = ws.next().await {
            let msg = msg.context("read handshake frame")?;
            let Some(text) = frame_text(&msg) else {
                if let Message::Close(frame) = msg {
                    return Err(anyhow!("server closed during setup: {}", close_reason(frame)));
                }
                continue;
            };
            match parse_live_message(&text) {
                Ok(LiveEvent::SetupComplete) => return Ok(()),
                Ok(other) => log::debug!("Ignoring {:?} before setupComplete", other.kind()),
                Err(e) => log::debug!("Ignoring unparseable handshake frame: {e:#}"),
            }
        }
        Err::<(), anyhow::Error>(anyhow!("connection closed before setupComplete"))
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for setupComplete"))??;

    log::info!("Live session ready (model {})", live.model);

    let (ws_write, mut ws_read) = ws.split();

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<LiveCmd>(MEDIA_QUEUE);
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<LiveCmd>();
    let (evt_tx, evt_rx) = mpsc::channel::<LiveEvent>(64);

    // Control frames (pongs, tool responses) are never queued behind media.
    let (out_ctrl_tx, mut out_ctrl_rx) = mpsc::channel::<Message>(32);
    let (out_media_tx, mut out_media_rx) = mpsc::channel::<Message>(MEDIA_QUEUE);
    tokio::spawn(async move {
        let mut ws_write = ws_write;
        let mut ctrl_closed = false;
        let mut media_closed = false;

        loop {
            let next_msg: Option<Message> = tokio::select! {
                biased;
                msg = out_ctrl_rx.recv(), if !ctrl_closed => {
                    match msg {
                        Some(m) => Some(m),
                        None => { ctrl_closed = true; None }
                    }
                }
                msg = out_media_rx.recv(), if !media_closed => {
                    match msg {
                        Some(m) => Some(m),
                        None => { media_closed = true; None }
                    }
                }
            };

            let Some(msg) = next_msg else {
                if ctrl_closed && media_closed {
                    break;
                }
                continue;
            };

            let res = tokio::time::timeout(WS_SEND_TIMEOUT, ws_write.send(msg)).await;
            if !matches!(res, Ok(Ok(()))) {
                log::warn!("Live websocket write failed; stopping writer");
                break;
            }
        }

        let _ = ws_write.send(Message::Close(None)).await;
    });

    tokio::spawn(async move {
        let mut dropped_media: u64 = 0;

        let closed_reason: Option<String> = loop {
            tokio::select! {
                biased;
                cmd = control_rx.recv() => {
                    let Some(cmd) = cmd else { break None; };
                    match cmd {
                        LiveCmd::ToolResponse(results) => {
                            let msg = build_tool_response_message(&results);
                            let sent = tokio::time::timeout(
                                Duration::from_secs(1),
                                out_ctrl_tx.send(Message::Text(msg.into())),
                            )
                            .await;
                            if !matches!(sent, Ok(Ok(()))) {
                                break Some("failed to send tool response".to_string());
                            }
                        }
                        LiveCmd::Shutdown => break None,
                        LiveCmd::Media(_) => {}
                    }
                }

                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break None; };
                    match cmd {
                        LiveCmd::Media(chunk) => {
                            let msg = build_realtime_input_message(&chunk);
                            match out_media_tx.try_send(Message::Text(msg.into())) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(_)) => {
                                    dropped_media = dropped_media.saturating_add(1);
                                    if should_log_backpressure(dropped_media) {
                                        log::warn!("Live backpressure: dropped {dropped_media} media chunks");
                                    }
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => {
                                    break Some("websocket writer closed".to_string());
                                }
                            }
                        }
                        // Only media is queued here.
                        LiveCmd::ToolResponse(_) | LiveCmd::Shutdown => {}
                    }
                }

                msg = ws_read.next() => {
                    let Some(msg) = msg else {
                        break Some("connection closed".to_string());
                    };
                    let msg = match msg {
                        Ok(m) => m,
                        Err(e) => break Some(format!("websocket read failed: {e}")),
                    };

                    let text = match msg {
                        Message::Close(frame) => break Some(close_reason(frame)),
                        Message::Ping(p) => {
                            if out_ctrl_tx.try_send(Message::Pong(p)).is_err() {
                                break Some("failed to send pong".to_string());
                            }
                            continue;
                        }
                        other => match frame_text(&other) {
                            Some(t) => t,
                            None => continue,
                        },
                    };

                    match parse_live_message(&text) {
                        Ok(evt) => {
                            if evt_tx.send(evt).await.is_err() {
                                // Nobody is listening any more.
                                break None;
                            }
                        }
                        Err(e) => log::debug!("Ignoring live frame: {e:#}"),
                    }
                }
            }
        };

        if let Some(reason) = closed_reason {
            log::warn!("Live session closed: {reason}");
            let _ = evt_tx.send(LiveEvent::Closed { reason }).await;
        }
        // Dropping the outbound senders ends the writer task, which sends Close.
    });

    Ok((
        GeminiLiveHandle {
            media: cmd_tx,
            control: control_tx,
        },
        evt_rx,
    ))
}

fn frame_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(t) => Some(t.to_string()),
        Message::Binary(b) => Some(String::from_utf8_lossy(b).to_string()),
        _ => None,
    }
}

fn close_reason(frame: Option<tokio_tungstenite::tungstenite::protocol::CloseFrame>) -> String {
    match frame {
        Some(f) if !f.reason.is_empty() => f.to_string(),
        Some(f) => format!("closed with code {}", f.code),
        None => "closed by server".to_string(),
    }
}

fn build_live_ws_url(cfg: &GeminiLiveConfig) -> Url {
    let mut url = cfg.ws_url.clone();
    url.query_pairs_mut().append_pair("key", cfg.api_key.trim());
    url
}

pub fn build_setup_message(live: &LiveConfig) -> String {
    let mut generation = json!({
        "responseModalities": [live.response_modality.wire_name()],
    });
    if let Some(voice) = live.voice_name.as_deref().filter(|v| !v.trim().is_empty()) {
        generation["speechConfig"] = json!({
            "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
        });
    }

    let mut setup = json!({
        "model": live.model,
        "generationConfig": generation,
    });
    if let Some(instruction) = live
        .system_instruction
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        setup["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    if !live.tools.is_empty() {
        let decls: Vec<Value> = live
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        setup["tools"] = json!([{ "functionDeclarations": decls }]);
    }

    json!({ "setup": setup }).to_string()
}

pub fn build_realtime_input_message(chunk: &OutboundChunk) -> String {
    json!({
        "realtimeInput": {
            "mediaChunks": [{ "mimeType": chunk.mime_type(), "data": chunk.data() }]
        }
    })
    .to_string()
}

pub fn build_tool_response_message(results: &[ToolResult]) -> String {
    let responses: Vec<Value> = results
        .iter()
        .map(|r| json!({ "id": r.id, "response": r.response }))
        .collect();
    json!({ "toolResponse": { "functionResponses": responses } }).to_string()
}

/// Classifies one inbound JSON frame.
pub fn parse_live_message(s: &str) -> anyhow::Result<LiveEvent> {
    let v: Value = serde_json::from_str(s).context("decode live json")?;
    let obj = v.as_object().ok_or_else(|| anyhow!("live frame is not an object"))?;

    if obj.contains_key("setupComplete") {
        return Ok(LiveEvent::SetupComplete);
    }

    if let Some(content) = obj.get("serverContent") {
        return Ok(LiveEvent::Content(parse_server_content(content)?));
    }

    if let Some(call) = obj.get("toolCall") {
        let call: ToolCall = serde_json::from_value(call.clone()).context("decode toolCall")?;
        return Ok(LiveEvent::ToolCall(call));
    }

    if let Some(cancel) = obj.get("toolCallCancellation") {
        let ids = cancel
            .get("ids")
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        return Ok(LiveEvent::ToolCallCancellation { ids });
    }

    if let Some(go_away) = obj.get("goAway") {
        let time_left = go_away
            .get("timeLeft")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        return Ok(LiveEvent::GoAway { time_left });
    }

    let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    Err(anyhow!("unknown live message: {}", keys.join(",")))
}

fn parse_server_content(v: &Value) -> anyhow::Result<ServerContent> {
    let mut parts = Vec::new();
    let raw_parts = v
        .get("modelTurn")
        .and_then(|t| t.get("parts"))
        .and_then(|p| p.as_array());

    for part in raw_parts.into_iter().flatten() {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            parts.push(ContentPart::Text(text.to_string()));
        } else if let Some(inline) = part.get("inlineData") {
            let mime_type = inline
                .get("mimeType")
                .and_then(|m| m.as_str())
                .unwrap_or("")
                .to_string();
            let data = inline.get("data").and_then(|d| d.as_str()).unwrap_or("");
            let data = base64::engine::general_purpose::STANDARD
                .decode(data)
                .context("decode inlineData")?;
            parts.push(ContentPart::InlineData { mime_type, data });
        }
    }

    let flag = |name: &str| v.get(name).and_then(|b| b.as_bool()).unwrap_or(false);
    Ok(ServerContent {
        parts,
        turn_complete: flag("turnComplete"),
        interrupted: flag("interrupted"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{InboundKind, activity_live_config};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn backpressure_log_throttles() {
        assert!(!should_log_backpressure(0));
        assert!(should_log_backpressure(1));
        assert!(!should_log_backpressure(2));
        assert!(should_log_backpressure(50));
    }

    #[test]
    fn tool_responses_are_accepted_when_media_is_backed_up() {
        let (media, _media_rx) = mpsc::channel(2);
        let (control, mut control_rx) = mpsc::unbounded_channel();
        let handle = GeminiLiveHandle { media, control };

        assert!(handle.try_send_realtime_input(OutboundChunk::jpeg("a")));
        assert!(handle.try_send_realtime_input(OutboundChunk::jpeg("b")));
        assert!(!handle.try_send_realtime_input(OutboundChunk::jpeg("c")));

        assert!(handle.try_send_tool_response(vec![ToolResult::success("t1", json!({}))]));
        match control_rx.try_recv().unwrap() {
            LiveCmd::ToolResponse(results) => assert_eq!(results[0].id, "t1"),
            other => panic!("unexpected command {other:?}"),
        }

        drop(control_rx);
        assert!(handle.is_closed());
        assert!(!handle.try_send_tool_response(vec![]));
    }

    #[test]
    fn url_carries_api_key() {
        let cfg = GeminiLiveConfig::new("wss://example.com/ws/live", " k1 ").unwrap();
        let url = build_live_ws_url(&cfg);
        let qp: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();
        assert_eq!(qp.get("key").map(|s| s.as_str()), Some("k1"));
    }

    #[test]
    fn debug_hides_api_key() {
        let cfg = GeminiLiveConfig::new("wss://example.com/ws/live", "secret-key").unwrap();
        assert!(!format!("{cfg:?}").contains("secret-key"));
    }

    #[test]
    fn setup_message_matches_activity_config() {
        let v: Value = serde_json::from_str(&build_setup_message(&activity_live_config())).unwrap();
        let setup = &v["setup"];
        assert_eq!(setup["model"], "models/gemini-2.0-flash-exp");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Charon"
        );
        assert!(
            setup["systemInstruction"]["parts"][0]["text"]
                .as_str()
                .unwrap()
                .contains("eating")
        );
        assert_eq!(
            setup["tools"][0]["functionDeclarations"][0]["name"],
            "log_detected_activity"
        );
    }

    #[test]
    fn setup_message_omits_empty_sections() {
        let live = LiveConfig {
            model: "models/m".into(),
            response_modality: recall_core::ResponseModality::Text,
            voice_name: None,
            system_instruction: Some("  ".into()),
            tools: vec![],
        };
        let v: Value = serde_json::from_str(&build_setup_message(&live)).unwrap();
        let setup = v["setup"].as_object().unwrap();
        assert!(!setup.contains_key("systemInstruction"));
        assert!(!setup.contains_key("tools"));
        assert_eq!(v["setup"]["generationConfig"]["responseModalities"][0], "TEXT");
    }

    #[test]
    fn realtime_input_uses_chunk_mime() {
        let v: Value =
            serde_json::from_str(&build_realtime_input_message(&OutboundChunk::jpeg("/9j/"))).unwrap();
        let chunk = &v["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "image/jpeg");
        assert_eq!(chunk["data"], "/9j/");
    }

    #[test]
    fn tool_response_wraps_every_result() {
        let msg = build_tool_response_message(&[
            ToolResult::success("a", json!({"success": true})),
            ToolResult::failure("b", "no handler"),
        ]);
        let v: Value = serde_json::from_str(&msg).unwrap();
        let rs = v["toolResponse"]["functionResponses"].as_array().unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs[0]["id"], "a");
        assert_eq!(rs[0]["response"]["output"]["success"], true);
        assert_eq!(rs[1]["response"]["error"], "no handler");
    }

    #[test]
    fn parses_inbound_messages() {
        assert_eq!(
            parse_live_message(r#"{"setupComplete":{}}"#).unwrap(),
            LiveEvent::SetupComplete
        );

        let content = parse_live_message(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":"hi"},{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAE="}}]},"turnComplete":true}}"#,
        )
        .unwrap();
        let LiveEvent::Content(c) = content else {
            panic!("expected content");
        };
        assert_eq!(c.text(), "hi");
        assert!(c.turn_complete);
        assert!(!c.interrupted);
        assert_eq!(
            c.parts[1],
            ContentPart::InlineData {
                mime_type: "audio/pcm;rate=24000".into(),
                data: vec![0, 1]
            }
        );

        let call = parse_live_message(
            r#"{"toolCall":{"functionCalls":[{"id":"1","name":"log_detected_activity","args":{"activity":"eating"}}]}}"#,
        )
        .unwrap();
        assert_eq!(call.kind(), InboundKind::ToolCall);

        assert_eq!(
            parse_live_message(r#"{"toolCallCancellation":{"ids":["1","2"]}}"#).unwrap(),
            LiveEvent::ToolCallCancellation {
                ids: vec!["1".into(), "2".into()]
            }
        );
        assert_eq!(
            parse_live_message(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap(),
            LiveEvent::GoAway {
                time_left: Some("10s".into())
            }
        );
    }

    #[test]
    fn interrupted_turn_has_no_parts() {
        let LiveEvent::Content(c) =
            parse_live_message(r#"{"serverContent":{"interrupted":true}}"#).unwrap()
        else {
            panic!("expected content");
        };
        assert!(c.interrupted);
        assert!(c.parts.is_empty());
    }

    #[test]
    fn unknown_and_bad_frames_are_rejected() {
        let err = parse_live_message(r#"{"usageMetadata":{}}"#).err().unwrap();
        assert!(err.to_string().contains("unknown live message"));
        assert!(parse_live_message("not json").is_err());
        assert!(parse_live_message("[1]").is_err());
    }

    fn local_cfg(addr: std::net::SocketAddr) -> GeminiLiveConfig {
        let mut cfg = GeminiLiveConfig::new(&format!("ws://{addr}/ws/live"), "k").unwrap();
        cfg.connect_timeout = Duration::from_secs(2);
        cfg.setup_timeout = Duration::from_millis(500);
        cfg
    }

    #[tokio::test]
    async fn integration_handshake_media_and_tool_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            // Setup arrives first.
            if let Some(Ok(Message::Text(t))) = ws.next().await {
                let _ = seen_tx.send(t.to_string());
            }
            // Some servers answer in binary frames.
            let _ = ws
                .send(Message::Binary(br#"{"setupComplete":{}}"#.to_vec().into()))
                .await;
            let _ = ws
                .send(Message::Text(
                    r#"{"toolCall":{"functionCalls":[{"id":"c1","name":"log_detected_activity","args":{}}]}}"#.into(),
                ))
                .await;

            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(t) = msg {
                    let _ = seen_tx.send(t.to_string());
                    if t.contains("toolResponse") {
                        break;
                    }
                }
            }
        });

        let (handle, mut events) = spawn_live_session(local_cfg(addr), &activity_live_config())
            .await
            .unwrap();

        let setup = seen_rx.recv().await.unwrap();
        assert!(setup.contains("\"setup\""));

        let evt = events.recv().await.unwrap();
        let LiveEvent::ToolCall(call) = evt else {
            panic!("expected tool call, got {evt:?}");
        };
        assert_eq!(call.function_calls[0].id, "c1");

        assert!(handle.try_send_realtime_input(OutboundChunk::audio("AAAA")));
        handle
            .send_tool_response(vec![ToolResult::success("c1", json!({"success": true}))])
            .await
            .unwrap();

        let media = seen_rx.recv().await.unwrap();
        assert!(media.contains("audio/pcm;rate=16000"));
        let reply = seen_rx.recv().await.unwrap();
        assert!(reply.contains("\"c1\""));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn remote_close_is_reported_as_closed_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.send(Message::Text(r#"{"setupComplete":{}}"#.into())).await;
            let _ = ws.close(None).await;
        });

        let (_handle, mut events) = spawn_live_session(local_cfg(addr), &activity_live_config())
            .await
            .unwrap();

        let evt = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(evt.kind(), InboundKind::Close);
    }

    #[tokio::test]
    async fn missing_setup_complete_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            // Read setup, then stay silent.
            let _ = ws.next().await;
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let err = spawn_live_session(local_cfg(addr), &activity_live_config())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("setupComplete"));
    }

    #[tokio::test]
    async fn empty_api_key_is_rejected() {
        let cfg = GeminiLiveConfig::new("ws://127.0.0.1:9/ws", " ").unwrap();
        let err = spawn_live_session(cfg, &activity_live_config())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("API key"));
    }
}
