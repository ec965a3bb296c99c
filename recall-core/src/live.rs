//! Protocol-level types exchanged with the live generation service.
//!
//! Only what the pipeline produces or consumes is modelled here; the
//! websocket framing lives in `recall-providers`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseModality {
    #[default]
    Audio,
    Text,
}

impl ResponseModality {
    pub fn wire_name(self) -> &'static str {
        match self {
            ResponseModality::Audio => "AUDIO",
            ResponseModality::Text => "TEXT",
        }
    }
}

/// A tool the remote model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    // JSON schema, passed through as-is.
    pub parameters: Value,
}

/// Immutable session configuration, snapshotted on `connect()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    pub model: String,
    #[serde(default)]
    pub response_modality: ResponseModality,
    #[serde(default)]
    pub voice_name: Option<String>,
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub tools: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// A batch of invocations delivered in one inbound message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "functionCalls", default)]
    pub function_calls: Vec<ToolInvocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub response: Value,
}

impl ToolResult {
    pub fn success(id: impl Into<String>, output: Value) -> Self {
        Self {
            id: id.into(),
            response: json!({ "output": output }),
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            response: json!({ "error": error.into() }),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.response.get("error").is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    // Decoded inline payload, usually 24 kHz PCM audio.
    InlineData { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerContent {
    pub parts: Vec<ContentPart>,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl ServerContent {
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Inbound message after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    SetupComplete,
    Content(ServerContent),
    ToolCall(ToolCall),
    ToolCallCancellation { ids: Vec<String> },
    GoAway { time_left: Option<String> },
    Closed { reason: String },
}

/// Tag used to route inbound events to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    SetupComplete,
    Content,
    ToolCall,
    ToolCallCancellation,
    GoAway,
    Close,
}

impl LiveEvent {
    pub fn kind(&self) -> InboundKind {
        match self {
            LiveEvent::SetupComplete => InboundKind::SetupComplete,
            LiveEvent::Content(_) => InboundKind::Content,
            LiveEvent::ToolCall(_) => InboundKind::ToolCall,
            LiveEvent::ToolCallCancellation { .. } => InboundKind::ToolCallCancellation,
            LiveEvent::GoAway { .. } => InboundKind::GoAway,
            LiveEvent::Closed { .. } => InboundKind::Close,
        }
    }
}
