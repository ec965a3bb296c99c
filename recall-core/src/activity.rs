use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::live::{FunctionDeclaration, LiveConfig, ResponseModality};

pub const ACTIVITY_TOOL_NAME: &str = "log_detected_activity";

pub const MONITORED_ACTIVITIES: [&str; 3] = ["eating", "drinking", "taking medication"];

/// Detections below this confidence are dropped locally.
pub const CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Assumed when the model omits a confidence value.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.0-flash-exp";
pub const DEFAULT_VOICE: &str = "Charon";

pub fn is_confidence_retained(confidence: f64) -> bool {
    confidence >= CONFIDENCE_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedActivity {
    pub activity: String,
    // Kept loose: the model occasionally sends strings or nulls here.
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DetectedActivity {
    pub fn from_args(args: &Value) -> Result<Self, serde_json::Error> {
        let parsed: DetectedActivity = serde_json::from_value(args.clone())?;
        Ok(DetectedActivity {
            activity: parsed.activity.trim().to_string(),
            confidence: parsed.confidence,
            notes: parsed
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        })
    }

    /// The provided confidence, or [`DEFAULT_CONFIDENCE`] when absent or not a number.
    pub fn effective_confidence(&self) -> f64 {
        self.confidence
            .as_ref()
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_CONFIDENCE)
    }

    pub fn is_retained(&self) -> bool {
        !self.activity.is_empty() && is_confidence_retained(self.effective_confidence())
    }

    pub fn is_monitored(&self) -> bool {
        MONITORED_ACTIVITIES
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&self.activity))
    }
}

/// A stored activity, as returned by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub activity: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_at_unix_ms: i64,
}

pub fn activity_detection_tool() -> FunctionDeclaration {
    FunctionDeclaration {
        name: ACTIVITY_TOOL_NAME.into(),
        description:
            "Logs a detected activity when the user performs one of the monitored activities."
                .into(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "activity": {
                    "type": "STRING",
                    "description": format!(
                        "The detected activity. Must be one of: {}",
                        MONITORED_ACTIVITIES.join(", ")
                    ),
                    "enum": MONITORED_ACTIVITIES,
                },
                "confidence": {
                    "type": "NUMBER",
                    "description": "Confidence level of the detection (0-1)",
                },
                "notes": {
                    "type": "STRING",
                    "description": "Any additional notes or observations about the activity",
                },
            },
            "required": ["activity"],
        }),
    }
}

pub fn activity_system_instruction() -> String {
    format!(
        "You are DailyRecall, an assistant for people living with Alzheimer's. You do two things:\n\
\n\
1. Hold a friendly, helpful conversation and answer questions.\n\
2. Watch the camera feed and report specific activities, but only when you are completely certain.\n\
\n\
The activities to report are: {activities}.\n\
\n\
Guidelines:\n\
- Report an activity only when you are certain it is happening.\n\
- Reporting nothing is fine. The user may simply be sitting and talking to you.\n\
- When you are certain, call the {tool} function, then briefly and warmly tell the user what you saw.\n\
- Do not report the same activity repeatedly within a short period.\n\
\n\
Keep replies short and clear, in simple sentences. Conversation matters as much as detection.",
        activities = MONITORED_ACTIVITIES.join(", "),
        tool = ACTIVITY_TOOL_NAME,
    )
}

/// The session configuration used by the activity detector.
pub fn activity_live_config() -> LiveConfig {
    LiveConfig {
        model: DEFAULT_LIVE_MODEL.into(),
        response_modality: ResponseModality::Audio,
        voice_name: Some(DEFAULT_VOICE.into()),
        system_instruction: Some(activity_system_instruction()),
        tools: vec![activity_detection_tool()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(args: Value) -> DetectedActivity {
        DetectedActivity::from_args(&args).unwrap()
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(!detected(json!({"activity": "eating", "confidence": 0.89})).is_retained());
        assert!(detected(json!({"activity": "eating", "confidence": 0.9})).is_retained());
        assert!(detected(json!({"activity": "eating", "confidence": 1.0})).is_retained());
    }

    #[test]
    fn missing_confidence_defaults_high() {
        let d = detected(json!({"activity": "drinking"}));
        assert_eq!(d.effective_confidence(), DEFAULT_CONFIDENCE);
        assert!(d.is_retained());

        let d = detected(json!({"activity": "drinking", "confidence": null}));
        assert!(d.is_retained());

        let d = detected(json!({"activity": "drinking", "confidence": "high"}));
        assert_eq!(d.effective_confidence(), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn explicit_zero_confidence_is_discarded() {
        assert!(!detected(json!({"activity": "eating", "confidence": 0})).is_retained());
    }

    #[test]
    fn blank_activity_is_never_retained() {
        assert!(!detected(json!({"activity": "   ", "confidence": 0.99})).is_retained());
    }

    #[test]
    fn missing_activity_is_a_parse_error() {
        assert!(DetectedActivity::from_args(&json!({"confidence": 0.99})).is_err());
    }

    #[test]
    fn notes_are_trimmed_and_blank_notes_dropped() {
        let d = detected(json!({"activity": "eating", "notes": "  toast  "}));
        assert_eq!(d.notes.as_deref(), Some("toast"));
        let d = detected(json!({"activity": "eating", "notes": " "}));
        assert_eq!(d.notes, None);
    }

    #[test]
    fn monitored_activities_match_case_insensitively() {
        assert!(detected(json!({"activity": "Taking Medication"})).is_monitored());
        assert!(!detected(json!({"activity": "dancing"})).is_monitored());
    }

    #[test]
    fn detection_tool_declares_enum_and_required_activity() {
        let tool = activity_detection_tool();
        assert_eq!(tool.name, ACTIVITY_TOOL_NAME);
        assert_eq!(tool.parameters["required"][0], "activity");
        assert_eq!(
            tool.parameters["properties"]["activity"]["enum"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn live_config_carries_tool_and_instruction() {
        let cfg = activity_live_config();
        assert_eq!(cfg.tools.len(), 1);
        assert!(
            cfg.system_instruction
                .as_deref()
                .unwrap()
                .contains("taking medication")
        );
        assert_eq!(cfg.voice_name.as_deref(), Some("Charon"));
    }
}
