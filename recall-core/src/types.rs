use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample rate the remote service accepts for realtime audio input.
pub const INPUT_SAMPLE_RATE_HZ: u32 = 16_000;

pub const AUDIO_PCM_MIME: &str = "audio/pcm;rate=16000";
pub const JPEG_MIME: &str = "image/jpeg";

/// One encoded payload on its way to the wire. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundChunk {
    /// Base64 of 16 kHz mono s16le PCM.
    AudioPcm { data: String },
    /// Base64 of a JPEG image.
    Jpeg { data: String },
}

impl OutboundChunk {
    pub fn audio(data: impl Into<String>) -> Self {
        Self::AudioPcm { data: data.into() }
    }

    pub fn jpeg(data: impl Into<String>) -> Self {
        Self::Jpeg { data: data.into() }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::AudioPcm { .. } => AUDIO_PCM_MIME,
            Self::Jpeg { .. } => JPEG_MIME,
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Self::AudioPcm { data } | Self::Jpeg { data } => data,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::AudioPcm { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Microphone,
    Webcam,
    ScreenShare,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaKind::Microphone => "microphone",
            MediaKind::Webcam => "webcam",
            MediaKind::ScreenShare => "screen share",
        };
        f.write_str(s)
    }
}

/// The video-producing subset of [`MediaKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoSourceKind {
    Webcam,
    ScreenShare,
}

impl VideoSourceKind {
    pub const ALL: [VideoSourceKind; 2] = [VideoSourceKind::Webcam, VideoSourceKind::ScreenShare];

    pub fn media_kind(self) -> MediaKind {
        match self {
            VideoSourceKind::Webcam => MediaKind::Webcam,
            VideoSourceKind::ScreenShare => MediaKind::ScreenShare,
        }
    }
}

impl fmt::Display for VideoSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.media_kind().fmt(f)
    }
}
