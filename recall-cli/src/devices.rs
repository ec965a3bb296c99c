use std::path::Path;
use std::sync::Arc;

use recall_audio::MicrophoneBackend;
use recall_core::VideoSourceKind;
use recall_video::{StillFrameDevice, VideoDevice};

#[cfg(any(windows, target_os = "macos"))]
pub fn microphone(device: Option<String>) -> Arc<dyn MicrophoneBackend> {
    Arc::new(recall_audio::CpalMicrophone::new(device))
}

#[cfg(not(any(windows, target_os = "macos")))]
pub fn microphone(device: Option<String>) -> Arc<dyn MicrophoneBackend> {
    if let Some(name) = device {
        log::warn!("Ignoring microphone {name:?}: capture is not supported on this platform");
    }
    Arc::new(unsupported::NoMicrophone)
}

#[cfg(any(windows, target_os = "macos"))]
pub fn input_device_names() -> anyhow::Result<Vec<String>> {
    Ok(recall_audio::CpalMicrophone::list_input_device_names()?)
}

#[cfg(not(any(windows, target_os = "macos")))]
pub fn input_device_names() -> anyhow::Result<Vec<String>> {
    Ok(vec![])
}

/// Video sources for the session. Images stand in for a device when given;
/// otherwise the screen is captured live where the platform allows it.
pub fn video_sources(
    webcam: Option<&Path>,
    screen: Option<&Path>,
) -> anyhow::Result<Vec<Arc<dyn VideoDevice>>> {
    let mut out: Vec<Arc<dyn VideoDevice>> = Vec::new();
    if let Some(path) = webcam {
        out.push(Arc::new(StillFrameDevice::from_image_file(
            VideoSourceKind::Webcam,
            path,
        )?));
    }
    match screen {
        Some(path) => out.push(Arc::new(StillFrameDevice::from_image_file(
            VideoSourceKind::ScreenShare,
            path,
        )?)),
        None => out.extend(live_screen()),
    }
    Ok(out)
}

#[cfg(windows)]
fn live_screen() -> Option<Arc<dyn VideoDevice>> {
    Some(Arc::new(recall_video::ScreenShareDevice::new(Arc::new(
        recall_video::GdiScreen,
    ))))
}

#[cfg(not(windows))]
fn live_screen() -> Option<Arc<dyn VideoDevice>> {
    None
}

#[cfg(not(any(windows, target_os = "macos")))]
mod unsupported {
    use recall_audio::{AudioCaptureError, MicrophoneBackend, MicrophoneStream};
    use tokio::sync::mpsc;

    pub struct NoMicrophone;

    impl MicrophoneBackend for NoMicrophone {
        fn open(
            &self,
            _sink: mpsc::UnboundedSender<Vec<f32>>,
        ) -> Result<Box<dyn MicrophoneStream>, AudioCaptureError> {
            Err(AudioCaptureError::NoInputDevice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_screen_fills_in_without_an_image() {
        let kinds: Vec<_> = video_sources(None, None)
            .unwrap()
            .iter()
            .map(|d| d.kind())
            .collect();
        if cfg!(windows) {
            assert_eq!(kinds, vec![VideoSourceKind::ScreenShare]);
        } else {
            assert!(kinds.is_empty());
        }
    }

    #[test]
    fn missing_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");
        assert!(video_sources(None, Some(&missing)).is_err());
    }
}
