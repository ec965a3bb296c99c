//
// CPAL-based microphone backend.
//
// Supported platforms:
// - Windows
// - macOS
//
// cpal streams are not Send, so each open device lives on its own worker
// thread and is dropped there.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream};
use tokio::sync::mpsc;

use crate::capture::{MicrophoneBackend, MicrophoneStream};
use crate::error::AudioCaptureError;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// `None` (or a blank name) selects the default input device.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name: device_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }

    pub fn list_input_device_names() -> Result<Vec<String>, AudioCaptureError> {
        let host = cpal::default_host();
        let mut out = Vec::new();
        let devices = host
            .input_devices()
            .map_err(|e| AudioCaptureError::ListDevices(e.to_string()))?;
        for dev in devices {
            if let Ok(name) = dev.name() {
                out.push(name);
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }
}

fn select_device(device_name: Option<&str>) -> Result<Device, AudioCaptureError> {
    let host = cpal::default_host();

    if let Some(needle) = device_name {
        if let Ok(devices) = host.input_devices() {
            for dev in devices {
                if dev.name().is_ok_and(|name| name == needle) {
                    log::info!("Using input device: {needle}");
                    return Ok(dev);
                }
            }
        }
        log::warn!("Preferred input device not found, falling back to default: {needle}");
    }

    host.default_input_device()
        .ok_or(AudioCaptureError::NoInputDevice)
}

enum WorkerMsg {
    Ready(u32),
    Error(AudioCaptureError),
}

struct CpalStream {
    sample_rate_hz: u32,
    shutdown_tx: std_mpsc::Sender<()>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneStream for CpalStream {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }
}

impl MicrophoneBackend for CpalMicrophone {
    fn open(
        &self,
        sink: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn MicrophoneStream>, AudioCaptureError> {
        let (worker_tx, worker_rx) = std_mpsc::channel::<WorkerMsg>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let worker = std::thread::spawn(move || {
            let (stream, rate) = match open_stream(device_name.as_deref(), sink) {
                Ok(v) => v,
                Err(e) => {
                    log::error!("Microphone open failed: {e}");
                    let _ = worker_tx.send(WorkerMsg::Error(e));
                    return;
                }
            };
            let _ = worker_tx.send(WorkerMsg::Ready(rate));

            // Park until the owning handle is dropped.
            let _ = shutdown_rx.recv();
            drop(stream);
        });

        let sample_rate_hz = match worker_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(WorkerMsg::Ready(rate)) => rate,
            Ok(WorkerMsg::Error(e)) => return Err(e),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                let _ = shutdown_tx.send(());
                return Err(AudioCaptureError::WorkerTimeout);
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => return Err(AudioCaptureError::Channel),
        };

        Ok(Box::new(CpalStream {
            sample_rate_hz,
            shutdown_tx,
            worker: Some(worker),
        }))
    }
}

fn open_stream(
    device_name: Option<&str>,
    sink: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<(Stream, u32), AudioCaptureError> {
    let device = select_device(device_name)?;
    let default_cfg = device
        .default_input_config()
        .map_err(|e| AudioCaptureError::DefaultConfig(e.to_string()))?;
    let sample_rate_hz = default_cfg.sample_rate().0;
    let channels = default_cfg.channels() as usize;
    let config: cpal::StreamConfig = default_cfg.config();

    let stream = match default_cfg.sample_format() {
        SampleFormat::I16 => build_input_stream::<i16>(&device, &config, channels, sink),
        SampleFormat::U16 => build_input_stream::<u16>(&device, &config, channels, sink),
        SampleFormat::I8 => build_input_stream::<i8>(&device, &config, channels, sink),
        SampleFormat::U8 => build_input_stream::<u8>(&device, &config, channels, sink),
        SampleFormat::I32 => build_input_stream::<i32>(&device, &config, channels, sink),
        SampleFormat::U32 => build_input_stream::<u32>(&device, &config, channels, sink),
        SampleFormat::F64 => build_input_stream::<f64>(&device, &config, channels, sink),
        _ => build_input_stream::<f32>(&device, &config, channels, sink),
    }
    .map_err(|e| AudioCaptureError::BuildStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioCaptureError::PlayStream(e.to_string()))?;

    Ok((stream, sample_rate_hz))
}

fn build_input_stream<T>(
    device: &Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sink: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let cb = move |data: &[T], _: &cpal::InputCallbackInfo| {
        let mono: Vec<f32> = if channels <= 1 {
            data.iter().map(|&s| s.to_sample::<f32>()).collect()
        } else {
            data.chunks_exact(channels)
                .map(|frame| {
                    frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / channels as f32
                })
                .collect()
        };
        // The receiver is gone once capture stops; the stream is about to drop.
        let _ = sink.send(mono);
    };

    device.build_input_stream(
        config,
        cb,
        |err| {
            log::error!("Audio stream error: {err}");
        },
        None,
    )
}
