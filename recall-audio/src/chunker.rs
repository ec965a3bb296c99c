use recall_core::INPUT_SAMPLE_RATE_HZ;

use crate::capture::{AudioChunk, CHUNK_SAMPLES};
use crate::meter::volume;
use crate::pcm::encode_pcm_base64;
use crate::resample::StreamResampler;

/// Turns raw mono device callbacks into fixed-size 16 kHz windows.
///
/// Holds partial windows between pushes; nothing is emitted until a full
/// window of `CHUNK_SAMPLES` is available.
pub struct WindowPipeline {
    resampler: StreamResampler,
    window: Vec<f32>,
}

impl WindowPipeline {
    pub fn new(device_rate_hz: u32) -> anyhow::Result<Self> {
        Ok(Self {
            resampler: StreamResampler::new(device_rate_hz, INPUT_SAMPLE_RATE_HZ)?,
            window: Vec::with_capacity(CHUNK_SAMPLES),
        })
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioChunk> {
        let resampled = match self.resampler.push(samples) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("Dropping audio block, resample failed: {e:#}");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for s in resampled {
            self.window.push(s);
            if self.window.len() == CHUNK_SAMPLES {
                out.push(AudioChunk {
                    data: encode_pcm_base64(&self.window),
                    volume: volume(&self.window),
                });
                self.window.clear();
            }
        }
        out
    }

    pub fn pending_samples(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn emits_only_full_windows() {
        let mut p = WindowPipeline::new(16_000).unwrap();
        assert!(p.push(&[0.0; 2000]).is_empty());
        assert_eq!(p.pending_samples(), 2000);

        let chunks = p.push(&[0.0; 2200]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(p.pending_samples(), 4200 - 2 * CHUNK_SAMPLES);
    }

    #[test]
    fn payload_is_one_window_of_s16le() {
        let mut p = WindowPipeline::new(16_000).unwrap();
        let chunks = p.push(&[0.25; CHUNK_SAMPLES]);
        assert_eq!(chunks.len(), 1);

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&chunks[0].data)
            .unwrap();
        assert_eq!(bytes.len(), CHUNK_SAMPLES * 2);
        assert!((chunks[0].volume - 0.25).abs() < 1e-4);
    }

    #[test]
    fn volume_tracks_each_window_separately() {
        let mut p = WindowPipeline::new(16_000).unwrap();
        let mut input = vec![0.0; CHUNK_SAMPLES];
        input.extend(std::iter::repeat_n(1.0, CHUNK_SAMPLES));
        let chunks = p.push(&input);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].volume, 0.0);
        assert_eq!(chunks[1].volume, 1.0);
    }

    #[test]
    fn resamples_device_rate_down() {
        let mut p = WindowPipeline::new(48_000).unwrap();
        let mut n = 0;
        for _ in 0..30 {
            n += p.push(&[0.1; 4800]).len();
        }
        // 3 s of audio at 16 kHz is ~23 windows; a resampler block may be pending.
        assert!((20..=24).contains(&n), "got {n}");
    }
}
