use anyhow::Context;
use rubato::Resampler;

/// Incremental mono resampler for capture callbacks of arbitrary size.
///
/// Input is expected to be PCM samples in [-1, 1] with a known sample rate.
/// Samples that don't fill a full resampler block are held until the next push.
pub struct StreamResampler {
    inner: Option<rubato::SincFixedIn<f32>>,
    pending: Vec<f32>,
}

const BLOCK_FRAMES: usize = 1024;

impl StreamResampler {
    pub fn new(input_sample_rate_hz: u32, target_sample_rate_hz: u32) -> anyhow::Result<Self> {
        if input_sample_rate_hz == target_sample_rate_hz {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }

        let input_sample_rate_hz: usize = input_sample_rate_hz
            .try_into()
            .context("invalid input sample rate")?;
        let target_sample_rate_hz: usize = target_sample_rate_hz
            .try_into()
            .context("invalid target sample rate")?;
        if input_sample_rate_hz == 0 || target_sample_rate_hz == 0 {
            anyhow::bail!("sample rate must be non-zero");
        }

        let params = rubato::SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: rubato::SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window: rubato::WindowFunction::BlackmanHarris2,
        };

        let resampler = rubato::SincFixedIn::<f32>::new(
            target_sample_rate_hz as f64 / input_sample_rate_hz as f64,
            2.0,
            params,
            BLOCK_FRAMES,
            1,
        )
        .context("create resampler")?;

        Ok(Self {
            inner: Some(resampler),
            pending: Vec::new(),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Feeds samples and returns whatever output is ready.
    pub fn push(&mut self, samples: &[f32]) -> anyhow::Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        loop {
            let need = resampler.input_frames_next();
            if self.pending.len() < need {
                break;
            }
            let block: Vec<f32> = self.pending.drain(..need).collect();
            let processed = resampler.process(&[block], None).context("resample")?;
            if let Some(channel) = processed.into_iter().next() {
                out.extend(channel);
            }
        }
        Ok(out)
    }
}
