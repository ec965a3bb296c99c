/// Normalized amplitude of one window: RMS clamped to `[0, 1]`.
///
/// Input is expected to be PCM samples in [-1, 1]; out-of-range or NaN
/// samples still yield a value inside the range.
pub fn volume(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = energy.sqrt();
    if rms.is_nan() { 0.0 } else { rms.clamp(0.0, 1.0) }
}

const DECAY: f32 = 0.7;

/// Peak-hold meter: jumps up immediately, falls off by a fixed factor per
/// window. Feeds the session's displayed input level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolumeSmoother {
    level: f32,
}

impl VolumeSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, instant: f32) -> f32 {
        let instant = if instant.is_nan() { 0.0 } else { instant.clamp(0.0, 1.0) };
        self.level = instant.max(self.level * DECAY);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}
