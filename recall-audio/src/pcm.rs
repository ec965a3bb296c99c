use base64::Engine;

/// Converts `[-1, 1]` float samples to 16-bit little-endian PCM.
pub fn f32_to_s16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let s = if s.is_nan() { 0.0 } else { s.clamp(-1.0, 1.0) };
        let v = (s * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn encode_pcm_base64(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(f32_to_s16le(samples))
}
