use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use recall_core::EncodeError;

/// One captured frame, tightly packed RGB8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// A frame from a device that has not produced pixels yet.
    pub fn empty() -> Self {
        Self::new(0, 0, Vec::new())
    }

    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let n = width as usize * height as usize;
        let mut buf = Vec::with_capacity(n * 3);
        for _ in 0..n {
            buf.extend_from_slice(&rgb);
        }
        Self::new(width, height, buf)
    }

    pub fn has_pixels(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Downscales frames and encodes them as base64 JPEG.
///
/// The scaled surface and the JPEG output buffer are reused across frames.
pub struct FrameEncoder {
    scale: f32,
    quality: u8,
    surface: Vec<u8>,
    jpeg: Vec<u8>,
}

impl FrameEncoder {
    pub fn new(scale: f32, quality: u8) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 && scale <= 1.0 {
            scale
        } else {
            1.0
        };
        Self {
            scale,
            quality: quality.clamp(1, 100),
            surface: Vec::new(),
            jpeg: Vec::new(),
        }
    }

    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        let w = ((width as f32 * self.scale).round() as u32).max(1);
        let h = ((height as f32 * self.scale).round() as u32).max(1);
        (w, h)
    }

    pub fn encode(&mut self, frame: &VideoFrame) -> Result<String, EncodeError> {
        if !frame.has_pixels() {
            return Err(EncodeError::EmptyFrame {
                width: frame.width,
                height: frame.height,
            });
        }

        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.rgb.len() != expected {
            return Err(EncodeError::BufferSize {
                expected,
                actual: frame.rgb.len(),
            });
        }

        let (w, h) = self.target_size(frame.width, frame.height);
        let pixels: &[u8] = if (w, h) == (frame.width, frame.height) {
            &frame.rgb
        } else {
            draw_scaled(frame, w, h, &mut self.surface);
            &self.surface
        };

        self.jpeg.clear();
        JpegEncoder::new_with_quality(&mut self.jpeg, self.quality)
            .encode(pixels, w, h, ExtendedColorType::Rgb8)
            .map_err(|e| EncodeError::Image(e.to_string()))?;

        Ok(base64::engine::general_purpose::STANDARD.encode(&self.jpeg))
    }
}

/// Box-filters `frame` down to `w x h` into `out`, reusing its allocation.
fn draw_scaled(frame: &VideoFrame, w: u32, h: u32, out: &mut Vec<u8>) {
    let (sw, sh) = (frame.width as usize, frame.height as usize);
    let (w, h) = (w as usize, h as usize);
    out.clear();
    out.resize(w * h * 3, 0);

    for dy in 0..h {
        let y0 = dy * sh / h;
        let y1 = ((dy + 1) * sh / h).max(y0 + 1).min(sh);
        for dx in 0..w {
            let x0 = dx * sw / w;
            let x1 = ((dx + 1) * sw / w).max(x0 + 1).min(sw);

            let mut sum = [0u32; 3];
            for y in y0..y1 {
                let row = &frame.rgb[(y * sw + x0) * 3..(y * sw + x1) * 3];
                for px in row.chunks_exact(3) {
                    sum[0] += px[0] as u32;
                    sum[1] += px[1] as u32;
                    sum[2] += px[2] as u32;
                }
            }
            let n = ((y1 - y0) * (x1 - x0)) as u32;
            let at = (dy * w + dx) * 3;
            for c in 0..3 {
                out[at + c] = ((sum[c] + n / 2) / n) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn decode(b64: &str) -> image::DynamicImage {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "not a JPEG");
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn encodes_at_half_resolution() {
        let mut enc = FrameEncoder::new(0.5, 90);
        let out = enc.encode(&VideoFrame::solid(64, 48, [200, 10, 10])).unwrap();
        assert_eq!(decode(&out).dimensions(), (32, 24));
    }

    #[test]
    fn odd_sizes_round_and_never_collapse() {
        let enc = FrameEncoder::new(0.5, 90);
        assert_eq!(enc.target_size(1, 1), (1, 1));
        assert_eq!(enc.target_size(641, 481), (321, 241));
    }

    #[test]
    fn invalid_scale_keeps_size() {
        let mut enc = FrameEncoder::new(f32::NAN, 90);
        let out = enc.encode(&VideoFrame::solid(8, 8, [0, 0, 0])).unwrap();
        assert_eq!(decode(&out).dimensions(), (8, 8));
    }

    #[test]
    fn scaling_averages_source_blocks() {
        // 2x2 block of black and white averages to mid grey.
        let frame = VideoFrame::new(2, 2, vec![0, 0, 0, 255, 255, 255, 255, 255, 255, 0, 0, 0]);
        let mut out = Vec::new();
        draw_scaled(&frame, 1, 1, &mut out);
        assert_eq!(out, vec![128, 128, 128]);
    }

    #[test]
    fn surface_allocation_is_reused() {
        let mut enc = FrameEncoder::new(0.5, 90);
        let frame = VideoFrame::solid(64, 48, [10, 20, 30]);
        enc.encode(&frame).unwrap();
        let first = enc.surface.as_ptr();
        enc.encode(&frame).unwrap();
        assert_eq!(enc.surface.as_ptr(), first);
        assert_eq!(enc.surface.len(), 32 * 24 * 3);
    }

    #[test]
    fn rejects_empty_frames() {
        let mut enc = FrameEncoder::new(0.5, 90);
        let err = enc.encode(&VideoFrame::empty()).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyFrame { .. }));
    }

    #[test]
    fn rejects_short_buffers() {
        let mut enc = FrameEncoder::new(0.5, 90);
        let err = enc
            .encode(&VideoFrame::new(4, 4, vec![0; 10]))
            .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::BufferSize {
                expected: 48,
                actual: 10
            }
        ));
    }
}
