//! Sample conversion for the cpal capture path.
//!
//! cpal hands over interleaved `f32` at the device's native rate; the core
//! works on mono PCM16 little-endian at the configured rate.  Conversion is
//! three steps: [`stereo_to_mono`], [`resample_linear`], [`f32_to_pcm16`].
//! [`pcm16_to_f32`] goes the other way for the energy detector.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// ```rust
/// use voice_chat_core::audio::stereo_to_mono;
///
/// let mono = stereo_to_mono(&[0.5_f32, -0.5, 0.2, 0.4], 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `from_rate` to `to_rate` Hz using linear
/// interpolation.  Equal rates return a copy.
///
/// ```rust
/// use voice_chat_core::audio::resample_linear;
///
/// let lo = resample_linear(&vec![0.5_f32; 480], 48_000, 16_000);
/// assert_eq!(lo.len(), 160);
/// ```
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => 0.0,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PCM16 conversion
// ---------------------------------------------------------------------------

/// Convert `[-1.0, 1.0]` floats to PCM16 little-endian bytes, clamping.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Convert PCM16 little-endian bytes to floats.  A trailing odd byte is
/// ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_passthrough() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn zero_channels_returns_empty() {
        assert!(stereo_to_mono(&[0.1_f32, 0.2], 0).is_empty());
    }

    #[test]
    fn same_rate_is_noop() {
        let input = vec![0.25_f32; 320];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn upsample_doubles_length() {
        let out = resample_linear(&[0.0_f32, 1.0], 8_000, 16_000);
        assert_eq!(out.len(), 4);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn pcm16_clamps_and_round_trips_sign() {
        let bytes = f32_to_pcm16(&[2.0, -2.0, 0.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -i16::MAX);

        let back = pcm16_to_f32(&bytes);
        assert!((back[0] - 1.0).abs() < 1e-6);
        assert!((back[1] + 1.0).abs() < 1e-6);
        assert_eq!(back[2], 0.0);
    }

    #[test]
    fn pcm16_ignores_trailing_byte() {
        assert_eq!(pcm16_to_f32(&[0, 0, 7]).len(), 1);
    }
}
