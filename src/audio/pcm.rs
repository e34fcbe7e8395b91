//! Sample transforms for the capture callback: PCM16 encoding, channel
//! downmix, and sample-rate conversion.
//!
//! Everything here runs on the audio callback thread. Functions are
//! pure, allocate only in proportion to their input, and perform no
//! I/O or locking.

/// Encode float samples as little-endian signed 16-bit PCM.
///
/// Each sample is clamped to [-1.0, 1.0] and scaled asymmetrically:
/// by 32768 when negative, by 32767 otherwise. The positive range of
/// an i16 is one less than the magnitude of the negative range, so a
/// symmetric scale would overflow at exactly 1.0.
///
/// Output length is exactly `2 × samples.len()` bytes.
pub fn encode_pcm(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = if clamped < 0.0 {
            clamped * 32768.0
        } else {
            clamped * 32767.0
        };
        out.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    out
}

/// Average interleaved multi-channel samples down to mono.
///
/// A trailing partial frame (fewer samples than `channels`) is averaged
/// over the samples actually present.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Convert samples from `source_rate` to `target_rate`.
///
/// Integral downsampling ratios (48 kHz → 16 kHz) use block averaging.
/// Non-integral ratios (44.1 kHz → 16 kHz) fall back to nearest-sample
/// selection, which is audible but keeps the output at the declared
/// target rate. Matching rates return the input unchanged.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == 0 || target_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), returning original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate {
        return samples.to_vec();
    }

    if source_rate % target_rate == 0 {
        let ratio = (source_rate / target_rate) as usize;
        return samples
            .chunks(ratio)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect();
    }

    let out_len = (samples.len() as u64 * target_rate as u64 / source_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * source_rate as u64 / target_rate as u64) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}
