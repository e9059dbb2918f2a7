//! Sine tone synthesis for feedback cues

use std::f32::consts::PI;

/// Generate a sine tone with a raised-cosine fade in and out
///
/// The fade is `min(n / 4, sample_rate / 50)` samples (about 20ms), which keeps
/// the start and end of the tone free of clicks. `volume` is clamped to `[0, 1]`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn generate_tone(sample_rate: u32, frequency_hz: f32, duration_ms: u32, volume: f32) -> Vec<i16> {
    let num_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1000) as usize;
    if num_samples == 0 {
        return Vec::new();
    }

    let volume = volume.clamp(0.0, 1.0);
    let fade_samples = (num_samples / 4).min(sample_rate as usize / 50);

    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * PI * frequency_hz * t).sin();

            let envelope = if fade_samples == 0 {
                1.0
            } else if i < fade_samples {
                0.5 * (1.0 - (PI * i as f32 / fade_samples as f32).cos())
            } else if i >= num_samples - fade_samples {
                let pos = i - (num_samples - fade_samples);
                0.5 * (1.0 + (PI * pos as f32 / fade_samples as f32).cos())
            } else {
                1.0
            };

            (sample * volume * envelope * 32767.0) as i16
        })
        .collect()
}

/// Generate `duration_ms` of silence
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn silence(sample_rate: u32, duration_ms: u32) -> Vec<i16> {
    vec![0; (u64::from(sample_rate) * u64::from(duration_ms) / 1000) as usize]
}
