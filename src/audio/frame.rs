//! PCM data model shared by capture, segmentation and playback

use std::time::Duration;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per capture frame (80ms at 16kHz)
pub const FRAME_SAMPLES: usize = 1280;

/// A fixed-size block of mono 16kHz PCM from the microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    index: u64,
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Create a frame with its position in the capture stream
    #[must_use]
    pub const fn new(index: u64, samples: Vec<i16>) -> Self {
        Self { index, samples }
    }

    /// Sequence number of this frame since capture start
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Raw PCM samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame carries no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the frame at [`SAMPLE_RATE`]
    #[must_use]
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), SAMPLE_RATE)
    }

    /// Samples normalized to `[-1.0, 1.0]`
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
    }

    /// RMS energy of the normalized samples
    #[must_use]
    pub fn energy(&self) -> f32 {
        rms_energy(&self.to_f32())
    }
}

/// One sentence worth of synthesized audio
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioChunk {
    /// Mono PCM samples
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Create a chunk from samples at the given rate
    #[must_use]
    pub const fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback duration of the chunk
    #[must_use]
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }

    /// Whether the chunk has anything to play
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The PCM of one utterance, as closed by the segmenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSegment {
    /// Accumulated mono 16kHz samples
    pub samples: Vec<i16>,
    /// Offset of the first sample from capture start
    pub start: Duration,
    /// Offset just past the last sample from capture start
    pub end: Duration,
    /// Closed by the max-duration cutoff rather than by silence
    pub forced: bool,
}

impl SpeechSegment {
    /// Length of the segment
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Convert a sample count to a duration at `sample_rate`
#[must_use]
pub fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(samples as u64 * 1_000_000 / u64::from(sample_rate))
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples in `[-1.0, 1.0]` to i16 PCM
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Encode mono i16 samples as WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Wav(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Wav(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Wav(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(rms_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(rms_energy(&loud) > 0.4);
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::new(0, vec![0; FRAME_SAMPLES]);
        assert_eq!(frame.duration(), Duration::from_millis(80));
    }

    #[test]
    fn test_samples_to_wav_header() {
        let wav = samples_to_wav(&[0, 1000, -1000, i16::MAX], SAMPLE_RATE).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 8);
    }

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(&[2.0, -2.0, 0.0]), vec![32767, -32768, 0]);
    }
}
