//! Decoding WAV earcons and MP3 TTS responses to mono PCM

use std::io::Cursor;
use std::path::Path;

use crate::audio::AudioChunk;
use crate::{Error, Result};

/// Load a 16-bit PCM WAV file as mono, averaging stereo channels
///
/// # Errors
///
/// Returns error if the file is missing, malformed, or not 16-bit integer PCM
pub fn load_wav_mono(path: &Path) -> Result<AudioChunk> {
    let reader = hound::WavReader::open(path)?;
    decode_wav_reader(reader)
}

/// Decode 16-bit PCM WAV bytes as mono
///
/// # Errors
///
/// Returns error if the bytes are not 16-bit integer PCM WAV
pub fn decode_wav_mono(bytes: &[u8]) -> Result<AudioChunk> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    decode_wav_reader(reader)
}

fn decode_wav_reader<R: std::io::Read>(mut reader: hound::WavReader<R>) -> Result<AudioChunk> {
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Wav(format!(
            "unsupported format: {} bits {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let interleaved = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let samples = match spec.channels {
        1 => interleaved,
        2 => interleaved
            .chunks(2)
            .map(|pair| {
                let left = i32::from(pair[0]);
                let right = i32::from(pair.get(1).copied().unwrap_or(pair[0]));
                // Average of two i16 values always fits in i16
                #[allow(clippy::cast_possible_truncation)]
                let mixed = ((left + right) / 2) as i16;
                mixed
            })
            .collect(),
        n => return Err(Error::Wav(format!("unsupported channel count: {n}"))),
    };

    if samples.is_empty() || spec.sample_rate == 0 {
        return Err(Error::Wav("no audio data".to_string()));
    }

    Ok(AudioChunk::new(samples, spec.sample_rate))
}

/// Decode MP3 bytes to mono PCM
///
/// # Errors
///
/// Returns error if the stream cannot be decoded
pub fn decode_mp3(mp3_data: &[u8]) -> Result<AudioChunk> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = i32::from(chunk[0]);
                        let right = i32::from(chunk.get(1).copied().unwrap_or(chunk[0]));
                        #[allow(clippy::cast_possible_truncation)]
                        let mixed = ((left + right) / 2) as i16;
                        mixed
                    }));
                } else {
                    samples.extend_from_slice(&frame.data);
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(AudioChunk::new(samples, sample_rate))
}
