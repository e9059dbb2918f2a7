//! Audio data model and device collaborators
//!
//! Capture delivers fixed 16kHz frames; playback accepts mono PCM at any rate
//! and can be interrupted mid-write.

mod capture;
mod decode;
mod frame;
mod playback;
mod tone;

pub use capture::{AudioCapture, AudioInput, FrameAssembler, list_input_devices};
pub use decode::{decode_mp3, decode_wav_mono, load_wav_mono};
pub use frame::{
    AudioChunk, AudioFrame, FRAME_SAMPLES, SAMPLE_RATE, SpeechSegment, f32_to_i16, rms_energy,
    samples_to_duration, samples_to_wav,
};
pub use playback::{AudioSink, CpalSink, list_output_devices, resample};
pub use tone::{generate_tone, silence};
