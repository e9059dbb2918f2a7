//! Shared test utilities
//!
//! Scripted stand-ins for the models, the speaker and the bridge so the
//! pipeline can be driven without audio hardware or network access.

#![allow(
    dead_code,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use beacon_satellite::audio::AudioInput;
use beacon_satellite::{
    AudioChunk, AudioFrame, AudioSink, FRAME_SAMPLES, SAMPLE_RATE, SpeakCommand, SttEngine,
    TranscriptionMessage, Transport, TtsEngine, VadModel, WakeWordModel,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Sample value identifying a piece of synthesized text
#[must_use]
pub fn tag_for(text: &str) -> i16 {
    let hash = text
        .bytes()
        .fold(17_u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    // Keep tags positive and away from tone/earcon values
    i16::try_from(hash % 20_000).unwrap_or(0) + 1_000
}

/// One call to [`RecordingSink::play`]
#[derive(Debug, Clone)]
pub struct Playback {
    /// First sample of the buffer
    pub tag: i16,
    pub samples: usize,
    pub started: Instant,
    pub ended: Instant,
    /// Cut off by cancellation or `stop`
    pub interrupted: bool,
}

/// Sink that plays in simulated real time and records every buffer
#[derive(Default)]
pub struct RecordingSink {
    playbacks: Mutex<Vec<Playback>>,
    in_progress: Mutex<Vec<(i16, Instant)>>,
    stops: AtomicU64,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Finished (or cut off) playbacks in start order
    #[must_use]
    pub fn playbacks(&self) -> Vec<Playback> {
        let mut playbacks = self.playbacks.lock().unwrap().clone();
        playbacks.sort_by_key(|p| p.started);
        playbacks
    }

    /// Tags of buffers currently being played
    #[must_use]
    pub fn playing(&self) -> Vec<i16> {
        self.in_progress.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Every tag that reached the speaker, finished or not
    #[must_use]
    pub fn heard(&self) -> Vec<i16> {
        let mut tags: Vec<i16> = self.playbacks().iter().map(|p| p.tag).collect();
        tags.extend(self.playing());
        tags
    }

    /// Wait until a buffer with `tag` starts playing
    pub async fn wait_for_tag(&self, tag: i16, timeout: Duration) -> bool {
        wait_until(timeout, || self.heard().contains(&tag)).await
    }
}

impl AudioSink for RecordingSink {
    fn play(
        &self,
        samples: &[i16],
        sample_rate: u32,
        cancel: &CancellationToken,
    ) -> beacon_satellite::Result<()> {
        let tag = samples.first().copied().unwrap_or_default();
        let started = Instant::now();
        let stops = self.stops.load(Ordering::SeqCst);
        self.in_progress.lock().unwrap().push((tag, started));

        let length = Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate));
        let mut interrupted = false;
        while started.elapsed() < length {
            if cancel.is_cancelled() || self.stops.load(Ordering::SeqCst) != stops {
                interrupted = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        self.in_progress
            .lock()
            .unwrap()
            .retain(|(t, s)| !(*t == tag && *s == started));
        self.playbacks.lock().unwrap().push(Playback {
            tag,
            samples: samples.len(),
            started,
            ended: Instant::now(),
            interrupted,
        });
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// TTS that returns `samples_per_char` samples of [`tag_for`] per character
pub struct ScriptedTts {
    delay: Duration,
    samples_per_char: usize,
    sample_rate: u32,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTts {
    #[must_use]
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            samples_per_char: 400,
            sample_rate: 16_000,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Texts synthesized so far
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TtsEngine for ScriptedTts {
    fn synthesize(&self, text: &str) -> beacon_satellite::Result<AudioChunk> {
        self.calls.lock().unwrap().push(text.to_string());
        std::thread::sleep(self.delay);
        Ok(AudioChunk::new(
            vec![tag_for(text); text.len() * self.samples_per_char],
            self.sample_rate,
        ))
    }
}

/// STT that hands out scripted transcripts in order, then empty strings
#[derive(Default)]
pub struct ScriptedStt {
    transcripts: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedStt {
    #[must_use]
    pub fn new(transcripts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            transcripts: Mutex::new(transcripts.iter().map(ToString::to_string).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SttEngine for ScriptedStt {
    fn transcribe(&self, _samples: &[i16], _sample_rate: u32) -> beacon_satellite::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.transcripts.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// STT engine that always fails
#[derive(Default)]
pub struct FailingStt {
    calls: AtomicUsize,
}

impl FailingStt {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SttEngine for FailingStt {
    fn transcribe(&self, _samples: &[i16], _sample_rate: u32) -> beacon_satellite::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(beacon_satellite::Error::Stt("model crashed".to_string()))
    }
}

/// Wake word model that fires on the rising edge of a loud frame
pub struct LoudWakeWord {
    threshold: f32,
    was_loud: bool,
}

impl LoudWakeWord {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            threshold: 0.1,
            was_loud: false,
        }
    }
}

impl WakeWordModel for LoudWakeWord {
    fn wake_word(&self) -> &str {
        "hey test"
    }

    fn score(&mut self, frame: &AudioFrame) -> beacon_satellite::Result<f32> {
        let loud = frame.energy() >= self.threshold;
        let rising = loud && !self.was_loud;
        self.was_loud = loud;
        Ok(if rising { 0.95 } else { 0.0 })
    }

    fn reset(&mut self) {
        self.was_loud = false;
    }
}

/// In-memory bridge
#[derive(Default)]
pub struct MemoryTransport {
    pending: Mutex<VecDeque<SpeakCommand>>,
    sent: Mutex<Vec<TranscriptionMessage>>,
    delivered: Mutex<Vec<(SpeakCommand, Instant)>>,
    poll_delay: Duration,
    discard_delay: Duration,
    discards: AtomicUsize,
    held: AtomicBool,
    rejecting: AtomicBool,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Polls take `delay` before looking at the queue
    #[must_use]
    pub fn with_poll_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            poll_delay: delay,
            ..Self::default()
        })
    }

    /// Discarding takes `delay` before the queue is cleared
    #[must_use]
    pub fn with_discard_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            discard_delay: delay,
            ..Self::default()
        })
    }

    /// While held, polls see an empty bridge
    pub fn hold(&self, held: bool) {
        self.held.store(held, Ordering::SeqCst);
    }

    /// While rejecting, every transcription send fails
    pub fn reject(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    #[must_use]
    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    /// Commands still waiting on the bridge
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Queue a command for the next poll
    pub fn push(&self, command: SpeakCommand) {
        self.pending.lock().unwrap().push_back(command);
    }

    #[must_use]
    pub fn sent(&self) -> Vec<TranscriptionMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// When each command was handed to the satellite
    #[must_use]
    pub fn delivered(&self) -> Vec<(SpeakCommand, Instant)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> beacon_satellite::Result<()> {
        Ok(())
    }

    async fn send_transcription(
        &self,
        message: &TranscriptionMessage,
    ) -> beacon_satellite::Result<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(beacon_satellite::Error::Transport(
                "bridge unavailable".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn poll_speak(&self) -> Option<SpeakCommand> {
        if !self.poll_delay.is_zero() {
            tokio::time::sleep(self.poll_delay).await;
        }
        if self.held.load(Ordering::SeqCst) {
            return None;
        }
        let command = self.pending.lock().unwrap().pop_front()?;
        self.delivered
            .lock()
            .unwrap()
            .push((command.clone(), Instant::now()));
        Some(command)
    }

    async fn discard_pending(&self) {
        if !self.discard_delay.is_zero() {
            tokio::time::sleep(self.discard_delay).await;
        }
        self.pending.lock().unwrap().clear();
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

/// VAD that always reports the same probability
pub struct FixedVad(pub f32);

impl VadModel for FixedVad {
    fn speech_probability(&mut self, _frame: &AudioFrame) -> beacon_satellite::Result<f32> {
        Ok(self.0)
    }
}

/// Sine tone at the capture rate
#[must_use]
pub fn tone(frequency: f32, seconds: f32, amplitude: f32) -> Vec<i16> {
    let count = (SAMPLE_RATE as f32 * seconds) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin() * 32767.0) as i16
        })
        .collect()
}

/// Digital silence at the capture rate
#[must_use]
pub fn silence(seconds: f32) -> Vec<i16> {
    vec![0; (SAMPLE_RATE as f32 * seconds) as usize]
}

/// Seeded pink noise (Voss-McCartney) at roughly `amplitude` peak
#[must_use]
pub fn pink_noise(seconds: f32, amplitude: f32, seed: u64) -> Vec<i16> {
    const ROWS: usize = 16;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = [0.0_f32; ROWS];
    let mut running = 0.0_f32;
    let count = (SAMPLE_RATE as f32 * seconds) as usize;

    (0..count)
        .map(|i| {
            let row = (i + 1).trailing_zeros() as usize;
            if row < ROWS {
                running -= rows[row];
                rows[row] = rng.gen_range(-1.0..1.0);
                running += rows[row];
            }
            let white: f32 = rng.gen_range(-1.0..1.0);
            let sample = (running + white) / (ROWS as f32 + 1.0);
            (sample * amplitude * 32767.0) as i16
        })
        .collect()
}

/// Cut samples into numbered capture frames, dropping a partial tail
#[must_use]
pub fn frames(samples: &[i16]) -> Vec<AudioFrame> {
    samples
        .chunks_exact(FRAME_SAMPLES)
        .enumerate()
        .map(|(i, chunk)| AudioFrame::new(i as u64, chunk.to_vec()))
        .collect()
}

/// Feed frames to a running pipeline, numbering them from `first_index`
pub async fn feed(tx: &mpsc::Sender<AudioInput>, samples: &[i16], first_index: u64) -> u64 {
    let mut index = first_index;
    for chunk in samples.chunks_exact(FRAME_SAMPLES) {
        tx.send(AudioInput::Frame(AudioFrame::new(index, chunk.to_vec())))
            .await
            .unwrap();
        index += 1;
    }
    index
}

/// Poll `condition` every 5ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Write a constant-valued mono WAV and return its path
#[must_use]
pub fn write_wav(dir: &std::path::Path, value: i16, seconds: f32, sample_rate: u32) -> std::path::PathBuf {
    let path = dir.join("earcon.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..(sample_rate as f32 * seconds) as usize {
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
    path
}
