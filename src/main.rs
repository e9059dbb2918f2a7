use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use beacon_satellite::audio::{
    AudioCapture, AudioInput, CpalSink, generate_tone, list_input_devices, list_output_devices,
};
use beacon_satellite::pipeline::PipelineComponents;
use beacon_satellite::transport::{Capabilities, DeviceIdentity};
use beacon_satellite::voice::{EnergyVad, OpenAiTts, TranscriptWakeWord, WhisperStt};
use beacon_satellite::{
    AudioSink, Config, FeedbackMode, Pipeline, PipelineEvent, SttEngine, TtsEngine, WaitingChime,
    WakeWordModel,
};

/// Beacon Satellite - voice front end for remote AI agents
#[derive(Parser)]
#[command(name = "satellite", version, about)]
struct Cli {
    /// Agent bridge endpoint (ws://, wss://, http:// or https://)
    #[arg(short, long, env = "SATELLITE_ENDPOINT")]
    endpoint: Option<String>,

    /// Wake word phrase; implies wake word mode
    #[arg(short, long)]
    wake_word: Option<String>,

    /// Listen continuously without a wake word
    #[arg(long, conflicts_with = "wake_word")]
    no_wake_word: bool,

    /// Waiting feedback: chime, phrases, both or off
    #[arg(long)]
    feedback: Option<FeedbackMode>,

    /// Earcon WAV for the waiting chime
    #[arg(long)]
    earcon: Option<PathBuf>,

    /// Input device name
    #[arg(long)]
    input_device: Option<String>,

    /// Output device name
    #[arg(long)]
    output_device: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Show microphone levels
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Play a test tone
    TestSpeaker,
    /// Play the waiting chime a few times
    TestChime {
        /// Seconds to let the chime loop
        #[arg(short, long, default_value = "6")]
        duration: u64,
    },
    /// Synthesize and play a sentence
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// List audio devices
    ListDevices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,beacon_satellite=info",
        1 => "info,beacon_satellite=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &cli);

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker(&config).await,
            Command::TestChime { duration } => test_chime(&config, duration).await,
            Command::TestTts { text } => test_tts(&config, &text).await,
            Command::ListDevices => {
                list_devices();
                Ok(())
            }
        };
    }

    tracing::info!(
        endpoint = %config.transport.endpoint,
        device_id = %config.transport.device_id,
        wake_word = config.voice.wake_word_enabled.then_some(config.voice.wake_word.as_str()),
        feedback = %config.feedback.mode,
        "starting beacon satellite"
    );

    let sink: Arc<dyn AudioSink> = Arc::new(CpalSink::new(config.audio.output_device.as_deref())?);
    let stt: Arc<dyn SttEngine> = Arc::new(WhisperStt::new(
        &config.speech.stt_url,
        config.speech.api_key.clone(),
        config.speech.stt_model.clone(),
    )?);
    let tts: Arc<dyn TtsEngine> = Arc::new(build_tts(&config)?);

    let wake_word = config.voice.wake_word_enabled.then(|| {
        Box::new(TranscriptWakeWord::new(&config.voice.wake_word, Arc::clone(&stt)))
            as Box<dyn WakeWordModel>
    });

    let identity = DeviceIdentity {
        device_id: config.transport.device_id.clone(),
        account_id: config.transport.account_id.clone(),
        capabilities: Capabilities {
            stt: true,
            tts: true,
            wake_word: config.voice.wake_word_enabled,
        },
    };
    let transport = Arc::new(beacon_satellite::HttpTransport::new(
        &config.transport.endpoint,
        identity,
    )?);

    let pipeline = Pipeline::new(
        &config,
        PipelineComponents {
            wake_word,
            vad: Box::new(EnergyVad::default()),
            stt,
            tts,
            sink,
            transport,
        },
    );
    let handle = pipeline.handle();

    let (frame_tx, frame_rx) = mpsc::channel(64);
    let mut capture = AudioCapture::new(config.audio.input_device.as_deref())?;
    capture.start(frame_tx)?;

    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    let shutdown = handle.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    if config.voice.wake_word_enabled {
        tracing::info!("beacon satellite ready - say \"{}\"", config.voice.wake_word);
    } else {
        tracing::info!("beacon satellite ready (listening continuously)");
    }

    let result = pipeline.run(frame_rx).await;
    capture.stop();
    result?;

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(endpoint) = &cli.endpoint {
        config.transport.endpoint.clone_from(endpoint);
    }
    if let Some(word) = &cli.wake_word {
        config.voice.wake_word.clone_from(word);
        config.voice.wake_word_enabled = true;
    }
    if cli.no_wake_word {
        config.voice.wake_word_enabled = false;
    }
    if let Some(mode) = cli.feedback {
        config.feedback.mode = mode;
    }
    if let Some(earcon) = &cli.earcon {
        config.feedback.earcon_path = Some(earcon.clone());
    }
    if cli.input_device.is_some() {
        config.audio.input_device.clone_from(&cli.input_device);
    }
    if cli.output_device.is_some() {
        config.audio.output_device.clone_from(&cli.output_device);
    }
}

fn build_tts(config: &Config) -> beacon_satellite::Result<OpenAiTts> {
    OpenAiTts::new(
        &config.speech.tts_url,
        config.speech.api_key.clone(),
        config.speech.tts_voice.clone(),
        config.speech.tts_speed,
        config.speech.tts_model.clone(),
    )
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Transcription { text, .. } => tracing::info!(text = %text, "heard"),
        PipelineEvent::Speaking { text, generation } => {
            tracing::info!(generation, text = %text, "speaking");
        }
        PipelineEvent::Error {
            message,
            fatal: false,
        } => tracing::warn!(error = %message, "pipeline error"),
        other => tracing::trace!(event = ?other, "pipeline event"),
    }
}

/// Show microphone levels once per second
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let (tx, mut rx) = mpsc::channel(64);
    let mut capture = AudioCapture::new(config.audio.input_device.as_deref())?;
    capture.start(tx)?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut energy_sum = 0.0_f32;
        let mut peak = 0.0_f32;
        let mut frames = 0_u32;

        while let Ok(Some(input)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            match input {
                AudioInput::Frame(frame) => {
                    energy_sum += frame.energy();
                    peak = frame
                        .to_f32()
                        .iter()
                        .map(|s| s.abs())
                        .fold(peak, f32::max);
                    frames += 1;
                }
                AudioInput::Failed(message) => anyhow::bail!("capture failed: {message}"),
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let energy = if frames == 0 { 0.0 } else { energy_sum / frames as f32 };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: satellite list-devices");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Play a 440Hz tone for two seconds
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new(config.audio.output_device.as_deref())?;
    let samples = generate_tone(24000, 440.0, 2000, 0.3);
    println!("Playing {} samples at 24000 Hz...", samples.len());

    tokio::task::spawn_blocking(move || sink.play(&samples, 24000, &CancellationToken::new()))
        .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: satellite list-devices");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Loop the waiting chime for a while
async fn test_chime(config: &Config, duration: u64) -> anyhow::Result<()> {
    let Some(path) = config.feedback.earcon_path.as_deref() else {
        anyhow::bail!("no earcon configured (set --earcon or [feedback] earcon_path)");
    };

    let sink: Arc<dyn AudioSink> = Arc::new(CpalSink::new(config.audio.output_device.as_deref())?);
    let chime = WaitingChime::new(Some(path), sink)
        .with_interval(Duration::from_millis(config.feedback.chime_interval_ms));
    if !chime.loaded() {
        anyhow::bail!("could not load earcon {}", path.display());
    }

    println!("Playing chime from {} for {duration} seconds...", path.display());
    chime.start();
    tokio::time::sleep(Duration::from_secs(duration)).await;
    chime.stop();
    println!("Chime stopped");

    Ok(())
}

/// Synthesize text and play it
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = build_tts(config)?;
    let sink = CpalSink::new(config.audio.output_device.as_deref())?;
    let text = text.to_string();

    println!("Synthesizing speech...");
    tokio::task::spawn_blocking(move || -> beacon_satellite::Result<()> {
        let chunk = tts.synthesize(&text)?;
        println!(
            "Got {:.1}s of audio at {} Hz",
            chunk.duration().as_secs_f32(),
            chunk.sample_rate
        );
        println!("Playing audio...");
        sink.play(&chunk.samples, chunk.sample_rate, &CancellationToken::new())
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

fn list_devices() {
    println!("Input devices:");
    for name in list_input_devices() {
        println!("  {name}");
    }
    println!("\nOutput devices:");
    for name in list_output_devices() {
        println!("  {name}");
    }
}
