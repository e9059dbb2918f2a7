//! Looping earcon played while the agent is thinking

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::audio::{AudioChunk, AudioSink, load_wav_mono};

/// Pause between repeats of the earcon
pub const DEFAULT_CHIME_INTERVAL: Duration = Duration::from_secs(5);

/// Plays an earcon once immediately, then again every interval until stopped
pub struct WaitingChime {
    earcon: Option<Arc<AudioChunk>>,
    sink: Arc<dyn AudioSink>,
    interval: Duration,
    active: Mutex<Option<CancellationToken>>,
}

impl WaitingChime {
    /// Load the earcon from a WAV file
    ///
    /// A missing or unreadable file leaves the chime silent rather than failing.
    #[must_use]
    pub fn new(path: Option<&Path>, sink: Arc<dyn AudioSink>) -> Self {
        let earcon = path.and_then(|path| match load_wav_mono(path) {
            Ok(chunk) => {
                tracing::debug!(
                    path = %path.display(),
                    samples = chunk.samples.len(),
                    sample_rate = chunk.sample_rate,
                    "earcon loaded"
                );
                Some(chunk)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "earcon unavailable, chime disabled");
                None
            }
        });

        Self::from_chunk(earcon, sink)
    }

    /// Use already-decoded earcon audio
    #[must_use]
    pub fn from_chunk(earcon: Option<AudioChunk>, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            earcon: earcon.filter(|c| !c.is_empty()).map(Arc::new),
            sink,
            interval: DEFAULT_CHIME_INTERVAL,
            active: Mutex::new(None),
        }
    }

    /// Builder: change the repeat interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Whether an earcon was loaded
    #[must_use]
    pub const fn loaded(&self) -> bool {
        self.earcon.is_some()
    }

    /// Whether the loop is running
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.active
            .lock()
            .is_ok_and(|a| a.as_ref().is_some_and(|t| !t.is_cancelled()))
    }

    /// Start the loop; no-op when silent or already playing
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let Some(earcon) = self.earcon.clone() else {
            return;
        };
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        if active.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return;
        }

        let token = CancellationToken::new();
        *active = Some(token.clone());
        drop(active);

        tracing::debug!("waiting chime started");
        tokio::spawn(chime_loop(earcon, Arc::clone(&self.sink), self.interval, token));
    }

    /// Stop the loop and cut off the earcon mid-play; no-op when idle
    pub fn stop(&self) {
        let token = self.active.lock().ok().and_then(|mut a| a.take());
        if let Some(token) = token {
            token.cancel();
            tracing::debug!("waiting chime stopped");
        }
    }
}

impl Drop for WaitingChime {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn chime_loop(
    earcon: Arc<AudioChunk>,
    sink: Arc<dyn AudioSink>,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        if token.is_cancelled() {
            break;
        }

        let sink = Arc::clone(&sink);
        let earcon = Arc::clone(&earcon);
        let play_token = token.clone();
        let played = tokio::task::spawn_blocking(move || {
            sink.play(&earcon.samples, earcon.sample_rate, &play_token)
        })
        .await;

        match played {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "chime playback failed"),
            Err(e) => tracing::warn!(error = %e, "chime task failed"),
        }

        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    struct NullSink;

    impl AudioSink for NullSink {
        fn play(&self, _samples: &[i16], _rate: u32, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }

        fn stop(&self) {}
    }

    #[test]
    fn test_missing_earcon_is_silent() {
        let chime = WaitingChime::new(Some(Path::new("/nonexistent/earcon.wav")), Arc::new(NullSink));
        assert!(!chime.loaded());
    }

    #[tokio::test]
    async fn test_unloaded_start_is_noop() {
        let chime = WaitingChime::from_chunk(None, Arc::new(NullSink));
        chime.start();
        assert!(!chime.is_playing());
        chime.stop();
    }

    #[tokio::test]
    async fn test_start_stop_toggles_playing() {
        let chime = WaitingChime::from_chunk(
            Some(AudioChunk::new(vec![100; 2048], 16000)),
            Arc::new(NullSink),
        );
        assert!(chime.loaded());

        chime.start();
        assert!(chime.is_playing());
        chime.start();
        assert!(chime.is_playing());

        chime.stop();
        assert!(!chime.is_playing());
        chime.stop();
    }
}
