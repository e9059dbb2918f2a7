//! Streaming TTS integration tests

use std::time::{Duration, Instant};

use beacon_satellite::speech::QueueOutcome;
use beacon_satellite::{AudioChunk, SpeechEngine, TtsQueue};
use tokio_util::sync::CancellationToken;

mod common;
use common::{RecordingSink, ScriptedTts, tag_for, wait_until};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sentences_play_in_order() {
    let tts = ScriptedTts::new(Duration::from_millis(20));
    let sink = RecordingSink::new();
    let (engine, mut finished) = SpeechEngine::new(tts.clone(), sink.clone());

    let generation = engine.speak("It is sunny. Highs of twenty! Enjoy the day?");
    assert!(engine.is_speaking());

    let done = tokio::time::timeout(Duration::from_secs(5), finished.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.generation, generation);
    assert_eq!(done.outcome, QueueOutcome::Completed);

    let heard: Vec<i16> = sink.playbacks().iter().map(|p| p.tag).collect();
    assert_eq!(
        heard,
        vec![
            tag_for("It is sunny."),
            tag_for("Highs of twenty!"),
            tag_for("Enjoy the day?"),
        ]
    );
    assert!(sink.playbacks().iter().all(|p| !p.interrupted));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_synthesis_overlaps_playback() {
    // Each sentence takes 100ms to synthesize and ~300ms to play
    let tts = ScriptedTts::new(Duration::from_millis(100));
    let sink = RecordingSink::new();
    let (engine, mut finished) = SpeechEngine::new(tts, sink.clone());

    engine.speak("First sentence. Second sentence.");
    tokio::time::timeout(Duration::from_secs(5), finished.recv())
        .await
        .unwrap()
        .unwrap();

    let playbacks = sink.playbacks();
    assert_eq!(playbacks.len(), 2);
    // The second sentence was ready when the first finished
    let gap = playbacks[1].started.duration_since(playbacks[0].ended);
    assert!(gap < Duration::from_millis(50), "gap {gap:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_speech_stops_everything() {
    let tts = ScriptedTts::new(Duration::from_millis(30));
    let sink = RecordingSink::new();
    let (engine, mut finished) = SpeechEngine::new(tts.clone(), sink.clone());

    let generation = engine.speak("A long first sentence to talk over. Then another one. And more.");
    assert!(
        sink.wait_for_tag(tag_for("A long first sentence to talk over."), Duration::from_secs(2))
            .await
    );

    let cancelled_at = Instant::now();
    engine.cancel_speech();
    assert!(!engine.is_speaking());

    let done = tokio::time::timeout(Duration::from_secs(2), finished.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.generation, generation);
    assert_eq!(done.outcome, QueueOutcome::Cancelled);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let playbacks = sink.playbacks();
    assert_eq!(playbacks.len(), 1);
    assert!(playbacks[0].interrupted);
    assert!(playbacks[0].ended.duration_since(cancelled_at) < Duration::from_millis(50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_response_invalidates_old_one() {
    let tts = ScriptedTts::new(Duration::from_millis(80));
    let sink = RecordingSink::new();
    let (engine, mut finished) = SpeechEngine::new(tts, sink.clone());

    let old = engine.speak("Old reply that should never be heard.");
    let new = engine.speak("New reply.");
    assert!(new > old);

    let mut outcomes = Vec::new();
    while outcomes.len() < 2 {
        let done = tokio::time::timeout(Duration::from_secs(3), finished.recv())
            .await
            .unwrap()
            .unwrap();
        outcomes.push((done.generation, done.outcome));
    }

    assert!(outcomes.contains(&(new, QueueOutcome::Completed)));
    assert!(!outcomes.contains(&(old, QueueOutcome::Completed)));
    assert_eq!(sink.heard(), vec![tag_for("New reply.")]);
}

#[tokio::test]
async fn test_queue_cancel_discards_backlog() {
    let (queue, mut consumer) = TtsQueue::new(4);
    assert!(queue.push(AudioChunk::new(vec![1; 160], 16_000)).await);
    assert!(queue.push(AudioChunk::new(vec![2; 160], 16_000)).await);

    queue.cancel();
    assert!(!queue.push(AudioChunk::new(vec![3; 160], 16_000)).await);
    assert!(consumer.next().await.is_none());
    assert!(!queue.is_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_run_plays_until_finished() {
    let sink = RecordingSink::new();
    let (queue, consumer) = TtsQueue::new(2);

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            for value in [11, 12, 13] {
                queue.push(AudioChunk::new(vec![value; 320], 16_000)).await;
            }
            queue.finish();
        })
    };

    let outcome = consumer.run(sink.clone()).await;
    producer.await.unwrap();

    assert_eq!(outcome, QueueOutcome::Completed);
    assert_eq!(sink.heard(), vec![11, 12, 13]);
    assert!(queue.is_finished());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_cancel_interrupts_current_chunk() {
    let sink = RecordingSink::new();
    let (queue, consumer) = TtsQueue::new(2);
    assert!(queue.push(AudioChunk::new(vec![21; 16_000], 16_000)).await);

    let token: CancellationToken = queue.cancel_token();
    let run = tokio::spawn(consumer.run(sink.clone()));
    assert!(wait_until(Duration::from_secs(1), || sink.playing() == vec![21]).await);

    token.cancel();
    let outcome = tokio::time::timeout(Duration::from_millis(200), run)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome, QueueOutcome::Cancelled);
    assert!(sink.playbacks()[0].interrupted);
}
