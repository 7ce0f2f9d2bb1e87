//! Cooldown-gated feedback queue with a background speech consumer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{FeedbackEvent, SpeechEngine};

/// Default minimum gap between two utterances of the same text.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);
/// Default time the consumer is given to wind down on stop.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct FeedbackConfig {
    pub cooldown: Duration,
    pub grace: Duration,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            grace: DEFAULT_GRACE,
        }
    }
}

/// Remembers when each text was last admitted.
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    last: HashMap<String, Instant>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// Admit `text` unless the same text was admitted less than `window` ago.
    pub fn admit(&mut self, text: &str, now: Instant) -> bool {
        if let Some(prev) = self.last.get(text) {
            if now.saturating_duration_since(*prev) < self.window {
                return false;
            }
        }
        self.last.insert(text.to_string(), now);
        true
    }
}

/// How the consumer ended when the dispatcher was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Finished on its own within the grace period.
    Drained,
    /// Needed the engine to be halted.
    Halted,
    /// Did not respond to halt and was aborted.
    Abandoned,
}

/// Accepts feedback without blocking and speaks it in order on a background task.
pub struct FeedbackDispatcher {
    tx: mpsc::UnboundedSender<FeedbackEvent>,
    gate: Mutex<CooldownGate>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
    engine: Arc<dyn SpeechEngine>,
    grace: Duration,
}

impl FeedbackDispatcher {
    /// Start the consumer task. Must be called inside a tokio runtime.
    pub fn spawn(engine: Arc<dyn SpeechEngine>, config: FeedbackConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(consume(Arc::clone(&engine), rx, shutdown_rx));
        debug!("Feedback dispatcher started with {} engine", engine.name());
        Self {
            tx,
            gate: Mutex::new(CooldownGate::new(config.cooldown)),
            shutdown,
            worker: Some(worker),
            engine,
            grace: config.grace,
        }
    }

    /// Queue `event` for speech. Returns `false` when it was suppressed by the
    /// cooldown or the dispatcher is already stopped.
    pub fn notify(&self, event: FeedbackEvent) -> bool {
        self.notify_at(event, Instant::now())
    }

    fn notify_at(&self, event: FeedbackEvent, now: Instant) -> bool {
        if self.worker.is_none() {
            return false;
        }
        {
            let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            if !gate.admit(&event.text, now) {
                debug!("Suppressed repeated feedback: {}", event.text);
                return false;
            }
        }
        if self.tx.send(event).is_err() {
            warn!("Feedback consumer is gone, dropping message");
            return false;
        }
        true
    }

    /// Stop the consumer. Queued messages that have not started are dropped.
    /// Calling this again after the first stop returns [`StopOutcome::Drained`].
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(mut worker) = self.worker.take() else {
            return StopOutcome::Drained;
        };
        let _ = self.shutdown.send(true);

        if tokio::time::timeout(self.grace, &mut worker).await.is_ok() {
            debug!("Feedback consumer drained");
            return StopOutcome::Drained;
        }

        warn!(
            "Speech still running after {:?}, halting {}",
            self.grace,
            self.engine.name()
        );
        self.engine.halt();
        if tokio::time::timeout(self.grace, &mut worker).await.is_ok() {
            return StopOutcome::Halted;
        }

        error!("Speech did not respond to halt, abandoning it");
        worker.abort();
        StopOutcome::Abandoned
    }
}

impl Drop for FeedbackDispatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

async fn consume(
    engine: Arc<dyn SpeechEngine>,
    mut rx: mpsc::UnboundedReceiver<FeedbackEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                debug!("Speaking {:?}: {}", event.category, event.text);
                if let Err(e) = engine.speak(&event.text).await {
                    warn!("Speech failed: {e:#}");
                }
            }
        }
    }
    debug!("Feedback consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Records every utterance after an optional delay.
    #[derive(Default)]
    struct Recorder {
        spoken: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl Recorder {
        fn slow(delay: Duration) -> Self {
            Self {
                spoken: Mutex::default(),
                delay,
            }
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpeechEngine for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn speak(&self, text: &str) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Blocks until halted.
    #[derive(Default)]
    struct Haltable {
        halted: Notify,
    }

    #[async_trait]
    impl SpeechEngine for Haltable {
        fn name(&self) -> &str {
            "haltable"
        }

        async fn speak(&self, _text: &str) -> anyhow::Result<()> {
            self.halted.notified().await;
            Ok(())
        }

        fn halt(&self) {
            self.halted.notify_waiters();
        }
    }

    /// Ignores halt entirely.
    struct Stuck;

    #[async_trait]
    impl SpeechEngine for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn speak(&self, _text: &str) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn quick(cooldown: Duration) -> FeedbackConfig {
        FeedbackConfig {
            cooldown,
            grace: Duration::from_millis(100),
        }
    }

    async fn wait_for(recorder: &Recorder, n: usize) {
        for _ in 0..200 {
            if recorder.spoken().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} utterances, got {:?}", recorder.spoken());
    }

    #[test]
    fn gate_suppresses_within_window() {
        let mut gate = CooldownGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(gate.admit("Knees Even", t0));
        assert!(!gate.admit("Knees Even", t0 + Duration::from_secs(2)));
        assert!(gate.admit("Chest Up", t0 + Duration::from_secs(2)));
        assert!(gate.admit("Knees Even", t0 + Duration::from_secs(6)));
    }

    #[test]
    fn gate_window_restarts_on_admission_only() {
        let mut gate = CooldownGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(gate.admit("x", t0));
        assert!(!gate.admit("x", t0 + Duration::from_secs(4)));
        // The suppressed attempt at +4s does not extend the window.
        assert!(gate.admit("x", t0 + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn duplicate_within_cooldown_is_spoken_once() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = FeedbackDispatcher::spawn(recorder.clone(), quick(DEFAULT_COOLDOWN));

        assert!(dispatcher.notify(FeedbackEvent::correction("Knees Even")));
        assert!(!dispatcher.notify(FeedbackEvent::correction("Knees Even")));
        wait_for(&recorder, 1).await;

        assert_eq!(dispatcher.stop().await, StopOutcome::Drained);
        assert_eq!(recorder.spoken(), vec!["Knees Even"]);
    }

    #[tokio::test]
    async fn repeat_after_cooldown_is_spoken_again() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher =
            FeedbackDispatcher::spawn(recorder.clone(), quick(Duration::from_millis(30)));

        assert!(dispatcher.notify(FeedbackEvent::encouragement("Nice!")));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(dispatcher.notify(FeedbackEvent::encouragement("Nice!")));
        wait_for(&recorder, 2).await;

        dispatcher.stop().await;
        assert_eq!(recorder.spoken(), vec!["Nice!", "Nice!"]);
    }

    #[tokio::test]
    async fn messages_are_spoken_in_order() {
        let recorder = Arc::new(Recorder::slow(Duration::from_millis(5)));
        let mut dispatcher = FeedbackDispatcher::spawn(recorder.clone(), quick(DEFAULT_COOLDOWN));

        for text in ["one", "two", "three"] {
            assert!(dispatcher.notify(FeedbackEvent::status(text)));
        }
        wait_for(&recorder, 3).await;

        dispatcher.stop().await;
        assert_eq!(recorder.spoken(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn notify_does_not_wait_for_speech() {
        let recorder = Arc::new(Recorder::slow(Duration::from_millis(300)));
        let mut dispatcher = FeedbackDispatcher::spawn(recorder.clone(), quick(DEFAULT_COOLDOWN));

        let started = Instant::now();
        for i in 0..10 {
            dispatcher.notify(FeedbackEvent::status(format!("message {i}")));
        }
        assert!(started.elapsed() < Duration::from_millis(100));

        dispatcher.stop().await;
    }

    #[tokio::test]
    async fn stop_halts_engine_that_is_mid_utterance() {
        let engine = Arc::new(Haltable::default());
        let mut dispatcher = FeedbackDispatcher::spawn(engine, quick(DEFAULT_COOLDOWN));

        dispatcher.notify(FeedbackEvent::status("long"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(dispatcher.stop().await, StopOutcome::Halted);
    }

    #[tokio::test]
    async fn stop_abandons_unresponsive_engine() {
        let mut dispatcher = FeedbackDispatcher::spawn(Arc::new(Stuck), quick(DEFAULT_COOLDOWN));

        dispatcher.notify(FeedbackEvent::status("forever"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        assert_eq!(dispatcher.stop().await, StopOutcome::Abandoned);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_closes_the_queue() {
        let recorder = Arc::new(Recorder::default());
        let mut dispatcher = FeedbackDispatcher::spawn(recorder.clone(), quick(DEFAULT_COOLDOWN));

        assert_eq!(dispatcher.stop().await, StopOutcome::Drained);
        assert_eq!(dispatcher.stop().await, StopOutcome::Drained);
        assert!(!dispatcher.notify(FeedbackEvent::status("late")));
        assert!(recorder.spoken().is_empty());
    }
}
