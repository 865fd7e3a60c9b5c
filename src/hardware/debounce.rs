//! Debounced button monitoring
//!
//! A mechanical button bounces for a few milliseconds on every press and
//! release. The monitor samples the line on a fixed interval and only
//! accepts a new level once it has held for longer than the debounce
//! window; the handler then runs once per confirmed press.

use super::traits::{EdgeHandler, InputSource, Level};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Timing and polarity of a debounced input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    /// Time between two samples
    pub poll_interval: Duration,
    /// How long a new level must hold before it is accepted
    pub window: Duration,
    /// Level the input reads while pressed
    pub active: Level,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            window: Duration::from_millis(500),
            active: Level::Low,
        }
    }
}

/// Whether the raw level currently disagrees with the confirmed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePhase {
    Idle,
    Settling,
}

/// Edge detection state, owned by one polling loop
#[derive(Debug, Clone)]
pub struct InputEdgeState {
    stable: Level,
    raw: Level,
    last_change: Instant,
    window: Duration,
}

impl InputEdgeState {
    /// Seed the state from a first sample; seeding never yields an edge
    pub fn new(initial: Level, now: Instant, window: Duration) -> Self {
        Self {
            stable: initial,
            raw: initial,
            last_change: now,
            window,
        }
    }

    /// Last confirmed level
    pub fn stable(&self) -> Level {
        self.stable
    }

    pub fn phase(&self) -> EdgePhase {
        if self.raw == self.stable {
            EdgePhase::Idle
        } else {
            EdgePhase::Settling
        }
    }

    /// Feed one sample; returns the level if this sample confirmed it
    pub fn observe(&mut self, raw: Level, now: Instant) -> Option<Level> {
        if raw != self.raw {
            self.raw = raw;
            self.last_change = now;
        }

        if now.saturating_duration_since(self.last_change) > self.window && self.stable != self.raw {
            self.stable = self.raw;
            return Some(self.stable);
        }

        None
    }
}

/// Polls an input and runs a handler on every confirmed press
pub struct DebounceMonitor<S> {
    source: S,
    handler: Arc<dyn EdgeHandler>,
    settings: DebounceSettings,
}

impl<S: InputSource + 'static> DebounceMonitor<S> {
    pub fn new(source: S, handler: Arc<dyn EdgeHandler>, settings: DebounceSettings) -> Self {
        Self {
            source,
            handler,
            settings,
        }
    }

    /// Run the polling loop on a new task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Poll until `cancel` fires; returns the number of presses handled
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state: Option<InputEdgeState> = None;
        let mut presses = 0;

        tracing::info!(
            "Monitoring button (poll {:?}, debounce {:?}, active {})",
            self.settings.poll_interval,
            self.settings.window,
            self.settings.active
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Stopping button monitoring");
                    return presses;
                }
                now = ticker.tick() => {
                    let raw = match self.source.read() {
                        Ok(level) => level,
                        Err(e) => {
                            tracing::warn!("Failed to read button input: {}", e);
                            continue;
                        }
                    };

                    let edge = state.get_or_insert_with(|| {
                        tracing::debug!("Button initial level: {}", raw);
                        InputEdgeState::new(raw, now, self.settings.window)
                    });

                    let Some(level) = edge.observe(raw, now) else {
                        continue;
                    };
                    tracing::debug!("Button level settled at {}", level);

                    if level == self.settings.active && !cancel.is_cancelled() {
                        tracing::info!("Button pressed");
                        self.handler.on_press();
                        presses += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WINDOW: Duration = Duration::from_millis(100);

    #[derive(Clone)]
    struct ScriptedInput(Arc<Mutex<Level>>);

    impl ScriptedInput {
        fn new(level: Level) -> Self {
            Self(Arc::new(Mutex::new(level)))
        }

        fn set(&self, level: Level) {
            *self.0.lock() = level;
        }
    }

    impl InputSource for ScriptedInput {
        fn read(&self) -> io::Result<Level> {
            Ok(*self.0.lock())
        }
    }

    struct BrokenInput;

    impl InputSource for BrokenInput {
        fn read(&self) -> io::Result<Level> {
            Err(io::Error::new(io::ErrorKind::Other, "line unavailable"))
        }
    }

    fn counting_handler() -> (Arc<AtomicUsize>, Arc<dyn EdgeHandler>) {
        let presses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&presses);
        let handler: Arc<dyn EdgeHandler> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (presses, handler)
    }

    fn settings() -> DebounceSettings {
        DebounceSettings {
            poll_interval: Duration::from_millis(10),
            window: WINDOW,
            active: Level::Low,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_seeded_state_is_idle() {
        let t0 = Instant::now();
        let mut state = InputEdgeState::new(Level::High, t0, WINDOW);
        assert_eq!(state.phase(), EdgePhase::Idle);
        assert_eq!(state.observe(Level::High, t0 + ms(500)), None);
        assert_eq!(state.stable(), Level::High);
    }

    #[test]
    fn test_bounce_shorter_than_window_is_ignored() {
        let t0 = Instant::now();
        let mut state = InputEdgeState::new(Level::High, t0, WINDOW);

        for i in 1..=50u64 {
            let level = Level::from(i % 2 == 0);
            assert_eq!(state.observe(level, t0 + ms(i * 20)), None);
        }
        assert_eq!(state.stable(), Level::High);
    }

    #[test]
    fn test_reversal_before_window_is_ignored() {
        let t0 = Instant::now();
        let mut state = InputEdgeState::new(Level::High, t0, WINDOW);

        assert_eq!(state.observe(Level::Low, t0 + ms(10)), None);
        assert_eq!(state.phase(), EdgePhase::Settling);
        assert_eq!(state.observe(Level::High, t0 + ms(90)), None);
        assert_eq!(state.phase(), EdgePhase::Idle);
        assert_eq!(state.observe(Level::High, t0 + ms(400)), None);
    }

    #[test]
    fn test_held_transition_confirms_once() {
        let t0 = Instant::now();
        let mut state = InputEdgeState::new(Level::High, t0, WINDOW);

        assert_eq!(state.observe(Level::Low, t0 + ms(10)), None);
        // Exactly the window is not enough
        assert_eq!(state.observe(Level::Low, t0 + ms(110)), None);
        assert_eq!(state.observe(Level::Low, t0 + ms(120)), Some(Level::Low));
        assert_eq!(state.observe(Level::Low, t0 + ms(130)), None);
        assert_eq!(state.observe(Level::Low, t0 + ms(900)), None);
        assert_eq!(state.stable(), Level::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_ignores_fast_oscillation() {
        let input = ScriptedInput::new(Level::High);
        let (presses, handler) = counting_handler();
        let cancel = CancellationToken::new();
        let task = DebounceMonitor::new(input.clone(), handler, settings()).spawn(cancel.clone());

        tokio::time::sleep(ms(50)).await;
        for i in 0..40 {
            input.set(if i % 2 == 0 { Level::Low } else { Level::High });
            tokio::time::sleep(ms(30)).await;
        }
        input.set(Level::High);
        tokio::time::sleep(ms(300)).await;

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 0);
        assert_eq!(presses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_fires_once_per_press() {
        let input = ScriptedInput::new(Level::High);
        let (presses, handler) = counting_handler();
        let cancel = CancellationToken::new();
        let task = DebounceMonitor::new(input.clone(), handler, settings()).spawn(cancel.clone());

        tokio::time::sleep(ms(50)).await;

        // Press with contact bounce, then hold
        for level in [Level::Low, Level::High, Level::Low, Level::High, Level::Low] {
            input.set(level);
            tokio::time::sleep(ms(5)).await;
        }
        tokio::time::sleep(ms(300)).await;
        assert_eq!(presses.load(Ordering::SeqCst), 1);

        // Release is not a press
        input.set(Level::High);
        tokio::time::sleep(ms(300)).await;
        assert_eq!(presses.load(Ordering::SeqCst), 1);

        input.set(Level::Low);
        tokio::time::sleep(ms(300)).await;
        assert_eq!(presses.load(Ordering::SeqCst), 2);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_respects_active_high() {
        let input = ScriptedInput::new(Level::Low);
        let (presses, handler) = counting_handler();
        let cancel = CancellationToken::new();
        let settings = DebounceSettings {
            active: Level::High,
            ..settings()
        };
        let task = DebounceMonitor::new(input.clone(), handler, settings).spawn(cancel.clone());

        tokio::time::sleep(ms(50)).await;
        input.set(Level::High);
        tokio::time::sleep(ms(300)).await;

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(presses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_press_after_cancellation() {
        let input = ScriptedInput::new(Level::High);
        let (presses, handler) = counting_handler();
        let cancel = CancellationToken::new();
        let task = DebounceMonitor::new(input.clone(), handler, settings()).spawn(cancel.clone());

        tokio::time::sleep(ms(50)).await;
        input.set(Level::Low);
        tokio::time::sleep(ms(20)).await;
        cancel.cancel();

        let finished = tokio::time::timeout(ms(10), task).await;
        assert!(finished.is_ok(), "monitor must stop within one poll interval");
        tokio::time::sleep(ms(300)).await;
        assert_eq!(presses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_are_skipped() {
        let (presses, handler) = counting_handler();
        let cancel = CancellationToken::new();
        let task = DebounceMonitor::new(BrokenInput, handler, settings()).spawn(cancel.clone());

        tokio::time::sleep(ms(200)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), 0);
        assert_eq!(presses.load(Ordering::SeqCst), 0);
    }
}
