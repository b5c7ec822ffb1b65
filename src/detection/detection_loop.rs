use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::analysis::{AnalysisResult, PostureAnalyzer};
use crate::capture::FrameSource;
use crate::detection::state::{DetectionState, no_frame_result};
use crate::error::DetectionError;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(3);

/// Owns the start/stop lifecycle and the authoritative [`DetectionState`].
///
/// While running, one capture+analyze cycle fires immediately and then once per period.
/// Cycles run as their own tasks, so a slow request may still be in flight when the next
/// tick fires; every cycle takes a sequence number and only results newer than the one
/// shown are applied. Tearing down (explicitly or on drop) stops the timer and suppresses
/// every later apply.
///
/// The loop schedules its cycles on the tokio runtime it was built in.
pub struct DetectionLoop {
    shared: Arc<Shared>,
    period: Duration,
    runtime: Handle,
    ticker: Option<Ticker>,
}

struct Ticker {
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    frame_source: Arc<dyn FrameSource>,
    analyzer: Arc<dyn PostureAnalyzer>,
    state_tx: watch::Sender<DetectionState>,
    next_cycle: AtomicU64,
    session: CancellationToken,
}

impl DetectionLoop {
    pub fn new(
        frame_source: Arc<dyn FrameSource>,
        analyzer: Arc<dyn PostureAnalyzer>,
    ) -> Result<Self, DetectionError> {
        Self::builder()
            .frame_source(frame_source)
            .analyzer(analyzer)
            .build()
    }

    fn with_period(
        frame_source: Arc<dyn FrameSource>,
        analyzer: Arc<dyn PostureAnalyzer>,
        period: Duration,
        runtime: Handle,
    ) -> Self {
        let (state_tx, _) = watch::channel(DetectionState::default());
        Self {
            shared: Arc::new(Shared {
                frame_source,
                analyzer,
                state_tx,
                next_cycle: AtomicU64::new(0),
                session: CancellationToken::new(),
            }),
            period,
            runtime,
            ticker: None,
        }
    }

    pub fn builder() -> DetectionLoopBuilder {
        DetectionLoopBuilder::new()
    }

    /// Flips between idle and running, returning the new running flag.
    pub fn toggle(&mut self) -> Result<bool, DetectionError> {
        if self.shared.session.is_cancelled() {
            return Err(DetectionError::TornDown);
        }
        let running = match self.ticker.take() {
            Some(ticker) => {
                ticker.token.cancel();
                false
            }
            None => {
                self.ticker = Some(self.arm());
                true
            }
        };
        self.shared.state_tx.send_modify(|state| state.running = running);
        tracing::info!(
            running,
            period_ms = self.period.as_millis() as u64,
            "Detection toggled"
        );
        Ok(running)
    }

    pub fn start(&mut self) -> Result<(), DetectionError> {
        if !self.is_running() {
            self.toggle()?;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), DetectionError> {
        if self.is_running() {
            self.toggle()?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Whether a repeating cycle is still armed.
    pub fn is_scheduled(&self) -> bool {
        self.ticker
            .as_ref()
            .is_some_and(|ticker| !ticker.token.is_cancelled() && !ticker.task.is_finished())
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.session.is_cancelled()
    }

    pub fn state(&self) -> DetectionState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Runs one cycle inline, outside the schedule. Returns whether its result was applied.
    pub async fn capture_now(&self) -> Result<bool, DetectionError> {
        if self.shared.session.is_cancelled() {
            return Err(DetectionError::TornDown);
        }
        Ok(self.shared.run_cycle().await)
    }

    /// Ends the session: the timer stops, no later result is applied and the camera is released.
    pub fn teardown(&mut self) {
        if self.shared.session.is_cancelled() {
            return;
        }
        self.shared.session.cancel();
        if let Some(ticker) = self.ticker.take() {
            ticker.task.abort();
        }
        // Waits out an apply already holding the state lock; later ones see the cancelled session.
        self.shared.state_tx.send_if_modified(|_| false);
        self.shared.frame_source.release();
        tracing::info!(
            cycles = self.shared.next_cycle.load(Ordering::SeqCst),
            "Detection session torn down"
        );
    }

    /// [`teardown`](Self::teardown) on the blocking pool, since releasing the camera may wait
    /// on its capture thread.
    pub async fn shutdown(mut self) {
        if let Err(e) = tokio::task::spawn_blocking(move || self.teardown()).await {
            tracing::error!("Detection teardown failed: {}", e);
        }
    }

    fn arm(&self) -> Ticker {
        let token = self.shared.session.child_token();
        let task_token = token.clone();
        let shared = self.shared.clone();
        let period = self.period;

        let task = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            shared.run_cycle().await;
                        });
                    }
                }
            }
            tracing::debug!("Detection ticker stopped");
        });

        Ticker { token, task }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Shared {
    async fn run_cycle(&self) -> bool {
        if self.session.is_cancelled() {
            return false;
        }
        let cycle = self.next_cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let result = match self.frame_source.capture() {
            Some(frame) => {
                tracing::debug!(cycle, frame_id = %frame.frame_id(), "Submitting frame");
                self.analyzer.analyze(frame).await
            }
            None => {
                tracing::warn!(cycle, "No frame available from camera");
                no_frame_result()
            }
        };

        let applied = self.apply(cycle, &result);
        tracing::debug!(
            cycle,
            applied,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Detection cycle finished"
        );
        applied
    }

    fn apply(&self, cycle: u64, result: &AnalysisResult) -> bool {
        self.state_tx.send_if_modified(|state| {
            if self.session.is_cancelled() {
                tracing::debug!(cycle, "Dropping result that arrived after teardown");
                return false;
            }
            state.apply(cycle, result)
        })
    }
}

pub struct DetectionLoopBuilder {
    frame_source: Option<Arc<dyn FrameSource>>,
    analyzer: Option<Arc<dyn PostureAnalyzer>>,
    period: Duration,
}

impl DetectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            frame_source: None,
            analyzer: None,
            period: DEFAULT_PERIOD,
        }
    }

    pub fn frame_source(mut self, frame_source: Arc<dyn FrameSource>) -> Self {
        self.frame_source = Some(frame_source);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn PostureAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    // Overrides the three second polling period.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn build(self) -> Result<DetectionLoop, DetectionError> {
        let frame_source = self
            .frame_source
            .ok_or(DetectionError::MissingComponent("frame source"))?;
        let analyzer = self
            .analyzer
            .ok_or(DetectionError::MissingComponent("analyzer"))?;
        if self.period.is_zero() {
            return Err(DetectionError::InvalidPeriod);
        }
        let runtime = Handle::try_current().map_err(|_| DetectionError::NoRuntime)?;
        Ok(DetectionLoop::with_period(
            frame_source,
            analyzer,
            self.period,
            runtime,
        ))
    }
}

impl Default for DetectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
