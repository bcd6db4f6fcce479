//! Recognition session lifecycle and the background worker loop.
//!
//! `Idle → Running → Stopping → Idle`, plus `Enrolling` while a registration
//! holds the camera. Only phase bookkeeping is shared with the control
//! surface; the gallery, cooldown cache, frame source and signal link are
//! owned by the worker thread for the life of one session.

use chrono::NaiveDateTime;
use rollcall_core::{
    Clock, Encoding, Evaluator, FaceOracle, Gallery, Ledger, OracleError, SignalEmitter,
    SignalLink,
};
use rollcall_hw::{CameraError, Frame, FrameSampler, FrameSource};
use rollcall_store::{Store, StoreError};
use serde::Serialize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("recognition already running")]
    AlreadyRunning,
    #[error("recognition is not running")]
    NotRunning,
    #[error("no identities registered")]
    EmptyGallery,
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(#[source] CameraError),
    #[error("matching oracle unavailable: {0}")]
    OracleUnavailable(#[source] OracleError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("roll number {0} already exists")]
    DuplicateRoll(String),
    #[error("only {captured} usable samples captured, need {required}")]
    InsufficientSamples { captured: usize, required: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to spawn session worker: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Stopping,
    Enrolling,
}

/// Why the last session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Stopped,
    SourceExhausted,
    Failed,
}

/// The hardware a session opens. One fresh set per session.
pub trait SessionDevices: Send + Sync + 'static {
    fn open_source(&self) -> Result<Box<dyn FrameSource + Send>, CameraError>;
    fn open_oracle(&self) -> Result<Box<dyn FaceOracle + Send>, OracleError>;
    /// Best effort; `None` runs the session without an indicator.
    fn open_link(&self) -> Option<Box<dyn SignalLink + Send>>;
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tolerance: f32,
    pub cooldown_secs: i64,
    pub frame_stride: u64,
    pub scale_factor: f32,
    pub match_interval: Duration,
    pub loop_sleep: Duration,
    pub stop_grace: Duration,
    pub enroll_samples: usize,
    pub enroll_min_samples: usize,
    pub enroll_interval: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            tolerance: config.tolerance,
            cooldown_secs: config.cooldown_secs,
            frame_stride: config.frame_stride,
            scale_factor: config.scale_factor,
            match_interval: config.match_interval,
            loop_sleep: config.loop_sleep,
            stop_grace: config.stop_grace,
            enroll_samples: config.enroll_samples,
            enroll_min_samples: config.enroll_min_samples,
            enroll_interval: Duration::from_millis(500),
        }
    }
}

/// Point-in-time view of the session for status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub running: bool,
    pub started_at: Option<NaiveDateTime>,
    pub last_exit: Option<ExitReason>,
    pub signal_link_connected: bool,
}

struct SessionState {
    phase: Phase,
    started_at: Option<NaiveDateTime>,
    last_exit: Option<ExitReason>,
    link_connected: bool,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<SessionState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn phase(&self) -> Phase {
        self.lock().phase
    }
}

pub struct SessionController<D> {
    devices: Arc<D>,
    store: Store,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    shared: Arc<Shared>,
}

impl<D: SessionDevices> SessionController<D> {
    pub fn new(devices: D, store: Store, clock: Arc<dyn Clock>, settings: SessionSettings) -> Self {
        Self {
            devices: Arc::new(devices),
            store,
            clock,
            settings,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    phase: Phase::Idle,
                    started_at: None,
                    last_exit: None,
                    link_connected: false,
                    worker: None,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.lock();
        SessionSnapshot {
            phase: state.phase,
            running: state.phase == Phase::Running,
            started_at: state.started_at,
            last_exit: state.last_exit,
            signal_link_connected: state.link_connected,
        }
    }

    /// Load the gallery, open the frame source and oracle, then hand them to
    /// a new worker thread. The state lock is held until the phase is
    /// Running, so concurrent starts serialise and the loser sees `AlreadyRunning`.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut state = self.shared.lock();
        if state.phase != Phase::Idle {
            return Err(SessionError::AlreadyRunning);
        }
        if let Some(previous) = state.worker.take() {
            // Already past its exit guard; joining cannot block on us.
            let _ = previous.join();
        }

        let gallery = Gallery::from_identities(self.store.load_identities()?);
        if gallery.is_empty() {
            return Err(SessionError::EmptyGallery);
        }
        let source = self
            .devices
            .open_source()
            .map_err(SessionError::SourceUnavailable)?;
        let oracle = self
            .devices
            .open_oracle()
            .map_err(SessionError::OracleUnavailable)?;

        let identities = gallery.len();
        let worker = Worker {
            sampler: FrameSampler::new(source, self.settings.frame_stride, self.settings.scale_factor),
            oracle,
            evaluator: Evaluator::new(self.settings.tolerance),
            gallery,
            ledger: Ledger::new(self.store.clone(), self.settings.cooldown_secs),
            emitter: SignalEmitter::default(),
            devices: Arc::clone(&self.devices),
            clock: Arc::clone(&self.clock),
            match_interval: self.settings.match_interval,
            loop_sleep: self.settings.loop_sleep,
            exit: ExitGuard {
                shared: Arc::clone(&self.shared),
                reason: ExitReason::Failed,
            },
        };

        state.phase = Phase::Running;
        state.started_at = Some(self.clock.now());
        state.last_exit = None;
        // A failed spawn drops the worker, whose exit guard takes this lock.
        drop(state);

        let handle = std::thread::Builder::new()
            .name("rollcall-session".into())
            .spawn(move || worker.run())
            .map_err(SessionError::Spawn)?;
        self.shared.lock().worker = Some(handle);
        tracing::info!(identities, "recognition session started");
        Ok(())
    }

    /// Ask the worker to stop, then wait up to the grace period for it to
    /// release its resources.
    pub fn stop(&self) -> Result<(), SessionError> {
        let mut state = self.shared.lock();
        match state.phase {
            Phase::Idle | Phase::Enrolling => return Err(SessionError::NotRunning),
            Phase::Running => {
                state.phase = Phase::Stopping;
                self.shared.changed.notify_all();
                tracing::info!("recognition stop requested");
            }
            Phase::Stopping => {}
        }

        let deadline = Instant::now() + self.settings.stop_grace;
        while state.phase != Phase::Idle {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(
                    grace_secs = self.settings.stop_grace.as_secs_f32(),
                    "session worker still running after grace period"
                );
                return Ok(());
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }

        let worker = state.worker.take();
        drop(state);
        if let Some(handle) = worker {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Block until the phase is Idle or `timeout` elapses. Returns whether Idle was reached.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while state.phase != Phase::Idle {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        true
    }

    /// Capture encodings for a new identity and register it.
    ///
    /// Frames count as samples only when the oracle reports exactly one
    /// face. The stored encoding is the mean of the accepted samples.
    pub fn enroll(&self, name: &str, roll: &str) -> Result<i64, SessionError> {
        let (name, roll) = (name.trim(), roll.trim());
        if name.is_empty() || roll.is_empty() {
            return Err(SessionError::InvalidArgument(
                "name and roll number must not be empty".into(),
            ));
        }

        {
            let mut state = self.shared.lock();
            if state.phase != Phase::Idle {
                return Err(SessionError::AlreadyRunning);
            }
            state.phase = Phase::Enrolling;
        }
        let _guard = EnrollGuard(Arc::clone(&self.shared));

        if self.store.roll_exists(roll)? {
            return Err(SessionError::DuplicateRoll(roll.to_string()));
        }

        let source = self
            .devices
            .open_source()
            .map_err(SessionError::SourceUnavailable)?;
        let mut oracle = self
            .devices
            .open_oracle()
            .map_err(SessionError::OracleUnavailable)?;
        let mut sampler = FrameSampler::new(source, 1, self.settings.scale_factor);

        let target = self.settings.enroll_samples.max(1);
        let required = self.settings.enroll_min_samples.min(target);
        let mut samples = Vec::with_capacity(target);

        tracing::info!(roll, target, "enrollment started");
        for attempt in 1..=target * 3 {
            if samples.len() >= target {
                break;
            }
            let frame = match sampler.capture_for_matching() {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "enroll: capture failed");
                    continue;
                }
            };
            match oracle.analyze(&frame.data, frame.width, frame.height) {
                Ok(mut faces) if faces.len() == 1 => {
                    samples.push(faces.remove(0).encoding);
                    tracing::debug!(captured = samples.len(), target, "enroll: sample accepted");
                    if !self.settings.enroll_interval.is_zero() {
                        std::thread::sleep(self.settings.enroll_interval);
                    }
                }
                Ok(faces) => {
                    tracing::debug!(attempt, faces = faces.len(), "enroll: need exactly one face");
                }
                Err(err) => tracing::warn!(attempt, error = %err, "enroll: oracle failed"),
            }
        }

        if samples.len() < required {
            return Err(SessionError::InsufficientSamples {
                captured: samples.len(),
                required,
            });
        }
        let encoding = Encoding::mean(&samples).ok_or_else(|| {
            SessionError::OracleUnavailable(OracleError::Protocol(
                "inconsistent encoding dimensions across samples".into(),
            ))
        })?;

        let id = self
            .store
            .add_identity(name, roll, &encoding, self.clock.now())
            .map_err(|e| match e {
                StoreError::DuplicateRoll(roll) => SessionError::DuplicateRoll(roll),
                other => SessionError::Storage(other),
            })?;
        tracing::info!(id, roll, samples = samples.len(), "enrollment complete");
        Ok(id)
    }
}

/// Restores `Idle` when an enrollment finishes, however it finishes.
struct EnrollGuard(Arc<Shared>);

impl Drop for EnrollGuard {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        if state.phase == Phase::Enrolling {
            state.phase = Phase::Idle;
        }
        self.0.changed.notify_all();
    }
}

/// Publishes the session's end. Lives in the last field of [`Worker`] so the
/// frame source, oracle and link are dropped before `Idle` becomes visible.
struct ExitGuard {
    shared: Arc<Shared>,
    reason: ExitReason,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.reason = ExitReason::Failed;
        }
        let mut state = self.shared.lock();
        state.phase = Phase::Idle;
        state.started_at = None;
        state.last_exit = Some(self.reason);
        state.link_connected = false;
        self.shared.changed.notify_all();
        match self.reason {
            ExitReason::Stopped => tracing::info!("recognition session stopped"),
            ExitReason::SourceExhausted => {
                tracing::warn!("recognition session ended: frame source exhausted")
            }
            ExitReason::Failed => tracing::error!("recognition session worker failed"),
        }
    }
}

struct Worker<D> {
    sampler: FrameSampler<Box<dyn FrameSource + Send>>,
    oracle: Box<dyn FaceOracle + Send>,
    evaluator: Evaluator,
    gallery: Gallery,
    ledger: Ledger<Store>,
    emitter: SignalEmitter,
    devices: Arc<D>,
    clock: Arc<dyn Clock>,
    match_interval: Duration,
    loop_sleep: Duration,
    exit: ExitGuard,
}

impl<D: SessionDevices> Worker<D> {
    fn run(mut self) {
        self.emitter = SignalEmitter::new(self.devices.open_link());
        self.exit.shared.lock().link_connected = self.emitter.is_connected();

        let mut last_match: Option<Instant> = None;
        loop {
            if self.exit.shared.phase() != Phase::Running {
                self.exit.reason = ExitReason::Stopped;
                break;
            }

            let Some(sampled) = self.sampler.next() else {
                self.exit.reason = ExitReason::SourceExhausted;
                break;
            };

            if let Some(frame) = sampled.matching {
                let due = last_match.map_or(true, |at| at.elapsed() >= self.match_interval);
                if due {
                    self.process(&frame);
                    last_match = Some(Instant::now());
                }
            }

            if !self.loop_sleep.is_zero() {
                std::thread::sleep(self.loop_sleep);
            }
        }
    }

    /// One match cycle: evaluate → ledger → signal, for every face in the frame.
    fn process(&mut self, frame: &Frame) {
        let resolutions = match self.evaluator.evaluate(
            self.oracle.as_mut(),
            &frame.data,
            frame.width,
            frame.height,
            &self.gallery,
        ) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, "match evaluation failed; skipping frame");
                return;
            }
        };

        for resolution in resolutions {
            let marked = match resolution.identity_id {
                Some(identity_id) => {
                    let now = self.clock.now();
                    let outcome = self.ledger.resolve(identity_id, now);
                    if outcome.marked() {
                        tracing::info!(
                            identity_id,
                            label = %resolution.label,
                            at = %now,
                            "attendance marked"
                        );
                    } else {
                        tracing::debug!(identity_id, ?outcome, "attendance not marked");
                    }
                    outcome.marked()
                }
                None => false,
            };
            tracing::debug!(
                label = %resolution.label,
                distance = ?resolution.distance,
                bbox = ?resolution.bbox.rescale(self.sampler.scale()),
                "face resolved"
            );
            self.emitter.on_outcome(resolution.identity_id, marked);
        }
    }
}
