//! Readiness polling for remote objects in transient provisioning states.
//!
//! Many create calls return before the remote object is usable: a dataset is
//! still ingesting, an application is still building, a deployment is still
//! launching. [`Poller::wait_until_ready`] drives a caller-supplied [`Probe`]
//! under exponential backoff until the probe reports [`Readiness::Ready`], a
//! terminal [`Readiness::Failed`], or the time budget runs out.
//!
//! Only [`Readiness::Pending`] is retried. A failure, whether a remote
//! pipeline error or a transport error such as `Unauthorized`, ends the poll
//! on the spot.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::TransportError;

/// Poll budget used when none (or a non-positive one) is configured.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 30;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Backoff schedule and time budget for a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay after the first pending observation.
    pub initial_interval: Duration,
    /// Upper bound for any single delay.
    pub max_interval: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
    /// Total time budget; a sleep that would end past it is not started.
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            multiplier: 2,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_MINUTES * 60),
        }
    }
}

impl PollerConfig {
    /// Default schedule with a budget of `minutes`.
    ///
    /// Zero or negative values fall back to [`DEFAULT_TIMEOUT_MINUTES`].
    pub fn from_timeout_minutes(minutes: i64) -> Self {
        match u64::try_from(minutes) {
            Ok(m) if m > 0 => Self::default().with_timeout(Duration::from_secs(m.saturating_mul(60))),
            _ => Self::default(),
        }
    }

    /// Replaces the time budget. A zero budget keeps the current one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Replaces the initial and maximum intervals.
    pub fn with_intervals(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max.max(initial);
        self
    }

    /// Delay to sleep after the `attempt`-th pending observation (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }
}

// ---------------------------------------------------------------------------
// Probe port
// ---------------------------------------------------------------------------

/// Classification of one probe attempt.
#[derive(Debug)]
pub enum Readiness<T> {
    /// The object is usable; carries the observation that showed it.
    Ready(T),
    /// Still provisioning; carries the remote status for diagnostics.
    Pending(String),
    /// The object will never become ready; polling stops.
    Failed(ProbeFailure),
}

/// Why a probe gave up.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    /// Fetching the object failed (not found, unauthorized, unexpected status).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote object reached a terminal error state.
    #[error("{0}")]
    Remote(String),
}

/// Fetches a remote object and classifies its readiness.
///
/// Implementations are usually bound to a transport client and an object ID.
#[async_trait]
pub trait Probe: Send + Sync {
    /// What a successful probe returns.
    type Observation: Send;

    /// Human-readable name of the object being waited on, for errors and logs.
    fn target(&self) -> String;

    /// Performs one attempt.
    async fn probe(&self) -> Readiness<Self::Observation>;

    /// Produces the observation handed back to the caller once ready.
    ///
    /// Probes that only inspect a status field override this to fetch the
    /// full object. The default returns the ready observation unchanged.
    async fn refresh(&self, ready: Self::Observation) -> Result<Self::Observation, TransportError> {
        Ok(ready)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why [`Poller::wait_until_ready`] did not produce an observation.
#[derive(Debug, Error)]
pub enum PollError {
    /// The probe reported a terminal failure.
    #[error("{target} did not become ready after {attempts} attempt(s): {source}")]
    Failed {
        target: String,
        attempts: u32,
        #[source]
        source: ProbeFailure,
    },

    /// The time budget ran out while the object was still pending.
    #[error("timed out after {elapsed:?} waiting for {target} ({attempts} attempt(s), last status: {last_status})")]
    TimedOut {
        target: String,
        attempts: u32,
        elapsed: Duration,
        last_status: String,
    },

    /// The cancellation token fired.
    #[error("cancelled while waiting for {target} after {attempts} attempt(s)")]
    Cancelled { target: String, attempts: u32 },

    /// The object became ready but the final fetch failed.
    #[error("failed to fetch {target} after it became ready")]
    Refresh {
        target: String,
        #[source]
        source: TransportError,
    },
}

impl PollError {
    /// The transport error behind this failure, if there is one.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Failed {
                source: ProbeFailure::Transport(err),
                ..
            }
            | Self::Refresh { source: err, .. } => Some(err),
            Self::Failed { .. } | Self::TimedOut { .. } | Self::Cancelled { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Per-call bookkeeping; discarded when the call returns.
struct PollState {
    attempts: u32,
    started: Instant,
    last_status: Option<String>,
}

impl PollState {
    fn start() -> Self {
        Self {
            attempts: 0,
            started: Instant::now(),
            last_status: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Waits for remote objects to become ready.
///
/// Holds only immutable configuration; one instance can serve any number of
/// concurrent waits.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollerConfig,
}

impl Poller {
    /// Creates a poller with the given schedule.
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    /// The schedule this poller uses.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Probes until ready, failed, timed out, or cancelled.
    ///
    /// On success [`Probe::refresh`] is called exactly once and its result is
    /// returned. The calling task sleeps between attempts; no background work
    /// is spawned.
    #[instrument(skip_all, fields(object = %probe.target()))]
    pub async fn wait_until_ready<P>(
        &self,
        probe: &P,
        cancel: &CancellationToken,
    ) -> Result<P::Observation, PollError>
    where
        P: Probe + ?Sized,
    {
        let mut state = PollState::start();

        let ready = loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(probe, &state)),
                outcome = probe.probe() => outcome,
            };
            state.attempts += 1;

            match outcome {
                Readiness::Ready(observation) => break observation,
                Readiness::Failed(source) => {
                    warn!(attempt = state.attempts, error = %source, "probe reported terminal failure");
                    return Err(PollError::Failed {
                        target: probe.target(),
                        attempts: state.attempts,
                        source,
                    });
                }
                Readiness::Pending(status) => state.last_status = Some(status),
            }

            let delay = self.config.delay_for(state.attempts);
            let elapsed = state.elapsed();
            if elapsed.saturating_add(delay) > self.config.timeout {
                return Err(PollError::TimedOut {
                    target: probe.target(),
                    attempts: state.attempts,
                    elapsed,
                    last_status: state.last_status.take().unwrap_or_default(),
                });
            }

            debug!(
                attempt = state.attempts,
                status = state.last_status.as_deref().unwrap_or_default(),
                delay_ms = delay.as_millis() as u64,
                "object not ready; backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(probe, &state)),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        debug!(attempts = state.attempts, elapsed_ms = state.elapsed().as_millis() as u64, "object ready");
        let refreshed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(probe, &state)),
            refreshed = probe.refresh(ready) => refreshed,
        };
        refreshed.map_err(|source| PollError::Refresh {
            target: probe.target(),
            source,
        })
    }
}

fn cancelled<P: Probe + ?Sized>(probe: &P, state: &PollState) -> PollError {
    PollError::Cancelled {
        target: probe.target(),
        attempts: state.attempts,
    }
}
