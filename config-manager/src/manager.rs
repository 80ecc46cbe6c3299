//! Rollout-tracking configuration manager.
//!
//! Keeps the proxy's in-memory service-configuration set synchronized with
//! the Service Management control plane. An external watcher reports the
//! latest rollout id; when it diverges from the installed one, a jittered
//! one-shot timer is armed (at most one per throttle window) and, on fire,
//! the active rollout and every service config it references are
//! downloaded. The complete weighted set is handed to the install callback
//! only when every download succeeded; a failed cycle installs nothing and
//! the next window gets a fresh attempt.

use crate::context::GlobalContext;
use crate::errors::{FetchCycleError, TimerError};
use crate::fetcher::ServiceManagement;
use crate::metrics_defs::{ROLLOUT_FETCH_DURATION, ROLLOUT_INSTALLS};
use crate::scheduler::{FetchScheduler, ScheduleDecision};
use crate::timer::{ArmedTimer, FetchTimer};
use crate::transport::HttpFetch;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use std::sync::{Arc, Weak};
use std::time::{Instant, SystemTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One weighted service configuration. The document is opaque bytes; the
/// manager does not interpret it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafficEntry {
    pub config: Bytes,
    pub percent: u32,
}

/// A complete weighted configuration set. Immutable once published; the
/// host swaps it in behind an owned reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafficAssignment {
    pub rollout_id: String,
    pub entries: Vec<TrafficEntry>,
}

/// The single sink through which assembled traffic assignments reach the
/// host proxy. Invoked at most once per successful fetch cycle and never
/// with a partial set.
pub type InstallCallback = Arc<dyn Fn(TrafficAssignment) + Send + Sync>;

pub struct ConfigManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    service_management: ServiceManagement,
    timers: Arc<dyn FetchTimer>,
    install: InstallCallback,
    // Serializes fetch cycles so installs stay totally ordered.
    cycle_lock: Semaphore,
    state: Mutex<ManagerState>,
}

struct ManagerState {
    scheduler: FetchScheduler,
    timer: Option<ArmedTimer>,
}

impl ConfigManager {
    pub fn new(
        context: GlobalContext,
        transport: Arc<dyn HttpFetch>,
        timers: Arc<dyn FetchTimer>,
        rng: SmallRng,
        install: InstallCallback,
    ) -> Self {
        let scheduler = FetchScheduler::new(context.fetch_throttle_window(), rng);
        let service_management = ServiceManagement::new(
            transport,
            context.service_management().base_url.clone(),
            context.service_name(),
        );
        ConfigManager {
            inner: Arc::new(ManagerInner {
                service_management,
                timers,
                install,
                cycle_lock: Semaphore::new(1),
                state: Mutex::new(ManagerState {
                    scheduler,
                    timer: None,
                }),
            }),
        }
    }

    /// Seeds the installed rollout id at startup so that the first matching
    /// signal becomes a no-op. Must not be called after the first
    /// `set_latest_rollout_id`.
    pub fn set_current_rollout_id(&self, rollout_id: &str) {
        self.inner
            .state
            .lock()
            .scheduler
            .set_current_rollout_id(rollout_id);
    }

    /// The rollout id most recently installed (empty before first success).
    pub fn current_rollout_id(&self) -> String {
        self.inner
            .state
            .lock()
            .scheduler
            .current_rollout_id()
            .to_string()
    }

    /// Reports the latest rollout id observed by an external watcher.
    ///
    /// `now` is caller-supplied so windowing stays deterministic under
    /// test. Signals coalesce: while a timer is armed, or within the
    /// current throttle window, only the pending id is updated and the
    /// already-scheduled fetch picks it up. An error here means the timer
    /// primitive failed, which the host should treat as fatal.
    pub fn set_latest_rollout_id(
        &self,
        rollout_id: &str,
        now: SystemTime,
    ) -> Result<(), TimerError> {
        let mut state = self.inner.state.lock();
        match state.scheduler.observe_latest(rollout_id, now) {
            ScheduleDecision::Ignore | ScheduleDecision::Coalesced => Ok(()),
            ScheduleDecision::Arm(delay) => {
                let weak = Arc::downgrade(&self.inner);
                let task = Box::pin(async move {
                    ManagerInner::on_timer_fired(weak).await;
                });
                match self.inner.timers.schedule(delay, task) {
                    Ok(armed) => {
                        tracing::debug!(
                            rollout_id,
                            delay_ms = delay.as_millis() as u64,
                            "armed rollout fetch timer"
                        );
                        state.timer = Some(armed);
                        Ok(())
                    }
                    Err(error) => {
                        state.scheduler.disarm();
                        Err(error)
                    }
                }
            }
        }
    }

    /// Cancels any armed fetch timer. In-flight continuations hold only
    /// weak references and become no-ops once the manager is gone.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.timer = None;
        state.scheduler.disarm();
    }
}

impl ManagerInner {
    async fn on_timer_fired(weak: Weak<ManagerInner>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        let pending = {
            let mut state = inner.state.lock();
            state.timer = None;
            state.scheduler.timer_fired()
        };

        let start = Instant::now();
        let outcome = inner.run_fetch_cycle().await;
        let status = match &outcome {
            Ok(true) => "installed",
            Ok(false) => "unchanged",
            Err(_) => "failure",
        };
        metrics::histogram!(ROLLOUT_FETCH_DURATION.name, "status" => status)
            .record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(_) => {}
            Err(error) => tracing::warn!(
                pending_rollout_id = %pending,
                error = %error,
                "rollout fetch cycle failed, retrying next window"
            ),
        }
    }

    /// Runs one fetch cycle. Returns whether a new assignment was
    /// installed; `Ok(false)` is the rollout-id-not-changed path.
    async fn run_fetch_cycle(&self) -> Result<bool, FetchCycleError> {
        let _permit = self.cycle_lock.acquire().await?;

        let rollout = self.service_management.fetch_active_rollout().await?;
        {
            let state = self.state.lock();
            if rollout.rollout_id == state.scheduler.current_rollout_id() {
                tracing::debug!(rollout_id = %rollout.rollout_id, "rollout id unchanged");
                return Ok(false);
            }
        }

        let percentages: Vec<(String, u32)> = rollout
            .traffic_percent_strategy
            .percentages
            .into_iter()
            .collect();

        // The install callback is never handed an empty set.
        if percentages.is_empty() {
            return Err(FetchCycleError::NoPercentages {
                rollout_id: rollout.rollout_id,
            });
        }

        let mut downloads = JoinSet::new();
        for (index, (config_id, _)) in percentages.iter().enumerate() {
            let service_management = self.service_management.clone();
            let config_id = config_id.clone();
            downloads.spawn(async move {
                let result = service_management.fetch_service_config(&config_id).await;
                (index, result)
            });
        }

        // All-or-nothing gate: every download must succeed before anything
        // is installed. Drain the whole set so the error reported is the
        // first failure, not a partial picture.
        let mut documents: Vec<Option<Bytes>> = vec![None; percentages.len()];
        let mut first_error: Option<FetchCycleError> = None;
        while let Some(joined) = downloads.join_next().await {
            match joined {
                Ok((index, Ok(document))) => documents[index] = Some(document),
                Ok((_, Err(error))) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(FetchCycleError::TaskFailed(join_error.to_string()));
                    }
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        let mut entries = Vec::with_capacity(percentages.len());
        for ((config_id, percent), document) in percentages.into_iter().zip(documents) {
            let Some(config) = document else {
                return Err(FetchCycleError::TaskFailed(format!(
                    "download of {config_id} did not complete"
                )));
            };
            entries.push(TrafficEntry { config, percent });
        }

        let assignment = TrafficAssignment {
            rollout_id: rollout.rollout_id.clone(),
            entries,
        };

        self.state
            .lock()
            .scheduler
            .record_install(&rollout.rollout_id);

        metrics::counter!(ROLLOUT_INSTALLS.name).increment(1);
        tracing::info!(
            rollout_id = %rollout.rollout_id,
            configs = assignment.entries.len(),
            "installed new traffic assignment"
        );
        (self.install)(assignment);
        Ok(true)
    }
}
