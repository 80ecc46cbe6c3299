//! Fetch-scheduling state machine.
//!
//! Coalesces latest-rollout-id signals into at most one armed timer per
//! throttle window. The fire delay is drawn uniformly from `[0, window)`
//! so that a fleet of proxies reacting to the same rollout does not hit
//! the control plane at the same instant.

use rand::Rng;
use rand::rngs::SmallRng;
use std::time::{Duration, SystemTime};

/// What the caller should do with a latest-rollout-id signal.
#[derive(Debug, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// The signal matches the installed rollout and nothing is in flight.
    Ignore,
    /// The pending id was recorded; an already-armed timer (or the current
    /// throttle window) will pick it up.
    Coalesced,
    /// Arm a one-shot timer with this jittered delay.
    Arm(Duration),
}

pub struct FetchScheduler {
    window: Duration,
    current_rollout_id: String,
    pending_rollout_id: String,
    next_window_start: SystemTime,
    timer_armed: bool,
    rng: SmallRng,
}

impl FetchScheduler {
    pub fn new(window: Duration, rng: SmallRng) -> Self {
        FetchScheduler {
            window,
            current_rollout_id: String::new(),
            pending_rollout_id: String::new(),
            next_window_start: SystemTime::UNIX_EPOCH,
            timer_armed: false,
            rng,
        }
    }

    /// The rollout id most recently installed (empty before first success).
    pub fn current_rollout_id(&self) -> &str {
        &self.current_rollout_id
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// Seeds the installed rollout id at startup, before the first signal.
    pub fn set_current_rollout_id(&mut self, rollout_id: impl Into<String>) {
        self.current_rollout_id = rollout_id.into();
    }

    /// Records a latest-rollout-id observation made at wall-clock `now`.
    ///
    /// Invariant: at most one timer is armed at any time. A signal that
    /// arrives while a timer is armed only updates the pending id; the
    /// armed fetch reads it at fire time, so the latest signal always wins.
    /// A signal inside the current throttle window (and with no armed
    /// timer) is deferred until a signal arrives in the next window.
    pub fn observe_latest(&mut self, rollout_id: &str, now: SystemTime) -> ScheduleDecision {
        if rollout_id == self.current_rollout_id && !self.timer_armed {
            return ScheduleDecision::Ignore;
        }

        self.pending_rollout_id = rollout_id.to_string();

        if self.timer_armed || now < self.next_window_start {
            return ScheduleDecision::Coalesced;
        }

        let delay = self.jitter();
        self.timer_armed = true;
        self.next_window_start = now + self.window;
        ScheduleDecision::Arm(delay)
    }

    /// Marks the armed timer as fired and hands back the pending id.
    pub fn timer_fired(&mut self) -> String {
        self.timer_armed = false;
        self.pending_rollout_id.clone()
    }

    /// Reverts arming when the timer primitive failed to start. The window
    /// reservation is released too, so the next signal retries immediately
    /// instead of silently coalescing into a timer that was never armed.
    pub fn disarm(&mut self) {
        self.timer_armed = false;
        self.next_window_start = SystemTime::UNIX_EPOCH;
    }

    /// Records a successful install of `rollout_id`.
    pub fn record_install(&mut self, rollout_id: impl Into<String>) {
        self.current_rollout_id = rollout_id.into();
    }

    fn jitter(&mut self) -> Duration {
        let window_ms = self.window.as_millis() as u64;
        if window_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(0..window_ms))
    }
}
