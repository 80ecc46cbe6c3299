//! Test doubles for the manager tests: a scripted transport and a
//! manually-fired timer.

use crate::errors::{TimerError, TransportError};
use crate::timer::{ArmedTimer, FetchTimer, TimerTask};
use crate::transport::{FetchResponse, HttpFetch};
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Maps URLs to queued responses and records every GET. The last queued
/// response for a URL repeats, so a URL can be scripted once and fetched in
/// several cycles.
#[derive(Default)]
pub struct ScriptedFetch {
    responses: Mutex<HashMap<String, VecDeque<(StatusCode, Bytes)>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetch {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedFetch::default())
    }

    pub fn enqueue(&self, url: &str, status: StatusCode, body: impl Into<Bytes>) {
        self.responses
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back((status, body.into()));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetch {
    async fn get(&self, url: &str) -> Result<FetchResponse, TransportError> {
        self.requests.lock().push(url.to_string());

        let mut responses = self.responses.lock();
        let queue = responses
            .get_mut(url)
            .ok_or_else(|| TransportError::new(format!("no scripted response for {url}")))?;

        let (status, body) = if queue.len() > 1 {
            queue.pop_front().expect("queue checked non-empty")
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| TransportError::new(format!("scripted responses exhausted for {url}")))?
        };

        Ok(FetchResponse { status, body })
    }
}

/// Timer whose tasks only run when the test calls [`ManualTimer::fire`].
/// Mirrors what the production timer does, minus the clock.
#[derive(Default)]
pub struct ManualTimer {
    inner: Arc<ManualTimerInner>,
}

#[derive(Default)]
struct ManualTimerInner {
    next_id: Mutex<u64>,
    tasks: Mutex<HashMap<u64, TimerTask>>,
    delays: Mutex<Vec<Duration>>,
}

impl ManualTimer {
    pub fn new() -> Arc<Self> {
        Arc::new(ManualTimer::default())
    }

    /// Total number of timers ever scheduled.
    pub fn timer_count(&self) -> usize {
        self.inner.delays.lock().len()
    }

    /// Number of timers currently armed (scheduled but neither fired nor
    /// cancelled).
    pub fn armed_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.inner.delays.lock().last().copied()
    }

    /// Runs the oldest armed task to completion.
    pub async fn fire(&self) {
        let task = {
            let mut tasks = self.inner.tasks.lock();
            let id = *tasks.keys().min().expect("no timer armed");
            tasks.remove(&id).expect("task present for id")
        };
        task.await;
    }
}

impl FetchTimer for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<ArmedTimer, TimerError> {
        let id = {
            let mut next_id = self.inner.next_id.lock();
            *next_id += 1;
            *next_id
        };
        self.inner.tasks.lock().insert(id, task);
        self.inner.delays.lock().push(delay);

        let inner = self.inner.clone();
        Ok(ArmedTimer::new(move || {
            inner.tasks.lock().remove(&id);
        }))
    }
}

/// Timer primitive that always fails to arm.
pub struct FailingTimer;

impl FetchTimer for FailingTimer {
    fn schedule(&self, _delay: Duration, _task: TimerTask) -> Result<ArmedTimer, TimerError> {
        Err(TimerError::new("timer primitive unavailable"))
    }
}
