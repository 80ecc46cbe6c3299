use crate::errors::TimerError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::oneshot;

/// Work to run when a one-shot timer fires.
pub type TimerTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One-shot timer primitive.
///
/// The manager arms at most one timer at a time; the returned guard cancels
/// the pending fire when dropped, which is how shutdown discards scheduled
/// work. Cancellation only affects a timer that is still waiting: once the
/// timer has fired, the continuation runs to completion even if the guard
/// is dropped while it is running.
pub trait FetchTimer: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<ArmedTimer, TimerError>;
}

/// Guard for an armed timer. Dropping it cancels the fire if it has not
/// happened yet; dropping it after the fire is a no-op.
pub struct ArmedTimer {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ArmedTimer {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        ArmedTimer {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for ArmedTimer {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Timer backed by the tokio runtime: a spawned task waits out the delay,
/// then runs the continuation. The cancel signal races only the sleep, so
/// a continuation that has started is never torn down by its own guard.
pub struct TokioTimer;

impl FetchTimer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<ArmedTimer, TimerError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| TimerError::new(e.to_string()))?;
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => task.await,
                _ = cancel_rx => {}
            }
        });
        Ok(ArmedTimer::new(move || {
            let _ = cancel_tx.send(());
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = TokioTimer
            .schedule(
                Duration::from_millis(5),
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.load(Ordering::SeqCst));
        drop(timer);
    }

    #[tokio::test]
    async fn dropping_the_guard_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = TokioTimer
            .schedule(
                Duration::from_millis(5),
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        drop(timer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn guard_drop_mid_continuation_does_not_tear_it_down() {
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = done.clone();

        let timer = TokioTimer
            .schedule(
                Duration::ZERO,
                Box::pin(async move {
                    let _ = started_tx.send(());
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    done_flag.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        // Wait until the continuation is running, then drop the guard the
        // way the manager does when it clears its armed-timer slot.
        started_rx.await.expect("continuation never started");
        drop(timer);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(done.load(Ordering::SeqCst));
    }
}
