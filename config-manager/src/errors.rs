use crate::rollout::RolloutDecodeError;
use http::StatusCode;
use thiserror::Error;

/// Transport-level failure of a single HTTP GET.
#[derive(Error, Debug)]
#[error("transport error: {0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError(message.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        TransportError(error.to_string())
    }
}

/// The timer primitive could not arm a one-shot timer. Fatal: surfaced to
/// the host through `set_latest_rollout_id`.
#[derive(Error, Debug)]
#[error("failed to arm fetch timer: {0}")]
pub struct TimerError(String);

impl TimerError {
    pub fn new(message: impl Into<String>) -> Self {
        TimerError(message.into())
    }
}

/// Why a fetch cycle aborted without installing anything.
///
/// None of these are surfaced to the install callback; a failed cycle is
/// simply absent from it and the next throttle window gets a fresh attempt.
#[derive(Error, Debug)]
pub enum FetchCycleError {
    #[error("request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("rollouts request returned {0}")]
    RolloutStatus(StatusCode),

    #[error(transparent)]
    Decode(#[from] RolloutDecodeError),

    #[error("rollout {rollout_id} has no traffic percentages")]
    NoPercentages { rollout_id: String },

    #[error("service config {config_id} download returned {status}")]
    ConfigStatus {
        config_id: String,
        status: StatusCode,
    },

    #[error("service config download task failed: {0}")]
    TaskFailed(String),

    #[error("fetch cycle lock closed: {0}")]
    CycleLock(#[from] tokio::sync::AcquireError),
}
