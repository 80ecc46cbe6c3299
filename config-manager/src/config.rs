use serde::Deserialize;
use std::time::Duration;

/// Default minimum interval between the start of consecutive fetch cycles.
pub const DEFAULT_FETCH_THROTTLE_WINDOW_S: u64 = 300;

/// Production Service Management endpoint.
pub const SERVICE_MANAGEMENT_BASE_URL: &str = "https://servicemanagement.googleapis.com";

/// `service_management_config` section of the server config.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ServiceManagementConfig {
    /// Throttle window in seconds. At most one rollout fetch cycle is
    /// started per window.
    #[serde(default = "default_fetch_throttle_window_s")]
    pub fetch_throttle_window_s: u64,

    /// Base URL of the Service Management API. Overridden in tests.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl ServiceManagementConfig {
    pub fn fetch_throttle_window(&self) -> Duration {
        Duration::from_secs(self.fetch_throttle_window_s)
    }
}

impl Default for ServiceManagementConfig {
    fn default() -> Self {
        ServiceManagementConfig {
            fetch_throttle_window_s: default_fetch_throttle_window_s(),
            base_url: default_base_url(),
        }
    }
}

fn default_fetch_throttle_window_s() -> u64 {
    DEFAULT_FETCH_THROTTLE_WINDOW_S
}

fn default_base_url() -> String {
    SERVICE_MANAGEMENT_BASE_URL.to_string()
}

/// How the proxy obtains its service configurations.
///
/// Only `managed` enables the rollout-tracking manager; with `fixed` the
/// proxy keeps whatever configuration it was started with.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    Managed,
    #[default]
    Fixed,
}
