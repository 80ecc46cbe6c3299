use crate::config::ServiceManagementConfig;
use std::time::Duration;

/// Process-wide identity shared by the manager's collaborators: which
/// service is under management and how the control plane is reached.
///
/// The service name is set once at startup. It may come from the server
/// config or be overridden by instance metadata; that resolution happens in
/// the host wiring before the context is built.
#[derive(Clone, Debug)]
pub struct GlobalContext {
    service_name: String,
    service_management: ServiceManagementConfig,
}

impl GlobalContext {
    pub fn new(
        service_name: impl Into<String>,
        service_management: ServiceManagementConfig,
    ) -> Self {
        GlobalContext {
            service_name: service_name.into(),
            service_management,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_management(&self) -> &ServiceManagementConfig {
        &self.service_management
    }

    pub fn fetch_throttle_window(&self) -> Duration {
        self.service_management.fetch_throttle_window()
    }
}
