//! Metrics definitions for the config manager.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const ROLLOUT_FETCH_DURATION: MetricDef = MetricDef {
    name: "rollout.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete one rollout fetch cycle in seconds",
};

pub const ROLLOUT_INSTALLS: MetricDef = MetricDef {
    name: "rollout.installs",
    metric_type: MetricType::Counter,
    description: "Number of traffic assignments delivered to the install callback",
};

pub const SERVICE_CONFIG_DOWNLOADS: MetricDef = MetricDef {
    name: "service_config.downloads",
    metric_type: MetricType::Counter,
    description: "Number of service config download attempts, tagged by status",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ROLLOUT_FETCH_DURATION,
    ROLLOUT_INSTALLS,
    SERVICE_CONFIG_DOWNLOADS,
];
