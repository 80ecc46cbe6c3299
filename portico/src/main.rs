use clap::{Args, Parser};
use std::path::PathBuf;

mod config;
use config::{Config, MetricsConfig};
use config_manager::metrics_defs::{ALL_METRICS, MetricDef};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use config_manager::config::RolloutStrategy;
use config_manager::timer::TokioTimer;
use config_manager::transport::ReqwestFetch;
use config_manager::{ConfigManager, GlobalContext, InstallCallback, TrafficAssignment};
use metrics_exporter_statsd::StatsdBuilder;
use parking_lot::RwLock;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::process;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
enum CliCommand {
    /// Run the admin listener and the rollout manager
    Serve(ServeArgs),
    /// Show all metrics definitions as markdown table
    ShowMetrics,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("Failed to load config file: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
    #[error("Failed to create runtime: {0}")]
    RuntimeError(#[from] std::io::Error),
}

fn main() {
    init_tracing();

    if let Err(e) = cli() {
        tracing::error!(error = %e, "Startup error");
        std::process::exit(1);
    }
}

fn cli() -> Result<(), CliError> {
    let cmd = CliCommand::parse();

    match &cmd {
        CliCommand::Serve(serve_args) => {
            let config = Config::from_file(&serve_args.config_file_path)?;
            let _sentry_guard = init_sentry(config.logging.clone());
            init_statsd_recorder("portico", config.metrics.clone());

            run_async(run(config))?;
            Ok(())
        }
        CliCommand::ShowMetrics => {
            println!("{}", generate_metrics_table(ALL_METRICS));
            Ok(())
        }
    }
}

fn generate_metrics_table(metrics: &[MetricDef]) -> String {
    let mut lines = vec![
        "| Metric | Type | Description |".to_string(),
        "|--------|------|-------------|".to_string(),
    ];
    for m in metrics {
        lines.push(format!(
            "| `{}` | {} | {} |",
            m.name,
            m.metric_type.as_str(),
            m.description
        ));
    }
    lines.join("\n")
}

async fn run(config: Config) -> Result<(), std::io::Error> {
    let installed: Arc<RwLock<Option<Arc<TrafficAssignment>>>> = Arc::new(RwLock::new(None));

    let manager = match config.rollout_strategy {
        RolloutStrategy::Managed => {
            let sink = installed.clone();
            let install: InstallCallback = Arc::new(move |assignment| {
                tracing::info!(
                    rollout_id = %assignment.rollout_id,
                    configs = assignment.entries.len(),
                    "traffic assignment installed"
                );
                *sink.write() = Some(Arc::new(assignment));
            });

            Some(Arc::new(ConfigManager::new(
                GlobalContext::new(
                    config.service_name.clone(),
                    config.service_management_config.clone(),
                ),
                Arc::new(ReqwestFetch::new()),
                Arc::new(TokioTimer),
                SmallRng::from_entropy(),
                install,
            )))
        }
        RolloutStrategy::Fixed => {
            tracing::info!("rollout_strategy is fixed, rollout tracking disabled");
            None
        }
    };

    let state = AdminState { manager, installed };

    let app = Router::new()
        .route("/health", get(health))
        .route("/rollout", get(rollout_status).post(report_rollout))
        .with_state(state);

    let addr = format!("{}:{}", config.admin_listener.host, config.admin_listener.port);
    tracing::info!(addr = %addr, service_name = %config.service_name, "starting admin listener");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

#[derive(Clone)]
struct AdminState {
    manager: Option<Arc<ConfigManager>>,
    installed: Arc<RwLock<Option<Arc<TrafficAssignment>>>>,
}

async fn health() -> &'static str {
    "ok\n"
}

#[derive(Serialize)]
struct RolloutStatusResponse {
    rollout_id: Option<String>,
    percentages: Vec<u32>,
}

async fn rollout_status(State(state): State<AdminState>) -> Json<RolloutStatusResponse> {
    let installed = state.installed.read().clone();
    Json(match installed {
        Some(assignment) => RolloutStatusResponse {
            rollout_id: Some(assignment.rollout_id.clone()),
            percentages: assignment.entries.iter().map(|e| e.percent).collect(),
        },
        None => RolloutStatusResponse {
            rollout_id: None,
            percentages: Vec::new(),
        },
    })
}

#[derive(Deserialize)]
struct ReportRolloutRequest {
    rollout_id: String,
}

/// The external watcher posts the latest rollout id here; the manager
/// decides whether a fetch cycle is warranted.
async fn report_rollout(
    State(state): State<AdminState>,
    Json(body): Json<ReportRolloutRequest>,
) -> StatusCode {
    let Some(manager) = &state.manager else {
        return StatusCode::NOT_IMPLEMENTED;
    };

    match manager.set_latest_rollout_id(&body.rollout_id, SystemTime::now()) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::error!(error = %e, "could not arm rollout fetch timer");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn init_statsd_recorder(prefix: &str, metrics_config: Option<MetricsConfig>) {
    if let Some(MetricsConfig {
        statsd_host,
        statsd_port,
    }) = metrics_config
    {
        let recorder = StatsdBuilder::from(statsd_host, statsd_port)
            .build(Some(prefix))
            .expect("Could not create StatsdRecorder");

        metrics::set_global_recorder(recorder).expect("Could not set global metrics recorder")
    }
}

fn run_async(
    fut: impl Future<Output = Result<(), impl std::error::Error>>,
) -> Result<(), CliError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    if let Err(e) = rt.block_on(fut) {
        tracing::error!(error = %e, "Runtime error");
        process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(sentry::integrations::tracing::layer())
        .init();
}

fn init_sentry(logging_config: Option<config::LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    logging_config.map(|cfg| {
        sentry::init((
            cfg.sentry_dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_table_lists_every_metric() {
        let table = generate_metrics_table(ALL_METRICS);
        for m in ALL_METRICS {
            assert!(table.contains(m.name), "table is missing `{}`", m.name);
            assert!(table.contains(m.description));
        }
    }
}
