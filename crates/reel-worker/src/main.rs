//! Worker binary: runs one ingress request and prints the response.
//!
//! Usage: `reel-worker <request.json>`

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use reel_worker::{
    init_tracing, IngressHandler, IngressRequest, JobExecutor, JobLifecycle, PipelineExecutor,
    RetentionSweep, Services, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    dotenvy::dotenv().ok();
    init_tracing();

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("METRICS_ADDR must be host:port")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install metrics exporter")?;
        info!(%addr, "Metrics exporter listening");
    }

    let request_path = std::env::args()
        .nth(1)
        .context("usage: reel-worker <request.json>")?;
    let raw = tokio::fs::read_to_string(&request_path)
        .await
        .with_context(|| format!("reading {request_path}"))?;
    let request: IngressRequest = serde_json::from_str(&raw).context("parsing ingress request")?;

    let config = WorkerConfig::from_env()?;
    info!("Starting reel-worker with config: {:?}", config);
    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("creating work dir {}", config.work_dir.display()))?;

    let services = Services::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sweep = RetentionSweep::new(
        config.work_dir.clone(),
        config.retention_max_age,
        Arc::clone(&services.locks),
    );
    let sweep_handle = tokio::spawn(sweep.run(config.sweep_interval, shutdown_rx.clone()));

    let lifecycle = Arc::new(JobLifecycle::new(
        Arc::clone(&services.jobs),
        Arc::clone(&services.quota),
    ));
    let shutdown_timeout = config.shutdown_timeout;
    let pipeline = Arc::new(PipelineExecutor::new(services, config));
    let executor = Arc::new(JobExecutor::new(pipeline, lifecycle, shutdown_rx));
    let handler = IngressHandler::new(executor);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = signal_tx.send(true);
        }
    });

    let result = handler.handle(request).await;

    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(shutdown_timeout, sweep_handle).await.is_err() {
        warn!("Retention sweep did not stop within the shutdown timeout");
    }

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            info!("Worker finished");
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e)?);
            error!(code = %e.code, "Request failed");
            std::process::exit(i32::from(e.status / 100));
        }
    }
}
