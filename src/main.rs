// src/main.rs
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rabbit_amazon_forwarder::aws::AwsClients;
use rabbit_amazon_forwarder::{Config, HealthReport, Helper, MappingLoader, Registry, Supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    info!("Using mapping file {}", config.mapping_file.display());

    let clients = AwsClients::load(&config.aws_settings()).await;
    let helper: Arc<dyn Helper> = Arc::new(Registry::with_defaults(
        clients,
        config.consumer_settings(),
    ));
    let loader = MappingLoader::new(config.mapping_file.clone(), helper);

    let mapping = loader.load().with_context(|| {
        format!(
            "Could not load mapping from {}",
            config.mapping_file.display()
        )
    })?;
    if mapping.is_empty() {
        bail!(
            "Mapping file {} contains no pairs",
            config.mapping_file.display()
        );
    }

    let mut supervisor = Supervisor::start(mapping, config.supervisor_settings());

    let mut health = tokio::time::interval(config.health_check_interval());
    // The first tick completes immediately; give pairs time to connect.
    health.tick().await;

    let mut reload = ReloadSignal::new().context("Failed to install SIGHUP handler")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutdown requested");
                break;
            }
            _ = health.tick() => {
                log_health(&supervisor.check().await);
            }
            _ = reload.recv() => {
                info!("Reloading mapping from {}", loader.path().display());
                match loader.load() {
                    Ok(mapping) if mapping.is_empty() => {
                        warn!("Reloaded mapping contains no pairs, keeping the running ones");
                    }
                    Ok(mapping) => supervisor.restart(mapping).await,
                    Err(e) => error!("Could not reload mapping, keeping the running pairs: {}", e),
                }
            }
        }
    }

    supervisor.shutdown().await;
    Ok(())
}

fn log_health(report: &HealthReport) {
    let json = serde_json::to_string(report).unwrap_or_else(|e| format!("<unserializable: {}>", e));
    if report.healthy {
        info!(report = %json, "Health check passed");
    } else {
        warn!(report = %json, "Health check failed");
    }
}

/// SIGHUP on unix; never fires elsewhere.
struct ReloadSignal {
    #[cfg(unix)]
    inner: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    #[cfg(unix)]
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            inner: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if self.inner.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
