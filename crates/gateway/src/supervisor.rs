//! Gateway supervisor (§4.9): owns process lifecycle — load config, connect
//! the shared-state adapter, bind the listener, spawn the accept loop and
//! maintenance tasks, and drive graceful shutdown.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Json},
    routing::get,
};
use mudvault_config::{MudvaultConfig, StoreConfig};
use mudvault_store::SharedStore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    error::{GatewayError, Result},
    state::GatewayState,
    ws,
};

/// How often the maintenance task sweeps idle rate-limit counters (§4.9).
const RATELIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Rate-limit buckets untouched for this long are evicted on sweep.
const RATELIMIT_SWEEP_IDLE: Duration = Duration::from_secs(900);

pub struct GatewaySupervisor {
    config: MudvaultConfig,
    state: Arc<GatewayState>,
    #[cfg(feature = "metrics")]
    metrics_handle: Option<mudvault_metrics::MetricsHandle>,
}

impl GatewaySupervisor {
    /// Load the shared-state backend named by `config.store.url`, assemble
    /// every service, and initialize metrics. Does not bind a listener or
    /// accept connections yet — call [`Self::run`] for that.
    pub async fn new(config: MudvaultConfig) -> Result<Self> {
        let store = connect_store(&config.store).await?;
        let state = GatewayState::new(config.clone(), store);

        #[cfg(feature = "metrics")]
        let metrics_handle = {
            let recorder_config = mudvault_metrics::MetricsRecorderConfig {
                enabled: config.metrics.enabled,
                prefix: None,
                global_labels: Vec::new(),
            };
            match mudvault_metrics::init_metrics(recorder_config) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "failed to initialize metrics recorder");
                    None
                },
            }
        };

        Ok(Self {
            config,
            state,
            #[cfg(feature = "metrics")]
            metrics_handle,
        })
    }

    #[must_use]
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Bind the listener, spawn maintenance tasks, and serve until a
    /// shutdown signal arrives; then drain within the configured deadline.
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.bind, self.config.server.port)
            .parse()
            .map_err(|e| GatewayError::Config(anyhow::anyhow!("invalid bind address: {e}")))?;

        let app = Router::new()
            .route("/ws", get(ws::upgrade))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone());

        #[cfg(feature = "prometheus")]
        if self.config.metrics.enabled {
            spawn_metrics_server(&self.config, self.metrics_handle.clone());
        }

        let sweep_ratelimit = self.state.ratelimit.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RATELIMIT_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                sweep_ratelimit.sweep(RATELIMIT_SWEEP_IDLE);
            }
        });

        info!(%addr, "gateway listening");

        #[cfg(feature = "tls")]
        if self.config.tls.enabled {
            return self.run_tls(addr, app).await;
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(addr, e))?;

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal(self.config.server.drain_deadline_secs))
            .await?;

        info!("gateway stopped");
        Ok(())
    }

    #[cfg(feature = "tls")]
    async fn run_tls(&self, addr: SocketAddr, app: Router) -> Result<()> {
        let cert_path = self
            .config
            .tls
            .cert_path
            .as_deref()
            .ok_or_else(|| GatewayError::Config(anyhow::anyhow!("tls.enabled but tls.cert_path is unset")))?;
        let key_path = self
            .config
            .tls
            .key_path
            .as_deref()
            .ok_or_else(|| GatewayError::Config(anyhow::anyhow!("tls.enabled but tls.key_path is unset")))?;

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| GatewayError::Config(anyhow::anyhow!("failed to load TLS material: {e}")))?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        let drain_deadline_secs = self.config.server.drain_deadline_secs;
        tokio::spawn(async move {
            shutdown_signal(drain_deadline_secs).await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(drain_deadline_secs)));
        });

        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| GatewayError::Bind(addr, e))?;

        info!("gateway stopped");
        Ok(())
    }
}

async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn SharedStore>> {
    if config.url == "memory" {
        info!("using in-memory shared-state backend (single-instance mode)");
        return Ok(mudvault_store::memory::InMemoryStore::new());
    }

    #[cfg(feature = "redis")]
    {
        info!(url = %config.url, "connecting to redis shared-state backend");
        let store = mudvault_store::redis_backend::RedisStore::connect(&config.url).await?;
        return Ok(store);
    }

    #[cfg(not(feature = "redis"))]
    {
        Err(GatewayError::Config(anyhow::anyhow!(
            "store.url {:?} requires the gateway's `redis` feature",
            config.url
        )))
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "protocol": mudvault_protocol::PROTOCOL_VERSION,
        "connections": state.connections.connected_count(),
    }))
}

#[cfg(feature = "prometheus")]
fn spawn_metrics_server(config: &MudvaultConfig, handle: Option<mudvault_metrics::MetricsHandle>) {
    let addr: Result<SocketAddr, _> = format!("{}:{}", config.metrics.bind, config.metrics.port).parse();
    let Ok(addr) = addr else {
        warn!("invalid metrics bind address, skipping /metrics server");
        return;
    };

    tokio::spawn(async move {
        let json_handle = handle.clone();
        let app = Router::new()
            .route("/metrics", get(move || render_metrics(handle.clone())))
            .route("/metrics.json", get(move || render_metrics_json(json_handle.clone())))
            .layer(TraceLayer::new_for_http());

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                info!(%addr, "metrics endpoint listening");
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "metrics server exited");
                }
            },
            Err(e) => warn!(%addr, error = %e, "failed to bind metrics listener"),
        }
    });
}

#[cfg(feature = "prometheus")]
async fn render_metrics(handle: Option<mudvault_metrics::MetricsHandle>) -> impl IntoResponse {
    use axum::http::{StatusCode, header};

    match handle {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics not enabled".to_string(),
        ),
    }
}

/// Same data as `/metrics`, reshaped into the structured JSON snapshot
/// (`mudvault_metrics::MetricsSnapshot`) for diagnostics tooling that would
/// rather not parse Prometheus text exposition format.
#[cfg(feature = "prometheus")]
async fn render_metrics_json(handle: Option<mudvault_metrics::MetricsHandle>) -> impl IntoResponse {
    use axum::http::StatusCode;

    match handle {
        Some(handle) => (
            StatusCode::OK,
            Json(mudvault_metrics::MetricsSnapshot::from_prometheus_text(&handle.render())),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not enabled").into_response(),
    }
}

/// Waits for SIGINT (or SIGTERM on unix); once received, logs the drain
/// deadline and returns, letting `axum::serve` begin its graceful shutdown
/// (new connections refused, existing ones given `drain_deadline_secs` to
/// finish before axum force-closes them) (§4.9, §5).
async fn shutdown_signal(drain_deadline_secs: u64) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        else {
            std::future::pending::<()>().await;
            return;
        };
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!(drain_deadline_secs, "shutdown signal received, draining connections");
}
