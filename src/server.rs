use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::error::ServerError;
use crate::handlers::{fetch_record, index, info, metrics, store_record, AppState, SharedState};
use crate::middleware::{handle_panic, logging_middleware, rate_limit_middleware, AdmissionState};
use crate::rate_limiter::RateLimiter;
use crate::records::RecordStore;
use crate::storage;
use crate::system::SysinfoSampler;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

/// Minimum interval between sweeps of expired rate limiter windows
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Handler routes relative to the base path
pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/info", get(info))
        .route("/store", post(store_record))
        .route("/fetch/*key", get(fetch_record))
        .route("/metrics", get(metrics))
}

/// Wrap `router` in the per-request pipeline.
///
/// Execution order: rate limiter, then logging and metrics accounting, then
/// panic recovery around route dispatch.
pub fn apply_pipeline(router: Router, state: SharedState, limiter: Arc<RateLimiter>) -> Router {
    let admission = AdmissionState {
        limiter,
        trust_forward_header: state.config.trust_forward_header,
    };
    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(admission, rate_limit_middleware))
            .layer(middleware::from_fn_with_state(state, logging_middleware))
            .layer(CatchPanicLayer::custom(handle_panic)),
    )
}

/// Build the full application router
pub fn create_app(state: SharedState, limiter: Arc<RateLimiter>) -> Router {
    let base = state.config.base_path().to_string();
    let routes = routes().with_state(state.clone());
    let router = if base.is_empty() {
        routes
    } else {
        // nesting only maps the index to `<base>`; serve `<base>/` as well
        Router::new()
            .route(&format!("{}/", base), get(index))
            .nest(&base, routes)
    };

    apply_pipeline(router, state, limiter)
}

pub struct Server {
    app: Router,
    port: u16,
    limiter: Arc<RateLimiter>,
}

impl Server {
    /// Open storage and assemble the application from a loaded config
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let quota = config.rate;
        tracing::info!(rate = %quota, "Rate limiter configured");
        ConfigValidator::check_hash_algorithm(&config.sha);

        let storage = storage::open(&config.storage_path)?;
        let records = RecordStore::new(storage, config.sha.clone(), config.is_verbose());
        let sampler = Arc::new(SysinfoSampler::new());

        let port = config.port;
        let state = AppState::new(config, records, sampler);
        let limiter = Arc::new(RateLimiter::new(quota));
        let app = create_app(state, limiter.clone());

        Ok(Self { app, port, limiter })
    }

    pub async fn run(self) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", self.port)).await?;

        tracing::info!("anonkv server starting on port {}", self.port);

        let limiter = self.limiter.clone();
        let prune_every = limiter.quota().period.max(PRUNE_INTERVAL);
        let pruner = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(prune_every);
            loop {
                ticker.tick().await;
                let pruned = limiter.prune_expired();
                if pruned > 0 {
                    tracing::debug!(pruned, "Pruned expired rate limit windows");
                }
            }
        });

        // Run server with graceful shutdown
        let served = axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        pruner.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
