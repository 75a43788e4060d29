use crate::config::{AllowedOrigins, Config};
use crate::models::ClientIdentity;
use crate::pipeline::{ContactPipeline, Outcome};
use crate::rate_limit::FixedWindowLimiter;
use crate::sheets::{GoogleSheetsClient, SheetsApi};
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::Utc;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ContactPipeline,
    pub allowed_origins: AllowedOrigins,
}

pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;

    let sheets: Arc<dyn SheetsApi> = Arc::new(GoogleSheetsClient::from_config(&config)?);
    info!(
        "Appending submissions to {}!A:F ({} values)",
        config.sheet_name,
        config.value_input.as_str()
    );

    let limiter = Arc::new(FixedWindowLimiter::default());
    spawn_limiter_sweep(limiter.clone());

    let state = AppState {
        pipeline: ContactPipeline::new(sheets, limiter, config.persist_timeout),
        allowed_origins: config.allowed_origins.clone(),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    Router::new()
        .route("/api/contact", any(handle_contact))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    match origins {
        AllowedOrigins::Any => base.allow_origin(AllowOrigin::any()),
        AllowedOrigins::List(list) => base
            .allow_origin(AllowOrigin::list(list.iter().cloned()))
            .allow_credentials(true),
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_contact(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response {
    let client = extract_client(&headers, peer);
    match state.pipeline.dispatch(&method, &client, &body).await {
        Ok(outcome) => outcome.into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match (self, self.body()) {
            (Outcome::Alive, _) => (self.status(), "OK").into_response(),
            (_, Some(body)) => (self.status(), Json(body)).into_response(),
            (_, None) => self.status().into_response(),
        }
    }
}

fn extract_client(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> ClientIdentity {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    ClientIdentity::resolve(forwarded, peer.map(|ConnectInfo(addr)| addr.ip()))
}

fn spawn_limiter_sweep(limiter: Arc<FixedWindowLimiter>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            limiter.evict_expired(Utc::now());
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
