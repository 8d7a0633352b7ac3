use std::net::SocketAddr;
use std::sync::Arc;

use attention_backend::config::Config;
use attention_backend::extractors::SESSION_HEADER;
use attention_backend::logging::{init_tracing, LogConfig};
use attention_backend::middleware::request_id::REQUEST_ID_HEADER;
use attention_backend::perception::PerceptionClient;
use attention_backend::routes::build_router;
use attention_backend::state::AppState;
use attention_backend::tracking::{SessionStore, TrackingConfig};
use attention_backend::workers::WorkerManager;
use axum::http::{header, HeaderName, HeaderValue};
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting attention-backend");

    if let Err(e) = PerceptionClient::validate_config(&config.perception) {
        tracing::error!(error = %e, "Invalid perception config");
        std::process::exit(1);
    }

    let tracking = TrackingConfig::load(config.tracking_config_path.as_deref());
    let sessions = Arc::new(SessionStore::new(tracking, config.session.max_sessions));
    let perception = Arc::new(PerceptionClient::new(&config.perception));
    tracing::info!(
        mode = perception.mode().as_str(),
        max_sessions = config.session.max_sessions,
        "Tracking pipeline ready"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(sessions.clone(), perception, &config, shutdown_tx.clone());

    let worker_manager = WorkerManager::new(
        sessions.clone(),
        shutdown_tx.subscribe(),
        &config.worker,
        &config.session,
    );
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker_manager.start().await {
            tracing::error!(error = %e, "Worker manager failed");
        }
    });

    let cors_layer = match build_cors_layer(&config) {
        Ok(layer) => layer,
        Err(e) => {
            tracing::error!(error = %e, "Invalid CORS_ORIGIN");
            std::process::exit(1);
        }
    };

    let app = build_router(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "Listening");

    let server_future = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

    // Worker 独立运行，panic 只记录，不影响 HTTP 服务
    tokio::spawn(async move {
        match worker_handle.await {
            Err(e) => tracing::error!(error = %e, "Worker task panicked, HTTP server continues"),
            Ok(()) => tracing::info!("Worker manager exited normally"),
        }
    });

    if let Err(e) = server_future.await {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    let stats = sessions.stats().await;
    tracing::info!(active_sessions = stats.active_sessions, "Shutdown complete");
}

fn build_cors_layer(config: &Config) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let allowed_headers = [
        header::CONTENT_TYPE,
        header::ACCEPT,
        HeaderName::from_static(SESSION_HEADER),
        request_id.clone(),
    ];
    let layer = CorsLayer::new()
        .allow_headers(allowed_headers)
        .expose_headers([request_id])
        .allow_methods(Any);

    if config.cors_origin.trim() == "*" {
        // 通配符与 credentials 互斥
        return Ok(layer.allow_origin(Any).allow_credentials(false));
    }

    let origin = config.cors_origin.parse::<HeaderValue>()?;
    Ok(layer.allow_origin(origin))
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
