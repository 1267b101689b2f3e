// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! EaaS Server - HTTP responder for local kernel entropy
//!
//! # Endpoints
//!
//! - `/entropy?bytes=<n>`: up to `n` random bytes (1..=2 MiB), base64 in a JSON envelope
//! - `/health`: liveness check echoing the request method
//! - `/metrics`: Prometheus metrics
//!
//! [`serve`] answers one request per connection and puts deadlines on both the
//! request head and the whole exchange, so slow or stalled peers are dropped.

use axum::{
    extract::{ConnectInfo, RawQuery, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use eaas_core::{
    device::RandomSource,
    metrics::Metrics,
    protocol::{EntropyEnvelope, EntropyRequest, HealthReport, INTERNAL_ERROR_MESSAGE},
    Error,
};
use hyper::server::conn::http1;
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    server::graceful::GracefulShutdown,
    service::TowerToHyperService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{debug, error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    source: Arc<dyn RandomSource>,
    metrics: Metrics,
    read_timeout: Duration,
}

impl AppState {
    /// `read_timeout` bounds each device read made on behalf of a request
    pub fn new(source: Arc<dyn RandomSource>, metrics: Metrics, read_timeout: Duration) -> Self {
        Self {
            source,
            metrics,
            read_timeout,
        }
    }
}

/// Build the router with access logging
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/entropy", any(serve_entropy))
        .route("/health", any(health_check))
        .route("/metrics", get(get_metrics))
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// Accept HTTP/1.1 connections until `shutdown` is cancelled, then wait for
/// open connections to finish.
///
/// Each connection carries a single request. The request head must arrive
/// within `connection_timeout`, and the connection is dropped once it has been
/// open for twice that, whether it is still reading, handling or writing.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    connection_timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let graceful = GracefulShutdown::new();
    let connection_deadline = connection_timeout.saturating_mul(2);

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(connection_timeout)
        .keep_alive(false);

    loop {
        let (stream, remote_address) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        let service = match make_service.call(remote_address).await {
            Ok(service) => service,
            Err(never) => match never {},
        };

        let connection = graceful.watch(
            builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(service)),
        );
        tokio::spawn(async move {
            match tokio::time::timeout(connection_deadline, connection).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(remote_address = %remote_address, "Connection closed: {}", e);
                }
                Err(_) => {
                    debug!(remote_address = %remote_address, "Connection exceeded {:?}, dropping", connection_deadline);
                }
            }
        });
    }

    drop(listener);
    info!("Listener closed, waiting for open connections");
    graceful.shutdown().await;
}

/// Log every request before it is handled
async fn access_log(request: Request, next: Next) -> Response {
    let remote_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        method = %request.method(),
        remote_address = %remote_address,
        url = %request.uri(),
        "http activity"
    );

    next.run(request).await
}

/// `/entropy?bytes=<n>` - Serve random bytes from the local source
async fn serve_entropy(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Response {
    let start = Instant::now();

    let raw_bytes = query.as_deref().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "bytes")
            .map(|(_, value)| value.into_owned())
    });

    let request = match EntropyRequest::validate(method.as_str(), raw_bytes.as_deref()) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejected entropy request: {}", e);
            state.metrics.record_rejected_request();
            return (StatusCode::BAD_REQUEST, Json(EntropyEnvelope::failure(e.to_string())))
                .into_response();
        }
    };

    match read_source(&state, request.bytes()).await {
        Ok(data) => {
            let latency = start.elapsed().as_micros() as u64;
            state.metrics.record_request(data.len(), latency);
            (StatusCode::OK, Json(EntropyEnvelope::success(&data))).into_response()
        }
        Err(e) => {
            error!("server error: {}", e);
            state.metrics.record_request_failure();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(EntropyEnvelope::failure(INTERNAL_ERROR_MESSAGE)),
            )
                .into_response()
        }
    }
}

/// Blocking device read on the blocking thread pool, bounded by the read timeout
async fn read_source(state: &AppState, n: usize) -> eaas_core::Result<Vec<u8>> {
    let source = Arc::clone(&state.source);
    let read = tokio::task::spawn_blocking(move || source.read_random(n));

    match tokio::time::timeout(state.read_timeout, read).await {
        Ok(joined) => {
            joined.map_err(|e| Error::Internal(format!("entropy read task failed: {}", e)))?
        }
        Err(_) => Err(Error::Internal(format!(
            "entropy read of {} bytes exceeded {:?}",
            n, state.read_timeout
        ))),
    }
}

/// `/health` - Liveness check, answers for any method
async fn health_check(method: Method) -> Json<HealthReport> {
    Json(HealthReport::healthy(method.as_str()))
}

/// GET /metrics - Prometheus metrics
async fn get_metrics(State(state): State<AppState>) -> String {
    state.metrics.prometheus_format()
}
