//! HTTP server setup: router, static file serving, and API routes.

use super::state::ApiState;
use super::{chat, documents, system};

use axum::Router;
use axum::http::{StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use rust_embed::Embed;
use tower_http::cors::{Any, CorsLayer};

use std::net::SocketAddr;
use std::sync::Arc;

/// Embedded web page served at `/`.
#[derive(Embed)]
#[folder = "interface/"]
struct InterfaceAssets;

/// Build the full router. Chat and retrieval are reachable both at the
/// root and under `/api`.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(system::health))
        .route("/status", get(system::status))
        .route("/chat", post(chat::chat))
        .route("/rag", post(documents::query_documents))
        .route("/providers/refresh", post(system::refresh_providers))
        .route("/documents/index", post(documents::index_documents));

    Router::new()
        .route("/health", get(system::health))
        .route("/chat", post(chat::chat))
        .route("/rag", post(documents::query_documents))
        .nest("/api", api_routes)
        .fallback(static_handler)
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the given address.
///
/// The server stops accepting connections once `shutdown_rx` flips to true
/// and finishes in-flight requests before the task exits.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}

// -- Static file serving --

async fn static_handler(uri: Uri) -> Response {
    let path = match uri.path().trim_start_matches('/') {
        "" => "index.html",
        path => path,
    };

    if let Some(content) = InterfaceAssets::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime.as_ref())],
            content.data,
        )
            .into_response();
    }

    if !path.contains('.')
        && let Some(content) = InterfaceAssets::get("index.html")
    {
        return Html(String::from_utf8_lossy(&content.data).into_owned()).into_response();
    }

    (StatusCode::NOT_FOUND, "not found").into_response()
}
