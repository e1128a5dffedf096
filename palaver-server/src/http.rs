//! Palaver HTTP surface
//!
//! Axum-based server for the chat front end. Each endpoint is a thin handler
//! that extracts the `SessionContext`, delegates to the session rules in
//! `chat`, and then persists or destroys the session explicitly.
//!
//! Endpoints:
//! - GET  /              - username entry, or redirect to /chat
//! - POST /set_username  - log in (form field `username`)
//! - GET  /chat          - chat page with history
//! - POST /send_message  - JSON `{message}` → `{user_message, ai_response}`
//! - POST /clear_chat    - wipe history
//! - POST /logout        - drop the session
//! - GET  /health        - liveness and version

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use palaver_core::config::ServerConfig;
use palaver_core::{ChatBackend, SessionStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::chat::{self, PageOutcome};
use crate::error::AppError;
use crate::session::{CookieSettings, SessionContext};
use crate::views::Views;

/// Shared state for all HTTP handlers
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub backend: Arc<dyn ChatBackend>,
    pub views: Views,
    pub cookies: CookieSettings,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/set_username", post(set_username_handler))
        .route("/chat", get(chat_handler))
        .route("/send_message", post(send_message_handler))
        .route("/clear_chat", post(clear_chat_handler))
        .route("/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    config: &ServerConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Palaver listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UsernameForm {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

fn render_page(
    state: &AppState,
    session: &SessionContext,
    outcome: PageOutcome,
) -> Result<Response, AppError> {
    let response = match outcome {
        PageOutcome::Redirect(to) => Redirect::to(to).into_response(),
        PageOutcome::Landing { error: None } => Html(state.views.landing(None)?).into_response(),
        PageOutcome::Landing { error: Some(e) } => {
            (StatusCode::BAD_REQUEST, Html(state.views.landing(Some(&e))?)).into_response()
        }
        PageOutcome::Chat => {
            let data = session.data();
            let username = data.username.as_deref().unwrap_or_default();
            Html(state.views.chat(username, &data.chat_history)?).into_response()
        }
    };
    Ok(response)
}

pub async fn landing_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, AppError> {
    let outcome = chat::show_landing(session.data());
    render_page(&state, &session, outcome)
}

pub async fn set_username_handler(
    State(state): State<Arc<AppState>>,
    mut session: SessionContext,
    Form(form): Form<UsernameForm>,
) -> Result<Response, AppError> {
    match chat::set_username(session.data_mut(), &form.username) {
        PageOutcome::Redirect(to) => {
            session.rotate();
            let jar = session.persist().await?;
            Ok((jar, Redirect::to(to)).into_response())
        }
        outcome => render_page(&state, &session, outcome),
    }
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<Response, AppError> {
    let outcome = chat::show_chat(session.data());
    render_page(&state, &session, outcome)
}

pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    mut session: SessionContext,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    // An unreadable body counts as an empty message.
    let text = match payload {
        Ok(Json(req)) => req.message,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected send_message body");
            String::new()
        }
    };

    let exchange = chat::send_message(session.data_mut(), &text, state.backend.as_ref()).await?;
    let jar = session.persist().await?;
    Ok((jar, Json(exchange)).into_response())
}

pub async fn clear_chat_handler(mut session: SessionContext) -> Result<Response, AppError> {
    chat::clear_chat(session.data_mut())?;
    let jar = session.persist().await?;
    Ok((jar, Json(serde_json::json!({ "success": true }))).into_response())
}

pub async fn logout_handler(session: SessionContext) -> Result<Response, AppError> {
    if let Some(username) = session.data().username.as_deref() {
        tracing::info!(username = %username, "Logged out");
    }
    let jar = session.destroy().await?;
    Ok((jar, Redirect::to(chat::LANDING_PATH)).into_response())
}

pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
