pub mod chat;
pub mod error;
pub mod http;
pub mod session;
pub mod views;

use std::sync::Arc;

use palaver_core::{create_store, ChatClientConfig, OpenAiChatClient, PalaverConfig};

/// Wire the configured store, AI client, views and cookie settings into handler state.
pub fn build_state(config: &PalaverConfig) -> anyhow::Result<http::AppState> {
    let store = create_store(&config.session);
    tracing::info!(backend = store.name(), "Session store ready");

    let backend = OpenAiChatClient::new(ChatClientConfig::from_config(&config.ai))
        .map_err(palaver_core::PalaverError::from)?;

    Ok(http::AppState {
        store: Arc::from(store),
        backend: Arc::new(backend),
        views: views::Views::new()?,
        cookies: session::CookieSettings::from_config(&config.session)?,
    })
}
