//! Per-request session context
//!
//! The session id lives in a signed cookie; the data lives in a `SessionStore`.
//! Handlers take a `SessionContext` as an extractor, work on its `SessionData`,
//! and then either `persist` or `destroy` it, returning the updated cookie jar
//! as part of the response. Nothing is written back implicitly.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use palaver_core::config::{SessionConfig, MIN_SECRET_LEN};
use palaver_core::{SessionData, SessionStore};
use uuid::Uuid;

use crate::error::AppError;
use crate::http::AppState;

/// Name, signing key and flags for the session cookie.
#[derive(Clone)]
pub struct CookieSettings {
    pub name: String,
    pub key: Key,
    pub secure: bool,
}

impl CookieSettings {
    pub fn new(name: impl Into<String>, secret: &str, secure: bool) -> anyhow::Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("session secret must be at least {} bytes", MIN_SECRET_LEN);
        }
        Ok(Self {
            name: name.into(),
            key: Key::derive_from(secret.as_bytes()),
            secure,
        })
    }

    pub fn from_config(config: &SessionConfig) -> anyhow::Result<Self> {
        Self::new(
            config.cookie_name.clone(),
            &config.resolve_secret(),
            config.secure_cookie,
        )
    }

    /// Browser-session cookie: no Max-Age or Expires.
    fn session_cookie(&self, id: Uuid) -> Cookie<'static> {
        Cookie::build((self.name.clone(), id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build()
    }
}

pub struct SessionContext {
    id: Option<Uuid>,
    retired: Option<Uuid>,
    data: SessionData,
    jar: SignedCookieJar,
    store: Arc<dyn SessionStore>,
    settings: CookieSettings,
}

impl SessionContext {
    /// Resolve the session named by the request's cookie. A missing, forged,
    /// or expired cookie yields a fresh, logged-out session.
    pub async fn load(
        headers: &HeaderMap,
        store: Arc<dyn SessionStore>,
        settings: CookieSettings,
    ) -> Result<Self, AppError> {
        let jar = SignedCookieJar::from_headers(headers, settings.key.clone());
        let cookie_id = jar
            .get(&settings.name)
            .and_then(|c| Uuid::parse_str(c.value()).ok());

        let (id, data) = match cookie_id {
            Some(id) => match store.load(id).await? {
                Some(data) => (Some(id), data),
                None => (None, SessionData::default()),
            },
            None => (None, SessionData::default()),
        };

        Ok(Self {
            id,
            retired: None,
            data,
            jar,
            store,
            settings,
        })
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }

    /// Issue a new id on the next `persist` and drop the old entry.
    pub fn rotate(&mut self) {
        if let Some(old) = self.id.take() {
            self.retired = Some(old);
        }
    }

    /// Write the session to the store and (re)issue its cookie.
    pub async fn persist(mut self) -> Result<SignedCookieJar, AppError> {
        if let Some(old) = self.retired.take() {
            self.store.delete(old).await?;
        }

        let id = self.id.unwrap_or_else(Uuid::new_v4);
        self.data.touch();
        self.store.save(id, &self.data).await?;
        tracing::debug!(session = %id, store = self.store.name(), "Session saved");

        let cookie = self.settings.session_cookie(id);
        Ok(self.jar.add(cookie))
    }

    /// Remove every trace of the session. Safe to call with no session.
    pub async fn destroy(self) -> Result<SignedCookieJar, AppError> {
        for id in [self.id, self.retired].into_iter().flatten() {
            self.store.delete(id).await?;
            tracing::debug!(session = %id, "Session destroyed");
        }

        let removal = Cookie::build((self.settings.name.clone(), "")).path("/").build();
        Ok(self.jar.remove(removal))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        SessionContext::load(&parts.headers, state.store.clone(), state.cookies.clone()).await
    }
}
