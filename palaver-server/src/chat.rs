//! Chat controller
//!
//! Session-level rules for the chat flow, kept free of axum types so they can
//! be exercised directly against a `SessionData` and a stub `ChatBackend`.
//! The handlers in `http` load the session, call into here, then persist.

use palaver_core::{ChatBackend, Message, SessionData};
use serde::Serialize;

use crate::error::AppError;

pub const LANDING_PATH: &str = "/";
pub const CHAT_PATH: &str = "/chat";

pub const INVALID_USERNAME: &str = "Please enter a valid username";
pub const EMPTY_MESSAGE: &str = "Message cannot be empty";

/// What a page request resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Landing { error: Option<String> },
    Chat,
    Redirect(&'static str),
}

/// The two messages produced by one successful `send_message`.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user_message: Message,
    pub ai_response: Message,
}

pub fn show_landing(session: &SessionData) -> PageOutcome {
    if session.is_authenticated() {
        PageOutcome::Redirect(CHAT_PATH)
    } else {
        PageOutcome::Landing { error: None }
    }
}

/// Logs in as `candidate`, wiping any previous history. Blank names leave the session untouched.
pub fn set_username(session: &mut SessionData, candidate: &str) -> PageOutcome {
    let username = candidate.trim();
    if username.is_empty() {
        return PageOutcome::Landing {
            error: Some(INVALID_USERNAME.to_string()),
        };
    }

    session.username = Some(username.to_string());
    session.chat_history = Vec::new();
    tracing::info!(username = %username, "Username set");
    PageOutcome::Redirect(CHAT_PATH)
}

pub fn show_chat(session: &SessionData) -> PageOutcome {
    if session.is_authenticated() {
        PageOutcome::Chat
    } else {
        PageOutcome::Redirect(LANDING_PATH)
    }
}

/// Run one user turn through the backend.
///
/// The history is only written back once the backend has replied, so a
/// failed call leaves the session exactly as it was.
pub async fn send_message(
    session: &mut SessionData,
    raw_text: &str,
    backend: &dyn ChatBackend,
) -> Result<Exchange, AppError> {
    if !session.is_authenticated() {
        return Err(AppError::NotAuthenticated);
    }

    let text = raw_text.trim();
    if text.is_empty() {
        return Err(AppError::Validation(EMPTY_MESSAGE.to_string()));
    }

    let mut history = session.chat_history.clone();
    let user_message = Message::user(text, backend.get_timestamp());
    history.push(user_message.clone());

    let reply = backend.get_response(text, &history).await.map_err(|e| {
        tracing::error!(backend = backend.name(), error = %e, "Error in send_message");
        AppError::Upstream(e)
    })?;

    let ai_response = Message::assistant(reply, backend.get_timestamp());
    history.push(ai_response.clone());
    session.chat_history = history;

    Ok(Exchange {
        user_message,
        ai_response,
    })
}

pub fn clear_chat(session: &mut SessionData) -> Result<(), AppError> {
    if !session.is_authenticated() {
        return Err(AppError::NotAuthenticated);
    }
    session.chat_history.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use palaver_core::{AiError, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        reply: Option<&'static str>,
        calls: AtomicUsize,
        seen_history_len: AtomicUsize,
    }

    impl StubBackend {
        fn replying(reply: &'static str) -> Self {
            Self {
                reply: Some(reply),
                calls: AtomicUsize::new(0),
                seen_history_len: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
                seen_history_len: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for StubBackend {
        async fn get_response(
            &self,
            _user_message: &str,
            history: &[Message],
        ) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_history_len.store(history.len(), Ordering::SeqCst);
            self.reply.map(str::to_string).ok_or(AiError::EmptyReply)
        }

        fn get_timestamp(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn logged_in(name: &str) -> SessionData {
        let mut session = SessionData::default();
        assert_eq!(set_username(&mut session, name), PageOutcome::Redirect(CHAT_PATH));
        session
    }

    #[test]
    fn test_landing_redirects_when_logged_in() {
        assert_eq!(
            show_landing(&SessionData::default()),
            PageOutcome::Landing { error: None }
        );
        assert_eq!(show_landing(&logged_in("alice")), PageOutcome::Redirect(CHAT_PATH));
    }

    #[test]
    fn test_blank_usernames_do_not_mutate_session() {
        for candidate in ["", " ", "\t\n", "   \r\n  "] {
            let mut session = SessionData::default();
            let before = session.clone();
            let outcome = set_username(&mut session, candidate);

            assert_eq!(
                outcome,
                PageOutcome::Landing {
                    error: Some(INVALID_USERNAME.to_string())
                }
            );
            assert_eq!(session, before, "candidate {:?} mutated session", candidate);
        }
    }

    #[tokio::test]
    async fn test_blank_username_keeps_logged_in_history() {
        let mut session = logged_in("alice");
        send_message(&mut session, "hi", &StubBackend::replying("hey"))
            .await
            .unwrap();
        let before = session.clone();

        for candidate in ["", "   ", "\t"] {
            let outcome = set_username(&mut session, candidate);
            assert!(matches!(outcome, PageOutcome::Landing { error: Some(_) }));
        }

        assert_eq!(session, before);
        assert_eq!(session.username.as_deref(), Some("alice"));
        assert_eq!(session.chat_history.len(), 2);
    }

    #[test]
    fn test_set_username_trims_and_resets_history() {
        let mut session = logged_in("alice");
        session.chat_history.push(Message::user("old", Utc::now()));

        set_username(&mut session, "  bob  ");
        assert_eq!(session.username.as_deref(), Some("bob"));
        assert!(session.chat_history.is_empty());
    }

    #[test]
    fn test_show_chat_requires_username() {
        assert_eq!(show_chat(&SessionData::default()), PageOutcome::Redirect(LANDING_PATH));
        assert_eq!(show_chat(&logged_in("alice")), PageOutcome::Chat);
    }

    #[tokio::test]
    async fn test_send_message_appends_user_then_assistant() {
        let backend = StubBackend::replying("Hello Alice!");
        let mut session = logged_in("alice");

        let exchange = send_message(&mut session, "  hi  ", &backend).await.unwrap();

        assert_eq!(exchange.user_message.content, "hi");
        assert_eq!(exchange.ai_response.content, "Hello Alice!");
        let roles: Vec<Role> = session.chat_history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        // backend saw the user turn already appended
        assert_eq!(backend.seen_history_len.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_message_without_login_never_calls_backend() {
        let backend = StubBackend::replying("unused");
        let mut session = SessionData::default();

        let err = send_message(&mut session, "hi", &backend).await.unwrap_err();

        assert!(matches!(err, AppError::NotAuthenticated));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(session.chat_history.is_empty());
    }

    #[tokio::test]
    async fn test_send_message_rejects_blank_text() {
        let backend = StubBackend::replying("unused");
        let mut session = logged_in("alice");

        let err = send_message(&mut session, "   ", &backend).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m == EMPTY_MESSAGE));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_backend_persists_nothing() {
        let backend = StubBackend::failing();
        let mut session = logged_in("alice");
        send_message(&mut session, "first", &StubBackend::replying("ok"))
            .await
            .unwrap();
        let before = session.chat_history.clone();

        let err = send_message(&mut session, "second", &backend).await.unwrap_err();

        assert!(matches!(err, AppError::Upstream(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.chat_history, before);
    }

    #[tokio::test]
    async fn test_clear_chat() {
        let mut session = logged_in("alice");
        send_message(&mut session, "hi", &StubBackend::replying("hey"))
            .await
            .unwrap();

        clear_chat(&mut session).unwrap();
        assert!(session.chat_history.is_empty());
        assert_eq!(session.username.as_deref(), Some("alice"));

        assert!(matches!(
            clear_chat(&mut SessionData::default()),
            Err(AppError::NotAuthenticated)
        ));
    }
}
