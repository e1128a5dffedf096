use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::message::Message;

/// Everything the server remembers about one browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            username: None,
            chat_history: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl SessionData {
    /// A session is logged in exactly when it carries a username.
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, idle_timeout: Option<Duration>, now: DateTime<Utc>) -> bool {
        match idle_timeout {
            Some(timeout) => now - self.updated_at > timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_logged_out_and_empty() {
        let session = SessionData::default();
        assert!(!session.is_authenticated());
        assert!(session.chat_history.is_empty());
    }

    #[test]
    fn test_expiry_only_applies_with_timeout() {
        let mut session = SessionData::default();
        session.updated_at = Utc::now() - Duration::hours(2);

        assert!(!session.is_expired(None, Utc::now()));
        assert!(session.is_expired(Some(Duration::minutes(30)), Utc::now()));
        assert!(!session.is_expired(Some(Duration::hours(3)), Utc::now()));
    }
}
