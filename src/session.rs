use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::ids::AccountId;

/// A logged-in client. The token is handed out at login and presented as a
/// bearer token on every request; the role is looked up fresh each time so
/// a provider upgrade takes effect without logging in again.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub account_id: AccountId,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, account_id: AccountId) -> Session {
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            account_id,
            expires_at: Utc::now() + self.ttl,
        };
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Live session for `token`, if any.
    pub async fn resolve(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|s| s.expires_at > Utc::now())
            .cloned()
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}
