//! Session storage for the Data API token

use std::sync::Arc;

use anyhow::{Result, bail};
use arc_swap::ArcSwapOption;

use crate::config::repository::{KeyValueStore, Namespace};
use crate::events::{AuthEvent, EventBus};

pub const TOKEN_KEY: &str = "fmApiToken";
pub const USER_KEY: &str = "fmApiUser";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: Option<String>,
}

/// Current session, cached in memory and written through to the
/// `session` namespace
pub struct SessionStore {
    current: ArcSwapOption<Session>,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
}

impl SessionStore {
    /// Load any stored session
    pub async fn load(store: Arc<dyn KeyValueStore>, events: EventBus) -> Result<Self> {
        let token = store.get(Namespace::Session, TOKEN_KEY).await?;
        let user = store.get(Namespace::Session, USER_KEY).await?;

        let current = token
            .filter(|token| !token.trim().is_empty())
            .map(|token| {
                Arc::new(Session {
                    token,
                    user: user.filter(|user| !user.trim().is_empty()),
                })
            });

        Ok(Self {
            current: ArcSwapOption::new(current),
            store,
            events,
        })
    }

    pub fn token(&self) -> Option<String> {
        self.current.load_full().map(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<String> {
        self.current.load_full().and_then(|s| s.user.clone())
    }

    pub fn has_session(&self) -> bool {
        self.current.load().is_some()
    }

    pub async fn save(&self, token: &str, user: Option<&str>) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            bail!("Cannot save a session without a token");
        }
        let user = user.map(str::trim).filter(|u| !u.is_empty());

        self.store.set(Namespace::Session, TOKEN_KEY, token).await?;
        match user {
            Some(user) => self.store.set(Namespace::Session, USER_KEY, user).await?,
            None => self.store.remove(Namespace::Session, USER_KEY).await?,
        }

        self.current.store(Some(Arc::new(Session {
            token: token.to_string(),
            user: user.map(str::to_string),
        })));
        log::info!("Session saved for {}", user.unwrap_or("anonymous user"));
        self.events.publish_auth(AuthEvent::SessionChanged);
        Ok(())
    }

    /// Forget the session and everything stored alongside it
    pub async fn clear(&self) -> Result<()> {
        self.current.store(None);
        self.store.clear(Namespace::Session).await?;
        self.events.publish_auth(AuthEvent::SessionChanged);
        Ok(())
    }

    /// Called when the backend rejects the token
    pub async fn invalidate(&self) {
        log::warn!("Session rejected by the server, logging out");
        if let Err(e) = self.clear().await {
            log::warn!("Failed to clear stored session: {:#}", e);
        }
        self.events.publish_auth(AuthEvent::Logout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::MemoryKvStore;

    #[tokio::test]
    async fn test_save_load_and_clear() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let events = EventBus::new();
        let mut auth_events = events.subscribe_auth();

        let session = SessionStore::load(Arc::clone(&store), events.clone()).await.unwrap();
        assert!(!session.has_session());

        session.save(" Bearer abc ", Some("Ana")).await.unwrap();
        assert_eq!(session.token().as_deref(), Some("Bearer abc"));
        assert_eq!(auth_events.recv().await.unwrap(), AuthEvent::SessionChanged);

        let reloaded = SessionStore::load(Arc::clone(&store), events.clone()).await.unwrap();
        assert_eq!(reloaded.user().as_deref(), Some("Ana"));

        reloaded.invalidate().await;
        assert!(!reloaded.has_session());
        assert_eq!(store.get(Namespace::Session, TOKEN_KEY).await.unwrap(), None);
        assert_eq!(auth_events.recv().await.unwrap(), AuthEvent::SessionChanged);
        assert_eq!(auth_events.recv().await.unwrap(), AuthEvent::Logout);
    }

    #[tokio::test]
    async fn test_blank_token_is_rejected() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let session = SessionStore::load(store, EventBus::new()).await.unwrap();
        assert!(session.save("  ", None).await.is_err());
    }
}
