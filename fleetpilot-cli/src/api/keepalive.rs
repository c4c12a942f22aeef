//! Low-frequency session keep-alive
//!
//! While a session exists a one-record probe is sent on an interval, using
//! the layout that last produced records before the configured candidates.
//! Failures are only logged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::client::DataApi;
use super::fetcher::RecordFetcher;
use super::models::FindRequest;
use crate::auth::SessionStore;
use crate::config::KeepAliveConfig;
use crate::events::{AuthEvent, EventBus};

pub struct KeepAlive {
    api: Arc<dyn DataApi>,
    fetcher: Arc<RecordFetcher>,
    session: Arc<SessionStore>,
    config: KeepAliveConfig,
    last_success: ArcSwapOption<Instant>,
}

impl KeepAlive {
    pub fn new(
        api: Arc<dyn DataApi>,
        fetcher: Arc<RecordFetcher>,
        session: Arc<SessionStore>,
        config: KeepAliveConfig,
    ) -> Self {
        Self {
            api,
            fetcher,
            session,
            config,
            last_success: ArcSwapOption::empty(),
        }
    }

    /// Remembered layout first, then every candidate once
    pub fn ping_layouts(&self) -> Vec<String> {
        let mut layouts = Vec::new();
        if let Some(layout) = self.fetcher.last_success().and_then(|ctx| ctx.layout) {
            layouts.push(layout);
        }
        for layout in &self.fetcher.candidates().layouts {
            if !layouts.contains(layout) {
                layouts.push(layout.clone());
            }
        }
        layouts
    }

    /// Probe the backend; true when any layout answers 2xx or 401
    pub async fn ping(&self) -> bool {
        if !self.session.has_session() {
            return false;
        }
        let request = FindRequest::probe();

        for layout in self.ping_layouts() {
            match self.api.find(&layout, &request).await {
                Ok(response) if response.ok() || response.is_unauthorized() => {
                    log::debug!("Keep-alive ping succeeded on {}", layout);
                    self.last_success.store(Some(Arc::new(Instant::now())));
                    return true;
                }
                Ok(response) => {
                    log::debug!("Keep-alive ping on {} answered {}", layout, response.status);
                }
                Err(e) => {
                    log::debug!("Keep-alive ping on {} failed: {:#}", layout, e);
                }
            }
        }
        log::debug!("Keep-alive ping failed on every layout");
        false
    }

    pub fn next_delay(&self, succeeded: bool) -> Duration {
        let retry = self.config.retry();
        if succeeded {
            self.config.interval().max(retry)
        } else {
            retry
        }
    }

    pub fn should_ping_on_focus(&self, now: Instant) -> bool {
        if !self.config.enabled || !self.session.has_session() {
            return false;
        }
        match self.last_success.load_full() {
            Some(last) => now.saturating_duration_since(*last) > self.config.stale_after(),
            None => true,
        }
    }

    /// Terminal focus regained
    pub async fn on_focus(&self) {
        if self.should_ping_on_focus(Instant::now()) {
            self.ping().await;
        }
    }

    /// Run the ping loop until the event bus closes.
    ///
    /// The loop idles while there is no session. Once one exists the session
    /// counts as freshly confirmed and the first ping waits a full interval.
    /// Session changes never trigger a ping by themselves.
    pub fn spawn(self: Arc<Self>, events: &EventBus) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            log::debug!("Keep-alive disabled");
            return None;
        }
        let mut auth = events.subscribe_auth();

        Some(tokio::spawn(async move {
            loop {
                if !self.session.has_session() {
                    match auth.recv().await {
                        Ok(AuthEvent::Logout) => self.last_success.store(None),
                        Ok(AuthEvent::SessionChanged) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    }
                    continue;
                }

                log::debug!("Keep-alive started");
                self.last_success.store(Some(Arc::new(Instant::now())));
                if !self.run_while_session(&mut auth).await {
                    break;
                }
            }
        }))
    }

    /// Ping on schedule until the session goes away. Returns false when the
    /// event bus closed.
    async fn run_while_session(&self, auth: &mut broadcast::Receiver<AuthEvent>) -> bool {
        let mut due = tokio::time::Instant::now() + self.next_delay(true);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(due) => {
                    let succeeded = self.ping().await;
                    due = tokio::time::Instant::now() + self.next_delay(succeeded);
                }
                event = auth.recv() => match event {
                    Ok(AuthEvent::Logout) => {
                        log::debug!("Keep-alive paused after logout");
                        self.last_success.store(None);
                        return true;
                    }
                    Ok(AuthEvent::SessionChanged) if !self.session.has_session() => {
                        self.last_success.store(None);
                        return true;
                    }
                    Ok(AuthEvent::SessionChanged) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fetcher::tests::{MockApi, candidates};
    use crate::config::repository::{KeyValueStore, MemoryKvStore};
    use serde_json::json;

    async fn session(with_token: bool) -> Arc<SessionStore> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let session = SessionStore::load(store, EventBus::new()).await.unwrap();
        if with_token {
            session.save("Bearer abc", Some("ana")).await.unwrap();
        }
        Arc::new(session)
    }

    fn keep_alive(api: Arc<MockApi>, fetcher: Arc<RecordFetcher>, session: Arc<SessionStore>) -> KeepAlive {
        KeepAlive::new(api, fetcher, session, KeepAliveConfig::default())
    }

    #[tokio::test]
    async fn test_ping_prefers_remembered_layout() {
        let api = Arc::new(
            MockApi::default()
                .with("find:L2", 200, json!({ "response": { "data": [] } })),
        );
        let fetcher = Arc::new(RecordFetcher::new(api.clone(), candidates(&["L1", "L2"], &[])));
        fetcher.fetch_records().await.unwrap();
        assert_eq!(api.calls(), vec!["find:L1", "find:L2"]);

        let keep_alive = keep_alive(api.clone(), fetcher, session(true).await);
        assert_eq!(keep_alive.ping_layouts(), vec!["L2", "L1"]);
        assert!(keep_alive.ping().await);
        assert_eq!(api.calls().last().map(String::as_str), Some("find:L2"));
        assert!(!keep_alive.should_ping_on_focus(Instant::now()));
    }

    #[tokio::test]
    async fn test_unauthorized_counts_as_alive() {
        let api = Arc::new(MockApi::default().with("find:L1", 401, json!({})));
        let fetcher = Arc::new(RecordFetcher::new(api.clone(), candidates(&["L1"], &[])));
        let keep_alive = keep_alive(api, fetcher, session(true).await);
        assert!(keep_alive.ping().await);
    }

    #[tokio::test]
    async fn test_failure_schedules_retry() {
        let api = Arc::new(MockApi::default());
        let fetcher = Arc::new(RecordFetcher::new(api.clone(), candidates(&["L1", "L2"], &[])));
        let keep_alive = keep_alive(api, fetcher, session(true).await);

        let succeeded = keep_alive.ping().await;
        assert!(!succeeded);
        assert_eq!(keep_alive.next_delay(succeeded), Duration::from_secs(60));
        assert_eq!(keep_alive.next_delay(true), Duration::from_secs(540));
        assert!(keep_alive.should_ping_on_focus(Instant::now()));
    }

    #[tokio::test]
    async fn test_no_ping_without_session() {
        let api = Arc::new(MockApi::default());
        let fetcher = Arc::new(RecordFetcher::new(api.clone(), candidates(&["L1"], &[])));
        let keep_alive = keep_alive(api.clone(), fetcher, session(false).await);

        assert!(!keep_alive.ping().await);
        assert!(!keep_alive.should_ping_on_focus(Instant::now()));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_success_pings_on_focus() {
        let api = Arc::new(MockApi::default().with("find:L1", 200, json!({})));
        let fetcher = Arc::new(RecordFetcher::new(api.clone(), candidates(&["L1"], &[])));
        let keep_alive = keep_alive(api, fetcher, session(true).await);

        assert!(keep_alive.ping().await);
        let later = Instant::now() + Duration::from_secs(421);
        assert!(keep_alive.should_ping_on_focus(later));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_waits_full_interval_then_retries() {
        let api = Arc::new(MockApi::default());
        let fetcher = Arc::new(RecordFetcher::new(api.clone(), candidates(&["L1"], &[])));
        let events = EventBus::new();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let session = Arc::new(SessionStore::load(store, events.clone()).await.unwrap());
        session.save("Bearer abc", Some("ana")).await.unwrap();

        let keep_alive = Arc::new(keep_alive(api.clone(), fetcher, session.clone()));
        let handle = keep_alive.clone().spawn(&events).unwrap();

        tokio::time::sleep(Duration::from_secs(539)).await;
        assert!(api.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.calls(), vec!["find:L1"]);

        // Failed ping: next attempt after the retry delay
        tokio::time::sleep(Duration::from_secs(58)).await;
        assert_eq!(api.calls().len(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.calls().len(), 2);

        session.invalidate().await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(api.calls().len(), 2);
        assert!(keep_alive.last_success.load().is_none());
        assert!(!handle.is_finished());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_change_does_not_ping() {
        let api = Arc::new(MockApi::default().with("find:L1", 200, json!({})));
        let fetcher = Arc::new(RecordFetcher::new(api.clone(), candidates(&["L1"], &[])));
        let events = EventBus::new();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let session = Arc::new(SessionStore::load(store, events.clone()).await.unwrap());

        let keep_alive = Arc::new(keep_alive(api.clone(), fetcher, session.clone()));
        let handle = keep_alive.clone().spawn(&events).unwrap();

        tokio::time::sleep(Duration::from_secs(100)).await;
        session.save("Bearer abc", Some("ana")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        session.save("Bearer def", Some("ana")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(538)).await;
        assert!(api.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.calls(), vec!["find:L1"]);

        handle.abort();
    }
}
