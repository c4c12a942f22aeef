//! Typed publish/subscribe between the table, the session and any other
//! surface interested in them

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::api::models::Record;

const CHANNEL_CAPACITY: usize = 64;

/// Notifications emitted by the table controller
#[derive(Debug, Clone)]
pub enum TableEvent {
    /// A freshly normalized record set, shared with sibling surfaces
    Data {
        layout: String,
        records: Arc<Vec<Record>>,
    },
    Ready,
    Draw,
    Destroy,
    /// Selection changed; `record_key` is `None` when cleared
    Select {
        record_key: Option<String>,
        record_id: Option<String>,
        display_name: Option<String>,
    },
}

/// Session lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Logout,
    SessionChanged,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    table: broadcast::Sender<TableEvent>,
    auth: broadcast::Sender<AuthEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (table, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (auth, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { table, auth }
    }

    pub fn subscribe_table(&self) -> broadcast::Receiver<TableEvent> {
        self.table.subscribe()
    }

    pub fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth.subscribe()
    }

    /// Publishing without subscribers is not an error
    pub fn publish_table(&self, event: TableEvent) {
        if self.table.send(event).is_err() {
            log::trace!("No table event subscribers");
        }
    }

    pub fn publish_auth(&self, event: AuthEvent) {
        if self.auth.send(event).is_err() {
            log::trace!("No auth event subscribers");
        }
    }
}
