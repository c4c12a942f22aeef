//! Best-effort persistence of table state and the selection snapshot
//!
//! Storage failures are logged and swallowed; the table keeps working with
//! in-memory state.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::selection::StoredSelection;
use super::state::PersistedTableState;
use crate::config::repository::{KeyValueStore, Namespace};

static UNSAFE_KEY_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-z0-9_-]+").unwrap_or_else(|e| panic!("invalid storage key pattern: {}", e))
});

const ANONYMOUS_USER: &str = "anonimo";

/// `<prefix>:<user>:<layout>` with the user reduced to `[a-z0-9_-]`
pub fn storage_key(prefix: &str, user: Option<&str>, layout: &str) -> String {
    let user = user.map(|u| u.trim().to_lowercase()).unwrap_or_default();
    let user = UNSAFE_KEY_CHARS.replace_all(&user, "_");
    let user = if user.is_empty() { ANONYMOUS_USER } else { user.as_ref() };
    format!("{}:{}:{}", prefix, user, layout)
}

/// Stored table state, or `None` when missing or unreadable
pub async fn load_state(store: &dyn KeyValueStore, key: &str) -> Option<PersistedTableState> {
    let raw = match store.get(Namespace::Local, key).await {
        Ok(raw) => raw?,
        Err(e) => {
            log::warn!("Failed to read table state {}: {:#}", key, e);
            return None;
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => Some(PersistedTableState::from_json(&value)),
        Err(e) => {
            log::warn!("Ignoring malformed table state {}: {}", key, e);
            None
        }
    }
}

pub async fn save_state(store: &dyn KeyValueStore, key: &str, state: &PersistedTableState) {
    let payload = match serde_json::to_string(state) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("Failed to encode table state: {}", e);
            return;
        }
    };
    if let Err(e) = store.set(Namespace::Local, key, &payload).await {
        log::warn!("Failed to persist table state {}: {:#}", key, e);
    }
}

pub async fn clear_state(store: &dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(Namespace::Local, key).await {
        log::warn!("Failed to clear table state {}: {:#}", key, e);
    }
}

pub async fn load_selection(store: &dyn KeyValueStore, key: &str) -> Option<StoredSelection> {
    let raw = match store.get(Namespace::Session, key).await {
        Ok(raw) => raw?,
        Err(e) => {
            log::warn!("Failed to read stored selection: {:#}", e);
            return None;
        }
    };
    serde_json::from_str(&raw)
        .map_err(|e| log::warn!("Ignoring malformed stored selection: {}", e))
        .ok()
}

pub async fn save_selection(store: &dyn KeyValueStore, key: &str, selection: &StoredSelection) {
    match serde_json::to_string(selection) {
        Ok(payload) => {
            if let Err(e) = store.set(Namespace::Session, key, &payload).await {
                log::warn!("Failed to store selection: {:#}", e);
            }
        }
        Err(e) => log::warn!("Failed to encode selection: {}", e),
    }
}

pub async fn clear_selection(store: &dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(Namespace::Session, key).await {
        log::warn!("Failed to clear stored selection: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::MemoryKvStore;
    use std::collections::BTreeMap;

    #[test]
    fn test_storage_key_sanitizes_user() {
        assert_eq!(
            storage_key("clientesTable.state", Some(" Ana.Pérez@Flota "), "clientes"),
            "clientesTable.state:ana_p_rez_flota:clientes"
        );
        assert_eq!(storage_key("p", Some("  "), "l"), "p:anonimo:l");
        assert_eq!(storage_key("p", None, "l"), "p:anonimo:l");
        assert_eq!(storage_key("p", Some("jose_2-b"), "l"), "p:jose_2-b:l");
    }

    #[tokio::test]
    async fn test_state_round_trip_and_malformed_payload() {
        let store = MemoryKvStore::new();
        let state = PersistedTableState {
            field_order: vec!["nombreCompleto".into(), "placa".into()],
            visibility: BTreeMap::from([("placa".to_string(), false)]),
        };
        save_state(&store, "k", &state).await;
        assert_eq!(load_state(&store, "k").await, Some(state));

        store.set(Namespace::Local, "k", "{not json").await.unwrap();
        assert_eq!(load_state(&store, "k").await, None);

        store
            .set(Namespace::Local, "k", r#"{"fieldOrder":["a",3," ","a"],"visibility":{"a":"yes","b":true}}"#)
            .await
            .unwrap();
        let loaded = load_state(&store, "k").await.unwrap();
        assert_eq!(loaded.field_order, vec!["a"]);
        assert_eq!(loaded.visibility, BTreeMap::from([("b".to_string(), true)]));

        clear_state(&store, "k").await;
        assert_eq!(load_state(&store, "k").await, None);
    }

    #[tokio::test]
    async fn test_selection_lives_in_session_namespace() {
        let store = MemoryKvStore::new();
        let selection = StoredSelection {
            layout: "clientes".into(),
            record_key: Some("uuid-1".into()),
            display_name: "Ana".into(),
            ..StoredSelection::default()
        };
        save_selection(&store, "sel", &selection).await;
        assert_eq!(load_selection(&store, "sel").await, Some(selection));
        assert!(store.get(Namespace::Local, "sel").await.unwrap().is_none());

        store.clear(Namespace::Session).await.unwrap();
        assert_eq!(load_selection(&store, "sel").await, None);
    }
}
