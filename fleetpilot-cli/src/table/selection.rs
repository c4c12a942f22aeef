//! Single-row selection and its session snapshot

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::api::models::Record;

/// Denormalized selection stored in the session namespace so another
/// surface can restore the same context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSelection {
    #[serde(default)]
    pub layout: String,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub saved_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default)]
    pub field_order: Vec<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
}

impl StoredSelection {
    /// Key to restore: `key`, else `recordKey`
    pub fn preferred_key(&self) -> Option<&str> {
        self.key
            .as_deref()
            .or(self.record_key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn stored_record_id(&self) -> Option<&str> {
        self.record_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    key: Option<String>,
}

impl Selection {
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key)
    }

    /// Click semantics: select, or deselect when already selected.
    /// Returns the new selection.
    pub fn toggle(&mut self, key: &str) -> Option<&str> {
        if self.is_selected(key) {
            self.key = None;
        } else {
            self.key = Some(key.to_string());
        }
        self.key.as_deref()
    }

    pub fn select(&mut self, key: &str) {
        self.key = Some(key.to_string());
    }

    /// Returns whether something was selected
    pub fn clear(&mut self) -> bool {
        self.key.take().is_some()
    }

    /// Drop the selection when its key is no longer present.
    /// Returns whether it was dropped.
    pub fn retain<V>(&mut self, keys: &HashMap<String, V>) -> bool {
        match &self.key {
            Some(key) if !keys.contains_key(key) => {
                self.key = None;
                true
            }
            _ => false,
        }
    }

    /// Restore from a stored snapshot: the stored key when present, else a
    /// row whose record id matches the stored record id
    pub fn restore<'a>(
        &mut self,
        stored: &StoredSelection,
        rows: impl IntoIterator<Item = (&'a str, Option<&'a str>)> + Clone,
    ) -> bool {
        if let Some(key) = stored.preferred_key()
            && rows.clone().into_iter().any(|(row_key, _)| row_key == key)
        {
            self.key = Some(key.to_string());
            return true;
        }

        let Some(record_id) = stored.stored_record_id() else {
            return false;
        };
        let by_id = rows
            .clone()
            .into_iter()
            .find(|(_, id)| *id == Some(record_id))
            .or_else(|| rows.into_iter().find(|(row_key, _)| *row_key == record_id));
        match by_id {
            Some((row_key, _)) => {
                self.key = Some(row_key.to_string());
                true
            }
            None => false,
        }
    }
}
