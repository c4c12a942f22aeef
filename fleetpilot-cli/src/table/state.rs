//! Column order, visibility and sort state
//!
//! [`TableState`] holds the user's intent (field order, per-field
//! visibility, a pending sort request) and reconciles it against the field
//! set of every freshly loaded dataset.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::records::aliases::{
    PRIMARY_COLUMN_ALIASES, is_default_visible, is_locked_column, normalize_column_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    /// Anything but `desc` reads as ascending
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort request addressed by field name or normalized key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub dir: SortDirection,
}

/// Column entry of an exported/imported table state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnState {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub key: String,
    #[serde(default = "visible_by_default", deserialize_with = "lenient_visible")]
    pub visible: bool,
}

fn visible_by_default() -> bool {
    true
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string).unwrap_or_default())
}

fn lenient_direction<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SortDirection, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(SortDirection::parse).unwrap_or_default())
}

fn lenient_visible<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_bool().unwrap_or_else(visible_by_default))
}

/// Entries that do not parse are skipped; a non-array reads as absent
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| T::deserialize(item).ok())
            .collect()
    }))
}

/// Non-boolean entries are skipped; a non-object reads as absent
fn lenient_visibility<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, bool>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_object().map(|entries| {
        entries
            .iter()
            .filter_map(|(name, visible)| visible.as_bool().map(|v| (name.clone(), v)))
            .collect()
    }))
}

/// Table state as exchanged with other surfaces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStateUpdate {
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub field_order: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnState>>,
    #[serde(default, deserialize_with = "lenient_visibility", skip_serializing_if = "Option::is_none")]
    pub visibility: Option<BTreeMap<String, bool>>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<SortDescriptor>>,
}

/// Shape written to persistent storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTableState {
    pub field_order: Vec<String>,
    pub visibility: BTreeMap<String, bool>,
}

impl PersistedTableState {
    /// Lenient parse of a stored payload: non-string or blank names and
    /// non-boolean visibility entries are dropped, duplicates removed
    pub fn from_json(value: &Value) -> Self {
        let field_order = value
            .get("fieldOrder")
            .and_then(Value::as_array)
            .map(|items| {
                sanitize_names(items.iter().filter_map(Value::as_str))
            })
            .unwrap_or_default();

        let visibility = value
            .get("visibility")
            .and_then(Value::as_object)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(name, _)| !name.trim().is_empty())
                    .filter_map(|(name, visible)| visible.as_bool().map(|v| (name.clone(), v)))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            field_order,
            visibility,
        }
    }
}

/// Trimmed, non-blank, unique names in first-seen order
pub fn sanitize_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}

/// Primary fields in canonical group order, then the rest in given order
pub fn default_order(field_names: &[String]) -> Vec<String> {
    let mut used: Vec<&String> = Vec::new();
    for group in PRIMARY_COLUMN_ALIASES {
        let matched = field_names
            .iter()
            .find(|name| group.contains(&normalize_column_name(name).as_str()));
        if let Some(name) = matched
            && !used.contains(&name)
        {
            used.push(name);
        }
    }

    let mut ordered: Vec<String> = used.iter().map(|name| (*name).clone()).collect();
    ordered.extend(
        field_names
            .iter()
            .filter(|name| !used.contains(name))
            .cloned(),
    );
    ordered
}

#[derive(Debug, Clone, Default)]
pub struct TableState {
    field_order: Vec<String>,
    visibility: HashMap<String, bool>,
    pending_sort: Option<Vec<SortDescriptor>>,
    /// Show every column when the dataset has no default-visible field
    fallback_all_visible: bool,
}

impl TableState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_persisted(stored: PersistedTableState) -> Self {
        Self {
            field_order: sanitize_names(stored.field_order.iter().map(String::as_str)),
            visibility: stored.visibility.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn field_order(&self) -> &[String] {
        &self.field_order
    }

    pub fn fallback_all_visible(&self) -> bool {
        self.fallback_all_visible
    }

    /// Stored visibility preference of a field, if any
    pub fn stored_visibility(&self, name: &str) -> Option<bool> {
        self.visibility.get(name).copied()
    }

    /// Resolve the display order for a dataset's fields and store it.
    ///
    /// Stored entries still present keep their sequence, then default-order
    /// entries not yet placed, then any leftovers.
    pub fn resolve_order(&mut self, field_names: &[String]) -> Vec<String> {
        if field_names.is_empty() {
            self.field_order.clear();
            return Vec::new();
        }

        let defaults = default_order(field_names);
        if self.field_order.is_empty() {
            self.field_order = defaults;
            return self.field_order.clone();
        }

        let mut available: Vec<&String> = field_names.iter().collect();
        let mut take = |name: &String, ordered: &mut Vec<String>| {
            if let Some(pos) = available.iter().position(|candidate| *candidate == name) {
                ordered.push(available.remove(pos).clone());
            }
        };

        let mut ordered = Vec::with_capacity(field_names.len());
        for name in &self.field_order {
            take(name, &mut ordered);
        }
        for name in &defaults {
            take(name, &mut ordered);
        }
        ordered.extend(available.into_iter().cloned());

        self.field_order = ordered.clone();
        ordered
    }

    /// Resolve per-column visibility for the ordered columns and store it.
    ///
    /// Preferences for vanished fields are discarded. Locked columns are
    /// forced visible.
    pub fn resolve_visibility(&mut self, columns: &[String]) -> Vec<bool> {
        let present: HashSet<&str> = columns.iter().map(String::as_str).collect();
        self.visibility.retain(|name, _| present.contains(name.as_str()));

        self.fallback_all_visible =
            columns.is_empty() || !columns.iter().any(|name| is_default_visible(name));

        columns
            .iter()
            .map(|name| {
                let default_visible = is_default_visible(name) || self.fallback_all_visible;
                let stored = self.visibility.get(name).copied().unwrap_or(default_visible);
                let visible = is_locked_column(name) || stored;
                self.visibility.insert(name.clone(), visible);
                visible
            })
            .collect()
    }

    /// Full reconciliation: order then visibility
    pub fn reconcile(&mut self, field_names: &[String]) -> (Vec<String>, Vec<bool>) {
        let order = self.resolve_order(field_names);
        let visibility = self.resolve_visibility(&order);
        (order, visibility)
    }

    pub fn is_visible(&self, name: &str) -> bool {
        if is_locked_column(name) {
            return true;
        }
        self.visibility
            .get(name)
            .copied()
            .unwrap_or_else(|| is_default_visible(name) || self.fallback_all_visible)
    }

    /// Set a column's visibility. Locked columns stay visible.
    /// Returns whether the stored value changed.
    pub fn set_visible(&mut self, name: &str, visible: bool) -> bool {
        let visible = visible || is_locked_column(name);
        let previous = self.visibility.insert(name.to_string(), visible);
        previous != Some(visible)
    }

    /// Show or hide every given column (locked columns stay visible)
    pub fn set_all_visible(&mut self, columns: &[String], visible: bool) -> bool {
        columns
            .iter()
            .fold(false, |changed, name| self.set_visible(name, visible) || changed)
    }

    /// Forget stored order and visibility
    pub fn reset(&mut self) {
        self.field_order.clear();
        self.visibility.clear();
        self.pending_sort = None;
    }

    /// Move a column within the field order.
    ///
    /// `to` is an insertion slot in `0..=len`; dropping onto the slot the
    /// column already occupies is a no-op. Returns whether the order changed.
    pub fn move_column(&mut self, from: usize, to: usize) -> bool {
        let len = self.field_order.len();
        if len < 2 {
            return false;
        }
        let from = from.min(len - 1);
        let mut to = to.min(len);
        if to > from {
            to -= 1;
        }
        if to == from {
            return false;
        }
        let name = self.field_order.remove(from);
        self.field_order.insert(to, name);
        true
    }

    pub fn set_pending_sort(&mut self, sort: Option<Vec<SortDescriptor>>) {
        self.pending_sort = sort.filter(|descriptors| !descriptors.is_empty());
    }

    pub fn has_pending_sort(&self) -> bool {
        self.pending_sort.is_some()
    }

    /// Map the pending sort onto column positions and clear it.
    ///
    /// Each descriptor is matched by name first, then by key; descriptors
    /// matching no column are dropped.
    pub fn take_pending_sort(&mut self, columns: &[(String, String)]) -> Vec<(usize, SortDirection)> {
        let Some(pending) = self.pending_sort.take() else {
            return Vec::new();
        };

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (position, (name, key)) in columns.iter().enumerate() {
            index.insert(name.as_str(), position);
            index.insert(key.as_str(), position);
        }

        pending
            .iter()
            .filter_map(|descriptor| {
                index
                    .get(descriptor.name.as_str())
                    .or_else(|| index.get(descriptor.key.as_str()))
                    .map(|position| (*position, descriptor.dir))
            })
            .collect()
    }

    /// Payload to persist. With `active_columns`, only those fields are kept.
    pub fn to_persisted(&self, active_columns: Option<&[String]>) -> PersistedTableState {
        let mut field_order = sanitize_names(self.field_order.iter().map(String::as_str));
        let mut visibility: BTreeMap<String, bool> = self
            .visibility
            .iter()
            .filter(|(name, _)| !name.trim().is_empty())
            .map(|(name, visible)| (name.clone(), *visible))
            .collect();

        if let Some(active) = active_columns.filter(|columns| !columns.is_empty()) {
            let allowed: HashSet<&str> = active.iter().map(String::as_str).collect();
            field_order.retain(|name| allowed.contains(name.as_str()));
            visibility.retain(|name, _| allowed.contains(name.as_str()));
        }

        PersistedTableState {
            field_order,
            visibility,
        }
    }

    /// Merge an externally supplied state. Returns whether the structure
    /// (order or visibility) changed; the sort part only sets the pending sort.
    pub fn apply_update(&mut self, update: TableStateUpdate) -> bool {
        let mut structure_changed = false;

        let columns: Vec<ColumnState> = update
            .columns
            .unwrap_or_default()
            .into_iter()
            .map(|column| ColumnState {
                name: column.name.trim().to_string(),
                key: column.key.trim().to_string(),
                visible: column.visible,
            })
            .filter(|column| !column.name.is_empty())
            .collect();

        if !columns.is_empty() {
            let ordered = sanitize_names(columns.iter().map(|c| c.name.as_str()));
            if !ordered.is_empty() {
                self.field_order = ordered;
            }
            for column in &columns {
                self.visibility.insert(column.name.clone(), column.visible);
            }
            structure_changed = true;
        } else if let Some(order) = update.field_order {
            let ordered = sanitize_names(order.iter().map(String::as_str));
            if !ordered.is_empty() {
                self.field_order = ordered;
                structure_changed = true;
            }
        }

        for (name, visible) in update.visibility.unwrap_or_default() {
            let name = name.trim();
            if !name.is_empty() {
                self.visibility.insert(name.to_string(), visible);
                structure_changed = true;
            }
        }

        let sort = update.order.map(|descriptors| {
            descriptors
                .into_iter()
                .map(|d| SortDescriptor {
                    name: d.name.trim().to_string(),
                    key: d.key.trim().to_string(),
                    dir: d.dir,
                })
                .filter(|d| !d.name.is_empty() || !d.key.is_empty())
                .collect()
        });
        self.set_pending_sort(sort);

        structure_changed
    }
}
