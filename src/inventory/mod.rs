//! Host inventory: the ordered set of targets a run fans out over.
//!
//! The inventory is loaded from a JSON array of items, keyed by
//! `connection.host`. Host uniqueness is enforced on load and on every
//! mutation, and insertion order is preserved because the final flattened
//! response log concatenates per-host logs in inventory order.

mod item;

pub use item::{
    Authentication, ConnectionParams, HostContext, InventoryItem, SessionOptions, ALL_GROUP,
};

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Result type alias for inventory operations.
pub type InventoryResult<T> = std::result::Result<T, InventoryError>;

/// Errors raised while loading or mutating an inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read inventory '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid inventory JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid inventory: expected a JSON array of items")]
    NotAnArray,

    #[error("invalid inventory: item {index} has a missing or empty connection host")]
    MissingHost { index: usize },

    #[error("duplicate host: {0}")]
    DuplicateHost(String),

    #[error("host not found: {0}")]
    UnknownHost(String),
}

/// Ordered collection of unique hosts.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    items: IndexMap<String, InventoryItem>,
}

impl Inventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an inventory from items, enforcing host uniqueness and the
    /// implicit `all` membership.
    pub fn from_items(
        items: impl IntoIterator<Item = InventoryItem>,
    ) -> InventoryResult<Self> {
        let mut inventory = Self::new();
        for (index, item) in items.into_iter().enumerate() {
            if item.connection.host.trim().is_empty() {
                return Err(InventoryError::MissingHost { index });
            }
            inventory.add(item)?;
        }
        Ok(inventory)
    }

    /// Loads an inventory from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> InventoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let inventory = Self::from_json(&text)?;
        debug!(
            path = %path.display(),
            hosts = inventory.len(),
            "loaded inventory"
        );
        Ok(inventory)
    }

    /// Parses an inventory from JSON text. The top level must be an array.
    pub fn from_json(text: &str) -> InventoryResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_array() {
            return Err(InventoryError::NotAnArray);
        }
        let items: Vec<InventoryItem> = serde_json::from_value(value)?;
        Self::from_items(items)
    }

    /// Serializes the inventory back to a JSON array.
    pub fn to_json(&self) -> InventoryResult<String> {
        let items: Vec<&InventoryItem> = self.items.values().collect();
        Ok(serde_json::to_string_pretty(&items)?)
    }

    /// Adds a host. Fails when the host key is already present.
    pub fn add(&mut self, mut item: InventoryItem) -> InventoryResult<()> {
        if item.connection.host.trim().is_empty() {
            return Err(InventoryError::MissingHost {
                index: self.items.len(),
            });
        }
        item.normalize();
        let key = item.host().to_string();
        if self.items.contains_key(&key) {
            return Err(InventoryError::DuplicateHost(key));
        }
        self.items.insert(key, item);
        Ok(())
    }

    /// Replaces an existing host entry. Fails when the host is unknown.
    pub fn update(&mut self, mut item: InventoryItem) -> InventoryResult<()> {
        item.normalize();
        let key = item.host().to_string();
        match self.items.get_mut(&key) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(InventoryError::UnknownHost(key)),
        }
    }

    /// Removes a host, preserving the order of the remaining entries.
    pub fn remove(&mut self, host: &str) -> Option<InventoryItem> {
        self.items.shift_remove(host)
    }

    /// Looks up a host by key.
    pub fn get(&self, host: &str) -> Option<&InventoryItem> {
        self.items.get(host)
    }

    /// Iterates items in inventory order.
    pub fn items(&self) -> impl Iterator<Item = &InventoryItem> {
        self.items.values()
    }

    /// Iterates host keys in inventory order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Iterates the items belonging to `group`, in inventory order.
    pub fn hosts_in_group<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'a InventoryItem> + 'a {
        self.items.values().filter(move |item| item.in_group(group))
    }

    /// Number of hosts.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when the inventory holds no hosts.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
