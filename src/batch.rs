//! Ordered delivery batches and segment labels

use serde::{Deserialize, Serialize};

/// Marker stripped from segment file names to derive the `FileLabel`
pub const AUDIT_FILE_MARKER: &str = "_Audit";

/// Label key attached to every log write
pub const FILE_LABEL_KEY: &str = "FileLabel";

/// What happens to a batch when its transport call fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClearPolicy {
    /// Clear after every transport call, successful or not
    #[default]
    Always,
    /// Keep the batch intact when the transport fails
    OnSuccess,
}

/// An ordered, exclusively owned sequence of items awaiting delivery
///
/// Insertion order is delivery order; nothing is reordered or deduplicated.
#[derive(Debug, Clone)]
pub struct DeliveryBatch<T> {
    items: Vec<T>,
}

impl<T> DeliveryBatch<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append an item
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Remove and return every item, leaving the batch empty
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Put items taken for a failed delivery back in front of anything
    /// accumulated since
    pub fn restore(&mut self, mut items: Vec<T>) {
        items.append(&mut self.items);
        self.items = items;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Default for DeliveryBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the segment label: everything before the first `_Audit`, or the
/// whole name when the marker is absent
pub fn file_label(file_name: &str) -> String {
    match file_name.find(AUDIT_FILE_MARKER) {
        Some(idx) => file_name[..idx].to_string(),
        None => file_name.to_string(),
    }
}
