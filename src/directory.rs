//! Board-wide item directory and the one-time setup pass.
//!
//! Items are added at startup, set up together once the links exist and
//! torn down together before shutdown. The console looks items up here by
//! name.

use std::sync::Arc;

use tracing::{info, warn};

use crate::item::DynItem;

#[derive(Default)]
pub struct ItemDirectory {
    items: Vec<Arc<dyn DynItem>>,
}

impl ItemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Returns `false` (and ignores it) if the name is taken.
    pub fn add(&mut self, item: Arc<dyn DynItem>) -> bool {
        if self.find(item.name()).is_some() {
            warn!(item = %item.name(), "duplicate item name ignored");
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn DynItem>> {
        self.items.iter().find(|i| i.name() == name)
    }

    /// Items whose name starts with `prefix`.
    pub fn matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Arc<dyn DynItem>> + 'a {
        self.items.iter().filter(move |i| i.name().starts_with(prefix))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DynItem>> {
        self.items.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.name())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run every item's setup.
    ///
    /// # Returns
    ///
    /// Number of items that came up.
    pub fn setup_all(&self) -> usize {
        let ready = self.items.iter().filter(|i| i.setup()).count();
        if ready < self.items.len() {
            warn!(ready, total = self.items.len(), "some items failed setup");
        } else {
            info!(ready, "all items ready");
        }
        ready
    }

    /// Tear down in reverse order of addition.
    pub fn teardown_all(&self) {
        for item in self.items.iter().rev() {
            item.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SyncItem;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut dir = ItemDirectory::new();
        assert!(dir.add(SyncItem::builder("a", [0u8]).build().unwrap()));
        assert!(!dir.add(SyncItem::builder("a", [1u8]).build().unwrap()));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_setup_all_counts_ready() {
        let mut dir = ItemDirectory::new();
        dir.add(SyncItem::builder("Amplitude Gain", [1.0f32]).build().unwrap());
        dir.add(SyncItem::builder("FFT Gain", [1.7f32]).build().unwrap());
        assert_eq!(dir.setup_all(), 2);
        assert_eq!(dir.matching("FFT").count(), 1);
        dir.teardown_all();
    }
}
