use std::collections::{HashSet, VecDeque};

use crate::domain::DispatchItem;

/// Strict FIFO of pending dispatches. No priorities: a blocked head stays at
/// the head. A listing is held at most once.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    items: VecDeque<DispatchItem>,
    keys: HashSet<String>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&mut self, batch: impl IntoIterator<Item = DispatchItem>) -> usize {
        let before = self.items.len();
        for item in batch {
            if self.keys.insert(item.dedupe_key().to_string()) {
                self.items.push_back(item);
            }
        }
        self.items.len() - before
    }

    pub fn pop(&mut self) -> Option<DispatchItem> {
        let item = self.items.pop_front()?;
        self.keys.remove(item.dedupe_key());
        Some(item)
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.url.as_str()).collect()
    }
}
