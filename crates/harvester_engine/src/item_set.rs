use dashmap::DashSet;

/// Concurrent, deduplicating set of item keys shared by all workers of one harvest.
#[derive(Debug, Default)]
pub struct ItemSet {
    keys: DashSet<String>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key was not present yet.
    pub fn insert(&self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    /// Snapshot of all keys in ascending order.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().map(|key| key.key().clone()).collect();
        keys.sort_unstable();
        keys
    }
}
