use lru::LruCache;

use super::CacheKey;

/// Write-ordered set of keys with the byte size of each entry.
///
/// Entries are only ever promoted by [`CacheIndex::insert`], never by reads,
/// so the least recently used end of the LRU list is the oldest write.
#[derive(Debug)]
pub(super) struct CacheIndex {
    order: LruCache<CacheKey, u64>,
    current_size: u64,
}

impl CacheIndex {
    pub(super) fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
            current_size: 0,
        }
    }

    pub(super) fn reset(&mut self) {
        self.order.clear();
        self.current_size = 0;
    }

    pub(super) fn contains(&self, key: &CacheKey) -> bool {
        self.order.contains(key)
    }

    pub(super) fn size_of(&self, key: &CacheKey) -> Option<u64> {
        self.order.peek(key).copied()
    }

    /// Appends `key` at the newest end, replacing any previous occurrence.
    /// Returns the size of the replaced entry.
    pub(super) fn insert(&mut self, key: CacheKey, size: u64) -> Option<u64> {
        let previous = self.remove(&key);
        self.order.push(key, size);
        self.current_size = self.current_size.saturating_add(size);
        previous
    }

    pub(super) fn remove(&mut self, key: &CacheKey) -> Option<u64> {
        let removed = self.order.pop(key)?;
        self.current_size = self.current_size.saturating_sub(removed);
        Some(removed)
    }

    pub(super) fn pop_oldest(&mut self) -> Option<(CacheKey, u64)> {
        let (key, size) = self.order.pop_lru()?;
        self.current_size = self.current_size.saturating_sub(size);
        Some((key, size))
    }

    pub(super) fn exceeds(&self, max_size: u64) -> bool {
        self.current_size > max_size
    }

    pub(super) fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Keys oldest first.
    pub(super) fn keys(&self) -> Vec<CacheKey> {
        self.order.iter().rev().map(|(key, _)| key.clone()).collect()
    }

    /// Keys oldest first, each with its recorded size.
    pub(super) fn entries(&self) -> Vec<(CacheKey, u64)> {
        self.order
            .iter()
            .rev()
            .map(|(key, size)| (key.clone(), *size))
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    fn set_current_size(&mut self, size: u64) {
        self.current_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> CacheKey {
        CacheKey::for_url(url)
    }

    #[test]
    fn pops_in_write_order() {
        let mut index = CacheIndex::new();
        index.insert(key("a://a"), 10);
        index.insert(key("b://b"), 20);
        index.insert(key("c://c"), 30);
        assert_eq!(index.current_size(), 60);
        assert_eq!(index.keys(), vec![key("a://a"), key("b://b"), key("c://c")]);

        assert_eq!(index.pop_oldest(), Some((key("a://a"), 10)));
        assert_eq!(index.current_size(), 50);
        assert_eq!(index.pop_oldest(), Some((key("b://b"), 20)));
        assert_eq!(index.pop_oldest(), Some((key("c://c"), 30)));
        assert_eq!(index.pop_oldest(), None);
        assert_eq!(index.current_size(), 0);
    }

    #[test]
    fn reinsert_moves_key_to_newest_and_replaces_size() {
        let mut index = CacheIndex::new();
        index.insert(key("a://a"), 10);
        index.insert(key("b://b"), 20);
        assert_eq!(index.insert(key("a://a"), 5), Some(10));
        assert_eq!(index.len(), 2);
        assert_eq!(index.current_size(), 25);
        assert_eq!(index.keys(), vec![key("b://b"), key("a://a")]);
    }

    #[test]
    fn lookups_do_not_change_order() {
        let mut index = CacheIndex::new();
        index.insert(key("a://a"), 1);
        index.insert(key("b://b"), 1);
        assert!(index.contains(&key("a://a")));
        assert_eq!(index.size_of(&key("a://a")), Some(1));
        assert_eq!(index.pop_oldest().map(|(k, _)| k), Some(key("a://a")));
    }

    #[test]
    fn size_never_goes_negative() {
        let mut index = CacheIndex::new();
        index.insert(key("a://a"), 100);
        index.set_current_size(10);
        assert_eq!(index.remove(&key("a://a")), Some(100));
        assert_eq!(index.current_size(), 0);
        assert_eq!(index.remove(&key("a://a")), None);
        assert!(!index.exceeds(0));
    }
}
