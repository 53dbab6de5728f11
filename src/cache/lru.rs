use std::hash::Hash;

use ahash::AHashMap;

use super::entry::CacheEntry;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    entry: CacheEntry<K, V>,
    prev: usize,
    next: usize,
}

/// Arena-backed recency list paired with a key index.
///
/// Entries live in a `Vec` of slots addressed by index; the access order is
/// an intrusive doubly-linked list encoded as `prev`/`next` indices. `head`
/// is the most recently used entry, `tail` the least recently used one.
/// Freed slots are recycled through a free list, so steady-state churn does
/// not allocate.
#[derive(Debug)]
pub(crate) struct LruArena<K, V> {
    index: AHashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<K, V> LruArena<K, V>
where
    K: Hash + Eq + Clone,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            index: AHashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn peek(&self, key: &K) -> Option<&CacheEntry<K, V>> {
        let idx = *self.index.get(key)?;
        self.node(idx).map(|node| &node.entry)
    }

    /// Looks up `key`, moves it to the MRU end and returns its entry.
    pub(crate) fn touch(&mut self, key: &K) -> Option<&mut CacheEntry<K, V>> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.node_mut(idx).map(|node| &mut node.entry)
    }

    /// Inserts a new entry at the MRU end. The key must not be present.
    pub(crate) fn push_front(&mut self, entry: CacheEntry<K, V>) {
        debug_assert!(!self.index.contains_key(&entry.key));
        let key = entry.key.clone();
        let node = Node {
            entry,
            prev: NIL,
            next: self.head,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        if let Some(old_head) = self.node_mut(self.head) {
            old_head.prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
        self.index.insert(key, idx);
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<CacheEntry<K, V>> {
        let idx = self.index.remove(key)?;
        self.release(idx)
    }

    /// Removes and returns the least recently used entry.
    pub(crate) fn pop_back(&mut self) -> Option<CacheEntry<K, V>> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        let entry = self.release(idx)?;
        self.index.remove(&entry.key);
        Some(entry)
    }

    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Iterates entries from most to least recently used.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &CacheEntry<K, V>> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.node(cursor)?;
            cursor = node.next;
            Some(&node.entry)
        })
    }

    fn release(&mut self, idx: usize) -> Option<CacheEntry<K, V>> {
        self.unlink(idx);
        let node = self.slots.get_mut(idx)?.take()?;
        self.free.push(idx);
        Some(node.entry)
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = NIL;
            node.next = old_head;
        }
        if let Some(node) = self.node_mut(old_head) {
            node.prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|node| (node.prev, node.next)) else {
            return;
        };
        match self.node_mut(prev) {
            Some(node) => node.next = next,
            None => self.head = next,
        }
        match self.node_mut(next) {
            Some(node) => node.prev = prev,
            None => self.tail = prev,
        }
        if let Some(node) = self.node_mut(idx) {
            node.prev = NIL;
            node.next = NIL;
        }
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(arena: &LruArena<&'static str, u32>) -> Vec<&'static str> {
        arena.iter().map(|entry| entry.key).collect()
    }

    fn arena_with(keys: &[&'static str]) -> LruArena<&'static str, u32> {
        let mut arena = LruArena::with_capacity(keys.len());
        for (value, key) in keys.iter().enumerate() {
            arena.push_front(CacheEntry::new(*key, value as u32));
        }
        arena
    }

    #[test]
    fn push_front_orders_most_recent_first() {
        let arena = arena_with(&["a", "b", "c"]);
        assert_eq!(keys(&arena), vec!["c", "b", "a"]);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn touch_moves_entry_to_front() {
        let mut arena = arena_with(&["a", "b", "c"]);
        assert!(arena.touch(&"a").is_some());
        assert_eq!(keys(&arena), vec!["a", "c", "b"]);
        assert!(arena.touch(&"b").is_some());
        assert_eq!(keys(&arena), vec!["b", "a", "c"]);
        assert!(arena.touch(&"missing").is_none());
    }

    #[test]
    fn pop_back_takes_least_recent() {
        let mut arena = arena_with(&["a", "b", "c"]);
        arena.touch(&"a");
        let evicted = arena.pop_back().map(|entry| entry.key);
        assert_eq!(evicted, Some("b"));
        assert!(!arena.contains(&"b"));
        assert_eq!(keys(&arena), vec!["a", "c"]);
    }

    #[test]
    fn removing_middle_and_ends_keeps_links_consistent() {
        let mut arena = arena_with(&["a", "b", "c", "d"]);
        assert_eq!(arena.remove(&"b").map(|e| e.value), Some(1));
        assert_eq!(keys(&arena), vec!["d", "c", "a"]);
        arena.remove(&"d");
        arena.remove(&"a");
        assert_eq!(keys(&arena), vec!["c"]);
        arena.remove(&"c");
        assert!(arena.pop_back().is_none());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arena = arena_with(&["a", "b"]);
        arena.remove(&"a");
        arena.push_front(CacheEntry::new("c", 9));
        assert_eq!(arena.slots.len(), 2);
        assert_eq!(keys(&arena), vec!["c", "b"]);
    }
}
