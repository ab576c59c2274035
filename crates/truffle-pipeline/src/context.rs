use std::collections::HashMap;

/// Cached text and matched skills of a thread parent, kept so replies
/// processed later in the same run can inherit the topic.
#[derive(Debug, Clone)]
pub struct ParentContext {
    pub text: String,
    pub skills: Vec<String>,
}

/// Bounded LRU for parent contexts. Grows with the number of threads seen
/// in a run; the cap keeps a long backfill from holding every parent ever
/// observed.
pub struct ThreadContextCache {
    map: HashMap<String, Entry>,
    seq: u64,
    capacity: usize,
}

struct Entry {
    seq: u64,
    context: ParentContext,
}

pub const DEFAULT_CAPACITY: usize = 10_000;

impl ThreadContextCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            seq: 0,
            capacity,
        }
    }

    pub fn insert(&mut self, thread_id: &str, context: ParentContext) {
        if !self.map.contains_key(thread_id) && self.map.len() >= self.capacity {
            // Evict the least recently used entry
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                self.map.remove(&k);
            }
        }
        self.seq += 1;
        self.map.insert(
            thread_id.to_string(),
            Entry {
                seq: self.seq,
                context,
            },
        );
    }

    pub fn get(&mut self, thread_id: &str) -> Option<&ParentContext> {
        self.seq += 1;
        let seq = self.seq;
        let entry = self.map.get_mut(thread_id)?;
        entry.seq = seq;
        Some(&entry.context)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for ThreadContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(text: &str) -> ParentContext {
        ParentContext {
            text: text.to_string(),
            skills: vec!["redis".to_string()],
        }
    }

    #[test]
    fn stores_and_returns_contexts() {
        let mut cache = ThreadContextCache::new(10);
        cache.insert("100.1", ctx("redis question"));
        assert_eq!(cache.get("100.1").unwrap().text, "redis question");
        assert!(cache.get("200.1").is_none());
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let mut cache = ThreadContextCache::new(2);
        cache.insert("a", ctx("a"));
        cache.insert("b", ctx("b"));
        // touch "a" so "b" is the LRU entry
        cache.get("a");
        cache.insert("c", ctx("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn reinserting_existing_key_does_not_evict() {
        let mut cache = ThreadContextCache::new(2);
        cache.insert("a", ctx("a"));
        cache.insert("b", ctx("b"));
        cache.insert("a", ctx("a2"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().text, "a2");
        assert!(cache.get("b").is_some());
    }
}
