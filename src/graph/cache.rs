/// In-process LRU+TTL cache for the graph query service (§4.4), keyed on
/// method name plus a hash of normalised arguments.
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 256;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct Entry<V> {
    value: V,
    repository: String,
    inserted_at: Instant,
    last_used: u64,
}

pub struct QueryCache<V> {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<(String, u64), Entry<V>>>,
    clock: Mutex<u64>,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: Mutex::new(HashMap::new()),
            clock: Mutex::new(0),
        }
    }

    pub fn get(&self, method: &str, args: &impl Serialize) -> Option<V> {
        let key = cache_key(method, args);
        let mut entries = self.entries.lock().unwrap();
        let expired = entries.get(&key).map(|e| e.inserted_at.elapsed() > self.ttl).unwrap_or(false);
        if expired {
            entries.remove(&key);
            return None;
        }
        let tick = self.tick();
        entries.get_mut(&key).map(|e| {
            e.last_used = tick;
            e.value.clone()
        })
    }

    /// `repository` scopes this entry for coarse invalidation; callers pass
    /// the repository the query targeted even though it's also folded into
    /// `args`.
    pub fn put(&self, method: &str, args: &impl Serialize, repository: &str, value: V) {
        let key = cache_key(method, args);
        let tick = self.tick();
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            if let Some(lru_key) = entries.iter().min_by_key(|(_, e)| e.last_used).map(|(k, _)| k.clone()) {
                entries.remove(&lru_key);
            }
        }
        entries.insert(
            key,
            Entry { value, repository: repository.to_owned(), inserted_at: Instant::now(), last_used: tick },
        );
    }

    /// Removes every entry scoped to `repository` — the coarse
    /// per-repository invalidation (§4.4).
    pub fn clear_for_repository(&self, repository: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| entry.repository != repository);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn tick(&self) -> u64 {
        let mut clock = self.clock.lock().unwrap();
        *clock += 1;
        *clock
    }
}

fn cache_key(method: &str, args: &impl Serialize) -> (String, u64) {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(args).unwrap_or_default().hash(&mut hasher);
    (method.to_owned(), hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips_within_ttl() {
        let cache: QueryCache<i32> = QueryCache::new(4, Duration::from_secs(60));
        cache.put("getDependencies", &json!({"repo": "a"}), "a", 42);
        assert_eq!(cache.get("getDependencies", &json!({"repo": "a"})), Some(42));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache: QueryCache<i32> = QueryCache::new(4, Duration::from_millis(1));
        cache.put("getDependencies", &json!({"repo": "a"}), "a", 42);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("getDependencies", &json!({"repo": "a"})), None);
    }

    #[test]
    fn capacity_overflow_evicts_least_recently_used() {
        let cache: QueryCache<i32> = QueryCache::new(2, Duration::from_secs(60));
        cache.put("m", &json!(1), "a", 1);
        cache.put("m", &json!(2), "a", 2);
        cache.get("m", &json!(1));
        cache.put("m", &json!(3), "a", 3);
        assert_eq!(cache.get("m", &json!(2)), None);
        assert_eq!(cache.get("m", &json!(1)), Some(1));
        assert_eq!(cache.get("m", &json!(3)), Some(3));
    }

    #[test]
    fn distinct_bool_flags_produce_distinct_keys() {
        let cache: QueryCache<i32> = QueryCache::new(4, Duration::from_secs(60));
        cache.put("getArchitecture", &json!({"repo": "a", "include_external": true}), "a", 1);
        assert_eq!(cache.get("getArchitecture", &json!({"repo": "a", "include_external": false})), None);
    }

    #[test]
    fn clear_for_repository_invalidates_only_that_repository() {
        let cache: QueryCache<i32> = QueryCache::new(4, Duration::from_secs(60));
        cache.put("getDependencies", &json!({"repo": "a"}), "a", 1);
        cache.put("getDependencies", &json!({"repo": "b"}), "b", 2);
        cache.clear_for_repository("a");
        assert_eq!(cache.get("getDependencies", &json!({"repo": "a"})), None);
        assert_eq!(cache.get("getDependencies", &json!({"repo": "b"})), Some(2));
    }
}
