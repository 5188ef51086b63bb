use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;

struct LruState<K, V> {
    map: HashMap<K, V>,
    /// Recency order, LRU at the front, MRU at the back.
    order: VecDeque<K>,
}

/// A bounded, strictly-LRU cache shared by the prepared-shape cache and the
/// reader-plan cache (one generic primitive, two key/value shapes, per the
/// "reuse a single cache primitive across subsystems" pattern). A single
/// mutex around both the map and the recency queue gives single-flight
/// semantics for free: the value factory passed to `get_or_insert_with`
/// runs while the lock is held, so concurrent callers for the same key
/// never run it more than once — at the cost of serializing unrelated
/// keys during that call, which is acceptable at this cache's scale.
pub struct LruCache<K, V> {
    capacity: usize,
    state: Mutex<LruState<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LRU cache capacity must be positive");
        Self {
            capacity,
            state: Mutex::new(LruState {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.state).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Touching on a hit promotes the key to MRU.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = lock(&self.state);
        if let Some(value) = state.map.get(key).cloned() {
            touch(&mut state.order, key);
            Some(value)
        } else {
            None
        }
    }

    /// Returns the cached value, or computes and inserts it via `factory`
    /// on a miss, evicting the LRU entry first if at capacity.
    pub fn get_or_insert_with(&self, key: K, factory: impl FnOnce() -> V) -> V {
        let mut state = lock(&self.state);

        if let Some(value) = state.map.get(&key).cloned() {
            touch(&mut state.order, &key);
            return value;
        }

        let value = factory();
        insert_locked(&mut state, self.capacity, key, value.clone());
        value
    }

    /// Inserts or overwrites `key`, returning the number of entries evicted
    /// to stay within capacity (0 or 1, since one insert grows the set by
    /// at most one entry).
    pub fn insert(&self, key: K, value: V) -> usize {
        let mut state = lock(&self.state);
        insert_locked(&mut state, self.capacity, key, value)
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.map.clear();
        state.order.clear();
    }
}

fn insert_locked<K: Eq + Hash + Clone, V>(
    state: &mut LruState<K, V>,
    capacity: usize,
    key: K,
    value: V,
) -> usize {
    let is_new_key = !state.map.contains_key(&key);
    state.map.insert(key.clone(), value);
    touch(&mut state.order, &key);

    if is_new_key && state.map.len() > capacity {
        if let Some(lru_key) = state.order.pop_front() {
            state.map.remove(&lru_key);
            return 1;
        }
    }
    0
}

fn touch<K: Eq + Hash + Clone>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
    order.push_back(key.clone());
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_removes_lru_not_oldest_inserted() {
        let cache: LruCache<i32, i32> = LruCache::new(3);
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);

        // touch key 1 so it becomes MRU before the next insert
        assert_eq!(cache.get(&1), Some(1));

        let evicted = cache.insert(4, 4);
        assert_eq!(evicted, 1);

        assert_eq!(cache.get(&2), None);
        assert!(cache.get(&1).is_some());
        assert!(cache.get(&3).is_some());
        assert!(cache.get(&4).is_some());
    }

    #[test]
    fn get_or_insert_with_runs_factory_once_per_key() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cache: LruCache<&str, i32> = LruCache::new(4);
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_insert_with("a", || {
            calls.fetch_add(1, Ordering::Relaxed);
            42
        });
        let second = cache.get_or_insert_with("a", || {
            calls.fetch_add(1, Ordering::Relaxed);
            99
        });

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache: LruCache<i32, i32> = LruCache::new(2);
        cache.insert(1, 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
