// 版本化结果缓存：LRU 容量上限 + 绝对 TTL，并按最近变更时间校验有效性。
use super::*;

#[derive(Debug, Clone)]
struct CacheEntry {
    placement: Placement,
    computed_at: f64,
}

pub struct VersionedCache {
    entries: ParkingMutex<LruCache<String, CacheEntry>>,
    ttl_s: f64,
}

impl VersionedCache {
    pub fn new(max_size: usize, ttl_s: f64) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: ParkingMutex::new(LruCache::new(capacity)),
            ttl_s,
        }
    }

    pub fn put(&self, key: &str, placement: Placement, computed_at: f64) {
        self.entries.lock().put(
            key.to_string(),
            CacheEntry {
                placement,
                computed_at,
            },
        );
    }

    /// 仅当 `computed_at >= last_mutation_at` 且未过期时命中；过期或陈旧条目直接移除。
    pub fn get_if_valid(&self, key: &str, last_mutation_at: f64, now: f64) -> Option<Placement> {
        let mut entries = self.entries.lock();
        let (expired, stale) = match entries.get(key) {
            Some(entry) => (
                now - entry.computed_at >= self.ttl_s,
                entry.computed_at < last_mutation_at,
            ),
            None => {
                debug!("sort cache miss: {key}");
                return None;
            }
        };
        if expired || stale {
            debug!("sort cache drop: {key}, expired={expired}, stale={stale}");
            entries.pop(key);
            return None;
        }
        debug!("sort cache hit: {key}");
        entries.peek(key).map(|entry| entry.placement.clone())
    }

    /// 清理过期条目，返回清理数量。
    pub fn sweep(&self, now: f64) -> usize {
        let mut entries = self.entries.lock();
        let expired = entries
            .iter()
            .filter(|(_, entry)| now - entry.computed_at >= self.ttl_s)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(super) fn spawn_sweeper(
        self: &Arc<Self>,
        handle: &Handle,
        interval: Duration,
        clock: Clock,
    ) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep(clock());
                if removed > 0 {
                    debug!("sort cache sweep removed {removed} entries");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(kind: &str) -> Placement {
        Placement::Container(vec![ItemStack::new(kind, 1)])
    }

    #[test]
    fn entry_valid_only_if_computed_no_earlier_than_last_mutation() {
        let cache = VersionedCache::new(8, 100.0);
        cache.put("container|1xSTONE", placement("STONE"), 10.0);
        assert!(cache.get_if_valid("container|1xSTONE", 0.0, 11.0).is_some());
        assert!(cache.get_if_valid("container|1xSTONE", 10.0, 11.0).is_some());
        assert!(cache.get_if_valid("container|1xSTONE", 10.5, 11.0).is_none());
        // 陈旧条目已被移除。
        assert!(cache.get_if_valid("container|1xSTONE", 0.0, 11.0).is_none());
    }

    #[test]
    fn ttl_is_absolute() {
        let cache = VersionedCache::new(8, 5.0);
        cache.put("a", placement("STONE"), 0.0);
        assert!(cache.get_if_valid("a", 0.0, 4.9).is_some());
        assert!(cache.get_if_valid("a", 0.0, 5.0).is_none());
    }

    #[test]
    fn size_bound_evicts_least_recently_used() {
        let cache = VersionedCache::new(2, 100.0);
        cache.put("a", placement("STONE"), 0.0);
        cache.put("b", placement("DIRT"), 0.0);
        assert!(cache.get_if_valid("a", 0.0, 1.0).is_some());
        cache.put("c", placement("SAND"), 0.0);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_if_valid("b", 0.0, 1.0).is_none());
        assert!(cache.get_if_valid("a", 0.0, 1.0).is_some());
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = VersionedCache::new(8, 10.0);
        cache.put("old", placement("STONE"), 0.0);
        cache.put("new", placement("DIRT"), 8.0);
        assert_eq!(cache.sweep(12.0), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_if_valid("new", 0.0, 12.0).is_some());
    }
}
