use super::*;

/// 每个 key 的最近变更时间。
#[derive(Default)]
pub struct ChangeTracker {
    last_mutation: DashMap<String, f64>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, now: f64) {
        self.last_mutation
            .entry(key.to_string())
            .and_modify(|value| {
                if now > *value {
                    *value = now;
                }
            })
            .or_insert(now);
    }

    /// 从未变更过的 key 返回 0。
    pub fn last_mutation_at(&self, key: &str) -> f64 {
        self.last_mutation
            .get(key)
            .map(|value| *value)
            .unwrap_or(0.0)
    }

    /// 与提取时间相同的变更也算作之后发生，时钟精度不足时宁可放弃提交。
    pub fn mutated_since(&self, key: &str, timestamp: f64) -> bool {
        self.last_mutation
            .get(key)
            .map(|value| *value >= timestamp)
            .unwrap_or(false)
    }

    pub fn forget(&self, key: &str) {
        self.last_mutation.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_after_timestamp_is_detected() {
        let tracker = ChangeTracker::new();
        assert!(!tracker.mutated_since("chest", 0.0));
        tracker.record("chest", 5.0);
        assert!(tracker.mutated_since("chest", 4.9));
        // 同一时刻的变更同样视为冲突。
        assert!(tracker.mutated_since("chest", 5.0));
        assert!(!tracker.mutated_since("chest", 5.1));
        // 时间戳只增不减。
        tracker.record("chest", 3.0);
        assert_eq!(tracker.last_mutation_at("chest"), 5.0);
        tracker.forget("chest");
        assert_eq!(tracker.last_mutation_at("chest"), 0.0);
    }
}
