// 内容指纹与去抖闸门：相同内容在冷却期内不重复整理，同一 key 同时只允许一个会话。
use super::*;

/// 按种类汇总数量，忽略数量为 0 的堆叠。
pub fn totals_by_kind(items: &[ItemStack]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for item in items.iter().filter(|item| item.quantity > 0) {
        *totals.entry(item.kind.clone()).or_insert(0u64) += u64::from(item.quantity);
    }
    totals
}

/// `"<qty>x<KIND>"` 按种类名排序后以逗号拼接，空输入返回空串。
pub fn signature(items: &[ItemStack]) -> String {
    totals_by_kind(items)
        .into_iter()
        .map(|(kind, quantity)| format!("{quantity}x{kind}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
struct SignatureRecord {
    signature: String,
    recorded_at: f64,
}

#[derive(Default)]
pub struct DebounceGate {
    last: DashMap<String, SignatureRecord>,
    in_progress: DashMap<String, Uuid>,
}

impl DebounceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_skip(&self, key: &str, signature: &str, now: f64, cooldown_s: f64) -> bool {
        self.last
            .get(key)
            .map(|record| record.signature == signature && now - record.recorded_at < cooldown_s)
            .unwrap_or(false)
    }

    pub fn record(&self, key: &str, signature: &str, now: f64) {
        self.last.insert(
            key.to_string(),
            SignatureRecord {
                signature: signature.to_string(),
                recorded_at: now,
            },
        );
    }

    /// 标记 key 进入处理中；已有会话时返回 false。
    pub fn try_begin(&self, key: &str, session_id: Uuid) -> bool {
        match self.in_progress.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(session_id);
                true
            }
        }
    }

    pub fn finish(&self, key: &str) {
        self.in_progress.remove(key);
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.in_progress.contains_key(key)
    }

    pub fn active(&self) -> usize {
        self.in_progress.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_ignores_slot_order() {
        let left = vec![
            ItemStack::new("OAK_LOG", 32),
            ItemStack::new("STONE", 60),
            ItemStack::new("STONE", 4),
        ];
        let right = vec![
            ItemStack::new("STONE", 64),
            ItemStack::new("OAK_LOG", 16),
            ItemStack::new("OAK_LOG", 16),
        ];
        assert_eq!(signature(&left), "32xOAK_LOG, 64xSTONE");
        assert_eq!(signature(&left), signature(&right));
        assert_eq!(signature(&[]), "");
        assert_eq!(signature(&[ItemStack::new("STONE", 0)]), "");
    }

    #[test]
    fn debounce_only_within_cooldown_for_same_signature() {
        let gate = DebounceGate::new();
        assert!(!gate.should_skip("chest", "1xSTONE", 10.0, 3.0));
        gate.record("chest", "1xSTONE", 10.0);
        assert!(gate.should_skip("chest", "1xSTONE", 12.9, 3.0));
        assert!(!gate.should_skip("chest", "1xSTONE", 13.0, 3.0));
        assert!(!gate.should_skip("chest", "2xSTONE", 11.0, 3.0));
        assert!(!gate.should_skip("other", "1xSTONE", 11.0, 3.0));
    }

    #[test]
    fn in_progress_set_is_exclusive_per_key() {
        let gate = DebounceGate::new();
        assert!(gate.try_begin("chest", Uuid::new_v4()));
        assert!(gate.is_busy("chest"));
        assert!(!gate.try_begin("chest", Uuid::new_v4()));
        assert!(gate.try_begin("barrel", Uuid::new_v4()));
        assert_eq!(gate.active(), 2);
        gate.finish("chest");
        assert!(!gate.is_busy("chest"));
        assert!(gate.try_begin("chest", Uuid::new_v4()));
    }
}
