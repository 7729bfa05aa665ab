// 回复解析：逐行匹配 `<qty>x<KIND>[:<SLOT>]`，从原始库存中按种类 FIFO 取货，保证数量守恒。
use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub quantity: u32,
    pub kind: String,
    pub slot: Option<SlotRef>,
}

fn directive_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^([0-9]+)\s*x\s*([A-Z0-9_]+)(?:\s*:\s*([A-Z0-9_]+))?$")
                .map_err(|err| warn!("invalid directive regex: {err}"))
                .ok()
        })
        .as_ref()
}

/// 不匹配语法的行直接丢弃；槽位标签无法识别的行同样丢弃。
pub fn parse_directives(text: &str) -> Vec<Directive> {
    let Some(pattern) = directive_regex() else {
        return Vec::new();
    };
    let mut directives = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = pattern.captures(line) else {
            debug!("drop unparsable reply line: {line}");
            continue;
        };
        // 超出范围的数量按上限处理，反正不会超过库存。
        let quantity = caps[1]
            .parse::<u64>()
            .map(|value| value.min(u64::from(u32::MAX)) as u32)
            .unwrap_or(u32::MAX);
        if quantity == 0 {
            continue;
        }
        let slot = match caps.get(3) {
            Some(tag) => match tag.as_str().parse::<SlotRef>() {
                Ok(slot) => Some(slot),
                Err(err) => {
                    debug!("drop reply line with bad slot: {line}, {err}");
                    continue;
                }
            },
            None => None,
        };
        directives.push(Directive {
            quantity,
            kind: normalize_kind(&caps[2]),
            slot,
        });
    }
    directives
}

/// 按种类分道的原始库存，每道内保持提取顺序。
pub(super) struct Stock {
    order: Vec<String>,
    lanes: HashMap<String, VecDeque<ItemStack>>,
}

impl Stock {
    pub(super) fn new(items: &[ItemStack]) -> Self {
        let mut order = Vec::new();
        let mut lanes: HashMap<String, VecDeque<ItemStack>> = HashMap::new();
        for item in items.iter().filter(|item| item.quantity > 0) {
            let lane_key = normalize_kind(&item.kind);
            if !lanes.contains_key(&lane_key) {
                order.push(lane_key.clone());
            }
            lanes.entry(lane_key).or_default().push_back(item.clone());
        }
        Self { order, lanes }
    }

    /// 最多取出 `quantity` 个，必要时拆分堆叠；库存不足时只返回现有部分。
    pub(super) fn take(&mut self, kind: &str, quantity: u32) -> Vec<ItemStack> {
        let Some(lane) = self.lanes.get_mut(&normalize_kind(kind)) else {
            return Vec::new();
        };
        let mut remaining = quantity;
        let mut taken = Vec::new();
        while remaining > 0 {
            let Some(mut stack) = lane.pop_front() else {
                break;
            };
            if stack.quantity > remaining {
                taken.push(stack.split_off(remaining));
                lane.push_front(stack);
                remaining = 0;
            } else {
                remaining -= stack.quantity;
                taken.push(stack);
            }
        }
        taken
    }

    /// 取出与 `like` 同种类同元数据的一份，数量不超过 `like.quantity`。
    pub(super) fn take_matching(&mut self, like: &ItemStack) -> Option<ItemStack> {
        let lane = self.lanes.get_mut(&normalize_kind(&like.kind))?;
        let position = lane.iter().position(|stack| stack.stacks_with(like))?;
        let stack = lane.get_mut(position)?;
        if stack.quantity > like.quantity {
            return Some(stack.split_off(like.quantity));
        }
        lane.remove(position)
    }

    pub(super) fn drain(mut self) -> Vec<ItemStack> {
        let mut leftovers = Vec::new();
        for lane_key in &self.order {
            if let Some(lane) = self.lanes.remove(lane_key) {
                leftovers.extend(lane);
            }
        }
        leftovers
    }
}

/// 容器模式：按回复顺序取货，剩余库存追加在末尾。槽位标签在此模式下忽略。
pub fn resolve_container(directives: &[Directive], items: &[ItemStack]) -> Vec<ItemStack> {
    let mut stock = Stock::new(items);
    let mut resolved = Vec::new();
    for directive in directives {
        resolved.extend(stock.take(&directive.kind, directive.quantity));
    }
    resolved.extend(stock.drain());
    resolved
}

/// 把缓存中的放置结果还原为指令，用当前库存重放。
pub(super) fn directives_from_placement(placement: &Placement) -> Vec<Directive> {
    match placement {
        Placement::Container(items) => items
            .iter()
            .map(|stack| Directive {
                quantity: stack.quantity,
                kind: normalize_kind(&stack.kind),
                slot: None,
            })
            .collect(),
        Placement::Inventory(assignment) => assignment
            .iter()
            .map(|(slot, stack)| Directive {
                quantity: stack.quantity,
                kind: normalize_kind(&stack.kind),
                slot: Some(*slot),
            })
            .collect(),
    }
}
