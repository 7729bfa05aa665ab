// 玩家背包槽位分配：专属槽位优先，其次快捷栏，最后主背包；冲突与溢出改投空位，绝不丢弃。
use super::parser::Stock;
use super::*;

/// 解析带槽位标签的指令并分配到具体槽位。
///
/// 处理顺序：
/// 1. 按槽位优先级稳定排序后逐行取货，专属槽位只接受一份且必须是匹配的装备。
/// 2. 未被指令占用的专属槽位放回提取时穿戴的原物品。
/// 3. 被挤出的物品与剩余库存依次补齐同类堆叠，再占用快捷栏到主背包的第一个空位。
/// 4. 仍无处安放时返回 `OVERFLOW`。
pub fn resolve_inventory(
    directives: &[Directive],
    items: &[ItemStack],
    worn: &[(SlotRef, ItemStack)],
) -> Result<SlotAssignment, SortError> {
    let mut stock = Stock::new(items);
    let mut assignment = SlotAssignment::new();
    let mut displaced = Vec::new();

    let mut targeted = directives
        .iter()
        .filter_map(|directive| directive.slot.map(|slot| (slot, directive)))
        .collect::<Vec<_>>();
    targeted.sort_by_key(|(slot, _)| slot.priority());

    for (slot, directive) in targeted {
        for stack in stock.take(&directive.kind, directive.quantity) {
            place_targeted(&mut assignment, slot, stack, &mut displaced);
        }
    }

    for (slot, original) in worn {
        if assignment.is_occupied(slot) || !slot.accepts(&original.kind) {
            continue;
        }
        if let Some(stack) = stock.take_matching(original) {
            assignment.insert(*slot, stack);
        }
    }

    let mut overflow = 0u64;
    for stack in displaced.into_iter().chain(stock.drain()) {
        if let Some(rest) = place_anywhere(&mut assignment, stack) {
            overflow += u64::from(rest.quantity);
        }
    }
    if overflow > 0 {
        warn!("inventory resolution overflow: {overflow} items without a slot");
        return Err(SortError::overflow(overflow));
    }
    Ok(assignment)
}

fn place_targeted(
    assignment: &mut SlotAssignment,
    slot: SlotRef,
    mut stack: ItemStack,
    displaced: &mut Vec<ItemStack>,
) {
    if slot.is_exclusive() {
        if assignment.is_occupied(&slot) || !slot.accepts(&stack.kind) {
            displaced.push(stack);
            return;
        }
        let limit = if slot.is_armor() { 1 } else { stack.max_stack() };
        if stack.quantity > limit {
            assignment.insert(slot, stack.split_off(limit));
            displaced.push(stack);
        } else {
            assignment.insert(slot, stack);
        }
        return;
    }
    match assignment.get_mut(&slot) {
        None => {
            let limit = stack.max_stack();
            if stack.quantity > limit {
                assignment.insert(slot, stack.split_off(limit));
                displaced.push(stack);
            } else {
                assignment.insert(slot, stack);
            }
        }
        Some(existing) if existing.stacks_with(&stack) => {
            let room = existing.max_stack().saturating_sub(existing.quantity);
            let moved = room.min(stack.quantity);
            existing.quantity += moved;
            stack.quantity -= moved;
            if stack.quantity > 0 {
                displaced.push(stack);
            }
        }
        Some(_) => displaced.push(stack),
    }
}

/// 先补齐同类堆叠，再按快捷栏、主背包顺序占用空位；放不下的部分原样返回。
fn place_anywhere(assignment: &mut SlotAssignment, mut stack: ItemStack) -> Option<ItemStack> {
    for slot in SlotRef::general_slots() {
        if stack.quantity == 0 {
            return None;
        }
        if let Some(existing) = assignment.get_mut(&slot) {
            if existing.stacks_with(&stack) {
                let room = existing.max_stack().saturating_sub(existing.quantity);
                let moved = room.min(stack.quantity);
                existing.quantity += moved;
                stack.quantity -= moved;
            }
        }
    }
    while stack.quantity > 0 {
        let Some(free) = SlotRef::general_slots().find(|slot| !assignment.is_occupied(slot)) else {
            return Some(stack);
        };
        let piece = stack.split_off(stack.max_stack().min(stack.quantity));
        assignment.insert(free, piece);
    }
    None
}
