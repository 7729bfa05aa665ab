// 提交阶段：守恒校验、容量校验，完整构造新内容后一次性替换目标。
use super::*;

/// 合并同种类同元数据的堆叠，每堆不超过最大堆叠数，保持首次出现的顺序。
pub fn restack(items: Vec<ItemStack>) -> Vec<ItemStack> {
    let mut stacks: Vec<ItemStack> = Vec::with_capacity(items.len());
    let mut open: HashMap<(String, Option<String>), usize> = HashMap::new();
    for mut item in items.into_iter().filter(|item| item.quantity > 0) {
        let key = (item.kind.clone(), item.meta.clone());
        if let Some(&index) = open.get(&key) {
            let target = &mut stacks[index];
            let room = target.max_stack().saturating_sub(target.quantity);
            let moved = room.min(item.quantity);
            target.quantity += moved;
            item.quantity -= moved;
            if target.quantity >= target.max_stack() {
                open.remove(&key);
            }
        }
        while item.quantity > 0 {
            let max = item.max_stack();
            let piece = item.split_off(max.min(item.quantity));
            if piece.quantity < max {
                open.insert(key.clone(), stacks.len());
            }
            stacks.push(piece);
        }
    }
    stacks
}

pub fn verify_conservation(extracted: &[ItemStack], resolved: &[ItemStack]) -> Result<(), SortError> {
    let expected = totals_by_kind(extracted);
    let actual = totals_by_kind(resolved);
    if expected == actual {
        return Ok(());
    }
    let detail = expected
        .keys()
        .chain(actual.keys())
        .find(|kind| expected.get(*kind) != actual.get(*kind))
        .map(|kind| {
            format!(
                "{kind} expected {} got {}",
                expected.get(kind).copied().unwrap_or(0),
                actual.get(kind).copied().unwrap_or(0)
            )
        })
        .unwrap_or_default();
    Err(SortError::count_mismatch(detail))
}

/// 先在副本上完成全部校验与构造，成功后才写回；失败时目标保持原样。
pub(super) fn commit(destination: &mut Destination, placement: &Placement) -> Result<(), SortError> {
    match (destination, placement) {
        (Destination::Container(container), Placement::Container(items)) => {
            let stacks = restack(items.clone());
            let capacity = container.size();
            if stacks.len() > capacity {
                return Err(SortError::capacity_exceeded(stacks.len(), capacity));
            }
            let mut next = Container::with_size(capacity);
            for (slot, stack) in next.slots.iter_mut().zip(stacks) {
                *slot = Some(stack);
            }
            *container = next;
            Ok(())
        }
        (Destination::Inventory(inventory), Placement::Inventory(assignment)) => {
            let capacity = PlayerInventory::capacity();
            if assignment.len() > capacity {
                return Err(SortError::capacity_exceeded(assignment.len(), capacity));
            }
            for (slot, stack) in assignment.iter() {
                if stack.quantity == 0 || stack.quantity > stack.max_stack() {
                    return Err(SortError::apply_failed(format!(
                        "invalid stack size {} for {} in {slot}",
                        stack.quantity, stack.kind
                    )));
                }
                if slot.is_armor() && (stack.quantity != 1 || !slot.accepts(&stack.kind)) {
                    return Err(SortError::apply_failed(format!(
                        "{} cannot be worn in {slot}",
                        stack.kind
                    )));
                }
            }
            *inventory = PlayerInventory::from(assignment.clone());
            Ok(())
        }
        (destination, placement) => Err(SortError::apply_failed(format!(
            "{} placement cannot be applied to a {}",
            placement.kind().as_str(),
            destination.kind().as_str()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restack_merges_same_kind_and_meta_only() {
        let stacks = restack(vec![
            ItemStack::new("STONE", 40),
            ItemStack::new("DIRT", 3),
            ItemStack::new("STONE", 40),
            ItemStack::new("STONE", 10).with_meta("polished"),
            ItemStack::new("ENDER_PEARL", 20),
        ]);
        assert_eq!(
            stacks,
            vec![
                ItemStack::new("STONE", 64),
                ItemStack::new("DIRT", 3),
                ItemStack::new("STONE", 16),
                ItemStack::new("STONE", 10).with_meta("polished"),
                ItemStack::new("ENDER_PEARL", 16),
                ItemStack::new("ENDER_PEARL", 4),
            ]
        );
    }

    #[test]
    fn conservation_reports_first_mismatch() {
        let extracted = vec![ItemStack::new("COAL", 5)];
        assert!(verify_conservation(&extracted, &[ItemStack::new("COAL", 5)]).is_ok());
        let err = verify_conservation(&extracted, &[ItemStack::new("COAL", 10)]).unwrap_err();
        assert_eq!(err.code(), "COUNT_MISMATCH");
        assert!(err.message().contains("COAL expected 5 got 10"));
    }

    #[test]
    fn capacity_failure_leaves_container_untouched() {
        let original = Container::from_items(
            2,
            vec![ItemStack::new("IRON_SWORD", 1), ItemStack::new("IRON_AXE", 1)],
        );
        let mut destination = Destination::Container(original.clone());
        let placement = Placement::Container(vec![
            ItemStack::new("IRON_SWORD", 1),
            ItemStack::new("IRON_AXE", 1),
            ItemStack::new("IRON_HOE", 1),
        ]);
        let err = commit(&mut destination, &placement).unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");
        assert_eq!(destination, Destination::Container(original));
    }

    #[test]
    fn commit_clears_then_writes_container() {
        let mut destination = Destination::Container(Container::from_items(
            4,
            vec![ItemStack::new("STONE", 30), ItemStack::new("STONE", 34)],
        ));
        let placement = Placement::Container(vec![
            ItemStack::new("STONE", 30),
            ItemStack::new("STONE", 34),
        ]);
        commit(&mut destination, &placement).unwrap();
        let Destination::Container(container) = destination else {
            panic!("container expected");
        };
        assert_eq!(container.size(), 4);
        assert_eq!(container.slots[0], Some(ItemStack::new("STONE", 64)));
        assert!(container.slots[1..].iter().all(Option::is_none));
    }

    #[test]
    fn mismatched_placement_kind_is_rejected() {
        let mut destination = Destination::Inventory(PlayerInventory::default());
        let err = commit(&mut destination, &Placement::Container(Vec::new())).unwrap_err();
        assert_eq!(err.code(), "APPLY_FAILED");
    }
}
