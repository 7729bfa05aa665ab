// 提示词构造：容器使用无槽位列表语法，玩家背包使用带槽位标签的语法。
use super::*;

const CONTAINER_RULES: &str = "RULES:\n\
1. Expert Minecraft inventory organization\n\
2. Group similar items (blocks, tools, resources)\n\
3. Put common items at top/beginning\n\
4. Stack items fully\n\
5. Output ONLY lines like \"12xSTONE\" with no explanations\n\
6. Be quick but thorough";

const INVENTORY_RULES: &str = "RULES:\n\
1. You're a professional Minecraft speedrunner organizing a player inventory\n\
2. Put weapons in hotbar slots 0-1, tools in 2-4, blocks in 5-8\n\
3. Reserve offhand for shield/torch\n\
4. Group similar items, with most important/frequent use items first\n\
5. Place EXACTLY ONE armor item in each matching armor slot (HELMET, CHESTPLATE, LEGGINGS, BOOTS)\n\
6. Any additional armor items go in MAIN slots, NEVER in armor slots\n\
7. Food goes in right side of hotbar\n\
8. Output ONLY lines like \"12xSTONE:HOTBAR_3\" with no comments\n\
9. Valid slots: HOTBAR_0 through HOTBAR_8, MAIN_0 through MAIN_26, HELMET, CHESTPLATE, LEGGINGS, BOOTS, OFFHAND\n\
10. NEVER assign an item to an armor slot unless it is made for that slot";

pub fn build_container_prompt(items: &[ItemStack]) -> String {
    format!(
        "[SMARTSORT v4.5] Inventory: {}\n{CONTAINER_RULES}",
        signature(items)
    )
}

pub fn build_inventory_prompt(items: &[ItemStack]) -> String {
    format!(
        "[SMARTSORT PLAYER v2] Inventory: {}\n{INVENTORY_RULES}",
        signature(items)
    )
}

/// 玩家背包固定使用大模型；容器在开启动态模型时按堆叠数量分档。
pub fn select_model(config: &LlmConfig, kind: TargetKind, stack_count: usize) -> String {
    if kind == TargetKind::Inventory {
        return config.models.large.clone();
    }
    if !config.dynamic_model {
        return config.model.clone();
    }
    if stack_count <= config.thresholds.small {
        config.models.small.clone()
    } else if stack_count <= config.thresholds.medium {
        config.models.medium.clone()
    } else {
        config.models.large.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_embed_sorted_manifest_and_grammar() {
        let items = vec![ItemStack::new("STONE", 64), ItemStack::new("OAK_LOG", 32)];
        let prompt = build_container_prompt(&items);
        assert!(prompt.starts_with("[SMARTSORT v4.5] Inventory: 32xOAK_LOG, 64xSTONE\n"));
        assert!(prompt.contains("\"12xSTONE\""));

        let prompt = build_inventory_prompt(&items);
        assert!(prompt.contains("Inventory: 32xOAK_LOG, 64xSTONE\n"));
        assert!(prompt.contains("\"12xSTONE:HOTBAR_3\""));
        assert!(prompt.contains("MAIN_0 through MAIN_26"));
    }

    #[test]
    fn model_tiers_follow_stack_count() {
        let mut config = LlmConfig::default();
        assert_eq!(select_model(&config, TargetKind::Container, 40), "gpt-4o");
        config.dynamic_model = true;
        config.models.large = "large".to_string();
        assert_eq!(select_model(&config, TargetKind::Container, 12), "gpt-3.5-turbo");
        assert_eq!(select_model(&config, TargetKind::Container, 13), "gpt-4o");
        assert_eq!(select_model(&config, TargetKind::Container, 28), "large");
        assert_eq!(select_model(&config, TargetKind::Inventory, 1), "large");
    }
}
