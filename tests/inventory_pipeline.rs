use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use smartsort::config::Config;
use smartsort::llm::TextService;
use smartsort::schemas::{Destination, ItemStack, PlayerInventory, SlotRef};
use smartsort::{SortEngine, SortReport, Trigger, TriggerOutcome};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct RecordingService {
    reply: String,
    seen: Mutex<Vec<(String, String)>>,
}

impl RecordingService {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextService for RecordingService {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        self.seen.lock().push((prompt.to_string(), model.to_string()));
        Ok(self.reply.clone())
    }
}

fn total(inventory: &PlayerInventory, kind: &str) -> u64 {
    inventory
        .items()
        .iter()
        .filter(|stack| stack.kind == kind)
        .map(|stack| u64::from(stack.quantity))
        .sum()
}

fn inventory_of(host: &HashMap<String, Destination>, key: &str) -> PlayerInventory {
    match &host[key] {
        Destination::Inventory(inventory) => inventory.clone(),
        other => panic!("inventory expected, got {other:?}"),
    }
}

async fn sort_player(
    engine: &SortEngine,
    host: &mut HashMap<String, Destination>,
    key: &str,
) -> SortReport {
    let snapshot = host[key].clone();
    match engine.submit(host, Trigger::content_available(key, snapshot)) {
        TriggerOutcome::Finished(report) => report,
        TriggerOutcome::Pending { .. } => engine.next_report(host).await.unwrap(),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slot_directives_respect_armor_exclusivity() {
    let mut inventory = PlayerInventory::default();
    inventory.hotbar[4] = Some(ItemStack::new("DIAMOND_SWORD", 1));
    inventory.main[0] = Some(ItemStack::new("IRON_HELMET", 1));
    inventory.main[1] = Some(ItemStack::new("STONE", 64));
    inventory.helmet = Some(ItemStack::new("DIAMOND_HELMET", 1));
    inventory.main[2] = Some(ItemStack::new("BREAD", 12));
    let original = inventory.clone();
    let mut host = HashMap::from([("steve".to_string(), Destination::Inventory(inventory))]);

    let service = RecordingService::new(
        "1xDIAMOND_SWORD:HOTBAR_0\n\
         1xIRON_HELMET:HELMET\n\
         1xDIAMOND_HELMET:HELMET\n\
         64xSTONE:HOTBAR_5\n\
         12xBREAD:HOTBAR_8",
    );
    let config = Config::default();
    let large_model = config.llm.models.large.clone();
    let engine = SortEngine::builder(config, service.clone()).build().unwrap();

    let report = sort_player(&engine, &mut host, "steve").await;
    assert!(report.is_success(), "{:?}", report.error());

    let sorted = inventory_of(&host, "steve");
    assert_eq!(sorted.hotbar[0], Some(ItemStack::new("DIAMOND_SWORD", 1)));
    assert_eq!(sorted.hotbar[5], Some(ItemStack::new("STONE", 64)));
    assert_eq!(sorted.hotbar[8], Some(ItemStack::new("BREAD", 12)));
    // 头盔槽只接受排在前面的一件，另一件进入普通槽位。
    assert_eq!(sorted.helmet, Some(ItemStack::new("IRON_HELMET", 1)));
    assert_eq!(sorted.slot(SlotRef::Hotbar(1)), Some(&ItemStack::new("DIAMOND_HELMET", 1)));
    for kind in ["DIAMOND_SWORD", "IRON_HELMET", "DIAMOND_HELMET", "STONE", "BREAD"] {
        assert_eq!(total(&sorted, kind), total(&original, kind), "{kind}");
    }

    let seen = service.seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].0.starts_with("[SMARTSORT PLAYER v2] Inventory: "));
    assert!(seen[0].0.contains("HOTBAR_0 through HOTBAR_8"));
    assert_eq!(seen[0].1, large_model);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_directives_keep_worn_gear_and_tidy_the_rest() {
    let mut inventory = PlayerInventory::default();
    inventory.boots = Some(ItemStack::new("LEATHER_BOOTS", 1).with_meta("dyed:red"));
    inventory.offhand = Some(ItemStack::new("SHIELD", 1));
    inventory.main[10] = Some(ItemStack::new("OAK_PLANKS", 20));
    inventory.main[20] = Some(ItemStack::new("OAK_PLANKS", 30));
    let mut host = HashMap::from([("alex".to_string(), Destination::Inventory(inventory))]);

    let service = RecordingService::new("I cannot help with that.");
    let engine = SortEngine::builder(Config::default(), service).build().unwrap();
    let report = sort_player(&engine, &mut host, "alex").await;
    assert!(report.is_success(), "{:?}", report.error());

    let sorted = inventory_of(&host, "alex");
    assert_eq!(
        sorted.boots,
        Some(ItemStack::new("LEATHER_BOOTS", 1).with_meta("dyed:red"))
    );
    assert_eq!(sorted.offhand, Some(ItemStack::new("SHIELD", 1)));
    assert_eq!(sorted.hotbar[0], Some(ItemStack::new("OAK_PLANKS", 50)));
    assert_eq!(sorted.items().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overpacked_inventory_overflows_without_losing_items() {
    let mut inventory = PlayerInventory::default();
    for (index, slot) in inventory.main.iter_mut().enumerate() {
        *slot = Some(ItemStack::new("IRON_SWORD", 1).with_meta(format!("sharpness:{index}")));
    }
    for (index, slot) in inventory.hotbar.iter_mut().enumerate().skip(1) {
        *slot = Some(ItemStack::new("BOW", 1).with_meta(format!("power:{index}")));
    }
    inventory.hotbar[0] = Some(ItemStack::new("ENDER_PEARL", 64));
    let original = Destination::Inventory(inventory);
    let mut host = HashMap::from([("steve".to_string(), original.clone())]);

    let service = RecordingService::new("64xENDER_PEARL:HOTBAR_0");
    let engine = SortEngine::builder(Config::default(), service).build().unwrap();
    let report = sort_player(&engine, &mut host, "steve").await;

    let err = report.error().unwrap();
    assert_eq!(err.code(), "OVERFLOW");
    assert_eq!(host["steve"], original);
    assert!(!engine.is_busy("steve"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_json_uses_slot_labels() {
    let snapshot: Destination = serde_json::from_value(serde_json::json!({
        "type": "inventory",
        "HOTBAR_0": { "kind": "torch", "quantity": 16 },
        "INVENTORY_3": { "kind": "COBBLESTONE", "quantity": 64 },
        "OFFHAND": { "kind": "SHIELD", "quantity": 1 }
    }))
    .unwrap();
    let Destination::Inventory(inventory) = &snapshot else {
        panic!("inventory expected");
    };
    assert_eq!(inventory.hotbar[0], Some(ItemStack::new("TORCH", 16)));
    assert_eq!(inventory.main[3], Some(ItemStack::new("COBBLESTONE", 64)));
    assert_eq!(inventory.offhand, Some(ItemStack::new("SHIELD", 1)));
}
