// 物品数据模型：堆叠、容器、玩家背包、槽位引用与整理结果。
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const HOTBAR_SLOTS: usize = 9;
pub const MAIN_SLOTS: usize = 27;

const SINGLE_STACK_KINDS: [&str; 27] = [
    "BOW",
    "CROSSBOW",
    "TRIDENT",
    "SHIELD",
    "ELYTRA",
    "FISHING_ROD",
    "CARROT_ON_A_STICK",
    "WARPED_FUNGUS_ON_A_STICK",
    "FLINT_AND_STEEL",
    "SHEARS",
    "BRUSH",
    "MACE",
    "POTION",
    "SPLASH_POTION",
    "LINGERING_POTION",
    "ENCHANTED_BOOK",
    "WRITABLE_BOOK",
    "KNOWLEDGE_BOOK",
    "SADDLE",
    "TOTEM_OF_UNDYING",
    "MUSHROOM_STEW",
    "RABBIT_STEW",
    "BEETROOT_SOUP",
    "SUSPICIOUS_STEW",
    "CAKE",
    "MINECART",
    "SHULKER_BOX",
];

const SINGLE_STACK_SUFFIXES: [&str; 14] = [
    "_SWORD",
    "_PICKAXE",
    "_AXE",
    "_SHOVEL",
    "_HOE",
    "_HELMET",
    "_CHESTPLATE",
    "_LEGGINGS",
    "_BOOTS",
    "_HORSE_ARMOR",
    "_BUCKET",
    "_BOAT",
    "_RAFT",
    "_SHULKER_BOX",
];

const SIXTEEN_STACK_KINDS: [&str; 7] = [
    "ENDER_PEARL",
    "SNOWBALL",
    "EGG",
    "BUCKET",
    "HONEY_BOTTLE",
    "ARMOR_STAND",
    "WRITTEN_BOOK",
];

/// 根据物品种类推断最大堆叠数量，未知种类按 64 处理。
pub fn default_max_stack(kind: &str) -> u32 {
    let kind = normalize_kind(kind);
    if SIXTEEN_STACK_KINDS.contains(&kind.as_str()) {
        return 16;
    }
    if SINGLE_STACK_KINDS.contains(&kind.as_str())
        || kind.starts_with("MUSIC_DISC_")
        || kind.ends_with("_MINECART")
        || SINGLE_STACK_SUFFIXES
            .iter()
            .any(|suffix| kind.ends_with(suffix))
    {
        return 1;
    }
    if kind.ends_with("_SIGN") || kind.ends_with("_BANNER") {
        return 16;
    }
    64
}

pub fn normalize_kind(kind: &str) -> String {
    kind.trim().to_ascii_uppercase()
}

fn deserialize_kind<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(|kind| normalize_kind(&kind))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    #[serde(deserialize_with = "deserialize_kind")]
    pub kind: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
    /// 显式覆盖最大堆叠数，缺省时查表。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stack: Option<u32>,
}

impl ItemStack {
    pub fn new(kind: impl AsRef<str>, quantity: u32) -> Self {
        Self {
            kind: normalize_kind(kind.as_ref()),
            quantity,
            meta: None,
            max_stack: None,
        }
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = Some(max_stack);
        self
    }

    pub fn max_stack(&self) -> u32 {
        self.max_stack
            .filter(|value| *value > 0)
            .unwrap_or_else(|| default_max_stack(&self.kind))
    }

    /// 种类与元数据完全一致时才能合并。
    pub fn stacks_with(&self, other: &ItemStack) -> bool {
        self.kind == other.kind && self.meta == other.meta
    }

    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }

    /// 从当前堆叠拆出 `amount` 个，返回拆出的部分。
    pub fn split_off(&mut self, amount: u32) -> ItemStack {
        let amount = amount.min(self.quantity);
        self.quantity -= amount;
        self.with_quantity(amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SlotRef {
    Helmet,
    Chestplate,
    Leggings,
    Boots,
    Offhand,
    Hotbar(u8),
    Main(u8),
}

impl SlotRef {
    pub const EXCLUSIVE: [SlotRef; 5] = [
        SlotRef::Helmet,
        SlotRef::Chestplate,
        SlotRef::Leggings,
        SlotRef::Boots,
        SlotRef::Offhand,
    ];

    pub fn is_exclusive(&self) -> bool {
        !matches!(self, SlotRef::Hotbar(_) | SlotRef::Main(_))
    }

    pub fn is_armor(&self) -> bool {
        self.is_exclusive() && *self != SlotRef::Offhand
    }

    /// 0 = 专属槽，1 = 快捷栏，2 = 主背包。
    pub fn priority(&self) -> u8 {
        match self {
            SlotRef::Hotbar(_) => 1,
            SlotRef::Main(_) => 2,
            _ => 0,
        }
    }

    pub fn accepts(&self, kind: &str) -> bool {
        let kind = normalize_kind(kind);
        match self {
            SlotRef::Helmet => {
                kind.ends_with("_HELMET")
                    || kind.ends_with("_HEAD")
                    || kind.ends_with("_SKULL")
                    || kind == "CARVED_PUMPKIN"
                    || kind == "TURTLE_HELMET"
            }
            SlotRef::Chestplate => kind.ends_with("_CHESTPLATE") || kind == "ELYTRA",
            SlotRef::Leggings => kind.ends_with("_LEGGINGS"),
            SlotRef::Boots => kind.ends_with("_BOOTS"),
            SlotRef::Offhand | SlotRef::Hotbar(_) | SlotRef::Main(_) => true,
        }
    }

    /// 通用槽位的遍历顺序：先快捷栏再主背包。
    pub fn general_slots() -> impl Iterator<Item = SlotRef> {
        (0..HOTBAR_SLOTS as u8)
            .map(SlotRef::Hotbar)
            .chain((0..MAIN_SLOTS as u8).map(SlotRef::Main))
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Helmet => f.write_str("HELMET"),
            SlotRef::Chestplate => f.write_str("CHESTPLATE"),
            SlotRef::Leggings => f.write_str("LEGGINGS"),
            SlotRef::Boots => f.write_str("BOOTS"),
            SlotRef::Offhand => f.write_str("OFFHAND"),
            SlotRef::Hotbar(index) => write!(f, "HOTBAR_{index}"),
            SlotRef::Main(index) => write!(f, "MAIN_{index}"),
        }
    }
}

impl FromStr for SlotRef {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let tag = normalize_kind(value);
        match tag.as_str() {
            "HELMET" => return Ok(SlotRef::Helmet),
            "CHESTPLATE" => return Ok(SlotRef::Chestplate),
            "LEGGINGS" => return Ok(SlotRef::Leggings),
            "BOOTS" => return Ok(SlotRef::Boots),
            "OFFHAND" => return Ok(SlotRef::Offhand),
            _ => {}
        }
        let parse_index = |raw: &str, limit: usize| -> Result<u8, String> {
            raw.parse::<usize>()
                .ok()
                .filter(|index| *index < limit)
                .map(|index| index as u8)
                .ok_or_else(|| format!("slot index out of range: {value}"))
        };
        if let Some(raw) = tag.strip_prefix("HOTBAR_") {
            return parse_index(raw, HOTBAR_SLOTS).map(SlotRef::Hotbar);
        }
        // INVENTORY_n 是 MAIN_n 的旧写法。
        if let Some(raw) = tag
            .strip_prefix("MAIN_")
            .or_else(|| tag.strip_prefix("INVENTORY_"))
        {
            return parse_index(raw, MAIN_SLOTS).map(SlotRef::Main);
        }
        Err(format!("unknown slot tag: {value}"))
    }
}

impl From<SlotRef> for String {
    fn from(slot: SlotRef) -> Self {
        slot.to_string()
    }
}

impl TryFrom<String> for SlotRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 槽位到物品的映射，键不重复。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotAssignment(BTreeMap<SlotRef, ItemStack>);

impl SlotAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: &SlotRef) -> Option<&ItemStack> {
        self.0.get(slot)
    }

    pub fn get_mut(&mut self, slot: &SlotRef) -> Option<&mut ItemStack> {
        self.0.get_mut(slot)
    }

    pub fn is_occupied(&self, slot: &SlotRef) -> bool {
        self.0.contains_key(slot)
    }

    pub fn insert(&mut self, slot: SlotRef, stack: ItemStack) -> Option<ItemStack> {
        self.0.insert(slot, stack)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotRef, &ItemStack)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn items(&self) -> Vec<ItemStack> {
        self.0.values().cloned().collect()
    }
}

impl FromIterator<(SlotRef, ItemStack)> for SlotAssignment {
    fn from_iter<T: IntoIterator<Item = (SlotRef, ItemStack)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub slots: Vec<Option<ItemStack>>,
}

impl Container {
    pub fn with_size(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    pub fn from_items(size: usize, items: Vec<ItemStack>) -> Self {
        let mut container = Self::with_size(size.max(items.len()));
        for (slot, item) in container.slots.iter_mut().zip(items) {
            *slot = Some(item);
        }
        container
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn items(&self) -> Vec<ItemStack> {
        self.slots.iter().flatten().cloned().collect()
    }
}

/// 玩家背包：快捷栏、主背包与五个专属槽位。
/// 序列化为 `{"HOTBAR_0": {...}, "HELMET": {...}}` 形式的槽位映射。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SlotAssignment", from = "SlotAssignment")]
pub struct PlayerInventory {
    pub hotbar: [Option<ItemStack>; HOTBAR_SLOTS],
    pub main: [Option<ItemStack>; MAIN_SLOTS],
    pub helmet: Option<ItemStack>,
    pub chestplate: Option<ItemStack>,
    pub leggings: Option<ItemStack>,
    pub boots: Option<ItemStack>,
    pub offhand: Option<ItemStack>,
}

impl PlayerInventory {
    pub fn slot(&self, slot: SlotRef) -> Option<&ItemStack> {
        match slot {
            SlotRef::Helmet => self.helmet.as_ref(),
            SlotRef::Chestplate => self.chestplate.as_ref(),
            SlotRef::Leggings => self.leggings.as_ref(),
            SlotRef::Boots => self.boots.as_ref(),
            SlotRef::Offhand => self.offhand.as_ref(),
            SlotRef::Hotbar(index) => self.hotbar.get(index as usize)?.as_ref(),
            SlotRef::Main(index) => self.main.get(index as usize)?.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, slot: SlotRef) -> Option<&mut Option<ItemStack>> {
        match slot {
            SlotRef::Helmet => Some(&mut self.helmet),
            SlotRef::Chestplate => Some(&mut self.chestplate),
            SlotRef::Leggings => Some(&mut self.leggings),
            SlotRef::Boots => Some(&mut self.boots),
            SlotRef::Offhand => Some(&mut self.offhand),
            SlotRef::Hotbar(index) => self.hotbar.get_mut(index as usize),
            SlotRef::Main(index) => self.main.get_mut(index as usize),
        }
    }

    /// 提取顺序：快捷栏、主背包、盔甲、副手。
    pub fn items(&self) -> Vec<ItemStack> {
        SlotRef::general_slots()
            .chain(SlotRef::EXCLUSIVE)
            .filter_map(|slot| self.slot(slot).cloned())
            .collect()
    }

    /// 当前穿戴在专属槽位上的物品。
    pub fn worn(&self) -> Vec<(SlotRef, ItemStack)> {
        SlotRef::EXCLUSIVE
            .into_iter()
            .filter_map(|slot| self.slot(slot).map(|stack| (slot, stack.clone())))
            .collect()
    }

    pub fn capacity() -> usize {
        HOTBAR_SLOTS + MAIN_SLOTS + SlotRef::EXCLUSIVE.len()
    }
}

impl From<SlotAssignment> for PlayerInventory {
    fn from(assignment: SlotAssignment) -> Self {
        let mut inventory = PlayerInventory::default();
        for (slot, stack) in assignment.0 {
            if let Some(target) = inventory.slot_mut(slot) {
                *target = Some(stack);
            }
        }
        inventory
    }
}

impl From<PlayerInventory> for SlotAssignment {
    fn from(inventory: PlayerInventory) -> Self {
        SlotRef::general_slots()
            .chain(SlotRef::EXCLUSIVE)
            .filter_map(|slot| inventory.slot(slot).map(|stack| (slot, stack.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Container,
    Inventory,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Container => "container",
            TargetKind::Inventory => "inventory",
        }
    }
}

/// 整理目标：固定大小的容器或结构化的玩家背包。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Container(Container),
    Inventory(PlayerInventory),
}

impl Destination {
    pub fn kind(&self) -> TargetKind {
        match self {
            Destination::Container(_) => TargetKind::Container,
            Destination::Inventory(_) => TargetKind::Inventory,
        }
    }

    pub fn items(&self) -> Vec<ItemStack> {
        match self {
            Destination::Container(container) => container.items(),
            Destination::Inventory(inventory) => inventory.items(),
        }
    }
}

/// 解析后的放置结果：容器为有序列表，背包为槽位映射。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum Placement {
    Container(Vec<ItemStack>),
    Inventory(SlotAssignment),
}

impl Placement {
    pub fn kind(&self) -> TargetKind {
        match self {
            Placement::Container(_) => TargetKind::Container,
            Placement::Inventory(_) => TargetKind::Inventory,
        }
    }

    pub fn items(&self) -> Vec<ItemStack> {
        match self {
            Placement::Container(items) => items.clone(),
            Placement::Inventory(assignment) => assignment.items(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_tags_decode_once_with_legacy_alias() {
        assert_eq!("hotbar_3".parse::<SlotRef>(), Ok(SlotRef::Hotbar(3)));
        assert_eq!("MAIN_26".parse::<SlotRef>(), Ok(SlotRef::Main(26)));
        assert_eq!("INVENTORY_4".parse::<SlotRef>(), Ok(SlotRef::Main(4)));
        assert_eq!("Offhand".parse::<SlotRef>(), Ok(SlotRef::Offhand));
        assert!("HOTBAR_9".parse::<SlotRef>().is_err());
        assert!("MAIN_27".parse::<SlotRef>().is_err());
        assert!("BACKPACK_1".parse::<SlotRef>().is_err());
        assert_eq!(SlotRef::Main(12).to_string(), "MAIN_12");
    }

    #[test]
    fn slot_order_puts_exclusive_before_hotbar_before_main() {
        let mut slots = vec![
            SlotRef::Main(0),
            SlotRef::Hotbar(8),
            SlotRef::Offhand,
            SlotRef::Hotbar(0),
            SlotRef::Helmet,
        ];
        slots.sort();
        assert_eq!(
            slots,
            vec![
                SlotRef::Helmet,
                SlotRef::Offhand,
                SlotRef::Hotbar(0),
                SlotRef::Hotbar(8),
                SlotRef::Main(0),
            ]
        );
    }

    #[test]
    fn armor_slots_only_accept_matching_gear() {
        assert!(SlotRef::Helmet.accepts("diamond_helmet"));
        assert!(SlotRef::Helmet.accepts("CARVED_PUMPKIN"));
        assert!(!SlotRef::Helmet.accepts("DIAMOND_BOOTS"));
        assert!(SlotRef::Chestplate.accepts("ELYTRA"));
        assert!(SlotRef::Boots.accepts("IRON_BOOTS"));
        assert!(SlotRef::Offhand.accepts("TORCH"));
    }

    #[test]
    fn max_stack_catalog() {
        assert_eq!(default_max_stack("STONE"), 64);
        assert_eq!(default_max_stack("diamond_sword"), 1);
        assert_eq!(default_max_stack("WATER_BUCKET"), 1);
        assert_eq!(default_max_stack("BUCKET"), 16);
        assert_eq!(default_max_stack("ENDER_PEARL"), 16);
        assert_eq!(default_max_stack("OAK_SIGN"), 16);
        assert_eq!(default_max_stack("SHULKER_BOX"), 1);
        assert_eq!(default_max_stack("MUSIC_DISC_CAT"), 1);
        assert_eq!(ItemStack::new("STONE", 1).with_max_stack(8).max_stack(), 8);
    }

    #[test]
    fn inventory_serializes_as_slot_map() {
        let mut inventory = PlayerInventory::default();
        inventory.hotbar[2] = Some(ItemStack::new("TORCH", 12));
        inventory.helmet = Some(ItemStack::new("IRON_HELMET", 1));
        let value = serde_json::to_value(Destination::Inventory(inventory.clone())).unwrap();
        assert_eq!(value["type"], "inventory");
        assert_eq!(value["HOTBAR_2"]["quantity"], 12);
        assert_eq!(value["HELMET"]["kind"], "IRON_HELMET");
        let back: Destination = serde_json::from_value(value).unwrap();
        assert_eq!(back, Destination::Inventory(inventory));
    }
}
