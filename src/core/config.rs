// 配置读取与覆盖合并：基础 YAML + 覆盖 YAML + 环境变量占位符。
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

const DEFAULT_CONFIG_PATH: &str = "config/smartsort.yaml";
const DEFAULT_OVERRIDE_PATH: &str = "data/config/smartsort.override.yaml";
const PLACEHOLDER_API_KEY: &str = "your-api-key-here";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sort: SortConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    pub container_cooldown_s: f64,
    pub inventory_cooldown_s: f64,
    pub skip_small_containers: bool,
    pub small_container_slots: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            container_cooldown_s: 3.0,
            inventory_cooldown_s: 30.0,
            skip_small_containers: false,
            small_container_slots: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_s: f64,
    pub cleanup_interval_s: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            ttl_s: 6.0 * 3600.0,
            cleanup_interval_s: 30.0 * 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub window_s: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            window_s: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size: usize,
    pub tick_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 20,
            tick_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub pool_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { pool_size: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub connect_timeout_s: u64,
    pub timeout_s: u64,
    pub max_output: Option<u32>,
    /// 按物品数量在三档模型之间切换。
    pub dynamic_model: bool,
    pub models: ModelTiers,
    pub thresholds: ModelThresholds,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Some("openai".to_string()),
            base_url: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            connect_timeout_s: 10,
            timeout_s: 45,
            max_output: None,
            dynamic_model: false,
            models: ModelTiers::default(),
            thresholds: ModelThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTiers {
    pub small: String,
    pub medium: String,
    pub large: String,
}

impl Default for ModelTiers {
    fn default() -> Self {
        Self {
            small: "gpt-3.5-turbo".to_string(),
            medium: "gpt-4o".to_string(),
            large: "gpt-4o".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelThresholds {
    pub small: usize,
    pub medium: usize,
}

impl Default for ModelThresholds {
    fn default() -> Self {
        Self {
            small: 12,
            medium: 27,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl LlmConfig {
    // 优先读取环境变量，其次使用配置文件中的值；占位符视为未配置。
    pub fn api_key(&self) -> Option<String> {
        let from_env = env::var("OPENAI_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let inline = self
            .api_key
            .as_deref()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty() && !value.starts_with("${"))
            .map(|value| value.to_string());
        from_env
            .or(inline)
            .filter(|value| value != PLACEHOLDER_API_KEY)
    }
}

pub fn config_path_default() -> String {
    env::var("SMARTSORT_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn override_path_default() -> String {
    env::var("SMARTSORT_CONFIG_OVERRIDE_PATH")
        .unwrap_or_else(|_| DEFAULT_OVERRIDE_PATH.to_string())
}

pub fn load_config() -> Config {
    load_config_from(&config_path_default(), &override_path_default())
}

pub fn load_config_from(base_path: &str, override_path: &str) -> Config {
    // 读取基础配置与覆盖配置，覆盖文件优先。
    let mut merged = read_yaml(base_path);
    if Path::new(override_path).exists() {
        let override_value = read_yaml(override_path);
        // 只对非空字段做递归覆盖，避免误清空已有配置。
        merge_yaml(&mut merged, override_value);
    }

    expand_yaml_env(&mut merged);

    if merged.is_null() {
        return Config::default();
    }
    serde_yaml::from_value::<Config>(merged).unwrap_or_else(|err| {
        warn!("配置解析失败，使用默认配置: {err}");
        Config::default()
    })
}

fn read_yaml(path: &str) -> Value {
    // 配置文件允许不存在，首次启动直接使用默认值。
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("读取配置失败: {path}, {err}");
            return Value::Null;
        }
    };
    serde_yaml::from_str(&content).unwrap_or_else(|err| {
        warn!("解析 YAML 失败: {path}, {err}");
        Value::Null
    })
}

fn merge_yaml(base: &mut Value, override_value: Value) {
    match (base, override_value) {
        (Value::Mapping(base_map), Value::Mapping(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, override_value) => {
            if !override_value.is_null() {
                *base_slot = override_value;
            }
        }
    }
}

fn expand_yaml_env(value: &mut Value) {
    match value {
        Value::String(text) => {
            *text = expand_env_placeholders(text);
        }
        Value::Sequence(items) => {
            for item in items {
                expand_yaml_env(item);
            }
        }
        Value::Mapping(map) => {
            for (_, value) in map.iter_mut() {
                expand_yaml_env(value);
            }
        }
        _ => {}
    }
}

fn expand_env_placeholders(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        let Some(end) = rest.find('}') else {
            output.push_str("${");
            output.push_str(rest);
            return output;
        };
        let inner = &rest[..end];
        rest = &rest[end + 1..];
        let (name, default_value) = match inner.split_once(":-") {
            Some((name, default_value)) => (name.trim(), Some(default_value)),
            None => (inner.trim(), None),
        };
        if name.is_empty() {
            output.push_str("${");
            output.push_str(inner);
            output.push('}');
            continue;
        }
        let resolved = env::var(name).ok().filter(|value| !value.is_empty());
        match (resolved, default_value) {
            (Some(value), _) => output.push_str(&value),
            (None, Some(default_value)) => output.push_str(default_value),
            (None, None) => {}
        }
    }
    output.push_str(rest);
    output
}
