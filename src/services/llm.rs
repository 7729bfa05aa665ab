// LLM 适配：OpenAI 兼容的 Chat Completions 调用，用于获取物品排序文本。
use crate::config::LlmConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434/v1";
const DEFAULT_LMSTUDIO_BASE_URL: &str = "http://127.0.0.1:1234/v1";

/// 外部文本生成服务：输入提示词与模型名，返回纯文本回复。
#[async_trait]
pub trait TextService: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_s.max(1)))
            .timeout(Duration::from_secs(config.timeout_s.max(1)))
            .build()
            .context("build llm http client")?;
        let api_key = config.api_key();
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
            && resolve_base_url(&self.config)
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false)
    }

    fn endpoint(&self) -> String {
        let base =
            resolve_base_url(&self.config).unwrap_or_else(|| "https://api.openai.com".to_string());
        let base = base.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = format!("Bearer {api_key}");
            if let Ok(header_value) = value.parse() {
                headers.insert(AUTHORIZATION, header_value);
            }
        }
        headers
    }

    fn build_payload(&self, prompt: &str, model: &str) -> Value {
        let model = if model.trim().is_empty() {
            self.config.model.as_str()
        } else {
            model
        };
        let mut payload = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": round_f32(self.config.temperature),
        });
        if let Some(max_output) = self.config.max_output {
            if max_output > 0 {
                payload["max_tokens"] = json!(max_output);
            }
        }
        payload
    }
}

#[async_trait]
impl TextService for LlmClient {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(anyhow!("LLM api key not configured"));
        }
        debug!("LLM request: model={model}, prompt_chars={}", prompt.len());
        let response = self
            .http
            .post(self.endpoint())
            .headers(self.headers())
            .json(&self.build_payload(prompt, model))
            .send()
            .await
            .context("send llm request")?;
        let status = response.status();
        let body_text = response.text().await.context("read llm response body")?;
        let body = match serde_json::from_str::<Value>(&body_text) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "LLM response json parse failed: {err}, body={}",
                    truncate_text(&body_text, 2048)
                );
                Value::Null
            }
        };
        if !status.is_success() {
            let detail = if body == Value::Null {
                json!({ "raw": truncate_text(&body_text, 2048) })
            } else {
                body
            };
            return Err(anyhow!("LLM request failed: {status} {detail}"));
        }
        extract_content(&body).ok_or_else(|| {
            anyhow!(
                "LLM response missing content: {}",
                truncate_text(&body_text, 2048)
            )
        })
    }
}

/// 固定回复，用于离线回放与演示。
#[derive(Debug, Clone, Default)]
pub struct StaticTextService {
    reply: String,
}

impl StaticTextService {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl TextService for StaticTextService {
    async fn complete(&self, _prompt: &str, _model: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

fn extract_content(body: &Value) -> Option<String> {
    body.get("choices")
        .and_then(|value| value.get(0))
        .and_then(|value| value.get("message"))
        .and_then(|value| value.get("content"))
        .and_then(Value::as_str)
        .map(|value| value.to_string())
}

pub fn normalize_provider(provider: Option<&str>) -> String {
    let raw = provider.unwrap_or("openai").trim();
    if raw.is_empty() {
        return "openai".to_string();
    }
    let normalized = raw.to_ascii_lowercase().replace(['-', ' '], "_");
    match normalized.as_str() {
        "openai_native" | "openai" => "openai".to_string(),
        "openai_compat" | "openai_compatible" => "openai_compatible".to_string(),
        "lm_studio" | "lmstudio" => "lmstudio".to_string(),
        other => other.to_string(),
    }
}

pub fn provider_default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some(DEFAULT_OPENAI_BASE_URL),
        "openrouter" => Some(DEFAULT_OPENROUTER_BASE_URL),
        "deepseek" => Some(DEFAULT_DEEPSEEK_BASE_URL),
        "groq" => Some(DEFAULT_GROQ_BASE_URL),
        "ollama" => Some(DEFAULT_OLLAMA_BASE_URL),
        "lmstudio" => Some(DEFAULT_LMSTUDIO_BASE_URL),
        _ => None,
    }
}

fn resolve_base_url(config: &LlmConfig) -> Option<String> {
    let inline = config
        .base_url
        .as_deref()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty());
    if let Some(value) = inline {
        return Some(value.to_string());
    }
    let provider = normalize_provider(config.provider.as_deref());
    provider_default_base_url(&provider).map(|value| value.to_string())
}

fn round_f32(value: f32) -> f64 {
    const DECIMALS: i32 = 6;
    let factor = 10_f64.powi(DECIMALS);
    ((value as f64) * factor).round() / factor
}

fn truncate_text(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut output = text[..end].to_string();
    output.push_str("...");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: Option<&str>, api_key: Option<&str>) -> LlmClient {
        let config = LlmConfig {
            base_url: base_url.map(str::to_string),
            api_key: api_key.map(str::to_string),
            ..LlmConfig::default()
        };
        let mut client = LlmClient::new(config).unwrap();
        client.api_key = api_key.map(str::to_string);
        client
    }

    #[test]
    fn endpoint_appends_chat_completions_once() {
        assert_eq!(
            client(Some("http://localhost:8080/v1/"), Some("k")).endpoint(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            client(Some("http://localhost:8080"), Some("k")).endpoint(),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(
            client(None, Some("k")).endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn payload_carries_single_user_message_and_temperature() {
        let payload = client(None, Some("k")).build_payload("hello", "gpt-3.5-turbo");
        assert_eq!(payload["model"], "gpt-3.5-turbo");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"], "hello");
        assert_eq!(payload["temperature"], json!(0.3));
        assert!(payload.get("max_tokens").is_none());

        let payload = client(None, Some("k")).build_payload("hello", " ");
        assert_eq!(payload["model"], "gpt-4o");
    }

    #[test]
    fn content_is_read_from_first_choice() {
        let body = json!({ "choices": [{ "message": { "content": "64xSTONE" } }] });
        assert_eq!(extract_content(&body).as_deref(), Some("64xSTONE"));
        assert_eq!(extract_content(&json!({ "choices": [] })), None);
    }

    #[tokio::test]
    async fn unconfigured_client_fails_fast() {
        let client = client(None, None);
        assert!(!client.is_configured());
        assert!(client.complete("prompt", "gpt-4o").await.is_err());
    }

    #[test]
    fn truncate_text_respects_char_boundaries() {
        assert_eq!(truncate_text("abc", 8), "abc");
        assert_eq!(truncate_text("物品整理", 4), "物...");
    }
}
