use super::*;

/// 整理失败的统一错误，`message` 即对外通知的失败原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortError {
    code: &'static str,
    message: String,
}

impl SortError {
    pub(super) fn new(code: &'static str, message: String) -> Self {
        Self { code, message }
    }

    pub fn empty_response() -> Self {
        Self::new("EMPTY_RESPONSE", "empty response".to_string())
    }

    pub fn queue_full() -> Self {
        Self::new("QUEUE_FULL", "queue full".to_string())
    }

    pub fn count_mismatch(detail: String) -> Self {
        Self::new("COUNT_MISMATCH", format!("item count mismatch: {detail}"))
    }

    pub fn concurrent_mutation() -> Self {
        Self::new(
            "CONCURRENT_MUTATION",
            "inventory changed during sorting".to_string(),
        )
    }

    pub fn capacity_exceeded(needed: usize, capacity: usize) -> Self {
        Self::new(
            "CAPACITY_EXCEEDED",
            format!("too many item stacks: {needed} > {capacity}"),
        )
    }

    pub fn overflow(units: u64) -> Self {
        Self::new(
            "OVERFLOW",
            format!("no free slot for {units} leftover items"),
        )
    }

    pub fn destination_unavailable() -> Self {
        Self::new(
            "DESTINATION_UNAVAILABLE",
            "destination no longer available".to_string(),
        )
    }

    pub fn apply_failed(message: String) -> Self {
        Self::new("APPLY_FAILED", message)
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn to_payload(&self) -> Value {
        json!({
            "code": self.code,
            "message": self.message,
        })
    }
}

impl std::fmt::Display for SortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SortError {}
