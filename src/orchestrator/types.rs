use super::*;

/// 入站触发：内容可用，或强制立即整理（只跳过冷却）。
#[derive(Debug, Clone)]
pub struct Trigger {
    pub key: String,
    pub snapshot: Destination,
    pub force: bool,
}

impl Trigger {
    pub fn content_available(key: impl Into<String>, snapshot: Destination) -> Self {
        Self {
            key: key.into(),
            snapshot,
            force: false,
        }
    }

    pub fn force_now(key: impl Into<String>, snapshot: Destination) -> Self {
        Self {
            key: key.into(),
            snapshot,
            force: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStage {
    Extracted,
    SkippedDebounce,
    CacheHit,
    CacheMiss,
    RateCheck,
    AbortQueueFull,
    Queued,
    Dispatched,
    AwaitingResponse,
    AbortEmpty,
    AbortStale,
    ParseOk,
    Validating,
    AbortCountMismatch,
    Committing,
    Done,
    AbortApplyFail,
}

impl SessionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStage::SkippedDebounce
                | SessionStage::AbortQueueFull
                | SessionStage::AbortEmpty
                | SessionStage::AbortStale
                | SessionStage::AbortCountMismatch
                | SessionStage::Done
                | SessionStage::AbortApplyFail
        )
    }
}

#[derive(Debug, Clone)]
pub(super) struct OperationSession {
    pub(super) id: Uuid,
    pub(super) key: String,
    pub(super) kind: TargetKind,
    pub(super) fingerprint: String,
    pub(super) extracted_at: f64,
    pub(super) items: Vec<ItemStack>,
    pub(super) worn: Vec<(SlotRef, ItemStack)>,
    pub(super) stage: SessionStage,
    pub(super) from_cache: bool,
}

impl OperationSession {
    pub(super) fn extract(key: String, snapshot: &Destination, extracted_at: f64) -> Self {
        let items = snapshot.items();
        let worn = match snapshot {
            Destination::Inventory(inventory) => inventory.worn(),
            Destination::Container(_) => Vec::new(),
        };
        Self {
            id: Uuid::new_v4(),
            key,
            kind: snapshot.kind(),
            fingerprint: signature(&items),
            extracted_at,
            items,
            worn,
            stage: SessionStage::Extracted,
            from_cache: false,
        }
    }

    pub(super) fn advance(&mut self, stage: SessionStage) {
        debug!(
            "sort session {} [{}] {:?} -> {:?}",
            self.id, self.key, self.stage, stage
        );
        self.stage = stage;
    }
}

/// 网络侧完成后交回游戏线程的结果。
pub(super) struct Resolution {
    pub(super) session: OperationSession,
    pub(super) result: Result<Placement, SortError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Busy,
    PreferenceOff,
    SmallContainer,
    Empty,
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// 边界处直接忽略，没有创建会话。
    Ignored(IgnoreReason),
    Skipped,
    Pending { session_id: Uuid },
    Finished(SortReport),
}

#[derive(Debug, Clone)]
pub struct SortReport {
    pub session_id: Uuid,
    pub key: String,
    pub kind: TargetKind,
    pub fingerprint: String,
    pub from_cache: bool,
    pub stage: SessionStage,
    pub result: Result<Placement, SortError>,
}

impl SortReport {
    pub(super) fn new(session: &OperationSession, result: Result<Placement, SortError>) -> Self {
        Self {
            session_id: session.id,
            key: session.key.clone(),
            kind: session.kind,
            fingerprint: session.fingerprint.clone(),
            from_cache: session.from_cache,
            stage: session.stage,
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&SortError> {
        self.result.as_ref().err()
    }

    pub fn to_payload(&self) -> Value {
        let mut payload = json!({
            "session_id": self.session_id.to_string(),
            "key": self.key,
            "kind": self.kind.as_str(),
            "fingerprint": self.fingerprint,
            "from_cache": self.from_cache,
            "stage": self.stage,
        });
        if let Value::Object(ref mut map) = payload {
            match &self.result {
                Ok(placement) => {
                    map.insert(
                        "placement".to_string(),
                        serde_json::to_value(placement).unwrap_or(Value::Null),
                    );
                }
                Err(err) => {
                    map.insert("error".to_string(), err.to_payload());
                }
            }
        }
        payload
    }
}
