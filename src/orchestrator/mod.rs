// 整理引擎：指纹去抖、版本缓存、限流排队、回复解析、槽位分配与原子提交。
use crate::config::{Config, LlmConfig};
use crate::llm::TextService;
use crate::schemas::{
    normalize_kind, Container, Destination, ItemStack, Placement, PlayerInventory,
    SlotAssignment, SlotRef, TargetKind,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use lru::LruCache;
use parking_lot::{Mutex as ParkingMutex, RwLock as ParkingRwLock};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

mod apply;
mod cache;
mod error;
mod event_stream;
mod execute;
mod fingerprint;
mod limiter;
mod parser;
mod prompt;
mod queue;
mod slots;
mod tracker;
mod types;

pub use apply::{restack, verify_conservation};
pub use cache::VersionedCache;
pub use error::SortError;
pub use event_stream::{ChannelSubscriber, EventVerdict, SortEvent, SortSubscriber};
pub use fingerprint::{signature, totals_by_kind, DebounceGate};
pub use limiter::{LimiterStats, RateLimiter};
pub use parser::{parse_directives, resolve_container, Directive};
pub use prompt::{build_container_prompt, build_inventory_prompt, select_model};
pub use queue::{Admission, Dispatcher, PendingQueue, PendingRequest};
pub use slots::resolve_inventory;
pub use tracker::ChangeTracker;
pub use types::{IgnoreReason, SessionStage, SortReport, Trigger, TriggerOutcome};

use event_stream::{now_ts, EventHub};
use types::{OperationSession, Resolution};

/// 时间源，返回秒级浮点时间戳；测试中可替换为手动时钟。
pub type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

/// 宿主侧的目标状态，只在游戏线程上读写。
pub trait HostState {
    fn destination_mut(&mut self, key: &str) -> Option<&mut Destination>;
}

impl HostState for HashMap<String, Destination> {
    fn destination_mut(&mut self, key: &str) -> Option<&mut Destination> {
        self.get_mut(key)
    }
}

/// 玩家或容器级别的自动整理开关。
pub trait PreferenceLookup: Send + Sync {
    fn auto_sort_enabled(&self, key: &str, kind: TargetKind) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PreferenceLookup for AllowAll {
    fn auto_sort_enabled(&self, _key: &str, _kind: TargetKind) -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub limiter: LimiterStats,
    pub queued: usize,
    pub cached: usize,
    pub active_sessions: usize,
}

#[derive(Clone)]
pub struct SortEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Config,
    clock: Clock,
    network: Handle,
    preferences: Arc<dyn PreferenceLookup>,
    gate: DebounceGate,
    cache: Arc<VersionedCache>,
    tracker: ChangeTracker,
    dispatcher: Arc<Dispatcher>,
    events: EventHub,
    resolutions_tx: mpsc::UnboundedSender<Resolution>,
    resolutions_rx: Mutex<mpsc::UnboundedReceiver<Resolution>>,
    workers: ParkingMutex<Vec<JoinHandle<()>>>,
}

pub struct SortEngineBuilder {
    config: Config,
    service: Arc<dyn TextService>,
    clock: Option<Clock>,
    preferences: Option<Arc<dyn PreferenceLookup>>,
    network: Option<Handle>,
}

impl SortEngineBuilder {
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceLookup>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// 网络调用所在的运行时，缺省取当前运行时。
    pub fn network(mut self, handle: Handle) -> Self {
        self.network = Some(handle);
        self
    }

    pub fn build(self) -> Result<SortEngine> {
        let network = match self.network {
            Some(handle) => handle,
            None => Handle::try_current()
                .map_err(|err| anyhow!("sort engine requires a tokio runtime: {err}"))?,
        };
        let clock: Clock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(now_ts),
        };
        let config = self.config;
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.capacity,
            config.rate_limit.window_s,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            limiter,
            PendingQueue::new(config.queue.max_size),
            config.workers.pool_size,
            self.service,
            config.llm.timeout_s,
            clock.clone(),
            network.clone(),
        ));
        let cache = Arc::new(VersionedCache::new(config.cache.max_size, config.cache.ttl_s));
        let (resolutions_tx, resolutions_rx) = mpsc::unbounded_channel();
        Ok(SortEngine {
            inner: Arc::new(EngineInner {
                config,
                clock,
                network,
                preferences: self.preferences.unwrap_or_else(|| Arc::new(AllowAll)),
                gate: DebounceGate::new(),
                cache,
                tracker: ChangeTracker::new(),
                dispatcher,
                events: EventHub::default(),
                resolutions_tx,
                resolutions_rx: Mutex::new(resolutions_rx),
                workers: ParkingMutex::new(Vec::new()),
            }),
        })
    }
}

impl SortEngine {
    pub fn builder(config: Config, service: Arc<dyn TextService>) -> SortEngineBuilder {
        SortEngineBuilder {
            config,
            service,
            clock: None,
            preferences: None,
            network: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn subscribe(&self, subscriber: Arc<dyn SortSubscriber>) {
        self.inner.events.subscribe(subscriber);
    }

    /// 外部观察到的变更（移动、拾取、丢弃、关闭）都要记录。
    pub fn record_mutation(&self, key: &str) {
        self.inner.tracker.record(key, (self.inner.clock)());
    }

    /// 目标被销毁或卸载后清理变更记录。
    pub fn forget(&self, key: &str) {
        self.inner.tracker.forget(key);
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.inner.gate.is_busy(key)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            limiter: self.inner.dispatcher.limiter().stats(),
            queued: self.inner.dispatcher.queued(),
            cached: self.inner.cache.len(),
            active_sessions: self.inner.gate.active(),
        }
    }

    /// 启动排队分发与缓存清理两个后台任务，重复调用无副作用。
    pub fn start(&self) {
        let mut workers = self.inner.workers.lock();
        if !workers.is_empty() {
            return;
        }
        let config = &self.inner.config;
        workers.push(
            self.inner
                .dispatcher
                .spawn_ticker(Duration::from_millis(config.queue.tick_ms.max(1))),
        );
        workers.push(self.inner.cache.spawn_sweeper(
            &self.inner.network,
            Duration::from_secs_f64(config.cache.cleanup_interval_s.max(1.0)),
            self.inner.clock.clone(),
        ));
    }

    /// 手动执行一次排队分发。
    pub fn dispatch_pending(&self) -> usize {
        self.inner.dispatcher.tick()
    }

    pub fn shutdown(&self) {
        let mut workers = self.inner.workers.lock();
        for handle in workers.drain(..) {
            handle.abort();
        }
    }
}

fn cache_key(kind: TargetKind, fingerprint: &str) -> String {
    format!("{}|{fingerprint}", kind.as_str())
}
