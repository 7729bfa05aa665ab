// 事件分发：统一的订阅接口覆盖内容可用、整理前（可取消）、完成与失败四类事件。
use super::*;

#[derive(Debug, Clone)]
pub enum SortEvent {
    ContentAvailable {
        key: String,
        items: Vec<ItemStack>,
    },
    PreOperation {
        key: String,
        kind: TargetKind,
    },
    Completed {
        key: String,
        placement: Placement,
        from_cache: bool,
    },
    Failed {
        key: String,
        code: &'static str,
        reason: String,
    },
}

impl SortEvent {
    pub fn key(&self) -> &str {
        match self {
            SortEvent::ContentAvailable { key, .. }
            | SortEvent::PreOperation { key, .. }
            | SortEvent::Completed { key, .. }
            | SortEvent::Failed { key, .. } => key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SortEvent::ContentAvailable { .. } => "content_available",
            SortEvent::PreOperation { .. } => "pre_operation",
            SortEvent::Completed { .. } => "completed",
            SortEvent::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventVerdict {
    #[default]
    Continue,
    /// 仅对 PreOperation 生效。
    Cancel,
}

/// 订阅者在游戏线程上同步收到事件。
pub trait SortSubscriber: Send + Sync {
    fn on_event(&self, event: &SortEvent) -> EventVerdict;
}

#[derive(Default)]
pub(super) struct EventHub {
    subscribers: ParkingRwLock<Vec<Arc<dyn SortSubscriber>>>,
}

impl EventHub {
    pub(super) fn subscribe(&self, subscriber: Arc<dyn SortSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// 所有订阅者都会收到事件，任一订阅者取消即视为取消。
    pub(super) fn emit(&self, event: &SortEvent) -> EventVerdict {
        let subscribers = self.subscribers.read().clone();
        let mut verdict = EventVerdict::Continue;
        for subscriber in subscribers {
            if subscriber.on_event(event) == EventVerdict::Cancel {
                verdict = EventVerdict::Cancel;
            }
        }
        if verdict == EventVerdict::Cancel {
            debug!("sort event {} cancelled for {}", event.name(), event.key());
        }
        verdict
    }
}

/// 把事件转发到通道，便于异步消费。
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<SortEvent>,
}

impl ChannelSubscriber {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SortEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl SortSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &SortEvent) -> EventVerdict {
        let _ = self.sender.send(event.clone());
        EventVerdict::Continue
    }
}

pub(super) fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Veto;

    impl SortSubscriber for Veto {
        fn on_event(&self, event: &SortEvent) -> EventVerdict {
            match event {
                SortEvent::PreOperation { .. } => EventVerdict::Cancel,
                _ => EventVerdict::Continue,
            }
        }
    }

    #[test]
    fn every_subscriber_sees_event_and_any_cancel_wins() {
        let hub = EventHub::default();
        let (forward, mut receiver) = ChannelSubscriber::new();
        hub.subscribe(Arc::new(Veto));
        hub.subscribe(Arc::new(forward));
        let verdict = hub.emit(&SortEvent::PreOperation {
            key: "chest".to_string(),
            kind: TargetKind::Container,
        });
        assert_eq!(verdict, EventVerdict::Cancel);
        assert_eq!(receiver.try_recv().unwrap().name(), "pre_operation");

        let verdict = hub.emit(&SortEvent::Failed {
            key: "chest".to_string(),
            code: "EMPTY_RESPONSE",
            reason: "empty response".to_string(),
        });
        assert_eq!(verdict, EventVerdict::Continue);
        assert_eq!(receiver.try_recv().unwrap().key(), "chest");
    }
}
