// 限流排队与分发：被限流拒绝的请求进入有界 FIFO，定时按令牌逐个分发到工作池。
use super::*;

pub struct PendingRequest {
    pub id: Uuid,
    pub prompt: String,
    pub model: String,
    /// 请求来源，通常为目标 key。
    pub context: String,
    pub enqueued_at: f64,
    reply: oneshot::Sender<String>,
}

pub struct PendingQueue {
    max_size: usize,
    items: ParkingMutex<VecDeque<PendingRequest>>,
}

impl PendingQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            items: ParkingMutex::new(VecDeque::new()),
        }
    }

    /// 队列已满时原样退回请求。
    pub fn try_push(&self, request: PendingRequest) -> Result<(), PendingRequest> {
        let mut items = self.items.lock();
        if items.len() >= self.max_size {
            return Err(request);
        }
        items.push_back(request);
        Ok(())
    }

    pub fn pop(&self) -> Option<PendingRequest> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// 提交结果：直接分发或进入排队，两者都通过同一个接收端等待回复。
pub enum Admission {
    Dispatched(oneshot::Receiver<String>),
    Queued(oneshot::Receiver<String>),
}

pub struct Dispatcher {
    limiter: Arc<RateLimiter>,
    queue: PendingQueue,
    permits: Arc<Semaphore>,
    service: Arc<dyn TextService>,
    timeout_s: u64,
    clock: Clock,
    network: Handle,
}

impl Dispatcher {
    pub fn new(
        limiter: Arc<RateLimiter>,
        queue: PendingQueue,
        pool_size: usize,
        service: Arc<dyn TextService>,
        timeout_s: u64,
        clock: Clock,
        network: Handle,
    ) -> Self {
        Self {
            limiter,
            queue,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            service,
            timeout_s,
            clock,
            network,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn submit(
        &self,
        prompt: String,
        model: String,
        context: String,
    ) -> Result<Admission, SortError> {
        let now = (self.clock)();
        let (reply, receiver) = oneshot::channel();
        let request = PendingRequest {
            id: Uuid::new_v4(),
            prompt,
            model,
            context,
            enqueued_at: now,
            reply,
        };
        if self.limiter.try_acquire(now) {
            self.spawn_worker(request);
            return Ok(Admission::Dispatched(receiver));
        }
        match self.queue.try_push(request) {
            Ok(()) => {
                debug!("sort request queued, pending={}", self.queue.len());
                Ok(Admission::Queued(receiver))
            }
            Err(request) => {
                warn!("sort request dropped, queue full: {}", request.context);
                Err(SortError::queue_full())
            }
        }
    }

    /// 每获得一个令牌分发一个排队请求，返回本次分发数量。
    pub fn tick(&self) -> usize {
        let now = (self.clock)();
        let mut dispatched = 0;
        while !self.queue.is_empty() {
            if !self.limiter.try_acquire(now) {
                break;
            }
            let Some(request) = self.queue.pop() else {
                break;
            };
            debug!(
                "dispatching queued sort request {} after {:.2}s",
                request.id,
                now - request.enqueued_at
            );
            self.spawn_worker(request);
            dispatched += 1;
        }
        dispatched
    }

    // 外部调用的任何失败（含超时）都归一为空回复；timeout_s 为 0 时不设上限。
    fn spawn_worker(&self, request: PendingRequest) {
        let service = self.service.clone();
        let permits = self.permits.clone();
        let timeout_s = self.timeout_s;
        self.network.spawn(async move {
            let PendingRequest {
                id,
                prompt,
                model,
                context,
                reply,
                ..
            } = request;
            let Ok(_permit) = permits.acquire_owned().await else {
                let _ = reply.send(String::new());
                return;
            };
            let call = AssertUnwindSafe(service.complete(&prompt, &model)).catch_unwind();
            let outcome = if timeout_s > 0 {
                match tokio::time::timeout(Duration::from_secs(timeout_s), call).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("text service call timed out after {timeout_s}s for {context} ({id})");
                        let _ = reply.send(String::new());
                        return;
                    }
                }
            } else {
                call.await
            };
            let text = match outcome {
                Ok(Ok(text)) => text,
                Ok(Err(err)) => {
                    warn!("text service call failed for {context} ({id}): {err}");
                    String::new()
                }
                Err(_) => {
                    warn!("text service call panicked for {context} ({id})");
                    String::new()
                }
            };
            let _ = reply.send(text);
        });
    }

    pub(super) fn spawn_ticker(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let dispatcher = Arc::downgrade(self);
        self.network.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                dispatcher.tick();
            }
        })
    }
}
