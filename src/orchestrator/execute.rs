// 整理流水线：游戏线程负责提取与提交，网络运行时负责提示词、外部调用与解析，两者通过通道衔接。
use super::*;

impl SortEngine {
    /// 游戏线程入口：边界检查、指纹去抖、缓存查询，未命中时把外部调用交给网络运行时。
    pub fn submit<H: HostState + ?Sized>(&self, host: &mut H, trigger: Trigger) -> TriggerOutcome {
        let inner = &self.inner;
        let Trigger {
            key,
            snapshot,
            force,
        } = trigger;
        let kind = snapshot.kind();

        if inner.gate.is_busy(&key) {
            debug!("sort trigger ignored, busy: {key}");
            return TriggerOutcome::Ignored(IgnoreReason::Busy);
        }
        if !inner.preferences.auto_sort_enabled(&key, kind) {
            return TriggerOutcome::Ignored(IgnoreReason::PreferenceOff);
        }
        if let Destination::Container(container) = &snapshot {
            let sort = &inner.config.sort;
            if sort.skip_small_containers && container.size() < sort.small_container_slots {
                return TriggerOutcome::Ignored(IgnoreReason::SmallContainer);
            }
        }

        let now = (inner.clock)();
        let mut session = OperationSession::extract(key, &snapshot, now);
        if session.fingerprint.is_empty() {
            return TriggerOutcome::Ignored(IgnoreReason::Empty);
        }
        inner.events.emit(&SortEvent::ContentAvailable {
            key: session.key.clone(),
            items: session.items.clone(),
        });

        let cooldown = match kind {
            TargetKind::Container => inner.config.sort.container_cooldown_s,
            TargetKind::Inventory => inner.config.sort.inventory_cooldown_s,
        };
        if !force
            && inner
                .gate
                .should_skip(&session.key, &session.fingerprint, now, cooldown)
        {
            session.advance(SessionStage::SkippedDebounce);
            return TriggerOutcome::Skipped;
        }

        let verdict = inner.events.emit(&SortEvent::PreOperation {
            key: session.key.clone(),
            kind,
        });
        if verdict == EventVerdict::Cancel {
            return TriggerOutcome::Ignored(IgnoreReason::Cancelled);
        }
        if !inner.gate.try_begin(&session.key, session.id) {
            return TriggerOutcome::Ignored(IgnoreReason::Busy);
        }
        // 强制整理不刷新去抖记录，避免影响后续普通触发的冷却。
        if !force {
            inner.gate.record(&session.key, &session.fingerprint, now);
        }

        let cache_key = cache_key(kind, &session.fingerprint);
        let last_mutation_at = inner.tracker.last_mutation_at(&session.key);
        if let Some(cached) = inner.cache.get_if_valid(&cache_key, last_mutation_at, now) {
            session.advance(SessionStage::CacheHit);
            session.from_cache = true;
            let directives = parser::directives_from_placement(&cached);
            let result = decode_directives(&session, &directives);
            let report = self.finish(host, Resolution { session, result });
            return TriggerOutcome::Finished(report);
        }

        session.advance(SessionStage::CacheMiss);
        let session_id = session.id;
        let engine = self.clone();
        inner.network.spawn(async move {
            engine.resolve_remote(session).await;
        });
        TriggerOutcome::Pending { session_id }
    }

    /// 非阻塞地取出已完成的网络结果并提交。
    pub fn pump<H: HostState + ?Sized>(&self, host: &mut H) -> Vec<SortReport> {
        let mut ready = Vec::new();
        {
            let Ok(mut receiver) = self.inner.resolutions_rx.try_lock() else {
                return Vec::new();
            };
            while let Ok(resolution) = receiver.try_recv() {
                ready.push(resolution);
            }
        }
        ready
            .into_iter()
            .map(|resolution| self.finish(host, resolution))
            .collect()
    }

    /// 等待下一个网络结果并提交。
    pub async fn next_report<H: HostState + ?Sized>(&self, host: &mut H) -> Option<SortReport> {
        let resolution = {
            let mut receiver = self.inner.resolutions_rx.lock().await;
            receiver.recv().await?
        };
        Some(self.finish(host, resolution))
    }

    async fn resolve_remote(&self, mut session: OperationSession) {
        let inner = &self.inner;
        let (prompt, model) = match session.kind {
            TargetKind::Container => (
                build_container_prompt(&session.items),
                select_model(&inner.config.llm, session.kind, session.items.len()),
            ),
            TargetKind::Inventory => (
                build_inventory_prompt(&session.items),
                select_model(&inner.config.llm, session.kind, session.items.len()),
            ),
        };

        session.advance(SessionStage::RateCheck);
        let result = match inner
            .dispatcher
            .submit(prompt, model, session.key.clone())
        {
            Ok(admission) => {
                let receiver = match admission {
                    Admission::Dispatched(receiver) => {
                        session.advance(SessionStage::Dispatched);
                        receiver
                    }
                    Admission::Queued(receiver) => {
                        session.advance(SessionStage::Queued);
                        receiver
                    }
                };
                session.advance(SessionStage::AwaitingResponse);
                let reply = receiver.await.unwrap_or_default();
                if reply.trim().is_empty() {
                    session.advance(SessionStage::AbortEmpty);
                    Err(SortError::empty_response())
                } else {
                    let directives = parse_directives(&reply);
                    let result = decode_directives(&session, &directives);
                    session.advance(if result.is_ok() {
                        SessionStage::ParseOk
                    } else {
                        SessionStage::AbortApplyFail
                    });
                    result
                }
            }
            Err(err) => {
                session.advance(SessionStage::AbortQueueFull);
                Err(err)
            }
        };

        if inner
            .resolutions_tx
            .send(Resolution { session, result })
            .is_err()
        {
            warn!("sort engine dropped before resolution could be applied");
        }
    }

    fn finish<H: HostState + ?Sized>(&self, host: &mut H, resolution: Resolution) -> SortReport {
        let Resolution {
            mut session,
            result,
        } = resolution;
        let outcome = self.validate_and_commit(host, &mut session, result);
        self.inner.gate.finish(&session.key);
        match &outcome {
            Ok(placement) => {
                info!(
                    "sort applied: key={}, kind={}, stacks={}, from_cache={}",
                    session.key,
                    session.kind.as_str(),
                    placement.items().len(),
                    session.from_cache
                );
                self.inner.events.emit(&SortEvent::Completed {
                    key: session.key.clone(),
                    placement: placement.clone(),
                    from_cache: session.from_cache,
                });
            }
            Err(err) => {
                warn!(
                    "sort aborted: key={}, stage={:?}, code={}, reason={}",
                    session.key,
                    session.stage,
                    err.code(),
                    err.message()
                );
                self.inner.events.emit(&SortEvent::Failed {
                    key: session.key.clone(),
                    code: err.code(),
                    reason: err.message().to_string(),
                });
            }
        }
        SortReport::new(&session, outcome)
    }

    fn validate_and_commit<H: HostState + ?Sized>(
        &self,
        host: &mut H,
        session: &mut OperationSession,
        result: Result<Placement, SortError>,
    ) -> Result<Placement, SortError> {
        let inner = &self.inner;
        let placement = result?;
        if inner.tracker.mutated_since(&session.key, session.extracted_at) {
            session.advance(SessionStage::AbortStale);
            return Err(SortError::concurrent_mutation());
        }
        let Some(destination) = host.destination_mut(&session.key) else {
            session.advance(SessionStage::AbortStale);
            return Err(SortError::destination_unavailable());
        };

        session.advance(SessionStage::Validating);
        if let Err(err) = verify_conservation(&session.items, &placement.items()) {
            session.advance(SessionStage::AbortCountMismatch);
            return Err(err);
        }

        session.advance(SessionStage::Committing);
        if let Err(err) = apply::commit(destination, &placement) {
            session.advance(SessionStage::AbortApplyFail);
            return Err(err);
        }
        session.advance(SessionStage::Done);

        if !session.from_cache {
            inner.cache.put(
                &cache_key(session.kind, &session.fingerprint),
                placement.clone(),
                session.extracted_at,
            );
        }
        Ok(placement)
    }
}

/// 按目标类型把指令落成放置结果；背包模式的溢出在这里就会失败。
fn decode_directives(
    session: &OperationSession,
    directives: &[Directive],
) -> Result<Placement, SortError> {
    match session.kind {
        TargetKind::Container => Ok(Placement::Container(resolve_container(
            directives,
            &session.items,
        ))),
        TargetKind::Inventory => {
            resolve_inventory(directives, &session.items, &session.worn).map(Placement::Inventory)
        }
    }
}
