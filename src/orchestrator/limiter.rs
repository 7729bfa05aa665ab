use super::*;

#[derive(Debug, Clone, Serialize)]
pub struct LimiterStats {
    pub capacity: u32,
    pub tokens: u32,
    pub allowed: u64,
    pub denied: u64,
}

struct WindowState {
    tokens: u32,
    window_start: Option<f64>,
}

/// 固定窗口限流：窗口到期时令牌直接重置为满额，不做连续回填。
pub struct RateLimiter {
    capacity: u32,
    window_s: f64,
    state: ParkingMutex<WindowState>,
    allowed: AtomicU64,
    denied: AtomicU64,
}

impl RateLimiter {
    pub fn new(capacity: u32, window_s: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window_s: window_s.max(0.0),
            state: ParkingMutex::new(WindowState {
                tokens: capacity,
                window_start: None,
            }),
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }

    pub fn try_acquire(&self, now: f64) -> bool {
        let mut state = self.state.lock();
        let expired = match state.window_start {
            Some(start) => now - start >= self.window_s,
            None => true,
        };
        if expired {
            state.tokens = self.capacity;
            state.window_start = Some(now);
        }
        if state.tokens > 0 {
            state.tokens -= 1;
            self.allowed.fetch_add(1, AtomicOrdering::Relaxed);
            true
        } else {
            self.denied.fetch_add(1, AtomicOrdering::Relaxed);
            debug!("rate limiter denied request, window_start={:?}", state.window_start);
            false
        }
    }

    pub fn stats(&self) -> LimiterStats {
        let tokens = self.state.lock().tokens;
        LimiterStats {
            capacity: self.capacity,
            tokens,
            allowed: self.allowed.load(AtomicOrdering::Relaxed),
            denied: self.denied.load(AtomicOrdering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_reset_at_window_boundary() {
        let limiter = RateLimiter::new(3, 2.0);
        assert!(limiter.try_acquire(0.0));
        assert!(limiter.try_acquire(0.5));
        assert!(limiter.try_acquire(1.0));
        assert!(!limiter.try_acquire(1.9));
        // 窗口边界处允许一次完整突发。
        assert!(limiter.try_acquire(2.0));
        assert!(limiter.try_acquire(2.0));
        assert!(limiter.try_acquire(2.0));
        assert!(!limiter.try_acquire(3.99));
        let stats = limiter.stats();
        assert_eq!(stats.allowed, 6);
        assert_eq!(stats.denied, 2);
        assert_eq!(stats.tokens, 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let limiter = RateLimiter::new(0, 1.0);
        assert!(limiter.try_acquire(0.0));
        assert!(!limiter.try_acquire(0.1));
    }
}
