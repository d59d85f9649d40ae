//! Per-node command rate limiting (§10.6), a sliding window over a dashmap
//! adapted from `signing::service`'s per-session `RateLimiter`.

use dashmap::DashMap;
use uuid::Uuid;

pub struct RateLimiter {
    requests: DashMap<Uuid, Vec<u64>>,
    window_seconds: u64,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window_seconds: u64, max_requests: u32) -> Self {
        Self {
            requests: DashMap::new(),
            window_seconds,
            max_requests,
        }
    }

    pub fn check_and_record(&self, node_id: Uuid, now_unix: u64) -> bool {
        let cutoff = now_unix.saturating_sub(self.window_seconds);
        let mut entry = self.requests.entry(node_id).or_default();
        entry.retain(|&ts| ts > cutoff);
        if entry.len() >= self.max_requests as usize {
            return false;
        }
        entry.push(now_unix);
        true
    }

    pub fn cleanup(&self, now_unix: u64) {
        let cutoff = now_unix.saturating_sub(self.window_seconds);
        self.requests.retain(|_, requests| {
            requests.retain(|&ts| ts > cutoff);
            !requests.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(60, 2);
        let node = Uuid::new_v4();
        assert!(limiter.check_and_record(node, 1000));
        assert!(limiter.check_and_record(node, 1001));
        assert!(!limiter.check_and_record(node, 1002));
    }

    #[test]
    fn window_slides_forward() {
        let limiter = RateLimiter::new(60, 1);
        let node = Uuid::new_v4();
        assert!(limiter.check_and_record(node, 1000));
        assert!(!limiter.check_and_record(node, 1010));
        assert!(limiter.check_and_record(node, 1061));
    }
}
