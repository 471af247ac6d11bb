use governor::{
    Quota, RateLimiter,
    clock::MonotonicClock,
    state::{InMemoryState, direct::NotKeyed},
};
use std::{num::NonZeroU32, sync::Arc, time::{Duration, SystemTime, UNIX_EPOCH}};
use std::sync::atomic::{AtomicU64, Ordering};

pub type Limiter = Arc<RateLimiter<NotKeyed, InMemoryState, MonotonicClock>>;

pub fn make_limiter(rpm: u32) -> Limiter {
    let q = Quota::per_minute(NonZeroU32::new(rpm.max(1)).unwrap());
    Arc::new(RateLimiter::direct(q))
}

/// Server-advised wait, held by the client instance (not a process-wide
/// static) and honored before the next request goes out.
#[derive(Debug, Default)]
pub struct Cooldown(AtomicU64);

impl Cooldown {
    pub fn set_secs(&self, secs: u64) {
        let until = now_secs() + secs;
        let prev = self.0.load(Ordering::Relaxed);
        if until > prev {
            self.0.store(until, Ordering::Relaxed);
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        self.0.load(Ordering::Relaxed).saturating_sub(now_secs())
    }
}

pub async fn gate(l: &Limiter, cooldown: &Cooldown) {
    let rem = cooldown.remaining_secs();
    if rem > 0 {
        tokio::time::sleep(Duration::from_secs(rem)).await;
    }
    l.until_ready().await;
}

#[inline]
fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}
