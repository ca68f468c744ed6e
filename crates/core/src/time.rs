use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::CoreError;
use crate::hlc::physical_now;

/// Wall-clock milliseconds since Unix epoch.
pub trait TimeSource: Send {
    fn now_ms(&self) -> Result<u64, CoreError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_ms(&self) -> Result<u64, CoreError> {
        physical_now()
    }
}

/// Hand-advanced time shared between clones. Used to drive expiry and
/// timers deterministically.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn get(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.now.fetch_add(ms, Ordering::SeqCst) + ms
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> Result<u64, CoreError> {
        Ok(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_time_is_shared() {
        let a = ManualTime::new(1_000);
        let b = a.clone();
        assert_eq!(a.advance(500), 1_500);
        assert_eq!(b.now_ms().unwrap(), 1_500);
    }
}
