use std::time::SystemTime;

/// Wall-clock source for audit timestamps, injectable so tests are deterministic (§6,
/// "Wall-clock source for audit timestamps").
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
