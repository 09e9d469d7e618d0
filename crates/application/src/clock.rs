use chrono::{DurationRound, Utc};
use domain::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    // 截断到微秒，和 TIMESTAMPTZ 存下来的值一致
    fn now(&self) -> Timestamp {
        let now = Utc::now();
        now.duration_trunc(chrono::Duration::microseconds(1))
            .unwrap_or(now)
    }
}

/// 固定时间的时钟（用于测试）
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
