//! 可注入的单调时钟。
//!
//! 生成缓存依赖“空闲时长”判断条目过期；直接读取系统时间会让过期测试难以复现，
//! 因此缓存通过 [`Clock`] 读取时间，测试中注入 [`MockClock`] 手动推进。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 抽象的单调时间来源。
///
/// # 接口约束（What）
/// - `now` 必须单调不减；
/// - 实现需满足 `Send + Sync + 'static`，以 `Arc<dyn Clock>` 在缓存与分配通知之间共享。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;
}

/// 直接委托 [`Instant::now`] 的系统时钟。
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手动推进的虚拟时钟。
///
/// # 教案式说明
/// - **意图 (Why)**：让“空闲 8 小时后过期”这类行为在测试里瞬间可达；
/// - **契约 (What)**：`now` 返回创建时刻加上累计推进量，`advance` 只增不减；
/// - **实现 (How)**：克隆共享同一份偏移量，缓存与测试持有同一个时钟视图。
#[derive(Clone, Debug)]
pub struct MockClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// 以当前时刻为起点创建时钟。
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// 向前推进指定时长。
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset += by;
    }

    /// 已推进的总时长。
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_for_all_clones() {
        let clock = MockClock::new();
        let view = clock.clone();
        let start = view.now();
        clock.advance(Duration::from_secs(30));
        assert_eq!(view.now() - start, Duration::from_secs(30));
        assert_eq!(view.elapsed(), Duration::from_secs(30));
    }
}
