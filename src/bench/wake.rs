//! 完成计数与唤醒事件

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct WakeState {
    /// 第一次触发的时间
    fired_at: Option<Instant>,
    /// 触发请求次数
    fires: usize,
}

/// 只触发一次的唤醒事件
///
/// 之后的触发请求会被计数但不再改变状态
pub struct WakeEvent {
    state: Mutex<WakeState>,
    cond: Condvar,
}

impl WakeEvent {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WakeState::default()),
            cond: Condvar::new(),
        }
    }

    /// 触发事件，返回 true 表示这是第一次触发
    pub fn fire(&self) -> bool {
        let mut state = self.state.lock();
        state.fires += 1;
        if state.fired_at.is_some() {
            return false;
        }
        state.fired_at = Some(Instant::now());
        self.cond.notify_all();
        true
    }

    /// 等待事件触发
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.fired_at.is_none() {
            self.cond.wait(&mut state);
        }
    }

    /// 最多等待 `timeout`，返回事件是否已触发
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.fired_at.is_none() {
            let _ = self.cond.wait_for(&mut state, timeout);
        }
        state.fired_at.is_some()
    }

    /// 是否已触发
    pub fn is_fired(&self) -> bool {
        self.state.lock().fired_at.is_some()
    }

    /// 第一次触发的时间
    pub fn fired_at(&self) -> Option<Instant> {
        self.state.lock().fired_at
    }

    /// 触发请求次数
    pub fn fire_count(&self) -> usize {
        self.state.lock().fires
    }
}

impl Default for WakeEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// 完成计数器
///
/// 每个上下文完成全部操作后到达一次，第 N 次到达触发唤醒事件
pub struct CompletionLatch {
    count: CachePadded<AtomicUsize>,
    target: usize,
    wake: WakeEvent,
}

impl CompletionLatch {
    pub fn new(target: usize) -> Self {
        Self {
            count: CachePadded::new(AtomicUsize::new(0)),
            target,
            wake: WakeEvent::new(),
        }
    }

    /// 记录一次完成，返回 true 表示本次到达触发了唤醒
    pub fn arrive(&self) -> bool {
        let n = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        n == self.target && self.wake.fire()
    }

    /// 已到达数量
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// 唤醒事件
    #[inline]
    pub fn wake(&self) -> &WakeEvent {
        &self.wake
    }
}

impl std::fmt::Debug for CompletionLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionLatch")
            .field("count", &self.count())
            .field("target", &self.target)
            .field("fired", &self.wake.is_fired())
            .finish()
    }
}
