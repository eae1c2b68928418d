//! OS 线程接力后端
//!
//! 每个上下文由一个独立的 OS 线程承载，但任意时刻只有接力棒持有者在运行：
//! `resume` 把接力棒交给上下文线程并等待它交回，`suspend` 反之。

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use super::{ContextSwitch, Entry, Suspend};
use crate::config::{MAX_STACK_SIZE, MIN_STACK_SIZE};
use crate::error::{SchedError, SchedResult};

/// 线程名编号
static THREAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// 接力棒持有方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    /// 恢复者（调度循环）在运行
    Resumer,
    /// 上下文线程在运行
    Context,
}

/// 接力棒
struct Baton {
    turn: Mutex<Turn>,
    cond: Condvar,
    /// 是否已经被 resume 过
    started: AtomicBool,
    /// 入口是否已返回
    finished: AtomicBool,
    /// 入口是否 panic
    panicked: AtomicBool,
    /// 未启动即被丢弃
    cancelled: AtomicBool,
}

impl Baton {
    /// 把执行权交给 `to` 并等待它交回
    fn hand_over(&self, to: Turn) {
        let mut turn = self.turn.lock();
        *turn = to;
        self.cond.notify_all();
        while *turn == to {
            self.cond.wait(&mut turn);
        }
    }

    /// 等待轮到 `who`
    fn wait_for(&self, who: Turn) {
        let mut turn = self.turn.lock();
        while *turn != who {
            self.cond.wait(&mut turn);
        }
    }

    /// 交出执行权，不再等待
    fn release(&self, to: Turn) {
        let mut turn = self.turn.lock();
        *turn = to;
        self.cond.notify_all();
    }
}

/// OS 线程承载的上下文
pub struct ThreadContext {
    baton: Arc<Baton>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadContext {
    /// 创建上下文并立即启动承载线程（线程在第一次 resume 前保持等待）
    pub fn new(stack_size: usize, entry: Entry) -> SchedResult<Self> {
        if stack_size > MAX_STACK_SIZE {
            return Err(SchedError::exhausted(
                "thread stack",
                stack_size,
                format!("exceeds the {} byte limit", MAX_STACK_SIZE),
            ));
        }

        let baton = Arc::new(Baton {
            turn: Mutex::new(Turn::Resumer),
            cond: Condvar::new(),
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            panicked: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        });

        let inner = Arc::clone(&baton);
        let thread = thread::Builder::new()
            .name(format!("context-{}", THREAD_SEQ.fetch_add(1, Ordering::Relaxed)))
            .stack_size(stack_size.max(MIN_STACK_SIZE))
            .spawn(move || {
                inner.wait_for(Turn::Context);
                if !inner.cancelled.load(Ordering::Acquire) {
                    let suspender = ThreadSuspender { baton: &inner };
                    if panic::catch_unwind(AssertUnwindSafe(|| entry(&suspender))).is_err() {
                        inner.panicked.store(true, Ordering::Release);
                    }
                }
                inner.finished.store(true, Ordering::Release);
                inner.release(Turn::Resumer);
            })
            .map_err(|e| SchedError::exhausted("thread stack", stack_size, e.to_string()))?;

        Ok(Self {
            baton,
            thread: Some(thread),
        })
    }
}

impl ContextSwitch for ThreadContext {
    fn resume(&mut self) {
        if self.is_finished() {
            return;
        }
        self.baton.started.store(true, Ordering::Release);
        self.baton.hand_over(Turn::Context);
    }

    fn is_finished(&self) -> bool {
        self.baton.finished.load(Ordering::Acquire)
    }

    fn panicked(&self) -> bool {
        self.baton.panicked.load(Ordering::Acquire)
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        if self.is_finished() {
            let _ = handle.join();
        } else if !self.baton.started.load(Ordering::Acquire) {
            // 从未运行过：让线程跳过入口直接退出
            self.baton.cancelled.store(true, Ordering::Release);
            self.baton.release(Turn::Context);
            let _ = handle.join();
        }
        // 运行到一半的上下文只能分离：承载线程永远停在挂起点，
        // 入口闭包和线程栈都不会释放
    }
}

/// 上下文线程内部的挂起句柄
struct ThreadSuspender<'a> {
    baton: &'a Baton,
}

impl Suspend for ThreadSuspender<'_> {
    fn suspend(&self) {
        self.baton.hand_over(Turn::Resumer);
    }
}
