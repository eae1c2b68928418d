//! 载体线程 (Carrier)
//!
//! 运行调度循环的操作系统线程，上下文在其上被切入执行

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_utils::sync::WaitGroup;
use parking_lot::Mutex;

use super::context::CtxId;
use super::kernel::EventPort;
use super::scheduler::Scheduler;
use crate::error::{SchedError, SchedResult};

/// 载体线程
pub struct Carrier {
    /// 载体编号
    pub id: usize,
    /// OS 线程句柄
    thread: Mutex<Option<JoinHandle<()>>>,
    /// 内核事件端口（只由本载体读取）
    port: EventPort,
    /// 是否应该停止
    should_stop: AtomicBool,
    /// 调度循环是否已退出
    finished: AtomicBool,
    /// 切入上下文的次数
    dispatched: AtomicU64,
}

impl Carrier {
    /// 创建新的载体
    pub fn new(id: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            thread: Mutex::new(None),
            port: EventPort::new(),
            should_stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
        })
    }

    /// 启动载体线程
    ///
    /// 线程先释放 `ready` 报到，再停在调度器的放行点，放行后进入调度循环
    pub fn start(self: &Arc<Self>, scheduler: Arc<Scheduler>, ready: WaitGroup) -> SchedResult<()> {
        let carrier = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("carrier-{}", self.id))
            .spawn(move || {
                drop(ready);
                scheduler.wait_released();
                carrier.run_loop(&scheduler);
            })
            .map_err(|e| SchedError::exhausted("carrier thread", 0, e.to_string()))?;

        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// 调度循环，直到所有上下文终止
    pub fn run_loop(&self, scheduler: &Scheduler) {
        loop {
            if self.should_stop.load(Ordering::Relaxed) {
                break;
            }

            // 先处理上一次切出产生的事件，再做调度决策
            scheduler.merge_completions(&self.port);
            for event in self.port.drain() {
                scheduler.handle_event(event);
            }

            if let Some(id) = scheduler.pop_ready() {
                self.execute(scheduler, id);
                continue;
            }

            if scheduler.is_drained() {
                break;
            }

            // 就绪队列为空但仍有上下文：在阻塞中，或正在其他载体上运行
            scheduler.idle_wait(&self.port);
        }
        self.finished.store(true, Ordering::Release);
    }

    /// 切入一个上下文
    fn execute(&self, scheduler: &Scheduler, id: CtxId) {
        let Some(ctx) = scheduler.context(id) else {
            return;
        };
        if !scheduler.enter(&ctx) {
            return;
        }

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        ctx.resume();

        scheduler.leave(&ctx, &self.port);
    }

    /// 请求停止（当前上下文交还控制权后生效）
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::Release);
    }

    /// 等待线程结束
    pub fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// 调度循环是否已退出
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// 获取切入上下文的次数
    #[inline]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Carrier")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .field("dispatched", &self.dispatched())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::scheduler::SchedulerConfig;

    #[test]
    fn test_carrier_runs_until_drained() {
        let scheduler = Arc::new(Scheduler::with_config(SchedulerConfig::default()).unwrap());
        for _ in 0..3 {
            scheduler.spawn(|y| y.yield_now()).unwrap();
        }

        let ready = WaitGroup::new();
        let carrier = Carrier::new(0);
        carrier.start(Arc::clone(&scheduler), ready.clone()).unwrap();
        ready.wait();
        assert_eq!(carrier.dispatched(), 0);

        scheduler.release();
        carrier.join();

        assert!(carrier.is_finished());
        assert_eq!(carrier.dispatched(), 6);
        assert!(scheduler.is_drained());
    }

    #[test]
    fn test_stopped_carrier_exits_without_dispatching() {
        let scheduler = Scheduler::with_config(SchedulerConfig::default()).unwrap();
        scheduler.spawn(|_| {}).unwrap();

        let carrier = Carrier::new(1);
        carrier.stop();
        carrier.run_loop(&scheduler);
        assert!(carrier.is_finished());
        assert_eq!(carrier.dispatched(), 0);
        assert_eq!(scheduler.live_count(), 1);
    }
}
