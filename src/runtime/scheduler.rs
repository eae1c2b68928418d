//! 调度器
//!
//! 持有上下文表、就绪队列和完成通知器，对上下文的让出、阻塞和终止
//! 做出反应。调度循环本身运行在载体线程上（见 `carrier.rs`）。

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::sync::WaitGroup;
use parking_lot::{Condvar, Mutex, RwLock};

use super::carrier::Carrier;
use super::context::{ContextStatus, CtxId, ExecutionContext, Signals, Yielder};
use super::kernel::{EventPort, Kernel, KernelEvent};
use super::notifier::CompletionNotifier;
use super::queue::ReadyQueue;
use super::switch::{BackendKind, Entry, Suspend};
use crate::config::{DEFAULT_KERNEL_WORKERS, DEFAULT_STACK_SIZE, IDLE_POLL_INTERVAL};
use crate::error::{SchedError, SchedResult};

/// 调度变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// 纯协作式：必须显式让出，阻塞调用会卡住整个载体线程
    Cooperative,
    /// 内核辅助：阻塞调用自动切出，完成后经完成通知器重新就绪
    KernelAssisted,
}

impl Variant {
    /// 变体名称
    pub fn name(self) -> &'static str {
        match self {
            Variant::Cooperative => "cooperative",
            Variant::KernelAssisted => "kernel-assisted",
        }
    }
}

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 调度变体
    pub variant: Variant,
    /// 载体线程数量（0 表示使用 CPU 核心数）
    pub num_carriers: usize,
    /// 每个上下文的栈大小
    pub stack_size: usize,
    /// 上下文切换后端
    pub backend: BackendKind,
    /// 内核阻塞操作工作线程数
    pub kernel_workers: usize,
    /// 载体空闲时等待完成通知的间隔
    pub idle_poll: Duration,
    /// 是否记录调度轨迹
    pub trace: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Cooperative,
            num_carriers: 1,
            stack_size: DEFAULT_STACK_SIZE,
            backend: BackendKind::default(),
            kernel_workers: DEFAULT_KERNEL_WORKERS,
            idle_poll: IDLE_POLL_INTERVAL,
            trace: false,
        }
    }
}

/// 调度轨迹事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// 被切入
    Resumed(CtxId),
    /// 让出后回到就绪队列
    Yielded(CtxId),
    /// 进入阻塞
    Blocked(CtxId),
    /// 完成通知被取走，重新就绪
    Unblocked(CtxId),
    /// 终止
    Terminated(CtxId),
}

/// 调度计数
#[derive(Default)]
struct Counters {
    created: AtomicU64,
    resumes: AtomicU64,
    yields: AtomicU64,
    blocks: AtomicU64,
    unblocks: AtomicU64,
    terminations: AtomicU64,
    panics: AtomicU64,
}

/// 调度器
pub struct Scheduler {
    /// 配置
    config: SchedulerConfig,
    /// 上下文表，句柄即下标；终止后槽位置空
    contexts: RwLock<Vec<Option<Arc<ExecutionContext>>>>,
    /// 就绪队列
    ready: ReadyQueue,
    /// 完成通知器
    notifier: Arc<CompletionNotifier>,
    /// 内核（仅内核辅助变体）
    kernel: Option<Kernel>,
    /// 载体线程
    carriers: Mutex<Vec<Arc<Carrier>>>,
    /// 阻塞中的上下文数量
    blocked: AtomicUsize,
    /// 尚未终止的上下文数量
    live: AtomicUsize,
    /// 正在等待完成通知的载体数量
    idle_carriers: AtomicUsize,
    /// 载体线程是否已启动
    started: AtomicBool,
    /// 载体线程是否已被放行
    released: Mutex<bool>,
    release_cond: Condvar,
    /// 调度计数
    counters: Counters,
    /// 调度轨迹
    trace: Mutex<Vec<TraceEvent>>,
    /// 创建时间
    start_time: Instant,
}

impl Scheduler {
    /// 使用指定配置创建调度器
    pub fn with_config(mut config: SchedulerConfig) -> SchedResult<Self> {
        if config.num_carriers == 0 {
            config.num_carriers = super::num_processors();
        }
        if !BackendKind::available().contains(&config.backend) {
            return Err(SchedError::Unsupported("stack-switching backend"));
        }

        let notifier = Arc::new(CompletionNotifier::new());
        let kernel = match config.variant {
            Variant::Cooperative => None,
            Variant::KernelAssisted => Some(Kernel::new(config.kernel_workers, Arc::clone(&notifier))?),
        };

        Ok(Self {
            config,
            contexts: RwLock::new(Vec::new()),
            ready: ReadyQueue::new(),
            notifier,
            kernel,
            carriers: Mutex::new(Vec::new()),
            blocked: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            idle_carriers: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            released: Mutex::new(false),
            release_cond: Condvar::new(),
            counters: Counters::default(),
            trace: Mutex::new(Vec::new()),
            start_time: Instant::now(),
        })
    }

    /// 调度变体
    #[cfg(test)]
    pub fn variant(&self) -> Variant {
        self.config.variant
    }

    /// 创建新的上下文并放入就绪队列尾部
    ///
    /// 栈或承载线程分配失败时返回 `ResourceExhausted`，此时不会入队
    pub fn spawn<F>(&self, f: F) -> SchedResult<CtxId>
    where
        F: FnOnce(&Yielder) + Send + 'static,
    {
        let mut contexts = self.contexts.write();
        let id = u32::try_from(contexts.len())
            .map(CtxId)
            .map_err(|_| SchedError::exhausted("context handle", contexts.len(), "handle space exhausted"))?;

        let signals = Arc::new(Signals::new());
        let inner = Arc::clone(&signals);
        let variant = self.config.variant;
        let entry: Entry = Box::new(move |s: &dyn Suspend| {
            let yielder = Yielder::new(variant, &inner, s);
            if panic::catch_unwind(AssertUnwindSafe(|| f(&yielder))).is_err() {
                inner.mark_panicked();
            }
            inner.mark_terminated();
        });

        let switch = self.config.backend.create(self.config.stack_size, entry)?;
        contexts.push(Some(Arc::new(ExecutionContext::new(id, signals, switch))));
        drop(contexts);

        self.counters.created.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::AcqRel);
        self.push_ready(id);
        Ok(id)
    }

    /// 查找上下文（已终止的返回 None）
    pub fn context(&self, id: CtxId) -> Option<Arc<ExecutionContext>> {
        self.contexts.read().get(id.index()).and_then(|slot| slot.clone())
    }

    /// 查询上下文状态
    ///
    /// 已终止并被回收的上下文返回 `Terminated`，未知句柄返回 None
    #[cfg(test)]
    pub fn status(&self, id: CtxId) -> Option<ContextStatus> {
        let contexts = self.contexts.read();
        match contexts.get(id.index()) {
            Some(Some(ctx)) => Some(ctx.status()),
            Some(None) => Some(ContextStatus::Terminated),
            None => None,
        }
    }

    /// 启动载体线程
    ///
    /// 所有载体线程都创建好并停在放行点之后才统一放行，返回放行时刻。
    /// 部分载体创建失败时，已创建的载体照常放行
    pub fn start(self: &Arc<Self>) -> SchedResult<Instant> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(Instant::now()); // 已经在运行
        }

        let ready = WaitGroup::new();
        if let Err(e) = self.spawn_carriers(&ready) {
            drop(ready);
            self.release();
            return Err(e);
        }
        ready.wait();

        let released_at = Instant::now();
        self.release();
        Ok(released_at)
    }

    fn spawn_carriers(self: &Arc<Self>, ready: &WaitGroup) -> SchedResult<()> {
        let mut carriers = self.carriers.lock();
        for i in 0..self.config.num_carriers {
            let carrier = Carrier::new(i);
            carrier.start(Arc::clone(self), ready.clone())?;
            carriers.push(carrier);
        }
        Ok(())
    }

    /// 放行停在放行点的载体线程
    pub(super) fn release(&self) {
        let mut released = self.released.lock();
        *released = true;
        self.release_cond.notify_all();
    }

    /// 载体线程等待放行
    pub(super) fn wait_released(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.release_cond.wait(&mut released);
        }
    }

    /// 在当前线程上运行调度循环，直到所有上下文终止
    ///
    /// 返回本线程切入上下文的次数
    pub fn run(&self) -> u64 {
        let carrier = Carrier::new(usize::MAX);
        carrier.run_loop(self);
        carrier.dispatched()
    }

    /// 等待所有载体线程退出
    pub fn join(&self) {
        let carriers = self.carriers.lock().clone();
        for c in carriers.iter() {
            c.join();
        }
    }

    /// 停止载体线程，关闭完成通知器并停止内核工作线程
    pub fn shutdown(&self) {
        for c in self.carriers.lock().iter() {
            c.stop();
        }
        self.release();
        self.notifier.close();
        if let Some(kernel) = &self.kernel {
            kernel.shutdown();
        }
    }

    // ------------------------------------------------------------------
    // 调度循环使用的操作
    // ------------------------------------------------------------------

    /// 弹出下一个就绪上下文
    #[inline]
    pub fn pop_ready(&self) -> Option<CtxId> {
        self.ready.pop()
    }

    /// 放回就绪队列尾部，必要时唤醒空闲载体
    fn push_ready(&self, id: CtxId) {
        let pushed = self.ready.push(id);
        debug_assert!(pushed, "context {} enqueued twice", id);
        if self.idle_carriers.load(Ordering::Acquire) > 0 {
            self.notifier.kick();
        }
    }

    /// 所有上下文是否都已终止
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.live.load(Ordering::Acquire) == 0
    }

    /// 把已到达的完成通知并入事件端口（非阻塞）
    pub fn merge_completions(&self, port: &EventPort) {
        if self.blocked.load(Ordering::Acquire) == 0 {
            return;
        }
        let ids = self.notifier.drain();
        if !ids.is_empty() {
            port.post(KernelEvent::ThreadsUnblocked(ids));
        }
    }

    /// 就绪队列为空时阻塞载体线程，等待完成通知
    pub fn idle_wait(&self, port: &EventPort) {
        self.idle_carriers.fetch_add(1, Ordering::AcqRel);
        // 重新检查，避免错过刚刚入队的上下文
        let ids = if self.ready.is_empty() && !self.is_drained() {
            self.notifier.wait(self.config.idle_poll)
        } else {
            Vec::new()
        };
        self.idle_carriers.fetch_sub(1, Ordering::AcqRel);

        if !ids.is_empty() {
            port.post(KernelEvent::ThreadsUnblocked(ids));
        }
    }

    /// 切入前的状态更新：Ready -> Running
    ///
    /// 返回 false 表示上下文不处于 Ready（不应发生）
    pub fn enter(&self, ctx: &ExecutionContext) -> bool {
        if !ctx.cas_status(ContextStatus::Ready, ContextStatus::Running) {
            debug_assert!(false, "dispatching context {} in state {:?}", ctx.id, ctx.status());
            return false;
        }
        self.counters.resumes.fetch_add(1, Ordering::Relaxed);
        self.record(TraceEvent::Resumed(ctx.id));
        true
    }

    /// 控制权返回后的处理
    ///
    /// 协作式变体直接检查终止标志；内核辅助变体把切出原因作为内核事件投递，
    /// 由调度循环在下一次调度决策前统一处理
    pub fn leave(&self, ctx: &ExecutionContext, port: &EventPort) {
        if ctx.signals().panicked() {
            self.counters.panics.fetch_add(1, Ordering::Relaxed);
            eprintln!("Context {} panicked; treating it as terminated", ctx.id);
        }

        match self.config.variant {
            Variant::Cooperative => {
                if ctx.is_terminated() {
                    self.retire(ctx);
                } else {
                    self.requeue(ctx);
                }
            }
            Variant::KernelAssisted => port.post(KernelEvent::from_switch(ctx)),
        }
    }

    /// 处理一个内核事件
    pub fn handle_event(&self, event: KernelEvent) {
        match event {
            KernelEvent::ThreadYielded(id) => {
                if let Some(ctx) = self.context(id) {
                    self.requeue(&ctx);
                }
            }
            KernelEvent::ThreadBlocked(id) => {
                if let Some(ctx) = self.context(id) {
                    self.block(&ctx);
                }
            }
            KernelEvent::ThreadTerminated(id) => {
                if let Some(ctx) = self.context(id) {
                    self.retire(&ctx);
                }
            }
            KernelEvent::ThreadsUnblocked(ids) => {
                for id in ids {
                    self.unblock(id);
                }
            }
        }
    }

    /// Running -> Ready，放回队尾
    fn requeue(&self, ctx: &ExecutionContext) {
        ctx.set_status(ContextStatus::Ready);
        self.counters.yields.fetch_add(1, Ordering::Relaxed);
        self.record(TraceEvent::Yielded(ctx.id));
        self.push_ready(ctx.id);
    }

    /// Running -> Blocked，把阻塞操作交给内核
    fn block(&self, ctx: &ExecutionContext) {
        // 必须在提交给内核之前计入，完成通知才不会早于阻塞记录
        ctx.set_status(ContextStatus::Blocked);
        self.blocked.fetch_add(1, Ordering::AcqRel);
        self.counters.blocks.fetch_add(1, Ordering::Relaxed);
        self.record(TraceEvent::Blocked(ctx.id));

        // 只有内核辅助变体的 Yielder::block 会带着操作切出
        let op = ctx.signals().take_pending();
        debug_assert!(op.is_some() && self.kernel.is_some());
        match (op, &self.kernel) {
            (Some(op), Some(kernel)) => kernel.submit(ctx.id, op),
            _ => {
                self.notifier.post(ctx.id);
            }
        }
    }

    /// Blocked -> Ready（完成通知已被取走）
    fn unblock(&self, id: CtxId) {
        let Some(ctx) = self.context(id) else {
            return;
        };
        if ctx.cas_status(ContextStatus::Blocked, ContextStatus::Ready) {
            self.blocked.fetch_sub(1, Ordering::AcqRel);
            self.counters.unblocks.fetch_add(1, Ordering::Relaxed);
            self.record(TraceEvent::Unblocked(id));
            self.push_ready(id);
        }
    }

    /// -> Terminated，回收上下文
    fn retire(&self, ctx: &ExecutionContext) {
        ctx.set_status(ContextStatus::Terminated);
        self.counters.terminations.fetch_add(1, Ordering::Relaxed);
        self.record(TraceEvent::Terminated(ctx.id));

        // 释放栈；之后该句柄只能查询到 Terminated
        let released = self.contexts.write().get_mut(ctx.id.index()).and_then(Option::take);
        drop(released);

        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            // 最后一个上下文：让等待中的载体尽快退出
            self.notifier.kick();
        }
    }

    #[inline]
    fn record(&self, event: TraceEvent) {
        if self.config.trace {
            self.trace.lock().push(event);
        }
    }

    // ------------------------------------------------------------------
    // 观测
    // ------------------------------------------------------------------

    /// 调度轨迹（需启用 `trace`）
    #[cfg(test)]
    pub fn trace(&self) -> Vec<TraceEvent> {
        self.trace.lock().clone()
    }

    /// 就绪队列快照
    #[cfg(test)]
    pub fn ready_snapshot(&self) -> Vec<CtxId> {
        self.ready.snapshot()
    }

    /// 阻塞中的上下文数量
    #[inline]
    pub fn blocked_count(&self) -> usize {
        self.blocked.load(Ordering::Acquire)
    }

    /// 尚未终止的上下文数量
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// 检查就绪队列不变量：没有重复句柄，且只包含 Ready 状态的上下文
    #[cfg(test)]
    pub fn check_invariants(&self) -> Result<(), String> {
        let snapshot = self.ready.snapshot();
        let mut seen = std::collections::HashSet::with_capacity(snapshot.len());
        for id in snapshot {
            if !seen.insert(id) {
                return Err(format!("context {} appears twice in the ready queue", id));
            }
            match self.status(id) {
                Some(ContextStatus::Ready) => {}
                other => return Err(format!("context {} in ready queue with state {:?}", id, other)),
            }
        }
        Ok(())
    }

    /// 获取运行时间
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 获取调度统计信息
    pub fn stats(&self) -> SchedulerStats {
        let carriers = self.carriers.lock();
        SchedulerStats {
            variant: self.config.variant,
            backend: self.config.backend,
            contexts_created: self.counters.created.load(Ordering::Relaxed),
            live: self.live_count(),
            blocked: self.blocked_count(),
            ready_len: self.ready.len(),
            resumes: self.counters.resumes.load(Ordering::Relaxed),
            yields: self.counters.yields.load(Ordering::Relaxed),
            blocks: self.counters.blocks.load(Ordering::Relaxed),
            unblocks: self.counters.unblocks.load(Ordering::Relaxed),
            terminations: self.counters.terminations.load(Ordering::Relaxed),
            panics: self.counters.panics.load(Ordering::Relaxed),
            carrier_dispatch_counts: carriers.iter().map(|c| c.dispatched()).collect(),
            elapsed: self.elapsed(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("variant", &self.config.variant)
            .field("live", &self.live_count())
            .field("blocked", &self.blocked_count())
            .field("ready", &self.ready.len())
            .finish()
    }
}

/// 调度统计信息
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub variant: Variant,
    pub backend: BackendKind,
    pub contexts_created: u64,
    pub live: usize,
    pub blocked: usize,
    pub ready_len: usize,
    pub resumes: u64,
    pub yields: u64,
    pub blocks: u64,
    pub unblocks: u64,
    pub terminations: u64,
    pub panics: u64,
    pub carrier_dispatch_counts: Vec<u64>,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_STACK_SIZE;
    use crate::runtime::context::BlockingOp;

    fn config(variant: Variant, backend: BackendKind) -> SchedulerConfig {
        SchedulerConfig {
            variant,
            backend,
            trace: true,
            kernel_workers: 2,
            ..SchedulerConfig::default()
        }
    }

    fn spawn_yielders(s: &Scheduler, n: usize, yields: usize) -> Vec<CtxId> {
        (0..n)
            .map(|_| {
                s.spawn(move |y| {
                    for _ in 0..yields {
                        y.yield_now();
                    }
                })
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_scheduler_new() {
        let s = Scheduler::with_config(SchedulerConfig::default()).unwrap();
        assert_eq!(s.variant(), Variant::Cooperative);
        assert_eq!(s.live_count(), 0);
        assert!(s.is_drained());
        assert_eq!(s.run(), 0);
    }

    #[test]
    fn test_four_by_three_cooperative() {
        for backend in BackendKind::available() {
            let s = Scheduler::with_config(config(Variant::Cooperative, backend)).unwrap();
            let ids = spawn_yielders(&s, 4, 3);

            let dispatched = s.run();
            let stats = s.stats();
            assert_eq!(dispatched, 16);
            assert_eq!(stats.yields, 12);
            assert_eq!(stats.terminations, 4);
            assert!(s.ready_snapshot().is_empty());
            assert_eq!(s.blocked_count(), 0);
            for id in ids {
                assert_eq!(s.status(id), Some(ContextStatus::Terminated));
                assert!(s.context(id).is_none());
            }
        }
    }

    #[test]
    fn test_first_resumption_follows_creation_order() {
        let s = Scheduler::with_config(config(Variant::Cooperative, BackendKind::default())).unwrap();
        let ids = spawn_yielders(&s, 6, 0);
        s.run();

        let mut first = Vec::new();
        for event in s.trace() {
            if let TraceEvent::Resumed(id) = event {
                if !first.contains(&id) {
                    first.push(id);
                }
            }
        }
        assert_eq!(first, ids);
    }

    #[test]
    fn test_round_robin_and_yields_before_termination() {
        let (n, y) = (3usize, 4usize);
        let s = Scheduler::with_config(config(Variant::Cooperative, BackendKind::default())).unwrap();
        let ids = spawn_yielders(&s, n, y);
        s.run();

        let trace = s.trace();
        let resumed: Vec<CtxId> = trace
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Resumed(id) => Some(*id),
                _ => None,
            })
            .collect();
        let expected: Vec<CtxId> = (0..=y).flat_map(|_| ids.iter().copied()).collect();
        assert_eq!(resumed, expected);

        let first_termination = trace
            .iter()
            .position(|e| matches!(e, TraceEvent::Terminated(_)))
            .unwrap();
        let yields_before = trace[..first_termination]
            .iter()
            .filter(|e| matches!(e, TraceEvent::Yielded(_)))
            .count();
        assert_eq!(yields_before, n * y);
    }

    #[test]
    fn test_ready_queue_invariant_observed_from_inside() {
        let s = Arc::new(Scheduler::with_config(config(Variant::Cooperative, BackendKind::default())).unwrap());
        let violations = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..5 {
            let observer = Arc::clone(&s);
            let violations = Arc::clone(&violations);
            let me = Arc::new(std::sync::OnceLock::new());
            let own = Arc::clone(&me);
            let id = s
                .spawn(move |y| {
                    for _ in 0..3 {
                        if let Err(e) = observer.check_invariants() {
                            violations.lock().push(e);
                        }
                        let id = *own.get().unwrap();
                        assert_eq!(observer.status(id), Some(ContextStatus::Running));
                        assert!(!observer.ready_snapshot().contains(&id));
                        y.yield_now();
                    }
                })
                .unwrap();
            me.set(id).unwrap();
        }
        s.run();
        assert!(violations.lock().is_empty(), "{:?}", violations.lock());
        assert_eq!(s.stats().panics, 0);
    }

    #[test]
    fn test_kernel_assisted_yields() {
        for backend in BackendKind::available() {
            let s = Scheduler::with_config(config(Variant::KernelAssisted, backend)).unwrap();
            spawn_yielders(&s, 4, 3);
            s.run();
            let stats = s.stats();
            assert_eq!(stats.yields, 12);
            assert_eq!(stats.blocks, 0);
            assert_eq!(stats.terminations, 4);
        }
    }

    #[test]
    fn test_kernel_assisted_unblock_after_notification() {
        let s = Scheduler::with_config(config(Variant::KernelAssisted, BackendKind::default())).unwrap();
        for _ in 0..4 {
            s.spawn(|y| {
                for _ in 0..2 {
                    y.block(BlockingOp::Sleep(Duration::from_millis(1)));
                }
            })
            .unwrap();
        }
        s.run();

        let stats = s.stats();
        assert_eq!(stats.blocks, 8);
        assert_eq!(stats.unblocks, 8);
        assert_eq!(stats.terminations, 4);
        assert_eq!(s.blocked_count(), 0);

        // 每次 Blocked 之后，必须先 Unblocked 才能再次 Resumed
        let mut blocked = std::collections::HashSet::new();
        for event in s.trace() {
            match event {
                TraceEvent::Blocked(id) => assert!(blocked.insert(id)),
                TraceEvent::Unblocked(id) => assert!(blocked.remove(&id)),
                TraceEvent::Resumed(id) => assert!(!blocked.contains(&id), "{} resumed while blocked", id),
                _ => {}
            }
        }
        assert!(blocked.is_empty());
    }

    #[test]
    fn test_blocked_context_does_not_stall_others() {
        let s = Scheduler::with_config(config(Variant::KernelAssisted, BackendKind::default())).unwrap();
        let slow = s
            .spawn(|y| y.block(BlockingOp::Sleep(Duration::from_millis(20))))
            .unwrap();
        let fast = s
            .spawn(|y| {
                for _ in 0..3 {
                    y.yield_now();
                }
            })
            .unwrap();
        s.run();

        let trace = s.trace();
        let fast_done = trace.iter().position(|e| *e == TraceEvent::Terminated(fast)).unwrap();
        let slow_done = trace.iter().position(|e| *e == TraceEvent::Terminated(slow)).unwrap();
        assert!(fast_done < slow_done);
    }

    #[test]
    fn test_multiple_carriers() {
        for variant in [Variant::Cooperative, Variant::KernelAssisted] {
            let mut cfg = config(variant, BackendKind::default());
            cfg.num_carriers = 3;
            cfg.trace = false;
            let s = Arc::new(Scheduler::with_config(cfg).unwrap());
            spawn_yielders(&s, 16, 10);
            s.start().unwrap();
            s.join();

            let stats = s.stats();
            assert_eq!(stats.yields, 160);
            assert_eq!(stats.terminations, 16);
            assert_eq!(stats.carrier_dispatch_counts.len(), 3);
            assert_eq!(stats.carrier_dispatch_counts.iter().sum::<u64>(), 16 * 11);
            assert!(s.is_drained());
        }
    }

    #[test]
    fn test_kernel_assisted_blocking_across_carriers() {
        let (n, ops) = (32usize, 5usize);
        for backend in BackendKind::available() {
            let mut cfg = config(Variant::KernelAssisted, backend);
            cfg.num_carriers = 4;
            cfg.trace = false;
            let s = Arc::new(Scheduler::with_config(cfg).unwrap());
            for i in 0..n {
                s.spawn(move |y| {
                    for op in 0..ops {
                        if (i + op) % 2 == 0 {
                            y.block(BlockingOp::Sleep(Duration::from_micros(100)));
                        } else {
                            y.yield_now();
                        }
                    }
                })
                .unwrap();
            }
            s.start().unwrap();
            s.join();

            let stats = s.stats();
            assert_eq!(stats.terminations, n as u64, "{:?}", backend);
            assert_eq!(stats.blocks, stats.unblocks, "{:?}", backend);
            assert_eq!(stats.yields + stats.blocks, (n * ops) as u64, "{:?}", backend);
            assert_eq!(s.blocked_count(), 0);
            assert!(s.is_drained());
        }
    }

    #[test]
    fn test_no_context_runs_before_release() {
        let mut cfg = config(Variant::Cooperative, BackendKind::default());
        cfg.num_carriers = 4;
        cfg.trace = false;
        let s = Arc::new(Scheduler::with_config(cfg).unwrap());
        let first_runs = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..8 {
            let first_runs = Arc::clone(&first_runs);
            s.spawn(move |y| {
                first_runs.lock().push(Instant::now());
                y.yield_now();
            })
            .unwrap();
        }

        let released_at = s.start().unwrap();
        s.join();

        let first_runs = first_runs.lock();
        assert_eq!(first_runs.len(), 8);
        assert!(first_runs.iter().all(|t| *t >= released_at));
        assert_eq!(s.stats().carrier_dispatch_counts.len(), 4);
    }

    #[test]
    fn test_start_twice_is_harmless() {
        let s = Arc::new(Scheduler::with_config(SchedulerConfig::default()).unwrap());
        spawn_yielders(&s, 2, 1);
        s.start().unwrap();
        s.start().unwrap();
        s.join();
        assert_eq!(s.stats().terminations, 2);
        assert_eq!(s.stats().carrier_dispatch_counts.len(), 1);
    }

    #[test]
    fn test_spawn_fails_on_oversized_stack() {
        for backend in BackendKind::available() {
            let mut cfg = config(Variant::Cooperative, backend);
            cfg.stack_size = MAX_STACK_SIZE + 1;
            let s = Scheduler::with_config(cfg).unwrap();
            let err = s.spawn(|_| {}).unwrap_err();
            assert!(err.is_resource_exhausted());
            assert_eq!(s.live_count(), 0);
            assert!(s.ready_snapshot().is_empty());
        }
    }

    #[test]
    fn test_panicking_context_is_retired() {
        let s = Scheduler::with_config(config(Variant::Cooperative, BackendKind::default())).unwrap();
        let bad = s.spawn(|_| panic!("boom")).unwrap();
        let good = s.spawn(|y| y.yield_now()).unwrap();
        s.run();

        let stats = s.stats();
        assert_eq!(stats.panics, 1);
        assert_eq!(stats.terminations, 2);
        assert_eq!(s.status(bad), Some(ContextStatus::Terminated));
        assert_eq!(s.status(good), Some(ContextStatus::Terminated));
    }

    #[test]
    fn test_unknown_handle() {
        let s = Scheduler::with_config(SchedulerConfig::default()).unwrap();
        assert_eq!(s.status(CtxId(99)), None);
        assert!(s.context(CtxId(99)).is_none());
    }
}
