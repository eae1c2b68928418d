//! 执行上下文
//!
//! 调度的基本单位：保存切换状态、调度状态和终止标志

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::switch::{ContextSwitch, Suspend};
use super::Variant;

/// 上下文句柄
///
/// 调度器上下文表的下标，在调度器生命周期内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CtxId(pub u32);

impl CtxId {
    /// 作为表下标
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CtxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 上下文状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextStatus {
    /// 可运行，在就绪队列中等待
    Ready = 0,
    /// 正在某个载体线程上运行
    Running = 1,
    /// 阻塞，等待完成通知
    Blocked = 2,
    /// 已终止
    Terminated = 3,
}

impl From<u8> for ContextStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => ContextStatus::Ready,
            1 => ContextStatus::Running,
            2 => ContextStatus::Blocked,
            _ => ContextStatus::Terminated,
        }
    }
}

/// 上下文交还控制权的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SwitchReason {
    /// 主动让出
    Yielded = 0,
    /// 发起了阻塞操作
    Blocked = 1,
    /// 入口返回
    Terminated = 2,
}

impl From<u8> for SwitchReason {
    fn from(v: u8) -> Self {
        match v {
            0 => SwitchReason::Yielded,
            1 => SwitchReason::Blocked,
            _ => SwitchReason::Terminated,
        }
    }
}

/// 阻塞操作
///
/// 协作式变体中在载体线程上原地执行；内核辅助变体中交给内核工作线程
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingOp {
    /// 睡眠指定时长
    Sleep(Duration),
}

impl BlockingOp {
    /// 执行操作（会阻塞当前 OS 线程）
    pub fn run(self) {
        match self {
            BlockingOp::Sleep(d) => std::thread::sleep(d),
        }
    }
}

/// 上下文与调度器之间共享的信号
///
/// 由上下文一侧写入，调度器在控制权返回后读取
pub struct Signals {
    /// 终止标志（只设置一次）
    terminated: AtomicBool,
    /// 入口是否以 panic 结束
    panicked: AtomicBool,
    /// 最近一次交还控制权的原因
    reason: AtomicU8,
    /// 等待内核执行的阻塞操作
    pending: Mutex<Option<BlockingOp>>,
}

impl Signals {
    pub fn new() -> Self {
        Self {
            terminated: AtomicBool::new(false),
            panicked: AtomicBool::new(false),
            reason: AtomicU8::new(SwitchReason::Yielded as u8),
            pending: Mutex::new(None),
        }
    }

    /// 终止标志
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// 设置终止标志
    pub fn mark_terminated(&self) {
        self.set_reason(SwitchReason::Terminated);
        self.terminated.store(true, Ordering::Release);
    }

    /// 入口是否以 panic 结束
    #[inline]
    pub fn panicked(&self) -> bool {
        self.panicked.load(Ordering::Acquire)
    }

    /// 记录入口 panic（随后仍须设置终止标志）
    pub fn mark_panicked(&self) {
        self.panicked.store(true, Ordering::Release);
    }

    /// 最近一次交还控制权的原因
    #[inline]
    pub fn reason(&self) -> SwitchReason {
        SwitchReason::from(self.reason.load(Ordering::Acquire))
    }

    #[inline]
    fn set_reason(&self, reason: SwitchReason) {
        self.reason.store(reason as u8, Ordering::Release);
    }

    /// 取走待执行的阻塞操作
    pub fn take_pending(&self) -> Option<BlockingOp> {
        self.pending.lock().take()
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

/// 上下文内部使用的调度接口
///
/// 入口闭包通过它让出或发起阻塞操作
pub struct Yielder<'a> {
    variant: Variant,
    signals: &'a Signals,
    suspend: &'a dyn Suspend,
}

impl<'a> Yielder<'a> {
    pub fn new(variant: Variant, signals: &'a Signals, suspend: &'a dyn Suspend) -> Self {
        Self {
            variant,
            signals,
            suspend,
        }
    }

    /// 主动让出，回到就绪队列尾部
    pub fn yield_now(&self) {
        self.signals.set_reason(SwitchReason::Yielded);
        self.suspend.suspend();
    }

    /// 发起阻塞操作
    ///
    /// 协作式变体没有阻塞检测，操作直接在载体线程上执行并阻塞整个载体；
    /// 内核辅助变体把上下文切出，操作完成后由完成通知重新就绪
    pub fn block(&self, op: BlockingOp) {
        match self.variant {
            Variant::Cooperative => op.run(),
            Variant::KernelAssisted => {
                *self.signals.pending.lock() = Some(op);
                self.signals.set_reason(SwitchReason::Blocked);
                self.suspend.suspend();
            }
        }
    }
}

/// 执行上下文
pub struct ExecutionContext {
    /// 上下文句柄
    pub id: CtxId,
    /// 调度状态（原子操作）
    status: AtomicU8,
    /// 与上下文内部共享的信号
    signals: Arc<Signals>,
    /// 平台相关的切换状态
    switch: Mutex<Box<dyn ContextSwitch>>,
    /// 被 resume 的次数
    resume_count: AtomicU64,
}

impl ExecutionContext {
    /// 创建新的执行上下文，初始状态为 Ready
    pub fn new(id: CtxId, signals: Arc<Signals>, switch: Box<dyn ContextSwitch>) -> Self {
        Self {
            id,
            status: AtomicU8::new(ContextStatus::Ready as u8),
            signals,
            switch: Mutex::new(switch),
            resume_count: AtomicU64::new(0),
        }
    }

    /// 获取状态
    #[inline]
    pub fn status(&self) -> ContextStatus {
        ContextStatus::from(self.status.load(Ordering::Acquire))
    }

    /// 设置状态
    #[inline]
    pub fn set_status(&self, status: ContextStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// 尝试将状态从 expected 改为 new
    #[inline]
    pub fn cas_status(&self, expected: ContextStatus, new: ContextStatus) -> bool {
        self.status
            .compare_exchange(expected as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 共享信号
    #[inline]
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// 终止标志
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.signals.is_terminated()
    }

    /// 切换到该上下文，直到它让出、阻塞或终止
    ///
    /// 入口越过包装层 panic 或返回时，由后端状态补记 panic 和终止标志
    pub fn resume(&self) {
        self.resume_count.fetch_add(1, Ordering::Relaxed);
        let mut switch = self.switch.lock();
        switch.resume();
        if switch.panicked() && !self.signals.panicked() {
            self.signals.mark_panicked();
        }
        if switch.is_finished() && !self.signals.is_terminated() {
            self.signals.mark_terminated();
        }
    }

    /// 被 resume 的次数
    #[inline]
    pub fn resume_count(&self) -> u64 {
        self.resume_count.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("terminated", &self.is_terminated())
            .field("resume_count", &self.resume_count())
            .finish()
    }
}
