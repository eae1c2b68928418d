//! 上下文切换原语
//!
//! 调度器只依赖 `ContextSwitch` 接口，具体切换方式由后端决定：
//! - `fiber`：在同一 OS 线程上直接交换栈（x86_64 Linux）
//! - `thread`：每个上下文由一个 OS 线程承载，通过接力棒交接执行权

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
pub mod fiber;
pub mod thread;

use crate::error::{SchedError, SchedResult};

/// 上下文内部用来交还控制权的接口
pub trait Suspend {
    /// 挂起当前上下文，回到最近一次 `resume` 它的调用者
    fn suspend(&self);
}

/// 上下文入口
///
/// 参数由闭包捕获；入口返回即意味着上下文终止
pub type Entry = Box<dyn FnOnce(&dyn Suspend) + Send + 'static>;

/// 平台相关的上下文切换状态
pub trait ContextSwitch: Send {
    /// 切换到该上下文，直到它挂起或结束才返回
    fn resume(&mut self);

    /// 入口函数是否已经返回
    fn is_finished(&self) -> bool;

    /// 入口函数是否以 panic 结束
    fn panicked(&self) -> bool;
}

/// 切换后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// 栈切换
    Fiber,
    /// OS 线程接力
    Thread,
}

impl BackendKind {
    /// 当前平台是否支持栈切换
    pub const FIBER_SUPPORTED: bool = cfg!(all(target_arch = "x86_64", target_os = "linux"));

    /// 当前平台可用的后端
    pub fn available() -> Vec<BackendKind> {
        if Self::FIBER_SUPPORTED {
            vec![BackendKind::Fiber, BackendKind::Thread]
        } else {
            vec![BackendKind::Thread]
        }
    }

    /// 后端名称
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Fiber => "fiber",
            BackendKind::Thread => "thread",
        }
    }

    /// 从名称解析
    pub fn parse(name: &str) -> SchedResult<Self> {
        match name {
            "fiber" => Ok(BackendKind::Fiber),
            "thread" => Ok(BackendKind::Thread),
            _ => Err(SchedError::invalid("backend", name)),
        }
    }

    /// 创建新的上下文
    pub fn create(self, stack_size: usize, entry: Entry) -> SchedResult<Box<dyn ContextSwitch>> {
        match self {
            BackendKind::Fiber => Self::create_fiber(stack_size, entry),
            BackendKind::Thread => Ok(Box::new(thread::ThreadContext::new(stack_size, entry)?)),
        }
    }

    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    fn create_fiber(stack_size: usize, entry: Entry) -> SchedResult<Box<dyn ContextSwitch>> {
        Ok(Box::new(fiber::Fiber::new(stack_size, entry)?))
    }

    #[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
    fn create_fiber(_stack_size: usize, _entry: Entry) -> SchedResult<Box<dyn ContextSwitch>> {
        Err(SchedError::Unsupported("stack-switching backend"))
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        if Self::FIBER_SUPPORTED {
            BackendKind::Fiber
        } else {
            BackendKind::Thread
        }
    }
}
