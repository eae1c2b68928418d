//! 上下文调度运行时
//!
//! 在少量载体线程上复用大量用户态执行上下文（M:N）
//!
//! 核心组件：
//! - ExecutionContext: 执行上下文，拥有自己的栈和切换状态
//! - ReadyQueue: 共享的 FIFO 就绪队列
//! - Carrier: 运行调度循环的 OS 线程
//! - Kernel / CompletionNotifier: 内核辅助变体的阻塞接管与完成通知

pub mod stack;
pub mod switch;
pub mod context;
pub mod queue;
pub mod notifier;
pub mod io_pool;
pub mod kernel;
pub mod carrier;
pub mod scheduler;

pub use switch::BackendKind;
pub use context::BlockingOp;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerStats, Variant};

/// 获取当前 CPU 核心数
pub fn num_processors() -> usize {
    num_cpus::get()
}
