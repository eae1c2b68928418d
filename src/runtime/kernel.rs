//! 内核模拟层
//!
//! 内核辅助调度中，阻塞调用由内核接管：上下文被切出，内核在后台完成
//! 阻塞操作后把句柄投递到完成通知器。内核对调度器的回调被建模为
//! 类型化事件，投递到载体线程自己的单消费者通道中。

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::context::{BlockingOp, CtxId, ExecutionContext, SwitchReason};
use super::io_pool::IoThreadPool;
use super::notifier::CompletionNotifier;
use crate::config::KERNEL_QUEUE_CAPACITY;
use crate::error::SchedResult;

/// 内核回调事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    /// 上下文发起了阻塞调用，已被切出
    ThreadBlocked(CtxId),
    /// 上下文主动让出
    ThreadYielded(CtxId),
    /// 上下文入口返回
    ThreadTerminated(CtxId),
    /// 一批阻塞完成的上下文
    ThreadsUnblocked(Vec<CtxId>),
}

impl KernelEvent {
    /// 根据上下文交还控制权的原因构造事件
    pub fn from_switch(ctx: &ExecutionContext) -> Self {
        if ctx.is_terminated() {
            return KernelEvent::ThreadTerminated(ctx.id);
        }
        match ctx.signals().reason() {
            SwitchReason::Yielded => KernelEvent::ThreadYielded(ctx.id),
            SwitchReason::Blocked => KernelEvent::ThreadBlocked(ctx.id),
            SwitchReason::Terminated => KernelEvent::ThreadTerminated(ctx.id),
        }
    }
}

/// 载体线程的事件端口
///
/// 发送端由内核回调使用，接收端只由所属载体线程的调度循环读取
pub struct EventPort {
    tx: Sender<KernelEvent>,
    rx: Receiver<KernelEvent>,
}

impl EventPort {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// 投递事件
    pub fn post(&self, event: KernelEvent) {
        // 接收端与发送端同生共死，发送不会失败
        let _ = self.tx.send(event);
    }

    /// 取出所有已投递的事件
    pub fn drain(&self) -> impl Iterator<Item = KernelEvent> + '_ {
        self.rx.try_iter()
    }
}

impl Default for EventPort {
    fn default() -> Self {
        Self::new()
    }
}

/// 内核
pub struct Kernel {
    pool: IoThreadPool,
    notifier: Arc<CompletionNotifier>,
}

impl Kernel {
    /// 创建内核，启动阻塞操作工作线程
    pub fn new(workers: usize, notifier: Arc<CompletionNotifier>) -> SchedResult<Self> {
        Ok(Self {
            pool: IoThreadPool::new(workers, KERNEL_QUEUE_CAPACITY)?,
            notifier,
        })
    }

    /// 接管一个阻塞操作，完成后把句柄投递到完成通知器
    ///
    /// 调用方必须保证此时上下文已经切出并被记为 Blocked
    pub fn submit(&self, id: CtxId, op: BlockingOp) {
        let notifier = Arc::clone(&self.notifier);
        let result = self.pool.execute(move || {
            op.run();
            notifier.post(id);
        });

        // 内核已关闭：就地完成，保证上下文不会永远阻塞
        if let Err(task) = result {
            task();
        }
    }

    /// 等待所有进行中的阻塞操作完成并停止工作线程
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_submit_posts_completion() {
        let notifier = Arc::new(CompletionNotifier::new());
        let kernel = Kernel::new(2, Arc::clone(&notifier)).unwrap();

        kernel.submit(CtxId(3), BlockingOp::Sleep(Duration::from_millis(2)));
        kernel.submit(CtxId(4), BlockingOp::Sleep(Duration::ZERO));

        let mut got = Vec::new();
        while got.len() < 2 {
            got.extend(notifier.wait(Duration::from_secs(5)));
        }
        got.sort();
        assert_eq!(got, vec![CtxId(3), CtxId(4)]);
    }

    #[test]
    fn test_submit_after_shutdown_completes_inline() {
        let notifier = Arc::new(CompletionNotifier::new());
        let kernel = Kernel::new(1, Arc::clone(&notifier)).unwrap();
        kernel.shutdown();

        kernel.submit(CtxId(9), BlockingOp::Sleep(Duration::ZERO));
        assert_eq!(notifier.drain(), vec![CtxId(9)]);
    }

    #[test]
    fn test_event_port_fifo() {
        let port = EventPort::new();
        port.post(KernelEvent::ThreadYielded(CtxId(1)));
        port.post(KernelEvent::ThreadBlocked(CtxId(2)));

        let events: Vec<_> = port.drain().collect();
        assert_eq!(
            events,
            vec![KernelEvent::ThreadYielded(CtxId(1)), KernelEvent::ThreadBlocked(CtxId(2))]
        );
        assert_eq!(port.drain().next(), None);
    }
}
