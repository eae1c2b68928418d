//! 完成通知器
//!
//! 内核一侧报告"阻塞的上下文已经可以继续运行"的通道。
//! 内容是无序集合，调度器一次性原子地取走全部条目。

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::context::CtxId;

/// 通知器内部状态
#[derive(Default)]
struct State {
    /// 待取走的句柄
    pending: Vec<CtxId>,
    /// 已在 pending 中的句柄
    members: HashSet<CtxId>,
    /// 是否已关闭
    closed: bool,
}

/// 完成通知器
pub struct CompletionNotifier {
    state: Mutex<State>,
    cond: Condvar,
}

impl CompletionNotifier {
    /// 创建新的通知器
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        }
    }

    /// 报告一个上下文完成阻塞
    ///
    /// 返回 false 表示该句柄尚未被取走，本次报告被合并
    pub fn post(&self, id: CtxId) -> bool {
        let mut state = self.state.lock();
        if !state.members.insert(id) {
            return false;
        }
        state.pending.push(id);
        self.cond.notify_all();
        true
    }

    /// 取走全部待处理句柄（不阻塞）
    pub fn drain(&self) -> Vec<CtxId> {
        let mut state = self.state.lock();
        Self::take_all(&mut state)
    }

    /// 等待至少一个完成通知，最多等待 `timeout`
    ///
    /// 超时或通知器关闭时返回空列表
    pub fn wait(&self, timeout: Duration) -> Vec<CtxId> {
        let mut state = self.state.lock();
        if state.pending.is_empty() && !state.closed {
            let _ = self.cond.wait_for(&mut state, timeout);
        }
        Self::take_all(&mut state)
    }

    /// 待取走的数量
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// 关闭通知器，唤醒所有等待者
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cond.notify_all();
    }

    /// 唤醒等待中的载体线程（不产生通知）
    pub fn kick(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    fn take_all(state: &mut State) -> Vec<CtxId> {
        state.members.clear();
        std::mem::take(&mut state.pending)
    }
}

impl Default for CompletionNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("pending", &self.pending_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_post_deduplicates_until_drained() {
        let n = CompletionNotifier::new();
        assert!(n.post(CtxId(1)));
        assert!(!n.post(CtxId(1)));
        assert!(n.post(CtxId(2)));
        assert_eq!(n.pending_len(), 2);

        let mut drained = n.drain();
        drained.sort();
        assert_eq!(drained, vec![CtxId(1), CtxId(2)]);
        assert!(n.drain().is_empty());

        // 取走之后可以再次报告
        assert!(n.post(CtxId(1)));
    }

    #[test]
    fn test_wait_times_out_empty() {
        let n = CompletionNotifier::new();
        let start = Instant::now();
        assert!(n.wait(Duration::from_millis(5)).is_empty());
        assert!(start.elapsed() >= Duration::from_millis(4));
    }

    #[test]
    fn test_wait_wakes_on_post() {
        let n = Arc::new(CompletionNotifier::new());
        let poster = Arc::clone(&n);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            poster.post(CtxId(42));
        });

        let mut got = Vec::new();
        while got.is_empty() {
            got = n.wait(Duration::from_secs(5));
        }
        assert_eq!(got, vec![CtxId(42)]);
        handle.join().unwrap();
    }

    #[test]
    fn test_close_releases_waiter() {
        let n = Arc::new(CompletionNotifier::new());
        n.post(CtxId(5));
        n.close();
        // 关闭后仍能取走已报告的句柄，之后不再等待
        assert_eq!(n.wait(Duration::from_secs(60)), vec![CtxId(5)]);
        let start = Instant::now();
        assert!(n.wait(Duration::from_secs(60)).is_empty());
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
