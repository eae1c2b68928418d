//! 就绪队列
//!
//! 所有载体线程共享的 FIFO 队列，只存放上下文句柄

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::context::CtxId;

/// 队列内部状态
struct Inner {
    /// 按入队顺序排列的句柄
    queue: VecDeque<CtxId>,
    /// 成员标记，按句柄下标索引
    members: Vec<bool>,
}

impl Inner {
    fn insert(&mut self, id: CtxId) -> bool {
        let idx = id.index();
        if idx >= self.members.len() {
            self.members.resize(idx + 1, false);
        }
        if self.members[idx] {
            return false;
        }
        self.members[idx] = true;
        self.queue.push_back(id);
        true
    }
}

/// 就绪队列（使用互斥锁）
///
/// 同一句柄不会出现两次：重复入队被拒绝
pub struct ReadyQueue {
    inner: Mutex<Inner>,
    len: AtomicUsize,
}

impl ReadyQueue {
    /// 创建新的就绪队列
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 按预计上下文数量创建
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                members: vec![false; capacity],
            }),
            len: AtomicUsize::new(0),
        }
    }

    /// 获取队列长度
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// 检查是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 推入队尾
    ///
    /// 返回 false 表示句柄已在队列中
    pub fn push(&self, id: CtxId) -> bool {
        let mut inner = self.inner.lock();
        if inner.insert(id) {
            self.len.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// 弹出队首
    pub fn pop(&self) -> Option<CtxId> {
        let mut inner = self.inner.lock();
        let id = inner.queue.pop_front()?;
        inner.members[id.index()] = false;
        self.len.fetch_sub(1, Ordering::Relaxed);
        Some(id)
    }

    /// 按出队顺序复制当前内容
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<CtxId> {
        self.inner.lock().queue.iter().copied().collect()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyQueue").field("len", &self.len()).finish()
    }
}
