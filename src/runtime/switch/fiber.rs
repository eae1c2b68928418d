//! 栈切换后端
//!
//! 只保存 System V ABI 规定的被调用者保存寄存器，切换时把它们压入
//! 当前栈，再交换栈指针。新上下文的栈被预先布置成"刚刚被切换出去"
//! 的样子，第一次切入时直接 `ret` 到启动跳板。

use std::arch::global_asm;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};

use super::{ContextSwitch, Entry, Suspend};
use crate::error::SchedResult;
use crate::runtime::stack::Stack;

global_asm!(
    ".text",
    ".global carrier_switch_stack",
    ".type carrier_switch_stack, @function",
    "carrier_switch_stack:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov qword ptr [rdi], rsp",
    "mov rsp, qword ptr [rsi]",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
    ".size carrier_switch_stack, . - carrier_switch_stack",
    "",
    ".global carrier_fiber_start",
    ".type carrier_fiber_start, @function",
    "carrier_fiber_start:",
    "mov rdi, r12",
    "call r13",
    "ud2",
    ".size carrier_fiber_start, . - carrier_fiber_start",
);

extern "C" {
    /// 保存当前栈指针到 `save`，切换到 `load` 指向的栈
    fn carrier_switch_stack(save: *mut usize, load: *const usize);

    /// 新上下文的启动跳板：r12 = 参数，r13 = 入口
    fn carrier_fiber_start();
}

/// 切入后弹出的寄存器数量（r15, r14, r13, r12, rbx, rbp）
const SAVED_REGISTERS: usize = 6;

/// 纤程共享状态
///
/// 固定在堆上，地址在整个生命周期内不变
struct FiberInner {
    /// 纤程被切出时的栈指针
    fiber_sp: usize,
    /// 恢复者被切出时的栈指针
    resumer_sp: usize,
    /// 尚未启动的入口
    entry: Option<Entry>,
    /// 入口是否已返回
    finished: bool,
    /// 入口是否 panic
    panicked: bool,
}

/// 栈切换上下文
pub struct Fiber {
    inner: NonNull<FiberInner>,
    stack: Stack,
}

impl Fiber {
    /// 创建新的纤程
    pub fn new(stack_size: usize, entry: Entry) -> SchedResult<Self> {
        let stack = Stack::with_size(stack_size)?;

        let inner = Box::into_raw(Box::new(FiberInner {
            fiber_sp: 0,
            resumer_sp: 0,
            entry: Some(entry),
            finished: false,
            panicked: false,
        }));

        // 布置初始栈帧：
        //   frame - 8          -> carrier_fiber_start（ret 目标）
        //   frame - 16 .. - 56 -> rbp, rbx, r12, r13, r14, r15
        // ret 之后 rsp == frame，16 字节对齐，满足 call 前的 ABI 要求
        let frame = (stack.top() as usize & !(Stack::ALIGNMENT - 1)) - Stack::ALIGNMENT;
        let sp = frame - (SAVED_REGISTERS + 1) * std::mem::size_of::<usize>();
        let entry_fn: extern "C" fn(*mut FiberInner) -> ! = fiber_main;

        unsafe {
            let slots = sp as *mut usize;
            slots.add(0).write(0); // r15
            slots.add(1).write(0); // r14
            slots.add(2).write(entry_fn as usize); // r13
            slots.add(3).write(inner as usize); // r12
            slots.add(4).write(0); // rbx
            slots.add(5).write(0); // rbp
            slots.add(6).write(carrier_fiber_start as *const () as usize);
            (*inner).fiber_sp = sp;
        }

        Ok(Self {
            // Box::into_raw 永不返回空指针
            inner: unsafe { NonNull::new_unchecked(inner) },
            stack,
        })
    }
}

impl ContextSwitch for Fiber {
    fn resume(&mut self) {
        let inner = self.inner.as_ptr();
        unsafe {
            if (*inner).finished {
                return;
            }
            carrier_switch_stack(ptr::addr_of_mut!((*inner).resumer_sp), ptr::addr_of!((*inner).fiber_sp));
        }
    }

    fn is_finished(&self) -> bool {
        unsafe { (*self.inner.as_ptr()).finished }
    }

    fn panicked(&self) -> bool {
        unsafe { (*self.inner.as_ptr()).panicked }
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        // 未启动的入口随 Box 一起释放。已启动但未结束的入口闭包及其栈上
        // 局部变量的析构函数不会运行，它们持有的资源随栈一起泄漏
        unsafe {
            drop(Box::from_raw(self.inner.as_ptr()));
        }
    }
}

// Fiber 独占自己的栈和共享状态，同一时刻只会被一个载体线程 resume
unsafe impl Send for Fiber {}

/// 纤程内部的挂起句柄
struct FiberSuspender {
    inner: *mut FiberInner,
}

impl Suspend for FiberSuspender {
    fn suspend(&self) {
        unsafe {
            carrier_switch_stack(
                ptr::addr_of_mut!((*self.inner).fiber_sp),
                ptr::addr_of!((*self.inner).resumer_sp),
            );
        }
    }
}

/// 纤程入口（在纤程自己的栈上运行）
extern "C" fn fiber_main(inner: *mut FiberInner) -> ! {
    unsafe {
        if let Some(entry) = (*inner).entry.take() {
            let suspender = FiberSuspender { inner };
            if panic::catch_unwind(AssertUnwindSafe(|| entry(&suspender))).is_err() {
                (*inner).panicked = true;
            }
        }
        (*inner).finished = true;
        carrier_switch_stack(ptr::addr_of_mut!((*inner).fiber_sp), ptr::addr_of!((*inner).resumer_sp));
    }
    // 已结束的纤程不会再被切入
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fiber_runs_on_own_stack() {
        let seen = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&seen);
        let mut fiber = Fiber::new(64 * 1024, Box::new(move |_s: &dyn Suspend| {
            let local = 0u8;
            inner.store(&local as *const u8 as usize, Ordering::SeqCst);
        }))
        .unwrap();

        let size = fiber.stack.size();
        let (lo, hi) = (fiber.stack.bottom() as usize, fiber.stack.top() as usize);
        fiber.resume();

        let addr = seen.load(Ordering::SeqCst);
        assert!(addr >= lo && addr < hi, "local at {:#x} outside [{:#x}, {:#x})", addr, lo, hi);
        assert!(size >= 64 * 1024);
        assert!(fiber.is_finished());
    }

    #[test]
    fn test_fiber_migrates_between_threads() {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        let mut fiber = Fiber::new(64 * 1024, Box::new(move |s: &dyn Suspend| {
            for _ in 0..3 {
                inner.fetch_add(1, Ordering::SeqCst);
                s.suspend();
            }
        }))
        .unwrap();

        fiber.resume();
        let mut fiber = std::thread::spawn(move || {
            fiber.resume();
            fiber
        })
        .join()
        .unwrap();
        fiber.resume();
        fiber.resume();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(fiber.is_finished());
    }

    #[test]
    fn test_fiber_dropped_before_start() {
        let flag = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&flag);
        let fiber = Fiber::new(64 * 1024, Box::new(move |_s: &dyn Suspend| {
            inner.store(1, Ordering::SeqCst);
        }))
        .unwrap();
        drop(fiber);
        assert_eq!(flag.load(Ordering::SeqCst), 0);
        // 入口闭包随 Fiber 一起释放
        assert_eq!(Arc::strong_count(&flag), 1);
    }

    #[test]
    fn test_fiber_dropped_mid_run_leaks_captures() {
        let held = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&held);
        let mut fiber = Fiber::new(64 * 1024, Box::new(move |s: &dyn Suspend| {
            inner.fetch_add(1, Ordering::SeqCst);
            s.suspend();
            inner.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        fiber.resume();
        assert!(!fiber.is_finished());
        drop(fiber);

        // 闭包停在挂起点，从未继续执行，捕获的 Arc 也没有被释放
        assert_eq!(held.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&held), 2);
    }
}
