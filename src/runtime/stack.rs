//! 上下文栈管理
//!
//! 每个执行上下文拥有一块固定大小的栈。Unix 上使用 mmap 分配，
//! 低地址端保留一页不可访问的保护页；其他平台退化为堆分配。

use std::ptr::NonNull;

use crate::config::{MAX_STACK_SIZE, MIN_STACK_SIZE};
use crate::error::{SchedError, SchedResult};

/// 上下文栈
///
/// 栈从高地址向低地址增长，`top()` 返回可用区域的最高地址
pub struct Stack {
    /// 整个映射区域的起始地址（含保护页）
    base: NonNull<u8>,
    /// 映射区域总大小
    mapped: usize,
    /// 可用栈大小
    size: usize,
}

impl Stack {
    /// 栈对齐：16 字节
    pub const ALIGNMENT: usize = 16;

    /// 分配指定大小的栈
    ///
    /// 请求小于最小值时上调到最小值，超过上限时返回 `ResourceExhausted`
    pub fn with_size(requested: usize) -> SchedResult<Self> {
        if requested > MAX_STACK_SIZE {
            return Err(SchedError::exhausted(
                "stack",
                requested,
                format!("exceeds the {} byte limit", MAX_STACK_SIZE),
            ));
        }

        let page = page_size();
        let size = round_up(requested.max(MIN_STACK_SIZE), page)
            .ok_or_else(|| SchedError::exhausted("stack", requested, "size overflow"))?;

        Self::allocate(size, page).map_err(|reason| SchedError::exhausted("stack", requested, reason))
    }

    #[cfg(unix)]
    fn allocate(size: usize, page: usize) -> Result<Self, String> {
        let mapped = size.checked_add(page).ok_or("size overflow")?;

        let base = unsafe {
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            );
            if ptr == libc::MAP_FAILED {
                return Err(std::io::Error::last_os_error().to_string());
            }

            // 保护页：栈溢出时触发 SIGSEGV 而不是悄悄踩坏相邻内存
            if libc::mprotect(ptr, page, libc::PROT_NONE) != 0 {
                let err = std::io::Error::last_os_error().to_string();
                libc::munmap(ptr, mapped);
                return Err(err);
            }

            NonNull::new_unchecked(ptr as *mut u8)
        };

        Ok(Self { base, mapped, size })
    }

    #[cfg(not(unix))]
    fn allocate(size: usize, _page: usize) -> Result<Self, String> {
        use std::alloc::{self, Layout};

        let layout = Layout::from_size_align(size, Self::ALIGNMENT).map_err(|e| e.to_string())?;
        let base = unsafe {
            let ptr = alloc::alloc(layout);
            if ptr.is_null() {
                return Err("allocator returned null".to_string());
            }
            NonNull::new_unchecked(ptr)
        };

        Ok(Self { base, mapped: size, size })
    }

    /// 获取栈顶地址（可用区域最高地址，16 字节对齐）
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.mapped) }
    }

    /// 获取可用区域最低地址
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.mapped - self.size) }
    }

    /// 获取可用栈大小
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Stack {
    #[cfg(unix)]
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.mapped);
        }
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {
        if let Ok(layout) = std::alloc::Layout::from_size_align(self.mapped, Self::ALIGNMENT) {
            unsafe {
                std::alloc::dealloc(self.base.as_ptr(), layout);
            }
        }
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("size", &self.size())
            .finish()
    }
}

// Stack 只是一块独占内存，所有权转移到其他线程是安全的
unsafe impl Send for Stack {}

/// 系统页大小
#[cfg(unix)]
fn page_size() -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page <= 0 {
        4096
    } else {
        page as usize
    }
}

#[cfg(not(unix))]
fn page_size() -> usize {
    4096
}

fn round_up(value: usize, align: usize) -> Option<usize> {
    value.checked_add(align - 1).map(|v| v / align * align)
}
