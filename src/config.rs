//! 配置常量模块
//!
//! 所有可调整的调度与基准测试常量都在这里定义，便于后期修改

use std::time::Duration;

/// 程序名称
pub const APP_NAME: &str = "carrier";

/// 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 默认上下文栈大小：64KB
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// 最小上下文栈大小：16KB（更小的请求会被上调）
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// 最大上下文栈大小：256MB，超过即视为资源耗尽
pub const MAX_STACK_SIZE: usize = 256 * 1024 * 1024;

/// 内核模拟层的阻塞操作工作线程数
pub const DEFAULT_KERNEL_WORKERS: usize = 4;

/// 内核工作队列容量
pub const KERNEL_QUEUE_CAPACITY: usize = 1024;

/// 载体线程空闲时等待完成通知的间隔
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// 基准测试等待唤醒事件时检查调度器是否提前退出的间隔
pub const WAKE_POLL_INTERVAL: Duration = Duration::from_millis(10);
