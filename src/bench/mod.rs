//! 基准测试
//!
//! 创建 N 个上下文，每个执行 Y 次让出（或阻塞）操作，测量从调度开始到
//! 最后一个上下文完成之间的墙钟时间

pub mod os_thread;
pub mod wake;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_STACK_SIZE, WAKE_POLL_INTERVAL};
use crate::error::{SchedError, SchedResult};
use crate::runtime::{BackendKind, BlockingOp, Scheduler, SchedulerConfig, SchedulerStats, Variant};
use self::wake::CompletionLatch;

/// 基准测试变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchVariant {
    /// 协作式调度
    Fiber,
    /// 内核辅助调度
    Ums,
    /// 普通 OS 线程
    Thread,
}

impl BenchVariant {
    /// 从名称解析
    pub fn parse(name: &str) -> SchedResult<Self> {
        match name {
            "fiber" => Ok(BenchVariant::Fiber),
            "ums" => Ok(BenchVariant::Ums),
            "thread" => Ok(BenchVariant::Thread),
            _ => Err(SchedError::invalid("variant", name)),
        }
    }

    /// 名称
    pub fn name(self) -> &'static str {
        match self {
            BenchVariant::Fiber => "fiber",
            BenchVariant::Ums => "ums",
            BenchVariant::Thread => "thread",
        }
    }

    /// 对应的调度变体（OS 线程基线没有）
    pub fn scheduler_variant(self) -> Option<Variant> {
        match self {
            BenchVariant::Fiber => Some(Variant::Cooperative),
            BenchVariant::Ums => Some(Variant::KernelAssisted),
            BenchVariant::Thread => None,
        }
    }
}

/// 每次操作的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// 主动让出
    Yield,
    /// 阻塞指定时长
    Block(Duration),
}

/// 基准测试配置
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub variant: BenchVariant,
    /// 上下文数量 N
    pub contexts: usize,
    /// 每个上下文的操作次数 Y
    pub yields: usize,
    /// 载体线程数量（0 表示使用 CPU 核心数）
    pub carriers: usize,
    pub stack_size: usize,
    pub backend: BackendKind,
    pub op: OpKind,
}

impl BenchConfig {
    #[cfg(test)]
    pub fn new(contexts: usize, yields: usize) -> Self {
        Self {
            contexts,
            yields,
            ..Self::default()
        }
    }

    /// 校验参数
    pub fn validate(&self) -> SchedResult<()> {
        if self.contexts == 0 {
            return Err(SchedError::invalid("contextCount", self.contexts));
        }
        if u32::try_from(self.contexts).is_err() {
            return Err(SchedError::invalid("contextCount", self.contexts));
        }
        Ok(())
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            variant: BenchVariant::Fiber,
            contexts: 1,
            yields: 0,
            carriers: 1,
            stack_size: DEFAULT_STACK_SIZE,
            backend: BackendKind::default(),
            op: OpKind::Yield,
        }
    }
}

/// 基准测试结果
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub variant: BenchVariant,
    pub contexts: usize,
    pub yields: usize,
    /// 从开始调度到唤醒事件触发的时间
    pub duration: Duration,
    /// 完成计数
    pub completed: usize,
    /// 唤醒事件的触发请求次数
    pub wake_fires: usize,
    /// 调度统计（OS 线程基线没有）
    pub stats: Option<SchedulerStats>,
}

impl BenchReport {
    /// 总操作次数 N * Y
    pub fn total_ops(&self) -> u128 {
        self.contexts as u128 * self.yields as u128
    }

    /// 平均每次操作的纳秒数；没有操作时为 0
    pub fn avg_per_op_nanos(&self) -> u128 {
        match self.total_ops() {
            0 => 0,
            ops => self.duration.as_nanos() / ops,
        }
    }

    /// 持续时间（秒）
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// 运行一次基准测试
pub fn run(config: &BenchConfig) -> SchedResult<BenchReport> {
    config.validate()?;
    match config.variant.scheduler_variant() {
        Some(variant) => run_scheduled(config, variant),
        None => os_thread::run(config),
    }
}

/// 用户态调度变体
fn run_scheduled(config: &BenchConfig, variant: Variant) -> SchedResult<BenchReport> {
    let scheduler = Arc::new(Scheduler::with_config(SchedulerConfig {
        variant,
        num_carriers: config.carriers,
        stack_size: config.stack_size,
        backend: config.backend,
        ..SchedulerConfig::default()
    })?);
    let latch = Arc::new(CompletionLatch::new(config.contexts));

    // 任一上下文创建失败即放弃本次运行，唤醒事件不会触发
    for _ in 0..config.contexts {
        let latch = Arc::clone(&latch);
        let (yields, op) = (config.yields, config.op);
        scheduler.spawn(move |y| {
            for _ in 0..yields {
                match op {
                    OpKind::Yield => y.yield_now(),
                    OpKind::Block(d) => y.block(BlockingOp::Sleep(d)),
                }
            }
            latch.arrive();
        })?;
    }

    // 从所有载体线程就位后的放行时刻开始计时
    let start = match scheduler.start() {
        Ok(released_at) => released_at,
        Err(e) => {
            // 已启动的载体会把所有上下文运行完
            scheduler.join();
            return Err(e);
        }
    };

    // 有上下文 panic 时唤醒事件永远不会触发，以调度器排空为准
    while !latch.wake().wait_timeout(WAKE_POLL_INTERVAL) {
        if scheduler.is_drained() {
            break;
        }
    }

    scheduler.join();
    let stats = scheduler.stats();
    scheduler.shutdown();

    finish(config, &latch, start, Some(stats))
}

/// 根据完成计数生成报告
fn finish(
    config: &BenchConfig,
    latch: &CompletionLatch,
    start: Instant,
    stats: Option<SchedulerStats>,
) -> SchedResult<BenchReport> {
    let Some(fired_at) = latch.wake().fired_at() else {
        return Err(SchedError::Incomplete {
            completed: latch.count(),
            expected: config.contexts,
        });
    };

    Ok(BenchReport {
        variant: config.variant,
        contexts: config.contexts,
        yields: config.yields,
        duration: fired_at.saturating_duration_since(start),
        completed: latch.count(),
        wake_fires: latch.wake().fire_count(),
        stats,
    })
}
