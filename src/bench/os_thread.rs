//! OS 线程基线
//!
//! 每个上下文是一个普通的抢占式线程，让出即 `thread::yield_now`

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::wake::{CompletionLatch, WakeEvent};
use super::{finish, BenchConfig, BenchReport, OpKind};
use crate::config::{MAX_STACK_SIZE, MIN_STACK_SIZE, WAKE_POLL_INTERVAL};
use crate::error::{SchedError, SchedResult};

/// 运行 OS 线程基线
pub fn run(config: &BenchConfig) -> SchedResult<BenchReport> {
    config.validate()?;
    if config.stack_size > MAX_STACK_SIZE {
        return Err(SchedError::exhausted("thread stack", config.stack_size, "exceeds maximum stack size"));
    }

    let latch = Arc::new(CompletionLatch::new(config.contexts));
    // 所有线程创建完成后才开始计时
    let gate = Arc::new(WakeEvent::new());

    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(config.contexts);
    for i in 0..config.contexts {
        let latch = Arc::clone(&latch);
        let thread_gate = Arc::clone(&gate);
        let (yields, op) = (config.yields, config.op);
        let spawned = thread::Builder::new()
            .name(format!("bench-{}", i))
            .stack_size(config.stack_size.max(MIN_STACK_SIZE))
            .spawn(move || {
                thread_gate.wait();
                for _ in 0..yields {
                    match op {
                        OpKind::Yield => thread::yield_now(),
                        OpKind::Block(d) => thread::sleep(d),
                    }
                }
                latch.arrive();
            });

        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                abandon(&gate, handles);
                return Err(SchedError::exhausted("thread", config.stack_size, e.to_string()));
            }
        }
    }

    let start = Instant::now();
    gate.fire();

    while !latch.wake().wait_timeout(WAKE_POLL_INTERVAL) {
        if handles.iter().all(|h| h.is_finished()) {
            break;
        }
    }
    join_all(handles);

    finish(config, &latch, start, None)
}

/// 放行已创建的线程并等待它们结束
fn abandon(gate: &WakeEvent, handles: Vec<JoinHandle<()>>) {
    gate.fire();
    join_all(handles);
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    for h in handles {
        if h.join().is_err() {
            eprintln!("Benchmark thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::BenchVariant;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_threads_complete() {
        let config = BenchConfig {
            variant: BenchVariant::Thread,
            ..BenchConfig::new(16, 10)
        };
        let report = run(&config).unwrap();
        assert_eq!(report.completed, 16);
        assert_eq!(report.wake_fires, 1);
        assert_eq!(report.total_ops(), 160);
        assert!(report.avg_per_op_nanos() <= report.duration.as_nanos());
    }

    #[test]
    fn test_abandon_releases_waiting_threads() {
        let gate = Arc::new(WakeEvent::new());
        let passed = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let thread_gate = Arc::clone(&gate);
                let passed = Arc::clone(&passed);
                thread::spawn(move || {
                    thread_gate.wait();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        abandon(&gate, handles);
        assert!(gate.is_fired());
        assert_eq!(passed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_blocking_threads() {
        let config = BenchConfig {
            variant: BenchVariant::Thread,
            op: OpKind::Block(Duration::from_millis(1)),
            ..BenchConfig::new(4, 2)
        };
        let report = run(&config).unwrap();
        assert!(report.duration >= Duration::from_millis(2));
        assert_eq!(report.completed, 4);
    }
}
