use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{SchedError, SchedResult};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// 阻塞操作工作线程池
pub struct IoThreadPool {
    workers: Mutex<Vec<Worker>>,
    sender: Mutex<Option<Sender<Task>>>,
}

impl IoThreadPool {
    pub fn new(size: usize, capacity: usize) -> SchedResult<Self> {
        let (sender, receiver) = bounded(capacity);

        let mut workers = Vec::with_capacity(size);
        for id in 0..size.max(1) {
            workers.push(Worker::new(id, receiver.clone())?);
        }

        Ok(Self {
            workers: Mutex::new(workers),
            sender: Mutex::new(Some(sender)),
        })
    }

    /// 提交任务；线程池已关闭时原样返回任务
    pub fn execute<F>(&self, f: F) -> Result<(), Task>
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(f);
        let sender = match self.sender.lock().as_ref() {
            Some(sender) => sender.clone(),
            None => return Err(task),
        };
        sender.send(task).map_err(|e| e.into_inner())
    }

    /// 关闭队列并等待所有已提交的任务执行完
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for mut worker in workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for IoThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Task>) -> SchedResult<Self> {
        let thread = std::thread::Builder::new()
            .name(format!("kernel-worker-{}", id))
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })
            .map_err(|e| SchedError::exhausted("kernel worker", 0, e.to_string()))?;
        Ok(Self { thread: Some(thread) })
    }
}
