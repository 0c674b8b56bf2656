//! Fixed-size worker pool fed through a channel.
//!
//! Jobs are boxed closures. Each job runs under `catch_unwind`, so a
//! panicking job never takes its worker down. Dropping the pool closes the
//! queue and joins every worker after it drains.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers named `{prefix}-{i}`.
    ///
    /// # Errors
    ///
    /// Propagates the OS error if a thread cannot be spawned.
    pub fn new(size: usize, prefix: &str) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{prefix}-{i}"))
                .spawn(move || {
                    for job in rx {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!("pool job panicked; worker continues");
                        }
                    }
                })?;
            workers.push(handle);
        }
        tracing::debug!(size, "worker pool started");
        Ok(Self {
            queue: Some(tx),
            workers,
        })
    }

    /// Queue a job. Returns `false` once the pool is shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &self.queue {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs. Queued jobs still run; workers exit when the
    /// queue is empty. Does not wait.
    pub fn shutdown(&mut self) {
        self.queue.take();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        let current = std::thread::current().id();
        for handle in self.workers.drain(..) {
            // A job that drops the last handle to its own pool cannot join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("worker thread panicked outside a job");
            }
        }
    }
}
