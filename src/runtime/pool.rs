//! Worker Pool
//!
//! Fixed set of background threads draining a shared job channel.
//!
//! Shutdown drops the sending side and joins every thread, so jobs already
//! queued still run before `shutdown()` returns.

use std::io;
use std::thread;

use crossbeam::channel::{self, Sender};

/// A unit of background work
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the running worker threads
pub(crate) struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `threads` workers (at least one)
    pub fn new(threads: usize) -> io::Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let count = threads.max(1);
        let mut workers = Vec::with_capacity(count);

        for i in 0..count {
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("atlasgate-worker-{}", i))
                .spawn(move || {
                    // recv fails once every sender is gone and the queue is empty
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })?;
            workers.push(worker);
        }

        tracing::debug!("started {} worker threads", count);
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job; returns false once the pool is shut down
    pub fn submit(&self, job: Job) -> bool {
        match &self.sender {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    /// Stop accepting jobs and wait for the workers to finish
    pub fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
