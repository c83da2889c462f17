//! # Worker Pool Module
//!
//! Fixed-size pool of named worker threads fed through bounded channels.
//!
//! ## Lifecycle
//! 1. `spawn` starts `size` workers sharing one job channel
//! 2. `submit` hands out jobs; while every worker is busy it pulls finished
//!    results so no worker ever blocks on a full result channel
//! 3. `drain` collects every result still owed to the caller
//! 4. `shutdown` (or drop) drains, sends one stop message per worker, waits
//!    for each worker's acknowledgement and joins the threads
//!
//! A pool never outlives its owner: once `shutdown` returns or the pool is
//! dropped, no worker thread is left running.

use crate::error::PoolError;
use crossbeam_channel::{bounded, Receiver, Select, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

enum Message<J> {
    Job(J),
    Stop,
}

/// Pool of worker threads applying one function to submitted jobs
pub struct WorkerPool<J, R> {
    name: String,
    jobs: Sender<Message<J>>,
    results: Receiver<R>,
    acks: Receiver<usize>,
    handles: Vec<JoinHandle<()>>,
    in_flight: usize,
    stopped: bool,
}

impl<J: Send + 'static, R: Send + 'static> WorkerPool<J, R> {
    /// Start `size` workers (at least one) that run `work` on each job
    pub fn spawn<F>(name: &str, size: usize, work: F) -> Result<Self, PoolError>
    where
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        let size = size.max(1);
        let (job_tx, job_rx) = bounded::<Message<J>>(size);
        let (result_tx, result_rx) = bounded::<R>(size);
        let (ack_tx, ack_rx) = bounded::<usize>(size);
        let work = Arc::new(work);

        let mut pool = Self {
            name: name.to_string(),
            jobs: job_tx,
            results: result_rx,
            acks: ack_rx,
            handles: Vec::with_capacity(size),
            in_flight: 0,
            stopped: false,
        };

        for index in 0..size {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let acks = ack_tx.clone();
            let work = Arc::clone(&work);

            let spawned = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    for message in jobs.iter() {
                        match message {
                            Message::Job(job) => {
                                if results.send(work(job)).is_err() {
                                    break;
                                }
                            }
                            Message::Stop => break,
                        }
                    }
                    let _ = acks.send(index);
                });

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    // Stops and joins the workers started so far
                    drop(pool);
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        debug!(pool = %pool.name, size, "worker pool started");
        Ok(pool)
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Jobs submitted whose results have not been collected yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Hand `job` to the pool, blocking while every worker is busy.
    ///
    /// Results that arrive while waiting are returned so the caller can act
    /// on them (for example stop submitting after a match).
    pub fn submit(&mut self, job: J) -> Result<Vec<R>, PoolError> {
        let mut collected = Vec::new();
        let mut select = Select::new();
        let send_index = select.send(&self.jobs);
        select.recv(&self.results);

        loop {
            let operation = select.select();
            if operation.index() == send_index {
                operation
                    .send(&self.jobs, Message::Job(job))
                    .map_err(|_| PoolError::Disconnected)?;
                self.in_flight += 1;
                return Ok(collected);
            }

            let result = operation
                .recv(&self.results)
                .map_err(|_| PoolError::Disconnected)?;
            self.in_flight -= 1;
            collected.push(result);
        }
    }
}

impl<J, R> WorkerPool<J, R> {
    /// Wait for the next outstanding result, or `None` if nothing is owed
    pub fn recv(&mut self) -> Option<R> {
        if self.in_flight == 0 {
            return None;
        }
        let result = self.results.recv().ok()?;
        self.in_flight -= 1;
        Some(result)
    }

    /// Collect every outstanding result
    pub fn drain(&mut self) -> Vec<R> {
        let mut drained = Vec::with_capacity(self.in_flight);
        while let Some(result) = self.recv() {
            drained.push(result);
        }
        if self.in_flight != 0 {
            warn!(pool = %self.name, lost = self.in_flight, "workers disconnected with results outstanding");
            self.in_flight = 0;
        }
        drained
    }

    /// Stop every worker and wait for all of them to acknowledge
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let discarded = self.drain().len();
        for _ in 0..self.handles.len() {
            if self.jobs.send(Message::Stop).is_err() {
                break;
            }
        }

        let mut acknowledged = 0;
        while acknowledged < self.handles.len() {
            if self.acks.recv().is_err() {
                break;
            }
            acknowledged += 1;
        }

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!(pool = %self.name, "worker thread panicked");
            }
        }
        debug!(pool = %self.name, acknowledged, discarded, "worker pool stopped");
    }
}

impl<J, R> Drop for WorkerPool<J, R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Default pool size: the machine's hardware parallelism
pub fn default_pool_size() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
