//! Job scheduler - fixed worker pool with per-worker batched queues.
//!
//! Every worker owns one [`DoubleBuffer`] queue and is the only consumer
//! of it. Jobs route to `owner_id % worker_count`, so all jobs for one
//! engine land on the same worker and execute in submission order.
//! Producers stage jobs with [`JobScheduler::submit_job`] and publish
//! them with the batch operations; workers never see a job before its
//! batch is flushed.
//!
//! One client thread acts as the producer for every queue (the queues are
//! SPSC); the runtime upholds this by requiring `&mut self` on its
//! submission paths.

use crate::double_buffer::DoubleBuffer;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Index of a worker thread.
pub type WorkerId = usize;

/// Default per-worker batch capacity.
pub const DEFAULT_BATCH_CAPACITY: usize = 16_384;

/// A unit of work bound to an owner (engine) id.
///
/// `execute` runs first; `cleanup` runs afterwards regardless of what the
/// job did (the runtime uses it to free argument-arena slots).
pub struct Job {
    execute: Option<Box<dyn FnOnce() + Send + 'static>>,
    cleanup: Option<Box<dyn FnOnce() + Send + 'static>>,
    owner_id: usize,
}

impl Job {
    /// Create a job with no cleanup step.
    pub fn new(owner_id: usize, execute: impl FnOnce() + Send + 'static) -> Self {
        Self {
            execute: Some(Box::new(execute)),
            cleanup: None,
            owner_id,
        }
    }

    /// Create a job with a cleanup step that runs after `execute`.
    pub fn with_cleanup(
        owner_id: usize,
        execute: impl FnOnce() + Send + 'static,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            execute: Some(Box::new(execute)),
            cleanup: Some(Box::new(cleanup)),
            owner_id,
        }
    }

    /// Owner (engine) id used for routing.
    #[inline]
    pub fn owner_id(&self) -> usize {
        self.owner_id
    }

    fn run(mut self) {
        if let Some(execute) = self.execute.take() {
            execute();
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Default for Job {
    /// An inert job; queue slots start out as these.
    fn default() -> Self {
        Self {
            execute: None,
            cleanup: None,
            owner_id: 0,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("owner_id", &self.owner_id)
            .field("has_execute", &self.execute.is_some())
            .field("has_cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Fixed pool of worker threads, one batched job queue per worker.
pub struct JobScheduler {
    queues: Vec<Arc<DoubleBuffer<Job>>>,
    /// Jobs submitted but not yet finished, per worker. Incremented
    /// before the push, decremented after execute + cleanup complete, so
    /// completion checks cover in-flight jobs as well as queued ones.
    in_flight: Vec<Arc<AtomicUsize>>,
    running: Arc<AtomicBool>,
    workers: Vec<thread::JoinHandle<()>>,
    batch_capacity: usize,
}

impl JobScheduler {
    /// Spawn `num_workers` workers with the default batch capacity.
    pub fn new(num_workers: usize) -> Self {
        Self::with_options(num_workers, DEFAULT_BATCH_CAPACITY, false)
    }

    /// Spawn `num_workers` workers with `batch_capacity` slots per queue.
    /// With `pin_workers`, worker `i` is pinned to core `i mod cores`.
    pub fn with_options(num_workers: usize, batch_capacity: usize, pin_workers: bool) -> Self {
        let num_workers = num_workers.max(1);
        let running = Arc::new(AtomicBool::new(true));

        let queues: Vec<_> = (0..num_workers)
            .map(|_| Arc::new(DoubleBuffer::new(batch_capacity)))
            .collect();
        let in_flight: Vec<_> = (0..num_workers)
            .map(|_| Arc::new(AtomicUsize::new(0)))
            .collect();

        let core_ids = if pin_workers {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let workers = (0..num_workers)
            .map(|worker_id| {
                let queue = Arc::clone(&queues[worker_id]);
                let pending = Arc::clone(&in_flight[worker_id]);
                let running = Arc::clone(&running);
                let core = if core_ids.is_empty() {
                    None
                } else {
                    Some(core_ids[worker_id % core_ids.len()])
                };
                thread::spawn(move || {
                    if let Some(core) = core {
                        core_affinity::set_for_current(core);
                    }
                    Self::worker_loop(&queue, &pending, &running);
                })
            })
            .collect();

        Self {
            queues,
            in_flight,
            running,
            workers,
            batch_capacity,
        }
    }

    fn worker_loop(queue: &DoubleBuffer<Job>, in_flight: &AtomicUsize, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            match queue.try_pop() {
                Some(job) => {
                    job.run();
                    in_flight.fetch_sub(1, Ordering::Release);
                }
                None => thread::yield_now(),
            }
        }
    }

    /// Stage a job on its owner's worker queue, spin-yielding while the
    /// queue is full or mid-swap. Returns the worker the job routed to.
    pub fn submit_job(&self, job: Job) -> WorkerId {
        let worker_id = job.owner_id() % self.queues.len();
        self.in_flight[worker_id].fetch_add(1, Ordering::Relaxed);

        let mut job = job;
        loop {
            match self.queues[worker_id].try_push(job) {
                Ok(()) => break,
                Err(rejected) => {
                    job = rejected;
                    thread::yield_now();
                }
            }
        }
        worker_id
    }

    /// Publish every worker's staged batch.
    pub fn execute_batch(&self) {
        for queue in &self.queues {
            queue.flush();
        }
    }

    /// Publish one worker's staged batch.
    pub fn execute_batch_on(&self, worker_id: WorkerId) {
        if let Some(queue) = self.queues.get(worker_id) {
            queue.flush();
        }
    }

    /// Flush all queues and wait until every job has finished.
    pub fn process_jobs(&self) {
        self.execute_batch();
        self.wait_for_completion();
    }

    /// Flush all queues without waiting.
    pub fn process_jobs_async(&self) {
        self.execute_batch();
    }

    /// Flush one worker's queue and wait for that worker to finish.
    pub fn process_jobs_on(&self, worker_id: WorkerId) {
        self.execute_batch_on(worker_id);
        self.wait_for_completion_on(worker_id);
    }

    /// Flush one worker's queue without waiting.
    pub fn process_jobs_on_async(&self, worker_id: WorkerId) {
        self.execute_batch_on(worker_id);
    }

    /// Spin-yield until every submitted job has finished.
    pub fn wait_for_completion(&self) {
        while !self.is_complete() {
            thread::yield_now();
        }
    }

    /// Spin-yield until one worker has finished every submitted job.
    pub fn wait_for_completion_on(&self, worker_id: WorkerId) {
        while !self.is_worker_complete(worker_id) {
            thread::yield_now();
        }
    }

    /// True when no job is queued, staged or executing anywhere.
    pub fn is_complete(&self) -> bool {
        self.in_flight
            .iter()
            .all(|pending| pending.load(Ordering::Acquire) == 0)
    }

    /// True when one worker has no job queued, staged or executing.
    pub fn is_worker_complete(&self, worker_id: WorkerId) -> bool {
        self.in_flight
            .get(worker_id)
            .map_or(true, |pending| pending.load(Ordering::Acquire) == 0)
    }

    /// True when one worker's write buffer is full before a flush.
    pub fn is_worker_full(&self, worker_id: WorkerId) -> bool {
        self.queues
            .get(worker_id)
            .map_or(false, |queue| queue.is_full())
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    #[inline]
    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        // Run whatever is still staged, then stop the workers.
        self.execute_batch();
        self.wait_for_completion();
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
