//! The executor itself: persistent workers, one task at a time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error};

/// Executor failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    /// One or more partitions panicked. The remaining partitions still
    /// ran to completion before this was reported.
    #[error("{failed} of {total} worker partitions panicked")]
    WorkerPanicked {
        /// Partitions that panicked.
        failed: usize,
        /// Total partitions dispatched.
        total: usize,
    },
    /// The worker pool is gone (a worker thread died outside a task).
    #[error("executor terminated")]
    Terminated,
}

/// Work splittable into independent partitions.
///
/// `run` is called once per worker with that worker's partition index;
/// partitions must touch disjoint data. Implementations borrow their
/// inputs, so a task only needs to live for the duration of one
/// [`ParExec::run`] call.
pub trait ParTask: Sync {
    /// Execute partition `part` of `parts`.
    fn run(&self, part: usize, parts: usize);
}

/// Half-open index range of partition `part` out of `parts` over
/// `total` elements. Even chunks, remainder folded into the last
/// partition.
#[must_use]
pub fn chunk_range(total: usize, part: usize, parts: usize) -> std::ops::Range<usize> {
    debug_assert!(parts > 0 && part < parts);
    let chunk = total / parts;
    let start = part * chunk;
    let end = if part + 1 == parts { total } else { start + chunk };
    start..end
}

/// Pointer to a borrowed task, lifetime erased for the trip through the
/// worker channels. Only constructed inside [`ParExec::run`], which
/// does not return until every worker is done with it.
struct TaskRef(*const (dyn ParTask + 'static));

// SAFETY: the pointee is only dereferenced between dispatch and the
// barrier completing, both inside one `run` call that holds the borrow.
unsafe impl Send for TaskRef {}

enum Job {
    Run(TaskRef),
    Shutdown,
}

/// Pool of persistent worker threads executing one task at a time.
pub struct ParExec {
    job_txs: Vec<Sender<Job>>,
    done_rx: Receiver<bool>,
    workers: Vec<JoinHandle<()>>,
    /// Serializes overlapping `run` calls from different threads, e.g.
    /// preview processing versus the writer thread.
    submit: Mutex<()>,
    threads: usize,
}

impl ParExec {
    /// Spawn `threads` persistent workers (at least one).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (done_tx, done_rx) = bounded::<bool>(threads);

        let mut job_txs = Vec::with_capacity(threads);
        let mut workers = Vec::with_capacity(threads);
        for part in 0..threads {
            let (job_tx, job_rx) = bounded::<Job>(1);
            let done_tx = done_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("par-exec-{part}"))
                .spawn(move || worker_loop(part, threads, &job_rx, &done_tx));
            match handle {
                Ok(handle) => {
                    job_txs.push(job_tx);
                    workers.push(handle);
                }
                Err(err) => {
                    // Spawn failure this early is unrecoverable; run()
                    // will report Terminated on first use.
                    error!(%err, part, "failed to spawn executor worker");
                }
            }
        }

        debug!(threads, "parallel executor started");
        Self {
            job_txs,
            done_rx,
            workers,
            submit: Mutex::new(()),
            threads,
        }
    }

    /// Number of worker partitions.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Execute `task` across all partitions and wait for the barrier.
    ///
    /// Returns once every partition has run exactly once. Panics inside
    /// a partition are converted into [`ExecError::WorkerPanicked`].
    pub fn run(&self, task: &dyn ParTask) -> Result<(), ExecError> {
        let _guard = self.submit.lock();

        if self.job_txs.len() != self.threads {
            return Err(ExecError::Terminated);
        }

        // SAFETY: lifetime erasure only; the barrier loop below keeps
        // this call frame (and the borrow) alive until every worker has
        // finished with the pointer.
        let raw: *const (dyn ParTask + 'static) = unsafe { std::mem::transmute(task) };

        let mut dispatched = 0usize;
        for tx in &self.job_txs {
            if tx.send(Job::Run(TaskRef(raw))).is_err() {
                break;
            }
            dispatched += 1;
        }

        // Barrier: collect exactly one outcome per dispatched partition
        // even when some of them panicked.
        let mut failed = 0usize;
        for _ in 0..dispatched {
            match self.done_rx.recv() {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(_) => return Err(ExecError::Terminated),
            }
        }

        if dispatched != self.threads {
            return Err(ExecError::Terminated);
        }
        if failed > 0 {
            return Err(ExecError::WorkerPanicked {
                failed,
                total: self.threads,
            });
        }
        Ok(())
    }
}

impl Drop for ParExec {
    fn drop(&mut self) {
        for tx in &self.job_txs {
            let _ = tx.send(Job::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(part: usize, parts: usize, job_rx: &Receiver<Job>, done_tx: &Sender<bool>) {
    while let Ok(job) = job_rx.recv() {
        match job {
            Job::Run(task) => {
                let ok = catch_unwind(AssertUnwindSafe(|| {
                    // SAFETY: the submitting `run` call blocks on the
                    // barrier until this partition reports done, so the
                    // task borrow is still live here.
                    let task = unsafe { &*task.0 };
                    task.run(part, parts);
                }))
                .is_ok();
                if !ok {
                    error!(part, "worker partition panicked");
                }
                if done_tx.send(ok).is_err() {
                    return;
                }
            }
            Job::Shutdown => return,
        }
    }
}
