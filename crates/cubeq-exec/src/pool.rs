//! Fixed-size worker pool with joinable thread groups.
//!
//! Jobs are boxed closures pulled from a shared queue by idle workers.
//! Every job belongs to a [`ThreadGroup`]; `join` blocks until all jobs of
//! the group (including jobs those jobs submitted) have finished, then
//! reports the first failure. A panicking job is caught and recorded as
//! [`Error::Job`] so it cannot take a worker down or hang the joiner.
//!
//! `join` must not be called from a pool worker: a saturated pool would
//! deadlock waiting on itself.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use cubeq_core::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    threads: usize,
    queued: AtomicUsize,
    running: AtomicUsize,
}

pub struct ThreadPool {
    handle: PoolHandle,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::Config("thread pool needs at least one worker".into()));
        }
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
            threads,
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let shared = Arc::clone(&shared);
            let worker = std::thread::Builder::new()
                .name(format!("cubeq-worker-{i}"))
                .spawn(move || worker_loop(shared))
                .map_err(|e| Error::Config(format!("failed to spawn worker {i}: {e}")))?;
            workers.push(worker);
        }
        tracing::debug!(threads, "thread pool started");

        Ok(Self {
            handle: PoolHandle { shared },
            workers,
        })
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.handle.shared.queue.lock().shutdown = true;
        self.handle.shared.available.notify_all();
        for worker in self.workers.drain(..) {
            join_worker(worker);
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    // Count as running before leaving the queue so the
                    // busy total never dips in between.
                    shared.running.fetch_add(1, Ordering::SeqCst);
                    shared.queued.fetch_sub(1, Ordering::SeqCst);
                    break job;
                }
                if queue.shutdown {
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };
        job();
        shared.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cloneable submission handle; cheap to move into jobs.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    pub fn thread_count(&self) -> usize {
        self.shared.threads
    }

    /// Non-blocking: true when running plus queued jobs leave a worker idle.
    pub fn has_free_core(&self) -> bool {
        let busy = self.shared.running.load(Ordering::SeqCst)
            + self.shared.queued.load(Ordering::SeqCst);
        busy < self.shared.threads
    }

    pub fn create_group(&self) -> ThreadGroup {
        ThreadGroup {
            state: Arc::new(GroupState {
                pending: Mutex::new(0),
                done: Condvar::new(),
                first_error: Mutex::new(None),
            }),
        }
    }

    pub fn submit<F>(&self, group: &ThreadGroup, job: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        *group.state.pending.lock() += 1;
        let state = Arc::clone(&group.state);
        let job: Job = Box::new(move || {
            let failure = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(Error::Job(panic_message(payload.as_ref()))),
            };
            state.finish(failure);
        });

        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            // Workers are gone; keep the group joinable.
            drop(queue);
            job();
            return;
        }
        queue.jobs.push_back(job);
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        drop(queue);
        self.shared.available.notify_one();
    }

    /// Wait for every job of `group`; returns the first recorded failure.
    pub fn join(&self, group: &ThreadGroup) -> Result<()> {
        {
            let mut pending = group.state.pending.lock();
            while *pending > 0 {
                group.state.done.wait(&mut pending);
            }
        }
        match group.state.first_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

struct GroupState {
    pending: Mutex<usize>,
    done: Condvar,
    first_error: Mutex<Option<Error>>,
}

impl GroupState {
    fn finish(&self, failure: Option<Error>) {
        if let Some(e) = failure {
            let mut slot = self.first_error.lock();
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.done.notify_all();
        }
    }
}

/// Jobs spawned for one operator evaluation. Dropping the last clone
/// destroys the group.
#[derive(Clone)]
pub struct ThreadGroup {
    state: Arc<GroupState>,
}

impl ThreadGroup {
    pub fn pending(&self) -> usize {
        *self.state.pending.lock()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("job panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("job panicked: {s}")
    } else {
        "job panicked".to_string()
    }
}

/// Joins a worker thread. Job panics are caught inside the loop, so a
/// panic here escaped the pool's own bookkeeping; it is logged and returned.
fn join_worker(worker: std::thread::JoinHandle<()>) -> Option<String> {
    let name = worker.thread().name().unwrap_or("cubeq-worker").to_owned();
    let payload = worker.join().err()?;
    let message = match payload.downcast_ref::<&str>() {
        Some(s) => (*s).to_owned(),
        None => payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_else(|| "non-string panic payload".to_owned()),
    };
    tracing::warn!(worker = %name, %message, "pool worker panicked");
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn worker_panic_outside_jobs_is_reported() {
        let clean = std::thread::spawn(|| {});
        assert_eq!(join_worker(clean), None);

        let broken = std::thread::Builder::new()
            .name("cubeq-worker-test".into())
            .spawn(|| panic!("queue poisoned"))
            .unwrap();
        assert_eq!(join_worker(broken).as_deref(), Some("queue poisoned"));
    }

    #[test]
    fn runs_all_jobs_before_join_returns() {
        let pool = ThreadPool::new(3).unwrap();
        let handle = pool.handle();
        let group = handle.create_group();
        let sum = Arc::new(AtomicU64::new(0));
        for i in 1..=100u64 {
            let sum = Arc::clone(&sum);
            handle.submit(&group, move || {
                sum.fetch_add(i, Ordering::SeqCst);
                Ok(())
            });
        }
        handle.join(&group).unwrap();
        assert_eq!(sum.load(Ordering::SeqCst), 5050);
        assert_eq!(group.pending(), 0);
    }

    #[test]
    fn nested_submissions_are_joined() {
        let pool = ThreadPool::new(2).unwrap();
        let handle = pool.handle();
        let group = handle.create_group();
        let hits = Arc::new(AtomicU64::new(0));

        let (h, g, c) = (handle.clone(), group.clone(), Arc::clone(&hits));
        handle.submit(&group, move || {
            for _ in 0..10 {
                let c = Arc::clone(&c);
                h.submit(&g, move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            Ok(())
        });
        handle.join(&group).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn first_error_is_reported_after_siblings_finish() {
        let pool = ThreadPool::new(2).unwrap();
        let handle = pool.handle();
        let group = handle.create_group();
        let finished = Arc::new(AtomicU64::new(0));
        handle.submit(&group, || Err(Error::Storage("page 7 unreadable".into())));
        for _ in 0..20 {
            let finished = Arc::clone(&finished);
            handle.submit(&group, move || {
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        let err = handle.join(&group).unwrap_err();
        assert!(matches!(err, Error::Storage(ref m) if m == "page 7 unreadable"));
        assert_eq!(finished.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn panics_become_job_errors() {
        let pool = ThreadPool::new(1).unwrap();
        let handle = pool.handle();
        let group = handle.create_group();
        handle.submit(&group, || panic!("boom"));
        match handle.join(&group) {
            Err(Error::Job(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected job error, got {other:?}"),
        }

        // The worker survived the panic.
        let group = handle.create_group();
        handle.submit(&group, || Ok(()));
        assert!(handle.join(&group).is_ok());
    }

    #[test]
    fn free_core_reflects_load() {
        let pool = ThreadPool::new(1).unwrap();
        let handle = pool.handle();
        assert!(handle.has_free_core());
        assert_eq!(handle.thread_count(), 1);

        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let group = handle.create_group();
        let g = Arc::clone(&gate);
        handle.submit(&group, move || {
            let mut open = g.0.lock();
            while !*open {
                g.1.wait(&mut open);
            }
            Ok(())
        });
        assert!(!handle.has_free_core());
        *gate.0.lock() = true;
        gate.1.notify_all();
        handle.join(&group).unwrap();
    }

    #[test]
    fn submissions_after_shutdown_run_inline() {
        let pool = ThreadPool::new(1).unwrap();
        let handle = pool.handle();
        drop(pool);
        let group = handle.create_group();
        let ran = Arc::new(AtomicU64::new(0));
        let r = Arc::clone(&ran);
        handle.submit(&group, move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        handle.join(&group).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_threads_rejected() {
        assert!(matches!(ThreadPool::new(0), Err(Error::Config(_))));
    }
}
