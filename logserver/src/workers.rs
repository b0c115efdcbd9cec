use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    queue: VecDeque<Job>,
    /// Threads currently parked waiting for work.
    idle: usize,
    /// Threads alive, parked or running.
    live: usize,
    /// Total threads ever created, used for thread naming.
    spawned: usize,
    shutdown: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    work_ready: Condvar,
    core: usize,
    max: usize,
    idle_timeout: Duration,
}

/// Grow-on-demand thread pool for connection servicing. Core threads stay
/// around for the life of the pool; extra threads are added when a job
/// arrives and nobody is idle, up to the maximum, and retire after sitting
/// idle for the timeout.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(core: usize, max: usize, idle_timeout: Duration) -> Self {
        let core = core.max(1);
        let max = max.max(core);
        let pool = Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    idle: 0,
                    live: 0,
                    spawned: 0,
                    shutdown: false,
                }),
                work_ready: Condvar::new(),
                core,
                max,
                idle_timeout,
            }),
            threads: Mutex::new(Vec::new()),
        };
        for _ in 0..core {
            pool.spawn_worker(true);
        }
        pool
    }

    /// Queues a job. Adds a thread when every live one is busy and the pool
    /// has room to grow.
    pub fn execute(&self, job: Job) {
        let grow = {
            let mut state = self.inner.state.lock().unwrap();
            if state.shutdown {
                return;
            }
            state.queue.push_back(job);
            state.idle == 0 && state.live < self.inner.max
        };
        if grow {
            self.spawn_worker(false);
        }
        self.inner.work_ready.notify_one();
    }

    /// Number of thread handles currently tracked, finished or not.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    /// Stops accepting work and joins every thread. Jobs already queued are
    /// abandoned.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.shutdown = true;
            state.queue.clear();
        }
        self.inner.work_ready.notify_all();
        let threads = {
            let mut guard = self.threads.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        for handle in threads {
            if handle.join().is_err() {
                warn!("A service thread panicked");
            }
        }
    }

    fn spawn_worker(&self, is_core: bool) {
        let inner = self.inner.clone();
        let id = {
            let mut state = inner.state.lock().unwrap();
            state.live += 1;
            state.spawned += 1;
            state.spawned
        };
        let result = thread::Builder::new()
            .name(format!("service-{id}"))
            .spawn(move || worker_loop(inner, is_core));
        match result {
            Ok(handle) => {
                let mut threads = self.threads.lock().unwrap();
                // Retired surplus threads leave finished handles behind;
                // sweep them here so the list stays bounded under churn.
                threads.retain(|thread| !thread.is_finished());
                threads.push(handle);
            }
            Err(e) => {
                warn!("Failed to spawn service thread: {e}");
                self.inner.state.lock().unwrap().live -= 1;
            }
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>, is_core: bool) {
    let mut state = inner.state.lock().unwrap();
    loop {
        if state.shutdown {
            break;
        }
        if let Some(job) = state.queue.pop_front() {
            drop(state);
            job();
            state = inner.state.lock().unwrap();
            continue;
        }
        state.idle += 1;
        if is_core {
            state = inner.work_ready.wait(state).unwrap();
            state.idle -= 1;
        } else {
            let (guard, timeout) = inner
                .work_ready
                .wait_timeout(state, inner.idle_timeout)
                .unwrap();
            state = guard;
            state.idle -= 1;
            // An extra thread that saw nothing for a full idle period
            // retires.
            if timeout.timed_out() && state.queue.is_empty() && !state.shutdown {
                debug!("Idle service thread retiring");
                break;
            }
        }
    }
    state.live -= 1;
}
