//! Fixed-size multi-queue work-stealing thread pool used for parallel
//! fitness evaluation within a generation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Small fan-out constant: how many extra queues a submission/steal sweep
/// checks before falling back to blocking on its own queue.
const FAN_OUT: usize = 2;

/// Queue state and the done flag share a single mutex so a `pop` checking
/// `done` and then waiting can never miss a concurrent `mark_done`.
struct QueueState {
    jobs: VecDeque<Job>,
    done: bool,
}

struct BlockingQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl BlockingQueue {
    fn new() -> Self {
        BlockingQueue {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                done: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn push(&self, job: Job) {
        {
            let mut state = self.state.lock().unwrap();
            state.jobs.push_back(job);
        }
        self.ready.notify_one();
    }

    fn try_push(&self, job: Job) -> Result<(), Job> {
        match self.state.try_lock() {
            Ok(mut state) => {
                state.jobs.push_back(job);
                drop(state);
                self.ready.notify_one();
                Ok(())
            }
            Err(_) => Err(job),
        }
    }

    fn try_pop(&self) -> Option<Job> {
        let mut state = self.state.try_lock().ok()?;
        state.jobs.pop_front()
    }

    /// Blocks until an item is available or the queue is marked done with
    /// nothing left in it.
    fn pop(&self) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }
            if state.done {
                return None;
            }
            state = self.ready.wait(state).unwrap();
        }
    }

    fn mark_done(&self) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        drop(state);
        self.ready.notify_all();
    }
}

/// A pool of `T` worker threads, each backed by its own bounded blocking
/// queue; submissions and steals sweep up to `T * FAN_OUT` queues before
/// blocking.
pub struct WorkerPool {
    queues: Arc<Vec<BlockingQueue>>,
    threads: Vec<JoinHandle<()>>,
    submit_counter: AtomicUsize,
    shut_down: bool,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "worker pool requires at least one thread");

        let queues: Arc<Vec<BlockingQueue>> =
            Arc::new((0..num_threads).map(|_| BlockingQueue::new()).collect());

        let threads = (0..num_threads)
            .map(|worker_id| {
                let queues = Arc::clone(&queues);
                std::thread::spawn(move || worker_loop(worker_id, queues))
            })
            .collect();

        WorkerPool {
            queues,
            threads,
            submit_counter: AtomicUsize::new(0),
            shut_down: false,
        }
    }

    /// Round-robins the job across the pool's queues: tries `try_push` on
    /// `T * FAN_OUT` queues starting at the next submission index before
    /// falling back to a blocking `push`.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let count = self.queues.len();
        let start = self.submit_counter.fetch_add(1, Ordering::Relaxed);

        let mut job: Job = Box::new(job);
        for n in 0..count * FAN_OUT {
            let idx = (start + n) % count;
            match self.queues[idx].try_push(job) {
                Ok(()) => return,
                Err(returned) => job = returned,
            }
        }
        self.queues[start % count].push(job);
    }

    /// Blocks until `jobs.len()` submitted closures have all completed.
    pub fn scoped_run<F>(&self, jobs: impl IntoIterator<Item = F>)
    where
        F: FnOnce() + Send + 'static,
    {
        let jobs: Vec<F> = jobs.into_iter().collect();
        let remaining = Arc::new((Mutex::new(jobs.len()), Condvar::new()));
        for job in jobs {
            let remaining = Arc::clone(&remaining);
            self.submit(move || {
                job();
                let (lock, cvar) = &*remaining;
                let mut count = lock.lock().unwrap();
                *count -= 1;
                if *count == 0 {
                    cvar.notify_all();
                }
            });
        }
        let (lock, cvar) = &*remaining;
        let mut count = lock.lock().unwrap();
        while *count > 0 {
            count = cvar.wait(count).unwrap();
        }
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for queue in self.queues.iter() {
            queue.mark_done();
        }
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker_id: usize, queues: Arc<Vec<BlockingQueue>>) {
    let count = queues.len();
    loop {
        let mut job = None;
        for n in 0..count * FAN_OUT {
            let idx = (worker_id + n) % count;
            if let Some(found) = queues[idx].try_pop() {
                job = Some(found);
                break;
            }
        }
        let job = match job {
            Some(job) => job,
            None => match queues[worker_id].pop() {
                Some(job) => job,
                None => break,
            },
        };
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn scoped_run_waits_for_every_job() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicU64::new(0));
        let jobs: Vec<_> = (0..100)
            .map(|_| {
                let counter = Arc::clone(&counter);
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .collect();
        pool.scoped_run(jobs);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn pool_shuts_down_cleanly_on_drop() {
        let pool = WorkerPool::new(2);
        pool.submit(|| {});
        drop(pool);
    }

    #[test]
    fn shutdown_joins_idle_workers_waiting_on_an_empty_queue() {
        // Regression guard for a lost-wakeup window: `mark_done` must be
        // observed by a worker parked in `pop`'s wait, not just by one still
        // checking the `done` flag before it starts waiting.
        let mut pool = WorkerPool::new(8);
        std::thread::sleep(std::time::Duration::from_millis(20));
        pool.shutdown();
        assert!(pool.threads.is_empty());
    }
}
