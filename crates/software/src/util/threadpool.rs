use std::{
    ptr::NonNull,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    thread::{Thread, available_parallelism, spawn},
};

/// A fixed set of parked worker threads. The calling thread always takes part in
/// [`ThreadPool::execute`] as thread 0.
pub struct ThreadPool {
    inner: Arc<Inner>,
    threads: Vec<Thread>,
}

impl ThreadPool {
    pub fn new() -> Self {
        Self::with_threads(available_parallelism().map(|x| x.get()).unwrap_or(1))
    }

    pub fn with_threads(threads: usize) -> Self {
        let inner = Arc::new(Inner::new());

        Self {
            threads: (0..threads.max(1) - 1)
                .map(|thread_idx| {
                    let inner = inner.clone();
                    spawn(move || {
                        while !inner.is_closed() {
                            match inner.pop_job() {
                                Some(job) => inner.run_job(job, thread_idx + 1),
                                None => std::thread::park(),
                            }
                        }
                    })
                    .thread()
                    .clone()
                })
                .collect(),
            inner,
        }
    }

    pub fn num_threads(&self) -> usize {
        1 + self.threads.len()
    }

    /// Runs `func` once per job, spread over the pool, and returns when every job is done.
    /// The second argument of `func` is the id of the executing thread.
    pub fn execute<'a, T: 'a + Sync>(
        &mut self,
        jobs: impl IntoIterator<Item = &'a T>,
        func: impl Fn(&'a T, usize) + Send + Sync,
    ) {
        let job_runner = |job: *const (), i: usize| {
            // SAFETY: every queued pointer comes from a `&'a T` that outlives this call
            func(unsafe { &*(job as *const T) }, i);
        };

        self.inner.with_runner(&job_runner, || {
            let num_jobs = self
                .inner
                .push_jobs(jobs.into_iter().map(|job| job as *const T as *const ()));

            self.threads
                .iter()
                .take(num_jobs.saturating_sub(1))
                .for_each(|t| t.unpark());

            while let Some(job) = self.inner.pop_job() {
                self.inner.run_job(job, 0);
            }

            // jobs popped by workers may still be running
            self.inner.wait_idle();
        });
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.close();
        self.threads.iter().for_each(|t| t.unpark());
    }
}

type Runner = NonNull<dyn Fn(*const (), usize) + Send + Sync>;

struct Queue {
    jobs: Vec<*const ()>,
    /// Queued plus running jobs.
    pending: usize,
}

struct Inner {
    closed: AtomicBool,
    queue: Mutex<Queue>,
    idle: Condvar,
    runner: RwLock<Option<Runner>>,
}

// SAFETY: the raw job and runner pointers are only dereferenced while `execute`
// keeps their referents alive, and the runner is `Send + Sync`.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl Inner {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            queue: Mutex::new(Queue {
                jobs: Vec::new(),
                pending: 0,
            }),
            idle: Condvar::new(),
            runner: RwLock::new(None),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop_job(&self) -> Option<*const ()> {
        self.queue().jobs.pop()
    }

    fn push_jobs(&self, jobs: impl IntoIterator<Item = *const ()>) -> usize {
        let mut queue = self.queue();
        let before = queue.jobs.len();
        queue.jobs.extend(jobs);
        let added = queue.jobs.len() - before;
        queue.pending += added;
        queue.jobs.len()
    }

    fn run_job(&self, job: *const (), thread: usize) {
        {
            let runner = self.runner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(runner) = *runner {
                // SAFETY: set by `with_runner` for the duration of `execute`,
                // which does not return before `pending` drops to zero
                unsafe {
                    runner.as_ref()(job, thread);
                }
            }
        }

        let mut queue = self.queue();
        queue.pending -= 1;
        if queue.pending == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut queue = self.queue();
        while queue.pending > 0 {
            queue = self.idle.wait(queue).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn with_runner(&self, runner: &(dyn Fn(*const (), usize) + Send + Sync), f: impl FnOnce()) {
        let runner = NonNull::from(runner);
        // SAFETY: only erases the lifetime; cleared again below before `runner` goes out of scope
        let runner: Runner = unsafe { std::mem::transmute(runner) };
        *self.runner.write().unwrap_or_else(PoisonError::into_inner) = Some(runner);

        f();

        *self.runner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
