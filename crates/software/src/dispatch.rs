use crate::{ThreadStorage, util::ThreadPool, vm::Invocation};
use bumpalo::Bump;
use fragvm_core::{Program, Registers};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Signature of an invocation entry point.
pub type Entry<I> = fn(&Program, &mut I, &mut Registers) -> bool;

/// Splits a batch of invocations into spans and runs them on worker threads.
///
/// Each span goes to exactly one thread, and each thread runs on its own register
/// snapshot, so a program never observes another thread's variables.
pub struct Dispatcher<'a> {
    arena: &'a Bump,
    span: usize,
}

struct DispatchJob {
    start: usize,
    len: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(arena: &'a Bump, span: usize) -> Self {
        Self {
            arena,
            span: span.max(1),
        }
    }

    /// Runs `entry` on every item, returns how many reported `true`.
    pub fn dispatch<I: Invocation + Send>(
        &self,
        pool: &mut ThreadPool,
        program: &Program,
        storage: &ThreadStorage,
        items: &mut [I],
        entry: Entry<I>,
    ) -> usize {
        let len = items.len();
        let items_ptr = items.as_mut_ptr() as usize;

        let jobs = &*self
            .arena
            .alloc_slice_fill_iter((0..len.div_ceil(self.span)).map(|i| DispatchJob {
                start: i * self.span,
                len: self.span.min(len - i * self.span),
            }));

        let threads = pool.num_threads();
        for thread in 0..threads {
            storage.init(program, thread, false);
        }

        let valid = AtomicUsize::new(0);
        pool.execute(jobs, |job, thread| {
            // SAFETY: `items` is borrowed mutably for the whole call,
            // and the job spans never overlap
            let items = unsafe { std::slice::from_raw_parts_mut((items_ptr as *mut I).add(job.start), job.len) };

            let count = storage.span(program, thread, |regs| {
                items.iter_mut().map(|item| entry(program, item, regs)).filter(|valid| *valid).count()
            });
            valid.fetch_add(count, Ordering::Relaxed);
        });

        for thread in 0..threads {
            storage.init(program, thread, true);
        }

        valid.into_inner()
    }

    /// Same as [`Dispatcher::dispatch`], on the rayon global pool.
    #[cfg(feature = "parallel")]
    pub fn dispatch_parallel<I: Invocation + Send>(
        &self,
        program: &Program,
        storage: &ThreadStorage,
        items: &mut [I],
        entry: Entry<I>,
    ) -> usize {
        use rayon::prelude::*;

        let threads = rayon::current_num_threads();
        for thread in 0..threads {
            storage.init(program, thread, false);
        }

        let valid = items
            .par_chunks_mut(self.span)
            .map(|chunk| {
                let thread = rayon::current_thread_index().unwrap_or(0);
                storage.span(program, thread, |regs| {
                    chunk.iter_mut().map(|item| entry(program, item, regs)).filter(|valid| *valid).count()
                })
            })
            .sum();

        for thread in 0..threads {
            storage.init(program, thread, true);
        }

        valid
    }
}
