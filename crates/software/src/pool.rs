use crate::vm::{execute_fragment, execute_vertex};
use fragvm_core::{FragmentContext, Program, Registers, VertexContext};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Free list of register snapshots.
///
/// Snapshots are handed out at the start of a pass and come back at its end; they are
/// never freed, so steady-state passes do not allocate.
#[derive(Debug, Default)]
pub struct SnapshotPool {
    free: Mutex<Vec<Registers>>,
}

impl SnapshotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot initialized from `canonical`, allocating one when the pool is empty.
    pub fn checkout(&self, canonical: &Registers) -> Registers {
        let reused = lock(&self.free).pop();
        match reused {
            Some(mut snapshot) => {
                snapshot.reset_from(canonical);
                trace!(vars = canonical.len(), "snapshot reused");
                snapshot
            }
            None => {
                trace!(vars = canonical.len(), "snapshot allocated");
                canonical.clone()
            }
        }
    }

    pub fn restore(&self, snapshot: Registers) {
        lock(&self.free).push(snapshot);
    }

    /// Number of idle snapshots.
    pub fn idle(&self) -> usize {
        lock(&self.free).len()
    }
}

/// Per-thread register snapshots of one program.
///
/// Each worker thread owns the slot matching its id; two threads never share one, so
/// the slot locks are uncontended and taken once per span of invocations.
#[derive(Debug)]
pub struct ThreadStorage {
    pool: SnapshotPool,
    slots: Vec<Mutex<Option<Registers>>>,
}

impl ThreadStorage {
    pub fn new(threads: usize) -> Self {
        Self {
            pool: SnapshotPool::new(),
            slots: (0..threads.max(1)).map(|_| Mutex::new(None)).collect(),
        }
    }

    pub fn threads(&self) -> usize {
        self.slots.len()
    }

    pub fn pool(&self) -> &SnapshotPool {
        &self.pool
    }

    /// Lifecycle hook of a worker thread: checks a snapshot out at the start of its
    /// batch and returns it to the pool at the end (`is_cleanup`).
    pub fn init(&self, program: &Program, thread_id: usize, is_cleanup: bool) {
        let Some(slot) = self.slots.get(thread_id) else {
            return;
        };

        let mut slot = lock(slot);
        if is_cleanup {
            if let Some(snapshot) = slot.take() {
                self.pool.restore(snapshot);
            }
        } else {
            match slot.as_mut() {
                Some(snapshot) => snapshot.reset_from(program.registers()),
                None => *slot = Some(self.pool.checkout(program.registers())),
            }
        }
    }

    /// Runs `f` with the snapshot of `thread_id`, checking one out on first use.
    ///
    /// A thread id past the configured thread count gets a temporary snapshot that goes
    /// back to the pool right after.
    pub fn span<R>(&self, program: &Program, thread_id: usize, f: impl FnOnce(&mut Registers) -> R) -> R {
        match self.slots.get(thread_id) {
            Some(slot) => {
                let mut slot = lock(slot);
                let snapshot = slot.get_or_insert_with(|| self.pool.checkout(program.registers()));
                f(snapshot)
            }
            None => {
                let mut snapshot = self.pool.checkout(program.registers());
                let result = f(&mut snapshot);
                self.pool.restore(snapshot);
                result
            }
        }
    }

    /// Fragment entry point: runs `program` on `ctx` with the snapshot of `thread_id`.
    pub fn run_fragment(&self, program: &Program, ctx: &mut FragmentContext, thread_id: usize) -> bool {
        self.span(program, thread_id, |regs| execute_fragment(program, ctx, regs))
    }

    /// Vertex entry point.
    pub fn run_vertex(&self, program: &Program, ctx: &mut VertexContext, thread_id: usize) -> bool {
        self.span(program, thread_id, |regs| execute_vertex(program, ctx, regs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragvm_core::{Arg, Value, Vec4};

    fn counter() -> Program {
        let mut program = Program::fragment();
        program.push("=", ["n".into(), Arg::from(0)]).unwrap();
        program.push("=", ["fragColor".into(), Arg::from(1.0)]).unwrap();
        program.seal().unwrap();
        program
    }

    #[test]
    fn pool_reuses_snapshots() {
        let pool = SnapshotPool::new();
        let canonical = Registers::new(2, 0);

        let a = pool.checkout(&canonical);
        assert_eq!(pool.idle(), 0);
        pool.restore(a);
        assert_eq!(pool.idle(), 1);

        let b = pool.checkout(&canonical);
        assert_eq!(b, canonical);
        assert_eq!(pool.idle(), 0);
        pool.restore(b);
    }

    #[test]
    fn snapshot_is_reset_from_canonical() {
        let pool = SnapshotPool::new();
        let mut dirty = Registers::new(1, 0);
        if let Some(v) = dirty.var_mut(fragvm_core::SlotId(0)) {
            *v = Value::Int(7);
        }
        pool.restore(dirty);

        let canonical = Registers::new(1, 0);
        assert_eq!(pool.checkout(&canonical), canonical);
    }

    #[test]
    fn init_lifecycle() {
        let program = counter();
        let storage = ThreadStorage::new(2);

        storage.init(&program, 0, false);
        storage.init(&program, 1, false);
        assert_eq!(storage.pool().idle(), 0);

        let mut frag = FragmentContext::new(0.0, 0.0);
        assert!(storage.run_fragment(&program, &mut frag, 1));
        assert_eq!(frag.color, Vec4::ONE);

        storage.init(&program, 0, true);
        storage.init(&program, 1, true);
        assert_eq!(storage.pool().idle(), 2);

        // next pass reuses them
        storage.init(&program, 0, false);
        assert_eq!(storage.pool().idle(), 1);
    }

    #[test]
    fn out_of_range_thread_gets_temporary_snapshot() {
        let program = counter();
        let storage = ThreadStorage::new(1);
        let mut frag = FragmentContext::new(0.0, 0.0);

        assert!(storage.run_fragment(&program, &mut frag, 5));
        assert_eq!(storage.pool().idle(), 1);
    }
}
