use crate::{
    Dispatcher, ThreadStorage,
    dispatch::Entry,
    util::ThreadPool,
    vm::{Invocation, execute_fragment, execute_vertex},
};
use bumpalo::Bump;
use fragvm_core::{FragmentContext, Program, ProgramId, ShaderError, UniformSource, VertexContext};
use slotmap::{DefaultKey, Key, KeyData, SlotMap};
use std::thread::available_parallelism;
use tracing::{debug, warn};

/// Runtime settings of a [`SoftwareBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Worker threads, the calling thread included.
    pub threads: usize,
    /// Invocations per job.
    pub span: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            threads: available_parallelism().map(|x| x.get()).unwrap_or(1),
            span: 256,
        }
    }
}

struct ProgramEntry {
    program: Program,
    storage: ThreadStorage,
}

/// Program store and executor.
///
/// Programs are sealed when created. Between passes they may be looked up mutably,
/// e.g. to push uniforms; appending instructions unseals them until sealed again.
pub struct SoftwareBackend {
    programs: SlotMap<DefaultKey, ProgramEntry>,
    config: DispatchConfig,

    arena: Bump,
    thread_pool: ThreadPool,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        let config = DispatchConfig {
            threads: config.threads.max(1),
            span: config.span.max(1),
        };

        Self {
            programs: SlotMap::new(),
            config,

            arena: Bump::new(),
            thread_pool: ThreadPool::with_threads(config.threads),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn create_program(&mut self, mut program: Program) -> Result<ProgramId, ShaderError> {
        if !program.is_sealed() {
            program.seal()?;
        }

        let storage = ThreadStorage::new(self.config.threads);
        let key = self.programs.insert(ProgramEntry { program, storage });
        let id = ProgramId(key.data().as_ffi());

        debug!(program = id.0, "program created");
        Ok(id)
    }

    pub fn delete_program(&mut self, id: ProgramId) -> bool {
        self.programs.remove(KeyData::from_ffi(id.0).into()).is_some()
    }

    pub fn program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(KeyData::from_ffi(id.0).into()).map(|e| &e.program)
    }

    pub fn program_mut(&mut self, id: ProgramId) -> Option<&mut Program> {
        self.programs.get_mut(KeyData::from_ffi(id.0).into()).map(|e| &mut e.program)
    }

    /// Pushes uniform values into a program, once per pass.
    pub fn update_uniforms(&mut self, id: ProgramId, source: &dyn UniformSource) -> Result<(), ShaderError> {
        match self.program_mut(id) {
            Some(program) => program.update_uniforms(source),
            None => Err(ShaderError::InvalidProgram),
        }
    }

    /// Runs a fragment program over `fragments`. Returns the number of valid fragments.
    pub fn draw_fragments(&mut self, id: ProgramId, fragments: &mut [FragmentContext]) -> usize {
        self.draw(id, fragments, execute_fragment)
    }

    /// Runs a vertex program over `vertices`. Returns the number of valid vertices.
    pub fn draw_vertices(&mut self, id: ProgramId, vertices: &mut [VertexContext]) -> usize {
        self.draw(id, vertices, execute_vertex)
    }

    fn draw<I: Invocation + Send>(&mut self, id: ProgramId, items: &mut [I], entry: Entry<I>) -> usize {
        let Some(ProgramEntry { program, storage }) = self.programs.get(KeyData::from_ffi(id.0).into()) else {
            warn!(program = id.0, "draw with unknown program");
            return 0;
        };

        if program.stage() != I::STAGE {
            warn!(program = id.0, stage = ?program.stage(), "draw with a program of the wrong stage");
            return 0;
        }
        if !program.is_runnable() {
            debug!(program = id.0, "program not runnable, pass skipped");
            return 0;
        }

        let valid = Dispatcher::new(&self.arena, self.config.span).dispatch(
            &mut self.thread_pool,
            program,
            storage,
            items,
            entry,
        );

        debug!(
            program = id.0,
            stage = ?I::STAGE,
            invocations = items.len(),
            valid = valid,
            "pass dispatched"
        );

        self.arena.reset();
        valid
    }

    /// Same as [`SoftwareBackend::draw_fragments`], on the rayon global pool.
    #[cfg(feature = "parallel")]
    pub fn draw_fragments_parallel(&mut self, id: ProgramId, fragments: &mut [FragmentContext]) -> usize {
        let Some(ProgramEntry { program, storage }) = self.programs.get(KeyData::from_ffi(id.0).into()) else {
            warn!(program = id.0, "draw with unknown program");
            return 0;
        };
        if program.stage() != FragmentContext::STAGE || !program.is_runnable() {
            return 0;
        }

        Dispatcher::new(&self.arena, self.config.span).dispatch_parallel(program, storage, fragments, execute_fragment)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragvm_core::{Arg, Value, Vec4};
    use std::collections::HashMap;

    #[test]
    fn program_lifecycle() {
        let mut backend = SoftwareBackend::with_config(DispatchConfig { threads: 2, span: 4 });

        let mut program = Program::fragment();
        program.push("=", ["fragColor".into(), ".tint".into()]).unwrap();
        let id = backend.create_program(program).unwrap();
        assert!(backend.program(id).is_some_and(|p| p.is_sealed()));

        let mut uniforms = HashMap::new();
        uniforms.insert("tint".to_string(), Value::Vec(Vec4::new(0.5, 0.5, 0.5, 1.0)));
        backend.update_uniforms(id, &uniforms).unwrap();

        let mut frags = vec![FragmentContext::new(0.0, 0.0); 10];
        assert_eq!(backend.draw_fragments(id, &mut frags), 10);
        assert!(frags.iter().all(|f| f.color == Vec4::new(0.5, 0.5, 0.5, 1.0)));

        assert!(backend.delete_program(id));
        assert!(!backend.delete_program(id));
        assert_eq!(backend.draw_fragments(id, &mut frags), 0);
    }

    #[test]
    fn invalid_program_is_rejected() {
        let mut backend = SoftwareBackend::new();
        let mut program = Program::fragment();
        program.push("if", ["fragX".into(), "<".into(), Arg::from(1.0)]).unwrap();
        assert_eq!(backend.create_program(program), Err(ShaderError::UnbalancedBranches));
    }

    #[test]
    fn stage_must_match() {
        let mut backend = SoftwareBackend::with_config(DispatchConfig { threads: 1, span: 8 });
        let mut program = Program::vertex();
        program.push("+=", ["vertexOut.x".into(), Arg::from(1.0)]).unwrap();
        let id = backend.create_program(program).unwrap();

        let mut frags = vec![FragmentContext::new(0.0, 0.0); 3];
        assert_eq!(backend.draw_fragments(id, &mut frags), 0);

        let mut verts = vec![VertexContext::new(Vec4::ZERO); 3];
        assert_eq!(backend.draw_vertices(id, &mut verts), 3);
        assert!(verts.iter().all(|v| v.out_vertex.x == 1.0));
    }
}
