//! Linked programs and their uniform slot tables.

use log::{debug, error};

use crate::backend::Backend;
use crate::shaders::{ProgramKind, Uniform};
use crate::types::UniformValue;

/// A linked program with every known uniform resolved once at link time.
pub struct LinkedProgram<B: Backend> {
    /// Backend program handle.
    pub handle: B::Program,
    slots: [Option<B::UniformLocation>; Uniform::COUNT],
}

impl<B: Backend> LinkedProgram<B> {
    /// Upload `value` if the program declares `uniform`; otherwise do
    /// nothing.
    pub fn set(&self, backend: &mut B, uniform: Uniform, value: UniformValue) {
        if let Some(location) = &self.slots[uniform.index()] {
            backend.set_uniform(location, value);
        }
    }

    /// Whether the linker kept `uniform`.
    #[must_use]
    pub fn has(&self, uniform: Uniform) -> bool {
        self.slots[uniform.index()].is_some()
    }
}

/// The seven compositing programs.
///
/// Programs are built at most once per set; a program that fails to link
/// stays missing until the set is deleted and rebuilt by its owner.
pub struct GlslProgramSet<B: Backend> {
    programs: [Option<LinkedProgram<B>>; ProgramKind::ALL.len()],
    built: bool,
}

impl<B: Backend> Default for GlslProgramSet<B> {
    fn default() -> Self {
        Self {
            programs: std::array::from_fn(|_| None),
            built: false,
        }
    }
}

impl<B: Backend> GlslProgramSet<B> {
    /// Compile and link every program, resolving its slot table. Does nothing
    /// after the first call. Returns how many programs failed.
    pub fn build(&mut self, backend: &mut B) -> usize {
        if self.built {
            return 0;
        }
        self.built = true;

        let mut failed = 0;
        for kind in ProgramKind::ALL {
            let (vertex_src, fragment_src) = kind.sources();
            match backend.compile_program(kind, &vertex_src, &fragment_src) {
                Ok(handle) => {
                    let slots = std::array::from_fn(|i| {
                        backend.uniform_location(handle, Uniform::ALL[i].name())
                    });
                    debug!("linked {kind:?}");
                    self.programs[kind.index()] = Some(LinkedProgram { handle, slots });
                }
                Err(e) => {
                    error!("{e}");
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Whether [`build`](Self::build) has run.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Whether every program the compositing paths cannot do without linked.
    #[must_use]
    pub fn shaders_ready(&self) -> bool {
        ProgramKind::ALL
            .iter()
            .filter(|k| k.is_required())
            .all(|k| self.programs[k.index()].is_some())
    }

    /// The linked program of `kind`, if it linked.
    #[must_use]
    pub fn get(&self, kind: ProgramKind) -> Option<&LinkedProgram<B>> {
        self.programs[kind.index()].as_ref()
    }

    /// Delete every linked program. The set stays built: nothing is relinked.
    pub fn delete(&mut self, backend: &mut B) {
        for program in self.programs.iter_mut().filter_map(Option::take) {
            backend.delete_program(program.handle);
        }
    }
}
