//! A vector-register shading interpreter for software rasterizers.
//!
//! Programs are built instruction by instruction with [`Program::push`], sealed, and
//! then executed per fragment or per vertex, either directly through
//! [`software::execute_fragment`] or in batches through [`software::SoftwareBackend`].

pub use fragvm_core::*;

#[cfg(feature = "software")]
pub mod software {
    pub use fragvm_software::*;
}
