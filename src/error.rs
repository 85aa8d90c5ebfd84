//! Error types for backend resource creation and shader compilation.
//!
//! None of these escape [`VividRenderer::render`](crate::VividRenderer::render):
//! the renderer logs them and skips the frame. They are returned by the
//! [`Backend`](crate::Backend) trait and by the background-image setters.

use thiserror::Error;

use crate::shaders::ProgramKind;

/// Errors produced while creating GPU resources.
#[derive(Error, Debug)]
pub enum Error {
    /// The graphics context refused to create an object.
    #[error("failed to create {what}: {reason}")]
    ResourceCreation {
        /// Kind of object, e.g. `"texture"`.
        what: &'static str,
        /// Driver-provided reason.
        reason: String,
    },

    /// A shader stage failed to compile.
    #[error("{program:?} shader compile error: {log}")]
    ShaderCompile {
        /// Program the stage belongs to.
        program: ProgramKind,
        /// Compiler info log.
        log: String,
    },

    /// A program failed to link.
    #[error("{program:?} program link error: {log}")]
    ProgramLink {
        /// Program that failed.
        program: ProgramKind,
        /// Linker info log.
        log: String,
    },

    /// A framebuffer was not complete after attaching its textures.
    #[error("framebuffer incomplete (status 0x{status:x})")]
    IncompleteFramebuffer {
        /// Status returned by the completeness check.
        status: u32,
    },

    /// A background image could not be decoded.
    #[error("failed to decode background image: {0}")]
    ImageDecode(#[from] image::ImageError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn creation(what: &'static str, reason: impl Into<String>) -> Self {
        Self::ResourceCreation {
            what,
            reason: reason.into(),
        }
    }
}
