//! Order-independent transparency for OpenGL scenes via depth peeling.
//!
//! This crate provides [`VividRenderer`], a compositor that takes an
//! unsorted render queue and a camera and produces a correct translucent
//! composite in the visible framebuffer. Layers are peeled front to back into
//! an off-screen blender and resolved in one final pass, so the queue never
//! needs sorting.
//!
//! # Features
//!
//! - **Depth peeling** with a configurable layer bound and optional
//!   occlusion-query early exit.
//! - **Auto-throttle**: when nothing in the queue is translucent, the peeling
//!   loop is skipped entirely.
//! - **Stencil masking**: actors flagged as stencil define where the scene
//!   shows, with a soft edge and a background color elsewhere.
//! - **Background image** letterboxed behind the composite.
//! - **Outlines**: wireframe outlines peeled with the geometry, and
//!   image-space silhouettes drawn on top.
//! - **Three paths** selected by [`RenderingMode`]: full peeling, a single
//!   stencil-masked layer, or plain forward rendering.
//!
//! # Backends
//!
//! All GPU work goes through the [`Backend`] trait. [`GlowBackend`] targets
//! OpenGL 3.1 through [glow]; [`HeadlessBackend`] runs anywhere and is what
//! the tests use.
//!
//! # Safety
//!
//! Creating a [`GlowBackend`] requires a valid, current OpenGL context, and
//! that context must stay current on the thread driving the renderer.
//!
//! [glow]: https://docs.rs/glow

mod backend;
pub mod classify;
pub mod conventions;
mod error;
mod framebuffers;
mod matrices;
mod programs;
mod render;
mod settings;
pub mod shaders;
mod state;
mod types;

#[cfg(feature = "glow")]
pub use backend::glow::GlowBackend;
pub use backend::headless::{AllocationCounts, Command, HeadlessBackend};
pub use backend::{Backend, Primitive, TextureDesc, TextureFormat};
pub use classify::{is_translucent, partition_queue, DrawParams};
pub use error::{Error, Result};
pub use framebuffers::{FrameTargets, FramebufferSet, FrontBuffers, RenderTarget};
pub use matrices::MatrixBroadcast;
pub use programs::{GlslProgramSet, LinkedProgram};
pub use render::{letterbox, FrameStats, VividRenderer, MAX_QUERY_LAYERS};
pub use settings::{RenderingMode, VividSettings};
pub use state::{BlendFactor, BlendFunc, CullFace, GpuState, RenderState, StateCache};
pub use types::{
    Actor, ActorId, BackgroundCalibration, Camera, ClearFlags, EnableSet, Rect, RenderQueue,
    RenderToken, Renderable, Shader, UniformSet, UniformValue, Vertex, Viewport,
};
