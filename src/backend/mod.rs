//! The graphics-context seam.
//!
//! A [`Backend`] is responsible for only one thing: turning the renderer's
//! requests into calls on a low-level graphics API. The renderer owns one
//! backend and drives it from a single thread.
//!
//! Two implementations ship with the crate:
//!
//! - [`GlowBackend`](glow::GlowBackend) issues OpenGL 3.1 calls through
//!   [glow] (feature `glow`, on by default).
//! - [`HeadlessBackend`](headless::HeadlessBackend) runs without a GPU. It
//!   logs every command and evaluates the compositing programs on a single
//!   probe pixel, which is enough to check pass ordering, state and blending.
//!
//! [glow]: https://docs.rs/glow

use std::fmt::Debug;

use crate::error::Result;
use crate::shaders::ProgramKind;
use crate::state::{BlendFunc, CullFace, GpuState};
use crate::types::{Rect, Renderable, UniformValue};

#[cfg(feature = "glow")]
pub mod glow;
pub mod headless;

/// Storage format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA color.
    Rgba8,
    /// Packed 24-bit depth and 8-bit stencil, blit-compatible with the usual
    /// default framebuffer.
    Depth24Stencil8,
}

/// Parameters of [`Backend::create_texture`].
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    /// Storage format.
    pub format: TextureFormat,
    /// Width and height in texels.
    pub size: [u32; 2],
    /// Initial RGBA8 pixels, top row first. `None` leaves contents undefined.
    pub pixels: Option<&'a [u8]>,
}

/// How [`Backend::draw_renderable`] rasterizes triangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// Filled triangles.
    Triangles,
    /// Triangle edges as lines.
    Wireframe {
        /// Line width in pixels.
        line_width: f32,
    },
}

/// Low-level graphics context used by [`VividRenderer`](crate::VividRenderer).
///
/// Handles are plain copyable names; deleting a handle twice or using it
/// after deletion is a caller bug. Setters change global context state and
/// are expected to be cheap; the renderer diffs state before calling them.
pub trait Backend {
    /// Texture name.
    type Texture: Copy + Eq + Debug;
    /// Framebuffer name.
    type Framebuffer: Copy + Eq + Debug;
    /// Linked program name.
    type Program: Copy + Eq + Debug;
    /// Occlusion query name.
    type Query: Copy + Eq + Debug;
    /// Resolved uniform; may own data, so it is only `Clone`.
    type UniformLocation: Clone + Debug;

    /// Allocate a texture, uploading `desc.pixels` if given.
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<Self::Texture>;
    /// Free a texture and unbind it from any unit.
    fn delete_texture(&mut self, texture: Self::Texture);

    /// Create a framebuffer with the given attachments and check that it is
    /// complete.
    fn create_framebuffer(
        &mut self,
        color: Option<Self::Texture>,
        depth: Option<Self::Texture>,
    ) -> Result<Self::Framebuffer>;
    /// Free a framebuffer. Its attachments stay alive.
    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer);

    /// Create an occlusion query counting samples passed.
    fn create_query(&mut self) -> Result<Self::Query>;
    /// Free a query.
    fn delete_query(&mut self, query: Self::Query);

    /// Compile and link one of the renderer's programs from its sources.
    /// `kind` is informational: it names the program in errors.
    fn compile_program(
        &mut self,
        kind: ProgramKind,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<Self::Program>;
    /// Free a program.
    fn delete_program(&mut self, program: Self::Program);
    /// Location of an active uniform, `None` if the linker dropped it.
    fn uniform_location(
        &mut self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;

    /// Bind a framebuffer for drawing; `None` is the visible one.
    fn bind_framebuffer(&mut self, framebuffer: Option<Self::Framebuffer>);
    /// `glViewport`.
    fn set_viewport(&mut self, rect: Rect);
    /// `glScissor`.
    fn set_scissor(&mut self, rect: Rect);

    /// Enable or disable depth testing.
    fn set_depth_test(&mut self, enabled: bool);
    /// Enable or disable depth writes.
    fn set_depth_write(&mut self, enabled: bool);
    /// Enable or disable the scissor test.
    fn set_scissor_test(&mut self, enabled: bool);
    /// Cull `face`, or nothing.
    fn set_cull_face(&mut self, face: Option<CullFace>);
    /// Enable or disable blending.
    fn set_blend(&mut self, enabled: bool);
    /// Blend factors, kept while blending is off.
    fn set_blend_func(&mut self, func: BlendFunc);
    /// Value the next color clear writes.
    fn set_clear_color(&mut self, color: [f32; 4]);
    /// Value the next depth clear writes.
    fn set_clear_depth(&mut self, depth: f32);
    /// Select texture unit `unit` without binding anything to it.
    fn set_active_texture(&mut self, unit: u32);

    /// Clear the bound framebuffer. `Some` values become the new clear
    /// values before clearing, as with `glClearColor` + `glClear`.
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);

    /// Make `program` current; `None` unbinds.
    fn use_program(&mut self, program: Option<Self::Program>);
    /// Upload to a uniform of the current program.
    fn set_uniform(&mut self, location: &Self::UniformLocation, value: UniformValue);
    /// Bind a 2D texture to `unit`, leaving that unit selected.
    fn bind_texture(&mut self, unit: u32, texture: Option<Self::Texture>);

    /// Draw indexed triangles of `renderable` with the current program.
    fn draw_renderable(&mut self, renderable: &Renderable, primitive: Primitive);
    /// Draw a quad covering the viewport.
    fn draw_fullscreen_quad(&mut self);

    /// Start counting samples that pass the depth test.
    fn begin_query(&mut self, query: Self::Query);
    /// End the active query and wait for its sample count.
    fn end_query(&mut self, query: Self::Query) -> u64;

    /// Copy the depth buffer between framebuffers; `None` is the visible one.
    fn blit_depth(
        &mut self,
        src: Option<Self::Framebuffer>,
        dst: Option<Self::Framebuffer>,
        rect: Rect,
    );

    /// Read back the state the renderer may override.
    fn state(&mut self) -> GpuState;
}
