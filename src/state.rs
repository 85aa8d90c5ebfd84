//! Explicit GPU render state.
//!
//! Each pass describes the state it needs as a [`RenderState`] value and
//! hands it to a [`StateCache`], which only forwards the fields that differ
//! from what it last applied. The state the caller had bound is captured as
//! a [`GpuState`] when a frame starts and put back when it ends.

use crate::backend::Backend;
use crate::types::Rect;

/// A blend factor, as in `glBlendFuncSeparate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// `0`.
    Zero,
    /// `1`.
    One,
    /// Source channel.
    SrcColor,
    /// `1 - ` source channel.
    OneMinusSrcColor,
    /// Destination channel.
    DstColor,
    /// `1 - ` destination channel.
    OneMinusDstColor,
    /// Source alpha.
    SrcAlpha,
    /// `1 - ` source alpha.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// `1 - ` destination alpha.
    OneMinusDstAlpha,
}

impl BlendFactor {
    /// Weight this factor yields for channel `i` given source and
    /// destination colors.
    fn weight(self, src: [f32; 4], dst: [f32; 4], i: usize) -> f32 {
        match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
            Self::SrcColor => src[i],
            Self::OneMinusSrcColor => 1.0 - src[i],
            Self::DstColor => dst[i],
            Self::OneMinusDstColor => 1.0 - dst[i],
            Self::SrcAlpha => src[3],
            Self::OneMinusSrcAlpha => 1.0 - src[3],
            Self::DstAlpha => dst[3],
            Self::OneMinusDstAlpha => 1.0 - dst[3],
        }
    }
}

/// Separate RGB and alpha blend factors with an additive equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    /// Source factor for red, green and blue.
    pub src_rgb: BlendFactor,
    /// Destination factor for red, green and blue.
    pub dst_rgb: BlendFactor,
    /// Source factor for alpha.
    pub src_alpha: BlendFactor,
    /// Destination factor for alpha.
    pub dst_alpha: BlendFactor,
}

impl BlendFunc {
    /// Conventional `(SRC_ALPHA, ONE_MINUS_SRC_ALPHA)` "over" blending.
    pub const ALPHA: Self = Self::new(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

    /// GL's initial `(ONE, ZERO)`.
    pub const REPLACE: Self = Self::new(BlendFactor::One, BlendFactor::Zero);

    /// Front-to-back "under" compositing. The destination alpha holds the
    /// remaining transmittance: `rgb += src.rgb * dst.a`, `a *= 1 - src.a`.
    pub const UNDER: Self = Self {
        src_rgb: BlendFactor::DstAlpha,
        dst_rgb: BlendFactor::One,
        src_alpha: BlendFactor::Zero,
        dst_alpha: BlendFactor::OneMinusSrcAlpha,
    };

    /// Same factors for color and alpha.
    #[must_use]
    pub const fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }

    /// Evaluate the blend on the CPU, clamping to `[0, 1]` like a fixed-point
    /// color buffer.
    #[must_use]
    pub fn apply(&self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0; 4];
        for (i, o) in out.iter_mut().enumerate() {
            let (s, d) = if i < 3 {
                (self.src_rgb, self.dst_rgb)
            } else {
                (self.src_alpha, self.dst_alpha)
            };
            *o = (src[i] * s.weight(src, dst, i) + dst[i] * d.weight(src, dst, i)).clamp(0.0, 1.0);
        }
        out
    }
}

/// Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    /// Front faces.
    Front,
    /// Back faces.
    Back,
    /// Both, so only points and lines are drawn.
    FrontAndBack,
}

/// Per-pass fixed-function state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    /// `GL_DEPTH_TEST`, with `LESS`.
    pub depth_test: bool,
    /// Depth mask.
    pub depth_write: bool,
    /// `None` disables blending.
    pub blend: Option<BlendFunc>,
    /// `None` disables culling.
    pub cull_face: Option<CullFace>,
    /// `GL_SCISSOR_TEST`.
    pub scissor_test: bool,
}

impl Default for RenderState {
    /// GL's initial state.
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: true,
            blend: None,
            cull_face: None,
            scissor_test: false,
        }
    }
}

impl RenderState {
    /// Depth-tested, unblended geometry; used by the init and peel passes.
    #[must_use]
    pub fn geometry(scissor_test: bool) -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            blend: None,
            cull_face: None,
            scissor_test,
        }
    }

    /// Fullscreen composite with the given blending, depth untouched.
    #[must_use]
    pub fn composite(blend: BlendFunc, scissor_test: bool) -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            blend: Some(blend),
            cull_face: None,
            scissor_test,
        }
    }

    /// Flat mask drawing: no depth, no blending.
    #[must_use]
    pub fn mask(scissor_test: bool) -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            blend: None,
            cull_face: None,
            scissor_test,
        }
    }
}

/// Everything the renderer overrides and must hand back untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuState {
    /// Capabilities and masks.
    pub render: RenderState,
    /// Blend factors in effect even while blending is disabled.
    pub blend_func: BlendFunc,
    /// Viewport rectangle.
    pub viewport: Rect,
    /// Scissor box.
    pub scissor: Rect,
    /// Value `glClear` writes to color buffers.
    pub clear_color: [f32; 4],
    /// Value `glClear` writes to depth buffers.
    pub clear_depth: f32,
    /// Selected texture unit, counted from unit 0. Binding a texture
    /// selects its unit, so every frame changes this.
    pub active_texture: u32,
}

/// Diffing front end over a backend's raw state setters.
///
/// Starts out "unknown" so the first [`apply`](Self::apply) writes every
/// field.
#[derive(Debug, Default)]
pub struct StateCache {
    current: Option<RenderState>,
    blend_func: Option<BlendFunc>,
}

impl StateCache {
    /// Forget what was applied; the next `apply` writes everything.
    pub fn invalidate(&mut self) {
        self.current = None;
        self.blend_func = None;
    }

    /// Seed the cache with state known to be bound.
    pub fn assume(&mut self, state: RenderState, blend_func: BlendFunc) {
        self.current = Some(state);
        self.blend_func = Some(blend_func);
    }

    /// The state last applied, if known.
    #[must_use]
    pub fn current(&self) -> Option<RenderState> {
        self.current
    }

    /// Make `next` the bound state, issuing only the changes.
    pub fn apply<B: Backend>(&mut self, backend: &mut B, next: RenderState) {
        let prev = self.current;
        let changed = |f: fn(&RenderState) -> bool| prev.map_or(true, |p| f(&p) != f(&next));

        if changed(|s| s.depth_test) {
            backend.set_depth_test(next.depth_test);
        }
        if changed(|s| s.depth_write) {
            backend.set_depth_write(next.depth_write);
        }
        if changed(|s| s.scissor_test) {
            backend.set_scissor_test(next.scissor_test);
        }
        if prev.map_or(true, |p| p.cull_face != next.cull_face) {
            backend.set_cull_face(next.cull_face);
        }
        if prev.map_or(true, |p| p.blend.is_some() != next.blend.is_some()) {
            backend.set_blend(next.blend.is_some());
        }
        if let Some(func) = next.blend {
            if self.blend_func != Some(func) {
                backend.set_blend_func(func);
                self.blend_func = Some(func);
            }
        }

        self.current = Some(next);
    }

    /// Put back a state captured with [`Backend::state`], unconditionally.
    pub fn restore<B: Backend>(&mut self, backend: &mut B, saved: &GpuState) {
        self.invalidate();
        self.apply(backend, saved.render);
        if self.blend_func != Some(saved.blend_func) {
            backend.set_blend_func(saved.blend_func);
            self.blend_func = Some(saved.blend_func);
        }
        backend.set_viewport(saved.viewport);
        backend.set_scissor(saved.scissor);
        backend.set_clear_color(saved.clear_color);
        backend.set_clear_depth(saved.clear_depth);
        backend.set_active_texture(saved.active_texture);
    }
}
