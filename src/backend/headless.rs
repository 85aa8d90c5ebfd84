//! A GPU-less [`Backend`] for tests and tooling.
//!
//! [`HeadlessBackend`] records every command it receives and emulates the
//! compositing programs on one *probe* pixel. Geometry is rasterized at the
//! probe's center with barycentric interpolation, depth tested with `LESS`,
//! blended with [`BlendFunc::apply`] and written to whatever the bound
//! framebuffer has attached. That is enough to follow a layer through
//! init, peel, blend and final resolve, and to compare the result against a
//! hand-computed composite.
//!
//! The command log is never trimmed by the backend: every frame appends to
//! it. Long-running users call [`clear_commands`](HeadlessBackend::clear_commands)
//! once per frame, after inspecting it.
//!
//! Limitations: lighting, fog and smart clips are not evaluated, wireframes
//! rasterize as filled triangles, the stencil mask is read without
//! smoothing, and the 2D outline program always sees a flat neighborhood
//! (it never finds an edge at a single pixel).

use std::collections::HashMap;

use glam::{Mat4, Vec4};

use super::{Backend, Primitive, TextureDesc, TextureFormat};
use crate::error::{Error, Result};
use crate::shaders::{output_mode, ProgramKind, PEEL_DEPTH_EPSILON};
use crate::state::{BlendFunc, CullFace, GpuState, RenderState};
use crate::types::{Rect, Renderable, UniformValue};

/// Texture handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessTexture(u32);

/// Framebuffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessFramebuffer(u32);

/// Program handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessProgram(u32);

/// Query handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessQuery(u32);

/// Uniform location: the owning program and the uniform's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessUniform {
    program: HeadlessProgram,
    name: String,
}

/// Where a command went; `None` is the visible framebuffer.
pub type Target = Option<HeadlessFramebuffer>;

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A clear of the bound framebuffer.
    Clear {
        /// Cleared framebuffer.
        target: Target,
        /// Color written, if the color buffer was cleared.
        color: Option<[f32; 4]>,
        /// Depth written, if the depth buffer was cleared.
        depth: Option<f32>,
    },
    /// Queue geometry.
    Draw {
        /// Framebuffer drawn into.
        target: Target,
        /// Program in use, `None` if nothing or an unknown program was bound.
        program: Option<ProgramKind>,
        /// Fixed-function state at draw time.
        state: RenderState,
        /// How triangles were rasterized.
        primitive: Primitive,
    },
    /// Fullscreen quad.
    Quad {
        /// Framebuffer drawn into.
        target: Target,
        /// Program in use.
        program: Option<ProgramKind>,
        /// Fixed-function state at draw time.
        state: RenderState,
    },
    /// A depth copy between framebuffers.
    BlitDepth {
        /// Read framebuffer.
        src: Target,
        /// Draw framebuffer.
        dst: Target,
    },
    /// A finished occlusion query and the count it reported.
    Query { samples: u64 },
}

/// Running totals of object creation and deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationCounts {
    /// Successful [`Backend::create_texture`] calls.
    pub textures_created: usize,
    /// Textures deleted while alive.
    pub textures_deleted: usize,
    /// Successful [`Backend::create_framebuffer`] calls.
    pub framebuffers_created: usize,
    /// Framebuffers deleted while alive.
    pub framebuffers_deleted: usize,
    /// Successfully linked programs.
    pub programs_created: usize,
    /// Programs deleted while alive.
    pub programs_deleted: usize,
    /// Successful [`Backend::create_query`] calls.
    pub queries_created: usize,
    /// Queries deleted while alive.
    pub queries_deleted: usize,
}

#[derive(Debug, Clone)]
struct TextureData {
    format: TextureFormat,
    /// Value at the probe pixel. Depth lives in the red channel.
    probe: [f32; 4],
    /// Texel at the image center, for normalized sampling.
    center: [f32; 4],
}

#[derive(Debug, Clone, Copy)]
struct FramebufferData {
    color: Option<HeadlessTexture>,
    depth: Option<HeadlessTexture>,
}

#[derive(Debug, Clone)]
struct ProgramData {
    kind: ProgramKind,
    source: String,
}

/// See the [module documentation](self).
#[derive(Debug)]
pub struct HeadlessBackend {
    next_id: u32,
    probe: (i32, i32),

    textures: HashMap<HeadlessTexture, TextureData>,
    framebuffers: HashMap<HeadlessFramebuffer, FramebufferData>,
    programs: HashMap<HeadlessProgram, ProgramData>,
    queries: Vec<HeadlessQuery>,
    uniforms: HashMap<(HeadlessProgram, String), UniformValue>,

    default_color: [f32; 4],
    default_depth: f32,

    bound_framebuffer: Target,
    bound_program: Option<HeadlessProgram>,
    texture_units: HashMap<u32, HeadlessTexture>,
    active_texture: u32,
    active_query: Option<HeadlessQuery>,
    samples: u64,

    depth_test: bool,
    depth_write: bool,
    blend: bool,
    blend_func: BlendFunc,
    cull_face: Option<CullFace>,
    scissor_test: bool,
    viewport: Rect,
    scissor: Rect,
    clear_color: [f32; 4],
    clear_depth: f32,

    commands: Vec<Command>,
    counts: AllocationCounts,
    state_calls: usize,
    queries_finished: usize,

    failing_programs: Vec<ProgramKind>,
    zero_samples_at: Option<usize>,
    queries_unsupported: bool,
    textures_fail: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// A backend probing pixel `(0, 0)`, with GL's initial state and a
    /// visible framebuffer holding black at depth 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            probe: (0, 0),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            queries: Vec::new(),
            uniforms: HashMap::new(),
            default_color: [0.0, 0.0, 0.0, 1.0],
            default_depth: 1.0,
            bound_framebuffer: None,
            bound_program: None,
            texture_units: HashMap::new(),
            active_texture: 0,
            active_query: None,
            samples: 0,
            depth_test: false,
            depth_write: true,
            blend: false,
            blend_func: BlendFunc::REPLACE,
            cull_face: None,
            scissor_test: false,
            viewport: Rect::default(),
            scissor: Rect::default(),
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            commands: Vec::new(),
            counts: AllocationCounts::default(),
            state_calls: 0,
            queries_finished: 0,
            failing_programs: Vec::new(),
            zero_samples_at: None,
            queries_unsupported: false,
            textures_fail: false,
        }
    }

    /// Probe pixel `(x, y)` instead of the origin.
    #[must_use]
    pub fn with_probe(mut self, x: i32, y: i32) -> Self {
        self.probe = (x, y);
        self
    }

    /// Make linking `kind` fail.
    #[must_use]
    pub fn with_failing_program(mut self, kind: ProgramKind) -> Self {
        self.failing_programs.push(kind);
        self
    }

    /// Script occlusion queries: the `k`-th query (1-based, counted from
    /// the last [`clear_commands`](Self::clear_commands)) reports zero
    /// samples and the earlier ones report at least one.
    #[must_use]
    pub fn with_zero_samples_at(mut self, k: usize) -> Self {
        self.zero_samples_at = Some(k);
        self
    }

    /// Make query creation fail.
    #[must_use]
    pub fn without_queries(mut self) -> Self {
        self.queries_unsupported = true;
        self
    }

    /// Make texture creation fail until switched back.
    pub fn set_textures_fail(&mut self, fail: bool) {
        self.textures_fail = fail;
    }

    /// Seed the visible framebuffer at the probe.
    pub fn set_visible_pixel(&mut self, color: [f32; 4], depth: f32) {
        self.default_color = color;
        self.default_depth = depth;
    }

    /// Color of the visible framebuffer at the probe.
    #[must_use]
    pub fn pixel(&self) -> [f32; 4] {
        self.default_color
    }

    /// Depth of the visible framebuffer at the probe.
    #[must_use]
    pub fn depth(&self) -> f32 {
        self.default_depth
    }

    /// Every command since the last [`clear_commands`](Self::clear_commands).
    /// The log is unbounded.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forget recorded commands and restart query scripting.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
        self.queries_finished = 0;
    }

    /// Creation and deletion totals since construction.
    #[must_use]
    pub fn counts(&self) -> AllocationCounts {
        self.counts
    }

    /// Number of raw state setter calls received.
    #[must_use]
    pub fn state_calls(&self) -> usize {
        self.state_calls
    }

    /// Objects currently alive: textures, framebuffers, programs, queries.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.textures.len() + self.framebuffers.len() + self.programs.len() + self.queries.len()
    }

    /// Geometry draws issued with `kind`.
    #[must_use]
    pub fn draws_with(&self, kind: ProgramKind) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { program: Some(p), .. } if *p == kind))
            .count()
    }

    /// Fullscreen quads issued with `kind`.
    #[must_use]
    pub fn quads_with(&self, kind: ProgramKind) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Quad { program: Some(p), .. } if *p == kind))
            .count()
    }

    /// Color attachment of `framebuffer` at the emulated pixel, `None` if it
    /// has no color attachment or was deleted.
    #[must_use]
    pub fn color_at(&self, framebuffer: HeadlessFramebuffer) -> Option<[f32; 4]> {
        let color = self.framebuffers.get(&framebuffer)?.color?;
        self.textures.get(&color).map(|t| t.probe)
    }

    /// Last value uploaded to `name` in the program of `kind`.
    #[must_use]
    pub fn uniform(&self, kind: ProgramKind, name: &str) -> Option<UniformValue> {
        let (id, _) = self.programs.iter().find(|(_, p)| p.kind == kind)?;
        self.uniforms.get(&(*id, name.to_owned())).copied()
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn render_state(&self) -> RenderState {
        RenderState {
            depth_test: self.depth_test,
            depth_write: self.depth_write,
            blend: self.blend.then_some(self.blend_func),
            cull_face: self.cull_face,
            scissor_test: self.scissor_test,
        }
    }

    fn program_kind(&self) -> Option<ProgramKind> {
        self.bound_program
            .and_then(|p| self.programs.get(&p))
            .map(|p| p.kind)
    }

    fn attachments(&self) -> (Option<HeadlessTexture>, Option<HeadlessTexture>) {
        match self.bound_framebuffer {
            None => (None, None),
            Some(fb) => self
                .framebuffers
                .get(&fb)
                .map_or((None, None), |f| (f.color, f.depth)),
        }
    }

    fn scissor_passes(&self) -> bool {
        !self.scissor_test || self.scissor.contains(self.probe.0, self.probe.1)
    }

    fn get(&self, name: &str) -> Option<UniformValue> {
        let program = self.bound_program?;
        self.uniforms.get(&(program, name.to_owned())).copied()
    }

    fn get_i32(&self, name: &str) -> i32 {
        match self.get(name) {
            Some(UniformValue::Int(v)) => v,
            _ => 0,
        }
    }

    fn get_f32(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(UniformValue::Float(v)) => v,
            _ => 0.0,
        }
    }

    fn get_vec4(&self, name: &str) -> [f32; 4] {
        match self.get(name) {
            Some(UniformValue::Vec4(v)) => v,
            _ => [0.0; 4],
        }
    }

    fn get_mat4(&self, name: &str) -> Mat4 {
        match self.get(name) {
            Some(UniformValue::Mat4(m)) => m,
            _ => Mat4::ZERO,
        }
    }

    /// The texture a sampler uniform points at.
    fn sampler(&self, name: &str) -> Option<&TextureData> {
        let unit = u32::try_from(self.get_i32(name)).unwrap_or(0);
        self.texture_units
            .get(&unit)
            .and_then(|t| self.textures.get(t))
    }

    fn sample(&self, name: &str) -> [f32; 4] {
        self.sampler(name).map_or([0.0; 4], |t| t.probe)
    }

    fn read_depth(&self) -> f32 {
        match self.attachments() {
            (_, Some(tex)) => self.textures.get(&tex).map_or(1.0, |t| t.probe[0]),
            (None, None) if self.bound_framebuffer.is_none() => self.default_depth,
            _ => 1.0,
        }
    }

    /// Run one fragment through depth test, query, blend and write.
    fn emit_fragment(&mut self, src: [f32; 4], depth: f32) {
        if !self.scissor_passes() {
            return;
        }
        let has_depth = self.bound_framebuffer.is_none() || self.attachments().1.is_some();
        if self.depth_test && has_depth && depth >= self.read_depth() {
            return;
        }
        if self.active_query.is_some() {
            self.samples += 1;
        }

        if self.depth_test && self.depth_write {
            match self.attachments() {
                (_, Some(tex)) => {
                    if let Some(t) = self.textures.get_mut(&tex) {
                        t.probe[0] = depth;
                    }
                }
                _ if self.bound_framebuffer.is_none() => self.default_depth = depth,
                _ => {}
            }
        }

        let blend = self.blend.then_some(self.blend_func);
        let write = |dst: [f32; 4]| match blend {
            Some(func) => func.apply(src, dst),
            None => src.map(|c| c.clamp(0.0, 1.0)),
        };
        match self.attachments() {
            (Some(tex), _) => {
                if let Some(t) = self.textures.get_mut(&tex) {
                    t.probe = write(t.probe);
                }
            }
            _ if self.bound_framebuffer.is_none() => self.default_color = write(self.default_color),
            _ => {}
        }
    }

    /// Fragments of `renderable` covering the probe, as `(depth, color)`.
    fn rasterize(&self, renderable: &Renderable) -> Vec<(f32, [f32; 4])> {
        let mvp =
            self.get_mat4("u_projection") * self.get_mat4("u_view") * self.get_mat4("u_model");
        #[expect(clippy::cast_precision_loss)]
        let (px, py) = (self.probe.0 as f32 + 0.5, self.probe.1 as f32 + 0.5);
        #[expect(clippy::cast_precision_loss)]
        let (vx, vy, vw, vh) = (
            self.viewport.x as f32,
            self.viewport.y as f32,
            self.viewport.width as f32,
            self.viewport.height as f32,
        );

        let to_window = |index: u32| {
            let v = renderable.vertices.get(index as usize)?;
            let clip = mvp * Vec4::new(v.position[0], v.position[1], v.position[2], 1.0);
            if clip.w <= 0.0 {
                return None;
            }
            let ndc = clip.truncate() / clip.w;
            Some((
                vx + (ndc.x + 1.0) * 0.5 * vw,
                vy + (ndc.y + 1.0) * 0.5 * vh,
                ndc.z * 0.5 + 0.5,
                v.color,
            ))
        };

        let mut fragments = Vec::new();
        for tri in renderable.indices.chunks_exact(3) {
            let (Some(a), Some(b), Some(c)) =
                (to_window(tri[0]), to_window(tri[1]), to_window(tri[2]))
            else {
                continue;
            };
            let area = (b.0 - a.0) * (c.1 - a.1) - (c.0 - a.0) * (b.1 - a.1);
            if area.abs() < f32::EPSILON {
                continue;
            }
            let w0 = ((b.0 - px) * (c.1 - py) - (c.0 - px) * (b.1 - py)) / area;
            let w1 = ((c.0 - px) * (a.1 - py) - (a.0 - px) * (c.1 - py)) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let z = w0 * a.2 + w1 * b.2 + w2 * c.2;
            if !(0.0..=1.0).contains(&z) {
                continue;
            }
            let mut color = [0.0; 4];
            for (i, out) in color.iter_mut().enumerate() {
                *out = w0 * a.3[i] + w1 * b.3[i] + w2 * c.3[i];
            }
            fragments.push((z, color));
        }
        fragments
    }

    /// Geometry fragment program, minus lighting and effects.
    fn shade_geometry(
        &self,
        kind: ProgramKind,
        vertex_color: [f32; 4],
        depth: f32,
    ) -> Option<[f32; 4]> {
        let mut color = if kind.is_outline_geometry() {
            self.get_vec4("u_outline_color")
        } else {
            let d = self.get_vec4("u_diffuse");
            [0, 1, 2, 3].map(|i| d[i] * vertex_color[i])
        };
        color[3] *= self.get_f32("u_opacity");
        let [r, g, b, a] = color;

        if kind.is_peel() {
            if depth <= self.sample("u_peel_depth")[0] + PEEL_DEPTH_EPSILON {
                return None;
            }
            return Some([r * a, g * a, b * a, a]);
        }
        Some(match self.get_i32("u_output_mode") {
            output_mode::STRAIGHT => color,
            output_mode::MASK => [1.0; 4],
            _ => [r * a, g * a, b * a, 1.0 - a],
        })
    }

    /// Fullscreen program output at the probe.
    fn shade_quad(&self, kind: ProgramKind) -> [f32; 4] {
        match kind {
            ProgramKind::FrontBlend => {
                if self.get_i32("u_normalized") == 0 {
                    self.sample("u_source")
                } else {
                    self.sampler("u_source").map_or([0.0; 4], |t| t.center)
                }
            }
            ProgramKind::FrontFinal => {
                let accum = self.sample("u_source");
                let alpha = 1.0 - accum[3];
                let front = if alpha > 0.0 {
                    [accum[0] / alpha, accum[1] / alpha, accum[2] / alpha, alpha]
                } else {
                    [0.0; 4]
                };
                let outside = if self.get_i32("u_background_enabled") == 0 {
                    self.get_vec4("u_stencil_background")
                } else {
                    [0.0; 4]
                };
                let mask = if self.get_i32("u_stencil_enabled") == 0 {
                    1.0
                } else {
                    self.sample("u_stencil")[0]
                };
                [0, 1, 2, 3].map(|i| outside[i] + (front[i] - outside[i]) * mask)
            }
            ProgramKind::Outline2D => {
                let c = self.get_vec4("u_outline_color");
                [c[0], c[1], c[2], 0.0]
            }
            // Geometry programs over a quad: treat it like a flat
            // renderable at depth 0.5 with white vertices.
            kind => self.shade_geometry(kind, [1.0; 4], 0.5).unwrap_or([0.0; 4]),
        }
    }

    fn count_state_call(&mut self) {
        self.state_calls += 1;
    }
}

/// The lines of `source` the GLSL preprocessor keeps, given its own
/// `#define`s. Only `#define NAME`, `#ifdef`, `#ifndef`, `#else` and `#endif`
/// are understood.
fn active_lines(source: &str) -> String {
    let mut defines = Vec::new();
    // One entry per open conditional: whether its current branch is taken.
    let mut branches: Vec<bool> = Vec::new();
    let mut out = String::new();

    for line in source.lines() {
        let directive = line.trim_start();
        let active = branches.iter().all(|taken| *taken);
        if let Some(name) = directive.strip_prefix("#ifdef ") {
            branches.push(defines.contains(&name.trim()));
        } else if let Some(name) = directive.strip_prefix("#ifndef ") {
            branches.push(!defines.contains(&name.trim()));
        } else if directive.starts_with("#else") {
            if let Some(taken) = branches.last_mut() {
                *taken = !*taken;
            }
        } else if directive.starts_with("#endif") {
            branches.pop();
        } else if !active {
            continue;
        } else if let Some(name) = directive.strip_prefix("#define ") {
            defines.extend(name.split_whitespace().next());
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

impl Backend for HeadlessBackend {
    type Texture = HeadlessTexture;
    type Framebuffer = HeadlessFramebuffer;
    type Program = HeadlessProgram;
    type Query = HeadlessQuery;
    type UniformLocation = HeadlessUniform;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<HeadlessTexture> {
        if self.textures_fail {
            return Err(Error::creation("texture", "scripted failure"));
        }
        let [w, h] = desc.size;
        let texel = |x: u32, y: u32| -> Option<[f32; 4]> {
            let pixels = desc.pixels?;
            let offset = ((y as usize) * (w as usize) + x as usize) * 4;
            let px = pixels.get(offset..offset + 4)?;
            Some([0, 1, 2, 3].map(|i| f32::from(px[i]) / 255.0))
        };
        let probe_x = u32::try_from(self.probe.0).unwrap_or(0);
        // Stored top row first, while the probe counts from the bottom.
        let probe_y = h
            .saturating_sub(1)
            .saturating_sub(u32::try_from(self.probe.1).unwrap_or(0));
        let data = TextureData {
            format: desc.format,
            probe: texel(probe_x, probe_y).unwrap_or([0.0; 4]),
            center: texel(w / 2, h / 2).unwrap_or([0.0; 4]),
        };

        let id = HeadlessTexture(self.alloc_id());
        self.textures.insert(id, data);
        self.counts.textures_created += 1;
        Ok(id)
    }

    fn delete_texture(&mut self, texture: HeadlessTexture) {
        if self.textures.remove(&texture).is_some() {
            self.counts.textures_deleted += 1;
        }
        self.texture_units.retain(|_, t| *t != texture);
    }

    fn create_framebuffer(
        &mut self,
        color: Option<HeadlessTexture>,
        depth: Option<HeadlessTexture>,
    ) -> Result<HeadlessFramebuffer> {
        let color_ok = color.is_none_or(|t| {
            self.textures
                .get(&t)
                .is_some_and(|d| d.format == TextureFormat::Rgba8)
        });
        let depth_ok = depth.is_none_or(|t| {
            self.textures
                .get(&t)
                .is_some_and(|d| d.format == TextureFormat::Depth24Stencil8)
        });
        if !color_ok || !depth_ok || (color.is_none() && depth.is_none()) {
            return Err(Error::IncompleteFramebuffer { status: 0 });
        }
        let id = HeadlessFramebuffer(self.alloc_id());
        self.framebuffers.insert(id, FramebufferData { color, depth });
        self.counts.framebuffers_created += 1;
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: HeadlessFramebuffer) {
        if self.framebuffers.remove(&framebuffer).is_some() {
            self.counts.framebuffers_deleted += 1;
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_query(&mut self) -> Result<HeadlessQuery> {
        if self.queries_unsupported {
            return Err(Error::creation("query", "occlusion queries unsupported"));
        }
        let id = HeadlessQuery(self.alloc_id());
        self.queries.push(id);
        self.counts.queries_created += 1;
        Ok(id)
    }

    fn delete_query(&mut self, query: HeadlessQuery) {
        let before = self.queries.len();
        self.queries.retain(|q| *q != query);
        if self.queries.len() != before {
            self.counts.queries_deleted += 1;
        }
    }

    fn compile_program(
        &mut self,
        kind: ProgramKind,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<HeadlessProgram> {
        if self.failing_programs.contains(&kind) {
            return Err(Error::ProgramLink {
                program: kind,
                log: "scripted link failure".to_owned(),
            });
        }
        let id = HeadlessProgram(self.alloc_id());
        self.programs.insert(
            id,
            ProgramData {
                kind,
                source: active_lines(vertex_src) + &active_lines(fragment_src),
            },
        );
        self.counts.programs_created += 1;
        Ok(id)
    }

    fn delete_program(&mut self, program: HeadlessProgram) {
        if self.programs.remove(&program).is_some() {
            self.counts.programs_deleted += 1;
        }
        self.uniforms.retain(|(p, _), _| *p != program);
        if self.bound_program == Some(program) {
            self.bound_program = None;
        }
    }

    /// Resolves any name whose base identifier occurs in the program source.
    fn uniform_location(
        &mut self,
        program: HeadlessProgram,
        name: &str,
    ) -> Option<HeadlessUniform> {
        let base = name.split('[').next().unwrap_or(name);
        let declared = self
            .programs
            .get(&program)
            .is_some_and(|p| p.source.contains(base));
        declared.then(|| HeadlessUniform {
            program,
            name: name.to_owned(),
        })
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<HeadlessFramebuffer>) {
        self.bound_framebuffer = framebuffer;
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = rect;
    }

    fn set_scissor(&mut self, rect: Rect) {
        self.scissor = rect;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.count_state_call();
        self.depth_test = enabled;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.count_state_call();
        self.depth_write = enabled;
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.count_state_call();
        self.scissor_test = enabled;
    }

    fn set_cull_face(&mut self, face: Option<CullFace>) {
        self.count_state_call();
        self.cull_face = face;
    }

    fn set_blend(&mut self, enabled: bool) {
        self.count_state_call();
        self.blend = enabled;
    }

    fn set_blend_func(&mut self, func: BlendFunc) {
        self.count_state_call();
        self.blend_func = func;
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn set_clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    fn set_active_texture(&mut self, unit: u32) {
        self.active_texture = unit;
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        if let Some(c) = color {
            self.clear_color = c;
        }
        if let Some(d) = depth {
            self.clear_depth = d;
        }
        self.commands.push(Command::Clear {
            target: self.bound_framebuffer,
            color,
            depth,
        });
        if !self.scissor_passes() {
            return;
        }

        let (color_tex, depth_tex) = self.attachments();
        let visible = self.bound_framebuffer.is_none();
        if color.is_some() {
            let value = self.clear_color;
            if visible {
                self.default_color = value;
            } else if let Some(t) = color_tex.and_then(|t| self.textures.get_mut(&t)) {
                t.probe = value;
            }
        }
        if depth.is_some() {
            let value = self.clear_depth;
            if visible {
                self.default_depth = value;
            } else if let Some(t) = depth_tex.and_then(|t| self.textures.get_mut(&t)) {
                t.probe[0] = value;
            }
        }
    }

    fn use_program(&mut self, program: Option<HeadlessProgram>) {
        self.bound_program = program;
    }

    fn set_uniform(&mut self, location: &HeadlessUniform, value: UniformValue) {
        self.uniforms
            .insert((location.program, location.name.clone()), value);
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<HeadlessTexture>) {
        self.active_texture = unit;
        match texture {
            Some(t) => self.texture_units.insert(unit, t),
            None => self.texture_units.remove(&unit),
        };
    }

    fn draw_renderable(&mut self, renderable: &Renderable, primitive: Primitive) {
        let program = self.program_kind();
        self.commands.push(Command::Draw {
            target: self.bound_framebuffer,
            program,
            state: self.render_state(),
            primitive,
        });
        let Some(kind) = program.filter(|k| k.is_geometry()) else {
            return;
        };
        for (depth, vertex_color) in self.rasterize(renderable) {
            if let Some(color) = self.shade_geometry(kind, vertex_color, depth) {
                self.emit_fragment(color, depth);
            }
        }
    }

    fn draw_fullscreen_quad(&mut self) {
        let program = self.program_kind();
        self.commands.push(Command::Quad {
            target: self.bound_framebuffer,
            program,
            state: self.render_state(),
        });
        let Some(kind) = program else {
            return;
        };
        if !self.viewport.contains(self.probe.0, self.probe.1) {
            return;
        }
        let color = self.shade_quad(kind);
        self.emit_fragment(color, 0.5);
    }

    fn begin_query(&mut self, query: HeadlessQuery) {
        self.active_query = Some(query);
        self.samples = 0;
    }

    fn end_query(&mut self, _query: HeadlessQuery) -> u64 {
        self.active_query = None;
        self.queries_finished += 1;
        let samples = match self.zero_samples_at {
            Some(k) if self.queries_finished >= k => 0,
            Some(_) => self.samples.max(1),
            None => self.samples,
        };
        self.commands.push(Command::Query { samples });
        samples
    }

    /// Copies the probe depth. Leaves `dst` bound.
    fn blit_depth(&mut self, src: Target, dst: Target, _rect: Rect) {
        self.commands.push(Command::BlitDepth { src, dst });
        self.bound_framebuffer = src;
        let depth = self.read_depth();
        self.bound_framebuffer = dst;
        match self.attachments() {
            (_, Some(tex)) => {
                if let Some(t) = self.textures.get_mut(&tex) {
                    t.probe[0] = depth;
                }
            }
            _ if dst.is_none() => self.default_depth = depth,
            _ => {}
        }
    }

    fn state(&mut self) -> GpuState {
        GpuState {
            render: self.render_state(),
            blend_func: self.blend_func,
            viewport: self.viewport,
            scissor: self.scissor,
            clear_color: self.clear_color,
            clear_depth: self.clear_depth,
            active_texture: self.active_texture,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shaders::Uniform;

    fn setup() -> (HeadlessBackend, HeadlessProgram) {
        let mut b = HeadlessBackend::new().with_probe(1, 2);
        let (vs, fs) = ProgramKind::FrontInit.sources();
        let p = b.compile_program(ProgramKind::FrontInit, &vs, &fs).unwrap();
        b.use_program(Some(p));
        b.set_viewport(Rect::new(0, 0, 4, 4));
        for (u, v) in [
            (Uniform::Model, UniformValue::Mat4(Mat4::IDENTITY)),
            (Uniform::View, UniformValue::Mat4(Mat4::IDENTITY)),
            (Uniform::Projection, UniformValue::Mat4(Mat4::IDENTITY)),
            (Uniform::Diffuse, UniformValue::Vec4([1.0; 4])),
            (Uniform::Opacity, UniformValue::Float(1.0)),
            (Uniform::OutputMode, UniformValue::Int(output_mode::STRAIGHT)),
        ] {
            let loc = b.uniform_location(p, u.name()).unwrap();
            b.set_uniform(&loc, v);
        }
        (b, p)
    }

    #[test]
    fn uniform_locations_follow_declarations() {
        let (mut b, p) = setup();
        assert!(b.uniform_location(p, "u_output_mode").is_some());
        assert!(b.uniform_location(p, "u_clip_plane[2]").is_some());
        assert!(b.uniform_location(p, "u_peel_depth").is_none());
    }

    #[test]
    fn inactive_branches_are_dropped() {
        let src = "#define PEEL\n#ifdef PEEL\nuniform a;\n#else\nuniform b;\n#endif\n\
                   #ifdef OUTLINE\nuniform c;\n#endif\nmain";
        let active = active_lines(src);
        assert!(active.contains("uniform a"));
        assert!(!active.contains("uniform b"));
        assert!(!active.contains("uniform c"));
        assert!(active.contains("main"));
    }

    #[test]
    fn depth_test_keeps_nearest_fragment() {
        let (mut b, _) = setup();
        b.set_depth_test(true);
        b.draw_renderable(&Renderable::quad(0.2, [1.0, 0.0, 0.0, 1.0]), Primitive::Triangles);
        b.draw_renderable(&Renderable::quad(0.6, [0.0, 1.0, 0.0, 1.0]), Primitive::Triangles);
        let px = b.pixel();
        for (got, want) in px.iter().zip([1.0, 0.0, 0.0, 1.0]) {
            assert!((got - want).abs() < 1e-5, "{px:?}");
        }
        assert!((b.depth() - 0.6).abs() < 1e-5);
    }

    #[test]
    fn scissor_masks_clears() {
        let (mut b, _) = setup();
        b.set_scissor(Rect::new(2, 2, 2, 2));
        b.set_scissor_test(true);
        b.clear(Some([1.0; 4]), None);
        assert_eq!(b.pixel(), [0.0, 0.0, 0.0, 1.0]);
        b.set_scissor_test(false);
        b.clear(Some([1.0; 4]), None);
        assert_eq!(b.pixel(), [1.0; 4]);
    }

    #[test]
    fn scripted_queries() {
        let mut b = HeadlessBackend::new().with_zero_samples_at(2);
        let q = b.create_query().unwrap();
        b.begin_query(q);
        assert_eq!(b.end_query(q), 1);
        b.begin_query(q);
        assert_eq!(b.end_query(q), 0);
    }

    #[test]
    fn command_log_lasts_until_cleared() {
        let mut b = HeadlessBackend::new().with_zero_samples_at(2);
        let q = b.create_query().unwrap();
        for _ in 0..3 {
            b.clear(Some([0.0; 4]), None);
        }
        b.begin_query(q);
        b.end_query(q);
        b.begin_query(q);
        assert_eq!(b.end_query(q), 0);
        assert_eq!(b.commands().len(), 5);

        b.clear_commands();
        assert!(b.commands().is_empty());
        // Scripting counts from the clear again.
        b.begin_query(q);
        assert_eq!(b.end_query(q), 1);
        assert_eq!(b.commands(), [Command::Query { samples: 1 }]);
    }

    #[test]
    fn peel_discards_within_one_depth_step() {
        let mut b = HeadlessBackend::new();
        let (vs, fs) = ProgramKind::FrontPeel.sources();
        let p = b.compile_program(ProgramKind::FrontPeel, &vs, &fs).unwrap();
        b.use_program(Some(p));
        for (u, v) in [
            (Uniform::Diffuse, UniformValue::Vec4([1.0; 4])),
            (Uniform::Opacity, UniformValue::Float(1.0)),
            (Uniform::PeelDepth, UniformValue::Int(0)),
        ] {
            let loc = b.uniform_location(p, u.name()).unwrap();
            b.set_uniform(&loc, v);
        }
        let nearer = b
            .create_texture(&TextureDesc {
                format: TextureFormat::Depth24Stencil8,
                size: [4, 4],
                pixels: None,
            })
            .unwrap();
        b.bind_texture(0, Some(nearer));

        let mut shade_behind = |stored: f32| {
            b.textures.get_mut(&nearer).unwrap().probe[0] = stored;
            b.shade_geometry(ProgramKind::FrontPeel, [1.0; 4], 0.5)
        };
        assert!(shade_behind(0.5).is_none());
        assert!(shade_behind(0.5 - PEEL_DEPTH_EPSILON * 0.5).is_none());
        assert!(shade_behind(0.5 - PEEL_DEPTH_EPSILON * 4.0).is_some());
    }

    #[test]
    fn framebuffer_needs_matching_formats() {
        let mut b = HeadlessBackend::new();
        let depth = b
            .create_texture(&TextureDesc {
                format: TextureFormat::Depth24Stencil8,
                size: [4, 4],
                pixels: None,
            })
            .unwrap();
        assert!(b.create_framebuffer(Some(depth), None).is_err());
        assert!(b.create_framebuffer(None, Some(depth)).is_ok());
    }
}
