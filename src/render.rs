//! The compositor: owns the off-screen targets and programs, consumes a
//! render queue and a camera, and issues passes to a [`Backend`].

use glam::Mat4;
use log::{debug, error, trace, warn};

use crate::backend::{Backend, Primitive, TextureDesc, TextureFormat};
use crate::classify::{self, DrawParams};
use crate::error::{Error, Result};
use crate::framebuffers::{FrameTargets, FramebufferSet, FrontBuffers, RenderTarget};
use crate::matrices::MatrixBroadcast;
use crate::programs::{GlslProgramSet, LinkedProgram};
use crate::settings::{RenderingMode, VividSettings};
use crate::shaders::{output_mode, ProgramKind, Uniform, UNIT_SOURCE, UNIT_STENCIL};
use crate::state::{BlendFunc, CullFace, RenderState, StateCache};
use crate::types::{BackgroundCalibration, Camera, Rect, RenderToken, UniformValue};

/// Peeling stops here even if occlusion queries keep reporting samples.
pub const MAX_QUERY_LAYERS: u32 = 256;

/// Clear value of the blender: no color, full transmittance.
const BLENDER_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// What a [`render`](VividRenderer::render) call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Passes issued: stencil, init, each peel and blend, background,
    /// final and each 2D outline.
    pub passes: u32,
    /// Peel iterations, not counting the init pass.
    pub peel_layers: u32,
    /// Tokens classified as translucent.
    pub translucent_actors: usize,
    /// The peeling loop was skipped because nothing was translucent.
    pub throttled: bool,
    /// An occlusion query ended the loop.
    pub early_exit: bool,
}

/// Per-call context shared by the passes.
struct Frame<'c> {
    camera: &'c Camera,
    /// Camera viewport, also used as the scissor rectangle.
    rect: Rect,
    scissor: bool,
    stats: FrameStats,
}

struct BackgroundImage<B: Backend> {
    size: [u32; 2],
    /// RGBA8, top row first.
    pixels: Vec<u8>,
    /// Uploaded on first use.
    texture: Option<B::Texture>,
}

/// Order-independent transparency compositor.
///
/// Each [`render`](Self::render) call peels the queue front to back into an
/// off-screen *blender*, resolves it onto the visible framebuffer and puts
/// back the depth of the nearest surfaces. Resources are created lazily on the
/// first call and grow with the target; they are never shrunk.
///
/// Failures never reach the caller: if a required program does not link,
/// every call returns `None` without drawing; if buffers cannot be
/// allocated, the frame is skipped and allocation is retried next time.
///
/// # Example
///
/// ```
/// use vivid_renderer::{
///     Actor, Camera, HeadlessBackend, RenderToken, Renderable, Shader, VividRenderer,
///     VividSettings,
/// };
///
/// let mut renderer = VividRenderer::new(HeadlessBackend::new(), VividSettings::default());
///
/// let actor = Actor::new(1);
/// let shader = Shader::default();
/// let quad = Renderable::quad(0.0, [1.0, 0.0, 0.0, 0.5]);
/// let queue = [RenderToken { actor: &actor, shader: &shader, renderable: &quad }];
///
/// let stats = renderer.render(&queue, &Camera::new(640, 480), 0.0);
/// assert_eq!(stats.map(|s| s.translucent_actors), Some(1));
/// ```
pub struct VividRenderer<B: Backend> {
    backend: B,
    settings: VividSettings,
    programs: GlslProgramSet<B>,
    framebuffers: FramebufferSet<B>,
    /// Created on first initialization, `None` if unsupported.
    query: Option<B::Query>,
    state: StateCache,
    background: Option<BackgroundImage<B>>,
}

impl<B: Backend> VividRenderer<B> {
    /// Create a renderer. No backend object is created until the first
    /// [`render`](Self::render).
    pub fn new(backend: B, settings: VividSettings) -> Self {
        Self {
            backend,
            settings: settings.sanitized(),
            programs: GlslProgramSet::default(),
            framebuffers: FramebufferSet::default(),
            query: None,
            state: StateCache::default(),
            background: None,
        }
    }

    /// Settings in effect, after sanitizing.
    #[must_use]
    pub fn settings(&self) -> &VividSettings {
        &self.settings
    }

    /// Replace the settings; they apply from the next frame.
    pub fn set_settings(&mut self, settings: VividSettings) {
        self.settings = settings.sanitized();
    }

    /// The backend the renderer draws with.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend, e.g. to draw the opaque scene
    /// between frames. Any state change is picked up by the next frame.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Whether the programs every path needs linked. `false` before the
    /// first frame.
    #[must_use]
    pub fn shaders_ready(&self) -> bool {
        self.programs.shaders_ready()
    }

    /// Install an RGBA8 background image, top row first.
    ///
    /// # Errors
    ///
    /// Fails if `pixels` does not hold exactly `width * height` texels.
    pub fn set_background_image(&mut self, width: u32, height: u32, pixels: Vec<u8>) -> Result<()> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        if width == 0 || height == 0 || expected != Some(pixels.len()) {
            return Err(Error::creation(
                "background image",
                format!("{} bytes for a {width}x{height} RGBA image", pixels.len()),
            ));
        }
        self.clear_background_image();
        self.background = Some(BackgroundImage {
            size: [width, height],
            pixels,
            texture: None,
        });
        Ok(())
    }

    /// Decode a PNG or JPEG and install it as the background image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImageDecode`] if the bytes cannot be decoded.
    pub fn set_background_image_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        self.set_background_image(width, height, image.into_raw())
    }

    /// Remove the background image and its texture.
    pub fn clear_background_image(&mut self) {
        if let Some(texture) = self.background.take().and_then(|b| b.texture) {
            self.backend.delete_texture(texture);
        }
    }

    /// Delete the off-screen targets. They are reallocated by the next
    /// frame. Safe to call repeatedly.
    pub fn delete_gl_buffers(&mut self) {
        self.framebuffers.delete_gl_buffers(&mut self.backend);
    }

    /// Delete every backend object the renderer owns. Programs are not
    /// rebuilt afterwards, so later frames are skipped. Runs on drop.
    pub fn release_resources(&mut self) {
        self.delete_gl_buffers();
        self.programs.delete(&mut self.backend);
        if let Some(query) = self.query.take() {
            self.backend.delete_query(query);
        }
        if let Some(texture) = self.background.as_mut().and_then(|b| b.texture.take()) {
            self.backend.delete_texture(texture);
        }
    }

    /// Composite `queue` onto the visible framebuffer.
    ///
    /// Returns `None` when nothing was drawn: zero-area target, programs
    /// unavailable or buffers not allocatable. Backend state the passes
    /// change is restored before returning. `frame_clock` is the host's
    /// frame time in seconds, used for logging only.
    pub fn render(
        &mut self,
        queue: &[RenderToken<'_>],
        camera: &Camera,
        frame_clock: f64,
    ) -> Option<FrameStats> {
        let [width, height] = camera.target_size;
        if width == 0 || height == 0 {
            trace!("zero-area target, frame skipped");
            return None;
        }
        if !self.lazy_initialize(camera.target_size) {
            return None;
        }
        let targets = self.framebuffers.targets()?;
        trace!(
            "frame at {frame_clock:.3}s: {} tokens, {:?}",
            queue.len(),
            self.settings.rendering_mode
        );

        let params = resolve_params(queue);
        let saved = self.backend.state();
        self.state.assume(saved.render, saved.blend_func);

        let mut frame = Frame {
            camera,
            rect: camera.viewport.rect,
            scissor: camera.viewport.scissor_enabled,
            stats: FrameStats::default(),
        };
        self.backend.set_viewport(frame.rect);
        self.backend.set_scissor(frame.rect);
        self.upload_camera(camera);

        match self.settings.rendering_mode {
            RenderingMode::FastRender => self.render_fast(queue, &params, &targets, &mut frame),
            RenderingMode::StencilRender => {
                if self.settings.stencil_enabled {
                    self.render_stencil(queue, &params, &targets, &mut frame);
                }
                self.init_pass(queue, &params, &targets, &mut frame);
                self.finalize(queue, &params, &targets, &mut frame);
            }
            RenderingMode::DepthPeeling => {
                if self.settings.stencil_enabled {
                    self.render_stencil(queue, &params, &targets, &mut frame);
                }
                self.init_pass(queue, &params, &targets, &mut frame);
                self.peel_loop(queue, &params, &targets, &mut frame);
                self.finalize(queue, &params, &targets, &mut frame);
            }
        }

        self.backend.bind_texture(UNIT_SOURCE, None);
        self.backend.bind_texture(UNIT_STENCIL, None);
        self.backend.use_program(None);
        self.backend.bind_framebuffer(None);
        self.state.restore(&mut self.backend, &saved);

        trace!("frame done: {:?}", frame.stats);
        Some(frame.stats)
    }

    /// Create the query and programs once, then make sure the buffers cover
    /// `target_size`. Returns whether the frame can be drawn.
    fn lazy_initialize(&mut self, target_size: [u32; 2]) -> bool {
        if !self.programs.is_built() {
            match self.backend.create_query() {
                Ok(query) => self.query = Some(query),
                Err(e) => warn!("{e}; peeling is bounded by depth_peeling_passes only"),
            }
            let failed = self.programs.build(&mut self.backend);
            if failed > 0 && !self.programs.shaders_ready() {
                error!("required programs failed to link, compositing disabled");
            }
        }
        if !self.programs.shaders_ready() {
            trace!("shaders not ready, frame skipped");
            return false;
        }
        match self.framebuffers.ensure_size(&mut self.backend, target_size) {
            Ok(reallocated) => {
                if reallocated {
                    let [w, h] = self.framebuffers.size();
                    debug!("compositing at {w}x{h}");
                }
                true
            }
            Err(e) => {
                error!("compositing buffers unavailable, frame skipped: {e}");
                false
            }
        }
    }

    /// Camera matrices go to every geometry program once per frame; draws
    /// only update the model matrix.
    fn upload_camera(&mut self, camera: &Camera) {
        for kind in ProgramKind::ALL.into_iter().filter(|k| k.is_geometry()) {
            self.backend
                .update_matrices(true, false, self.programs.get(kind), camera, &Mat4::IDENTITY);
        }
    }

    /// Forward rendering straight into the visible framebuffer.
    fn render_fast(
        &mut self,
        queue: &[RenderToken<'_>],
        params: &[DrawParams],
        targets: &FrameTargets<B>,
        frame: &mut Frame<'_>,
    ) {
        self.backend.bind_framebuffer(None);
        self.clear_visible(frame, frame.scissor);

        for (token, params) in queue.iter().zip(params) {
            let translucent = classify::is_translucent_with(token, params);
            if translucent {
                frame.stats.translucent_actors += 1;
            }
            let enables = token.shader.enables;
            let state = RenderState {
                depth_test: enables.depth_test,
                depth_write: true,
                blend: (enables.blend || translucent).then_some(BlendFunc::ALPHA),
                cull_face: enables.cull_face.then_some(CullFace::Back),
                scissor_test: frame.scissor,
            };
            self.state.apply(&mut self.backend, state);
            self.draw_geometry(
                token,
                params,
                [ProgramKind::FrontInit, ProgramKind::FrontInitOutline],
                output_mode::STRAIGHT,
                frame,
            );
        }
        frame.stats.passes += 1;

        self.outline_pass(queue, params, targets, frame);
    }

    /// Draw every stencil actor white into a black mask.
    fn render_stencil(
        &mut self,
        queue: &[RenderToken<'_>],
        params: &[DrawParams],
        targets: &FrameTargets<B>,
        frame: &mut Frame<'_>,
    ) {
        self.backend.bind_framebuffer(Some(targets.stencil.framebuffer));
        self.state.apply(&mut self.backend, RenderState::mask(false));
        self.backend.clear(Some([0.0, 0.0, 0.0, 1.0]), None);
        self.state.apply(&mut self.backend, RenderState::mask(frame.scissor));

        for (token, params) in queue.iter().zip(params) {
            if token.actor.is_stencil {
                self.draw_token(ProgramKind::FrontInit, token, params, output_mode::MASK, frame);
            }
        }
        frame.stats.passes += 1;
    }

    /// Nearest layer of everything into the blender, then save its depth.
    fn init_pass(
        &mut self,
        queue: &[RenderToken<'_>],
        params: &[DrawParams],
        targets: &FrameTargets<B>,
        frame: &mut Frame<'_>,
    ) {
        let blender = targets.blender;
        self.backend.bind_framebuffer(Some(blender.framebuffer));
        let base = RenderState::geometry(frame.scissor);
        self.state.apply(&mut self.backend, base);
        self.backend.clear(Some(BLENDER_CLEAR), Some(1.0));

        for (token, params) in queue.iter().zip(params) {
            if classify::is_translucent_with(token, params) {
                frame.stats.translucent_actors += 1;
            }
            if params.is_peeled() {
                self.apply_geometry_state(token, base);
                self.draw_geometry(
                    token,
                    params,
                    [ProgramKind::FrontInit, ProgramKind::FrontInitOutline],
                    output_mode::LAYER,
                    frame,
                );
            }
        }

        self.backend.blit_depth(
            Some(blender.framebuffer),
            Some(targets.depth_save.framebuffer),
            frame.rect,
        );
        frame.stats.passes += 1;
    }

    /// Peel layers behind the init layer and composite each under the
    /// blender until the layer bound or an empty layer.
    fn peel_loop(
        &mut self,
        queue: &[RenderToken<'_>],
        params: &[DrawParams],
        targets: &FrameTargets<B>,
        frame: &mut Frame<'_>,
    ) {
        if self.settings.depth_peeling_auto_throttle && frame.stats.translucent_actors == 0 {
            trace!("nothing translucent, peeling skipped");
            frame.stats.throttled = true;
            return;
        }

        let num_layers = self.settings.max_layers();
        let query = self.query.filter(|_| self.settings.use_query_object);
        let base = RenderState::geometry(frame.scissor);
        let mut fronts = FrontBuffers::for_layer(1);
        let mut layer = 1;

        while query.is_some() || layer < num_layers {
            if query.is_some() && layer > MAX_QUERY_LAYERS {
                warn!(
                    "occlusion query never reported an empty layer, stopping at {MAX_QUERY_LAYERS}"
                );
                break;
            }
            let current = targets.front[fronts.current()];
            let previous = targets.front[fronts.previous()];

            self.backend.bind_framebuffer(Some(current.framebuffer));
            self.state.apply(&mut self.backend, base);
            self.backend.clear(Some([0.0; 4]), Some(1.0));
            self.backend.bind_texture(UNIT_SOURCE, previous.depth);

            if let Some(q) = query {
                self.backend.begin_query(q);
            }
            for (token, params) in queue.iter().zip(params) {
                if params.is_peeled() {
                    self.apply_geometry_state(token, base);
                    self.draw_geometry(
                        token,
                        params,
                        [ProgramKind::FrontPeel, ProgramKind::FrontPeelOutline],
                        output_mode::LAYER,
                        frame,
                    );
                }
            }
            frame.stats.peel_layers += 1;
            frame.stats.passes += 1;

            if let Some(q) = query {
                let samples = self.backend.end_query(q);
                trace!("layer {layer}: {samples} samples");
                if samples == 0 {
                    frame.stats.early_exit = true;
                    break;
                }
            }

            self.blend_layer(current, targets.blender, frame);
            fronts.swap();
            layer += 1;
        }
    }

    /// Composite one peeled layer under the blender.
    fn blend_layer(
        &mut self,
        layer: RenderTarget<B>,
        blender: RenderTarget<B>,
        frame: &mut Frame<'_>,
    ) {
        let Some(program) = self.programs.get(ProgramKind::FrontBlend) else {
            return;
        };
        self.backend.bind_framebuffer(Some(blender.framebuffer));
        self.state
            .apply(&mut self.backend, RenderState::composite(BlendFunc::UNDER, frame.scissor));
        self.backend.use_program(Some(program.handle));
        program.set(&mut self.backend, Uniform::Source, sampler(UNIT_SOURCE));
        program.set(&mut self.backend, Uniform::Normalized, UniformValue::Int(0));
        self.backend.bind_texture(UNIT_SOURCE, layer.color);
        self.backend.draw_fullscreen_quad();
        frame.stats.passes += 1;
    }

    /// Resolve the blender onto the visible framebuffer, draw 2D outlines and
    /// put back the init depth.
    fn finalize(
        &mut self,
        queue: &[RenderToken<'_>],
        params: &[DrawParams],
        targets: &FrameTargets<B>,
        frame: &mut Frame<'_>,
    ) {
        self.backend.bind_framebuffer(None);
        self.clear_visible(frame, false);
        let background = self.draw_background(frame);

        if let Some(program) = self.programs.get(ProgramKind::FrontFinal) {
            let settings = &self.settings;
            self.state
                .apply(&mut self.backend, RenderState::composite(BlendFunc::ALPHA, frame.scissor));
            self.backend.use_program(Some(program.handle));
            let uniforms = [
                (Uniform::Source, sampler(UNIT_SOURCE)),
                (Uniform::Stencil, sampler(UNIT_STENCIL)),
                (
                    Uniform::StencilEnabled,
                    UniformValue::Int(i32::from(settings.stencil_enabled)),
                ),
                (
                    Uniform::StencilSmoothness,
                    UniformValue::Float(settings.stencil_smoothness),
                ),
                (
                    Uniform::StencilBackground,
                    UniformValue::Vec4(settings.stencil_background),
                ),
                (Uniform::BackgroundEnabled, UniformValue::Int(i32::from(background))),
            ];
            for (uniform, value) in uniforms {
                program.set(&mut self.backend, uniform, value);
            }
            self.backend.bind_texture(UNIT_SOURCE, targets.blender.color);
            self.backend.bind_texture(UNIT_STENCIL, targets.stencil.color);
            self.backend.draw_fullscreen_quad();
            self.backend.bind_texture(UNIT_STENCIL, None);
            frame.stats.passes += 1;
        }

        self.outline_pass(queue, params, targets, frame);

        self.backend
            .blit_depth(Some(targets.depth_save.framebuffer), None, frame.rect);
    }

    /// Clear the bound framebuffer with the camera's clear values.
    fn clear_visible(&mut self, frame: &Frame<'_>, scissor_test: bool) {
        let viewport = frame.camera.viewport;
        let flags = viewport.clear_flags;
        // Depth writes gate depth clears.
        let state = RenderState {
            depth_write: true,
            ..RenderState::mask(scissor_test)
        };
        self.state.apply(&mut self.backend, state);
        self.backend.clear(
            flags.color.then_some(viewport.clear_color),
            flags.depth.then_some(viewport.clear_depth),
        );
    }

    /// Letterboxed background image. Returns whether one was drawn.
    fn draw_background(&mut self, frame: &mut Frame<'_>) -> bool {
        if !self.settings.background_image_enabled {
            return false;
        }
        let Some((texture, size)) = self.background_texture() else {
            return false;
        };
        let Some(program) = self.programs.get(ProgramKind::FrontBlend) else {
            return false;
        };

        let rect = letterbox(frame.rect, size, &frame.camera.calibration);
        self.backend.set_viewport(rect);
        self.state
            .apply(&mut self.backend, RenderState::mask(frame.scissor));
        self.backend.use_program(Some(program.handle));
        program.set(&mut self.backend, Uniform::Source, sampler(UNIT_SOURCE));
        program.set(&mut self.backend, Uniform::Normalized, UniformValue::Int(1));
        self.backend.bind_texture(UNIT_SOURCE, Some(texture));
        self.backend.draw_fullscreen_quad();
        self.backend.set_viewport(frame.rect);
        frame.stats.passes += 1;
        true
    }

    /// The background texture and its size, uploading it if needed.
    fn background_texture(&mut self) -> Option<(B::Texture, [u32; 2])> {
        let image = self.background.as_mut()?;
        if image.texture.is_none() {
            let desc = TextureDesc {
                format: TextureFormat::Rgba8,
                size: image.size,
                pixels: Some(&image.pixels),
            };
            match self.backend.create_texture(&desc) {
                Ok(texture) => {
                    debug!("uploaded {}x{} background image", image.size[0], image.size[1]);
                    image.texture = Some(texture);
                }
                Err(e) => error!("background image upload failed: {e}"),
            }
        }
        image.texture.map(|t| (t, image.size))
    }

    /// Image-space silhouettes of the tokens asking for them, drawn over the
    /// visible framebuffer.
    fn outline_pass(
        &mut self,
        queue: &[RenderToken<'_>],
        params: &[DrawParams],
        targets: &FrameTargets<B>,
        frame: &mut Frame<'_>,
    ) {
        for (token, params) in queue.iter().zip(params) {
            if !params.render_mode.draws_image_outline() {
                continue;
            }
            if self.programs.get(ProgramKind::Outline2D).is_none() {
                trace!("no outline program, 2D outlines skipped");
                return;
            }

            // Mask: white outside the viewport, black inside, shape white.
            let stencil = targets.stencil;
            self.backend.bind_framebuffer(Some(stencil.framebuffer));
            self.state.apply(&mut self.backend, RenderState::mask(false));
            self.backend.clear(Some([1.0; 4]), None);
            self.state.apply(&mut self.backend, RenderState::mask(true));
            self.backend.clear(Some([0.0, 0.0, 0.0, 1.0]), None);
            self.draw_token(ProgramKind::FrontInit, token, params, output_mode::MASK, frame);

            let Some(program) = self.programs.get(ProgramKind::Outline2D) else {
                return;
            };
            self.backend.bind_framebuffer(None);
            self.state
                .apply(&mut self.backend, RenderState::composite(BlendFunc::ALPHA, frame.scissor));
            self.backend.use_program(Some(program.handle));
            program.set(&mut self.backend, Uniform::Source, sampler(UNIT_SOURCE));
            let outline = [
                (Uniform::OutlineColor, UniformValue::Vec4(params.outline_color)),
                (Uniform::OutlineWidth, UniformValue::Float(params.outline_width)),
            ];
            for (uniform, value) in outline {
                program.set(&mut self.backend, uniform, value);
            }
            self.backend.bind_texture(UNIT_SOURCE, stencil.color);
            self.backend.draw_fullscreen_quad();
            frame.stats.passes += 1;
        }
    }

    fn apply_geometry_state(&mut self, token: &RenderToken<'_>, base: RenderState) {
        let state = RenderState {
            cull_face: token.shader.enables.cull_face.then_some(CullFace::Back),
            ..base
        };
        self.state.apply(&mut self.backend, state);
    }

    /// Draw the polygons and/or 3D outline of a token, as its render mode
    /// asks, with `[polygons, outline]` programs.
    fn draw_geometry(
        &mut self,
        token: &RenderToken<'_>,
        params: &DrawParams,
        [polygons, outline]: [ProgramKind; 2],
        output: i32,
        frame: &Frame<'_>,
    ) {
        if params.render_mode.draws_polygons() {
            self.draw_token(polygons, token, params, output, frame);
        }
        if params.render_mode.draws_outline_geometry() {
            self.draw_token(outline, token, params, output, frame);
        }
    }

    /// One geometry draw with `kind`, under whatever state is applied.
    fn draw_token(
        &mut self,
        kind: ProgramKind,
        token: &RenderToken<'_>,
        params: &DrawParams,
        output: i32,
        frame: &Frame<'_>,
    ) {
        let Self {
            backend,
            programs,
            settings,
            ..
        } = self;
        let Some(program) = programs.get(kind) else {
            trace!("{kind:?} unavailable, draw skipped");
            return;
        };

        backend.update_matrices(false, true, Some(program), frame.camera, &token.actor.transform);
        upload_draw_params(backend, program, params, settings.opacity);
        if kind.is_peel() {
            program.set(backend, Uniform::PeelDepth, sampler(UNIT_SOURCE));
        } else {
            program.set(backend, Uniform::OutputMode, UniformValue::Int(output));
        }

        let primitive = if kind.is_outline_geometry() {
            Primitive::Wireframe {
                line_width: params.outline_width,
            }
        } else {
            Primitive::Triangles
        };
        backend.draw_renderable(token.renderable, primitive);
    }
}

impl<B: Backend> Drop for VividRenderer<B> {
    fn drop(&mut self) {
        self.release_resources();
    }
}

/// Per-token draw parameters, indexed like `queue`. Resolved once per frame
/// so the passes never go back to the string-keyed uniform sets.
fn resolve_params(queue: &[RenderToken<'_>]) -> Vec<DrawParams> {
    queue.iter().map(|t| DrawParams::from_shader(t.shader)).collect()
}

/// Push the per-draw uniforms of `params` to the bound `program`.
fn upload_draw_params<B: Backend>(
    backend: &mut B,
    program: &LinkedProgram<B>,
    params: &DrawParams,
    opacity: f32,
) {
    program.set(backend, Uniform::Diffuse, UniformValue::Vec4(params.diffuse));
    program.set(backend, Uniform::Opacity, UniformValue::Float(opacity));
    program.set(backend, Uniform::Lighting, UniformValue::Int(i32::from(params.lighting)));
    program.set(backend, Uniform::OutlineColor, UniformValue::Vec4(params.outline_color));

    match params.fog {
        Some(fog) => {
            program.set(backend, Uniform::FogEnabled, UniformValue::Int(1));
            program.set(backend, Uniform::FogTarget, UniformValue::Int(fog.target.as_i32()));
            program.set(backend, Uniform::FogColor, UniformValue::Vec4(fog.color));
            program.set(backend, Uniform::FogRange, UniformValue::Vec2(fog.range));
        }
        None => program.set(backend, Uniform::FogEnabled, UniformValue::Int(0)),
    }

    let mut targets = [-1; 4];
    let mut fades = [0.0; 4];
    for (i, clip) in params.smart_clips.iter().enumerate() {
        let Some(clip) = clip else { continue };
        targets[i] = clip.target.as_i32();
        fades[i] = clip.fade;
        program.set(backend, Uniform::CLIP_PLANES[i], UniformValue::Vec4(clip.plane));
        program.set(backend, Uniform::CLIP_COLORS[i], UniformValue::Vec4(clip.color));
    }
    program.set(backend, Uniform::ClipTarget, UniformValue::IVec4(targets));
    program.set(backend, Uniform::ClipFade, UniformValue::Vec4(fades));
}

/// Sampler uniform value for a texture unit.
fn sampler(unit: u32) -> UniformValue {
    UniformValue::Int(i32::try_from(unit).unwrap_or(0))
}

/// Largest rectangle with the image's aspect ratio centered in `viewport`.
///
/// The image aspect is that of `calibration.calibrated_image_size` (falling
/// back to `image_size`) scaled by the pixel aspect ratio.
#[must_use]
#[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn letterbox(
    viewport: Rect,
    image_size: [u32; 2],
    calibration: &BackgroundCalibration,
) -> Rect {
    let [iw, ih] = calibration.calibrated_image_size.unwrap_or(image_size);
    if iw == 0 || ih == 0 || viewport.width <= 0 || viewport.height <= 0 {
        return viewport;
    }
    let image_aspect = iw as f32 * calibration.pixel_aspect_ratio / ih as f32;
    if !image_aspect.is_finite() || image_aspect <= 0.0 {
        return viewport;
    }

    let (vw, vh) = (viewport.width as f32, viewport.height as f32);
    if image_aspect > vw / vh {
        let height = (vw / image_aspect).round() as i32;
        Rect::new(
            viewport.x,
            viewport.y + (viewport.height - height) / 2,
            viewport.width,
            height,
        )
    } else {
        let width = (vh * image_aspect).round() as i32;
        Rect::new(
            viewport.x + (viewport.width - width) / 2,
            viewport.y,
            width,
            viewport.height,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::headless::{Command, HeadlessBackend};
    use crate::conventions;
    use crate::types::{Actor, Renderable, Shader};

    /// Probe pixel, away from the quads' diagonal seam on an 8x8 target.
    const PROBE: (i32, i32) = (2, 5);

    fn renderer(settings: VividSettings) -> VividRenderer<HeadlessBackend> {
        VividRenderer::new(HeadlessBackend::new().with_probe(PROBE.0, PROBE.1), settings)
    }

    fn material(color: [f32; 4]) -> Shader {
        let mut shader = Shader::default();
        shader
            .uniforms
            .set(conventions::MATERIAL_DIFFUSE, UniformValue::Vec4(color));
        shader
    }

    fn token<'a>(
        actor: &'a Actor,
        shader: &'a Shader,
        renderable: &'a Renderable,
    ) -> RenderToken<'a> {
        RenderToken {
            actor,
            shader,
            renderable,
        }
    }

    fn no_queries(passes: u32) -> VividSettings {
        VividSettings {
            depth_peeling_passes: passes,
            use_query_object: false,
            ..Default::default()
        }
    }

    fn assert_rgb(actual: [f32; 4], expected: [f32; 3]) {
        for i in 0..3 {
            assert!(
                (actual[i] - expected[i]).abs() < 1e-4,
                "expected {expected:?}, got {actual:?}",
            );
        }
    }

    /// Opaque blue quad at z = 0.6 behind a half-transparent red one at
    /// z = 0.2 (window depths 0.8 and 0.6).
    struct Scene {
        actor: Actor,
        solid: Shader,
        glass: Shader,
        back: Renderable,
        front: Renderable,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                actor: Actor::new(1),
                solid: material([0.0, 0.0, 1.0, 1.0]),
                glass: material([1.0, 0.0, 0.0, 0.5]),
                back: Renderable::quad(0.6, [1.0; 4]),
                front: Renderable::quad(0.2, [1.0; 4]),
            }
        }

        fn queue(&self) -> [RenderToken<'_>; 2] {
            [
                token(&self.actor, &self.solid, &self.back),
                token(&self.actor, &self.glass, &self.front),
            ]
        }
    }

    #[test]
    fn same_size_allocates_once() {
        let scene = Scene::new();
        let mut r = renderer(VividSettings::default());
        let camera = Camera::new(8, 8);
        r.render(&scene.queue(), &camera, 0.0).unwrap();
        let first = r.backend().counts();
        assert_eq!(first.textures_created, 7);
        assert_eq!(first.framebuffers_created, 5);
        assert_eq!(first.programs_created, 7);
        assert_eq!(first.queries_created, 1);

        r.render(&scene.queue(), &camera, 0.016).unwrap();
        assert_eq!(r.backend().counts(), first);
    }

    #[test]
    fn buffers_only_grow() {
        let mut r = renderer(VividSettings::default());
        r.render(&[], &Camera::new(4, 4), 0.0).unwrap();
        r.render(&[], &Camera::new(8, 8), 0.0).unwrap();
        let grown = r.backend().counts();
        assert_eq!(grown.textures_created, 14);
        assert_eq!(grown.textures_deleted, 7);

        r.render(&[], &Camera::new(6, 6), 0.0).unwrap();
        assert_eq!(r.backend().counts(), grown);
        assert_eq!(grown.programs_created, 7, "programs survive resizes");
    }

    #[test]
    fn peel_bound_without_queries() {
        let scene = Scene::new();
        let queue = [token(&scene.actor, &scene.glass, &scene.front)];
        for (passes, iterations) in [(1, 0), (2, 1), (4, 5)] {
            let mut r = renderer(no_queries(passes));
            let stats = r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
            assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), iterations, "P = {passes}");
            assert_eq!(r.backend().quads_with(ProgramKind::FrontBlend), iterations);
            assert_eq!(stats.peel_layers as usize, iterations);
            assert!(!stats.early_exit);
        }
    }

    #[test]
    fn query_cap_does_not_bound_plain_loop() {
        let scene = Scene::new();
        let queue = [token(&scene.actor, &scene.glass, &scene.front)];
        let mut r = renderer(no_queries(200));
        let stats = r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(stats.peel_layers, 397);
        assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), 397);
        assert!(!stats.early_exit);
    }

    #[test]
    fn query_cap_stops_a_query_that_never_empties() {
        let scene = Scene::new();
        let queue = [token(&scene.actor, &scene.glass, &scene.front)];
        let backend = HeadlessBackend::new()
            .with_probe(PROBE.0, PROBE.1)
            .with_zero_samples_at(1000);
        let settings = VividSettings {
            depth_peeling_passes: 2,
            ..Default::default()
        };
        let mut r = VividRenderer::new(backend, settings);
        let stats = r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(stats.peel_layers, MAX_QUERY_LAYERS);
        assert!(!stats.early_exit);
    }

    #[test]
    fn query_ends_loop_regardless_of_bound() {
        let scene = Scene::new();
        let queue = [token(&scene.actor, &scene.glass, &scene.front)];
        for k in [1, 3, 9] {
            let backend = HeadlessBackend::new()
                .with_probe(PROBE.0, PROBE.1)
                .with_zero_samples_at(k);
            let settings = VividSettings {
                depth_peeling_passes: 2,
                ..Default::default()
            };
            let mut r = VividRenderer::new(backend, settings);
            let stats = r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
            assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), k);
            assert_eq!(r.backend().quads_with(ProgramKind::FrontBlend), k - 1);
            assert!(stats.early_exit);
        }
    }

    #[test]
    fn missing_query_support_falls_back_to_bound() {
        let scene = Scene::new();
        let queue = [token(&scene.actor, &scene.glass, &scene.front)];
        let backend = HeadlessBackend::new().with_probe(PROBE.0, PROBE.1).without_queries();
        let settings = VividSettings {
            depth_peeling_passes: 3,
            ..Default::default()
        };
        let mut r = VividRenderer::new(backend, settings);
        r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), 3);
    }

    #[test]
    fn auto_throttle_skips_loop_but_not_final() {
        let scene = Scene::new();
        let queue = [token(&scene.actor, &scene.solid, &scene.back)];

        let mut r = renderer(no_queries(4));
        let stats = r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
        assert!(stats.throttled);
        assert_eq!(stats.translucent_actors, 0);
        assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), 0);
        assert_eq!(r.backend().quads_with(ProgramKind::FrontBlend), 0);
        assert_eq!(r.backend().quads_with(ProgramKind::FrontFinal), 1);

        let mut r = renderer(VividSettings {
            depth_peeling_auto_throttle: false,
            ..no_queries(4)
        });
        let stats = r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
        assert!(!stats.throttled);
        assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), 5);
    }

    #[test]
    fn passes_use_their_state() {
        let scene = Scene::new();
        let mut r = renderer(no_queries(4));
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();

        let mut checked = 0;
        for command in r.backend().commands() {
            match command {
                Command::Quad {
                    program: Some(ProgramKind::FrontBlend),
                    state,
                    ..
                } => {
                    assert!(!state.depth_test);
                    assert_eq!(state.blend, Some(BlendFunc::UNDER));
                    checked += 1;
                }
                Command::Draw {
                    program: Some(ProgramKind::FrontInit | ProgramKind::FrontPeel),
                    state,
                    ..
                } => {
                    assert!(state.depth_test);
                    assert!(state.blend.is_none());
                    checked += 1;
                }
                _ => {}
            }
        }
        // 2 init draws, 5 layers of 2 peel draws and 1 blend.
        assert_eq!(checked, 2 + 5 * 3);
    }

    #[test]
    fn caller_state_is_restored() {
        let scene = Scene::new();
        let mut r = renderer(no_queries(4));
        {
            let b = r.backend_mut();
            b.set_depth_test(true);
            b.set_depth_write(false);
            b.set_blend(true);
            b.set_blend_func(BlendFunc::new(
                crate::state::BlendFactor::One,
                crate::state::BlendFactor::One,
            ));
            b.set_cull_face(Some(CullFace::Front));
            b.set_scissor_test(true);
            b.set_scissor(Rect::new(1, 1, 2, 2));
            b.set_viewport(Rect::new(0, 0, 3, 3));
            b.set_clear_color([0.25, 0.5, 0.75, 1.0]);
            b.set_clear_depth(0.5);
            b.set_active_texture(3);
        }
        let before = r.backend_mut().state();
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(r.backend_mut().state(), before);
    }

    #[test]
    fn texture_unit_zero_is_reselected_after_frame() {
        let scene = Scene::new();
        let mut r = renderer(no_queries(2));
        assert_eq!(r.backend_mut().state().active_texture, 0);
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(r.backend_mut().state().active_texture, 0);
    }

    #[test]
    fn depth_is_restored_from_init_pass() {
        let scene = Scene::new();
        let mut r = renderer(no_queries(4));
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        // Nearest surface is the glass at 0.6; the last layer that drew
        // anything reached the opaque quad at 0.8.
        assert!((r.backend().depth() - 0.6).abs() < 1e-4, "{}", r.backend().depth());
        let blits = r
            .backend()
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::BlitDepth { .. }))
            .count();
        assert_eq!(blits, 2);
        assert!(matches!(
            r.backend().commands().last(),
            Some(Command::BlitDepth { dst: None, .. })
        ));
    }

    #[test]
    fn translucent_over_opaque_end_to_end() {
        let scene = Scene::new();
        let queue = scene.queue();

        let (opaque, translucent) = classify::partition_queue(&queue);
        assert_eq!(opaque.len(), 1);
        assert_eq!(translucent.len(), 1);
        assert!(std::ptr::eq(translucent[0], &queue[1]));

        let mut r = renderer(no_queries(4));
        let stats = r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(stats.translucent_actors, 1);
        // Six layers: the init pass plus five peels.
        assert_eq!(stats.peel_layers + 1, 6);

        // Single-layer reference: red at 0.5 over blue.
        let reference = [0.5 * 1.0 + 0.5 * 0.0, 0.0, 0.5 * 0.0 + 0.5 * 1.0];
        assert_rgb(r.backend().pixel(), reference);
    }

    #[test]
    fn queue_order_does_not_matter() {
        let scene = Scene::new();
        let [a, b] = scene.queue();
        let mut r = renderer(no_queries(4));
        r.render(&[b, a], &Camera::new(8, 8), 0.0).unwrap();
        assert_rgb(r.backend().pixel(), [0.5, 0.0, 0.5]);
    }

    #[test]
    fn unlinked_required_program_skips_every_frame() {
        let scene = Scene::new();
        let backend = HeadlessBackend::new().with_failing_program(ProgramKind::FrontFinal);
        let mut r = VividRenderer::new(backend, VividSettings::default());
        for _ in 0..2 {
            assert!(r.render(&scene.queue(), &Camera::new(8, 8), 0.0).is_none());
        }
        assert!(!r.shaders_ready());
        assert!(r.backend().commands().is_empty());
        assert_eq!(r.backend().counts().textures_created, 0);
    }

    #[test]
    fn unlinked_outline_program_still_composites() {
        let scene = Scene::new();
        let backend = HeadlessBackend::new()
            .with_probe(PROBE.0, PROBE.1)
            .with_failing_program(ProgramKind::Outline2D);
        let mut r = VividRenderer::new(backend, no_queries(4));
        assert!(r.render(&scene.queue(), &Camera::new(8, 8), 0.0).is_some());
        assert_rgb(r.backend().pixel(), [0.5, 0.0, 0.5]);
    }

    #[test]
    fn zero_area_target_is_skipped() {
        let mut r = renderer(VividSettings::default());
        assert!(r.render(&[], &Camera::new(0, 8), 0.0).is_none());
        assert_eq!(r.backend().counts().programs_created, 0);
    }

    #[test]
    fn failed_allocation_is_retried() {
        let mut r = renderer(VividSettings::default());
        r.backend_mut().set_textures_fail(true);
        assert!(r.render(&[], &Camera::new(8, 8), 0.0).is_none());
        r.backend_mut().set_textures_fail(false);
        assert!(r.render(&[], &Camera::new(8, 8), 0.0).is_some());
        assert_eq!(r.backend().counts().programs_created, 7);
    }

    #[test]
    fn fast_render_blends_forward() {
        let scene = Scene::new();
        let mut r = renderer(VividSettings {
            rendering_mode: RenderingMode::FastRender,
            ..Default::default()
        });
        let stats = r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(stats.translucent_actors, 1);
        assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), 0);
        assert_eq!(r.backend().quads_with(ProgramKind::FrontFinal), 0);
        assert!(!r
            .backend()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::BlitDepth { .. })));
        assert_rgb(r.backend().pixel(), [0.5, 0.0, 0.5]);
    }

    #[test]
    fn stencil_render_composites_nearest_layer_only() {
        let scene = Scene::new();
        let mut r = renderer(VividSettings {
            rendering_mode: RenderingMode::StencilRender,
            ..Default::default()
        });
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(r.backend().draws_with(ProgramKind::FrontPeel), 0);
        assert_eq!(r.backend().quads_with(ProgramKind::FrontFinal), 1);
        // Half red over the black clear color.
        assert_rgb(r.backend().pixel(), [0.5, 0.0, 0.0]);
    }

    #[test]
    fn stencil_mask_selects_background_color() {
        let mut scene = Scene::new();
        let settings = VividSettings {
            stencil_enabled: true,
            stencil_background: [0.0, 1.0, 0.0, 1.0],
            ..no_queries(4)
        };

        let mut r = renderer(settings.clone());
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        assert_rgb(r.backend().pixel(), [0.0, 1.0, 0.0]);

        scene.actor.is_stencil = true;
        let mut r = renderer(settings);
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        assert_rgb(r.backend().pixel(), [0.5, 0.0, 0.5]);
    }

    #[test]
    fn background_image_uploads_lazily_and_shows_through() {
        let mut r = renderer(VividSettings {
            background_image_enabled: true,
            ..Default::default()
        });
        let green = [0, 255, 0, 255].repeat(4);
        r.set_background_image(2, 2, green).unwrap();
        assert_eq!(r.backend().counts().textures_created, 0);

        let stats = r.render(&[], &Camera::new(8, 8), 0.0).unwrap();
        assert!(stats.throttled);
        assert_eq!(r.backend().counts().textures_created, 8);
        assert_rgb(r.backend().pixel(), [0.0, 1.0, 0.0]);

        r.clear_background_image();
        assert_eq!(r.backend().counts().textures_deleted, 1);
    }

    #[test]
    fn background_image_validation() {
        let mut r = renderer(VividSettings::default());
        assert!(r.set_background_image(2, 2, vec![0; 15]).is_err());
        assert!(r.set_background_image(0, 2, Vec::new()).is_err());
        assert!(matches!(
            r.set_background_image_encoded(b"not an image"),
            Err(Error::ImageDecode(_))
        ));
    }

    #[test]
    fn outlines_draw_after_final_composite() {
        let scene = Scene::new();
        let mut outlined = material([1.0; 4]);
        outlined
            .uniforms
            .set(conventions::RENDER_MODE, UniformValue::Int(4));
        let queue = [token(&scene.actor, &outlined, &scene.back)];

        let mut r = renderer(VividSettings::default());
        r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();

        let commands = r.backend().commands();
        let position = |kind: ProgramKind| {
            commands
                .iter()
                .position(|c| matches!(c, Command::Quad { program: Some(p), .. } if *p == kind))
                .unwrap()
        };
        assert!(position(ProgramKind::Outline2D) > position(ProgramKind::FrontFinal));
        assert_eq!(r.backend().quads_with(ProgramKind::Outline2D), 1);
        // Init draw plus the mask draw.
        assert_eq!(r.backend().draws_with(ProgramKind::FrontInit), 2);
    }

    /// 8x8 target whose viewport covers only the right half. The sampled
    /// pixel (2, 5) falls outside the scissor box.
    fn right_half_camera() -> Camera {
        let mut camera = Camera::new(8, 8);
        camera.viewport.rect = Rect::new(4, 0, 4, 8);
        camera.viewport.scissor_enabled = true;
        camera.viewport.clear_color = [0.2, 0.4, 0.6, 1.0];
        camera
    }

    #[test]
    fn final_clear_ignores_scissor() {
        let scene = Scene::new();
        let mut r = renderer(no_queries(4));
        r.backend_mut().set_visible_pixel([1.0, 1.0, 0.0, 1.0], 0.3);
        r.render(&scene.queue(), &right_half_camera(), 0.0).unwrap();
        assert_eq!(r.backend().pixel(), [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn outline_mask_is_white_outside_scissor() {
        let scene = Scene::new();
        let mut outlined = material([1.0; 4]);
        outlined
            .uniforms
            .set(conventions::RENDER_MODE, UniformValue::Int(4));
        let queue = [token(&scene.actor, &outlined, &scene.back)];

        let mut r = renderer(VividSettings::default());
        r.render(&queue, &right_half_camera(), 0.0).unwrap();

        let commands = r.backend().commands();
        let mask = commands
            .iter()
            .find_map(|c| match c {
                Command::Clear {
                    target: Some(fb),
                    color: Some(color),
                    ..
                } if *color == [1.0; 4] => Some(*fb),
                _ => None,
            })
            .unwrap();
        assert!(commands.contains(&Command::Clear {
            target: Some(mask),
            color: Some([0.0, 0.0, 0.0, 1.0]),
            depth: None,
        }));
        assert_eq!(r.backend().color_at(mask), Some([1.0; 4]));
    }

    #[test]
    fn fog_and_smart_clips_reach_geometry_programs() {
        let scene = Scene::new();
        let mut shader = material([1.0; 4]);
        shader.enables.fog = true;
        let u = &mut shader.uniforms;
        u.set(conventions::FOG_TARGET, UniformValue::Int(1));
        u.set(conventions::FOG_COLOR, UniformValue::Vec4([0.5, 0.5, 0.5, 1.0]));
        u.set(conventions::FOG_RANGE, UniformValue::Vec2([1.0, 5.0]));
        u.set(conventions::SMART_CLIP_MODE[1], UniformValue::Int(1));
        u.set(conventions::SMART_CLIP_TARGET[1], UniformValue::Int(2));
        u.set(conventions::SMART_CLIP_PLANE[1], UniformValue::Vec4([0.0, 1.0, 0.0, -0.5]));
        u.set(conventions::SMART_CLIP_COLOR[1], UniformValue::Vec4([0.0, 1.0, 0.0, 1.0]));
        u.set(conventions::SMART_CLIP_FADE[1], UniformValue::Float(0.5));
        let queue = [token(&scene.actor, &shader, &scene.back)];

        let mut r = renderer(no_queries(2));
        r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();

        for kind in [ProgramKind::FrontInit, ProgramKind::FrontPeel] {
            let get = |name: &str| r.backend().uniform(kind, name);
            assert_eq!(get("u_fog_enabled"), Some(UniformValue::Int(1)));
            assert_eq!(get("u_fog_target"), Some(UniformValue::Int(1)));
            assert_eq!(get("u_fog_color"), Some(UniformValue::Vec4([0.5, 0.5, 0.5, 1.0])));
            assert_eq!(get("u_fog_range"), Some(UniformValue::Vec2([1.0, 5.0])));
            assert_eq!(get("u_clip_target"), Some(UniformValue::IVec4([-1, 2, -1, -1])));
            assert_eq!(get("u_clip_fade"), Some(UniformValue::Vec4([0.0, 0.5, 0.0, 0.0])));
            assert_eq!(
                get("u_clip_plane[1]"),
                Some(UniformValue::Vec4([0.0, 1.0, 0.0, -0.5]))
            );
            assert_eq!(
                get("u_clip_color[1]"),
                Some(UniformValue::Vec4([0.0, 1.0, 0.0, 1.0]))
            );
            assert_eq!(get("u_clip_plane[0]"), None);
        }
    }

    #[test]
    fn fog_off_uploads_only_the_switch() {
        let scene = Scene::new();
        let mut r = renderer(no_queries(2));
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        let get = |name: &str| r.backend().uniform(ProgramKind::FrontInit, name);
        assert_eq!(get("u_fog_enabled"), Some(UniformValue::Int(0)));
        assert_eq!(get("u_fog_target"), None);
        assert_eq!(get("u_clip_target"), Some(UniformValue::IVec4([-1; 4])));
    }

    #[test]
    fn outline_3d_uses_wireframe_programs() {
        let scene = Scene::new();
        let mut outlined = material([1.0; 4]);
        outlined
            .uniforms
            .set(conventions::RENDER_MODE, UniformValue::Int(2));
        outlined
            .uniforms
            .set(conventions::OUTLINE_COLOR, UniformValue::Vec4([1.0, 1.0, 0.0, 0.5]));
        let queue = [token(&scene.actor, &outlined, &scene.back)];

        let mut r = renderer(no_queries(2));
        r.render(&queue, &Camera::new(8, 8), 0.0).unwrap();
        assert_eq!(r.backend().draws_with(ProgramKind::FrontInitOutline), 1);
        assert_eq!(r.backend().draws_with(ProgramKind::FrontPeelOutline), 1);
        assert!(r.backend().commands().iter().any(|c| matches!(
            c,
            Command::Draw {
                primitive: crate::backend::Primitive::Wireframe { .. },
                ..
            }
        )));
    }

    #[test]
    fn opacity_reaches_geometry_programs() {
        let scene = Scene::new();
        let mut r = renderer(VividSettings {
            opacity: 0.25,
            ..no_queries(2)
        });
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        for kind in [ProgramKind::FrontInit, ProgramKind::FrontPeel] {
            assert_eq!(
                r.backend().uniform(kind, "u_opacity"),
                Some(UniformValue::Float(0.25))
            );
        }
    }

    #[test]
    fn release_frees_everything() {
        let scene = Scene::new();
        let mut r = renderer(VividSettings::default());
        r.set_background_image(1, 1, vec![255; 4]).unwrap();
        r.set_settings(VividSettings {
            background_image_enabled: true,
            ..Default::default()
        });
        r.render(&scene.queue(), &Camera::new(8, 8), 0.0).unwrap();
        assert!(r.backend().live_objects() > 0);

        r.release_resources();
        r.release_resources();
        assert_eq!(r.backend().live_objects(), 0);
        assert!(r.render(&scene.queue(), &Camera::new(8, 8), 0.0).is_none());
    }

    #[test]
    fn params_are_resolved_in_queue_order() {
        let scene = Scene::new();
        let [solid, glass] = scene.queue();
        let params = resolve_params(&[glass, solid, glass]);
        let diffuse: Vec<_> = params.iter().map(|p| p.diffuse).collect();
        assert_eq!(
            diffuse,
            [[1.0, 0.0, 0.0, 0.5], [0.0, 0.0, 1.0, 1.0], [1.0, 0.0, 0.0, 0.5]]
        );
        assert!(resolve_params(&[]).is_empty());
    }

    #[test]
    fn letterbox_keeps_aspect() {
        let viewport = Rect::new(0, 0, 200, 100);
        let cal = BackgroundCalibration::default();
        assert_eq!(letterbox(viewport, [100, 100], &cal), Rect::new(50, 0, 100, 100));
        assert_eq!(letterbox(viewport, [400, 100], &cal), Rect::new(0, 25, 200, 50));

        let stretched = BackgroundCalibration {
            pixel_aspect_ratio: 2.0,
            calibrated_image_size: None,
        };
        assert_eq!(letterbox(viewport, [100, 100], &stretched), viewport);

        let calibrated = BackgroundCalibration {
            pixel_aspect_ratio: 1.0,
            calibrated_image_size: Some([50, 100]),
        };
        assert_eq!(letterbox(viewport, [640, 480], &calibrated), Rect::new(75, 0, 50, 100));
        assert_eq!(letterbox(viewport, [0, 0], &cal), viewport);
    }
}
