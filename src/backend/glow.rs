//! [`Backend`] implementation issuing OpenGL 3.1 calls through [glow].
//!
//! [glow]: https://docs.rs/glow

use std::sync::Arc;

use glow::{HasContext, PixelUnpackData};

use super::{Backend, Primitive, TextureDesc, TextureFormat};
use crate::error::{Error, Result};
use crate::shaders::{self, ProgramKind};
use crate::state::{BlendFactor, BlendFunc, CullFace, GpuState, RenderState};
use crate::types::{gl_size, Rect, Renderable, UniformValue, Vertex};

/// GL internal format for RGBA8 textures, pre-cast to the `i32` that
/// `tex_image_2d` expects.
#[expect(clippy::cast_possible_wrap)]
const RGBA8_INTERNAL_FORMAT: i32 = glow::RGBA8 as i32;

#[expect(clippy::cast_possible_wrap)]
const DEPTH24_STENCIL8_INTERNAL_FORMAT: i32 = glow::DEPTH24_STENCIL8 as i32;

/// Corners of the fullscreen quad, drawn as a triangle fan.
const QUAD_CORNERS: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0];

/// OpenGL backend.
///
/// Owns the vertex arrays used for streaming queue geometry and for the
/// fullscreen quad. Everything else (textures, framebuffers, programs,
/// queries) is owned by whoever created it through the [`Backend`] trait.
pub struct GlowBackend {
    /// The OpenGL context, shared via [`Arc`] with the host application.
    gl: Arc<glow::Context>,

    /// Vertex array with interleaved position/color/normal attributes.
    vao: glow::VertexArray,
    /// Vertex buffer for streaming renderable vertex data each draw.
    vbo: glow::Buffer,
    /// Element (index) buffer for streaming renderable index data each draw.
    ebo: glow::Buffer,

    /// Vertex array of the fullscreen quad.
    quad_vao: glow::VertexArray,
    /// Static vertex buffer holding [`QUAD_CORNERS`].
    quad_vbo: glow::Buffer,
}

impl GlowBackend {
    /// Create the backend and its vertex arrays.
    ///
    /// # Safety
    ///
    /// The `gl` context must be current and valid, and must stay current on
    /// this thread for as long as the backend (and any renderer owning it)
    /// is used or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a GL buffer or vertex array cannot be created.
    pub unsafe fn new(gl: Arc<glow::Context>) -> Result<Self> {
        let (vao, vbo, ebo) = unsafe {
            let vao = gl.create_vertex_array().map_err(|e| Error::creation("vertex array", e))?;
            let vbo = gl.create_buffer().map_err(|e| Error::creation("buffer", e))?;
            let ebo = gl.create_buffer().map_err(|e| Error::creation("buffer", e))?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));

            // Vertex is 40 bytes.
            #[expect(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let stride = std::mem::size_of::<Vertex>() as i32;
            gl.enable_vertex_attrib_array(shaders::ATTRIB_POSITION);
            gl.vertex_attrib_pointer_f32(
                shaders::ATTRIB_POSITION,
                3,
                glow::FLOAT,
                false,
                stride,
                0,
            );
            gl.enable_vertex_attrib_array(shaders::ATTRIB_COLOR);
            gl.vertex_attrib_pointer_f32(shaders::ATTRIB_COLOR, 4, glow::FLOAT, false, stride, 12);
            gl.enable_vertex_attrib_array(shaders::ATTRIB_NORMAL);
            gl.vertex_attrib_pointer_f32(shaders::ATTRIB_NORMAL, 3, glow::FLOAT, false, stride, 28);
            gl.bind_vertex_array(None);

            (vao, vbo, ebo)
        };

        let (quad_vao, quad_vbo) = unsafe {
            let quad_vao = gl
                .create_vertex_array()
                .map_err(|e| Error::creation("vertex array", e))?;
            let quad_vbo = gl.create_buffer().map_err(|e| Error::creation("buffer", e))?;

            gl.bind_vertex_array(Some(quad_vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(quad_vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&QUAD_CORNERS),
                glow::STATIC_DRAW,
            );
            gl.enable_vertex_attrib_array(shaders::ATTRIB_POSITION);
            gl.vertex_attrib_pointer_f32(shaders::ATTRIB_POSITION, 2, glow::FLOAT, false, 8, 0);
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);

            (quad_vao, quad_vbo)
        };

        Ok(Self {
            gl,
            vao,
            vbo,
            ebo,
            quad_vao,
            quad_vbo,
        })
    }

    /// The wrapped context.
    #[must_use]
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    /// Set texture filtering and wrapping parameters on the bound texture.
    unsafe fn set_tex_params(gl: &glow::Context, filter: u32) {
        // GL constant values are small enough that the cast is always safe.
        #[expect(clippy::cast_possible_wrap)]
        unsafe {
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter as i32);
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
        }
    }
}

impl Drop for GlowBackend {
    fn drop(&mut self) {
        let gl = &self.gl;
        unsafe {
            gl.delete_vertex_array(self.vao);
            gl.delete_buffer(self.vbo);
            gl.delete_buffer(self.ebo);
            gl.delete_vertex_array(self.quad_vao);
            gl.delete_buffer(self.quad_vbo);
        }
    }
}

impl Backend for GlowBackend {
    type Texture = glow::Texture;
    type Framebuffer = glow::Framebuffer;
    type Program = glow::Program;
    type Query = glow::Query;
    type UniformLocation = glow::UniformLocation;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<glow::Texture> {
        let gl = &self.gl;
        let [w, h] = desc.size;
        let texture = unsafe { gl.create_texture() }.map_err(|e| Error::creation("texture", e))?;

        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            match desc.format {
                TextureFormat::Rgba8 => {
                    gl.tex_image_2d(
                        glow::TEXTURE_2D,
                        0,
                        RGBA8_INTERNAL_FORMAT,
                        gl_size(w),
                        gl_size(h),
                        0,
                        glow::RGBA,
                        glow::UNSIGNED_BYTE,
                        PixelUnpackData::Slice(desc.pixels),
                    );
                    Self::set_tex_params(gl, glow::LINEAR);
                }
                TextureFormat::Depth24Stencil8 => {
                    gl.tex_image_2d(
                        glow::TEXTURE_2D,
                        0,
                        DEPTH24_STENCIL8_INTERNAL_FORMAT,
                        gl_size(w),
                        gl_size(h),
                        0,
                        glow::DEPTH_STENCIL,
                        glow::UNSIGNED_INT_24_8,
                        PixelUnpackData::Slice(None),
                    );
                    Self::set_tex_params(gl, glow::NEAREST);
                }
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
        }

        Ok(texture)
    }

    fn delete_texture(&mut self, texture: glow::Texture) {
        unsafe { self.gl.delete_texture(texture) };
    }

    fn create_framebuffer(
        &mut self,
        color: Option<glow::Texture>,
        depth: Option<glow::Texture>,
    ) -> Result<glow::Framebuffer> {
        let gl = &self.gl;
        let fbo =
            unsafe { gl.create_framebuffer() }.map_err(|e| Error::creation("framebuffer", e))?;

        let status = unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            if let Some(color) = color {
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0,
                    glow::TEXTURE_2D,
                    Some(color),
                    0,
                );
            } else {
                gl.draw_buffer(glow::NONE);
                gl.read_buffer(glow::NONE);
            }
            if let Some(depth) = depth {
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::DEPTH_STENCIL_ATTACHMENT,
                    glow::TEXTURE_2D,
                    Some(depth),
                    0,
                );
            }
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            status
        };

        if status != glow::FRAMEBUFFER_COMPLETE {
            unsafe { gl.delete_framebuffer(fbo) };
            return Err(Error::IncompleteFramebuffer { status });
        }
        Ok(fbo)
    }

    fn delete_framebuffer(&mut self, framebuffer: glow::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) };
    }

    fn create_query(&mut self) -> Result<glow::Query> {
        unsafe { self.gl.create_query() }.map_err(|e| Error::creation("query", e))
    }

    fn delete_query(&mut self, query: glow::Query) {
        unsafe { self.gl.delete_query(query) };
    }

    /// The compiled shader objects are detached and deleted after successful
    /// linking, so only the program handle needs to be cleaned up.
    fn compile_program(
        &mut self,
        kind: ProgramKind,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<glow::Program> {
        let gl = &self.gl;
        let program = unsafe { gl.create_program() }.map_err(|e| Error::creation("program", e))?;

        let vs = unsafe { compile_shader(gl, kind, glow::VERTEX_SHADER, vertex_src) };
        let fs = unsafe { compile_shader(gl, kind, glow::FRAGMENT_SHADER, fragment_src) };
        let (vs, fs) = match (vs, fs) {
            (Ok(vs), Ok(fs)) => (vs, fs),
            (vs, fs) => {
                unsafe {
                    for shader in [vs.as_ref().ok(), fs.as_ref().ok()].into_iter().flatten() {
                        gl.delete_shader(*shader);
                    }
                    gl.delete_program(program);
                }
                return Err(vs.err().or(fs.err()).unwrap_or_else(|| Error::ProgramLink {
                    program: kind,
                    log: String::new(),
                }));
            }
        };

        unsafe {
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.bind_attrib_location(program, shaders::ATTRIB_POSITION, "a_position");
            gl.bind_attrib_location(program, shaders::ATTRIB_COLOR, "a_color");
            gl.bind_attrib_location(program, shaders::ATTRIB_NORMAL, "a_normal");
            gl.link_program(program);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(Error::ProgramLink { program: kind, log });
            }

            // Shaders can be detached and deleted after successful linking.
            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);
        }

        Ok(program)
    }

    fn delete_program(&mut self, program: glow::Program) {
        unsafe { self.gl.delete_program(program) };
    }

    fn uniform_location(
        &mut self,
        program: glow::Program,
        name: &str,
    ) -> Option<glow::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<glow::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) };
    }

    fn set_viewport(&mut self, rect: Rect) {
        unsafe { self.gl.viewport(rect.x, rect.y, rect.width, rect.height) };
    }

    fn set_scissor(&mut self, rect: Rect) {
        unsafe { self.gl.scissor(rect.x, rect.y, rect.width, rect.height) };
    }

    fn set_depth_test(&mut self, enabled: bool) {
        set_capability(&self.gl, glow::DEPTH_TEST, enabled);
    }

    fn set_depth_write(&mut self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) };
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        set_capability(&self.gl, glow::SCISSOR_TEST, enabled);
    }

    fn set_cull_face(&mut self, face: Option<CullFace>) {
        let gl = &self.gl;
        match face {
            Some(face) => unsafe {
                gl.enable(glow::CULL_FACE);
                gl.cull_face(match face {
                    CullFace::Front => glow::FRONT,
                    CullFace::Back => glow::BACK,
                    CullFace::FrontAndBack => glow::FRONT_AND_BACK,
                });
            },
            None => unsafe { gl.disable(glow::CULL_FACE) },
        }
    }

    fn set_blend(&mut self, enabled: bool) {
        set_capability(&self.gl, glow::BLEND, enabled);
    }

    fn set_blend_func(&mut self, func: BlendFunc) {
        unsafe {
            self.gl.blend_func_separate(
                blend_factor_to_gl(func.src_rgb),
                blend_factor_to_gl(func.dst_rgb),
                blend_factor_to_gl(func.src_alpha),
                blend_factor_to_gl(func.dst_alpha),
            );
        }
    }

    fn set_clear_color(&mut self, [r, g, b, a]: [f32; 4]) {
        unsafe { self.gl.clear_color(r, g, b, a) };
    }

    fn set_clear_depth(&mut self, depth: f32) {
        unsafe { self.gl.clear_depth_f32(depth) };
    }

    fn set_active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) };
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        let mut mask = 0;
        if let Some(color) = color {
            self.set_clear_color(color);
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if let Some(depth) = depth {
            self.set_clear_depth(depth);
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if mask != 0 {
            unsafe { self.gl.clear(mask) };
        }
    }

    fn use_program(&mut self, program: Option<glow::Program>) {
        unsafe { self.gl.use_program(program) };
    }

    fn set_uniform(&mut self, location: &glow::UniformLocation, value: UniformValue) {
        let gl = &self.gl;
        let loc = Some(location);
        unsafe {
            match value {
                UniformValue::Int(v) => gl.uniform_1_i32(loc, v),
                UniformValue::Float(v) => gl.uniform_1_f32(loc, v),
                UniformValue::Vec2([x, y]) => gl.uniform_2_f32(loc, x, y),
                UniformValue::Vec3([x, y, z]) => gl.uniform_3_f32(loc, x, y, z),
                UniformValue::Vec4([x, y, z, w]) => gl.uniform_4_f32(loc, x, y, z, w),
                UniformValue::IVec4([x, y, z, w]) => gl.uniform_4_i32(loc, x, y, z, w),
                UniformValue::Mat4(m) => {
                    gl.uniform_matrix_4_f32_slice(loc, false, &m.to_cols_array());
                }
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<glow::Texture>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    /// Upload vertex/index data and issue the draw call.
    fn draw_renderable(&mut self, renderable: &Renderable, primitive: Primitive) {
        let Ok(index_count) = i32::try_from(renderable.indices.len()) else {
            log::warn!("renderable with {} indices skipped", renderable.indices.len());
            return;
        };
        if renderable.is_empty() {
            return;
        }
        let gl = &self.gl;

        unsafe {
            gl.bind_vertex_array(Some(self.vao));

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&renderable.vertices),
                glow::STREAM_DRAW,
            );

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(&renderable.indices),
                glow::STREAM_DRAW,
            );

            match primitive {
                Primitive::Triangles => {
                    gl.draw_elements(glow::TRIANGLES, index_count, glow::UNSIGNED_INT, 0);
                }
                Primitive::Wireframe { line_width } => {
                    gl.polygon_mode(glow::FRONT_AND_BACK, glow::LINE);
                    gl.line_width(line_width);
                    gl.draw_elements(glow::TRIANGLES, index_count, glow::UNSIGNED_INT, 0);
                    gl.line_width(1.0);
                    gl.polygon_mode(glow::FRONT_AND_BACK, glow::FILL);
                }
            }

            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn draw_fullscreen_quad(&mut self) {
        let gl = &self.gl;
        unsafe {
            gl.bind_vertex_array(Some(self.quad_vao));
            gl.draw_arrays(glow::TRIANGLE_FAN, 0, 4);
            gl.bind_vertex_array(None);
        }
    }

    fn begin_query(&mut self, query: glow::Query) {
        unsafe { self.gl.begin_query(glow::SAMPLES_PASSED, query) };
    }

    fn end_query(&mut self, query: glow::Query) -> u64 {
        unsafe {
            self.gl.end_query(glow::SAMPLES_PASSED);
            u64::from(self.gl.get_query_parameter_u32(query, glow::QUERY_RESULT))
        }
    }

    /// Leaves `dst` bound.
    fn blit_depth(
        &mut self,
        src: Option<glow::Framebuffer>,
        dst: Option<glow::Framebuffer>,
        rect: Rect,
    ) {
        let gl = &self.gl;
        let (x0, y0) = (rect.x, rect.y);
        let (x1, y1) = (rect.x + rect.width, rect.y + rect.height);
        unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, src);
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, dst);
            gl.blit_framebuffer(
                x0,
                y0,
                x1,
                y1,
                x0,
                y0,
                x1,
                y1,
                glow::DEPTH_BUFFER_BIT,
                glow::NEAREST,
            );
            gl.bind_framebuffer(glow::FRAMEBUFFER, dst);
        }
    }

    fn state(&mut self) -> GpuState {
        let gl = &self.gl;
        unsafe {
            let blend_func = BlendFunc {
                src_rgb: blend_factor_from_gl(gl.get_parameter_i32(glow::BLEND_SRC_RGB)),
                dst_rgb: blend_factor_from_gl(gl.get_parameter_i32(glow::BLEND_DST_RGB)),
                src_alpha: blend_factor_from_gl(gl.get_parameter_i32(glow::BLEND_SRC_ALPHA)),
                dst_alpha: blend_factor_from_gl(gl.get_parameter_i32(glow::BLEND_DST_ALPHA)),
            };
            let cull_face = gl.is_enabled(glow::CULL_FACE).then(|| {
                #[expect(clippy::cast_sign_loss)]
                match gl.get_parameter_i32(glow::CULL_FACE_MODE) as u32 {
                    glow::FRONT => CullFace::Front,
                    glow::FRONT_AND_BACK => CullFace::FrontAndBack,
                    _ => CullFace::Back,
                }
            });
            let render = RenderState {
                depth_test: gl.is_enabled(glow::DEPTH_TEST),
                depth_write: gl.get_parameter_i32(glow::DEPTH_WRITEMASK) != 0,
                blend: gl.is_enabled(glow::BLEND).then_some(blend_func),
                cull_face,
                scissor_test: gl.is_enabled(glow::SCISSOR_TEST),
            };

            let mut viewport = [0; 4];
            gl.get_parameter_i32_slice(glow::VIEWPORT, &mut viewport);
            let mut scissor = [0; 4];
            gl.get_parameter_i32_slice(glow::SCISSOR_BOX, &mut scissor);
            let mut clear_color = [0.0; 4];
            gl.get_parameter_f32_slice(glow::COLOR_CLEAR_VALUE, &mut clear_color);
            let active_texture = u32::try_from(gl.get_parameter_i32(glow::ACTIVE_TEXTURE))
                .map_or(0, |unit| unit.saturating_sub(glow::TEXTURE0));

            GpuState {
                render,
                blend_func,
                viewport: Rect::new(viewport[0], viewport[1], viewport[2], viewport[3]),
                scissor: Rect::new(scissor[0], scissor[1], scissor[2], scissor[3]),
                clear_color,
                clear_depth: gl.get_parameter_f32(glow::DEPTH_CLEAR_VALUE),
                active_texture,
            }
        }
    }
}

/// Compile a single shader stage (vertex or fragment) from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
unsafe fn compile_shader(
    gl: &glow::Context,
    kind: ProgramKind,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader> {
    unsafe {
        let shader = gl.create_shader(shader_type).map_err(|e| Error::creation("shader", e))?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(Error::ShaderCompile { program: kind, log });
        }

        Ok(shader)
    }
}

fn set_capability(gl: &glow::Context, capability: u32, enabled: bool) {
    unsafe {
        if enabled {
            gl.enable(capability);
        } else {
            gl.disable(capability);
        }
    }
}

fn blend_factor_to_gl(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

/// Factors we don't model (constant color, saturate) read back as `One`.
fn blend_factor_from_gl(value: i32) -> BlendFactor {
    #[expect(clippy::cast_sign_loss)]
    match value as u32 {
        glow::ZERO => BlendFactor::Zero,
        glow::SRC_COLOR => BlendFactor::SrcColor,
        glow::ONE_MINUS_SRC_COLOR => BlendFactor::OneMinusSrcColor,
        glow::DST_COLOR => BlendFactor::DstColor,
        glow::ONE_MINUS_DST_COLOR => BlendFactor::OneMinusDstColor,
        glow::SRC_ALPHA => BlendFactor::SrcAlpha,
        glow::ONE_MINUS_SRC_ALPHA => BlendFactor::OneMinusSrcAlpha,
        glow::DST_ALPHA => BlendFactor::DstAlpha,
        glow::ONE_MINUS_DST_ALPHA => BlendFactor::OneMinusDstAlpha,
        glow::ONE => BlendFactor::One,
        other => {
            log::debug!("unmodelled blend factor 0x{other:x} read back as ONE");
            BlendFactor::One
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_factors_round_trip_through_gl_enums() {
        let factors = [
            BlendFactor::Zero,
            BlendFactor::One,
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
            BlendFactor::DstAlpha,
            BlendFactor::OneMinusDstAlpha,
        ];
        for f in factors {
            #[expect(clippy::cast_possible_wrap)]
            let raw = blend_factor_to_gl(f) as i32;
            assert_eq!(blend_factor_from_gl(raw), f);
        }
    }

    #[test]
    fn unknown_factor_reads_as_one() {
        #[expect(clippy::cast_possible_wrap)]
        let raw = glow::CONSTANT_COLOR as i32;
        assert_eq!(blend_factor_from_gl(raw), BlendFactor::One);
    }
}
