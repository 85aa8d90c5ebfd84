//! Inputs consumed by the renderer: the render queue and the camera.
//!
//! These are owned by the caller's scene layer. The renderer only borrows
//! them for the duration of one [`render`](crate::VividRenderer::render)
//! call.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// A vertex in a renderable, ready for the GPU.
///
/// Interleaved as position, color, normal.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Model-space position.
    pub position: [f32; 3],
    /// Straight-alpha RGBA.
    pub color: [f32; 4],
    /// Model-space normal, for lighting.
    pub normal: [f32; 3],
}

impl Vertex {
    /// A white vertex facing +Z.
    #[must_use]
    pub fn new(position: [f32; 3]) -> Self {
        Self {
            position,
            color: [1.0; 4],
            normal: [0.0, 0.0, 1.0],
        }
    }

    /// Replace the vertex color.
    #[must_use]
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }
}

/// Indexed triangle geometry.
///
/// Drawn with `glDrawElements(GL_TRIANGLES, ...)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Renderable {
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
}

impl Renderable {
    /// Build a renderable from vertices and triangle indices.
    #[must_use]
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// A two-triangle quad spanning `[-1, 1]` in X and Y at depth `z`.
    #[must_use]
    pub fn quad(z: f32, color: [f32; 4]) -> Self {
        let corners = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
        let vertices = corners
            .iter()
            .map(|[x, y]| Vertex::new([*x, *y, z]).with_color(color))
            .collect();
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// Whether there is anything to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }
}

/// Stable identifier of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ActorId(pub u64);

/// A placed instance of a renderable.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    /// Identifier, unused by the renderer itself.
    pub id: ActorId,
    /// Model-to-world transform.
    pub transform: Mat4,
    /// Whether this actor's silhouette contributes to the background stencil.
    pub is_stencil: bool,
}

impl Actor {
    /// An actor at the origin, not part of the stencil.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id: ActorId(id),
            transform: Mat4::IDENTITY,
            is_stencil: false,
        }
    }
}

/// A typed uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// `int`, also used for samplers and booleans.
    Int(i32),
    /// `float`.
    Float(f32),
    /// `vec2`.
    Vec2([f32; 2]),
    /// `vec3`.
    Vec3([f32; 3]),
    /// `vec4`.
    Vec4([f32; 4]),
    /// `ivec4`.
    IVec4([i32; 4]),
    /// `mat4`, column major.
    Mat4(Mat4),
}

/// String-keyed uniform values attached to a [`Shader`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet {
    values: HashMap<String, UniformValue>,
}

impl UniformSet {
    /// Insert or replace a value.
    pub fn set(&mut self, name: impl Into<String>, value: UniformValue) {
        self.values.insert(name.into(), value);
    }

    /// Raw lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    /// Integer lookup. Floats are truncated.
    #[must_use]
    pub fn get_i32(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            UniformValue::Int(v) => Some(*v),
            #[expect(clippy::cast_possible_truncation)]
            UniformValue::Float(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// Float lookup. Integers are widened.
    #[must_use]
    pub fn get_f32(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            UniformValue::Float(v) => Some(*v),
            #[expect(clippy::cast_precision_loss)]
            UniformValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Two-component lookup.
    #[must_use]
    pub fn get_vec2(&self, name: &str) -> Option<[f32; 2]> {
        match self.get(name)? {
            UniformValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    /// Four-component lookup. A `vec3` gets alpha 1.
    #[must_use]
    pub fn get_vec4(&self, name: &str) -> Option<[f32; 4]> {
        match self.get(name)? {
            UniformValue::Vec4(v) => Some(*v),
            UniformValue::Vec3([r, g, b]) => Some([*r, *g, *b, 1.0]),
            _ => None,
        }
    }

    /// Number of values set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fixed-function style switches carried by a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableSet {
    /// Alpha-blend in forward rendering even when opaque.
    pub blend: bool,
    /// Depth test in forward rendering.
    pub depth_test: bool,
    /// Cull back faces.
    pub cull_face: bool,
    /// Headlight shading.
    pub lighting: bool,
    /// Distance fog, configured through the `vivid.fog.*` uniforms.
    pub fog: bool,
}

impl Default for EnableSet {
    fn default() -> Self {
        Self {
            blend: false,
            depth_test: true,
            cull_face: false,
            lighting: false,
            fog: false,
        }
    }
}

/// Surface description of a draw: enables plus named uniforms.
///
/// See [`conventions`](crate::conventions) for the names the renderer reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shader {
    /// Boolean switches.
    pub enables: EnableSet,
    /// Named parameters.
    pub uniforms: UniformSet,
}

/// One entry of the render queue.
#[derive(Debug, Clone, Copy)]
pub struct RenderToken<'a> {
    /// Placement and stencil flag.
    pub actor: &'a Actor,
    /// Surface parameters.
    pub shader: &'a Shader,
    /// Geometry.
    pub renderable: &'a Renderable,
}

/// An already-culled sequence of draws. The renderer never reorders it.
pub type RenderQueue<'a> = [RenderToken<'a>];

/// A pixel rectangle with a bottom-left origin, as OpenGL expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Bottom edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Rectangle from its bottom-left corner and size.
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the pixel at `(px, py)` lies inside.
    #[must_use]
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && py >= self.y && px < self.x + self.width && py < self.y + self.height
    }
}

/// Which buffers a viewport clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearFlags {
    /// Clear color to [`Viewport::clear_color`].
    pub color: bool,
    /// Clear depth to [`Viewport::clear_depth`].
    pub depth: bool,
    /// Carried for the host; the renderer never clears stencil.
    pub stencil: bool,
}

impl Default for ClearFlags {
    fn default() -> Self {
        Self {
            color: true,
            depth: true,
            stencil: false,
        }
    }
}

/// Camera viewport with its clear values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Area drawn into, within the target.
    pub rect: Rect,
    /// Visible clear color.
    pub clear_color: [f32; 4],
    /// Visible clear depth.
    pub clear_depth: f32,
    /// Carried for the host, like [`ClearFlags::stencil`].
    pub clear_stencil: i32,
    /// Buffers the final pass clears.
    pub clear_flags: ClearFlags,
    /// Restrict rendering to `rect` with the scissor test.
    pub scissor_enabled: bool,
}

impl Viewport {
    /// Viewport over `rect` clearing color to opaque black and depth to 1.
    #[must_use]
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            clear_flags: ClearFlags::default(),
            scissor_enabled: false,
        }
    }
}

/// Parameters used to letterbox the background image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundCalibration {
    /// Width / height of one physical pixel of the image.
    pub pixel_aspect_ratio: f32,
    /// Overrides the image's own size when the image was calibrated at a
    /// different resolution than it is stored at.
    pub calibrated_image_size: Option<[u32; 2]>,
}

impl Default for BackgroundCalibration {
    fn default() -> Self {
        Self {
            pixel_aspect_ratio: 1.0,
            calibrated_image_size: None,
        }
    }
}

/// The view the queue is rendered from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World-to-eye transform (the inverse of the camera's world matrix).
    pub view: Mat4,
    /// Eye-to-clip transform.
    pub projection: Mat4,
    /// Where and how the frame is drawn.
    pub viewport: Viewport,
    /// Pixel size of the render target the viewport lives in.
    pub target_size: [u32; 2],
    /// Background image letterboxing.
    pub calibration: BackgroundCalibration,
}

impl Camera {
    /// Identity camera covering the whole `width` x `height` target.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let rect = Rect::new(0, 0, gl_size(width), gl_size(height));
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            viewport: Viewport::new(rect),
            target_size: [width, height],
            calibration: BackgroundCalibration::default(),
        }
    }
}

/// Convert a `u32` dimension to the `i32` GL uses, saturating.
pub(crate) fn gl_size(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_lookups_coerce_scalars() {
        let mut u = UniformSet::default();
        u.set("a", UniformValue::Int(3));
        u.set("b", UniformValue::Float(2.75));
        u.set("c", UniformValue::Vec3([0.1, 0.2, 0.3]));
        assert_eq!(u.get_i32("a"), Some(3));
        assert_eq!(u.get_i32("b"), Some(2));
        assert!((u.get_f32("a").unwrap_or_default() - 3.0).abs() < f32::EPSILON);
        assert_eq!(u.get_vec4("c"), Some([0.1, 0.2, 0.3, 1.0]));
        assert_eq!(u.get_vec2("a"), None);
        assert_eq!(u.get_i32("missing"), None);
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect::new(10, 20, 5, 5);
        assert!(r.contains(10, 20));
        assert!(r.contains(14, 24));
        assert!(!r.contains(15, 24));
        assert!(!r.contains(9, 20));
    }

    #[test]
    fn quad_has_two_triangles() {
        let q = Renderable::quad(0.5, [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(q.indices.len(), 6);
        assert!(q.vertices.iter().all(|v| (v.position[2] - 0.5).abs() < f32::EPSILON));
        assert!(!q.is_empty());
        assert!(Renderable::default().is_empty());
    }
}
