//! Per-draw parameters and the translucency heuristic.
//!
//! [`DrawParams`] is the typed view of a token's shader, read once per token
//! per frame. [`is_translucent`] decides which actors count as translucent for
//! the depth-peeling auto-throttle.
//!
//! # Known gap
//!
//! The heuristic only looks at uniform colors, fog and smart-clip targets and
//! the *first* vertex color. Per-vertex alpha further into the array and
//! textures whose texels have alpha strictly between 0 and 1 are not
//! detected. Scenes relying on such content must disable
//! [`depth_peeling_auto_throttle`](crate::VividSettings::depth_peeling_auto_throttle),
//! otherwise a frame where nothing else is translucent skips peeling.

use crate::conventions::{self, EffectTarget, RenderMode, SMART_CLIP_COUNT};
use crate::types::{RenderToken, Shader};

/// One configured smart clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmartClip {
    /// Channel the clip modulates.
    pub target: EffectTarget,
    /// Plane `(a, b, c, d)` in world space; the positive side is kept.
    pub plane: [f32; 4],
    /// Color blended in on the clipped side.
    pub color: [f32; 4],
    /// Width of the soft transition, in world units.
    pub fade: f32,
}

/// Typed shader state for one draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    /// Polygons, outlines or both.
    pub render_mode: RenderMode,
    /// Material color, multiplied with vertex colors.
    pub diffuse: [f32; 4],
    /// Color of 3D and 2D outlines.
    pub outline_color: [f32; 4],
    /// Outline width in pixels.
    pub outline_width: f32,
    /// Whether the shader enables lighting.
    pub lighting: bool,
    /// `Some` when the shader enables fog.
    pub fog: Option<Fog>,
    /// Slots whose mode is non-zero.
    pub smart_clips: [Option<SmartClip>; SMART_CLIP_COUNT],
}

/// Linear fog parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    /// Channel the fog modulates.
    pub target: EffectTarget,
    /// Fog color at full strength.
    pub color: [f32; 4],
    /// Eye distances where fog starts and reaches full strength.
    pub range: [f32; 2],
}

impl DrawParams {
    /// Read the conventional uniforms of `shader`, applying defaults.
    #[must_use]
    pub fn from_shader(shader: &Shader) -> Self {
        let u = &shader.uniforms;

        let fog = shader.enables.fog.then(|| Fog {
            target: EffectTarget::from_i32(u.get_i32(conventions::FOG_TARGET).unwrap_or(0)),
            color: u.get_vec4(conventions::FOG_COLOR).unwrap_or([1.0; 4]),
            range: u.get_vec2(conventions::FOG_RANGE).unwrap_or([0.0, 1.0]),
        });

        let mut smart_clips = [None; SMART_CLIP_COUNT];
        for (i, slot) in smart_clips.iter_mut().enumerate() {
            if u.get_i32(conventions::SMART_CLIP_MODE[i]).unwrap_or(0) == 0 {
                continue;
            }
            *slot = Some(SmartClip {
                target: EffectTarget::from_i32(
                    u.get_i32(conventions::SMART_CLIP_TARGET[i]).unwrap_or(0),
                ),
                plane: u
                    .get_vec4(conventions::SMART_CLIP_PLANE[i])
                    .unwrap_or([0.0, 0.0, 1.0, 0.0]),
                color: u.get_vec4(conventions::SMART_CLIP_COLOR[i]).unwrap_or([0.0; 4]),
                fade: u.get_f32(conventions::SMART_CLIP_FADE[i]).unwrap_or(0.0),
            });
        }

        Self {
            render_mode: RenderMode::from_i32(u.get_i32(conventions::RENDER_MODE).unwrap_or(0)),
            diffuse: u.get_vec4(conventions::MATERIAL_DIFFUSE).unwrap_or([1.0; 4]),
            outline_color: u
                .get_vec4(conventions::OUTLINE_COLOR)
                .unwrap_or([0.0, 0.0, 0.0, 1.0]),
            outline_width: u.get_f32(conventions::OUTLINE_WIDTH).unwrap_or(1.0),
            lighting: shader.enables.lighting,
            fog,
            smart_clips,
        }
    }

    /// Whether fog or any smart clip writes into the alpha channel.
    #[must_use]
    pub fn writes_alpha(&self) -> bool {
        let fog_alpha = self.fog.is_some_and(|f| f.target == EffectTarget::Alpha);
        let clip_alpha = self
            .smart_clips
            .iter()
            .flatten()
            .any(|c| c.target == EffectTarget::Alpha);
        fog_alpha || clip_alpha
    }

    /// Whether the token takes part in the init and peel passes.
    #[must_use]
    pub fn is_peeled(&self) -> bool {
        self.render_mode.draws_polygons() || self.render_mode.draws_outline_geometry()
    }
}

/// Best-effort translucency test. See the module docs for what it misses.
#[must_use]
pub fn is_translucent(token: &RenderToken<'_>) -> bool {
    let params = DrawParams::from_shader(token.shader);
    is_translucent_with(token, &params)
}

pub(crate) fn is_translucent_with(token: &RenderToken<'_>, params: &DrawParams) -> bool {
    params.diffuse[3] < 1.0
        || params.outline_color[3] < 1.0
        || params.writes_alpha()
        || token
            .renderable
            .vertices
            .first()
            .is_some_and(|v| v.color[3] < 1.0)
}

/// Split a queue into `(opaque, translucent)` tokens, preserving order.
#[must_use]
pub fn partition_queue<'q, 'a>(
    queue: &'q [RenderToken<'a>],
) -> (Vec<&'q RenderToken<'a>>, Vec<&'q RenderToken<'a>>) {
    queue.iter().partition(|t| !is_translucent(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Actor, Renderable, UniformValue};

    fn shader_with(name: &str, value: UniformValue) -> Shader {
        let mut s = Shader::default();
        s.uniforms.set(name, value);
        s
    }

    fn token<'a>(actor: &'a Actor, shader: &'a Shader, r: &'a Renderable) -> RenderToken<'a> {
        RenderToken {
            actor,
            shader,
            renderable: r,
        }
    }

    #[test]
    fn defaults_are_opaque_polygons() {
        let p = DrawParams::from_shader(&Shader::default());
        assert_eq!(p.render_mode, RenderMode::Polygons);
        assert!(p.is_peeled());
        assert!(!p.writes_alpha());
        assert_eq!(p.diffuse, [1.0; 4]);
    }

    #[test]
    fn each_rule_marks_translucent() {
        let actor = Actor::new(1);
        let opaque = Renderable::quad(0.0, [1.0; 4]);

        let diffuse = shader_with(
            conventions::MATERIAL_DIFFUSE,
            UniformValue::Vec4([1.0, 1.0, 1.0, 0.5]),
        );
        assert!(is_translucent(&token(&actor, &diffuse, &opaque)));

        let outline = shader_with(
            conventions::OUTLINE_COLOR,
            UniformValue::Vec4([0.0, 0.0, 0.0, 0.2]),
        );
        assert!(is_translucent(&token(&actor, &outline, &opaque)));

        let mut fog = shader_with(conventions::FOG_TARGET, UniformValue::Int(1));
        assert!(!is_translucent(&token(&actor, &fog, &opaque)), "fog disabled");
        fog.enables.fog = true;
        assert!(is_translucent(&token(&actor, &fog, &opaque)));

        let mut clip = shader_with(conventions::SMART_CLIP_TARGET[3], UniformValue::Int(1));
        assert!(!is_translucent(&token(&actor, &clip, &opaque)), "clip off");
        clip.uniforms.set(conventions::SMART_CLIP_MODE[3], UniformValue::Int(1));
        assert!(is_translucent(&token(&actor, &clip, &opaque)));

        let colored = Renderable::quad(0.0, [1.0, 1.0, 1.0, 0.9]);
        assert!(is_translucent(&token(&actor, &Shader::default(), &colored)));
    }

    #[test]
    fn only_first_vertex_color_is_inspected() {
        let actor = Actor::new(1);
        let mut r = Renderable::quad(0.0, [1.0; 4]);
        r.vertices[2].color[3] = 0.1;
        assert!(!is_translucent(&token(&actor, &Shader::default(), &r)));
    }

    #[test]
    fn partition_keeps_order() {
        let a = Actor::new(1);
        let r = Renderable::quad(0.0, [1.0; 4]);
        let solid = Shader::default();
        let glass = shader_with(
            conventions::MATERIAL_DIFFUSE,
            UniformValue::Vec4([1.0, 1.0, 1.0, 0.5]),
        );
        let queue = [
            token(&a, &glass, &r),
            token(&a, &solid, &r),
            token(&a, &glass, &r),
        ];
        let (opaque, translucent) = partition_queue(&queue);
        assert_eq!(opaque.len(), 1);
        assert_eq!(translucent.len(), 2);
        assert!(std::ptr::eq(translucent[0], &queue[0]));
        assert!(std::ptr::eq(translucent[1], &queue[2]));
    }
}
