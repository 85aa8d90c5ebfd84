//! Uniform names the renderer reads from a [`Shader`](crate::Shader).
//!
//! Scene code configures per-draw behavior by setting these keys in the
//! shader's [`UniformSet`](crate::UniformSet). Everything is optional; a
//! missing key means "off" or the documented default.

/// `int`, see [`RenderMode`]. Default `0`.
pub const RENDER_MODE: &str = "vivid.render_mode";
/// `vec4` outline color. Default opaque black.
pub const OUTLINE_COLOR: &str = "vivid.outline.color";
/// `float` outline width in pixels. Default `1.0`.
pub const OUTLINE_WIDTH: &str = "vivid.outline.width";
/// `vec4` material diffuse color. Default opaque white.
pub const MATERIAL_DIFFUSE: &str = "material.diffuse";
/// `int`, see [`EffectTarget`]. Default color.
pub const FOG_TARGET: &str = "vivid.fog.target";
/// `vec4` fog color.
pub const FOG_COLOR: &str = "vivid.fog.color";
/// `vec2` eye-space `[start, end]` distances of linear fog.
pub const FOG_RANGE: &str = "vivid.fog.range";

/// Number of smart clips a shader may configure.
pub const SMART_CLIP_COUNT: usize = 4;

macro_rules! smart_clip_names {
    ($field:literal) => {
        [
            concat!("vivid.smart_clip[0].", $field),
            concat!("vivid.smart_clip[1].", $field),
            concat!("vivid.smart_clip[2].", $field),
            concat!("vivid.smart_clip[3].", $field),
        ]
    };
}

/// `int` per smart clip: `0` off, `1` plane.
pub const SMART_CLIP_MODE: [&str; SMART_CLIP_COUNT] = smart_clip_names!("mode");
/// `int` per smart clip, see [`EffectTarget`].
pub const SMART_CLIP_TARGET: [&str; SMART_CLIP_COUNT] = smart_clip_names!("target");
/// `vec4` world-space plane per smart clip; the effect applies where
/// `dot(plane.xyz, p) + plane.w < 0`.
pub const SMART_CLIP_PLANE: [&str; SMART_CLIP_COUNT] = smart_clip_names!("plane");
/// `vec4` color per smart clip, used by the color target.
pub const SMART_CLIP_COLOR: [&str; SMART_CLIP_COUNT] = smart_clip_names!("color");
/// `float` per smart clip: distance over which the effect ramps in.
pub const SMART_CLIP_FADE: [&str; SMART_CLIP_COUNT] = smart_clip_names!("fade");

/// How an actor is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Filled polygons only.
    #[default]
    Polygons,
    /// Wireframe outline geometry only.
    Outline3D,
    /// Polygons with a wireframe outline peeled alongside.
    PolygonsAndOutline3D,
    /// Image-space silhouette only.
    Outline2D,
    /// Polygons with an image-space silhouette on top.
    PolygonsAndOutline2D,
}

impl RenderMode {
    /// Decode the `vivid.render_mode` integer. Unknown values draw polygons.
    #[must_use]
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Outline3D,
            2 => Self::PolygonsAndOutline3D,
            3 => Self::Outline2D,
            4 => Self::PolygonsAndOutline2D,
            _ => Self::Polygons,
        }
    }

    /// Filled triangles are drawn.
    #[must_use]
    pub fn draws_polygons(self) -> bool {
        matches!(
            self,
            Self::Polygons | Self::PolygonsAndOutline3D | Self::PolygonsAndOutline2D
        )
    }

    /// Wireframe outlines are drawn.
    #[must_use]
    pub fn draws_outline_geometry(self) -> bool {
        matches!(self, Self::Outline3D | Self::PolygonsAndOutline3D)
    }

    /// A 2D outline pass runs for the actor.
    #[must_use]
    pub fn draws_image_outline(self) -> bool {
        matches!(self, Self::Outline2D | Self::PolygonsAndOutline2D)
    }
}

/// The channel fog or a smart clip writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectTarget {
    /// Mix toward the effect color.
    #[default]
    Color,
    /// Fade out.
    Alpha,
    /// Desaturate.
    Saturation,
}

impl EffectTarget {
    /// Decode a target integer. Unknown values target color.
    #[must_use]
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Alpha,
            2 => Self::Saturation,
            _ => Self::Color,
        }
    }

    /// The integer the GLSL programs expect.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Color => 0,
            Self::Alpha => 1,
            Self::Saturation => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_mode_flags() {
        let modes = (0..6).map(RenderMode::from_i32).collect::<Vec<_>>();
        assert_eq!(modes[5], RenderMode::Polygons);
        assert!(modes[0].draws_polygons());
        assert!(!modes[1].draws_polygons() && modes[1].draws_outline_geometry());
        assert!(modes[2].draws_polygons() && modes[2].draws_outline_geometry());
        assert!(!modes[3].draws_polygons() && modes[3].draws_image_outline());
        assert!(modes[4].draws_polygons() && modes[4].draws_image_outline());
        assert!(!modes[4].draws_outline_geometry());
    }

    #[test]
    fn smart_clip_names_are_indexed() {
        assert_eq!(SMART_CLIP_TARGET[2], "vivid.smart_clip[2].target");
        assert_eq!(SMART_CLIP_FADE[3], "vivid.smart_clip[3].fade");
    }
}
