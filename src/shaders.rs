//! GLSL sources of the seven compositing programs and their uniform slots.
//!
//! All shaders target GLSL 1.40 (OpenGL 3.1), which is widely supported on
//! desktop platforms. The four geometry programs share one vertex shader and
//! one fragment body, specialized with `#define`s; the three composite
//! programs draw a fullscreen quad.
//!
//! Composite programs read their inputs with `texelFetch` at
//! `gl_FragCoord`, so off-screen buffers may be larger than the target
//! without any texture-coordinate scaling.
//!
//! # Peel depth bias
//!
//! Peel targets store depth as 24-bit fixed point while `gl_FragCoord.z` is
//! a float, so the surface captured by the previous layer can read back a
//! little nearer than it rasterizes. The peel test therefore discards
//! everything up to [`PEEL_DEPTH_EPSILON`] behind the previous depth. Two
//! surfaces closer than one 24-bit step peel as one layer.

/// Attribute location of `a_position` in every program.
pub const ATTRIB_POSITION: u32 = 0;
/// Attribute location of `a_color` in the geometry programs.
pub const ATTRIB_COLOR: u32 = 1;
/// Attribute location of `a_normal` in the geometry programs.
pub const ATTRIB_NORMAL: u32 = 2;

/// One step of a 24-bit depth buffer, added to the previous layer's depth
/// before the peel test.
pub const PEEL_DEPTH_EPSILON: f32 = 1.0 / 16_777_215.0;

/// The fixed-purpose programs the renderer compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Image-space silhouette from a binary mask.
    Outline2D,
    /// Nearest layer into the blender, also used for forward and mask draws.
    FrontInit,
    /// Outline geometry variant of [`FrontInit`](Self::FrontInit).
    FrontInitOutline,
    /// Next layer behind the previous layer's depth.
    FrontPeel,
    /// Outline geometry variant of [`FrontPeel`](Self::FrontPeel).
    FrontPeelOutline,
    /// Copies a layer (or an image) into the bound framebuffer.
    FrontBlend,
    /// Resolves the blender onto the visible framebuffer.
    FrontFinal,
}

impl ProgramKind {
    /// Every program, in slot order.
    pub const ALL: [Self; 7] = [
        Self::Outline2D,
        Self::FrontInit,
        Self::FrontInitOutline,
        Self::FrontPeel,
        Self::FrontPeelOutline,
        Self::FrontBlend,
        Self::FrontFinal,
    ];

    /// Index into [`ALL`](Self::ALL).
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Outline2D => 0,
            Self::FrontInit => 1,
            Self::FrontInitOutline => 2,
            Self::FrontPeel => 3,
            Self::FrontPeelOutline => 4,
            Self::FrontBlend => 5,
            Self::FrontFinal => 6,
        }
    }

    /// Programs without which nothing can be composited.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Self::FrontInit | Self::FrontPeel | Self::FrontBlend | Self::FrontFinal
        )
    }

    /// Whether the program draws queue geometry (as opposed to a fullscreen
    /// quad).
    #[must_use]
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            Self::FrontInit | Self::FrontInitOutline | Self::FrontPeel | Self::FrontPeelOutline
        )
    }

    /// `FrontPeel` or its outline variant.
    #[must_use]
    pub fn is_peel(self) -> bool {
        matches!(self, Self::FrontPeel | Self::FrontPeelOutline)
    }

    /// Draws outline geometry as wireframe.
    #[must_use]
    pub fn is_outline_geometry(self) -> bool {
        matches!(self, Self::FrontInitOutline | Self::FrontPeelOutline)
    }

    /// Vertex and fragment source.
    #[must_use]
    pub fn sources(self) -> (String, String) {
        let defines = match self {
            Self::FrontInit => "",
            Self::FrontInitOutline => "#define OUTLINE\n",
            Self::FrontPeel => "#define PEEL\n",
            Self::FrontPeelOutline => "#define PEEL\n#define OUTLINE\n",
            Self::Outline2D => {
                return (QUAD_VERTEX_SRC.to_owned(), OUTLINE_2D_FRAGMENT_SRC.to_owned())
            }
            Self::FrontBlend => return (QUAD_VERTEX_SRC.to_owned(), BLEND_FRAGMENT_SRC.to_owned()),
            Self::FrontFinal => return (QUAD_VERTEX_SRC.to_owned(), FINAL_FRAGMENT_SRC.to_owned()),
        };
        let epsilon = if self.is_peel() {
            format!("#define PEEL_EPSILON {PEEL_DEPTH_EPSILON:e}\n")
        } else {
            String::new()
        };
        (
            GEOMETRY_VERTEX_SRC.to_owned(),
            format!("{GLSL_VERSION}{defines}{epsilon}{GEOMETRY_FRAGMENT_BODY}"),
        )
    }
}

/// Uniforms any program may declare. Resolved once per program at link time.
///
/// See [`name`](Self::name) for the GLSL identifier of each slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uniform {
    /// Model-to-world matrix.
    Model,
    /// World-to-eye matrix.
    View,
    /// Eye-to-clip matrix.
    Projection,
    /// Material color.
    Diffuse,
    /// Global opacity multiplier.
    Opacity,
    /// Non-zero enables the headlight.
    Lighting,
    /// One of [`output_mode`].
    OutputMode,
    /// Non-zero enables fog.
    FogEnabled,
    /// Fog [`EffectTarget`](crate::conventions::EffectTarget).
    FogTarget,
    /// Fog color.
    FogColor,
    /// Fog start and end distance.
    FogRange,
    /// Effect target per smart clip, `-1` when off.
    ClipTarget,
    /// Fade width per smart clip.
    ClipFade,
    /// Plane of smart clip 0.
    ClipPlane0,
    /// Plane of smart clip 1.
    ClipPlane1,
    /// Plane of smart clip 2.
    ClipPlane2,
    /// Plane of smart clip 3.
    ClipPlane3,
    /// Color of smart clip 0.
    ClipColor0,
    /// Color of smart clip 1.
    ClipColor1,
    /// Color of smart clip 2.
    ClipColor2,
    /// Color of smart clip 3.
    ClipColor3,
    /// Outline color.
    OutlineColor,
    /// Outline width in pixels.
    OutlineWidth,
    /// Sampler holding the previous layer's depth.
    PeelDepth,
    /// Primary input sampler of a composite.
    Source,
    /// Non-zero stretches `u_source` over the viewport.
    Normalized,
    /// Stencil mask sampler.
    Stencil,
    /// Non-zero applies the stencil mask.
    StencilEnabled,
    /// Soft edge radius of the mask.
    StencilSmoothness,
    /// Color outside the mask.
    StencilBackground,
    /// Non-zero leaves the outside transparent.
    BackgroundEnabled,
}

impl Uniform {
    /// Number of slots.
    pub const COUNT: usize = 31;

    /// Every uniform, in slot order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Model,
        Self::View,
        Self::Projection,
        Self::Diffuse,
        Self::Opacity,
        Self::Lighting,
        Self::OutputMode,
        Self::FogEnabled,
        Self::FogTarget,
        Self::FogColor,
        Self::FogRange,
        Self::ClipTarget,
        Self::ClipFade,
        Self::ClipPlane0,
        Self::ClipPlane1,
        Self::ClipPlane2,
        Self::ClipPlane3,
        Self::ClipColor0,
        Self::ClipColor1,
        Self::ClipColor2,
        Self::ClipColor3,
        Self::OutlineColor,
        Self::OutlineWidth,
        Self::PeelDepth,
        Self::Source,
        Self::Normalized,
        Self::Stencil,
        Self::StencilEnabled,
        Self::StencilSmoothness,
        Self::StencilBackground,
        Self::BackgroundEnabled,
    ];

    /// Clip plane slots, indexed by smart clip.
    pub const CLIP_PLANES: [Self; 4] = [
        Self::ClipPlane0,
        Self::ClipPlane1,
        Self::ClipPlane2,
        Self::ClipPlane3,
    ];

    /// Clip color slots, indexed by smart clip.
    pub const CLIP_COLORS: [Self; 4] = [
        Self::ClipColor0,
        Self::ClipColor1,
        Self::ClipColor2,
        Self::ClipColor3,
    ];

    /// Slot index.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// GLSL identifier.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Model => "u_model",
            Self::View => "u_view",
            Self::Projection => "u_projection",
            Self::Diffuse => "u_diffuse",
            Self::Opacity => "u_opacity",
            Self::Lighting => "u_lighting",
            Self::OutputMode => "u_output_mode",
            Self::FogEnabled => "u_fog_enabled",
            Self::FogTarget => "u_fog_target",
            Self::FogColor => "u_fog_color",
            Self::FogRange => "u_fog_range",
            Self::ClipTarget => "u_clip_target",
            Self::ClipFade => "u_clip_fade",
            Self::ClipPlane0 => "u_clip_plane[0]",
            Self::ClipPlane1 => "u_clip_plane[1]",
            Self::ClipPlane2 => "u_clip_plane[2]",
            Self::ClipPlane3 => "u_clip_plane[3]",
            Self::ClipColor0 => "u_clip_color[0]",
            Self::ClipColor1 => "u_clip_color[1]",
            Self::ClipColor2 => "u_clip_color[2]",
            Self::ClipColor3 => "u_clip_color[3]",
            Self::OutlineColor => "u_outline_color",
            Self::OutlineWidth => "u_outline_width",
            Self::PeelDepth => "u_peel_depth",
            Self::Source => "u_source",
            Self::Normalized => "u_normalized",
            Self::Stencil => "u_stencil",
            Self::StencilEnabled => "u_stencil_enabled",
            Self::StencilSmoothness => "u_stencil_smoothness",
            Self::StencilBackground => "u_stencil_background",
            Self::BackgroundEnabled => "u_background_enabled",
        }
    }
}

/// Values of `u_output_mode` in the init program.
pub mod output_mode {
    /// `(rgb * a, 1 - a)`: premultiplied color, transmittance in alpha.
    pub const LAYER: i32 = 0;
    /// Straight `(rgb, a)` for forward rendering.
    pub const STRAIGHT: i32 = 1;
    /// Opaque white, for binary masks.
    pub const MASK: i32 = 2;
}

/// Texture unit of the primary input of a pass.
pub const UNIT_SOURCE: u32 = 0;
/// Texture unit of the stencil mask in the final pass.
pub const UNIT_STENCIL: u32 = 1;

const GLSL_VERSION: &str = "#version 140\n";

/// Vertex shader shared by the geometry programs.
///
/// # Uniforms
///
/// | Name           | Type   | Description             |
/// |----------------|--------|-------------------------|
/// | `u_model`      | `mat4` | Model-to-world          |
/// | `u_view`       | `mat4` | World-to-eye            |
/// | `u_projection` | `mat4` | Eye-to-clip             |
pub const GEOMETRY_VERTEX_SRC: &str = r"#version 140

in vec3 a_position;
in vec4 a_color;
in vec3 a_normal;

uniform mat4 u_model;
uniform mat4 u_view;
uniform mat4 u_projection;

out vec4 v_color;
out vec3 v_normal_eye;
out vec3 v_position_eye;
out vec3 v_position_world;

void main() {
    vec4 world = u_model * vec4(a_position, 1.0);
    vec4 eye = u_view * world;

    v_color = a_color;
    v_normal_eye = mat3(u_view * u_model) * a_normal;
    v_position_eye = eye.xyz;
    v_position_world = world.xyz;

    gl_Position = u_projection * eye;
}
";

/// Fragment body shared by the geometry programs.
///
/// `PEEL` discards fragments up to `PEEL_EPSILON` behind `u_peel_depth` and writes
/// premultiplied color with coverage in alpha. Without it the output follows
/// `u_output_mode`. `OUTLINE` shades with `u_outline_color` instead of the
/// material.
const GEOMETRY_FRAGMENT_BODY: &str = r"
in vec4 v_color;
in vec3 v_normal_eye;
in vec3 v_position_eye;
in vec3 v_position_world;

uniform vec4 u_diffuse;
uniform float u_opacity;
uniform int u_lighting;

uniform int u_fog_enabled;
uniform int u_fog_target;
uniform vec4 u_fog_color;
uniform vec2 u_fog_range;

// Per smart clip: -1 when off, otherwise the effect target.
uniform ivec4 u_clip_target;
uniform vec4 u_clip_fade;
uniform vec4 u_clip_plane[4];
uniform vec4 u_clip_color[4];

#ifdef OUTLINE
uniform vec4 u_outline_color;
#endif

#ifdef PEEL
uniform sampler2D u_peel_depth;
#else
uniform int u_output_mode;
#endif

out vec4 frag_color;

vec4 apply_effect(vec4 color, int target, vec4 effect_color, float amount) {
    if (target == 0) {
        color.rgb = mix(color.rgb, effect_color.rgb, amount);
    } else if (target == 1) {
        color.a *= 1.0 - amount;
    } else {
        float luma = dot(color.rgb, vec3(0.299, 0.587, 0.114));
        color.rgb = mix(color.rgb, vec3(luma), amount);
    }
    return color;
}

vec4 shade() {
#ifdef OUTLINE
    vec4 color = u_outline_color;
#else
    vec4 color = u_diffuse * v_color;
    if (u_lighting != 0) {
        // Two-sided headlight.
        float ndotl = abs(dot(normalize(v_normal_eye), normalize(-v_position_eye)));
        color.rgb *= 0.2 + 0.8 * ndotl;
    }
#endif

    if (u_fog_enabled != 0) {
        float span = max(u_fog_range.y - u_fog_range.x, 1e-6);
        float amount = clamp((length(v_position_eye) - u_fog_range.x) / span, 0.0, 1.0);
        color = apply_effect(color, u_fog_target, u_fog_color, amount);
    }

    for (int i = 0; i < 4; ++i) {
        if (u_clip_target[i] < 0) {
            continue;
        }
        float dist = dot(u_clip_plane[i].xyz, v_position_world) + u_clip_plane[i].w;
        float amount = u_clip_fade[i] > 0.0
            ? clamp(-dist / u_clip_fade[i], 0.0, 1.0)
            : (dist < 0.0 ? 1.0 : 0.0);
        color = apply_effect(color, u_clip_target[i], u_clip_color[i], amount);
    }

    color.a *= u_opacity;
    return color;
}

void main() {
    vec4 color = shade();
#ifdef PEEL
    float nearer = texelFetch(u_peel_depth, ivec2(gl_FragCoord.xy), 0).r;
    if (gl_FragCoord.z <= nearer + PEEL_EPSILON) {
        discard;
    }
    frag_color = vec4(color.rgb * color.a, color.a);
#else
    if (u_output_mode == 1) {
        frag_color = color;
    } else if (u_output_mode == 2) {
        frag_color = vec4(1.0);
    } else {
        frag_color = vec4(color.rgb * color.a, 1.0 - color.a);
    }
#endif
}
";

/// Vertex shader for the fullscreen quad (`[-1, 1]` positions).
pub const QUAD_VERTEX_SRC: &str = r"#version 140

in vec2 a_position;

out vec2 v_uv;

void main() {
    v_uv = a_position * 0.5 + 0.5;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Copies `u_source` into the bound framebuffer.
///
/// With `u_normalized` the texture is stretched over the viewport (images,
/// stored top row first); otherwise texels map 1:1 to pixels.
pub const BLEND_FRAGMENT_SRC: &str = r"#version 140

in vec2 v_uv;

uniform sampler2D u_source;
uniform int u_normalized;

out vec4 frag_color;

void main() {
    if (u_normalized != 0) {
        frag_color = texture(u_source, vec2(v_uv.x, 1.0 - v_uv.y));
    } else {
        frag_color = texelFetch(u_source, ivec2(gl_FragCoord.xy), 0);
    }
}
";

/// Resolves the blender (premultiplied color, transmittance in alpha) to
/// straight alpha, and applies the stencil mask.
///
/// # Uniforms
///
/// | Name                   | Type        | Description                        |
/// |------------------------|-------------|------------------------------------|
/// | `u_source`             | `sampler2D` | Blender color                      |
/// | `u_stencil`            | `sampler2D` | Stencil mask (red channel)         |
/// | `u_stencil_enabled`    | `int`       | Use the mask                       |
/// | `u_stencil_smoothness` | `float`     | Soft edge radius in pixels         |
/// | `u_stencil_background` | `vec4`      | Color outside the mask             |
/// | `u_background_enabled` | `int`       | Leave the outside transparent      |
pub const FINAL_FRAGMENT_SRC: &str = r"#version 140

uniform sampler2D u_source;
uniform sampler2D u_stencil;
uniform int u_stencil_enabled;
uniform float u_stencil_smoothness;
uniform vec4 u_stencil_background;
uniform int u_background_enabled;

out vec4 frag_color;

float stencil_mask(ivec2 p) {
    if (u_stencil_enabled == 0) {
        return 1.0;
    }
    ivec2 hi = textureSize(u_stencil, 0) - 1;
    float sum = texelFetch(u_stencil, p, 0).r;
    if (u_stencil_smoothness <= 0.0) {
        return sum;
    }
    float weight = 1.0;
    for (int i = 0; i < 8; ++i) {
        float angle = float(i) * 0.7853982;
        for (int r = 1; r <= 2; ++r) {
            vec2 offset = vec2(cos(angle), sin(angle)) * u_stencil_smoothness * float(r) * 0.5;
            sum += texelFetch(u_stencil, clamp(p + ivec2(offset), ivec2(0), hi), 0).r;
            weight += 1.0;
        }
    }
    return sum / weight;
}

void main() {
    ivec2 p = ivec2(gl_FragCoord.xy);
    vec4 accum = texelFetch(u_source, p, 0);
    float alpha = 1.0 - accum.a;
    vec4 front = alpha > 0.0 ? vec4(accum.rgb / alpha, alpha) : vec4(0.0);
    vec4 outside = u_background_enabled != 0 ? vec4(0.0) : u_stencil_background;
    frag_color = mix(outside, front, stencil_mask(p));
}
";

/// Draws a line wherever the mask changes within `u_outline_width` pixels.
pub const OUTLINE_2D_FRAGMENT_SRC: &str = r"#version 140

uniform sampler2D u_source;
uniform vec4 u_outline_color;
uniform float u_outline_width;

out vec4 frag_color;

void main() {
    ivec2 p = ivec2(gl_FragCoord.xy);
    ivec2 hi = textureSize(u_source, 0) - 1;
    float center = texelFetch(u_source, p, 0).r;
    int radius = int(ceil(u_outline_width * 0.5));
    float edge = 0.0;
    for (int y = -radius; y <= radius; ++y) {
        for (int x = -radius; x <= radius; ++x) {
            float s = texelFetch(u_source, clamp(p + ivec2(x, y), ivec2(0), hi), 0).r;
            edge = max(edge, abs(s - center));
        }
    }
    frag_color = vec4(u_outline_color.rgb, u_outline_color.a * edge);
}
";
