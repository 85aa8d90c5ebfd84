//! Renderer configuration.
//!
//! [`VividSettings`] is plain data: it can be built in code or deserialized
//! from any serde format. Missing fields take their defaults.
//!
//! ```
//! use vivid_renderer::{RenderingMode, VividSettings};
//!
//! let settings = VividSettings {
//!     depth_peeling_passes: 3,
//!     rendering_mode: RenderingMode::DepthPeeling,
//!     ..Default::default()
//! };
//! assert_eq!(settings.max_layers(), 4);
//! ```

use serde::{Deserialize, Serialize};

/// Selects which compositing path [`VividRenderer::render`] runs.
///
/// [`VividRenderer::render`]: crate::VividRenderer::render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderingMode {
    /// Forward rendering straight into the visible framebuffer. Translucent
    /// geometry is blended in queue order, so it is only correct for sorted
    /// queues.
    FastRender,
    /// Stencil mask plus a single init pass composited through the final
    /// program. No peeling.
    StencilRender,
    /// Full order-independent transparency.
    #[default]
    DepthPeeling,
}

/// Options recognized by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VividSettings {
    /// Upper bound on peeling, as `(passes - 1) * 2` layers. Must be at least 1.
    pub depth_peeling_passes: u32,
    /// Stop peeling as soon as a layer produces no visible sample.
    pub use_query_object: bool,
    /// Active compositing path.
    pub rendering_mode: RenderingMode,
    /// Skip the peeling loop when the init pass saw no translucent actor.
    pub depth_peeling_auto_throttle: bool,
    /// Render the stencil mask and use it in the final composite.
    pub stencil_enabled: bool,
    /// Width in pixels of the soft edge of the stencil mask.
    pub stencil_smoothness: f32,
    /// Color shown outside the stencil mask.
    pub stencil_background: [f32; 4],
    /// Draw the background image (if one is installed) before compositing.
    pub background_image_enabled: bool,
    /// Renderer-wide opacity multiplied into every geometry draw.
    pub opacity: f32,
}

impl Default for VividSettings {
    fn default() -> Self {
        Self {
            depth_peeling_passes: 4,
            use_query_object: true,
            rendering_mode: RenderingMode::DepthPeeling,
            depth_peeling_auto_throttle: true,
            stencil_enabled: false,
            stencil_smoothness: 10.0,
            stencil_background: [1.0, 1.0, 1.0, 1.0],
            background_image_enabled: false,
            opacity: 1.0,
        }
    }
}

impl VividSettings {
    /// Number of layers the loop may reach when queries are off:
    /// `(depth_peeling_passes - 1) * 2`.
    #[must_use]
    pub fn max_layers(&self) -> u32 {
        self.depth_peeling_passes.saturating_sub(1).saturating_mul(2)
    }

    /// Clamp out-of-range values, logging what changed.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if self.depth_peeling_passes == 0 {
            log::warn!("depth_peeling_passes must be >= 1, using 1");
            self.depth_peeling_passes = 1;
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            log::warn!("opacity {} out of [0, 1], clamping", self.opacity);
            self.opacity = self.opacity.clamp(0.0, 1.0);
        }
        if self.stencil_smoothness.is_nan() || self.stencil_smoothness < 0.0 {
            log::warn!("stencil_smoothness {} is negative, using 0", self.stencil_smoothness);
            self.stencil_smoothness = 0.0;
        }
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn max_layers_follows_pass_count() {
        let mut s = VividSettings::default();
        for (passes, layers) in [(0, 0), (1, 0), (2, 2), (4, 6)] {
            s.depth_peeling_passes = passes;
            assert_eq!(s.max_layers(), layers, "passes = {passes}");
        }
    }

    #[test]
    fn sanitize_clamps_bad_values() {
        let s = VividSettings {
            depth_peeling_passes: 0,
            opacity: 3.0,
            stencil_smoothness: -2.0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(s.depth_peeling_passes, 1);
        assert!((s.opacity - 1.0).abs() < f32::EPSILON);
        assert!(s.stencil_smoothness.abs() < f32::EPSILON);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: VividSettings = serde_json::from_str(
            r#"{ "depth_peeling_passes": 6, "rendering_mode": "StencilRender" }"#,
        )
        .unwrap();
        assert_eq!(s.depth_peeling_passes, 6);
        assert_eq!(s.rendering_mode, RenderingMode::StencilRender);
        assert!(s.use_query_object);
        assert!(s.depth_peeling_auto_throttle);
    }
}
