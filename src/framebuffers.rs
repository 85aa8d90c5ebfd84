//! Off-screen render targets.
//!
//! A [`FramebufferSet`] owns five framebuffers:
//!
//! - two *front* targets (color + depth) that peeled layers ping-pong between,
//! - the *blender*, whose color accumulates layers front to back and whose
//!   depth attachment is front 0's depth texture,
//! - the *stencil* target (color only), used for the background mask and
//!   for 2D outline masks,
//! - the *depth-save* target (depth only), holding the init pass depth.
//!
//! Because the blender shares front 0's depth, the second peeled layer
//! overwrites the init depth. The depth-save copy is what gets restored into
//! the visible framebuffer.

use log::debug;

use crate::backend::{Backend, TextureDesc, TextureFormat};
use crate::error::Result;

/// The pair of front targets in use for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontBuffers {
    current: usize,
    previous: usize,
}

impl FrontBuffers {
    /// Buffers for peel layer `layer`: it writes front `layer % 2` and reads
    /// the other one.
    #[must_use]
    pub fn for_layer(layer: u32) -> Self {
        let current = usize::from(layer % 2 == 1);
        Self {
            current,
            previous: 1 - current,
        }
    }

    /// Index of the front target written by this layer.
    #[must_use]
    pub fn current(self) -> usize {
        self.current
    }

    /// Index of the front target holding the previous layer's depth.
    #[must_use]
    pub fn previous(self) -> usize {
        self.previous
    }

    /// Advance to the next layer.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
    }
}

/// A framebuffer with the textures attached to it.
pub struct RenderTarget<B: Backend> {
    /// Framebuffer name.
    pub framebuffer: B::Framebuffer,
    /// RGBA8 color attachment.
    pub color: Option<B::Texture>,
    /// Depth attachment, sampled by the next peel layer.
    pub depth: Option<B::Texture>,
}

impl<B: Backend> Clone for RenderTarget<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for RenderTarget<B> {}

/// Handles of every allocated target.
pub struct FrameTargets<B: Backend> {
    /// Ping-pong targets for peeled layers.
    pub front: [RenderTarget<B>; 2],
    /// Accumulated color and transmittance; depth is `front[0]`'s.
    pub blender: RenderTarget<B>,
    /// Color-only mask target.
    pub stencil: RenderTarget<B>,
    /// Depth-only copy of the init pass.
    pub depth_save: RenderTarget<B>,
}

impl<B: Backend> Clone for FrameTargets<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for FrameTargets<B> {}

/// Growth-only owner of the off-screen targets.
pub struct FramebufferSet<B: Backend> {
    /// Allocated size; `[0, 0]` until the first successful allocation.
    size: [u32; 2],
    targets: Option<FrameTargets<B>>,
}

impl<B: Backend> Default for FramebufferSet<B> {
    fn default() -> Self {
        Self {
            size: [0, 0],
            targets: None,
        }
    }
}

impl<B: Backend> FramebufferSet<B> {
    /// Size of the allocated textures.
    #[must_use]
    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Handles of the allocated targets, `None` until allocation succeeds.
    #[must_use]
    pub fn targets(&self) -> Option<FrameTargets<B>> {
        self.targets
    }

    /// Make sure the targets cover `target_size`.
    ///
    /// Reallocates only when `target_size` exceeds the allocated size in
    /// either axis, at the component-wise maximum of both. Returns whether
    /// anything was allocated. On failure nothing stays allocated and the
    /// next call tries again.
    pub fn ensure_size(&mut self, backend: &mut B, target_size: [u32; 2]) -> Result<bool> {
        let [w, h] = target_size;
        if self.targets.is_some() && w <= self.size[0] && h <= self.size[1] {
            return Ok(false);
        }

        let size = [w.max(self.size[0]), h.max(self.size[1])];
        self.delete_gl_buffers(backend);

        let mut textures = Vec::new();
        let mut framebuffers = Vec::new();
        match allocate(backend, size, &mut textures, &mut framebuffers) {
            Ok(targets) => {
                debug!("allocated compositing buffers at {}x{}", size[0], size[1]);
                self.targets = Some(targets);
                self.size = size;
                Ok(true)
            }
            Err(e) => {
                for framebuffer in framebuffers {
                    backend.delete_framebuffer(framebuffer);
                }
                for texture in textures {
                    backend.delete_texture(texture);
                }
                Err(e)
            }
        }
    }

    /// Delete every target. Safe to call repeatedly.
    pub fn delete_gl_buffers(&mut self, backend: &mut B) {
        let Some(t) = self.targets.take() else {
            return;
        };
        let all = [t.front[0], t.front[1], t.blender, t.stencil, t.depth_save];
        for target in all {
            backend.delete_framebuffer(target.framebuffer);
        }
        // Front 0 depth is shared with the blender, so collect from the
        // owners only.
        let textures = [
            t.front[0].color,
            t.front[0].depth,
            t.front[1].color,
            t.front[1].depth,
            t.blender.color,
            t.stencil.color,
            t.depth_save.depth,
        ];
        for texture in textures.into_iter().flatten() {
            backend.delete_texture(texture);
        }
        self.size = [0, 0];
    }
}

fn allocate<B: Backend>(
    backend: &mut B,
    size: [u32; 2],
    textures: &mut Vec<B::Texture>,
    framebuffers: &mut Vec<B::Framebuffer>,
) -> Result<FrameTargets<B>> {
    let mut texture = |backend: &mut B, format: TextureFormat| -> Result<B::Texture> {
        let t = backend.create_texture(&TextureDesc {
            format,
            size,
            pixels: None,
        })?;
        textures.push(t);
        Ok(t)
    };

    let front_color = [
        texture(backend, TextureFormat::Rgba8)?,
        texture(backend, TextureFormat::Rgba8)?,
    ];
    let front_depth = [
        texture(backend, TextureFormat::Depth24Stencil8)?,
        texture(backend, TextureFormat::Depth24Stencil8)?,
    ];
    let blender_color = texture(backend, TextureFormat::Rgba8)?;
    let stencil_color = texture(backend, TextureFormat::Rgba8)?;
    let saved_depth = texture(backend, TextureFormat::Depth24Stencil8)?;

    let mut target = |backend: &mut B,
                      color: Option<B::Texture>,
                      depth: Option<B::Texture>|
     -> Result<RenderTarget<B>> {
        let framebuffer = backend.create_framebuffer(color, depth)?;
        framebuffers.push(framebuffer);
        Ok(RenderTarget {
            framebuffer,
            color,
            depth,
        })
    };

    Ok(FrameTargets {
        front: [
            target(backend, Some(front_color[0]), Some(front_depth[0]))?,
            target(backend, Some(front_color[1]), Some(front_depth[1]))?,
        ],
        blender: target(backend, Some(blender_color), Some(front_depth[0]))?,
        stencil: target(backend, Some(stencil_color), None)?,
        depth_save: target(backend, None, Some(saved_depth))?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessBackend;

    #[test]
    fn front_buffers_alternate() {
        let mut f = FrontBuffers::for_layer(1);
        assert_eq!((f.current(), f.previous()), (1, 0));
        f.swap();
        assert_eq!(f, FrontBuffers::for_layer(2));
        assert_eq!((f.current(), f.previous()), (0, 1));
        f.swap();
        assert_eq!(f, FrontBuffers::for_layer(3));
    }

    #[test]
    fn blender_shares_front_zero_depth() {
        let mut backend = HeadlessBackend::new();
        let mut set = FramebufferSet::default();
        assert!(set.ensure_size(&mut backend, [8, 8]).unwrap());
        let t = set.targets().unwrap();
        assert_eq!(t.blender.depth, t.front[0].depth);
        assert_ne!(t.depth_save.depth, t.front[0].depth);
        assert!(t.stencil.depth.is_none() && t.depth_save.color.is_none());
        let counts = backend.counts();
        assert_eq!(counts.textures_created, 7);
        assert_eq!(counts.framebuffers_created, 5);
    }

    #[test]
    fn same_size_does_not_reallocate() {
        let mut backend = HeadlessBackend::new();
        let mut set = FramebufferSet::default();
        set.ensure_size(&mut backend, [8, 8]).unwrap();
        let before = backend.counts();
        assert!(!set.ensure_size(&mut backend, [8, 8]).unwrap());
        assert_eq!(backend.counts(), before);
    }

    #[test]
    fn grows_to_component_wise_max() {
        let mut backend = HeadlessBackend::new();
        let mut set = FramebufferSet::default();
        set.ensure_size(&mut backend, [16, 4]).unwrap();
        assert!(set.ensure_size(&mut backend, [8, 8]).unwrap());
        assert_eq!(set.size(), [16, 8]);
        assert!(!set.ensure_size(&mut backend, [16, 8]).unwrap());
        assert!(!set.ensure_size(&mut backend, [1, 1]).unwrap());
    }

    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let mut backend = HeadlessBackend::new();
        let mut set = FramebufferSet::default();
        set.ensure_size(&mut backend, [4, 4]).unwrap();
        backend.set_textures_fail(true);
        assert!(set.ensure_size(&mut backend, [8, 8]).is_err());
        assert!(set.targets().is_none());
        assert_eq!(set.size(), [0, 0]);
        assert_eq!(backend.live_objects(), 0);

        backend.set_textures_fail(false);
        assert!(set.ensure_size(&mut backend, [8, 8]).unwrap());
    }

    #[test]
    fn delete_is_idempotent() {
        let mut backend = HeadlessBackend::new();
        let mut set = FramebufferSet::default();
        set.ensure_size(&mut backend, [4, 4]).unwrap();
        set.delete_gl_buffers(&mut backend);
        set.delete_gl_buffers(&mut backend);
        let counts = backend.counts();
        assert_eq!(counts.textures_deleted, 7);
        assert_eq!(counts.framebuffers_deleted, 5);
        assert_eq!(backend.live_objects(), 0);
    }
}
