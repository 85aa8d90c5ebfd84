//! Matrix uploads to GLSL programs.

use glam::Mat4;

use crate::backend::Backend;
use crate::programs::LinkedProgram;
use crate::shaders::Uniform;
use crate::types::{Camera, UniformValue};

/// Pushes the current view, projection and model matrices to a program.
///
/// Implemented for every [`Backend`]. There is no fixed-function matrix
/// stack: without a program nothing is uploaded.
pub trait MatrixBroadcast: Backend + Sized {
    /// Upload `u_view`/`u_projection` when `update_camera` and `u_model`
    /// when `update_transform`, into `program`.
    fn update_matrices(
        &mut self,
        update_camera: bool,
        update_transform: bool,
        program: Option<&LinkedProgram<Self>>,
        camera: &Camera,
        transform: &Mat4,
    );
}

impl<B: Backend> MatrixBroadcast for B {
    fn update_matrices(
        &mut self,
        update_camera: bool,
        update_transform: bool,
        program: Option<&LinkedProgram<Self>>,
        camera: &Camera,
        transform: &Mat4,
    ) {
        let Some(program) = program else {
            log::trace!("matrix update without a program ignored");
            return;
        };
        self.use_program(Some(program.handle));
        if update_camera {
            program.set(self, Uniform::View, UniformValue::Mat4(camera.view));
            program.set(self, Uniform::Projection, UniformValue::Mat4(camera.projection));
        }
        if update_transform {
            program.set(self, Uniform::Model, UniformValue::Mat4(*transform));
        }
    }
}
