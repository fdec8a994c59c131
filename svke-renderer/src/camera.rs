//! Projection and view matrices for Vulkan clip space (y down, depth 0..1).

use glam::{Mat4, Vec3, Vec4};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Mat4::from_cols(
            Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / (bottom - top), 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0 / (far - near), 0.0),
            Vec4::new(
                -(right + left) / (right - left),
                -(bottom + top) / (bottom - top),
                -near / (far - near),
                1.0,
            ),
        );
    }

    /// `fov_y` is in radians. `aspect` must be non-zero.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        if aspect.abs() <= f32::EPSILON {
            warn!("Ignoring perspective projection with zero aspect ratio.");
            return;
        }
        let tan_half_fov = (fov_y / 2.0).tan();
        self.projection = Mat4::from_cols(
            Vec4::new(1.0 / (aspect * tan_half_fov), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0 / tan_half_fov, 0.0, 0.0),
            Vec4::new(0.0, 0.0, far / (far - near), 1.0),
            Vec4::new(0.0, 0.0, -(far * near) / (far - near), 0.0),
        );
    }

    /// Looks from `position` along `direction`. `up` defaults to -Y in callers.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_view_basis(position, u, v, w);
    }

    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from a position and Euler angles applied in Y, X, Z order.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let (s3, c3) = rotation.z.sin_cos();
        let (s2, c2) = rotation.x.sin_cos();
        let (s1, c1) = rotation.y.sin_cos();
        let u = Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1);
        let v = Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3);
        let w = Vec3::new(c2 * s1, -s2, c1 * c2);
        self.set_view_basis(position, u, v, w);
    }

    fn set_view_basis(&mut self, position: Vec3, u: Vec3, v: Vec3, w: Vec3) {
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
        self.inverse_view = Mat4::from_cols(
            u.extend(0.0),
            v.extend(0.0),
            w.extend(0.0),
            position.extend(1.0),
        );
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// World-space camera position.
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let camera = Camera::new();
        assert_eq!(camera.projection() * camera.view(), Mat4::IDENTITY);
    }

    #[test]
    fn view_and_inverse_view_agree() {
        let mut camera = Camera::new();
        let eye = Vec3::new(1.0, -2.0, -5.0);
        camera.set_view_target(eye, Vec3::ZERO, Vec3::NEG_Y);
        assert!((camera.view() * camera.inverse_view()).abs_diff_eq(Mat4::IDENTITY, 1e-5));
        assert!(camera.position().abs_diff_eq(eye, 1e-5));

        let target_in_view = camera.view().transform_point3(Vec3::ZERO);
        assert!(target_in_view.x.abs() < 1e-5 && target_in_view.y.abs() < 1e-5);
        assert!(target_in_view.z > 0.0);
    }

    #[test]
    fn yxz_view_at_zero_rotation_is_translation() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(0.0, 0.0, -3.0), Vec3::ZERO);
        assert!(camera
            .view()
            .abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)), 1e-6));
    }

    #[test]
    fn perspective_maps_near_and_far_to_unit_depth_range() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(50f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);
        let near = camera.projection().project_point3(Vec3::new(0.0, 0.0, 0.1));
        let far = camera.projection().project_point3(Vec3::new(0.0, 0.0, 100.0));
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn orthographic_maps_box_to_clip_volume() {
        let mut camera = Camera::new();
        camera.set_orthographic_projection(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);
        let corner = camera.projection().transform_point3(Vec3::new(2.0, 1.0, 10.0));
        assert!(corner.abs_diff_eq(Vec3::new(1.0, 1.0, 1.0), 1e-6));
    }

    #[test]
    fn zero_aspect_keeps_previous_projection() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(1.0, 0.0, 0.1, 10.0);
        assert_eq!(camera.projection(), Mat4::IDENTITY);
    }
}
