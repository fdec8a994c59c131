//! Drawable objects: shared geometry plus a per-instance transform and color.

use crate::color::Color;
use crate::model::Model;
use glam::{Mat3, Mat4, Vec3, Vec4};
use std::sync::Arc;

/// Translation, per-axis scale and Euler rotation (radians) of one object.
///
/// Rotation is applied Y, then X, then Z (Tait-Bryan YXZ).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformComponent {
    pub translation: Vec3,
    pub scale: Vec3,
    pub rotation: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl TransformComponent {
    /// `translate * Ry * Rx * Rz * scale`, expanded in closed form.
    pub fn mat4(&self) -> Mat4 {
        let (s1, c1) = self.rotation.y.sin_cos();
        let (s2, c2) = self.rotation.x.sin_cos();
        let (s3, c3) = self.rotation.z.sin_cos();
        let Vec3 { x: sx, y: sy, z: sz } = self.scale;

        Mat4::from_cols(
            Vec4::new(
                sx * (c1 * c3 + s1 * s2 * s3),
                sx * (c2 * s3),
                sx * (c1 * s2 * s3 - c3 * s1),
                0.0,
            ),
            Vec4::new(
                sy * (c3 * s1 * s2 - c1 * s3),
                sy * (c2 * c3),
                sy * (c1 * c3 * s2 + s1 * s3),
                0.0,
            ),
            Vec4::new(sz * (c2 * s1), sz * (-s2), sz * (c1 * c2), 0.0),
            self.translation.extend(1.0),
        )
    }

    /// Normal transform for [`Self::mat4`]: the same rotation with reciprocal scale.
    ///
    /// Scale components must be non-zero.
    pub fn normal_matrix(&self) -> Mat3 {
        let (s1, c1) = self.rotation.y.sin_cos();
        let (s2, c2) = self.rotation.x.sin_cos();
        let (s3, c3) = self.rotation.z.sin_cos();
        let inv = self.scale.recip();

        Mat3::from_cols(
            Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1) * inv.x,
            Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3) * inv.y,
            Vec3::new(c2 * s1, -s2, c1 * c2) * inv.z,
        )
    }
}

/// One renderable instance.
///
/// Without a model the drawable is valid but skipped by render systems.
#[derive(Debug, Clone, Default)]
pub struct Drawable {
    model: Option<Arc<Model>>,
    color: Color,
    transform: TransformComponent,
}

impl Drawable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<Model>) -> Self {
        Self::with_model_and_color(Some(model), Color::WHITE)
    }

    pub fn with_color(color: Color) -> Self {
        Self::with_model_and_color(None, color)
    }

    pub fn with_model_and_color(model: Option<Arc<Model>>, color: Color) -> Self {
        Self {
            model,
            color,
            transform: TransformComponent::default(),
        }
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn set_model(&mut self, model: Option<Arc<Model>>) {
        self.model = model;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn transform_component(&self) -> &TransformComponent {
        &self.transform
    }

    pub fn transform_component_mut(&mut self) -> &mut TransformComponent {
        &mut self.transform
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.transform.translation = translation;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.transform.rotation = rotation;
    }

    /// Model matrix.
    pub fn transform(&self) -> Mat4 {
        self.transform.mat4()
    }

    pub fn normal_matrix(&self) -> Mat3 {
        self.transform.normal_matrix()
    }
}
