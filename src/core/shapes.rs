use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{bounds::Aabb, types::Transform};

/// Collision geometry attached to a particle, expressed in the particle's frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f32 },
    /// Capsule with its segment along local Y.
    Capsule { radius: f32, half_height: f32 },
    Box { half_extents: Vec3 },
    /// Infinite plane through the particle origin.
    Plane { normal: Vec3 },
}

impl Shape {
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere { radius }
    }

    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Shape::Capsule {
            radius,
            half_height,
        }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Shape::Box { half_extents }
    }

    pub fn plane(normal: Vec3) -> Self {
        Shape::Plane {
            normal: normal.normalize_or(Vec3::Y),
        }
    }

    /// Shapes with a curved (quadratic) surface. Contacts involving them roll,
    /// so their dynamic friction belongs to the velocity phase.
    pub fn is_quadratic(&self) -> bool {
        matches!(self, Shape::Sphere { .. } | Shape::Capsule { .. })
    }

    pub fn is_bounded(&self) -> bool {
        !matches!(self, Shape::Plane { .. })
    }

    /// Local-space bounds; `None` for unbounded shapes.
    pub fn local_bounds(&self) -> Option<Aabb> {
        match *self {
            Shape::Sphere { radius } => Some(Aabb::from_center_extent(Vec3::ZERO, Vec3::splat(radius))),
            Shape::Capsule {
                radius,
                half_height,
            } => Some(Aabb::from_center_extent(
                Vec3::ZERO,
                Vec3::new(radius, half_height + radius, radius),
            )),
            Shape::Box { half_extents } => Some(Aabb::from_center_extent(Vec3::ZERO, half_extents)),
            Shape::Plane { .. } => None,
        }
    }

    pub fn world_bounds(&self, transform: &Transform) -> Option<Aabb> {
        self.local_bounds().map(|bounds| bounds.transformed(transform))
    }

    /// Corner points of a box, empty for other shapes.
    pub fn box_vertices(&self) -> Vec<Vec3> {
        match *self {
            Shape::Box { half_extents } => {
                let mut vertices = Vec::with_capacity(8);
                for &x in &[-1.0, 1.0] {
                    for &y in &[-1.0, 1.0] {
                        for &z in &[-1.0, 1.0] {
                            vertices.push(half_extents * Vec3::new(x, y, z));
                        }
                    }
                }
                vertices
            }
            _ => Vec::new(),
        }
    }

    /// Capsule segment end points in local space.
    pub fn capsule_segment(&self) -> Option<(Vec3, Vec3)> {
        match *self {
            Shape::Capsule { half_height, .. } => Some((
                Vec3::new(0.0, -half_height, 0.0),
                Vec3::new(0.0, half_height, 0.0),
            )),
            _ => None,
        }
    }
}
