use glam::Vec3;

use crate::core::{shapes::Shape, types::Transform};

use super::constraint::ContactPoint;

/// Maximum number of points kept in one manifold.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// Closed-form contact generation for the supported shape pairs.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Whether a pair must be swapped so that the higher-ranked shape is second.
    /// Generators only exist for the (lower, higher) ordering.
    pub fn should_swap(shape0: &Shape, shape1: &Shape) -> bool {
        Self::rank(shape0) > Self::rank(shape1)
    }

    fn rank(shape: &Shape) -> u8 {
        match shape {
            Shape::Sphere { .. } => 0,
            Shape::Capsule { .. } => 1,
            Shape::Box { .. } => 2,
            Shape::Plane { .. } => 3,
        }
    }

    /// All contacts closer than `cull_distance`, deepest first, capped at
    /// [`MAX_MANIFOLD_POINTS`]. Shapes must be in canonical order.
    pub fn generate(
        shape0: &Shape,
        pose0: &Transform,
        shape1: &Shape,
        pose1: &Transform,
        cull_distance: f32,
    ) -> Vec<ContactPoint> {
        let mut contacts = match (*shape0, *shape1) {
            (Shape::Sphere { radius: r0 }, Shape::Sphere { radius: r1 }) => {
                Self::sphere_sphere(pose0, r0, pose0.position, pose1, r1, pose1.position)
                    .into_iter()
                    .collect()
            }
            (Shape::Sphere { radius: r0 }, Shape::Capsule { radius: r1, .. }) => {
                let segment = shape1.capsule_segment().unwrap_or_default();
                let closest = closest_point_on_segment(
                    pose1.transform_point(segment.0),
                    pose1.transform_point(segment.1),
                    pose0.position,
                );
                Self::sphere_sphere(pose0, r0, pose0.position, pose1, r1, closest)
                    .into_iter()
                    .collect()
            }
            (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
                Self::sphere_box(pose0, radius, pose1, half_extents)
                    .into_iter()
                    .collect()
            }
            (Shape::Sphere { radius }, Shape::Plane { normal }) => {
                Self::point_plane(pose0, pose0.position, radius, pose1, normal)
                    .into_iter()
                    .collect()
            }
            (Shape::Capsule { radius, .. }, Shape::Plane { normal }) => {
                let (a, b) = shape0.capsule_segment().unwrap_or_default();
                [a, b]
                    .into_iter()
                    .filter_map(|end| {
                        Self::point_plane(pose0, pose0.transform_point(end), radius, pose1, normal)
                    })
                    .collect()
            }
            (Shape::Box { .. }, Shape::Plane { normal }) => shape0
                .box_vertices()
                .into_iter()
                .filter_map(|vertex| {
                    Self::point_plane(pose0, pose0.transform_point(vertex), 0.0, pose1, normal)
                })
                .collect(),
            _ => {
                log::trace!("no contact generator for {shape0:?} vs {shape1:?}");
                Vec::new()
            }
        };

        contacts.retain(|contact: &ContactPoint| contact.phi < cull_distance);
        contacts.sort_by(|a, b| a.phi.total_cmp(&b.phi));
        contacts.truncate(MAX_MANIFOLD_POINTS);
        contacts
    }

    /// Deepest contact whose shape-0 point is not already within `tolerance`
    /// of one of `existing`. Used to grow incremental manifolds.
    pub fn generate_next(
        shape0: &Shape,
        pose0: &Transform,
        shape1: &Shape,
        pose1: &Transform,
        cull_distance: f32,
        existing: &[ContactPoint],
        tolerance: f32,
    ) -> Option<ContactPoint> {
        if existing.len() >= MAX_MANIFOLD_POINTS {
            return None;
        }
        Self::generate(shape0, pose0, shape1, pose1, cull_distance)
            .into_iter()
            .find(|candidate| {
                existing.iter().all(|known| {
                    known.shape_contact_points[0].distance(candidate.shape_contact_points[0])
                        > tolerance
                })
            })
    }

    fn sphere_sphere(
        pose0: &Transform,
        radius0: f32,
        center0: Vec3,
        pose1: &Transform,
        radius1: f32,
        center1: Vec3,
    ) -> Option<ContactPoint> {
        let delta = center0 - center1;
        let distance = delta.length();
        let normal = if distance > 1e-6 { delta / distance } else { Vec3::Y };
        let phi = distance - radius0 - radius1;
        Some(contact_point(
            pose0,
            pose1,
            center0 - normal * radius0,
            center1 + normal * radius1,
            normal,
            phi,
        ))
    }

    fn sphere_box(
        pose0: &Transform,
        radius: f32,
        pose1: &Transform,
        half_extents: Vec3,
    ) -> Option<ContactPoint> {
        let center_local = pose1.inverse_transform_point(pose0.position);
        let clamped = center_local.clamp(-half_extents, half_extents);

        let (surface_local, normal_local, distance) = if clamped != center_local {
            let offset = center_local - clamped;
            let distance = offset.length();
            (clamped, offset / distance.max(1e-6), distance)
        } else {
            // Center inside the box: exit through the nearest face.
            let face_distance = half_extents - center_local.abs();
            let axis = if face_distance.x <= face_distance.y && face_distance.x <= face_distance.z {
                0
            } else if face_distance.y <= face_distance.z {
                1
            } else {
                2
            };
            let mut normal = Vec3::ZERO;
            normal[axis] = if center_local[axis] >= 0.0 { 1.0 } else { -1.0 };
            let mut surface = center_local;
            surface[axis] = half_extents[axis] * normal[axis];
            (surface, normal, -face_distance[axis])
        };

        let normal = pose1.transform_vector(normal_local);
        Some(contact_point(
            pose0,
            pose1,
            pose0.position - normal * radius,
            pose1.transform_point(surface_local),
            normal,
            distance - radius,
        ))
    }

    fn point_plane(
        pose0: &Transform,
        point: Vec3,
        radius: f32,
        pose1: &Transform,
        plane_normal: Vec3,
    ) -> Option<ContactPoint> {
        let normal = pose1.transform_vector(plane_normal);
        let distance = (point - pose1.position).dot(normal);
        Some(contact_point(
            pose0,
            pose1,
            point - normal * radius,
            point - normal * distance,
            normal,
            distance - radius,
        ))
    }
}

fn contact_point(
    pose0: &Transform,
    pose1: &Transform,
    world_point0: Vec3,
    world_point1: Vec3,
    world_normal: Vec3,
    phi: f32,
) -> ContactPoint {
    ContactPoint {
        shape_contact_points: [
            pose0.inverse_transform_point(world_point0),
            pose1.inverse_transform_point(world_point1),
        ],
        shape_contact_normal: pose1.inverse_transform_vector(world_normal),
        phi,
    }
}

pub fn closest_point_on_segment(a: Vec3, b: Vec3, point: Vec3) -> Vec3 {
    let ab = b - a;
    let length_sq = ab.length_squared();
    if length_sq < 1e-12 {
        return a;
    }
    let t = ((point - a).dot(ab) / length_sq).clamp(0.0, 1.0);
    a + ab * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Quat;

    #[test]
    fn sphere_resting_on_plane() {
        let sphere = Shape::sphere(0.5);
        let plane = Shape::plane(Vec3::Y);
        let contacts = NarrowPhase::generate(
            &sphere,
            &Transform::from_position(Vec3::new(1.0, 0.45, 0.0)),
            &plane,
            &Transform::default(),
            0.05,
        );
        assert_eq!(contacts.len(), 1);
        let contact = contacts[0];
        assert_relative_eq!(contact.phi, -0.05, epsilon = 1e-5);
        assert_relative_eq!(contact.shape_contact_points[0].y, -0.5, epsilon = 1e-5);
        assert_relative_eq!(contact.shape_contact_points[1].x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(contact.shape_contact_points[1].y, 0.0, epsilon = 1e-5);
        assert_eq!(contact.shape_contact_normal, Vec3::Y);
    }

    #[test]
    fn far_sphere_is_culled() {
        let contacts = NarrowPhase::generate(
            &Shape::sphere(0.5),
            &Transform::from_position(Vec3::new(0.0, 2.0, 0.0)),
            &Shape::plane(Vec3::Y),
            &Transform::default(),
            0.05,
        );
        assert!(contacts.is_empty());
    }

    #[test]
    fn box_on_plane_produces_four_points() {
        let contacts = NarrowPhase::generate(
            &Shape::cuboid(Vec3::splat(0.5)),
            &Transform::from_position(Vec3::new(0.0, 0.49, 0.0)),
            &Shape::plane(Vec3::Y),
            &Transform::default(),
            0.05,
        );
        assert_eq!(contacts.len(), 4);
        assert!(contacts.iter().all(|c| c.shape_contact_points[0].y < 0.0));
    }

    #[test]
    fn incremental_adds_unmatched_vertex() {
        let box_shape = Shape::cuboid(Vec3::splat(0.5));
        let pose0 = Transform::new(Vec3::new(0.0, 0.45, 0.0), Quat::from_rotation_z(0.01));
        let plane = Shape::plane(Vec3::Y);
        let first = NarrowPhase::generate_next(&box_shape, &pose0, &plane, &Transform::default(), 0.05, &[], 0.05)
            .expect("deepest vertex");
        let second = NarrowPhase::generate_next(
            &box_shape,
            &pose0,
            &plane,
            &Transform::default(),
            0.05,
            &[first],
            0.05,
        )
        .expect("second vertex");
        assert_ne!(first.shape_contact_points[0], second.shape_contact_points[0]);
        assert!(first.phi <= second.phi);
    }

    #[test]
    fn sphere_inside_box_exits_nearest_face() {
        let contacts = NarrowPhase::generate(
            &Shape::sphere(0.25),
            &Transform::from_position(Vec3::new(0.0, 0.9, 0.0)),
            &Shape::cuboid(Vec3::ONE),
            &Transform::default(),
            0.05,
        );
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].shape_contact_normal.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(contacts[0].phi, -0.35, epsilon = 1e-5);
    }

    #[test]
    fn swap_puts_plane_second() {
        assert!(NarrowPhase::should_swap(&Shape::plane(Vec3::Y), &Shape::sphere(1.0)));
        assert!(!NarrowPhase::should_swap(&Shape::sphere(1.0), &Shape::cuboid(Vec3::ONE)));
    }
}
