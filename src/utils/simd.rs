//! Contact gather kernels.
//!
//! The scalar kernel works on `Vec3`; the vector kernel performs the same
//! operations on `Vec3A` so glam can keep every lane in a SIMD register. Both
//! produce the same values up to floating-point rounding.

use glam::{Quat, Vec3, Vec3A};

/// Shape-space inputs for one manifold point and the two body poses.
#[derive(Debug, Clone, Copy)]
pub struct ContactGatherInput {
    /// Actor-origin positions of both bodies.
    pub positions: [Vec3; 2],
    pub rotations: [Quat; 2],
    /// Centers of mass in world space.
    pub centers_of_mass: [Vec3; 2],
    pub shape_contact_points: [Vec3; 2],
    pub shape_anchor_points: [Vec3; 2],
    /// Normal in body 1's frame.
    pub shape_contact_normal: Vec3,
}

/// World-space geometry for one manifold point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatheredContact {
    pub world_contact_points: [Vec3; 2],
    pub world_anchor_points: [Vec3; 2],
    pub world_contact_normal: Vec3,
    /// Midpoint contact position relative to each center of mass.
    pub relative_contact_positions: [Vec3; 2],
}

impl GatheredContact {
    /// `c0 - c1` at the current pose.
    pub fn contact_delta(&self) -> Vec3 {
        self.world_contact_points[0] - self.world_contact_points[1]
    }

    /// Tangential drift of the contact away from where it was anchored.
    pub fn anchor_friction_delta(&self) -> Vec3 {
        (self.world_anchor_points[0] - self.world_contact_points[0])
            - (self.world_anchor_points[1] - self.world_contact_points[1])
    }
}

pub fn gather_contact(input: &ContactGatherInput) -> GatheredContact {
    let world = |body: usize, point: Vec3| input.positions[body] + input.rotations[body] * point;
    let c0 = world(0, input.shape_contact_points[0]);
    let c1 = world(1, input.shape_contact_points[1]);
    let midpoint = (c0 + c1) * 0.5;
    GatheredContact {
        world_contact_points: [c0, c1],
        world_anchor_points: [
            world(0, input.shape_anchor_points[0]),
            world(1, input.shape_anchor_points[1]),
        ],
        world_contact_normal: (input.rotations[1] * input.shape_contact_normal).normalize_or(Vec3::Y),
        relative_contact_positions: [
            midpoint - input.centers_of_mass[0],
            midpoint - input.centers_of_mass[1],
        ],
    }
}

pub fn gather_contact_vectorized(input: &ContactGatherInput) -> GatheredContact {
    let positions = input.positions.map(Vec3A::from);
    let world = |body: usize, point: Vec3| {
        positions[body] + input.rotations[body].mul_vec3a(Vec3A::from(point))
    };
    let c0 = world(0, input.shape_contact_points[0]);
    let c1 = world(1, input.shape_contact_points[1]);
    let a0 = world(0, input.shape_anchor_points[0]);
    let a1 = world(1, input.shape_anchor_points[1]);
    let midpoint = (c0 + c1) * 0.5;
    let normal = input
        .rotations[1]
        .mul_vec3a(Vec3A::from(input.shape_contact_normal))
        .normalize_or(Vec3A::Y);
    GatheredContact {
        world_contact_points: [c0.into(), c1.into()],
        world_anchor_points: [a0.into(), a1.into()],
        world_contact_normal: normal.into(),
        relative_contact_positions: [
            (midpoint - Vec3A::from(input.centers_of_mass[0])).into(),
            (midpoint - Vec3A::from(input.centers_of_mass[1])).into(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectorized_matches_scalar() {
        let input = ContactGatherInput {
            positions: [Vec3::new(0.3, 1.2, -0.4), Vec3::new(-1.0, 0.0, 2.0)],
            rotations: [
                Quat::from_rotation_y(0.7) * Quat::from_rotation_x(0.2),
                Quat::from_rotation_z(-0.3),
            ],
            centers_of_mass: [Vec3::new(0.3, 1.25, -0.4), Vec3::new(-1.0, 0.0, 2.0)],
            shape_contact_points: [Vec3::new(0.0, -0.5, 0.1), Vec3::new(0.2, 0.0, 0.0)],
            shape_anchor_points: [Vec3::new(0.05, -0.5, 0.1), Vec3::new(0.2, 0.0, 0.03)],
            shape_contact_normal: Vec3::Y,
        };
        let scalar = gather_contact(&input);
        let vector = gather_contact_vectorized(&input);
        for (a, b) in scalar
            .world_contact_points
            .iter()
            .chain(&scalar.world_anchor_points)
            .chain(&scalar.relative_contact_positions)
            .zip(
                vector
                    .world_contact_points
                    .iter()
                    .chain(&vector.world_anchor_points)
                    .chain(&vector.relative_contact_positions),
            )
        {
            assert!(a.abs_diff_eq(*b, 1e-5), "{a} != {b}");
        }
        assert!(scalar
            .world_contact_normal
            .abs_diff_eq(vector.world_contact_normal, 1e-5));
    }

    #[test]
    fn anchored_contact_has_no_friction_delta() {
        let input = ContactGatherInput {
            positions: [Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO],
            rotations: [Quat::IDENTITY; 2],
            centers_of_mass: [Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO],
            shape_contact_points: [Vec3::new(0.0, -0.5, 0.0), Vec3::ZERO],
            shape_anchor_points: [Vec3::new(0.0, -0.5, 0.0), Vec3::ZERO],
            shape_contact_normal: Vec3::Y,
        };
        let gathered = gather_contact(&input);
        assert_eq!(gathered.anchor_friction_delta(), Vec3::ZERO);
        assert_eq!(gathered.contact_delta(), Vec3::ZERO);
    }
}
