//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Lengths below this are treated as zero when normalizing.
pub const SMALL_NUMBER: f32 = 1.0e-8;

/// Squared-length threshold for the tangent basis fallback.
const TANGENT_BASIS_EPSILON: f32 = 1.0e-4;

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Integrates a rotation by an angular velocity over `dt` using the
/// first-order quaternion update `q' = q + 0.5 * [w, 0] * q * dt`.
pub fn integrate_rotation(rotation: Quat, angular: Vec3, dt: f32) -> Quat {
    let spin = Quat::from_xyzw(angular.x, angular.y, angular.z, 0.0) * rotation;
    let integrated = rotation + spin * (0.5 * dt);
    integrated.normalize()
}

/// Applies a small rotation vector (axis * angle) to a rotation.
pub fn apply_rotation_delta(rotation: Quat, delta: Vec3) -> Quat {
    if delta.length_squared() < SMALL_NUMBER {
        return rotation;
    }
    integrate_rotation(rotation, delta, 1.0)
}

/// Angular velocity that takes `from` to `to` in `dt` seconds.
pub fn angular_velocity(from: Quat, to: Quat, dt: f32) -> Vec3 {
    if dt <= SMALL_NUMBER {
        return Vec3::ZERO;
    }
    let mut delta = to * from.conjugate();
    // Shortest arc.
    if delta.w < 0.0 {
        delta = -delta;
    }
    Vec3::new(delta.x, delta.y, delta.z) * (2.0 / dt)
}

/// Builds a unit tangent pair orthogonal to `normal`.
///
/// Crosses with world up first; when the normal is (nearly) parallel to up the
/// cross product collapses and world X is used instead. A unit normal cannot
/// be parallel to both, so the fallback always yields a valid basis.
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    let mut tangent_u = normal.cross(Vec3::Y);
    if tangent_u.length_squared() < TANGENT_BASIS_EPSILON {
        tangent_u = normal.cross(Vec3::X);
    }
    let tangent_u = tangent_u.normalize();
    let tangent_v = normal.cross(tangent_u).normalize();
    (tangent_u, tangent_v)
}

/// World-space inverse inertia from a diagonal body-space inverse inertia.
pub fn world_inverse_inertia(rotation: Quat, inv_inertia_local: Vec3) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * Mat3::from_diagonal(inv_inertia_local) * r.transpose()
}
