//! Per-manifold-point working data and the position, velocity and projection
//! kernels for one contact constraint.
//!
//! Axis 0 is the contact normal (pointing from body 1 toward body 0), axes 1
//! and 2 the tangent basis. Errors are positive when separated along an axis.

use glam::Vec3;

use super::solver_body::SolverBody;

const NORMAL: usize = 0;
const TANGENT_U: usize = 1;
const TANGENT_V: usize = 2;

/// Solver-side state of one manifold point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactSolverPoint {
    /// Contact position relative to each body's center of mass.
    pub relative_contact_positions: [Vec3; 2],
    pub axes: [Vec3; 3],
    /// Position error on each axis with zero body displacement.
    pub base_errors: [f32; 3],
    pub initial_normal_velocity: f32,
    pub net_push_out: [f32; 3],
    pub net_impulse: [f32; 3],
    pub net_projection: f32,
    pub static_friction_ratio: f32,
    angular_responses: [[Vec3; 2]; 3],
    inv_mass_terms: [[f32; 2]; 3],
}

impl ContactSolverPoint {
    /// Builds the point from gathered geometry. `errors` are the position
    /// errors at the bodies' current state; the displacement already applied
    /// to the bodies is removed so later linearization stays consistent.
    pub fn new(
        body0: &SolverBody,
        body1: &SolverBody,
        relative_contact_positions: [Vec3; 2],
        axes: [Vec3; 3],
        errors: [f32; 3],
    ) -> Self {
        let mut point = Self {
            relative_contact_positions,
            axes,
            static_friction_ratio: 1.0,
            ..Default::default()
        };
        for (axis_index, axis) in axes.iter().enumerate() {
            for (body_index, body) in [body0, body1].into_iter().enumerate() {
                let arm = relative_contact_positions[body_index].cross(*axis);
                let response = body.inv_i * arm;
                point.angular_responses[axis_index][body_index] = response;
                point.inv_mass_terms[axis_index][body_index] = body.inv_m + arm.dot(response);
            }
        }
        let offsets = point.displacement_errors(body0, body1);
        for axis_index in 0..3 {
            point.base_errors[axis_index] = errors[axis_index] - offsets[axis_index];
        }
        point.initial_normal_velocity = point.relative_velocity(body0, body1).dot(axes[NORMAL]);
        point
    }

    fn displacement_errors(&self, body0: &SolverBody, body1: &SolverBody) -> [f32; 3] {
        let (dp0, dq0) = body0.displacement();
        let (dp1, dq1) = body1.displacement();
        let delta = (dp0 + dq0.cross(self.relative_contact_positions[0]))
            - (dp1 + dq1.cross(self.relative_contact_positions[1]));
        self.axes.map(|axis| delta.dot(axis))
    }

    /// Linearized position error on every axis at the bodies' current state.
    pub fn current_errors(&self, body0: &SolverBody, body1: &SolverBody) -> [f32; 3] {
        let offsets = self.displacement_errors(body0, body1);
        [
            self.base_errors[NORMAL] + offsets[NORMAL],
            self.base_errors[TANGENT_U] + offsets[TANGENT_U],
            self.base_errors[TANGENT_V] + offsets[TANGENT_V],
        ]
    }

    pub fn relative_velocity(&self, body0: &SolverBody, body1: &SolverBody) -> Vec3 {
        (body0.v + body0.w.cross(self.relative_contact_positions[0]))
            - (body1.v + body1.w.cross(self.relative_contact_positions[1]))
    }

    fn contact_mass(&self, axis: usize, scales: [f32; 2]) -> f32 {
        let terms = self.inv_mass_terms[axis];
        let inv = scales[0] * terms[0] + scales[1] * terms[1];
        if inv > f32::EPSILON {
            1.0 / inv
        } else {
            0.0
        }
    }

    /// Linear and angular changes for each body from a scalar along `axis`.
    fn deltas(
        &self,
        axis: usize,
        magnitude: f32,
        bodies: [&SolverBody; 2],
        scales: [f32; 2],
    ) -> [(Vec3, Vec3); 2] {
        let direction = self.axes[axis] * magnitude;
        let s0 = scales[0] * magnitude;
        let s1 = scales[1] * magnitude;
        [
            (
                direction * bodies[0].inv_m * scales[0],
                self.angular_responses[axis][0] * s0,
            ),
            (
                -direction * bodies[1].inv_m * scales[1],
                -self.angular_responses[axis][1] * s1,
            ),
        ]
    }
}

/// Friction, restitution and stiffness for one constraint's solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSolverMaterial {
    pub stiffness: f32,
    pub static_friction: f32,
    /// Dynamic friction applied in the position phase (zero when deferred).
    pub position_dynamic_friction: f32,
    /// Dynamic friction applied in the velocity phase (zero when handled by position).
    pub velocity_dynamic_friction: f32,
    pub restitution: f32,
    /// Approach speed below which restitution is ignored.
    pub restitution_velocity_threshold: f32,
}

impl Default for ContactSolverMaterial {
    fn default() -> Self {
        Self {
            stiffness: 1.0,
            static_friction: 0.0,
            position_dynamic_friction: 0.0,
            velocity_dynamic_friction: 0.0,
            restitution: 0.0,
            restitution_velocity_threshold: 0.0,
        }
    }
}

/// Numeric contact solver for the points of one constraint.
#[derive(Debug, Clone, Default)]
pub struct ContactSolver {
    points: Vec<ContactSolverPoint>,
    pub material: ContactSolverMaterial,
}

impl ContactSolver {
    pub fn reset(&mut self, capacity: usize) {
        self.points.clear();
        self.points.reserve(capacity);
        self.material = ContactSolverMaterial::default();
    }

    pub fn push_point(&mut self, point: ContactSolverPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[ContactSolverPoint] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// True while any point carries normal push-out, i.e. is in contact.
    pub fn has_active_contact(&self) -> bool {
        self.points.iter().any(|point| point.net_push_out[NORMAL] > 0.0)
    }

    /// One position iteration. Returns true while corrections exceed `tolerance`.
    /// `max_push_out` bounds the normal correction per iteration; `None` leaves it unbounded.
    pub fn solve_position(
        &mut self,
        body0: &mut SolverBody,
        body1: &mut SolverBody,
        max_push_out: Option<f32>,
        with_friction: bool,
        scales: [f32; 2],
        tolerance: f32,
    ) -> bool {
        let material = self.material;
        let mut needs_more = false;

        for point in &mut self.points {
            let errors = point.current_errors(body0, body1);
            let mut delta_normal = errors[NORMAL];
            if delta_normal >= 0.0 && point.net_push_out[NORMAL] <= 0.0 {
                continue;
            }
            if let Some(max_push_out) = max_push_out {
                delta_normal = delta_normal.max(-max_push_out);
            }

            let mut push_out = [0.0; 3];
            push_out[NORMAL] = -material.stiffness * delta_normal * point.contact_mass(NORMAL, scales);
            // Contacts push, never pull.
            if point.net_push_out[NORMAL] + push_out[NORMAL] < 0.0 {
                push_out[NORMAL] = -point.net_push_out[NORMAL];
            }
            point.net_push_out[NORMAL] += push_out[NORMAL];

            if with_friction && point.net_push_out[NORMAL] > 0.0 {
                let mut net_u = point.net_push_out[TANGENT_U]
                    - material.stiffness * errors[TANGENT_U] * point.contact_mass(TANGENT_U, scales);
                let mut net_v = point.net_push_out[TANGENT_V]
                    - material.stiffness * errors[TANGENT_V] * point.contact_mass(TANGENT_V, scales);
                let tangent_length = (net_u * net_u + net_v * net_v).sqrt();
                let max_static = material.static_friction * point.net_push_out[NORMAL];
                if tangent_length > max_static && tangent_length > f32::EPSILON {
                    let max_dynamic = material.position_dynamic_friction * point.net_push_out[NORMAL];
                    let scale = max_dynamic / tangent_length;
                    net_u *= scale;
                    net_v *= scale;
                    point.static_friction_ratio = (max_static / tangent_length).clamp(0.0, 1.0);
                } else {
                    point.static_friction_ratio = 1.0;
                }
                push_out[TANGENT_U] = net_u - point.net_push_out[TANGENT_U];
                push_out[TANGENT_V] = net_v - point.net_push_out[TANGENT_V];
                point.net_push_out[TANGENT_U] = net_u;
                point.net_push_out[TANGENT_V] = net_v;
            }

            for (axis, &magnitude) in push_out.iter().enumerate() {
                if magnitude == 0.0 {
                    continue;
                }
                let [(dp0, dq0), (dp1, dq1)] = point.deltas(axis, magnitude, [body0, body1], scales);
                body0.apply_position_delta(dp0, dq0);
                body1.apply_position_delta(dp1, dq1);
                needs_more |= magnitude.abs() > tolerance;
            }
        }
        needs_more
    }

    /// One velocity iteration: restitution plus optional dynamic friction.
    pub fn solve_velocity(
        &mut self,
        body0: &mut SolverBody,
        body1: &mut SolverBody,
        dt: f32,
        with_friction: bool,
        scales: [f32; 2],
        tolerance: f32,
    ) -> bool {
        let material = self.material;
        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let mut needs_more = false;

        for point in &mut self.points {
            if point.net_push_out[NORMAL] <= 0.0 {
                continue;
            }
            let relative_velocity = point.relative_velocity(body0, body1);

            let mut target_normal_velocity = 0.0;
            if material.restitution > 0.0
                && point.initial_normal_velocity < -material.restitution_velocity_threshold
            {
                target_normal_velocity = -material.restitution * point.initial_normal_velocity;
            }

            let mut impulse = [0.0; 3];
            let normal_velocity = relative_velocity.dot(point.axes[NORMAL]);
            impulse[NORMAL] =
                -(normal_velocity - target_normal_velocity) * point.contact_mass(NORMAL, scales);
            // May remove push-out velocity but not pull harder than that.
            let min_impulse = -point.net_push_out[NORMAL] * inv_dt;
            if point.net_impulse[NORMAL] + impulse[NORMAL] < min_impulse {
                impulse[NORMAL] = min_impulse - point.net_impulse[NORMAL];
            }
            point.net_impulse[NORMAL] += impulse[NORMAL];

            if with_friction && material.velocity_dynamic_friction > 0.0 {
                let mut net_u = point.net_impulse[TANGENT_U]
                    - relative_velocity.dot(point.axes[TANGENT_U]) * point.contact_mass(TANGENT_U, scales);
                let mut net_v = point.net_impulse[TANGENT_V]
                    - relative_velocity.dot(point.axes[TANGENT_V]) * point.contact_mass(TANGENT_V, scales);
                let max_friction = material.velocity_dynamic_friction
                    * (point.net_impulse[NORMAL] + point.net_push_out[NORMAL] * inv_dt).max(0.0);
                let tangent_length = (net_u * net_u + net_v * net_v).sqrt();
                if tangent_length > max_friction && tangent_length > f32::EPSILON {
                    let scale = max_friction / tangent_length;
                    net_u *= scale;
                    net_v *= scale;
                }
                impulse[TANGENT_U] = net_u - point.net_impulse[TANGENT_U];
                impulse[TANGENT_V] = net_v - point.net_impulse[TANGENT_V];
                point.net_impulse[TANGENT_U] = net_u;
                point.net_impulse[TANGENT_V] = net_v;
            }

            for (axis, &magnitude) in impulse.iter().enumerate() {
                if magnitude == 0.0 {
                    continue;
                }
                let [(dv0, dw0), (dv1, dw1)] = point.deltas(axis, magnitude, [body0, body1], scales);
                body0.apply_velocity_delta(dv0, dw0);
                body1.apply_velocity_delta(dv1, dw1);
                needs_more |= magnitude.abs() * dt > tolerance;
            }
        }
        needs_more
    }

    /// One projection iteration: normal-only position fix-up that leaves
    /// velocities untouched.
    pub fn solve_projection(
        &mut self,
        body0: &mut SolverBody,
        body1: &mut SolverBody,
        scales: [f32; 2],
        tolerance: f32,
    ) -> bool {
        let stiffness = self.material.stiffness;
        let mut needs_more = false;

        for point in &mut self.points {
            let delta_normal = point.current_errors(body0, body1)[NORMAL];
            if delta_normal >= 0.0 && point.net_projection <= 0.0 {
                continue;
            }
            let mut projection = -stiffness * delta_normal * point.contact_mass(NORMAL, scales);
            if point.net_projection + projection < 0.0 {
                projection = -point.net_projection;
            }
            if projection == 0.0 {
                continue;
            }
            point.net_projection += projection;
            point.net_push_out[NORMAL] += projection;

            let [(cp0, cq0), (cp1, cq1)] = point.deltas(NORMAL, projection, [body0, body1], scales);
            body0.apply_projection_delta(cp0, cq0);
            body1.apply_projection_delta(cp1, cq1);
            needs_more |= projection.abs() > tolerance;
        }
        needs_more
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{particle::Particle, types::MassProperties},
        utils::allocator::ParticleHandle,
    };

    fn bodies(penetration: f32) -> (SolverBody, SolverBody, ContactSolverPoint) {
        let ball = Particle::dynamic(Vec3::new(0.0, 0.5 - penetration, 0.0), MassProperties::solid_sphere(0.5, 1.0));
        let ground = Particle::fixed(Vec3::ZERO);
        let body0 = SolverBody::from_particle(ParticleHandle::new(1, 0), &ball);
        let body1 = SolverBody::from_particle(ParticleHandle::new(0, 0), &ground);
        let point = ContactSolverPoint::new(
            &body0,
            &body1,
            [Vec3::new(0.0, -0.5, 0.0), Vec3::ZERO],
            [Vec3::Y, Vec3::Z, Vec3::X],
            [-penetration, 0.0, 0.0],
        );
        (body0, body1, point)
    }

    #[test]
    fn position_solve_removes_penetration_monotonically() {
        let (mut body0, mut body1, point) = bodies(0.1);
        let mut solver = ContactSolver::default();
        solver.reset(1);
        solver.material.stiffness = 0.5;
        solver.push_point(point);

        let mut previous = -0.1f32;
        for _ in 0..10 {
            solver.solve_position(&mut body0, &mut body1, None, false, [1.0, 1.0], 1e-6);
            let error = solver.points()[0].current_errors(&body0, &body1)[0];
            assert!(error >= previous - 1e-6);
            assert!(error <= 1e-6);
            previous = error;
        }
        assert!(previous.abs() < 1e-3);
        assert_eq!(body1.dp, Vec3::ZERO);
    }

    #[test]
    fn max_push_out_limits_each_iteration() {
        let (mut body0, mut body1, point) = bodies(0.5);
        let mut solver = ContactSolver::default();
        solver.reset(1);
        solver.push_point(point);
        solver.solve_position(&mut body0, &mut body1, Some(0.01), false, [1.0, 1.0], 1e-6);
        assert!((body0.dp.y - 0.01).abs() < 1e-5);
    }

    #[test]
    fn zero_cap_blocks_push_out_and_none_is_unbounded() {
        let (mut body0, mut body1, point) = bodies(0.5);
        let mut solver = ContactSolver::default();
        solver.reset(1);
        solver.push_point(point);
        solver.solve_position(&mut body0, &mut body1, Some(0.0), false, [1.0, 1.0], 1e-6);
        assert_eq!(body0.dp, Vec3::ZERO);
        assert!(!solver.has_active_contact());

        solver.solve_position(&mut body0, &mut body1, None, false, [1.0, 1.0], 1e-6);
        assert!((body0.dp.y - 0.5).abs() < 1e-4);
        assert!(solver.has_active_contact());
    }

    #[test]
    fn zero_scale_freezes_lower_body() {
        let (mut body0, mut body1, point) = bodies(0.1);
        let mut solver = ContactSolver::default();
        solver.reset(1);
        solver.push_point(point);
        let needs_more = solver.solve_position(&mut body0, &mut body1, None, false, [0.0, 1.0], 1e-6);
        assert!(!needs_more);
        assert_eq!(body0.dp, Vec3::ZERO);
    }

    #[test]
    fn velocity_solve_stops_approach() {
        let (mut body0, mut body1, point) = bodies(0.01);
        let mut solver = ContactSolver::default();
        solver.reset(1);
        solver.push_point(point);
        solver.solve_position(&mut body0, &mut body1, None, false, [1.0, 1.0], 1e-6);
        body0.v = Vec3::new(0.0, -1.0, 0.0);
        solver.solve_velocity(&mut body0, &mut body1, 1.0 / 60.0, false, [1.0, 1.0], 1e-6);
        assert!(body0.v.y.abs() < 1e-5);
    }

    #[test]
    fn projection_does_not_change_velocity() {
        let (mut body0, mut body1, point) = bodies(0.05);
        body0.v = Vec3::new(0.0, -0.3, 0.0);
        let mut solver = ContactSolver::default();
        solver.reset(1);
        solver.push_point(point);
        solver.solve_projection(&mut body0, &mut body1, [1.0, 1.0], 1e-6);
        assert!(body0.cp.y > 0.0);
        assert_eq!(body0.v.y, -0.3);
    }
}
