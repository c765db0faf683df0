use glam::Vec3;

use crate::{
    core::particles::Particles,
    error::{EvolutionError, Result},
    utils::allocator::ParticleHandle,
};

use super::{
    constraint_rule::{ConstraintRule, TickContext},
    solver_body::{SolverBody, SolverBodyIndex},
};

/// Keeps two particle-local anchors at a fixed distance.
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    pub particles: [ParticleHandle; 2],
    /// Anchors in each particle's actor frame.
    pub local_anchors: [Vec3; 2],
    pub rest_length: f32,
    /// Inverse stiffness; zero is rigid.
    pub compliance: f32,
    bodies: Option<[SolverBodyIndex; 2]>,
    lambda: f32,
}

impl DistanceJoint {
    pub fn new(particle0: ParticleHandle, particle1: ParticleHandle, rest_length: f32) -> Self {
        Self {
            particles: [particle0, particle1],
            local_anchors: [Vec3::ZERO; 2],
            rest_length,
            compliance: 0.0,
            bodies: None,
            lambda: 0.0,
        }
    }

    pub fn with_anchors(mut self, anchor0: Vec3, anchor1: Vec3) -> Self {
        self.local_anchors = [anchor0, anchor1];
        self
    }

    pub fn with_compliance(mut self, compliance: f32) -> Self {
        self.compliance = compliance;
        self
    }

    /// Current constraint error and its direction, from body 1 toward body 0.
    fn error(&self, body0: &SolverBody, body1: &SolverBody) -> (f32, Vec3, [Vec3; 2]) {
        let anchor0 = body0.world_point(self.local_anchors[0]);
        let anchor1 = body1.world_point(self.local_anchors[1]);
        let delta = anchor0 - anchor1;
        let length = delta.length();
        let direction = if length > 1e-6 { delta / length } else { Vec3::Y };
        (
            length - self.rest_length,
            direction,
            [anchor0 - body0.corrected_p(), anchor1 - body1.corrected_p()],
        )
    }

    /// One XPBD step. `projection` routes the correction into the projection
    /// deltas and ignores compliance.
    fn solve(
        &mut self,
        body0: &mut SolverBody,
        body1: &mut SolverBody,
        dt: f32,
        projection: bool,
        tolerance: f32,
    ) -> bool {
        let (error, direction, arms) = self.error(body0, body1);
        let angular0 = arms[0].cross(direction);
        let angular1 = arms[1].cross(direction);
        let response0 = body0.inv_i * angular0;
        let response1 = body1.inv_i * angular1;
        let weight = body0.inv_m + body1.inv_m + angular0.dot(response0) + angular1.dot(response1);

        let alpha = if projection || dt <= 0.0 {
            0.0
        } else {
            self.compliance / (dt * dt)
        };
        if weight + alpha <= f32::EPSILON {
            return false;
        }
        let lambda = if projection { 0.0 } else { self.lambda };
        let delta_lambda = (-error - alpha * lambda) / (weight + alpha);
        if !projection {
            self.lambda += delta_lambda;
        }

        let linear = direction * delta_lambda;
        let (dp0, dq0) = (linear * body0.inv_m, response0 * delta_lambda);
        let (dp1, dq1) = (-linear * body1.inv_m, -response1 * delta_lambda);
        if projection {
            body0.apply_projection_delta(dp0, dq0);
            body1.apply_projection_delta(dp1, dq1);
        } else {
            body0.apply_position_delta(dp0, dq0);
            body1.apply_position_delta(dp1, dq1);
        }
        error.abs() > tolerance
    }
}

/// Constraint rule for a set of distance joints.
#[derive(Debug, Default)]
pub struct DistanceJointRule {
    joints: Vec<DistanceJoint>,
    priority: i32,
}

impl DistanceJointRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a joint after checking that it refers to two live, distinct particles.
    pub fn add_joint(&mut self, particles: &Particles, joint: DistanceJoint) -> Result<usize> {
        for handle in joint.particles {
            if !particles.contains(handle) {
                return Err(EvolutionError::ParticleNotFound(handle));
            }
        }
        if joint.particles[0] == joint.particles[1] {
            return Err(EvolutionError::InvalidConstraint(format!(
                "distance joint connects particle {} to itself",
                joint.particles[0]
            )));
        }
        if !joint.rest_length.is_finite() || joint.rest_length < 0.0 {
            return Err(EvolutionError::InvalidConstraint(format!(
                "distance joint rest length {} must be finite and non-negative",
                joint.rest_length
            )));
        }
        if joint.compliance < 0.0 {
            return Err(EvolutionError::InvalidConstraint(
                "distance joint compliance must be non-negative".to_string(),
            ));
        }
        self.joints.push(joint);
        Ok(self.joints.len() - 1)
    }

    pub fn joints(&self) -> &[DistanceJoint] {
        &self.joints
    }

    fn solve_all(&mut self, ctx: &mut TickContext<'_>, dt: f32, projection: bool) -> bool {
        let tolerance = ctx.settings.solver.position_tolerance;
        let mut needs_more = false;
        for joint in &mut self.joints {
            let Some([a, b]) = joint.bodies else {
                continue;
            };
            // Projection ignores compliance, so soft joints sit it out.
            if projection && joint.compliance > 0.0 {
                continue;
            }
            let (body0, body1) = ctx.bodies.pair_mut(a, b);
            if !body0.is_dynamic() && !body1.is_dynamic() {
                continue;
            }
            needs_more |= joint.solve(body0, body1, dt, projection, tolerance);
        }
        needs_more
    }
}

impl ConstraintRule for DistanceJointRule {
    fn name(&self) -> &str {
        "distance_joints"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn prepare_tick(&mut self, ctx: &mut TickContext<'_>) {
        let before = self.joints.len();
        self.joints
            .retain(|joint| joint.particles.iter().all(|&handle| ctx.particles.contains(handle)));
        if self.joints.len() != before {
            log::debug!("dropped {} distance joints with removed particles", before - self.joints.len());
        }
    }

    fn num_constraints(&self, _ctx: &TickContext<'_>) -> usize {
        self.joints.len()
    }

    fn append_constraint_edges(&self, _ctx: &TickContext<'_>, edges: &mut Vec<(ParticleHandle, ParticleHandle)>) {
        edges.extend(self.joints.iter().map(|joint| (joint.particles[0], joint.particles[1])));
    }

    fn pre_gather_solver_input(&mut self, ctx: &mut TickContext<'_>) {
        for joint in &self.joints {
            for handle in joint.particles {
                ctx.bodies.find_or_add(handle, ctx.particles);
            }
        }
    }

    fn gather_solver_input(&mut self, ctx: &mut TickContext<'_>, _dt: f32) {
        for joint in &mut self.joints {
            joint.bodies = Some(joint.particles.map(|handle| ctx.bodies.expect_index(handle)));
            joint.lambda = 0.0;
        }
    }

    fn apply_constraints(
        &mut self,
        ctx: &mut TickContext<'_>,
        dt: f32,
        _iteration: u32,
        _num_iterations: u32,
    ) -> bool {
        self.solve_all(ctx, dt, false)
    }

    fn apply_projection(
        &mut self,
        ctx: &mut TickContext<'_>,
        dt: f32,
        _iteration: u32,
        _num_iterations: u32,
    ) -> bool {
        self.solve_all(ctx, dt, true)
    }

    fn scatter_solver_output(&mut self, _ctx: &mut TickContext<'_>, _dt: f32) {
        for joint in &mut self.joints {
            joint.bodies = None;
        }
    }
}
