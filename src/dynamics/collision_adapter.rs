use crate::{
    collision::constraint::{CollisionConstraint, ConstraintSolverSink},
    config::SolverSettings,
    core::{particles::Particles, types::Transform},
    utils::{
        math::tangent_basis,
        simd::{gather_contact, gather_contact_vectorized, ContactGatherInput},
    },
};

use super::{
    contact_solver::{ContactSolver, ContactSolverMaterial, ContactSolverPoint},
    solver_body::{SolverBody, SolverBodyContainer, SolverBodyIndex},
};

/// Binds one collision constraint to its two solver bodies for a tick and
/// runs the gather, solve and scatter steps for it.
#[derive(Debug, Clone, Default)]
pub struct CollisionSolverAdapter {
    constraint_index: usize,
    bodies: Option<[SolverBodyIndex; 2]>,
    levels: [i32; 2],
    solver: ContactSolver,
}

impl CollisionSolverAdapter {
    /// Makes sure both particles of `constraint` have solver bodies.
    pub fn pre_gather_input(
        constraint: &CollisionConstraint,
        particles: &Particles,
        bodies: &mut SolverBodyContainer,
    ) {
        for handle in constraint.particles() {
            bodies.find_or_add(handle, particles);
        }
    }

    pub fn constraint_index(&self) -> usize {
        self.constraint_index
    }

    /// Bound body indices. Panics when called outside gather..scatter.
    pub fn body_indices(&self) -> [SolverBodyIndex; 2] {
        self.bodies.unwrap_or_else(|| {
            panic!(
                "collision adapter for constraint {} used without bound solver bodies",
                self.constraint_index
            )
        })
    }

    /// A constraint between one body and itself, or between two bodies that
    /// cannot move, has nothing to solve.
    pub fn is_solvable(&self, bodies: &SolverBodyContainer) -> bool {
        let [a, b] = self.body_indices();
        a != b && (bodies.get(a).is_dynamic() || bodies.get(b).is_dynamic())
    }

    pub fn num_points(&self) -> usize {
        self.solver.num_points()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn gather_input(
        &mut self,
        dt: f32,
        constraint_index: usize,
        constraint: &mut CollisionConstraint,
        level0: i32,
        level1: i32,
        bodies: &SolverBodyContainer,
        settings: &SolverSettings,
    ) {
        self.constraint_index = constraint_index;
        self.bodies = Some([
            bodies.expect_index(constraint.particle0()),
            bodies.expect_index(constraint.particle1()),
        ]);
        self.levels = [level0, level1];
        self.solver.reset(constraint.num_manifold_points());

        // Curved shapes roll, so their dynamic friction waits for the velocity phase.
        let (position_dynamic, velocity_dynamic) = if settings.num_position_friction_iterations > 0 {
            if constraint.is_quadratic() {
                (0.0, constraint.dynamic_friction)
            } else {
                (constraint.dynamic_friction, 0.0)
            }
        } else {
            (0.0, constraint.dynamic_friction)
        };
        self.solver.material = ContactSolverMaterial {
            stiffness: constraint.stiffness,
            static_friction: constraint.static_friction,
            position_dynamic_friction: position_dynamic,
            velocity_dynamic_friction: velocity_dynamic,
            restitution: constraint.restitution,
            restitution_velocity_threshold: constraint.restitution_threshold * dt,
        };

        let end = constraint.num_manifold_points();
        self.gather_manifold_points(dt, constraint, bodies, 0, end, settings.use_vector_gather);
    }

    /// Gathers manifold points `[begin, end)` without touching points gathered earlier.
    pub fn gather_manifold_points(
        &mut self,
        dt: f32,
        constraint: &mut CollisionConstraint,
        bodies: &SolverBodyContainer,
        begin: usize,
        end: usize,
        use_vector_gather: bool,
    ) {
        let [index0, index1] = self.body_indices();
        let (body0, body1) = (bodies.get(index0), bodies.get(index1));
        assert_eq!(
            begin,
            self.solver.num_points(),
            "manifold points must be gathered in order"
        );

        for manifold_point in &mut constraint.manifold_points_mut()[begin..end] {
            let input = ContactGatherInput {
                positions: [body0.actor_position(), body1.actor_position()],
                rotations: [body0.corrected_q(), body1.corrected_q()],
                centers_of_mass: [body0.corrected_p(), body1.corrected_p()],
                shape_contact_points: manifold_point.contact_point.shape_contact_points,
                shape_anchor_points: manifold_point.shape_anchor_points,
                shape_contact_normal: manifold_point.contact_point.shape_contact_normal,
            };
            let gathered = if use_vector_gather {
                gather_contact_vectorized(&input)
            } else {
                gather_contact(&input)
            };

            let normal = gathered.world_contact_normal;
            let (tangent_u, tangent_v) = tangent_basis(normal);
            let relative = gathered.relative_contact_positions;

            let friction_delta = if manifold_point.has_static_friction_anchor {
                gathered.anchor_friction_delta()
            } else {
                manifold_point.reseed_anchors();
                let velocity0 = body0.v + body0.w.cross(relative[0]);
                let velocity1 = body1.v + body1.w.cross(relative[1]);
                (velocity0 - velocity1) * dt
            };
            manifold_point.world_contact_normal = normal;

            let contact_delta = gathered.contact_delta();
            let tangent_delta = contact_delta + friction_delta;
            let errors = [
                contact_delta.dot(normal) - manifold_point.target_phi,
                tangent_delta.dot(tangent_u),
                tangent_delta.dot(tangent_v),
            ];
            self.solver.push_point(ContactSolverPoint::new(
                body0,
                body1,
                relative,
                [normal, tangent_u, tangent_v],
                errors,
            ));
        }
    }

    /// Corrected actor poses of both bodies for incremental re-detection.
    pub fn current_poses(&self, bodies: &SolverBodyContainer) -> [Transform; 2] {
        self.body_indices().map(|index| {
            let body = bodies.get(index);
            Transform::new(body.actor_position(), body.corrected_q())
        })
    }

    /// Inverse-mass multipliers. Under shock propagation the body lower in
    /// the stack is scaled by `inv_mass_scale`.
    pub fn shock_scales(&self, enabled: bool, inv_mass_scale: f32) -> [f32; 2] {
        if !enabled || self.levels[0] == self.levels[1] {
            [1.0, 1.0]
        } else if self.levels[0] < self.levels[1] {
            [inv_mass_scale, 1.0]
        } else {
            [1.0, inv_mass_scale]
        }
    }

    pub fn solve_position(
        &mut self,
        body0: &mut SolverBody,
        body1: &mut SolverBody,
        max_push_out: Option<f32>,
        with_friction: bool,
        scales: [f32; 2],
        tolerance: f32,
    ) -> bool {
        self.solver
            .solve_position(body0, body1, max_push_out, with_friction, scales, tolerance)
    }

    pub fn has_active_contact(&self) -> bool {
        self.solver.has_active_contact()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn solve_velocity(
        &mut self,
        body0: &mut SolverBody,
        body1: &mut SolverBody,
        dt: f32,
        with_friction: bool,
        scales: [f32; 2],
        tolerance: f32,
    ) -> bool {
        self.solver
            .solve_velocity(body0, body1, dt, with_friction, scales, tolerance)
    }

    pub fn solve_projection(
        &mut self,
        body0: &mut SolverBody,
        body1: &mut SolverBody,
        scales: [f32; 2],
        tolerance: f32,
    ) -> bool {
        self.solver.solve_projection(body0, body1, scales, tolerance)
    }

    /// Writes net push-out, net impulse and friction ratio back for each point.
    pub fn scatter_output(&self, _dt: f32, sink: &mut impl ConstraintSolverSink) {
        sink.reset_solver_results();
        for (index, point) in self.solver.points().iter().enumerate() {
            let [normal, tangent_u, tangent_v] = point.axes;
            let net_push_out = normal * point.net_push_out[0]
                + tangent_u * point.net_push_out[1]
                + tangent_v * point.net_push_out[2];
            let net_impulse = normal * point.net_impulse[0]
                + tangent_u * point.net_impulse[1]
                + tangent_v * point.net_impulse[2];
            sink.write_resolved_contact(index, net_impulse, net_push_out, point.static_friction_ratio);
        }
    }

    /// Drops the body bindings at the end of the tick.
    pub fn release(&mut self) {
        self.bodies = None;
    }
}
