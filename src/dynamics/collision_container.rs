use std::ops::Range;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{collision::constraint::CollisionConstraint, utils::allocator::ParticleHandle};

use super::{
    collision_adapter::CollisionSolverAdapter,
    constraint_rule::{ConstraintRule, TickContext},
    solver_body::{SolverBody, SolverBodyContainer, SolverBodyIndex},
};

/// True when `iteration` falls inside the trailing `window` of `num_iterations`.
pub fn in_trailing_window(iteration: u32, num_iterations: u32, window: u32) -> bool {
    window > 0 && iteration >= num_iterations.saturating_sub(window)
}

/// First iteration at which every non-empty trailing window has begun.
pub fn latest_window_start(num_iterations: u32, windows: &[u32]) -> Option<u32> {
    windows
        .iter()
        .filter(|&&window| window > 0)
        .map(|&window| num_iterations.saturating_sub(window))
        .max()
}

/// Constraint rule that solves every collision constraint produced by the
/// detector, one adapter per constraint.
#[derive(Debug, Default)]
pub struct CollisionSolverContainer {
    adapters: Vec<CollisionSolverAdapter>,
    /// Adapter slot of each constraint; adapters are reordered by color for parallel solves.
    slot_of_constraint: Vec<usize>,
    /// Adapter ranges whose members share no dynamic body.
    batches: Vec<Range<usize>>,
    requires_incremental: bool,
    parallel: bool,
    position_shock_propagation: bool,
    velocity_shock_propagation: bool,
}

impl CollisionSolverContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_adapters(&self) -> usize {
        self.adapters.len()
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn requires_incremental_collision_detection(&self) -> bool {
        self.requires_incremental
    }

    pub fn adapters(&self) -> &[CollisionSolverAdapter] {
        &self.adapters
    }

    /// Early exit is only allowed once the friction and shock windows have
    /// started, as long as something is still in contact.
    fn awaiting_window(&self, iteration: u32, num_iterations: u32, windows: &[u32]) -> bool {
        latest_window_start(num_iterations, windows).is_some_and(|start| iteration < start)
            && self.adapters.iter().any(CollisionSolverAdapter::has_active_contact)
    }

    /// Greedy coloring over dynamic bodies; static and kinematic bodies are
    /// never written by the solver so they may be shared within a batch.
    fn build_color_batches(&mut self, bodies: &SolverBodyContainer) {
        let mut body_colors: Vec<Vec<usize>> = vec![Vec::new(); bodies.len()];
        let mut colors = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let dynamic: Vec<SolverBodyIndex> = adapter
                .body_indices()
                .into_iter()
                .filter(|&index| bodies.get(index).is_dynamic())
                .collect();
            let color = find_free_color(&body_colors, &dynamic);
            for index in dynamic {
                body_colors[index.index()].push(color);
            }
            colors.push(color);
        }

        let mut order: Vec<usize> = (0..self.adapters.len()).collect();
        order.sort_by_key(|&slot| colors[slot]);
        let mut previous = std::mem::take(&mut self.adapters);
        self.adapters = order
            .iter()
            .map(|&slot| std::mem::take(&mut previous[slot]))
            .collect();

        self.batches.clear();
        let mut start = 0;
        for slot in 1..=order.len() {
            if slot == order.len() || colors[order[slot]] != colors[order[start]] {
                self.batches.push(start..slot);
                start = slot;
            }
        }
        for (slot, adapter) in self.adapters.iter().enumerate() {
            self.slot_of_constraint[adapter.constraint_index()] = slot;
        }
    }

    fn solve<F>(&mut self, bodies: &mut SolverBodyContainer, f: F) -> bool
    where
        F: Fn(&mut CollisionSolverAdapter, &mut SolverBody, &mut SolverBody) -> bool + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                return self.solve_batched(bodies, f);
            }
        }
        self.solve_serial(bodies, f)
    }

    fn solve_serial<F>(&mut self, bodies: &mut SolverBodyContainer, f: F) -> bool
    where
        F: Fn(&mut CollisionSolverAdapter, &mut SolverBody, &mut SolverBody) -> bool,
    {
        let mut needs_more = false;
        for adapter in &mut self.adapters {
            if !adapter.is_solvable(bodies) {
                continue;
            }
            let [a, b] = adapter.body_indices();
            let (body0, body1) = bodies.pair_mut(a, b);
            needs_more |= f(adapter, body0, body1);
        }
        needs_more
    }

    /// Each batch solves in parallel against private body copies; the
    /// updated dynamic bodies are written back once the batch has joined.
    #[cfg(feature = "parallel")]
    fn solve_batched<F>(&mut self, bodies: &mut SolverBodyContainer, f: F) -> bool
    where
        F: Fn(&mut CollisionSolverAdapter, &mut SolverBody, &mut SolverBody) -> bool + Sync,
    {
        let mut needs_more = false;
        for batch in 0..self.batches.len() {
            let range = self.batches[batch].clone();
            let shared: &SolverBodyContainer = bodies;
            let results: Vec<([SolverBodyIndex; 2], [SolverBody; 2], bool)> = self.adapters[range]
                .par_iter_mut()
                .filter_map(|adapter| {
                    if !adapter.is_solvable(shared) {
                        return None;
                    }
                    let [a, b] = adapter.body_indices();
                    let (mut body0, mut body1) = (*shared.get(a), *shared.get(b));
                    let more = f(adapter, &mut body0, &mut body1);
                    Some(([a, b], [body0, body1], more))
                })
                .collect();

            for ([a, b], [body0, body1], more) in results {
                if body0.is_dynamic() {
                    *bodies.get_mut(a) = body0;
                }
                if body1.is_dynamic() {
                    *bodies.get_mut(b) = body1;
                }
                needs_more |= more;
            }
        }
        needs_more
    }

    /// Serial position solve that grows incremental manifolds before solving them.
    #[allow(clippy::too_many_arguments)]
    fn solve_position_incremental(
        &mut self,
        ctx: &mut TickContext<'_>,
        dt: f32,
        max_push_out: Option<f32>,
        with_friction: bool,
        shock: bool,
        inv_mass_scale: f32,
        tolerance: f32,
    ) -> bool {
        let use_vector_gather = ctx.settings.solver.use_vector_gather;
        let mut needs_more = false;
        for adapter in &mut self.adapters {
            if !adapter.is_solvable(ctx.bodies) {
                continue;
            }
            let constraint_index = adapter.constraint_index();
            let incremental = ctx
                .collisions
                .collision_container()
                .get(constraint_index)
                .is_some_and(|constraint| constraint.use_incremental_collision_detection());
            if incremental {
                let [pose0, pose1] = adapter.current_poses(ctx.bodies);
                let begin = adapter.num_points();
                if ctx.collisions.update_constraint(constraint_index, &pose0, &pose1, dt) {
                    let constraint = ctx
                        .collisions
                        .collision_container_mut()
                        .get_mut(constraint_index)
                        .unwrap_or_else(|| panic!("collision constraint {constraint_index} vanished mid-solve"));
                    let end = constraint.num_manifold_points();
                    adapter.gather_manifold_points(dt, constraint, ctx.bodies, begin, end, use_vector_gather);
                    needs_more = true;
                }
            }

            let scales = adapter.shock_scales(shock, inv_mass_scale);
            let [a, b] = adapter.body_indices();
            let (body0, body1) = ctx.bodies.pair_mut(a, b);
            needs_more |= adapter.solve_position(body0, body1, max_push_out, with_friction, scales, tolerance);
        }
        needs_more
    }
}

fn find_free_color(body_colors: &[Vec<usize>], bodies: &[SolverBodyIndex]) -> usize {
    let mut color = 0;
    while bodies
        .iter()
        .any(|index| body_colors[index.index()].contains(&color))
    {
        color += 1;
    }
    color
}

impl ConstraintRule for CollisionSolverContainer {
    fn name(&self) -> &str {
        "collisions"
    }

    fn num_constraints(&self, ctx: &TickContext<'_>) -> usize {
        ctx.collisions.collision_container().len()
    }

    fn append_constraint_edges(&self, ctx: &TickContext<'_>, edges: &mut Vec<(ParticleHandle, ParticleHandle)>) {
        edges.extend(
            ctx.collisions
                .collision_container()
                .iter()
                .map(|constraint| (constraint.particle0(), constraint.particle1())),
        );
    }

    fn pre_gather_solver_input(&mut self, ctx: &mut TickContext<'_>) {
        let constraints = ctx.collisions.collision_container();
        // Sized once per tick; gather hands out slots that must stay valid until scatter.
        self.adapters.clear();
        self.adapters
            .resize_with(constraints.len(), CollisionSolverAdapter::default);
        self.requires_incremental = constraints
            .iter()
            .any(|constraint| constraint.use_incremental_collision_detection());
        for constraint in constraints.iter() {
            CollisionSolverAdapter::pre_gather_input(constraint, ctx.particles, ctx.bodies);
        }
    }

    fn gather_solver_input(&mut self, ctx: &mut TickContext<'_>, dt: f32) {
        let settings = ctx.settings.solver;
        self.parallel = cfg!(feature = "parallel") && settings.parallel && !self.requires_incremental;
        self.position_shock_propagation = false;
        self.velocity_shock_propagation = false;

        let bodies: &SolverBodyContainer = ctx.bodies;
        let constraints = ctx.collisions.collision_container_mut().as_mut_slice();
        assert_eq!(
            constraints.len(),
            self.adapters.len(),
            "collision constraints changed between pre-gather and gather"
        );

        let gather = |(index, (adapter, constraint)): (
            usize,
            (&mut CollisionSolverAdapter, &mut CollisionConstraint),
        )| {
            let level0 = bodies.get(bodies.expect_index(constraint.particle0())).level;
            let level1 = bodies.get(bodies.expect_index(constraint.particle1())).level;
            adapter.gather_input(dt, index, constraint, level0, level1, bodies, &settings);
        };

        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                self.adapters
                    .par_iter_mut()
                    .zip(constraints.par_iter_mut())
                    .enumerate()
                    .for_each(gather);
            } else {
                self.adapters.iter_mut().zip(constraints.iter_mut()).enumerate().for_each(gather);
            }
        }
        #[cfg(not(feature = "parallel"))]
        self.adapters.iter_mut().zip(constraints.iter_mut()).enumerate().for_each(gather);

        self.slot_of_constraint = (0..self.adapters.len()).collect();
        self.batches = vec![0..self.adapters.len()];
        if self.parallel {
            self.build_color_batches(bodies);
        }
        log::trace!(
            "gathered {} collision adapters in {} batches (incremental: {})",
            self.adapters.len(),
            self.batches.len(),
            self.requires_incremental
        );
    }

    fn apply_constraints(
        &mut self,
        ctx: &mut TickContext<'_>,
        dt: f32,
        iteration: u32,
        num_iterations: u32,
    ) -> bool {
        let settings = ctx.settings.solver;
        // A zero max push-out velocity disables the cap.
        let max_push_out = (settings.max_push_out_velocity > 0.0 && num_iterations > 0)
            .then(|| settings.max_push_out_velocity * dt / num_iterations as f32);
        let with_friction =
            in_trailing_window(iteration, num_iterations, settings.num_position_friction_iterations);
        if settings.num_position_shock_propagation_iterations > 0
            && iteration == num_iterations.saturating_sub(settings.num_position_shock_propagation_iterations)
        {
            self.position_shock_propagation = true;
        }
        let shock = self.position_shock_propagation;
        let inv_mass_scale = settings.shock_propagation_inv_mass_scale;
        let tolerance = settings.position_tolerance;

        let needs_more = if self.requires_incremental {
            self.solve_position_incremental(
                ctx,
                dt,
                max_push_out,
                with_friction,
                shock,
                inv_mass_scale,
                tolerance,
            )
        } else {
            self.solve(ctx.bodies, |adapter, body0, body1| {
                let scales = adapter.shock_scales(shock, inv_mass_scale);
                adapter.solve_position(body0, body1, max_push_out, with_friction, scales, tolerance)
            })
        };
        needs_more
            || self.awaiting_window(
                iteration,
                num_iterations,
                &[
                    settings.num_position_friction_iterations,
                    settings.num_position_shock_propagation_iterations,
                ],
            )
    }

    fn apply_push_out(
        &mut self,
        ctx: &mut TickContext<'_>,
        dt: f32,
        iteration: u32,
        num_iterations: u32,
    ) -> bool {
        let settings = ctx.settings.solver;
        let with_friction =
            in_trailing_window(iteration, num_iterations, settings.num_velocity_friction_iterations);
        let shock_start =
            num_iterations.saturating_sub(settings.num_velocity_shock_propagation_iterations);
        if iteration == 0 {
            self.velocity_shock_propagation = false;
        }
        if settings.num_velocity_shock_propagation_iterations > 0 && iteration == shock_start {
            self.velocity_shock_propagation = true;
        }
        let shock = self.velocity_shock_propagation;
        let inv_mass_scale = settings.shock_propagation_inv_mass_scale;
        let tolerance = settings.position_tolerance;

        let needs_more = self.solve(ctx.bodies, |adapter, body0, body1| {
            let scales = adapter.shock_scales(shock, inv_mass_scale);
            adapter.solve_velocity(body0, body1, dt, with_friction, scales, tolerance)
        });
        needs_more
            || self.awaiting_window(
                iteration,
                num_iterations,
                &[
                    settings.num_velocity_friction_iterations,
                    settings.num_velocity_shock_propagation_iterations,
                ],
            )
    }

    fn apply_projection(
        &mut self,
        ctx: &mut TickContext<'_>,
        _dt: f32,
        _iteration: u32,
        _num_iterations: u32,
    ) -> bool {
        let settings = ctx.settings.solver;
        let shock = settings.num_position_shock_propagation_iterations > 0;
        let inv_mass_scale = settings.shock_propagation_inv_mass_scale;
        let tolerance = settings.position_tolerance;

        self.solve(ctx.bodies, |adapter, body0, body1| {
            let scales = adapter.shock_scales(shock, inv_mass_scale);
            adapter.solve_projection(body0, body1, scales, tolerance)
        })
    }

    fn scatter_solver_output(&mut self, ctx: &mut TickContext<'_>, dt: f32) {
        let constraints = ctx.collisions.collision_container_mut().as_mut_slice();
        let adapters = &self.adapters;
        let slots = &self.slot_of_constraint;

        #[cfg(feature = "parallel")]
        {
            if self.parallel {
                constraints
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(index, constraint)| adapters[slots[index]].scatter_output(dt, constraint));
            } else {
                for (index, constraint) in constraints.iter_mut().enumerate() {
                    adapters[slots[index]].scatter_output(dt, constraint);
                }
            }
        }
        #[cfg(not(feature = "parallel"))]
        for (index, constraint) in constraints.iter_mut().enumerate() {
            adapters[slots[index]].scatter_output(dt, constraint);
        }

        for adapter in &mut self.adapters {
            adapter.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collision::detector::{BasicCollisionDetector, CollisionDetector},
        config::EvolutionSettings,
        core::{particle::Particle, particles::Particles, shapes::Shape, types::MassProperties},
        dynamics::island::compute_levels,
    };
    use approx::assert_relative_eq;
    use glam::Vec3;

    const DT: f32 = 1.0 / 60.0;
    const OVERLAP: f32 = 0.02;

    /// Ground plane under three unit spheres, each sunk `OVERLAP` into the one below.
    fn overlapping_stack() -> (Particles, [ParticleHandle; 3]) {
        let mut particles = Particles::new();
        particles.insert(Particle::fixed(Vec3::ZERO).with_shape(Shape::plane(Vec3::Y)));
        let stack = [0, 1, 2].map(|level| {
            let y = 0.5 - OVERLAP + level as f32 * (1.0 - OVERLAP);
            particles.insert(
                Particle::dynamic(Vec3::new(0.0, y, 0.0), MassProperties::solid_sphere(0.5, 1.0))
                    .with_shape(Shape::sphere(0.5)),
            )
        });
        (particles, stack)
    }

    /// Runs the position phase over the stack, returning each iteration's
    /// "needs more" answer and the final vertical correction per sphere.
    fn solve_stack_positions(settings: &EvolutionSettings) -> (Vec<bool>, [f32; 3]) {
        let (particles, stack) = overlapping_stack();
        let mut detector = BasicCollisionDetector::default();
        let mut bodies = SolverBodyContainer::new();
        let mut container = CollisionSolverContainer::new();
        let mut ctx = TickContext {
            particles: &particles,
            bodies: &mut bodies,
            collisions: &mut detector,
            settings,
        };

        ctx.collisions.detect_collisions(ctx.particles, DT);
        assert_eq!(container.num_constraints(&ctx), 3);
        ctx.bodies.reset(6);
        container.pre_gather_solver_input(&mut ctx);
        let mut edges = Vec::new();
        container.append_constraint_edges(&ctx, &mut edges);
        let levels = compute_levels(ctx.particles, &edges);
        for index in (0..ctx.bodies.len()).map(SolverBodyIndex::from_index) {
            let level = levels.level(ctx.bodies.get(index).particle());
            ctx.bodies.set_level(index, level);
        }
        ctx.bodies.lock();
        container.gather_solver_input(&mut ctx, DT);

        let num_iterations = settings.num_position_iterations;
        let answers = (0..num_iterations)
            .map(|iteration| container.apply_constraints(&mut ctx, DT, iteration, num_iterations))
            .collect();
        let corrections = stack.map(|handle| ctx.bodies.get(ctx.bodies.expect_index(handle)).displacement().0.y);
        (answers, corrections)
    }

    #[test]
    fn latest_window_start_ignores_empty_windows() {
        assert_eq!(latest_window_start(8, &[4, 3]), Some(5));
        assert_eq!(latest_window_start(8, &[0, 2]), Some(6));
        assert_eq!(latest_window_start(2, &[5]), Some(0));
        assert_eq!(latest_window_start(8, &[0, 0]), None);
    }

    #[test]
    fn position_phase_runs_into_friction_and_shock_windows() {
        let settings = EvolutionSettings::default();
        let start = latest_window_start(
            settings.num_position_iterations,
            &[
                settings.solver.num_position_friction_iterations,
                settings.solver.num_position_shock_propagation_iterations,
            ],
        )
        .expect("default windows are enabled");
        let (answers, _) = solve_stack_positions(&settings);
        assert!(
            answers[..start as usize].iter().all(|&more| more),
            "position phase allowed to stop before iteration {start}: {answers:?}"
        );
    }

    #[test]
    fn shock_window_shields_bottom_of_stack() {
        let mut settings = EvolutionSettings::default();
        settings.solver.max_push_out_velocity = 0.0;
        settings.solver.num_position_friction_iterations = 0;
        settings.solver.num_position_shock_propagation_iterations = settings.num_position_iterations;
        settings.solver.shock_propagation_inv_mass_scale = 0.0;

        let (_, [bottom, middle, top]) = solve_stack_positions(&settings);
        // Each body only answers to the contact beneath it.
        assert_relative_eq!(bottom, OVERLAP, epsilon = 1e-4);
        assert_relative_eq!(middle, 2.0 * OVERLAP, epsilon = 1e-4);
        assert_relative_eq!(top, 3.0 * OVERLAP, epsilon = 1e-4);
        assert!(bottom < top);
    }

    #[test]
    fn trailing_window_covers_last_iterations() {
        let hits: Vec<u32> = (0..8).filter(|&it| in_trailing_window(it, 8, 3)).collect();
        assert_eq!(hits, vec![5, 6, 7]);
        assert!(!in_trailing_window(7, 8, 0));
        assert!(in_trailing_window(0, 2, 5));
    }

    #[test]
    fn free_color_skips_colors_used_by_either_body() {
        let body_colors = vec![vec![0, 1], vec![0, 2], vec![]];
        let pair = [SolverBodyIndex::from_index(0), SolverBodyIndex::from_index(1)];
        assert_eq!(find_free_color(&body_colors, &pair), 3);
        assert_eq!(find_free_color(&body_colors, &[SolverBodyIndex::from_index(2)]), 0);
        assert_eq!(find_free_color(&body_colors, &[]), 0);
    }
}
