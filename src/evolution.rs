use std::time::Instant;

use crate::{
    collision::{
        constraint::CollisionConstraints,
        detector::{BasicCollisionDetector, CollisionDetector},
    },
    config::{EvolutionSettings, SolverType, MAX_STABLE_STEP_DT},
    core::{
        particle::{KinematicTarget, Particle},
        particles::Particles,
    },
    dynamics::{
        collision_container::CollisionSolverContainer,
        constraint_rule::{ConstraintRule, TickContext},
        integrator::{Integrator, SimulationSpace},
        island::compute_levels,
        kinematics::apply_kinematic_targets,
        solver_body::{SolverBodyContainer, SolverBodyIndex},
    },
    error::{EvolutionError, Result},
    utils::{
        allocator::ParticleHandle,
        logging::{warn_if_tick_budget_exceeded, ScopedTimer},
        math::{integrate_rotation, SMALL_NUMBER},
        profiling::{EvolutionProfiler, PhaseTimer},
    },
};

/// The three constraint phases run inside one substep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolverPhase {
    Position,
    Velocity,
    Projection,
}

/// Fixed-step rigid-body evolution.
///
/// Owns the particles, the collision detector, and every constraint rule. Each
/// call to [`Evolution::advance`] splits the tick into substeps that
/// integrate, drive kinematics, detect collisions, solve the constraint phases,
/// and commit the predicted poses.
pub struct Evolution {
    particles: Particles,
    detector: Box<dyn CollisionDetector>,
    rules: Vec<Box<dyn ConstraintRule>>,
    bodies: SolverBodyContainer,
    integrator: Integrator,
    settings: EvolutionSettings,
    simulation_space: SimulationSpace,
    profiler: EvolutionProfiler,
    edges: Vec<(ParticleHandle, ParticleHandle)>,
}

impl Evolution {
    /// Builds an evolution with the basic collision detector and the collision rule installed.
    pub fn new(settings: EvolutionSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            particles: Particles::new(),
            detector: Box::new(BasicCollisionDetector::new(settings.collision)),
            rules: vec![Box::new(CollisionSolverContainer::new())],
            bodies: SolverBodyContainer::new(),
            integrator: Integrator::new(settings.gravity, settings.bounds_thickness, settings.simulation_space),
            settings,
            simulation_space: SimulationSpace::default(),
            profiler: EvolutionProfiler::default(),
            edges: Vec::new(),
        })
    }

    /// Replaces the collision detector. Existing collision constraints are dropped with it.
    pub fn with_detector<D>(mut self, detector: D) -> Self
    where
        D: CollisionDetector + 'static,
    {
        self.detector = Box::new(detector);
        self
    }

    pub fn settings(&self) -> &EvolutionSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: EvolutionSettings) -> Result<()> {
        settings.validate()?;
        self.integrator = Integrator::new(settings.gravity, settings.bounds_thickness, settings.simulation_space);
        self.settings = settings;
        Ok(())
    }

    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut Particles {
        &mut self.particles
    }

    pub fn add_particle(&mut self, mut particle: Particle) -> ParticleHandle {
        particle.update_world_bounds(self.settings.bounds_thickness);
        self.particles.insert(particle)
    }

    pub fn remove_particle(&mut self, handle: ParticleHandle) -> Result<Particle> {
        self.particles
            .remove(handle)
            .ok_or(EvolutionError::ParticleNotFound(handle))
    }

    pub fn particle(&self, handle: ParticleHandle) -> Option<&Particle> {
        self.particles.get(handle)
    }

    pub fn particle_mut(&mut self, handle: ParticleHandle) -> Option<&mut Particle> {
        self.particles.get_mut(handle)
    }

    /// Installs a constraint rule; rules run in ascending priority, ties in insertion order.
    pub fn add_constraint_rule(&mut self, rule: Box<dyn ConstraintRule>) {
        log::debug!("adding constraint rule `{}` (priority {})", rule.name(), rule.priority());
        self.rules.push(rule);
        self.rules.sort_by_key(|rule| rule.priority());
    }

    pub fn constraint_rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn set_kinematic_target(&mut self, handle: ParticleHandle, target: KinematicTarget) -> Result<()> {
        let particle = self
            .particles
            .get_mut(handle)
            .ok_or(EvolutionError::ParticleNotFound(handle))?;
        if !particle.is_kinematic() {
            return Err(EvolutionError::NotKinematic(handle));
        }
        particle.kinematic_target = target;
        Ok(())
    }

    pub fn simulation_space(&self) -> &SimulationSpace {
        &self.simulation_space
    }

    pub fn set_simulation_space(&mut self, space: SimulationSpace) {
        self.simulation_space = space;
    }

    pub fn collision_detector(&self) -> &dyn CollisionDetector {
        self.detector.as_ref()
    }

    /// Collision constraints from the most recent substep, with their solver results.
    pub fn collision_constraints(&self) -> &CollisionConstraints {
        self.detector.collision_container()
    }

    /// Timings and counters for the most recent [`Evolution::advance`].
    pub fn profiler(&self) -> &EvolutionProfiler {
        &self.profiler
    }

    /// Advances the simulation by `dt` split into `num_steps` equal substeps.
    ///
    /// With `rewind_dt > 0` the particles are first moved back that far along
    /// their last motion.
    pub fn advance(&mut self, dt: f32, num_steps: u32, rewind_dt: f32) {
        self.profiler.reset();
        if num_steps == 0 {
            log::warn!("advance called with zero substeps; nothing simulated");
            return;
        }
        let start = Instant::now();
        let _timer = ScopedTimer::new("evolution::advance");

        let step_dt = dt / num_steps as f32;
        if step_dt > MAX_STABLE_STEP_DT {
            log::warn!(
                "substep of {:.4} s exceeds the stable limit of {:.4} s",
                step_dt,
                MAX_STABLE_STEP_DT
            );
        }
        if rewind_dt > SMALL_NUMBER {
            self.rewind(step_dt, rewind_dt);
        }

        for step in 0..num_steps {
            let step_fraction = (step + 1) as f32 / num_steps as f32;
            self.advance_one_time_step(step_dt, step_fraction);
        }

        for (_, particle) in self.particles.iter_mut() {
            if particle.is_dynamic() {
                particle.clear_accumulators();
            }
        }

        self.profiler.particle_count = self.particles.len();
        self.profiler.total_time = start.elapsed();
        self.profiler.report();
        warn_if_tick_budget_exceeded(self.profiler.total_time, dt, num_steps);
    }

    /// Runs a single substep. `step_fraction` is how far through the tick this
    /// substep ends; kinematic position targets are reached at 1.
    pub fn advance_one_time_step(&mut self, dt: f32, step_fraction: f32) {
        let Self {
            particles,
            detector,
            rules,
            bodies,
            integrator,
            settings,
            simulation_space,
            profiler,
            edges,
        } = self;
        profiler.substeps += 1;
        let parallel = cfg!(feature = "parallel") && settings.solver.parallel;

        {
            let _timer = PhaseTimer::new(&mut profiler.integrate_time);
            integrator.step(particles, dt, &*simulation_space);
        }
        {
            let _timer = PhaseTimer::new(&mut profiler.kinematic_time);
            apply_kinematic_targets(particles, dt, step_fraction, settings.bounds_thickness);
        }

        {
            let mut ctx = TickContext {
                particles: &*particles,
                bodies: &mut *bodies,
                collisions: detector.as_mut(),
                settings: &*settings,
            };
            for rule in rules.iter_mut() {
                rule.prepare_tick(&mut ctx);
            }
            for rule in rules.iter_mut() {
                rule.update_position_based_state(&mut ctx, dt);
            }

            {
                let _timer = PhaseTimer::new(&mut profiler.detection_time);
                ctx.collisions.detect_collisions(ctx.particles, dt);
            }

            {
                let _timer = PhaseTimer::new(&mut profiler.gather_time);
                let capacity = rules.iter().map(|rule| rule.num_constraints(&ctx) * 2).sum::<usize>();
                ctx.bodies.reset(capacity);
                for rule in rules.iter_mut() {
                    rule.pre_gather_solver_input(&mut ctx);
                }

                edges.clear();
                for rule in rules.iter() {
                    rule.append_constraint_edges(&ctx, edges);
                }
                let levels = compute_levels(ctx.particles, edges);
                for index in (0..ctx.bodies.len()).map(SolverBodyIndex::from_index) {
                    let level = levels.level(ctx.bodies.get(index).particle());
                    ctx.bodies.set_level(index, level);
                }
                ctx.bodies.lock();

                for rule in rules.iter_mut() {
                    rule.gather_solver_input(&mut ctx, dt);
                }
                profiler.constraint_count += rules.iter().map(|rule| rule.num_constraints(&ctx)).sum::<usize>();
                profiler.solver_body_count = profiler.solver_body_count.max(ctx.bodies.len());
            }

            let force_max_iterations = settings.solver.force_max_iterations;
            let position_iterations = settings.num_position_iterations;
            let velocity_iterations = settings.num_velocity_iterations;
            let projection_iterations = settings.num_projection_iterations;
            match settings.solver_type {
                SolverType::QuasiPbd => {
                    {
                        let _timer = PhaseTimer::new(&mut profiler.position_time);
                        profiler.position_iterations += solve_phase(
                            rules,
                            &mut ctx,
                            SolverPhase::Position,
                            dt,
                            position_iterations,
                            force_max_iterations,
                        );
                        ctx.bodies.set_implicit_velocities(dt, parallel);
                    }
                    {
                        let _timer = PhaseTimer::new(&mut profiler.velocity_time);
                        profiler.velocity_iterations += solve_phase(
                            rules,
                            &mut ctx,
                            SolverPhase::Velocity,
                            dt,
                            velocity_iterations,
                            force_max_iterations,
                        );
                        ctx.bodies.apply_corrections(parallel);
                    }
                    {
                        let _timer = PhaseTimer::new(&mut profiler.projection_time);
                        profiler.projection_iterations += solve_phase(
                            rules,
                            &mut ctx,
                            SolverPhase::Projection,
                            dt,
                            projection_iterations,
                            force_max_iterations,
                        );
                    }
                }
                SolverType::StandardPbd => {
                    {
                        let _timer = PhaseTimer::new(&mut profiler.position_time);
                        profiler.position_iterations += solve_phase(
                            rules,
                            &mut ctx,
                            SolverPhase::Position,
                            dt,
                            position_iterations,
                            force_max_iterations,
                        );
                        ctx.bodies.apply_corrections(parallel);
                    }
                    {
                        let _timer = PhaseTimer::new(&mut profiler.projection_time);
                        profiler.projection_iterations += solve_phase(
                            rules,
                            &mut ctx,
                            SolverPhase::Projection,
                            dt,
                            projection_iterations,
                            force_max_iterations,
                        );
                        ctx.bodies.set_implicit_velocities(dt, parallel);
                    }
                }
            }

            let _timer = PhaseTimer::new(&mut profiler.scatter_time);
            for rule in rules.iter_mut() {
                rule.scatter_solver_output(&mut ctx, dt);
            }
        }

        {
            let _timer = PhaseTimer::new(&mut profiler.scatter_time);
            bodies.scatter_output(particles);
            for (_, particle) in particles.iter_mut() {
                particle.previous_x = particle.x;
                particle.previous_r = particle.r;
                particle.x = particle.p;
                particle.r = particle.q;
            }
        }

        let mut ctx = TickContext {
            particles: &*particles,
            bodies: &mut *bodies,
            collisions: detector.as_mut(),
            settings: &*settings,
        };
        for rule in rules.iter_mut() {
            rule.unprepare_tick(&mut ctx);
        }
    }

    /// Moves particles back `rewind_dt` seconds into the substep of length `dt`.
    ///
    /// Interpolates between the previous and current committed pose when
    /// `rewind_lerp` is set, otherwise integrates the current velocity backwards.
    pub fn rewind(&mut self, dt: f32, rewind_dt: f32) {
        if rewind_dt <= SMALL_NUMBER || dt <= SMALL_NUMBER {
            return;
        }
        let lerp = self.settings.rewind_lerp;
        let t = ((dt - rewind_dt) / dt).clamp(0.0, 1.0);
        for (_, particle) in self.particles.iter_mut() {
            if particle.is_static() {
                continue;
            }
            if lerp {
                particle.x = particle.previous_x.lerp(particle.x, t);
                particle.r = particle.previous_r.slerp(particle.r, t).normalize();
            } else {
                particle.x -= particle.v * rewind_dt;
                particle.r = integrate_rotation(particle.r, -particle.w, rewind_dt);
            }
            particle.p = particle.x;
            particle.q = particle.r;
            particle.update_world_bounds(self.settings.bounds_thickness);
        }
        log::trace!("rewound {} s of a {} s step (lerp: {})", rewind_dt, dt, lerp);
    }
}

/// Iterates one phase over every rule until no rule asks for more, returning
/// the number of iterations that ran.
fn solve_phase(
    rules: &mut [Box<dyn ConstraintRule>],
    ctx: &mut TickContext<'_>,
    phase: SolverPhase,
    dt: f32,
    num_iterations: u32,
    force_max_iterations: bool,
) -> usize {
    for iteration in 0..num_iterations {
        let mut needs_more = false;
        for rule in rules.iter_mut() {
            needs_more |= match phase {
                SolverPhase::Position => rule.apply_constraints(ctx, dt, iteration, num_iterations),
                SolverPhase::Velocity => rule.apply_push_out(ctx, dt, iteration, num_iterations),
                SolverPhase::Projection => rule.apply_projection(ctx, dt, iteration, num_iterations),
            };
        }
        if !needs_more && !force_max_iterations {
            log::trace!("{phase:?} phase converged after {} iterations", iteration + 1);
            return iteration as usize + 1;
        }
    }
    num_iterations as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{shapes::Shape, types::MassProperties, types::Transform};
    use approx::assert_relative_eq;
    use glam::{Quat, Vec3};

    const DT: f32 = 1.0 / 60.0;

    fn evolution() -> Evolution {
        Evolution::new(EvolutionSettings::default()).expect("default settings are valid")
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut settings = EvolutionSettings::default();
        settings.bounds_thickness = -1.0;
        assert!(matches!(
            Evolution::new(settings),
            Err(EvolutionError::InvalidSettings { field: "bounds_thickness", .. })
        ));
    }

    #[test]
    fn free_fall_commits_predicted_pose() {
        let mut evolution = evolution();
        let ball = evolution.add_particle(
            Particle::dynamic(Vec3::new(0.0, 10.0, 0.0), MassProperties::solid_sphere(0.5, 1.0))
                .with_shape(Shape::sphere(0.5)),
        );
        evolution.advance(DT, 1, 0.0);

        let particle = evolution.particle(ball).expect("ball");
        assert_relative_eq!(particle.v.y, -9.81 * DT, epsilon = 1e-5);
        assert_relative_eq!(particle.x.y, 10.0 - 9.81 * DT * DT, epsilon = 1e-5);
        assert_eq!(particle.previous_x, Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(particle.x, particle.p);
        assert_eq!(evolution.profiler().substeps, 1);
    }

    #[test]
    fn zero_substeps_is_a_no_op() {
        let mut evolution = evolution();
        let ball = evolution.add_particle(Particle::dynamic(Vec3::Y, MassProperties::default()));
        evolution.advance(DT, 0, 0.0);
        assert_eq!(evolution.particle(ball).expect("ball").x, Vec3::Y);
    }

    #[test]
    fn kinematic_target_requires_kinematic_particle() {
        let mut evolution = evolution();
        let dynamic = evolution.add_particle(Particle::default());
        let target = KinematicTarget::Position(Transform::from_position(Vec3::ONE));
        assert_eq!(
            evolution.set_kinematic_target(dynamic, target),
            Err(EvolutionError::NotKinematic(dynamic))
        );
        evolution.remove_particle(dynamic).expect("particle exists");
        assert_eq!(
            evolution.set_kinematic_target(dynamic, target),
            Err(EvolutionError::ParticleNotFound(dynamic))
        );
    }

    #[test]
    fn kinematic_particle_reaches_target_on_last_substep() {
        let mut evolution = evolution();
        let mover = evolution.add_particle(Particle::kinematic(Vec3::ZERO));
        let target = Transform::new(Vec3::new(3.0, 0.0, 0.0), Quat::from_rotation_z(0.4));
        evolution
            .set_kinematic_target(mover, KinematicTarget::Position(target))
            .expect("kinematic");

        evolution.advance(DT * 4.0, 4, 0.0);

        let particle = evolution.particle(mover).expect("mover");
        assert_eq!(particle.x, target.position);
        assert_eq!(particle.r, target.rotation);
        let expected_v = (target.position - particle.previous_x) / DT;
        assert_relative_eq!(particle.v.x, expected_v.x, epsilon = 1e-3);
    }

    #[test]
    fn rewind_with_zero_time_changes_nothing() {
        let mut evolution = evolution();
        let ball = evolution.add_particle(
            Particle::dynamic(Vec3::new(0.0, 5.0, 0.0), MassProperties::default())
                .with_velocity(Vec3::X, Vec3::Y),
        );
        evolution.advance(DT, 1, 0.0);
        let before = evolution.particle(ball).expect("ball").clone();

        evolution.rewind(DT, 0.0);

        let after = evolution.particle(ball).expect("ball");
        assert_eq!(after.x, before.x);
        assert_eq!(after.r, before.r);
        assert_eq!(after.p, before.p);
    }

    #[test]
    fn rewind_strategies_agree_for_constant_velocity() {
        let mut settings = EvolutionSettings::default();
        settings.gravity = Vec3::ZERO;
        for rewind_lerp in [true, false] {
            settings.rewind_lerp = rewind_lerp;
            let mut evolution = Evolution::new(settings).expect("valid");
            let ball = evolution.add_particle(
                Particle::dynamic(Vec3::ZERO, MassProperties::default()).with_velocity(Vec3::new(6.0, 0.0, 0.0), Vec3::ZERO),
            );
            evolution.advance(DT, 1, 0.0);
            evolution.rewind(DT, DT * 0.5);
            assert_relative_eq!(evolution.particle(ball).expect("ball").x.x, 6.0 * DT * 0.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn rules_run_in_priority_order() {
        let mut evolution = evolution();
        evolution.add_constraint_rule(Box::new(crate::dynamics::DistanceJointRule::new().with_priority(-1)));
        assert_eq!(evolution.constraint_rule_names(), vec!["distance_joints", "collisions"]);
    }
}
