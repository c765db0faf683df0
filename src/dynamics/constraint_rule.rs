use crate::{
    collision::detector::CollisionDetector,
    config::EvolutionSettings,
    core::particles::Particles,
    utils::allocator::ParticleHandle,
};

use super::solver_body::SolverBodyContainer;

/// Everything a constraint rule may touch during one tick.
///
/// Particles are read-only while constraints run; solver output reaches them
/// through the body container at scatter time.
pub struct TickContext<'a> {
    pub particles: &'a Particles,
    pub bodies: &'a mut SolverBodyContainer,
    pub collisions: &'a mut dyn CollisionDetector,
    pub settings: &'a EvolutionSettings,
}

/// A family of constraints solved by the evolution.
///
/// The evolution calls the hooks in tick order: `prepare_tick`,
/// `update_position_based_state`, `pre_gather_solver_input`,
/// `gather_solver_input`, the three `apply_*` phases, then
/// `scatter_solver_output` and `unprepare_tick`. Each `apply_*` returns true
/// while any of its constraints still wants another iteration.
pub trait ConstraintRule: Send {
    fn name(&self) -> &str;

    /// Rules run in ascending priority order.
    fn priority(&self) -> i32 {
        0
    }

    fn prepare_tick(&mut self, _ctx: &mut TickContext<'_>) {}

    fn unprepare_tick(&mut self, _ctx: &mut TickContext<'_>) {}

    fn update_position_based_state(&mut self, _ctx: &mut TickContext<'_>, _dt: f32) {}

    fn num_constraints(&self, ctx: &TickContext<'_>) -> usize;

    /// Particle pairs linked by this rule, used to build shock-propagation levels.
    fn append_constraint_edges(&self, ctx: &TickContext<'_>, edges: &mut Vec<(ParticleHandle, ParticleHandle)>);

    /// Registers solver bodies. Runs before the body container is locked.
    fn pre_gather_solver_input(&mut self, ctx: &mut TickContext<'_>);

    fn gather_solver_input(&mut self, ctx: &mut TickContext<'_>, dt: f32);

    /// Phase 1: position solve.
    fn apply_constraints(
        &mut self,
        ctx: &mut TickContext<'_>,
        dt: f32,
        iteration: u32,
        num_iterations: u32,
    ) -> bool;

    /// Phase 2: velocity solve.
    fn apply_push_out(
        &mut self,
        _ctx: &mut TickContext<'_>,
        _dt: f32,
        _iteration: u32,
        _num_iterations: u32,
    ) -> bool {
        false
    }

    /// Phase 3: projection.
    fn apply_projection(
        &mut self,
        _ctx: &mut TickContext<'_>,
        _dt: f32,
        _iteration: u32,
        _num_iterations: u32,
    ) -> bool {
        false
    }

    fn scatter_solver_output(&mut self, ctx: &mut TickContext<'_>, dt: f32);
}
