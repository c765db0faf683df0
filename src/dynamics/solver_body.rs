use std::collections::HashMap;

use glam::{Mat3, Quat, Vec3};

use crate::{
    core::{particle::Particle, particles::Particles},
    utils::{
        allocator::ParticleHandle,
        math::{angular_velocity, apply_rotation_delta, world_inverse_inertia},
    },
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Stable index of a solver body within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolverBodyIndex(u32);

impl SolverBodyIndex {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Tick-scoped mirror of a particle, in center-of-mass space.
///
/// `p`/`q` is the predicted pose. Position-phase corrections accumulate in
/// `dp`/`dq` until [`SolverBody::apply_corrections`] folds them in; projection
/// corrections accumulate separately in `cp`/`cq` and never touch velocity.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    particle: ParticleHandle,
    pub x: Vec3,
    pub r: Quat,
    pub p: Vec3,
    pub q: Quat,
    pub dp: Vec3,
    pub dq: Vec3,
    pub cp: Vec3,
    pub cq: Vec3,
    pub v: Vec3,
    pub w: Vec3,
    pub inv_m: f32,
    pub inv_i: Mat3,
    inv_inertia_local: Vec3,
    center_of_mass: Vec3,
    /// Corrections already folded into `p`/`q` this tick.
    applied_dp: Vec3,
    applied_dq: Vec3,
    pub level: i32,
}

impl SolverBody {
    pub fn from_particle(particle: ParticleHandle, source: &Particle) -> Self {
        let dynamic = source.is_dynamic();
        let inv_inertia_local = if dynamic { source.inv_inertia } else { Vec3::ZERO };
        Self {
            particle,
            x: source.x + source.r * source.center_of_mass,
            r: source.r,
            p: source.p + source.q * source.center_of_mass,
            q: source.q,
            dp: Vec3::ZERO,
            dq: Vec3::ZERO,
            cp: Vec3::ZERO,
            cq: Vec3::ZERO,
            v: source.v,
            w: source.w,
            inv_m: if dynamic { source.inv_mass } else { 0.0 },
            inv_i: world_inverse_inertia(source.q, inv_inertia_local),
            inv_inertia_local,
            center_of_mass: source.center_of_mass,
            applied_dp: Vec3::ZERO,
            applied_dq: Vec3::ZERO,
            level: 0,
        }
    }

    pub fn particle(&self) -> ParticleHandle {
        self.particle
    }

    pub fn is_dynamic(&self) -> bool {
        self.inv_m > 0.0
    }

    /// Center of mass including every pending correction.
    pub fn corrected_p(&self) -> Vec3 {
        self.p + self.dp + self.cp
    }

    pub fn corrected_q(&self) -> Quat {
        apply_rotation_delta(self.q, self.dq + self.cq)
    }

    /// Actor-origin pose at the corrected state.
    pub fn actor_position(&self) -> Vec3 {
        self.corrected_p() - self.corrected_q() * self.center_of_mass
    }

    /// World position of an actor-space point at the corrected pose.
    pub fn world_point(&self, local: Vec3) -> Vec3 {
        self.corrected_p() + self.corrected_q() * (local - self.center_of_mass)
    }

    /// Total linear and angular displacement since gather.
    pub fn displacement(&self) -> (Vec3, Vec3) {
        (
            self.applied_dp + self.dp + self.cp,
            self.applied_dq + self.dq + self.cq,
        )
    }

    pub fn apply_position_delta(&mut self, dp: Vec3, dq: Vec3) {
        self.dp += dp;
        self.dq += dq;
    }

    pub fn apply_projection_delta(&mut self, cp: Vec3, cq: Vec3) {
        self.cp += cp;
        self.cq += cq;
    }

    pub fn apply_velocity_delta(&mut self, dv: Vec3, dw: Vec3) {
        self.v += dv;
        self.w += dw;
    }

    /// Commits the position-phase corrections into the predicted pose.
    pub fn apply_corrections(&mut self) {
        if self.dp == Vec3::ZERO && self.dq == Vec3::ZERO {
            return;
        }
        self.p += self.dp;
        self.q = apply_rotation_delta(self.q, self.dq);
        self.applied_dp += self.dp;
        self.applied_dq += self.dq;
        self.dp = Vec3::ZERO;
        self.dq = Vec3::ZERO;
        self.inv_i = world_inverse_inertia(self.q, self.inv_inertia_local);
    }

    /// Velocity implied by moving from the start pose to the corrected pose in `dt`.
    pub fn set_implicit_velocity(&mut self, dt: f32) {
        if !self.is_dynamic() || dt <= 0.0 {
            return;
        }
        self.v = (self.p + self.dp + self.cp - self.x) / dt;
        self.w = angular_velocity(self.r, self.corrected_q(), dt);
    }

    fn write_to(&self, particle: &mut Particle) {
        let q = self.corrected_q();
        particle.q = q;
        particle.p = self.corrected_p() - q * self.center_of_mass;
        particle.v = self.v;
        particle.w = self.w;
    }
}

/// Per-tick arena of solver bodies, one per particle referenced by a constraint.
///
/// Bodies are only added before [`SolverBodyContainer::lock`]; after that the
/// container is fixed for the rest of the tick and indices stay valid.
#[derive(Debug, Default)]
pub struct SolverBodyContainer {
    bodies: Vec<SolverBody>,
    lookup: HashMap<ParticleHandle, SolverBodyIndex>,
    locked: bool,
}

impl SolverBodyContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, capacity: usize) {
        self.bodies.clear();
        self.bodies.reserve(capacity);
        self.lookup.clear();
        self.locked = false;
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the body for `handle`, creating it on first reference.
    ///
    /// Panics when a new body is requested after the container was locked.
    pub fn find_or_add(&mut self, handle: ParticleHandle, particles: &Particles) -> SolverBodyIndex {
        if let Some(&index) = self.lookup.get(&handle) {
            return index;
        }
        assert!(
            !self.locked,
            "solver body for particle {handle} requested after the body container was locked"
        );
        let index = SolverBodyIndex(self.bodies.len() as u32);
        self.bodies
            .push(SolverBody::from_particle(handle, particles.expect(handle)));
        self.lookup.insert(handle, index);
        index
    }

    pub fn find(&self, handle: ParticleHandle) -> Option<SolverBodyIndex> {
        self.lookup.get(&handle).copied()
    }

    /// Lookup for particles that must have been gathered; a miss is a bug.
    pub fn expect_index(&self, handle: ParticleHandle) -> SolverBodyIndex {
        self.find(handle)
            .unwrap_or_else(|| panic!("particle {handle} has no solver body this tick"))
    }

    pub fn get(&self, index: SolverBodyIndex) -> &SolverBody {
        &self.bodies[index.index()]
    }

    pub fn get_mut(&mut self, index: SolverBodyIndex) -> &mut SolverBody {
        &mut self.bodies[index.index()]
    }

    /// Mutable access to two distinct bodies.
    pub fn pair_mut(
        &mut self,
        a: SolverBodyIndex,
        b: SolverBodyIndex,
    ) -> (&mut SolverBody, &mut SolverBody) {
        assert_ne!(a, b, "a constraint cannot bind the same solver body twice");
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.bodies.split_at_mut(high.index());
        let (first, second) = (&mut head[low.index()], &mut tail[0]);
        if a < b {
            (first, second)
        } else {
            (second, first)
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SolverBody> {
        self.bodies.iter()
    }

    pub fn set_level(&mut self, index: SolverBodyIndex, level: i32) {
        self.bodies[index.index()].level = level;
    }

    pub fn apply_corrections(&mut self, parallel: bool) {
        self.for_each_mut(parallel, SolverBody::apply_corrections);
    }

    pub fn set_implicit_velocities(&mut self, dt: f32, parallel: bool) {
        self.for_each_mut(parallel, |body| body.set_implicit_velocity(dt));
    }

    /// Writes corrected poses and velocities back onto the dynamic particles.
    pub fn scatter_output(&self, particles: &mut Particles) {
        for body in self.bodies.iter().filter(|body| body.is_dynamic()) {
            if let Some(particle) = particles.get_mut(body.particle) {
                body.write_to(particle);
            }
        }
    }

    #[allow(unused_variables)]
    fn for_each_mut<F>(&mut self, parallel: bool, f: F)
    where
        F: Fn(&mut SolverBody) + Send + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            if parallel {
                self.bodies.par_iter_mut().for_each(f);
                return;
            }
        }
        self.bodies.iter_mut().for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MassProperties;
    use approx::assert_relative_eq;

    fn scene() -> (Particles, ParticleHandle, ParticleHandle) {
        let mut particles = Particles::new();
        let ground = particles.insert(Particle::fixed(Vec3::ZERO));
        let ball = particles.insert(Particle::dynamic(Vec3::new(0.0, 1.0, 0.0), MassProperties::default()));
        (particles, ground, ball)
    }

    #[test]
    fn find_or_add_deduplicates() {
        let (particles, ground, ball) = scene();
        let mut container = SolverBodyContainer::new();
        let a = container.find_or_add(ball, &particles);
        let b = container.find_or_add(ground, &particles);
        assert_eq!(container.find_or_add(ball, &particles), a);
        assert_ne!(a, b);
        assert_eq!(container.len(), 2);
        assert!(!container.get(b).is_dynamic());
    }

    #[test]
    #[should_panic(expected = "locked")]
    fn adding_after_lock_panics() {
        let (particles, ground, ball) = scene();
        let mut container = SolverBodyContainer::new();
        container.find_or_add(ball, &particles);
        container.lock();
        container.find_or_add(ground, &particles);
    }

    #[test]
    fn implicit_velocity_follows_correction() {
        let (mut particles, _, ball) = scene();
        particles.get_mut(ball).expect("ball").p = Vec3::new(0.0, 0.9, 0.0);
        let mut container = SolverBodyContainer::new();
        let index = container.find_or_add(ball, &particles);
        container.get_mut(index).apply_position_delta(Vec3::new(0.0, 0.05, 0.0), Vec3::ZERO);
        container.set_implicit_velocities(0.1, false);
        assert_relative_eq!(container.get(index).v.y, -0.5, epsilon = 1e-5);

        container.apply_corrections(false);
        assert_relative_eq!(container.get(index).p.y, 0.95, epsilon = 1e-6);
        assert_eq!(container.get(index).displacement().0, Vec3::new(0.0, 0.05, 0.0));

        container.scatter_output(&mut particles);
        assert_relative_eq!(particles.expect(ball).p.y, 0.95, epsilon = 1e-6);
    }

    #[test]
    fn pair_mut_returns_requested_order() {
        let (particles, ground, ball) = scene();
        let mut container = SolverBodyContainer::new();
        let a = container.find_or_add(ball, &particles);
        let b = container.find_or_add(ground, &particles);
        let (first, second) = container.pair_mut(b, a);
        assert_eq!(first.particle(), ground);
        assert_eq!(second.particle(), ball);
    }
}
