use crate::utils::allocator::{Arena, ParticleHandle};

use super::particle::{ObjectState, Particle};

/// Indexable, iterable storage for every particle in the simulation.
#[derive(Debug, Default, Clone)]
pub struct Particles {
    arena: Arena<Particle>,
}

impl Particles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, particle: Particle) -> ParticleHandle {
        self.arena.insert(particle)
    }

    pub fn remove(&mut self, handle: ParticleHandle) -> Option<Particle> {
        self.arena.remove(handle)
    }

    pub fn get(&self, handle: ParticleHandle) -> Option<&Particle> {
        self.arena.get(handle)
    }

    pub fn get_mut(&mut self, handle: ParticleHandle) -> Option<&mut Particle> {
        self.arena.get_mut(handle)
    }

    /// Lookup for handles that the evolution itself produced; a miss is a bug.
    pub fn expect(&self, handle: ParticleHandle) -> &Particle {
        self.arena
            .get(handle)
            .unwrap_or_else(|| panic!("particle {handle} referenced by a constraint is not in the simulation"))
    }

    pub fn contains(&self, handle: ParticleHandle) -> bool {
        self.arena.contains(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticleHandle, &Particle)> + '_ {
        self.arena.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ParticleHandle, &mut Particle)> + '_ {
        self.arena.iter_mut()
    }

    pub fn handles(&self) -> impl Iterator<Item = ParticleHandle> + '_ {
        self.arena.handles()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn active_dynamic_handles(&self) -> Vec<ParticleHandle> {
        self.handles_in_state(ObjectState::Dynamic)
    }

    pub fn kinematic_handles(&self) -> Vec<ParticleHandle> {
        self.handles_in_state(ObjectState::Kinematic)
    }

    fn handles_in_state(&self, state: ObjectState) -> Vec<ParticleHandle> {
        self.arena
            .iter()
            .filter(|(_, particle)| particle.state == state)
            .map(|(handle, _)| handle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn sub_views_filter_by_state() {
        let mut particles = Particles::new();
        let dynamic = particles.insert(Particle::default());
        let kinematic = particles.insert(Particle::kinematic(Vec3::ONE));
        particles.insert(Particle::fixed(Vec3::ZERO));

        assert_eq!(particles.active_dynamic_handles(), vec![dynamic]);
        assert_eq!(particles.kinematic_handles(), vec![kinematic]);
        assert_eq!(particles.len(), 3);
    }
}
