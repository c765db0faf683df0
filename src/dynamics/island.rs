use std::collections::{HashMap, VecDeque};

use crate::{core::particles::Particles, utils::allocator::ParticleHandle};

/// Shock-propagation depth of each particle for the current tick.
///
/// Static and kinematic particles sit at level 0; a dynamic particle touching
/// one is at level 1, the next one up at 2, and so on. Dynamic particles with
/// no path to a non-dynamic particle stay at level 0.
#[derive(Debug, Default, Clone)]
pub struct ParticleLevels {
    levels: HashMap<ParticleHandle, i32>,
}

impl ParticleLevels {
    pub fn level(&self, handle: ParticleHandle) -> i32 {
        self.levels.get(&handle).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn max_level(&self) -> i32 {
        self.levels.values().copied().max().unwrap_or(0)
    }
}

/// Builds the constraint graph and assigns levels breadth-first from every
/// non-dynamic particle.
pub fn compute_levels(particles: &Particles, edges: &[(ParticleHandle, ParticleHandle)]) -> ParticleLevels {
    let mut adjacency: HashMap<ParticleHandle, Vec<ParticleHandle>> = HashMap::new();
    for &(a, b) in edges {
        if a == b {
            continue;
        }
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }

    let mut levels = HashMap::with_capacity(adjacency.len());
    let mut queue = VecDeque::new();
    for &handle in adjacency.keys() {
        let is_dynamic = particles.get(handle).is_some_and(|particle| particle.is_dynamic());
        if !is_dynamic {
            levels.insert(handle, 0);
            queue.push_back(handle);
        }
    }

    while let Some(node) = queue.pop_front() {
        let next_level = levels[&node] + 1;
        let Some(neighbors) = adjacency.get(&node) else {
            continue;
        };
        for &neighbor in neighbors {
            if levels.contains_key(&neighbor) {
                continue;
            }
            // Non-dynamic particles were all seeded at level 0.
            levels.insert(neighbor, next_level);
            queue.push_back(neighbor);
        }
    }

    for &handle in adjacency.keys() {
        levels.entry(handle).or_insert(0);
    }

    ParticleLevels { levels }
}
