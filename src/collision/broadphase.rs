use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::{
    core::{bounds::Aabb, particles::Particles},
    utils::allocator::ParticleHandle,
};

/// Uniform grid spatial partitioning used by the broad-phase.
pub struct SpatialGrid {
    cell_size: f32,
    grid: HashMap<(i32, i32, i32), Vec<ParticleHandle>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1e-3),
            grid: HashMap::new(),
        }
    }

    fn world_to_grid(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    pub fn insert(&mut self, handle: ParticleHandle, bounds: &Aabb) {
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    self.grid.entry((x, y, z)).or_default().push(handle);
                }
            }
        }
    }

    pub fn query(&self, bounds: &Aabb) -> Vec<ParticleHandle> {
        let mut results = Vec::new();
        let min_cell = self.world_to_grid(bounds.min);
        let max_cell = self.world_to_grid(bounds.max);

        for x in min_cell.0..=max_cell.0 {
            for y in min_cell.1..=max_cell.1 {
                for z in min_cell.2..=max_cell.2 {
                    if let Some(handles) = self.grid.get(&(x, y, z)) {
                        results.extend(handles);
                    }
                }
            }
        }

        results.sort();
        results.dedup();
        results
    }
}

/// Broad phase driver returning candidate particle pairs.
///
/// Bounded shapes go through the grid. Unbounded shapes (planes) are paired
/// with every bounded particle that is not static.
pub struct BroadPhase {
    grid: SpatialGrid,
}

impl BroadPhase {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
        }
    }

    /// Candidate pairs ordered by handle index, with at least one dynamic
    /// particle per pair. `margin` inflates bounds before overlap tests.
    pub fn potential_pairs(
        &mut self,
        particles: &Particles,
        margin: f32,
    ) -> Vec<(ParticleHandle, ParticleHandle)> {
        self.grid.clear();

        let mut bounded = Vec::new();
        let mut unbounded = Vec::new();
        for (handle, particle) in particles.iter() {
            let Some(shape) = particle.shape.as_ref() else {
                continue;
            };
            if shape.is_bounded() {
                let bounds = particle.world_bounds.thickened(margin);
                self.grid.insert(handle, &bounds);
                bounded.push((handle, bounds));
            } else {
                unbounded.push(handle);
            }
        }

        let mut pairs = Vec::new();
        let mut checked = HashSet::new();

        for &(handle, bounds) in &bounded {
            for other in self.grid.query(&bounds) {
                if other == handle {
                    continue;
                }
                let pair_key = if handle.index() < other.index() {
                    (handle, other)
                } else {
                    (other, handle)
                };
                if !checked.insert((pair_key.0.index(), pair_key.1.index())) {
                    continue;
                }
                let other_bounds = particles.expect(other).world_bounds.thickened(margin);
                if bounds.overlaps(&other_bounds) && Self::any_dynamic(particles, pair_key) {
                    pairs.push(pair_key);
                }
            }

            for &plane in &unbounded {
                let pair_key = if handle.index() < plane.index() {
                    (handle, plane)
                } else {
                    (plane, handle)
                };
                if Self::any_dynamic(particles, pair_key) {
                    pairs.push(pair_key);
                }
            }
        }

        pairs.sort_by_key(|(a, b)| (a.index(), b.index()));
        pairs
    }

    fn any_dynamic(particles: &Particles, (a, b): (ParticleHandle, ParticleHandle)) -> bool {
        particles.expect(a).is_dynamic() || particles.expect(b).is_dynamic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{particle::Particle, shapes::Shape, types::MassProperties};

    #[test]
    fn overlapping_spheres_and_plane_pair_up() {
        let mut particles = Particles::new();
        let ground = particles.insert(Particle::fixed(Vec3::ZERO).with_shape(Shape::plane(Vec3::Y)));
        let a = particles.insert(
            Particle::dynamic(Vec3::new(0.0, 0.5, 0.0), MassProperties::default())
                .with_shape(Shape::sphere(0.5)),
        );
        let b = particles.insert(
            Particle::dynamic(Vec3::new(0.0, 1.4, 0.0), MassProperties::default())
                .with_shape(Shape::sphere(0.5)),
        );
        let far = particles.insert(
            Particle::dynamic(Vec3::new(50.0, 0.5, 0.0), MassProperties::default())
                .with_shape(Shape::sphere(0.5)),
        );

        let mut broadphase = BroadPhase::new(2.0);
        let pairs = broadphase.potential_pairs(&particles, 0.0);

        assert!(pairs.contains(&(ground, a)));
        assert!(pairs.contains(&(ground, b)));
        assert!(pairs.contains(&(ground, far)));
        assert!(pairs.contains(&(a, b)));
        assert!(!pairs.iter().any(|&(x, y)| (x == a || y == a) && (x == far || y == far)));
    }

    #[test]
    fn static_pairs_are_skipped() {
        let mut particles = Particles::new();
        particles.insert(Particle::fixed(Vec3::ZERO).with_shape(Shape::plane(Vec3::Y)));
        particles.insert(Particle::fixed(Vec3::new(0.0, 0.5, 0.0)).with_shape(Shape::sphere(0.5)));
        assert!(BroadPhase::new(2.0).potential_pairs(&particles, 0.0).is_empty());
    }
}
