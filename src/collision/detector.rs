use std::collections::HashMap;

use crate::{
    config::CollisionDetectorSettings,
    core::{particles::Particles, types::Transform},
    utils::{allocator::ParticleHandle, logging::ScopedTimer},
};

use super::{
    broadphase::BroadPhase,
    constraint::{CollisionConstraint, CollisionConstraints, ContactPoint, ManifoldPoint},
    narrowphase::NarrowPhase,
};

/// Produces the collision constraints solved each tick.
///
/// The evolution owns the detector and hands it to the collision constraint
/// rule through the tick context, so no shared ownership is needed.
pub trait CollisionDetector: Send {
    /// Rebuilds the constraint container from the predicted poses.
    fn detect_collisions(&mut self, particles: &Particles, dt: f32);

    fn collision_container(&self) -> &CollisionConstraints;

    fn collision_container_mut(&mut self) -> &mut CollisionConstraints;

    /// Grows an incremental manifold using the current solver poses.
    /// Returns true when a point was added.
    fn update_constraint(
        &mut self,
        constraint_index: usize,
        pose0: &Transform,
        pose1: &Transform,
        dt: f32,
    ) -> bool;
}

/// Grid broad phase, closed-form narrow phase, and manifold persistence
/// keyed by particle pair.
pub struct BasicCollisionDetector {
    settings: CollisionDetectorSettings,
    broadphase: BroadPhase,
    constraints: CollisionConstraints,
}

impl BasicCollisionDetector {
    pub fn new(settings: CollisionDetectorSettings) -> Self {
        Self {
            broadphase: BroadPhase::new(settings.broadphase_cell_size),
            settings,
            constraints: CollisionConstraints::new(),
        }
    }

    pub fn settings(&self) -> &CollisionDetectorSettings {
        &self.settings
    }

    fn build_constraint(
        &self,
        particles: &Particles,
        mut pair: (ParticleHandle, ParticleHandle),
    ) -> Option<CollisionConstraint> {
        let (mut particle0, mut particle1) = (particles.expect(pair.0), particles.expect(pair.1));
        let (mut shape0, mut shape1) = (particle0.shape?, particle1.shape?);
        if NarrowPhase::should_swap(&shape0, &shape1) {
            std::mem::swap(&mut pair.0, &mut pair.1);
            std::mem::swap(&mut particle0, &mut particle1);
            std::mem::swap(&mut shape0, &mut shape1);
        }

        let pose0 = particle0.predicted_transform();
        let pose1 = particle1.predicted_transform();
        let contacts = if self.settings.incremental {
            NarrowPhase::generate_next(
                &shape0,
                &pose0,
                &shape1,
                &pose1,
                self.settings.cull_distance,
                &[],
                self.settings.manifold_match_tolerance,
            )
            .into_iter()
            .collect()
        } else {
            NarrowPhase::generate(&shape0, &pose0, &shape1, &pose1, self.settings.cull_distance)
        };
        if contacts.is_empty() {
            return None;
        }

        let mut constraint = CollisionConstraint::new(
            pair.0,
            pair.1,
            &shape0,
            &shape1,
            particle0.material.combine_with(&particle1.material),
        );
        constraint.set_incremental_collision_detection(self.settings.incremental);
        constraint.replace_manifold_points(
            contacts
                .into_iter()
                .map(|contact| manifold_point(contact, &pose1))
                .collect(),
        );
        Some(constraint)
    }
}

impl Default for BasicCollisionDetector {
    fn default() -> Self {
        Self::new(CollisionDetectorSettings::default())
    }
}

impl CollisionDetector for BasicCollisionDetector {
    fn detect_collisions(&mut self, particles: &Particles, _dt: f32) {
        let _timer = ScopedTimer::new("collision_detection");

        let previous: HashMap<(ParticleHandle, ParticleHandle), CollisionConstraint> = self
            .constraints
            .take()
            .into_iter()
            .map(|constraint| ((constraint.particle0(), constraint.particle1()), constraint))
            .collect();

        let pairs = self.broadphase.potential_pairs(particles, self.settings.cull_distance);
        for pair in pairs {
            let Some(mut constraint) = self.build_constraint(particles, pair) else {
                continue;
            };
            if let Some(old) = previous.get(&(constraint.particle0(), constraint.particle1())) {
                match_manifold_points(
                    constraint.manifold_points_mut(),
                    old.manifold_points(),
                    self.settings.manifold_match_tolerance,
                );
            }
            self.constraints.push(constraint);
        }

        log::trace!(
            "detected {} collision constraints ({} persisted from last tick)",
            self.constraints.len(),
            self.constraints
                .iter()
                .filter(|c| previous.contains_key(&(c.particle0(), c.particle1())))
                .count()
        );
    }

    fn collision_container(&self) -> &CollisionConstraints {
        &self.constraints
    }

    fn collision_container_mut(&mut self) -> &mut CollisionConstraints {
        &mut self.constraints
    }

    fn update_constraint(
        &mut self,
        constraint_index: usize,
        pose0: &Transform,
        pose1: &Transform,
        _dt: f32,
    ) -> bool {
        let cull_distance = self.settings.cull_distance;
        let tolerance = self.settings.manifold_match_tolerance;
        let Some(constraint) = self.constraints.get_mut(constraint_index) else {
            return false;
        };
        if !constraint.use_incremental_collision_detection() {
            return false;
        }

        let [shape0, shape1] = *constraint.shapes();
        let existing: Vec<ContactPoint> = constraint
            .manifold_points()
            .iter()
            .map(|point| point.contact_point)
            .collect();
        match NarrowPhase::generate_next(&shape0, pose0, &shape1, pose1, cull_distance, &existing, tolerance) {
            Some(contact) => {
                constraint.add_manifold_point(manifold_point(contact, pose1));
                true
            }
            None => false,
        }
    }
}

fn manifold_point(contact: ContactPoint, pose1: &Transform) -> ManifoldPoint {
    ManifoldPoint::new(contact, pose1.transform_vector(contact.shape_contact_normal))
}

/// Carries friction anchors from last tick's points to the new manifold.
///
/// A new point continues an old one when both shape-space contact points are
/// within `tolerance`. The closest old point wins and each old point is used once.
pub fn match_manifold_points(current: &mut [ManifoldPoint], previous: &[ManifoldPoint], tolerance: f32) {
    let mut claimed = vec![false; previous.len()];
    for point in current.iter_mut() {
        let mut best: Option<(usize, f32)> = None;
        for (index, old) in previous.iter().enumerate() {
            if claimed[index] {
                continue;
            }
            let d0 = old.contact_point.shape_contact_points[0]
                .distance(point.contact_point.shape_contact_points[0]);
            let d1 = old.contact_point.shape_contact_points[1]
                .distance(point.contact_point.shape_contact_points[1]);
            if d0 > tolerance || d1 > tolerance {
                continue;
            }
            let score = d0 + d1;
            if best.map_or(true, |(_, best_score)| score < best_score) {
                best = Some((index, score));
            }
        }

        if let Some((index, _)) = best {
            claimed[index] = true;
            point.shape_anchor_points = previous[index].shape_anchor_points;
            point.has_static_friction_anchor = true;
        }
    }
}
