use glam::Vec3;

use crate::{
    core::{shapes::Shape, types::MaterialPairProperties},
    utils::allocator::ParticleHandle,
};

/// Narrow-phase output for one contact location.
///
/// Points are in each particle's actor frame; the normal is in particle 1's
/// frame and points from particle 1 toward particle 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub shape_contact_points: [Vec3; 2],
    pub shape_contact_normal: Vec3,
    /// Signed separation along the normal; negative when penetrating.
    pub phi: f32,
}

/// Solver output recorded per manifold point at scatter time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResolvedContact {
    pub net_push_out: Vec3,
    pub net_impulse: Vec3,
    /// 1 when the point stayed inside the static friction cone, less when it slipped.
    pub static_friction_ratio: f32,
}

/// One contact location of a collision constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldPoint {
    pub contact_point: ContactPoint,
    pub world_contact_normal: Vec3,
    pub target_phi: f32,
    /// Static-friction memory: points on each shape that were coincident when the contact began.
    pub shape_anchor_points: [Vec3; 2],
    /// Set by the detector when this point continues one from the previous tick.
    pub has_static_friction_anchor: bool,
    pub resolved: Option<ResolvedContact>,
}

impl ManifoldPoint {
    pub fn new(contact_point: ContactPoint, world_contact_normal: Vec3) -> Self {
        Self {
            contact_point,
            world_contact_normal,
            target_phi: 0.0,
            shape_anchor_points: contact_point.shape_contact_points,
            has_static_friction_anchor: false,
            resolved: None,
        }
    }

    /// Replaces the anchors with the current contact points (first contact or re-grip).
    pub fn reseed_anchors(&mut self) {
        self.shape_anchor_points = self.contact_point.shape_contact_points;
    }
}

/// Narrow write-back interface from the solver into a constraint.
pub trait ConstraintSolverSink {
    fn reset_solver_results(&mut self);

    fn write_resolved_contact(
        &mut self,
        point_index: usize,
        net_impulse: Vec3,
        net_push_out: Vec3,
        static_friction_ratio: f32,
    );
}

/// Contact constraint between two particles.
#[derive(Debug, Clone)]
pub struct CollisionConstraint {
    particles: [ParticleHandle; 2],
    shapes: [Shape; 2],
    manifold_points: Vec<ManifoldPoint>,
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub restitution: f32,
    /// Acceleration-like threshold; the solver scales it by the step.
    pub restitution_threshold: f32,
    pub stiffness: f32,
    incremental: bool,
    accumulated_impulse: Vec3,
}

impl CollisionConstraint {
    pub fn new(
        particle0: ParticleHandle,
        particle1: ParticleHandle,
        shape0: &Shape,
        shape1: &Shape,
        material: MaterialPairProperties,
    ) -> Self {
        Self {
            particles: [particle0, particle1],
            shapes: [*shape0, *shape1],
            manifold_points: Vec::new(),
            static_friction: material.static_friction,
            dynamic_friction: material.dynamic_friction,
            restitution: material.restitution,
            restitution_threshold: material.restitution_threshold,
            stiffness: 1.0,
            incremental: false,
            accumulated_impulse: Vec3::ZERO,
        }
    }

    pub fn particles(&self) -> [ParticleHandle; 2] {
        self.particles
    }

    pub fn particle0(&self) -> ParticleHandle {
        self.particles[0]
    }

    pub fn particle1(&self) -> ParticleHandle {
        self.particles[1]
    }

    pub fn shapes(&self) -> &[Shape; 2] {
        &self.shapes
    }

    /// At least one shape is curved; dynamic friction then moves to the velocity phase.
    pub fn is_quadratic(&self) -> bool {
        self.shapes.iter().any(Shape::is_quadratic)
    }

    pub fn use_incremental_collision_detection(&self) -> bool {
        self.incremental
    }

    pub fn set_incremental_collision_detection(&mut self, incremental: bool) {
        self.incremental = incremental;
    }

    pub fn manifold_points(&self) -> &[ManifoldPoint] {
        &self.manifold_points
    }

    pub fn manifold_points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.manifold_points
    }

    pub fn num_manifold_points(&self) -> usize {
        self.manifold_points.len()
    }

    pub fn add_manifold_point(&mut self, point: ManifoldPoint) -> usize {
        self.manifold_points.push(point);
        self.manifold_points.len() - 1
    }

    /// Swaps in a freshly detected manifold, returning the previous one.
    pub fn replace_manifold_points(&mut self, points: Vec<ManifoldPoint>) -> Vec<ManifoldPoint> {
        std::mem::replace(&mut self.manifold_points, points)
    }

    pub fn set_material(&mut self, material: MaterialPairProperties) {
        self.static_friction = material.static_friction;
        self.dynamic_friction = material.dynamic_friction;
        self.restitution = material.restitution;
        self.restitution_threshold = material.restitution_threshold;
    }

    /// Sum of net impulses written by the last scatter.
    pub fn accumulated_impulse(&self) -> Vec3 {
        self.accumulated_impulse
    }

    /// Deepest penetration over the manifold (positive when penetrating).
    pub fn max_penetration(&self) -> f32 {
        self.manifold_points
            .iter()
            .map(|point| -point.contact_point.phi)
            .fold(0.0, f32::max)
    }
}

impl ConstraintSolverSink for CollisionConstraint {
    fn reset_solver_results(&mut self) {
        self.accumulated_impulse = Vec3::ZERO;
        for point in &mut self.manifold_points {
            point.resolved = None;
        }
    }

    fn write_resolved_contact(
        &mut self,
        point_index: usize,
        net_impulse: Vec3,
        net_push_out: Vec3,
        static_friction_ratio: f32,
    ) {
        let point = self.manifold_points.get_mut(point_index).unwrap_or_else(|| {
            panic!("solver wrote to manifold point {point_index} which does not exist")
        });

        let ratio = static_friction_ratio.clamp(0.0, 1.0);
        point.resolved = Some(ResolvedContact {
            net_push_out,
            net_impulse,
            static_friction_ratio: ratio,
        });

        // A slipping contact drags its anchors toward where it now touches.
        if ratio < 1.0 {
            let slide = 1.0 - ratio;
            for (anchor, current) in point
                .shape_anchor_points
                .iter_mut()
                .zip(point.contact_point.shape_contact_points)
            {
                *anchor = anchor.lerp(current, slide);
            }
        }
        self.accumulated_impulse += net_impulse;
    }
}

/// Container of the collision constraints produced by a detector for one tick.
#[derive(Debug, Default, Clone)]
pub struct CollisionConstraints {
    constraints: Vec<CollisionConstraint>,
}

impl CollisionConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: CollisionConstraint) -> usize {
        self.constraints.push(constraint);
        self.constraints.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&CollisionConstraint> {
        self.constraints.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CollisionConstraint> {
        self.constraints.get_mut(index)
    }

    pub fn as_slice(&self) -> &[CollisionConstraint] {
        &self.constraints
    }

    pub fn as_mut_slice(&mut self) -> &mut [CollisionConstraint] {
        &mut self.constraints
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollisionConstraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    pub fn take(&mut self) -> Vec<CollisionConstraint> {
        std::mem::take(&mut self.constraints)
    }

    /// Deepest penetration over every constraint.
    pub fn max_penetration(&self) -> f32 {
        self.constraints
            .iter()
            .map(CollisionConstraint::max_penetration)
            .fold(0.0, f32::max)
    }
}
