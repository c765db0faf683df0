//! Collision detection: broad phase, narrow phase, and persistent contact constraints.

pub mod broadphase;
pub mod constraint;
pub mod detector;
pub mod narrowphase;

pub use broadphase::{BroadPhase, SpatialGrid};
pub use constraint::{
    CollisionConstraint, CollisionConstraints, ConstraintSolverSink, ContactPoint, ManifoldPoint,
    ResolvedContact,
};
pub use detector::{BasicCollisionDetector, CollisionDetector};
pub use narrowphase::NarrowPhase;
