//! Particle Evolution – quasi position-based rigid-body evolution for Rust.
//!
//! The crate advances a set of rigid particles through fixed substeps:
//! explicit integration, kinematic driving, collision detection, and a
//! three-phase constraint solve (position, velocity, projection) with
//! persistent friction anchors and shock propagation for stacks.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod evolution;
pub mod utils;

pub use glam::{Mat3, Quat, Vec3};

pub use collision::{
    BasicCollisionDetector, CollisionConstraint, CollisionConstraints, CollisionDetector,
    ConstraintSolverSink, ManifoldPoint,
};
pub use config::{
    CollisionDetectorSettings, EvolutionSettings, SimulationSpaceSettings, SolverSettings,
    SolverType,
};
pub use core::{
    Aabb, KinematicTarget, MassProperties, Material, MixingMode, ObjectState, Particle, Particles,
    Shape, Transform,
};
pub use dynamics::{
    CollisionSolverContainer, ConstraintRule, DistanceJoint, DistanceJointRule, SimulationSpace,
    SolverBody, SolverBodyContainer, TickContext,
};
pub use error::{EvolutionError, Result};
pub use evolution::Evolution;
pub use utils::{allocator::ParticleHandle, profiling::EvolutionProfiler};
