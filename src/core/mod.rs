//! Core types describing particles, shapes, bounds, and shared data.

pub mod bounds;
pub mod particle;
pub mod particles;
pub mod shapes;
pub mod types;

pub use bounds::Aabb;
pub use particle::{KinematicTarget, ObjectState, Particle};
pub use particles::Particles;
pub use shapes::Shape;
pub use types::{MassProperties, Material, MaterialPairProperties, MixingMode, Transform, Velocity};
