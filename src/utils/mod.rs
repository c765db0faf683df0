//! Utility helpers including math extensions, allocators, logging, profiling, and SIMD helpers.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;
pub mod simd;

pub use allocator::{Arena, ParticleHandle};
pub use math::*;
pub use profiling::EvolutionProfiler;
