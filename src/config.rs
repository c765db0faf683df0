//! Configuration constants and settings for the evolution and its solvers.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{EvolutionError, Result};

/// Default gravity vector applied in the evolution (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Substeps longer than this are integrated anyway but logged as suspicious.
pub const MAX_STABLE_STEP_DT: f32 = 1.0 / 15.0;

pub const DEFAULT_POSITION_ITERATIONS: u32 = 8;
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 1;
pub const DEFAULT_PROJECTION_ITERATIONS: u32 = 1;

/// Largest separating speed the position phase may introduce (units/s).
pub const DEFAULT_MAX_PUSH_OUT_VELOCITY: f32 = 10.0;

/// Restitution is ignored for approach speeds below `threshold * dt`.
pub const DEFAULT_RESTITUTION_THRESHOLD: f32 = 20.0;

/// Distance at which detected contact points are discarded.
pub const DEFAULT_CULL_DISTANCE: f32 = 0.05;

/// Shape-space distance under which a new manifold point is treated as the
/// continuation of a previous tick's point.
pub const DEFAULT_MANIFOLD_MATCH_TOLERANCE: f32 = 0.05;

/// Default cell size for the broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: f32 = 2.0;

/// Per-iteration correction below which a constraint reports itself solved.
pub const DEFAULT_POSITION_TOLERANCE: f32 = 1.0e-5;

/// Numeric policy for the contact solver. Passed into every tick by reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Caps the per-tick separation speed added by position corrections. Zero disables the cap.
    pub max_push_out_velocity: f32,
    /// Trailing position iterations that solve friction.
    pub num_position_friction_iterations: u32,
    /// Trailing velocity iterations that solve dynamic friction.
    pub num_velocity_friction_iterations: u32,
    /// Trailing position iterations that use shock propagation.
    pub num_position_shock_propagation_iterations: u32,
    /// Trailing velocity iterations that use shock propagation.
    pub num_velocity_shock_propagation_iterations: u32,
    /// Inverse mass multiplier for the lower body of a contact during shock propagation.
    pub shock_propagation_inv_mass_scale: f32,
    pub position_tolerance: f32,
    /// Run every iteration even when all constraints report convergence.
    pub force_max_iterations: bool,
    /// Use the `Vec3A` gather kernel.
    pub use_vector_gather: bool,
    /// Use rayon for gather, scatter, and colored solve batches.
    pub parallel: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_push_out_velocity: DEFAULT_MAX_PUSH_OUT_VELOCITY,
            num_position_friction_iterations: 4,
            num_velocity_friction_iterations: 1,
            num_position_shock_propagation_iterations: 3,
            num_velocity_shock_propagation_iterations: 1,
            shock_propagation_inv_mass_scale: 0.0,
            position_tolerance: DEFAULT_POSITION_TOLERANCE,
            force_max_iterations: false,
            use_vector_gather: false,
            parallel: false,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.max_push_out_velocity.is_finite() || self.max_push_out_velocity < 0.0 {
            return Err(EvolutionError::InvalidSettings {
                field: "max_push_out_velocity",
                reason: "must be finite and non-negative",
            });
        }
        if !(0.0..=1.0).contains(&self.shock_propagation_inv_mass_scale) {
            return Err(EvolutionError::InvalidSettings {
                field: "shock_propagation_inv_mass_scale",
                reason: "must be within [0, 1]",
            });
        }
        if self.position_tolerance < 0.0 {
            return Err(EvolutionError::InvalidSettings {
                field: "position_tolerance",
                reason: "must be non-negative",
            });
        }
        Ok(())
    }
}

/// Contact generation and persistence policy for the built-in detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionDetectorSettings {
    /// Contacts separated by more than this are not generated.
    pub cull_distance: f32,
    pub manifold_match_tolerance: f32,
    pub broadphase_cell_size: f32,
    /// Start each manifold with its deepest point and grow it during the position phase.
    pub incremental: bool,
}

impl Default for CollisionDetectorSettings {
    fn default() -> Self {
        Self {
            cull_distance: DEFAULT_CULL_DISTANCE,
            manifold_match_tolerance: DEFAULT_MANIFOLD_MATCH_TOLERANCE,
            broadphase_cell_size: DEFAULT_BROADPHASE_CELL_SIZE,
            incremental: false,
        }
    }
}

impl CollisionDetectorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.cull_distance < 0.0 {
            return Err(EvolutionError::InvalidSettings {
                field: "cull_distance",
                reason: "must be non-negative",
            });
        }
        if self.broadphase_cell_size <= 0.0 {
            return Err(EvolutionError::InvalidSettings {
                field: "broadphase_cell_size",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Order in which constraint phases and velocity reconstruction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SolverType {
    /// Position, implicit velocity, velocity, corrections, projection.
    #[default]
    QuasiPbd,
    /// Position, corrections, projection, then velocity from the final positions.
    StandardPbd,
}

/// Pseudo-force blending for simulating inside a moving frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSpaceSettings {
    pub enabled: bool,
    /// Global multiplier applied to every effect below.
    pub master_alpha: f32,
    pub linear_acceleration_alpha: f32,
    /// Euler force from the frame's angular acceleration.
    pub angular_acceleration_alpha: f32,
    pub coriolis_alpha: f32,
    pub centrifugal_alpha: f32,
    /// Drag of the local linear velocity toward the frame velocity (1/s).
    pub linear_drag: f32,
    pub angular_drag: f32,
}

impl Default for SimulationSpaceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            master_alpha: 1.0,
            linear_acceleration_alpha: 1.0,
            angular_acceleration_alpha: 1.0,
            coriolis_alpha: 1.0,
            centrifugal_alpha: 1.0,
            linear_drag: 0.0,
            angular_drag: 0.0,
        }
    }
}

/// Top-level evolution configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    pub gravity: Vec3,
    pub num_position_iterations: u32,
    pub num_velocity_iterations: u32,
    pub num_projection_iterations: u32,
    pub solver_type: SolverType,
    /// Rewind by interpolating poses rather than integrating velocity backwards.
    pub rewind_lerp: bool,
    pub bounds_thickness: f32,
    pub solver: SolverSettings,
    pub collision: CollisionDetectorSettings,
    pub simulation_space: SimulationSpaceSettings,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            num_position_iterations: DEFAULT_POSITION_ITERATIONS,
            num_velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            num_projection_iterations: DEFAULT_PROJECTION_ITERATIONS,
            solver_type: SolverType::default(),
            rewind_lerp: true,
            bounds_thickness: 0.0,
            solver: SolverSettings::default(),
            collision: CollisionDetectorSettings::default(),
            simulation_space: SimulationSpaceSettings::default(),
        }
    }
}

impl EvolutionSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.is_finite() {
            return Err(EvolutionError::InvalidSettings {
                field: "gravity",
                reason: "must be finite",
            });
        }
        if self.bounds_thickness < 0.0 {
            return Err(EvolutionError::InvalidSettings {
                field: "bounds_thickness",
                reason: "must be non-negative",
            });
        }
        if self.solver.num_position_friction_iterations > self.num_position_iterations {
            return Err(EvolutionError::InvalidSettings {
                field: "num_position_friction_iterations",
                reason: "cannot exceed num_position_iterations",
            });
        }
        if self.solver.num_velocity_friction_iterations > self.num_velocity_iterations {
            return Err(EvolutionError::InvalidSettings {
                field: "num_velocity_friction_iterations",
                reason: "cannot exceed num_velocity_iterations",
            });
        }
        self.collision.validate()?;
        self.solver.validate()
    }
}
