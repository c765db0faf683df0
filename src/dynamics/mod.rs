//! Simulation dynamics: integration, kinematic driving, solver bodies, and constraint rules.

pub mod collision_adapter;
pub mod collision_container;
pub mod constraint_rule;
pub mod contact_solver;
pub mod distance_joint;
pub mod integrator;
pub mod island;
pub mod kinematics;
pub mod solver_body;

pub use collision_adapter::CollisionSolverAdapter;
pub use collision_container::CollisionSolverContainer;
pub use constraint_rule::{ConstraintRule, TickContext};
pub use contact_solver::{ContactSolver, ContactSolverMaterial, ContactSolverPoint};
pub use distance_joint::{DistanceJoint, DistanceJointRule};
pub use integrator::{Integrator, SimulationSpace};
pub use island::{compute_levels, ParticleLevels};
pub use kinematics::{apply_kinematic_target, apply_kinematic_targets};
pub use solver_body::{SolverBody, SolverBodyContainer, SolverBodyIndex};
