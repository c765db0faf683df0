use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    bounds::Aabb,
    shapes::Shape,
    types::{MassProperties, Material, Transform},
};
use crate::utils::math::world_inverse_inertia;

/// How the evolution treats a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ObjectState {
    #[default]
    Dynamic,
    /// Driven by user targets; infinite mass to the solver.
    Kinematic,
    Static,
}

/// Per-particle kinematic driving state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum KinematicTarget {
    #[default]
    None,
    /// Zero the velocity on the next step, then fall back to `None`.
    Reset,
    /// Move to the target pose by the end of the tick.
    Position(Transform),
    /// Keep moving with the current velocity.
    Velocity,
}

/// Rigid particle owned by the simulation.
///
/// `x`/`r` are the committed pose, `p`/`q` the predicted pose for the step
/// being solved. Positions refer to the actor origin; the center of mass sits
/// at `center_of_mass` in the actor frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    pub x: Vec3,
    pub p: Vec3,
    pub r: Quat,
    pub q: Quat,
    pub v: Vec3,
    pub w: Vec3,
    pub pre_v: Vec3,
    pub pre_w: Vec3,
    pub center_of_mass: Vec3,
    pub mass: f32,
    pub inv_mass: f32,
    /// Diagonal inverse inertia in body space.
    pub inv_inertia: Vec3,
    pub acceleration: Vec3,
    pub angular_acceleration: Vec3,
    pub linear_impulse: Vec3,
    pub angular_impulse: Vec3,
    pub kinematic_target: KinematicTarget,
    pub state: ObjectState,
    pub shape: Option<Shape>,
    pub material: Material,
    pub gravity_enabled: bool,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub previous_x: Vec3,
    pub previous_r: Quat,
    pub world_bounds: Aabb,
}

impl Default for Particle {
    fn default() -> Self {
        let mut particle = Self {
            x: Vec3::ZERO,
            p: Vec3::ZERO,
            r: Quat::IDENTITY,
            q: Quat::IDENTITY,
            v: Vec3::ZERO,
            w: Vec3::ZERO,
            pre_v: Vec3::ZERO,
            pre_w: Vec3::ZERO,
            center_of_mass: Vec3::ZERO,
            mass: 1.0,
            inv_mass: 1.0,
            inv_inertia: Vec3::ONE,
            acceleration: Vec3::ZERO,
            angular_acceleration: Vec3::ZERO,
            linear_impulse: Vec3::ZERO,
            angular_impulse: Vec3::ZERO,
            kinematic_target: KinematicTarget::None,
            state: ObjectState::Dynamic,
            shape: None,
            material: Material::default(),
            gravity_enabled: true,
            linear_damping: 0.0,
            angular_damping: 0.0,
            previous_x: Vec3::ZERO,
            previous_r: Quat::IDENTITY,
            world_bounds: Aabb::from_point(Vec3::ZERO),
        };
        particle.set_mass_properties(MassProperties::default());
        particle
    }
}

impl Particle {
    pub fn dynamic(position: Vec3, mass_properties: MassProperties) -> Self {
        let mut particle = Self::default().with_position(position);
        particle.set_mass_properties(mass_properties);
        particle
    }

    pub fn kinematic(position: Vec3) -> Self {
        let mut particle = Self::default().with_position(position);
        particle.state = ObjectState::Kinematic;
        particle.gravity_enabled = false;
        particle.clear_mass();
        particle
    }

    pub fn fixed(position: Vec3) -> Self {
        let mut particle = Self::default().with_position(position);
        particle.state = ObjectState::Static;
        particle.gravity_enabled = false;
        particle.clear_mass();
        particle
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.x = position;
        self.p = position;
        self.previous_x = position;
        self.world_bounds = Aabb::from_point(position);
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.r = rotation;
        self.q = rotation;
        self.previous_r = rotation;
        self
    }

    pub fn with_velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.v = linear;
        self.w = angular;
        self.pre_v = linear;
        self.pre_w = angular;
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self.update_world_bounds(0.0);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn set_mass_properties(&mut self, props: MassProperties) {
        if self.state != ObjectState::Dynamic {
            self.clear_mass();
            return;
        }
        self.mass = props.mass;
        self.inv_mass = props.inverse_mass();
        self.inv_inertia = props.inverse_inertia();
        self.center_of_mass = props.center_of_mass;
    }

    fn clear_mass(&mut self) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inv_inertia = Vec3::ZERO;
    }

    pub fn is_dynamic(&self) -> bool {
        self.state == ObjectState::Dynamic
    }

    pub fn is_kinematic(&self) -> bool {
        self.state == ObjectState::Kinematic
    }

    pub fn is_static(&self) -> bool {
        self.state == ObjectState::Static
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.x, self.r)
    }

    pub fn predicted_transform(&self) -> Transform {
        Transform::new(self.p, self.q)
    }

    /// World-space inverse inertia at the predicted rotation.
    pub fn world_inv_inertia(&self) -> glam::Mat3 {
        world_inverse_inertia(self.q, self.inv_inertia)
    }

    pub fn add_force(&mut self, force: Vec3) {
        if self.is_dynamic() {
            self.acceleration += force * self.inv_mass;
        }
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        if self.is_dynamic() {
            self.angular_acceleration += self.world_inv_inertia() * torque;
        }
    }

    pub fn add_impulse(&mut self, impulse: Vec3, world_point: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_impulse += impulse;
        let com = self.p + self.q * self.center_of_mass;
        self.angular_impulse += (world_point - com).cross(impulse);
    }

    pub fn clear_accumulators(&mut self) {
        self.acceleration = Vec3::ZERO;
        self.angular_acceleration = Vec3::ZERO;
    }

    /// Recomputes the swept bounds covering both the committed and predicted poses.
    pub fn update_world_bounds(&mut self, thickness: f32) {
        let committed = self.transform();
        let predicted = self.predicted_transform();
        self.world_bounds = match self.shape.as_ref().and_then(|shape| shape.world_bounds(&committed)) {
            Some(start) => {
                let end = self
                    .shape
                    .as_ref()
                    .and_then(|shape| shape.world_bounds(&predicted))
                    .unwrap_or(start);
                start.union(&end).thickened(thickness)
            }
            None => {
                let mut bounds = Aabb::from_point(self.x);
                bounds.extend(self.p);
                bounds.thickened(thickness)
            }
        };
    }
}
