use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rigid pose: position and orientation of a particle or shape frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.conjugate() * (point - self.position)
    }

    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation.conjugate() * vector
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }
}

/// Linear and angular velocity of a particle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Mass and diagonal body-space inertia.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Vec3,
    pub center_of_mass: Vec3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Vec3::ONE,
            center_of_mass: Vec3::ZERO,
        }
    }
}

impl MassProperties {
    pub fn solid_sphere(radius: f32, mass: f32) -> Self {
        Self {
            mass,
            inertia: Vec3::splat(0.4 * mass * radius * radius),
            center_of_mass: Vec3::ZERO,
        }
    }

    pub fn solid_box(half_extents: Vec3, mass: f32) -> Self {
        let l = half_extents * 2.0;
        let factor = mass / 12.0;
        Self {
            mass,
            inertia: Vec3::new(
                factor * (l.y * l.y + l.z * l.z),
                factor * (l.x * l.x + l.z * l.z),
                factor * (l.x * l.x + l.y * l.y),
            ),
            center_of_mass: Vec3::ZERO,
        }
    }

    /// Capsule aligned along local Y; cylinder and hemisphere caps combined.
    pub fn solid_capsule(radius: f32, half_height: f32, mass: f32) -> Self {
        let height = half_height * 2.0;
        let cylinder_mass = mass * 0.6;
        let sphere_mass = (mass - cylinder_mass) / 2.0;
        let side = (1.0 / 12.0) * cylinder_mass * (3.0 * radius * radius + height * height);
        let sphere = 0.4 * sphere_mass * radius * radius;
        Self {
            mass,
            inertia: Vec3::new(side, 0.5 * cylinder_mass * radius * radius, side) + Vec3::splat(sphere),
            center_of_mass: Vec3::ZERO,
        }
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.mass.abs() < f32::EPSILON {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    pub fn inverse_inertia(&self) -> Vec3 {
        let invert = |value: f32| {
            if value.abs() < f32::EPSILON {
                0.0
            } else {
                1.0 / value
            }
        };
        Vec3::new(
            invert(self.inertia.x),
            invert(self.inertia.y),
            invert(self.inertia.z),
        )
    }
}

/// Material coefficients that feed the contact constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub restitution: f32,
    pub static_friction: f32,
    pub dynamic_friction: f32,
    /// Normal speed (as an acceleration scaled by the step) below which restitution is ignored.
    pub restitution_threshold: f32,
    pub mixing: MaterialMixing,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.0,
            static_friction: 0.5,
            dynamic_friction: 0.3,
            restitution_threshold: crate::config::DEFAULT_RESTITUTION_THRESHOLD,
            mixing: MaterialMixing::default(),
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            restitution: 0.8,
            static_friction: 1.2,
            dynamic_friction: 1.0,
            ..Self::default()
        }
    }

    pub fn steel() -> Self {
        Self {
            restitution: 0.4,
            static_friction: 0.58,
            dynamic_friction: 0.44,
            ..Self::default()
        }
    }

    pub fn ice() -> Self {
        Self {
            restitution: 0.05,
            static_friction: 0.05,
            dynamic_friction: 0.03,
            ..Self::default()
        }
    }

    pub fn frictionless() -> Self {
        Self {
            static_friction: 0.0,
            dynamic_friction: 0.0,
            ..Self::default()
        }
    }

    pub fn combine_with(&self, other: &Self) -> MaterialPairProperties {
        let friction_mode = self.mixing.friction.resolve(other.mixing.friction);
        let restitution_mode = self.mixing.restitution.resolve(other.mixing.restitution);

        let static_friction = friction_mode.combine(self.static_friction, other.static_friction);
        let dynamic_friction = friction_mode
            .combine(self.dynamic_friction, other.dynamic_friction)
            .min(static_friction);

        MaterialPairProperties {
            static_friction,
            dynamic_friction,
            restitution: restitution_mode.combine(self.restitution, other.restitution),
            restitution_threshold: self.restitution_threshold.max(other.restitution_threshold),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MaterialMixing {
    pub friction: MixingMode,
    pub restitution: MixingMode,
}

impl MaterialMixing {
    pub fn with_friction(mut self, mode: MixingMode) -> Self {
        self.friction = mode;
        self
    }

    pub fn with_restitution(mut self, mode: MixingMode) -> Self {
        self.restitution = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum MixingMode {
    #[default]
    Average,
    Min,
    Max,
    GeometricMean,
}

impl MixingMode {
    fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.max(0.0) * b.max(0.0)).sqrt(),
        }
    }

    fn resolve(self, other: MixingMode) -> MixingMode {
        if matches!(self, MixingMode::Average) {
            other
        } else {
            self
        }
    }
}

/// Coefficients resolved for one colliding pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialPairProperties {
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub restitution: f32,
    pub restitution_threshold: f32,
}

impl Default for MaterialPairProperties {
    fn default() -> Self {
        Material::default().combine_with(&Material::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing_modes_combine_expected_values() {
        assert!((MixingMode::Average.combine(0.6, 0.2) - 0.4).abs() < 1e-5);
        assert!((MixingMode::Min.combine(0.6, 0.2) - 0.2).abs() < 1e-5);
        assert!((MixingMode::Max.combine(0.6, 0.2) - 0.6).abs() < 1e-5);
        let expected = (0.6_f32 * 0.2_f32).sqrt();
        assert!((MixingMode::GeometricMean.combine(0.6, 0.2) - expected).abs() < 1e-5);
    }

    #[test]
    fn non_average_mode_wins_when_mixing() {
        let mut a = Material::default();
        a.static_friction = 0.8;
        a.dynamic_friction = 0.6;
        a.mixing = a.mixing.with_friction(MixingMode::Min);

        let mut b = Material::default();
        b.static_friction = 0.4;
        b.dynamic_friction = 0.2;

        let pair = b.combine_with(&a);
        assert!((pair.static_friction - 0.4).abs() < 1e-5);
        assert!((pair.dynamic_friction - 0.2).abs() < 1e-5);
    }

    #[test]
    fn dynamic_friction_never_exceeds_static() {
        let mut a = Material::default();
        a.static_friction = 0.1;
        a.dynamic_friction = 0.9;
        let pair = a.combine_with(&a);
        assert!(pair.dynamic_friction <= pair.static_friction);
    }

    #[test]
    fn transform_round_trips_points() {
        let t = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.7));
        let p = Vec3::new(-0.4, 0.5, 2.0);
        let back = t.inverse_transform_point(t.transform_point(p));
        assert!((back - p).length() < 1e-5);
    }
}
