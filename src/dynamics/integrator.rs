use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    config::SimulationSpaceSettings,
    core::{particle::Particle, particles::Particles},
    utils::math::integrate_rotation,
};

/// Motion of the frame the simulation runs in, expressed in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSpace {
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub linear_acceleration: Vec3,
    pub angular_acceleration: Vec3,
}

impl Default for SimulationSpace {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            linear_acceleration: Vec3::ZERO,
            angular_acceleration: Vec3::ZERO,
        }
    }
}

/// Frame motion rotated into simulation space and pre-scaled by the blend settings.
#[derive(Debug, Clone, Copy, Default)]
struct LocalFrame {
    linear_acceleration: Vec3,
    angular_acceleration: Vec3,
    angular_velocity: Vec3,
    linear_drag: Vec3,
    angular_drag: Vec3,
    coriolis: f32,
    centrifugal: f32,
}

impl LocalFrame {
    fn new(space: &SimulationSpace, settings: &SimulationSpaceSettings) -> Option<Self> {
        if !settings.enabled || settings.master_alpha == 0.0 {
            return None;
        }
        let to_local = space.rotation.conjugate();
        let alpha = settings.master_alpha;
        let angular_velocity = to_local * space.angular_velocity;
        Some(Self {
            linear_acceleration: to_local * space.linear_acceleration * (settings.linear_acceleration_alpha * alpha),
            angular_acceleration: to_local * space.angular_acceleration * (settings.angular_acceleration_alpha * alpha),
            angular_velocity,
            linear_drag: to_local * space.linear_velocity * (settings.linear_drag * alpha),
            angular_drag: angular_velocity * (settings.angular_drag * alpha),
            coriolis: settings.coriolis_alpha * alpha,
            centrifugal: settings.centrifugal_alpha * alpha,
        })
    }

    /// Linear and angular pseudo-accelerations felt by a body at `com` moving with `v`.
    fn accelerations(&self, com: Vec3, v: Vec3) -> (Vec3, Vec3) {
        let omega = self.angular_velocity;
        let linear = -self.linear_acceleration
            - self.angular_acceleration.cross(com)
            - 2.0 * self.coriolis * omega.cross(v)
            - self.centrifugal * omega.cross(omega.cross(com))
            - self.linear_drag;
        let angular = -self.angular_acceleration - self.angular_drag;
        (linear, angular)
    }
}

/// Explicit integrator producing the predicted pose of every dynamic particle.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub gravity: Vec3,
    pub bounds_thickness: f32,
    pub space_settings: SimulationSpaceSettings,
}

impl Integrator {
    pub fn new(gravity: Vec3, bounds_thickness: f32, space_settings: SimulationSpaceSettings) -> Self {
        Self {
            gravity,
            bounds_thickness,
            space_settings,
        }
    }

    fn integrate_velocity(&self, particle: &mut Particle, dt: f32, frame: Option<&LocalFrame>) {
        particle.pre_v = particle.v;
        particle.pre_w = particle.w;
        if !particle.is_dynamic() {
            return;
        }

        let mut linear_acceleration = particle.acceleration;
        if particle.gravity_enabled {
            linear_acceleration += self.gravity;
        }
        let mut angular_acceleration = particle.angular_acceleration;
        if let Some(frame) = frame {
            let com = particle.x + particle.r * particle.center_of_mass;
            let (linear, angular) = frame.accelerations(com, particle.v);
            linear_acceleration += linear;
            angular_acceleration += angular;
        }

        particle.v += linear_acceleration * dt + particle.linear_impulse * particle.inv_mass;
        let impulse_response = particle.world_inv_inertia() * particle.angular_impulse;
        particle.w += angular_acceleration * dt + impulse_response;
        particle.linear_impulse = Vec3::ZERO;
        particle.angular_impulse = Vec3::ZERO;

        particle.v *= (1.0 - particle.linear_damping * dt).max(0.0);
        particle.w *= (1.0 - particle.angular_damping * dt).max(0.0);
    }

    /// Predicts `p`/`q` by rotating about the center of mass.
    fn integrate_position(&self, particle: &mut Particle, dt: f32) {
        if !particle.is_dynamic() {
            particle.p = particle.x;
            particle.q = particle.r;
            return;
        }
        let com = particle.x + particle.r * particle.center_of_mass;
        let predicted_com = com + particle.v * dt;
        particle.q = integrate_rotation(particle.r, particle.w, dt);
        particle.p = predicted_com - particle.q * particle.center_of_mass;
    }

    pub fn step(&self, particles: &mut Particles, dt: f32, space: &SimulationSpace) {
        let frame = LocalFrame::new(space, &self.space_settings);
        for (_, particle) in particles.iter_mut() {
            self.integrate_velocity(particle, dt, frame.as_ref());
            self.integrate_position(particle, dt);
            particle.update_world_bounds(self.bounds_thickness);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MassProperties;
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 60.0;

    fn integrator() -> Integrator {
        Integrator::new(Vec3::new(0.0, -10.0, 0.0), 0.0, SimulationSpaceSettings::default())
    }

    #[test]
    fn gravity_and_impulse_feed_the_prediction() {
        let mut particles = Particles::new();
        let handle = particles.insert(Particle::dynamic(Vec3::ZERO, MassProperties::default()));
        particles
            .get_mut(handle)
            .expect("particle")
            .add_impulse(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);

        integrator().step(&mut particles, DT, &SimulationSpace::default());

        let particle = particles.expect(handle);
        assert_relative_eq!(particle.v.y, -10.0 * DT, epsilon = 1e-6);
        assert_relative_eq!(particle.v.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(particle.p.x, 2.0 * DT, epsilon = 1e-6);
        assert_eq!(particle.x, Vec3::ZERO);
        assert_eq!(particle.linear_impulse, Vec3::ZERO);
        assert_eq!(particle.pre_v, Vec3::ZERO);
    }

    #[test]
    fn static_particles_keep_their_pose() {
        let mut particles = Particles::new();
        let handle = particles.insert(Particle::fixed(Vec3::ONE));
        integrator().step(&mut particles, DT, &SimulationSpace::default());
        let particle = particles.expect(handle);
        assert_eq!(particle.p, Vec3::ONE);
        assert_eq!(particle.v, Vec3::ZERO);
    }

    #[test]
    fn accelerating_frame_pushes_particles_backwards() {
        let mut particles = Particles::new();
        let mut particle = Particle::dynamic(Vec3::ZERO, MassProperties::default());
        particle.gravity_enabled = false;
        let handle = particles.insert(particle);

        let mut integrator = integrator();
        integrator.space_settings.enabled = true;
        integrator.space_settings.master_alpha = 0.5;
        let space = SimulationSpace {
            linear_acceleration: Vec3::new(4.0, 0.0, 0.0),
            ..SimulationSpace::default()
        };
        integrator.step(&mut particles, DT, &space);

        assert_relative_eq!(particles.expect(handle).v.x, -2.0 * DT, epsilon = 1e-6);
    }

    #[test]
    fn disabled_simulation_space_is_ignored() {
        let mut particles = Particles::new();
        let mut particle = Particle::dynamic(Vec3::X, MassProperties::default());
        particle.gravity_enabled = false;
        let handle = particles.insert(particle);
        let space = SimulationSpace {
            angular_velocity: Vec3::new(0.0, 3.0, 0.0),
            ..SimulationSpace::default()
        };
        integrator().step(&mut particles, DT, &space);
        assert_eq!(particles.expect(handle).v, Vec3::ZERO);
    }

    #[test]
    fn rotating_frame_adds_centrifugal_push() {
        let mut particles = Particles::new();
        let mut particle = Particle::dynamic(Vec3::X, MassProperties::default());
        particle.gravity_enabled = false;
        let handle = particles.insert(particle);

        let mut integrator = integrator();
        integrator.space_settings.enabled = true;
        let space = SimulationSpace {
            angular_velocity: Vec3::new(0.0, 2.0, 0.0),
            ..SimulationSpace::default()
        };
        integrator.step(&mut particles, DT, &space);

        // omega x (omega x r) = -4 x for r = x, so the push is +4 x.
        assert_relative_eq!(particles.expect(handle).v.x, 4.0 * DT, epsilon = 1e-5);
    }
}
