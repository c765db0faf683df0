use glam::Vec3;

use crate::{
    core::{
        particle::{KinematicTarget, Particle},
        particles::Particles,
    },
    utils::math::{angular_velocity, integrate_rotation},
};

/// Advances one kinematic particle for the substep ending at `step_fraction`
/// of the tick. `step_fraction == 1` lands exactly on a position target.
pub fn apply_kinematic_target(particle: &mut Particle, dt: f32, step_fraction: f32) {
    match particle.kinematic_target {
        KinematicTarget::None => {}
        KinematicTarget::Reset => {
            particle.v = Vec3::ZERO;
            particle.w = Vec3::ZERO;
            particle.p = particle.x;
            particle.q = particle.r;
            particle.kinematic_target = KinematicTarget::None;
        }
        KinematicTarget::Position(target) => {
            let is_last_step = (step_fraction - 1.0).abs() <= f32::EPSILON;
            if is_last_step {
                particle.p = target.position;
                particle.q = target.rotation;
            } else {
                particle.p = particle.x.lerp(target.position, step_fraction);
                particle.q = particle.r.slerp(target.rotation, step_fraction).normalize();
            }
            if dt > 0.0 {
                particle.v = (particle.p - particle.x) / dt;
                particle.w = angular_velocity(particle.r, particle.q, dt);
            }
            // Without a fresh target the particle comes to rest next tick.
            if is_last_step {
                particle.kinematic_target = KinematicTarget::Reset;
            }
        }
        KinematicTarget::Velocity => {
            particle.p = particle.x + particle.v * dt;
            particle.q = integrate_rotation(particle.r, particle.w, dt);
        }
    }
}

/// Applies [`apply_kinematic_target`] to every kinematic particle and refreshes its bounds.
pub fn apply_kinematic_targets(particles: &mut Particles, dt: f32, step_fraction: f32, bounds_thickness: f32) {
    for (_, particle) in particles.iter_mut() {
        if !particle.is_kinematic() {
            continue;
        }
        apply_kinematic_target(particle, dt, step_fraction);
        particle.update_world_bounds(bounds_thickness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transform;
    use approx::assert_relative_eq;
    use glam::Quat;

    const DT: f32 = 0.1;

    #[test]
    fn position_target_snaps_on_last_step() {
        let mut particle = Particle::kinematic(Vec3::ZERO);
        let target = Transform::new(Vec3::new(1.0, 2.0, 0.0), Quat::from_rotation_y(0.5));
        particle.kinematic_target = KinematicTarget::Position(target);

        apply_kinematic_target(&mut particle, DT, 1.0);

        assert_eq!(particle.p, target.position);
        assert_eq!(particle.q, target.rotation);
        assert_relative_eq!(particle.v.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(particle.v.y, 20.0, epsilon = 1e-5);
        assert_relative_eq!(particle.w.y, 5.0, epsilon = 0.1);
        assert_eq!(particle.kinematic_target, KinematicTarget::Reset);
    }

    #[test]
    fn position_target_interpolates_before_last_step() {
        let mut particle = Particle::kinematic(Vec3::ZERO);
        let target = Transform::from_position(Vec3::new(4.0, 0.0, 0.0));
        particle.kinematic_target = KinematicTarget::Position(target);

        apply_kinematic_target(&mut particle, DT, 0.25);

        assert_relative_eq!(particle.p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(particle.v.x, 10.0, epsilon = 1e-5);
        assert!(matches!(particle.kinematic_target, KinematicTarget::Position(_)));
    }

    #[test]
    fn reset_zeroes_velocity_once() {
        let mut particle = Particle::kinematic(Vec3::ZERO).with_velocity(Vec3::X, Vec3::Y);
        particle.kinematic_target = KinematicTarget::Reset;
        apply_kinematic_target(&mut particle, DT, 1.0);
        assert_eq!(particle.v, Vec3::ZERO);
        assert_eq!(particle.w, Vec3::ZERO);
        assert_eq!(particle.kinematic_target, KinematicTarget::None);
    }

    #[test]
    fn velocity_mode_advances_with_current_velocity() {
        let mut particle = Particle::kinematic(Vec3::ZERO).with_velocity(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
        particle.kinematic_target = KinematicTarget::Velocity;
        apply_kinematic_target(&mut particle, DT, 0.5);
        assert_relative_eq!(particle.p.z, 0.3, epsilon = 1e-6);
        assert_eq!(particle.kinematic_target, KinematicTarget::Velocity);
    }

    #[test]
    fn only_kinematic_particles_are_driven() {
        let mut particles = Particles::new();
        let mut fixed = Particle::fixed(Vec3::ZERO);
        fixed.kinematic_target = KinematicTarget::Position(Transform::from_position(Vec3::ONE));
        let fixed = particles.insert(fixed);
        apply_kinematic_targets(&mut particles, DT, 1.0, 0.0);
        assert_eq!(particles.expect(fixed).p, Vec3::ZERO);
    }
}
