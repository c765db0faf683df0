use approx::assert_relative_eq;
use particle_evolution::*;

const DT: f32 = 1.0 / 60.0;

fn evolution_with_ground(settings: EvolutionSettings) -> Evolution {
    let mut evolution = Evolution::new(settings).expect("valid settings");
    evolution.add_particle(Particle::fixed(Vec3::ZERO).with_shape(Shape::plane(Vec3::Y)));
    evolution
}

#[test]
fn box_lands_flat_with_full_manifold() {
    let mut evolution = evolution_with_ground(EvolutionSettings::default());
    let half_extents = Vec3::splat(0.5);
    let crate_box = evolution.add_particle(
        Particle::dynamic(Vec3::new(0.0, 1.0, 0.0), MassProperties::solid_box(half_extents, 2.0))
            .with_shape(Shape::cuboid(half_extents)),
    );

    for _ in 0..180 {
        evolution.advance(DT, 1, 0.0);
    }

    let particle = evolution.particle(crate_box).expect("box");
    assert_relative_eq!(particle.x.y, 0.5, epsilon = 0.03);
    assert!(particle.r.angle_between(Quat::IDENTITY) < 0.01);
    let constraint = &evolution.collision_constraints().as_slice()[0];
    assert_eq!(constraint.num_manifold_points(), 4);
    assert!(constraint.max_penetration() < 0.02);
}

#[test]
fn incremental_manifold_supports_a_resting_box() {
    let mut settings = EvolutionSettings::default();
    settings.collision.incremental = true;
    let mut evolution = evolution_with_ground(settings);
    let half_extents = Vec3::new(0.5, 0.25, 0.5);
    let crate_box = evolution.add_particle(
        Particle::dynamic(Vec3::new(0.0, 0.6, 0.0), MassProperties::solid_box(half_extents, 1.0))
            .with_shape(Shape::cuboid(half_extents)),
    );

    for _ in 0..180 {
        evolution.advance(DT, 1, 0.0);
    }

    let particle = evolution.particle(crate_box).expect("box");
    assert_relative_eq!(particle.x.y, 0.25, epsilon = 0.03);
    assert!(particle.r.angle_between(Quat::IDENTITY) < 0.05);
    let constraint = &evolution.collision_constraints().as_slice()[0];
    assert!(constraint.use_incremental_collision_detection());
    assert!(constraint.num_manifold_points() > 1);
}

#[test]
fn capsule_rests_on_its_side() {
    let mut evolution = evolution_with_ground(EvolutionSettings::default());
    // Local Y axis laid along world X.
    let rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
    let capsule = evolution.add_particle(
        Particle::dynamic(Vec3::new(0.0, 0.6, 0.0), MassProperties::solid_capsule(0.3, 0.5, 1.0))
            .with_rotation(rotation)
            .with_shape(Shape::capsule(0.3, 0.5)),
    );

    for _ in 0..180 {
        evolution.advance(DT, 1, 0.0);
    }

    let particle = evolution.particle(capsule).expect("capsule");
    assert_relative_eq!(particle.x.y, 0.3, epsilon = 0.03);
    assert!(particle.v.length() < 0.1);
}

#[test]
fn sphere_rests_on_static_box() {
    let mut evolution = Evolution::new(EvolutionSettings::default()).expect("valid settings");
    evolution.add_particle(Particle::fixed(Vec3::ZERO).with_shape(Shape::cuboid(Vec3::new(2.0, 0.5, 2.0))));
    let sphere = evolution.add_particle(
        Particle::dynamic(Vec3::new(0.0, 1.5, 0.0), MassProperties::solid_sphere(0.5, 1.0))
            .with_shape(Shape::sphere(0.5)),
    );

    for _ in 0..180 {
        evolution.advance(DT, 1, 0.0);
    }

    assert_relative_eq!(evolution.particle(sphere).expect("sphere").x.y, 1.0, epsilon = 0.03);
}

#[test]
fn resting_contact_reports_supporting_push_out() {
    let mut evolution = evolution_with_ground(EvolutionSettings::default());
    evolution.add_particle(
        Particle::dynamic(Vec3::new(0.0, 0.5, 0.0), MassProperties::solid_sphere(0.5, 1.0))
            .with_shape(Shape::sphere(0.5)),
    );
    for _ in 0..30 {
        evolution.advance(DT, 1, 0.0);
    }

    let point = evolution.collision_constraints().as_slice()[0].manifold_points()[0];
    let resolved = point.resolved.expect("solver output written back");
    assert!(resolved.net_push_out.y > 0.0);
    assert!(point.world_contact_normal.dot(Vec3::Y) > 0.99);
}

#[test]
fn separated_bodies_produce_no_constraints() {
    let mut settings = EvolutionSettings::default();
    settings.gravity = Vec3::ZERO;
    let mut evolution = evolution_with_ground(settings);
    evolution.add_particle(
        Particle::dynamic(Vec3::new(0.0, 3.0, 0.0), MassProperties::default()).with_shape(Shape::sphere(0.5)),
    );
    evolution.advance(DT, 1, 0.0);
    assert!(evolution.collision_constraints().is_empty());
}
