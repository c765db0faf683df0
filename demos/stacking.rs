use particle_evolution::*;

fn main() {
    let mut settings = EvolutionSettings::default();
    settings.solver.num_position_shock_propagation_iterations = 3;
    let mut evolution = Evolution::new(settings).expect("default settings are valid");

    evolution.add_particle(Particle::fixed(Vec3::ZERO).with_shape(Shape::plane(Vec3::Y)));

    let half_extents = Vec3::new(1.0, 0.25, 1.0);
    let pedestal = evolution.add_particle(
        Particle::dynamic(Vec3::new(0.0, 0.25, 0.0), MassProperties::solid_box(half_extents, 4.0))
            .with_shape(Shape::cuboid(half_extents)),
    );
    let spheres: Vec<_> = (0..5)
        .map(|i| {
            evolution.add_particle(
                Particle::dynamic(Vec3::new(0.0, 1.0 + i as f32, 0.0), MassProperties::solid_sphere(0.5, 1.0))
                    .with_shape(Shape::sphere(0.5)),
            )
        })
        .collect();

    for _ in 0..120 {
        evolution.advance(1.0 / 60.0, 2, 0.0);
    }

    if let Some(particle) = evolution.particle(pedestal) {
        println!("pedestal: y = {:.3}", particle.x.y);
    }
    for (level, handle) in spheres.iter().enumerate() {
        if let Some(particle) = evolution.particle(*handle) {
            println!("sphere {level}: y = {:.3}, x = {:.4}", particle.x.y, particle.x.x);
        }
    }
    println!(
        "{} collision constraints, {} position iterations in the last tick",
        evolution.collision_constraints().len(),
        evolution.profiler().position_iterations
    );
}
