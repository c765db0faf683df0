use particle_evolution::*;

fn main() {
    let mut settings = EvolutionSettings::default();
    settings.solver.parallel = true;
    let mut evolution = Evolution::new(settings).expect("default settings are valid");

    evolution.add_particle(Particle::fixed(Vec3::ZERO).with_shape(Shape::plane(Vec3::Y)));

    let mut handles = Vec::new();
    for i in 0..10 {
        for j in 0..10 {
            let material = if (i + j) % 2 == 0 {
                Material::rubber()
            } else {
                Material::steel()
            };
            let position = Vec3::new(i as f32 * 1.2, 2.0 + (i * j % 5) as f32, j as f32 * 1.2);
            handles.push(
                evolution.add_particle(
                    Particle::dynamic(position, MassProperties::solid_sphere(0.5, 1.0))
                        .with_shape(Shape::sphere(0.5))
                        .with_material(material),
                ),
            );
        }
    }

    for frame in 0..180 {
        evolution.advance(1.0 / 60.0, 1, 0.0);
        if frame % 30 == 0 {
            let lowest = handles
                .iter()
                .filter_map(|handle| evolution.particle(*handle))
                .map(|particle| particle.x.y)
                .fold(f32::MAX, f32::min);
            println!(
                "frame {frame:>3}: {} contacts, lowest sphere at y = {lowest:.3}",
                evolution.collision_constraints().len()
            );
        }
    }

    let profiler = evolution.profiler();
    println!(
        "last tick: {:.3} ms total, {:.3} ms position solve",
        profiler.total_time.as_secs_f32() * 1000.0,
        profiler.position_time.as_secs_f32() * 1000.0
    );
}
