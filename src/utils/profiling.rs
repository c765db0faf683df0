use std::time::{Duration, Instant};

/// Per-tick timing and iteration counters, reset at the start of every `advance`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvolutionProfiler {
    pub integrate_time: Duration,
    pub kinematic_time: Duration,
    pub detection_time: Duration,
    pub gather_time: Duration,
    pub position_time: Duration,
    pub velocity_time: Duration,
    pub projection_time: Duration,
    pub scatter_time: Duration,
    pub total_time: Duration,

    pub substeps: usize,
    pub particle_count: usize,
    pub constraint_count: usize,
    pub solver_body_count: usize,
    pub position_iterations: usize,
    pub velocity_iterations: usize,
    pub projection_iterations: usize,
}

impl EvolutionProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        let total_us = self.total_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        log::debug!(
            "evolution: {} particles, {} constraints, {} solver bodies, {} substeps, {:.2} ms",
            self.particle_count,
            self.constraint_count,
            self.solver_body_count,
            self.substeps,
            self.total_time.as_secs_f32() * 1000.0
        );
        for (label, time) in [
            ("integrate", self.integrate_time),
            ("kinematics", self.kinematic_time),
            ("detect", self.detection_time),
            ("gather", self.gather_time),
            ("position", self.position_time),
            ("velocity", self.velocity_time),
            ("projection", self.projection_time),
            ("scatter", self.scatter_time),
        ] {
            log::debug!(
                "  {label:<10} {:.3} ms ({:.1}%)",
                time.as_secs_f32() * 1000.0,
                (time.as_micros() as f32 / total_us) * 100.0
            );
        }
        log::debug!(
            "  iterations: position {}, velocity {}, projection {}",
            self.position_iterations,
            self.velocity_iterations,
            self.projection_iterations
        );
    }
}

/// Adds the elapsed time of its scope onto a profiler field.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for PhaseTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
