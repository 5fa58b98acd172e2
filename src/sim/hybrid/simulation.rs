use std::sync::atomic::AtomicBool;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::Point;
use crate::error::{ConfigError, SimulationError, Stage};
use crate::sim::acoustics::filters::crossover;
use crate::sim::acoustics::histogram::DirectionalHistogram;
use crate::sim::acoustics::impulse_response::{ImpulseResponse, histogram_to_pressure};
use crate::sim::acoustics::receiver::Receiver;
use crate::sim::acoustics::resample::resample;
use crate::sim::engine::absorption::AirAbsorption;
use crate::sim::engine::voxel_grid::VoxelGrid;
use crate::sim::engine::{ProgressReporter, RandomEngine, SimulationProgress};
use crate::sim::image_source::{ImageSourceCollector, ImageSourceFinder, Impulse};
use crate::sim::rays::{RayTracer, Reflection, StochasticProcessor, VisualCapture};
use crate::sim::scene::Scene;
use crate::sim::waveguide::{
    ComputeQueue, CpuQueue, DirectionalOutput, Mesh, MeshSolver, ReflectionFilter, SoftSource,
};

use super::calibration::{
    capsule_mesh_signal, image_source_signal, mesh_calibration_factor, remove_dc,
};
use super::config::SimulationParameters;

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// One channel per receiver capsule.
    pub response: ImpulseResponse,
    /// Exact early reflections, direct sound included.
    pub impulses: Vec<Impulse>,
    /// Reflections of the first rays, for display.
    pub ray_paths: Vec<Vec<Reflection>>,
    pub rays_traced: usize,
    pub mesh_steps: usize,
}

#[derive(Debug, Clone)]
pub enum SimulationOutcome {
    Complete(SimulationOutput),
    /// The run was cancelled during `stage`. The output holds what was
    /// computed up to that point.
    Partial {
        output: SimulationOutput,
        stage: Stage,
    },
}

impl SimulationOutcome {
    pub fn output(&self) -> &SimulationOutput {
        match self {
            Self::Complete(output) | Self::Partial { output, .. } => output,
        }
    }

    pub fn into_output(self) -> SimulationOutput {
        match self {
            Self::Complete(output) | Self::Partial { output, .. } => output,
        }
    }

    pub fn response(&self) -> &ImpulseResponse {
        &self.output().response
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }
}

/// Runs the hybrid simulation with the mesh on the host [`CpuQueue`].
pub fn run_hybrid_simulation(
    scene: &Scene,
    source: Point,
    receiver: &Receiver,
    params: &SimulationParameters,
    cancel: &AtomicBool,
    progress: &mut dyn ProgressReporter,
) -> Result<SimulationOutcome, SimulationError> {
    run_hybrid_simulation_on(
        &CpuQueue::new(),
        scene,
        source,
        receiver,
        params,
        cancel,
        progress,
    )
}

/// Runs the hybrid simulation with the mesh on `queue`.
///
/// Parameters and positions are checked before anything is allocated.
/// Cancellation stops the current stage at its next batch or step
/// boundary; the stages after it are skipped and the outcome is partial.
pub fn run_hybrid_simulation_on<Q: ComputeQueue>(
    queue: &Q,
    scene: &Scene,
    source: Point,
    receiver: &Receiver,
    params: &SimulationParameters,
    cancel: &AtomicBool,
    progress: &mut dyn ProgressReporter,
) -> Result<SimulationOutcome, SimulationError> {
    params.validate()?;
    receiver.validate()?;
    let c = params.speed_of_sound;
    let timing = params.waveguide.timing(c)?;

    let grid = VoxelGrid::auto(scene);
    progress.report(&SimulationProgress {
        stage: Stage::Voxelisation,
        completed: 1,
        total: 1,
    });
    check_inside(&grid, "source", source)?;
    check_inside(&grid, "receiver", receiver.position)?;

    let duration = params.duration_for(scene);
    let output_rate = params.output_sample_rate;
    let len = sample_count(duration, f64::from(output_rate));
    log::info!(
        "Hybrid simulation: {:.3} s at {} Hz, {} capsule(s), crossover at {} Hz",
        duration,
        output_rate,
        receiver.capsules.len(),
        params.waveguide.cutoff
    );

    // Geometric part
    let mut engine = RandomEngine::new(params.seed);
    let ray_params = &params.rays;
    let order = ray_params.max_image_source_order;
    let air = ray_params
        .enable_air_absorption
        .then(AirAbsorption::standard);
    let tracer = RayTracer::new(&grid, source, receiver.position, ray_params, c * duration);
    let processors = (
        StochasticProcessor::new(
            scene,
            receiver.position,
            receiver.radius,
            c,
            order,
            air,
            DirectionalHistogram::new(
                ray_params.histogram_sample_rate,
                ray_params.azimuth_bins,
                ray_params.elevation_bins,
            ),
        ),
        ImageSourceCollector::new(order),
        VisualCapture::new(ray_params.visual_rays),
    );
    let trace = tracer.trace(&mut engine, processors, cancel, &mut *progress);
    let (stochastic, candidates, ray_paths) = trace.output;

    let mut partial = trace.cancelled.then_some(Stage::RayTracing);

    let finder = ImageSourceFinder::new(&grid, source, receiver.position, air);
    let impulses = finder.find(&candidates);
    progress.report(&SimulationProgress {
        stage: Stage::ImageSources,
        completed: 1,
        total: 1,
    });
    log::info!(
        "{} image sources from {} candidates",
        impulses.len(),
        candidates.len()
    );

    // Wave part
    let mesh = Mesh::build(&grid, timing.grid_spacing);
    let mesh_rate = timing.sample_rate();
    let source_node = mesh
        .nearest_node(source)
        .ok_or_else(|| outside_mesh("source", source))?;
    let receiver_node = mesh
        .nearest_node(receiver.position)
        .ok_or_else(|| outside_mesh("receiver", receiver.position))?;
    let filters = scene
        .surfaces()
        .iter()
        .map(|s| ReflectionFilter::design(s, mesh_rate))
        .collect();
    let courant_squared = timing.courant_squared(c);
    let mut solver = MeshSolver::new(queue, &mesh, filters, courant_squared)?;
    progress.report(&SimulationProgress {
        stage: Stage::MeshBuild,
        completed: 1,
        total: 1,
    });

    let steps = if partial.is_some() {
        0
    } else {
        sample_count(duration, mesh_rate)
    };
    let mut mesh_source = SoftSource {
        node: source_node,
        signal: vec![1.0],
    };
    let mut mesh_output = DirectionalOutput::new(&mesh, receiver_node, courant_squared.sqrt());
    let solve = solver.run(steps, &mut mesh_source, &mut [&mut mesh_output], cancel, progress)?;
    if solve.cancelled {
        partial = partial.or(Some(Stage::MeshSolve));
    }

    // Calibration and crossover, per capsule
    let fs = f64::from(output_rate);
    let cutoff = params.waveguide.cutoff;
    let factor = mesh_calibration_factor(timing.grid_spacing, mesh_rate, fs);
    let room_volume = scene.volume();
    let dirac_seed = engine.next_seed();

    let mut channels = Vec::with_capacity(receiver.capsules.len());
    for (index, capsule) in receiver.capsules.iter().enumerate() {
        // Same Dirac sequence on every channel keeps them coherent
        let mut rng = StdRng::seed_from_u64(dirac_seed);
        let histogram = stochastic
            .histogram
            .weighted_sum(|dir| capsule.energy_gain(dir));
        let mut geometric = histogram_to_pressure(&histogram, fs, len, room_volume, c, &mut rng);
        let early = image_source_signal(&impulses, capsule, c, fs, len);
        for (g, e) in geometric.iter_mut().zip(&early) {
            *g += e;
        }

        let raw = capsule_mesh_signal(capsule, &mesh_output.samples, cutoff);
        let mut wave = if raw.is_empty() {
            Vec::new()
        } else {
            resample(&remove_dc(&raw, mesh_rate), mesh_rate, fs)
                .map_err(SimulationError::Postprocessing)?
        };
        wave.resize(len, 0.0);
        wave.iter_mut().for_each(|s| *s *= factor);

        let (low, _) = crossover(&wave, fs, cutoff);
        let (_, high) = crossover(&geometric, fs, cutoff);
        channels.push(low.iter().zip(&high).map(|(l, h)| l + h).collect());

        progress.report(&SimulationProgress {
            stage: Stage::Postprocessing,
            completed: index + 1,
            total: receiver.capsules.len(),
        });
    }

    let output = SimulationOutput {
        response: ImpulseResponse::new(output_rate, channels),
        impulses,
        ray_paths,
        rays_traced: trace.rays_traced,
        mesh_steps: solve.steps_completed,
    };
    Ok(match partial {
        Some(stage) => {
            log::info!("Simulation cancelled during {}; returning partial output", stage);
            SimulationOutcome::Partial { output, stage }
        }
        None => SimulationOutcome::Complete(output),
    })
}

/// Samples covering `duration` at `rate`, ignoring rounding noise in the
/// product.
fn sample_count(duration: f64, rate: f64) -> usize {
    (duration * rate - 1e-9).ceil().max(0.0) as usize
}

fn check_inside(
    grid: &VoxelGrid<'_>,
    what: &'static str,
    position: Point,
) -> Result<(), ConfigError> {
    if grid.contains(position) {
        Ok(())
    } else {
        Err(ConfigError::OutsideScene {
            what,
            position: position.to_string(),
        })
    }
}

fn outside_mesh(what: &'static str, position: Point) -> ConfigError {
    ConfigError::OutsideScene {
        what,
        position: format!("{position} (no mesh node nearby)"),
    }
}
