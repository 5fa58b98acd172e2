use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use hybridverb::error::Stage;
use hybridverb::{GeometryError, SimulationError};
use hybridverb::geom::triangles::mirror_point;
use hybridverb::sim::acoustics::histogram::DirectionalHistogram;
use hybridverb::sim::acoustics::{OutputSink, WavSink};
use hybridverb::sim::engine::voxel_grid::VoxelGrid;
use hybridverb::sim::engine::{FnProgress, NoProgress, RandomEngine, SimulationProgress};
use hybridverb::sim::image_source::{ImageSourceCollector, ImageSourceFinder};
use hybridverb::sim::rays::{RayTracer, RayTracerParams, StochasticProcessor};
use hybridverb::{
    Capsule, Point, Receiver, Scene, SimulationOutcome, SimulationParameters, Surface, Vector,
    run_hybrid_simulation,
};

const C: f64 = 343.0;

fn unit_cube() -> Scene {
    Scene::from_box(
        Point::new(0., 0., 0.),
        Point::new(1., 1., 1.),
        Surface::uniform(0.1, 0.1),
    )
    .unwrap()
}

fn cube_params() -> SimulationParameters {
    let mut params = SimulationParameters::new();
    params.rays.rays = 2000;
    params.rays.batch_size = 500;
    params.rays.max_image_source_order = 2;
    params.output_sample_rate = 8000;
    params.duration = Some(0.05);
    params.seed = 11;
    params
}

/// Candidate paths collected from `rays` traced rays, seeded identically.
fn candidates(
    scene: &Scene,
    source: Point,
    receiver: Point,
    order: usize,
    rays: usize,
) -> Vec<Vec<usize>> {
    let grid = VoxelGrid::auto(scene);
    let mut params = RayTracerParams::new();
    params.rays = rays;
    params.batch_size = 250;
    params.max_image_source_order = order;
    let tracer = RayTracer::new(&grid, source, receiver, &params, 10.0);
    let mut engine = RandomEngine::new(5);
    let cancel = AtomicBool::new(false);
    tracer
        .trace(&mut engine, ImageSourceCollector::new(order), &cancel, &mut NoProgress)
        .output
}

#[test]
fn test_unit_cube_direct_sound_and_first_echo() {
    let _ = env_logger::builder().is_test(true).try_init();
    let scene = unit_cube();
    let source = Point::new(0.3, 0.4, 0.5);
    let receiver = Receiver::omni(Point::new(0.7, 0.6, 0.5));
    let cancel = AtomicBool::new(false);

    let outcome = run_hybrid_simulation(
        &scene,
        source,
        &receiver,
        &cube_params(),
        &cancel,
        &mut NoProgress,
    )
    .unwrap();
    assert!(!outcome.is_partial());
    let output = outcome.output();
    assert_eq!(output.rays_traced, 2000);
    assert_eq!(output.response.len(), 400);
    assert!(output.response.channels[0].iter().all(|s| s.is_finite()));

    let d = source.distance(&receiver.position);
    let direct = output
        .impulses
        .iter()
        .find(|i| i.order() == 0)
        .expect("direct sound");
    assert!((direct.arrival_time(C) - d / C).abs() < 1e-12);
    assert!((direct.pressure[0] - 1.0 / d).abs() < 1e-12);

    // Shortest first-order path: mirror the source across every wall
    let shortest = (0..scene.num_triangles())
        .map(|t| {
            let [p0, _, _] = scene.triangle_points(t);
            mirror_point(source, p0, &scene.normal(t)).distance(&receiver.position)
        })
        .fold(f64::INFINITY, f64::min);
    let first_echo = output
        .impulses
        .iter()
        .filter(|i| i.order() > 0)
        .map(|i| i.arrival_time(C))
        .fold(f64::INFINITY, f64::min);
    assert!(first_echo > direct.arrival_time(C));
    assert!((first_echo - shortest / C).abs() < 1e-9);

    // Every one of the six walls gives a first-order reflection
    let first_order = output.impulses.iter().filter(|i| i.order() == 1).count();
    assert_eq!(first_order, 6);
}

#[test]
fn test_order_zero_is_direct_sound_only() {
    let scene = unit_cube();
    let grid = VoxelGrid::auto(&scene);
    let source = Point::new(0.2, 0.2, 0.2);
    let receiver = Point::new(0.8, 0.5, 0.3);
    let finder = ImageSourceFinder::new(&grid, source, receiver, None);

    let none = candidates(&scene, source, receiver, 0, 200);
    assert!(none.is_empty());
    let impulses = finder.find(&none);
    assert_eq!(impulses.len(), 1);
    let d = source.distance(&receiver);
    assert!((impulses[0].distance - d).abs() < 1e-12);
    assert!(impulses[0].pressure.iter().all(|&p| (p - 1.0 / d).abs() < 1e-12));
    let towards_source = Vector::from_points(receiver, source).normalize().unwrap();
    assert!(impulses[0].direction.is_close(&towards_source));
}

#[test]
fn test_higher_order_extends_lower_order() {
    let scene = unit_cube();
    let grid = VoxelGrid::auto(&scene);
    let source = Point::new(0.3, 0.4, 0.5);
    let receiver = Point::new(0.7, 0.6, 0.5);
    let finder = ImageSourceFinder::new(&grid, source, receiver, None);

    let low = finder.find(&candidates(&scene, source, receiver, 1, 1000));
    let high = finder.find(&candidates(&scene, source, receiver, 2, 1000));
    assert!(high.len() > low.len());
    for impulse in &low {
        assert!(
            high.iter().any(|h| h.order() == impulse.order()
                && (h.distance - impulse.distance).abs() < 1e-9),
            "missing path {:?}",
            impulse.path
        );
    }
}

#[test]
fn test_histogram_grows_with_ray_count() {
    let scene = unit_cube();
    let grid = VoxelGrid::auto(&scene);
    let source = Point::new(0.3, 0.4, 0.5);
    let receiver = Point::new(0.7, 0.6, 0.5);

    let mut previous = 0.0;
    for rays in [100, 200, 400] {
        let mut params = RayTracerParams::new();
        params.rays = rays;
        params.batch_size = 100;
        params.max_image_source_order = 0;
        let tracer = RayTracer::new(&grid, source, receiver, &params, 3.0);
        let processor = StochasticProcessor::new(
            &scene,
            receiver,
            0.1,
            C,
            0,
            None,
            DirectionalHistogram::new(1000.0, 4, 2),
        );
        let mut engine = RandomEngine::new(9);
        let cancel = AtomicBool::new(false);
        let output = tracer
            .trace(&mut engine, processor, &cancel, &mut NoProgress)
            .output;
        let total = output.raw_total();
        assert!(total >= previous, "{rays} rays: {total} < {previous}");
        previous = total;
    }
    assert!(previous > 0.0);
}

#[test]
fn test_mesh_cancellation_returns_completed_steps() {
    let scene = unit_cube();
    let source = Point::new(0.3, 0.4, 0.5);
    let receiver = Receiver::omni(Point::new(0.7, 0.6, 0.5));
    let mut params = cube_params();
    params.rays.rays = 200;
    params.rays.batch_size = 100;
    let cancel = AtomicBool::new(false);
    let mut progress = FnProgress(|p: &SimulationProgress| {
        if p.stage == Stage::MeshSolve && p.completed == 25 {
            cancel.store(true, Ordering::Release);
        }
    });

    let outcome =
        run_hybrid_simulation(&scene, source, &receiver, &params, &cancel, &mut progress).unwrap();
    match &outcome {
        SimulationOutcome::Partial { output, stage } => {
            assert_eq!(*stage, Stage::MeshSolve);
            assert_eq!(output.mesh_steps, 25);
            assert_eq!(output.rays_traced, 200);
            assert_eq!(output.response.len(), 400);
        }
        SimulationOutcome::Complete(_) => panic!("expected a partial outcome"),
    }
}

#[test]
fn test_surface_coefficients_are_checked_before_simulating() {
    let result = Scene::from_box(
        Point::new(0., 0., 0.),
        Point::new(1., 1., 1.),
        Surface::uniform(1.5, -0.5),
    );
    let err: SimulationError = result.unwrap_err().into();
    assert!(matches!(
        err,
        SimulationError::Geometry(GeometryError::InvalidSurface { surface: 0, .. })
    ));
    assert!(err.to_string().contains("[0, 1]"));
}

#[test]
fn test_box_winding_is_consistent() {
    let scene = unit_cube();
    let centre = Point::new(0.5, 0.5, 0.5);

    // Every directed edge is used once, and its reverse once
    let mut edges: HashMap<(usize, usize), usize> = HashMap::new();
    for tri in scene.triangles() {
        let [a, b, c] = tri.vertices;
        for edge in [(a, b), (b, c), (c, a)] {
            *edges.entry(edge).or_insert(0) += 1;
        }
    }
    for (&(a, b), &count) in &edges {
        assert_eq!(count, 1);
        assert_eq!(edges.get(&(b, a)), Some(&1));
    }

    for t in 0..scene.num_triangles() {
        let outward = Vector::from_points(centre, scene.triangle_centroid(t));
        assert!(scene.normal(t).dot(&outward) > 0.0);
    }
    assert!((scene.volume() - 1.0).abs() < 1e-12);
}

#[test]
fn test_two_capsules_written_as_wav() {
    let scene = unit_cube();
    let source = Point::new(0.3, 0.4, 0.5);
    let receiver = Receiver::new(
        Point::new(0.7, 0.6, 0.5),
        vec![
            Capsule::omni(),
            Capsule::microphone(Vector::new(-1.0, 0.0, 0.0), 0.5),
        ],
    );
    let mut params = cube_params();
    params.rays.rays = 500;
    let cancel = AtomicBool::new(false);
    let outcome =
        run_hybrid_simulation(&scene, source, &receiver, &params, &cancel, &mut NoProgress)
            .unwrap();
    let response = outcome.response();
    assert_eq!(response.num_channels(), 2);

    let dir = tempfile::tempdir().unwrap();
    let mut sink = WavSink::new(dir.path(), "cube");
    sink.write(response).unwrap();
    assert_eq!(sink.written().len(), 2);

    let reader = hound::WavReader::open(sink.channel_path(1)).unwrap();
    assert_eq!(reader.spec().sample_rate, 8000);
    assert_eq!(reader.len() as usize, response.len());
}
