//! Benchmarks for support tree generation.
//!
//! Run with: cargo bench -p sla-supports
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p sla-supports -- --save-baseline main
//! 2. After changes: cargo bench -p sla-supports -- --baseline main

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::Point3;
use sla_mesh::{IndexedMesh, Mesh, Vertex};
use sla_supports::spatial::{cluster, convex_hull_rings};
use sla_supports::{JobControl, SupportConfig, SupportPoint, generate_with_oracle};

// =============================================================================
// Test Input Generation
// =============================================================================

/// Axis-aligned box with outward-facing triangles.
fn create_box(min: [f64; 3], max: [f64; 3]) -> Mesh {
    let mut mesh = Mesh::new();
    for &(x, y, z) in &[
        (min[0], min[1], min[2]),
        (max[0], min[1], min[2]),
        (max[0], max[1], min[2]),
        (min[0], max[1], min[2]),
        (min[0], min[1], max[2]),
        (max[0], min[1], max[2]),
        (max[0], max[1], max[2]),
        (min[0], max[1], max[2]),
    ] {
        mesh.vertices.push(Vertex::from_coords(x, y, z));
    }
    mesh.faces = vec![
        [0, 2, 1],
        [0, 3, 2], // bottom
        [4, 5, 6],
        [4, 6, 7], // top
        [0, 1, 5],
        [0, 5, 4],
        [2, 3, 7],
        [2, 7, 6],
        [1, 2, 6],
        [1, 6, 5],
        [3, 0, 4],
        [3, 4, 7],
    ];
    mesh
}

/// Small deterministic generator so runs are comparable.
struct Lcg(u64);

impl Lcg {
    fn next_unit(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// `side * side` points spread over the bottom face of a box spanning
/// `[0, extent]` in x and y, each nudged off its grid slot.
fn jittered_points(side: usize, extent: f64, z: f64) -> Vec<SupportPoint> {
    let mut rng = Lcg(0x5eed);
    let pitch = extent / (side + 1) as f64;
    let mut points = Vec::with_capacity(side * side);
    for i in 1..=side {
        for j in 1..=side {
            let dx = (rng.next_unit() - 0.5) * 0.4 * pitch;
            let dy = (rng.next_unit() - 0.5) * 0.4 * pitch;
            points.push(SupportPoint::at(
                i as f64 * pitch + dx,
                j as f64 * pitch + dy,
                z,
            ));
        }
    }
    points
}

fn positions(points: &[SupportPoint]) -> Vec<Point3<f64>> {
    points.iter().map(|p| p.pos).collect()
}

// =============================================================================
// Generation Benchmarks
// =============================================================================

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    group.sample_size(10);

    let mesh = create_box([0.0, 0.0, 10.0], [40.0, 40.0, 20.0]);
    let index = IndexedMesh::new(mesh).expect("box indexes");
    let config = SupportConfig::default();
    let control = JobControl::new();

    for side in [3usize, 6, 12] {
        let points = jittered_points(side, 40.0, 10.0);
        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("box_bottom", points.len()),
            &points,
            |b, points| {
                b.iter(|| generate_with_oracle(&index, black_box(points), &config, &control))
            },
        );
    }

    group.finish();
}

fn bench_mesh_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_steps");
    group.sample_size(10);

    let mesh = create_box([0.0, 0.0, 10.0], [40.0, 40.0, 20.0]);
    let index = IndexedMesh::new(mesh).expect("box indexes");
    let points = jittered_points(6, 40.0, 10.0);
    let control = JobControl::new();

    for steps in [8u32, 24, 45] {
        let config = SupportConfig::default().with_mesh_steps(steps);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &config, |b, config| {
            b.iter(|| generate_with_oracle(&index, &points, black_box(config), &control))
        });
    }

    group.finish();
}

// =============================================================================
// Spatial Benchmarks
// =============================================================================

fn bench_cluster(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster");

    for side in [10usize, 30, 60] {
        let points = positions(&jittered_points(side, 100.0, 0.0));
        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(points.len()),
            &points,
            |b, points| {
                b.iter(|| cluster(black_box(points), 5.0, 9, |a, b| (a - b).norm() < 5.0))
            },
        );
    }

    group.finish();
}

fn bench_hull_rings(c: &mut Criterion) {
    let mut group = c.benchmark_group("hull_rings");

    for side in [4usize, 8, 16] {
        let points = positions(&jittered_points(side, 50.0, 0.0));
        let members: Vec<usize> = (0..points.len()).collect();
        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(points.len()),
            &members,
            |b, members| b.iter(|| convex_hull_rings(black_box(members), |i| points[i])),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_generate,
    bench_mesh_steps,
    bench_cluster,
    bench_hull_rings
);
criterion_main!(benches);
