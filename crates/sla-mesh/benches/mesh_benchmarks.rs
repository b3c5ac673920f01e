//! Benchmarks for mesh indexing and collision queries.
//!
//! Run with: cargo bench -p sla-mesh
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p sla-mesh -- --save-baseline main
//! 2. After changes: cargo bench -p sla-mesh -- --baseline main

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};
use sla_mesh::{CollisionOracle, IndexedMesh, Mesh, Vertex};

// =============================================================================
// Test Mesh Generation
// =============================================================================

/// Create a UV sphere with `n` rings and `2n` segments.
fn create_sphere(n: u32, radius: f64) -> Mesh {
    let mut mesh = Mesh::new();
    let segments = 2 * n;

    for i in 0..=n {
        let theta = std::f64::consts::PI * i as f64 / n as f64;
        for j in 0..segments {
            let phi = 2.0 * std::f64::consts::PI * j as f64 / segments as f64;
            mesh.vertices.push(Vertex::from_coords(
                radius * theta.sin() * phi.cos(),
                radius * theta.sin() * phi.sin(),
                radius * theta.cos(),
            ));
        }
    }

    for i in 0..n {
        for j in 0..segments {
            let a = i * segments + j;
            let b = i * segments + (j + 1) % segments;
            let c = a + segments;
            let d = b + segments;
            mesh.faces.push([a, c, b]);
            mesh.faces.push([b, c, d]);
        }
    }

    mesh
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for n in [16u32, 64, 128] {
        let mesh = create_sphere(n, 10.0);
        group.throughput(Throughput::Elements(mesh.face_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(mesh.face_count()), &mesh, |b, m| {
            b.iter(|| IndexedMesh::new(black_box(m.clone())))
        });
    }

    group.finish();
}

fn bench_ray_cast(c: &mut Criterion) {
    let index = IndexedMesh::new(create_sphere(128, 10.0)).expect("valid sphere");
    let origins: Vec<Point3<f64>> = (0..256)
        .map(|i| {
            let t = i as f64 / 256.0 * 16.0 - 8.0;
            Point3::new(t, -t * 0.5, 20.0)
        })
        .collect();

    let mut group = c.benchmark_group("ray_cast");
    group.throughput(Throughput::Elements(origins.len() as u64));
    group.bench_function("downward_256", |b| {
        b.iter(|| {
            for o in &origins {
                black_box(index.ray_hit(o, &-Vector3::z(), 0.1));
            }
        })
    });
    group.finish();
}

fn bench_nearest(c: &mut Criterion) {
    let index = IndexedMesh::new(create_sphere(128, 10.0)).expect("valid sphere");

    c.bench_function("nearest_surface_point", |b| {
        b.iter(|| black_box(index.nearest_surface_point(&Point3::new(3.0, 4.0, 12.0))))
    });

    c.bench_function("surface_normal", |b| {
        b.iter(|| black_box(index.surface_normal(&Point3::new(0.0, 0.0, 10.0), 0.2)))
    });
}

criterion_group!(benches, bench_index_build, bench_ray_cast, bench_nearest);
criterion_main!(benches);
