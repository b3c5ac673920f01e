//! Integration tests for mesh indexing and collision queries.
//!
//! Run with: cargo test -p sla-mesh --test integration_tests

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use sla_mesh::{
    CollisionOracle, ErrorCode, IndexedMesh, Mesh, MeshError, Vertex, estimate_normals,
};

// =============================================================================
// Test Mesh Creation Helpers
// =============================================================================

/// Axis-aligned box with outward normals.
fn create_box(min: [f64; 3], max: [f64; 3]) -> Mesh {
    let mut mesh = Mesh::new();
    let [x0, y0, z0] = min;
    let [x1, y1, z1] = max;

    mesh.vertices = vec![
        Vertex::from_coords(x0, y0, z0),
        Vertex::from_coords(x1, y0, z0),
        Vertex::from_coords(x1, y1, z0),
        Vertex::from_coords(x0, y1, z0),
        Vertex::from_coords(x0, y0, z1),
        Vertex::from_coords(x1, y0, z1),
        Vertex::from_coords(x1, y1, z1),
        Vertex::from_coords(x0, y1, z1),
    ];

    mesh.faces = vec![
        [0, 2, 1],
        [0, 3, 2], // bottom
        [4, 5, 6],
        [4, 6, 7], // top
        [0, 1, 5],
        [0, 5, 4], // front
        [2, 3, 7],
        [2, 7, 6], // back
        [0, 4, 7],
        [0, 7, 3], // left
        [1, 2, 6],
        [1, 6, 5], // right
    ];

    mesh
}

/// Two stacked slabs with a gap between them.
fn create_two_slabs() -> Mesh {
    let mut mesh = create_box([0.0, 0.0, 0.0], [20.0, 20.0, 2.0]);
    mesh.merge(&create_box([0.0, 0.0, 10.0], [20.0, 20.0, 12.0]));
    mesh
}

// =============================================================================
// Index construction
// =============================================================================

#[test]
fn test_index_rejects_empty_mesh() {
    let err = IndexedMesh::new(Mesh::new()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EmptyMesh);
}

#[test]
fn test_index_rejects_infinite_coordinate() {
    let mut mesh = create_box([0.0; 3], [1.0; 3]);
    mesh.vertices[0].position.z = f64::INFINITY;
    let err = IndexedMesh::new(mesh).unwrap_err();
    assert!(matches!(err, MeshError::InvalidCoordinate { vertex_index: 0, .. }));
}

#[test]
fn test_index_rejects_all_degenerate() {
    let mut mesh = Mesh::new();
    mesh.vertices = vec![
        Vertex::from_coords(0.0, 0.0, 0.0),
        Vertex::from_coords(1.0, 0.0, 0.0),
        Vertex::from_coords(2.0, 0.0, 0.0),
    ];
    mesh.faces = vec![[0, 1, 2]];
    let err = IndexedMesh::new(mesh).unwrap_err();
    assert_eq!(err.code().as_str(), "MESH-3001");
}

// =============================================================================
// Ray queries
// =============================================================================

#[test]
fn test_downward_ray_between_slabs() {
    let index = IndexedMesh::new(create_two_slabs()).unwrap();
    let hit = index.ray_hit(&Point3::new(10.0, 10.0, 10.0), &-Vector3::z(), 0.1);

    assert!(hit.is_hit());
    assert!(!hit.is_inside());
    assert_relative_eq!(hit.distance, 8.0, epsilon = 1e-9);
    assert_relative_eq!(hit.position().z, 2.0, epsilon = 1e-9);
    assert_relative_eq!(hit.normal.z, 1.0, epsilon = 1e-9);
}

#[test]
fn test_ray_misses_beside_model() {
    let index = IndexedMesh::new(create_two_slabs()).unwrap();
    let hit = index.ray_hit(&Point3::new(30.0, 10.0, 5.0), &-Vector3::z(), 0.1);
    assert!(!hit.is_hit());
    assert!(hit.face_id.is_none());
}

#[test]
fn test_diagonal_ray() {
    let index = IndexedMesh::new(create_box([0.0; 3], [10.0; 3])).unwrap();
    let dir = Vector3::new(1.0, 0.0, 1.0).normalize();
    let hit = index.query_ray_hit(&Point3::new(-2.0, 5.0, 3.0), &dir);
    assert_relative_eq!(hit.distance, 2.0 * 2f64.sqrt(), epsilon = 1e-9);
}

#[test]
fn test_ground_level_is_min_z() {
    let mut mesh = create_two_slabs();
    mesh.translate(Vector3::new(0.0, 0.0, 3.0));
    let index = IndexedMesh::new(mesh).unwrap();
    assert_relative_eq!(index.ground_level(), 3.0);
}

// =============================================================================
// Closest point and normals
// =============================================================================

#[test]
fn test_nearest_surface_point_inside_gap() {
    let index = IndexedMesh::new(create_two_slabs()).unwrap();
    let np = index.nearest_surface_point(&Point3::new(10.0, 10.0, 3.0));
    assert_relative_eq!(np.distance_sq, 1.0, epsilon = 1e-9);
    assert_relative_eq!(np.point.z, 2.0, epsilon = 1e-9);
}

#[test]
fn test_corner_normal_is_averaged() {
    let index = IndexedMesh::new(create_box([0.0; 3], [10.0; 3])).unwrap();
    let n = index.surface_normal(&Point3::new(0.0, 0.0, 0.0), 0.1);
    let expected = Vector3::new(-1.0, -1.0, -1.0).normalize();
    assert_relative_eq!(n, expected, epsilon = 1e-9);
}

#[test]
fn test_estimate_normals_bottom_face() {
    let index = IndexedMesh::new(create_box([0.0; 3], [10.0; 3])).unwrap();
    let points: Vec<_> = (1..9)
        .map(|i| Point3::new(i as f64, 2.5, 0.0))
        .collect();
    let normals = estimate_normals(&index, &points, 0.1, |_| Ok::<(), ()>(())).unwrap();
    assert_eq!(normals.len(), points.len());
    for n in normals {
        assert_relative_eq!(n.z, -1.0, epsilon = 1e-9);
    }
}
