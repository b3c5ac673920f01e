//! Surface normal estimation at arbitrary points on a mesh.
//!
//! Support points rarely sit exactly in the interior of a face. When a
//! point lies on (or very close to) a vertex or an edge, the normals of
//! all incident faces are averaged so the resulting direction is not
//! biased toward whichever face the closest-point query happened to pick.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

use crate::index::IndexedMesh;
use crate::oracle::CollisionOracle;
use crate::tracing_ext::OperationTimer;

/// Normals closer than this (per component) count as the same direction.
const NORMAL_DEDUP_TOLERANCE: f64 = 1e-3;

/// Distance from `p` to the segment `a`-`b`.
fn distance_to_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

fn push_unique(normals: &mut Vec<Vector3<f64>>, n: Vector3<f64>) {
    if n.norm_squared() == 0.0 {
        return;
    }
    let duplicate = normals.iter().any(|m| {
        (m.x - n.x).abs() < NORMAL_DEDUP_TOLERANCE
            && (m.y - n.y).abs() < NORMAL_DEDUP_TOLERANCE
            && (m.z - n.z).abs() < NORMAL_DEDUP_TOLERANCE
    });
    if !duplicate {
        normals.push(n);
    }
}

/// Estimate the outward surface normal at `point`.
///
/// The point is first projected onto the mesh. If the projection lies
/// within `eps` of a vertex, the distinct normals of all faces around that
/// vertex are averaged. If it lies within `eps` of an edge, the normals of
/// the faces sharing the edge are averaged. Otherwise the face normal is
/// returned as is.
pub fn surface_normal(index: &IndexedMesh, point: &Point3<f64>, eps: f64) -> Vector3<f64> {
    let nearest = index.squared_distance(point);
    let face_id = nearest.face_id;
    let face = index.face(face_id);
    let tri = index.triangle(face_id);
    let corners = [tri.v0, tri.v1, tri.v2];
    let p = nearest.point;

    let mut neighbours: Vec<usize> = Vec::new();

    if let Some(vi) = (0..3).find(|&i| (p - corners[i]).norm() < eps) {
        neighbours.extend_from_slice(index.faces_of_vertex(face[vi]));
    } else if let Some(ei) =
        (0..3).find(|&i| distance_to_segment(&p, &corners[i], &corners[(i + 1) % 3]) < eps)
    {
        let (a, b) = (face[ei], face[(ei + 1) % 3]);
        neighbours.extend(
            index
                .faces_of_vertex(a)
                .iter()
                .copied()
                .filter(|&f| index.face(f).contains(&b)),
        );
    }

    if neighbours.is_empty() {
        return index.normal_by_face_id(face_id);
    }

    let mut normals = Vec::with_capacity(neighbours.len());
    for f in neighbours {
        push_unique(&mut normals, index.normal_by_face_id(f));
    }

    let sum: Vector3<f64> = normals.iter().sum();
    sum.try_normalize(f64::EPSILON)
        .unwrap_or_else(|| index.normal_by_face_id(face_id))
}

/// Estimate normals for many points in parallel.
///
/// `check` is called with each point index before its normal is computed;
/// the first error it returns aborts the whole batch and is passed through.
pub fn estimate_normals<O, E, F>(
    oracle: &O,
    points: &[Point3<f64>],
    eps: f64,
    check: F,
) -> Result<Vec<Vector3<f64>>, E>
where
    O: CollisionOracle + ?Sized,
    E: Send,
    F: Fn(usize) -> Result<(), E> + Sync,
{
    let _timer = OperationTimer::new("estimate_normals");

    let normals: Vec<Vector3<f64>> = points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            check(i)?;
            Ok(oracle.surface_normal(p, eps))
        })
        .collect::<Result<_, E>>()?;

    debug!(count = normals.len(), "Estimated surface normals");
    Ok(normals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mesh, Vertex};

    /// A 2x2 square split into two triangles, plus a folded flap along x = 2.
    fn make_fold() -> IndexedMesh {
        let mut mesh = Mesh::new();
        mesh.vertices = vec![
            Vertex::from_coords(0.0, 0.0, 0.0),
            Vertex::from_coords(2.0, 0.0, 0.0),
            Vertex::from_coords(2.0, 2.0, 0.0),
            Vertex::from_coords(0.0, 2.0, 0.0),
            Vertex::from_coords(2.0, 0.0, -2.0),
            Vertex::from_coords(2.0, 2.0, -2.0),
        ];
        // Top faces point -z; the flap points +x
        mesh.faces = vec![[0, 2, 1], [0, 3, 2], [1, 5, 2], [1, 4, 5]];
        IndexedMesh::new(mesh).unwrap()
    }

    #[test]
    fn test_interior_point_uses_face_normal() {
        let index = make_fold();
        let n = surface_normal(&index, &Point3::new(0.5, 1.2, 0.0), 0.01);
        assert!((n.z + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_shared_flat_edge_is_deduplicated() {
        let index = make_fold();
        // On the diagonal shared by the two coplanar faces
        let n = surface_normal(&index, &Point3::new(1.0, 1.0, 0.0), 0.01);
        assert!((n.z + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fold_edge_averages_normals() {
        let index = make_fold();
        let n = surface_normal(&index, &Point3::new(2.0, 1.0, 0.0), 0.01);
        let expected = Vector3::new(1.0, 0.0, -1.0).normalize();
        assert!((n - expected).norm() < 1e-9);
    }

    #[test]
    fn test_estimate_normals_cancelled() {
        let index = make_fold();
        let points = vec![Point3::new(0.5, 0.5, 0.0); 64];
        let stopped = estimate_normals(&index, &points, 0.01, |i| {
            if i == 40 { Err("stopped") } else { Ok(()) }
        });
        assert_eq!(stopped.unwrap_err(), "stopped");

        let normals = estimate_normals(&index, &points, 0.01, |_| Ok::<(), ()>(())).unwrap();
        assert_eq!(normals.len(), 64);
        assert!(normals.iter().all(|n| (n.z + 1.0).abs() < 1e-9));
    }
}
