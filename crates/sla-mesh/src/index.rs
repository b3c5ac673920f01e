//! BVH-accelerated mesh index for ray casting and closest-point queries.
//!
//! [`IndexedMesh`] validates a [`Mesh`] once, precomputes face normals and
//! vertex-face adjacency, and builds a median-split bounding volume
//! hierarchy. After construction it is immutable and can be queried from
//! many threads at once.

use nalgebra::{Point3, Vector3};
use tracing::{debug, warn};

use crate::error::{MeshError, MeshResult};
use crate::oracle::{CollisionOracle, HitResult, NearestPoint};
use crate::tracing_ext::OperationTimer;
use crate::types::{Mesh, Triangle};

/// Tolerance for the ray/triangle determinant and the minimum hit distance.
const RAY_EPSILON: f64 = 1e-9;

/// Barycentric slack so rays through a shared edge hit at least one face.
const BARY_EPSILON: f64 = 1e-9;

/// Padding applied to leaf boxes for numerical robustness.
const AABB_PADDING: f64 = 1e-7;

/// Box around a subtree.
#[derive(Debug, Clone, Copy)]
struct Aabb {
    lo: Point3<f64>,
    hi: Point3<f64>,
}

impl Aabb {
    fn of(tri: &Triangle) -> Self {
        Self {
            lo: tri.v0.inf(&tri.v1).inf(&tri.v2),
            hi: tri.v0.sup(&tri.v1).sup(&tri.v2),
        }
    }

    fn merged(&self, other: &Aabb) -> Self {
        Self {
            lo: self.lo.inf(&other.lo),
            hi: self.hi.sup(&other.hi),
        }
    }

    fn padded(&self, by: f64) -> Self {
        let pad = Vector3::repeat(by);
        Self {
            lo: self.lo - pad,
            hi: self.hi + pad,
        }
    }

    /// Parameter interval `[near, far]` of the ray inside the box, clipped
    /// to `t >= 0`.
    fn slab(&self, origin: &Point3<f64>, dir_inv: &Vector3<f64>) -> Option<(f64, f64)> {
        let a = (self.lo - origin).component_mul(dir_inv);
        let b = (self.hi - origin).component_mul(dir_inv);
        let near = a.inf(&b).max();
        let far = a.sup(&b).min();
        (far >= near && far >= 0.0).then(|| (near.max(0.0), far))
    }

    /// Squared distance from `p`, zero when inside.
    fn distance_sq(&self, p: &Point3<f64>) -> f64 {
        let below = self.lo - p;
        let above = p - self.hi;
        below.sup(&above).sup(&Vector3::zeros()).norm_squared()
    }
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        face_idx: usize,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn build(triangles: &[Triangle], indices: &mut [usize]) -> Option<Self> {
        match indices {
            [] => return None,
            [idx] => {
                return Some(BvhNode::Leaf {
                    aabb: Aabb::of(&triangles[*idx]).padded(AABB_PADDING),
                    face_idx: *idx,
                });
            }
            _ => {}
        }

        let combined = indices
            .iter()
            .skip(1)
            .fold(Aabb::of(&triangles[indices[0]]), |acc, &i| {
                acc.merged(&Aabb::of(&triangles[i]))
            })
            .padded(AABB_PADDING);

        // Split along the longest extent
        let extent = combined.hi - combined.lo;
        let axis = extent.imax();

        indices.sort_by(|&a, &b| {
            let ca = triangles[a].centroid()[axis];
            let cb = triangles[b].centroid()[axis];
            ca.total_cmp(&cb)
        });

        let mid = indices.len() / 2;
        let (left_indices, right_indices) = indices.split_at_mut(mid);

        let left = BvhNode::build(triangles, left_indices);
        let right = BvhNode::build(triangles, right_indices);

        match (left, right) {
            (Some(l), Some(r)) => Some(BvhNode::Internal {
                aabb: combined,
                left: Box::new(l),
                right: Box::new(r),
            }),
            (Some(n), None) | (None, Some(n)) => Some(n),
            (None, None) => None,
        }
    }

    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } => aabb,
            BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Möller–Trumbore ray-triangle intersection.
///
/// Hits on both sides of the triangle are reported so that rays
/// starting inside the solid can be detected.
fn ray_triangle_intersect(
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
    tri: &Triangle,
) -> Option<f64> {
    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;

    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);

    if a.abs() < 1e-12 {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - tri.v0;
    let u = f * s.dot(&h);

    if !(-BARY_EPSILON..=1.0 + BARY_EPSILON).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);

    if v < -BARY_EPSILON || u + v > 1.0 + BARY_EPSILON {
        return None;
    }

    let t = f * edge2.dot(&q);

    if t > RAY_EPSILON { Some(t) } else { None }
}

/// A validated triangle mesh with a BVH for collision queries.
#[derive(Debug)]
pub struct IndexedMesh {
    mesh: Mesh,
    triangles: Vec<Triangle>,
    face_normals: Vec<Vector3<f64>>,
    vertex_faces: Vec<Vec<usize>>,
    root: BvhNode,
    ground_level: f64,
}

impl IndexedMesh {
    /// Validate `mesh` and build the acceleration structure.
    ///
    /// # Errors
    ///
    /// - [`MeshError::EmptyMesh`] if there are no faces
    /// - [`MeshError::InvalidVertexIndex`] if a face points past the vertex array
    /// - [`MeshError::InvalidCoordinate`] for NaN or infinite coordinates
    /// - [`MeshError::IndexBuildFailed`] if every face is degenerate
    pub fn new(mesh: Mesh) -> MeshResult<Self> {
        let _timer =
            OperationTimer::with_context("index_mesh", mesh.face_count(), mesh.vertex_count());

        if mesh.faces.is_empty() || mesh.vertices.is_empty() {
            return Err(MeshError::empty_mesh(format!(
                "{} vertices, {} faces",
                mesh.vertex_count(),
                mesh.face_count()
            )));
        }

        for (vi, v) in mesh.vertices.iter().enumerate() {
            for (name, value) in [("x", v.position.x), ("y", v.position.y), ("z", v.position.z)] {
                if !value.is_finite() {
                    return Err(MeshError::invalid_coordinate(vi, name, value));
                }
            }
        }

        let vertex_count = mesh.vertex_count();
        for (fi, face) in mesh.faces.iter().enumerate() {
            if let Some(&bad) = face.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(MeshError::invalid_vertex_index(fi, bad, vertex_count));
            }
        }

        let triangles: Vec<Triangle> = mesh.triangles().collect();
        let face_normals: Vec<Vector3<f64>> = triangles
            .iter()
            .map(|t| t.normal().unwrap_or_else(Vector3::zeros))
            .collect();

        let degenerate = face_normals.iter().filter(|n| n.norm_squared() == 0.0).count();
        if degenerate == triangles.len() {
            return Err(MeshError::index_build_failed("all faces are degenerate"));
        }
        if degenerate > 0 {
            warn!(degenerate, "Mesh contains degenerate faces");
        }

        let vertex_faces = build_vertex_faces(&mesh.faces, vertex_count);

        let mut indices: Vec<usize> = (0..triangles.len()).collect();
        let root = BvhNode::build(&triangles, &mut indices)
            .ok_or_else(|| MeshError::index_build_failed("no faces to index"))?;

        let ground_level = mesh
            .vertices
            .iter()
            .map(|v| v.position.z)
            .fold(f64::INFINITY, f64::min);

        debug!(
            faces = triangles.len(),
            ground_level, "Built mesh index"
        );

        Ok(Self {
            mesh,
            triangles,
            face_normals,
            vertex_faces,
            root,
            ground_level,
        })
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Triangle for a face id.
    pub fn triangle(&self, face_id: usize) -> &Triangle {
        &self.triangles[face_id]
    }

    /// Vertex indices of a face.
    pub fn face(&self, face_id: usize) -> [u32; 3] {
        self.mesh.faces[face_id]
    }

    /// Unit normal of a face (zero for degenerate faces).
    pub fn normal_by_face_id(&self, face_id: usize) -> Vector3<f64> {
        self.face_normals[face_id]
    }

    /// Faces incident to a vertex.
    pub fn faces_of_vertex(&self, vertex: u32) -> &[usize] {
        &self.vertex_faces[vertex as usize]
    }

    /// Cast a ray from `source` along the unit vector `dir`.
    pub fn query_ray_hit(&self, source: &Point3<f64>, dir: &Vector3<f64>) -> HitResult {
        let dir_inv = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);

        match self.trace(&self.root, source, dir, &dir_inv, f64::INFINITY) {
            Some((t, face)) => HitResult {
                distance: t,
                normal: self.face_normals[face],
                face_id: Some(face),
                source: *source,
                direction: *dir,
            },
            None => HitResult::miss(*source, *dir),
        }
    }

    /// Squared distance to the closest surface point.
    pub fn squared_distance(&self, p: &Point3<f64>) -> NearestPoint {
        let mut best = NearestPoint {
            distance_sq: f64::INFINITY,
            face_id: 0,
            point: *p,
        };
        self.nearest(&self.root, p, &mut best);
        best
    }

    fn trace(
        &self,
        node: &BvhNode,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        dir_inv: &Vector3<f64>,
        max_dist: f64,
    ) -> Option<(f64, usize)> {
        match node.aabb().slab(origin, dir_inv) {
            Some((t_near, _)) if t_near <= max_dist => {}
            _ => return None,
        }

        match node {
            BvhNode::Leaf { face_idx, .. } => {
                if let Some(t) = ray_triangle_intersect(origin, direction, &self.triangles[*face_idx])
                    && t <= max_dist
                {
                    return Some((t, *face_idx));
                }
                None
            }
            BvhNode::Internal { left, right, .. } => {
                let hit_left = self.trace(left, origin, direction, dir_inv, max_dist);
                let max_right = hit_left.map(|(t, _)| t).unwrap_or(max_dist);
                let hit_right = self.trace(right, origin, direction, dir_inv, max_right);

                match (hit_left, hit_right) {
                    (Some(l), Some(r)) => Some(if l.0 <= r.0 { l } else { r }),
                    (Some(h), None) | (None, Some(h)) => Some(h),
                    (None, None) => None,
                }
            }
        }
    }

    fn nearest(&self, node: &BvhNode, p: &Point3<f64>, best: &mut NearestPoint) {
        if node.aabb().distance_sq(p) > best.distance_sq {
            return;
        }

        match node {
            BvhNode::Leaf { face_idx, .. } => {
                let q = self.triangles[*face_idx].closest_point(p);
                let d = (q - p).norm_squared();
                if d < best.distance_sq {
                    *best = NearestPoint {
                        distance_sq: d,
                        face_id: *face_idx,
                        point: q,
                    };
                }
            }
            BvhNode::Internal { left, right, .. } => {
                // Visit the closer child first for better pruning
                let (first, second) = if left.aabb().distance_sq(p) <= right.aabb().distance_sq(p)
                {
                    (left, right)
                } else {
                    (right, left)
                };
                self.nearest(first, p, best);
                self.nearest(second, p, best);
            }
        }
    }
}

impl CollisionOracle for IndexedMesh {
    fn ray_hit(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        safety_distance: f64,
    ) -> HitResult {
        let start = origin + direction * safety_distance;
        let mut hit = self.query_ray_hit(&start, direction);
        if hit.is_hit() {
            hit.distance += safety_distance;
        }
        hit.source = *origin;
        hit
    }

    fn nearest_surface_point(&self, point: &Point3<f64>) -> NearestPoint {
        self.squared_distance(point)
    }

    fn ground_level(&self) -> f64 {
        self.ground_level
    }

    fn surface_normal(&self, point: &Point3<f64>, eps: f64) -> Vector3<f64> {
        crate::normals::surface_normal(self, point, eps)
    }
}

fn build_vertex_faces(faces: &[[u32; 3]], vertex_count: usize) -> Vec<Vec<usize>> {
    let mut vertex_faces = vec![Vec::new(); vertex_count];
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            vertex_faces[vi as usize].push(fi);
        }
    }
    vertex_faces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    /// Create a 10x10x10 cube with outward-facing CCW winding.
    fn make_cube() -> Mesh {
        let mut mesh = Mesh::new();
        for &(x, y, z) in &[
            (0.0, 0.0, 0.0),
            (10.0, 0.0, 0.0),
            (10.0, 10.0, 0.0),
            (0.0, 10.0, 0.0),
            (0.0, 0.0, 10.0),
            (10.0, 0.0, 10.0),
            (10.0, 10.0, 10.0),
            (0.0, 10.0, 10.0),
        ] {
            mesh.vertices.push(Vertex::from_coords(x, y, z));
        }
        mesh.faces.extend_from_slice(&[
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ]);
        mesh
    }

    #[test]
    fn test_ray_triangle_intersect_hit() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let t = ray_triangle_intersect(&Point3::new(0.25, 0.25, 1.0), &-Vector3::z(), &tri);
        assert!((t.unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_ray_triangle_parallel() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let t = ray_triangle_intersect(&Point3::new(0.0, 0.0, 1.0), &Vector3::x(), &tri);
        assert!(t.is_none());
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let err = IndexedMesh::new(Mesh::new()).unwrap_err();
        assert!(matches!(err, MeshError::EmptyMesh { .. }));
    }

    #[test]
    fn test_bad_index_rejected() {
        let mut mesh = make_cube();
        mesh.faces.push([0, 1, 99]);
        let err = IndexedMesh::new(mesh).unwrap_err();
        assert!(matches!(
            err,
            MeshError::InvalidVertexIndex {
                vertex_index: 99,
                ..
            }
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let mut mesh = make_cube();
        mesh.vertices[3].position.y = f64::NAN;
        let err = IndexedMesh::new(mesh).unwrap_err();
        assert!(matches!(err, MeshError::InvalidCoordinate { coordinate: "y", .. }));
    }

    #[test]
    fn test_ray_hit_from_outside() {
        let index = IndexedMesh::new(make_cube()).unwrap();
        let hit = index.query_ray_hit(&Point3::new(5.0, 5.0, -3.0), &Vector3::z());
        assert!((hit.distance - 3.0).abs() < 1e-9);
        assert!(!hit.is_inside());
        assert!((hit.normal.z + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ray_hit_from_inside() {
        let index = IndexedMesh::new(make_cube()).unwrap();
        let hit = index.query_ray_hit(&Point3::new(5.0, 5.0, 2.0), &-Vector3::z());
        assert!((hit.distance - 2.0).abs() < 1e-9);
        assert!(hit.is_inside());
    }

    #[test]
    fn test_ray_miss() {
        let index = IndexedMesh::new(make_cube()).unwrap();
        let hit = index.query_ray_hit(&Point3::new(5.0, 5.0, -3.0), &-Vector3::z());
        assert!(!hit.is_hit());
    }

    #[test]
    fn test_safety_distance_skips_source_surface() {
        let index = IndexedMesh::new(make_cube()).unwrap();
        // Source on the bottom face, casting into the solid
        let hit = index.ray_hit(&Point3::new(5.0, 5.0, 0.0), &Vector3::z(), 0.1);
        assert!((hit.distance - 10.0).abs() < 1e-9);
        assert!((hit.source.z - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_squared_distance() {
        let index = IndexedMesh::new(make_cube()).unwrap();
        let np = index.squared_distance(&Point3::new(5.0, 5.0, -2.0));
        assert!((np.distance_sq - 4.0).abs() < 1e-9);
        assert!(np.point.z.abs() < 1e-9);
        assert!(index.normal_by_face_id(np.face_id).z < -0.99);
    }

    #[test]
    fn test_ground_level() {
        let mut mesh = make_cube();
        mesh.translate(Vector3::new(0.0, 0.0, 7.5));
        let index = IndexedMesh::new(mesh).unwrap();
        assert!((index.ground_level() - 7.5).abs() < 1e-12);
    }
}
