//! Plain indexed triangle meshes.
//!
//! Models come in as a [`Mesh`] and every support node is triangulated into
//! one. [`Triangle`] is a face resolved to positions for geometric queries.

use nalgebra::{Point3, UnitQuaternion, Vector3};

/// A mesh vertex, in millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f64>,
}

impl Vertex {
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self { position }
    }

    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
        }
    }
}

/// Triangles over a shared vertex array.
///
/// Faces index into `vertices` and wind counter-clockwise seen from
/// outside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty mesh with room reserved for the given counts.
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// True if there is nothing to triangulate.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Smallest box holding every vertex, as `(min, max)`.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?.position;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(lo, hi), v| {
                    (lo.inf(&v.position), hi.sup(&v.position))
                }),
        )
    }

    /// Extent along Z, 0.0 for an empty mesh.
    pub fn height(&self) -> f64 {
        self.bounds().map(|(min, max)| max.z - min.z).unwrap_or(0.0)
    }

    /// Iterate over all faces as triangles with concrete positions.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.faces.iter().map(|f| {
            Triangle::new(
                self.vertices[f[0] as usize].position,
                self.vertices[f[1] as usize].position,
                self.vertices[f[2] as usize].position,
            )
        })
    }

    /// Shift every vertex by `offset`.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for v in &mut self.vertices {
            v.position += offset;
        }
    }

    /// Rotate every vertex about the origin, then translate.
    pub fn transform(&mut self, rotation: &UnitQuaternion<f64>, offset: Vector3<f64>) {
        for v in &mut self.vertices {
            v.position = rotation.transform_point(&v.position) + offset;
        }
    }

    /// Append another mesh, re-indexing its faces.
    pub fn merge(&mut self, other: &Mesh) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]),
        );
    }
}

/// A face resolved to its corner positions. The normal follows the
/// right-hand rule over `v0 -> v1 -> v2`.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Cross product of the two edges leaving `v0`; its length is twice
    /// the area.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit normal, `None` for a sliver with no area.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        self.normal_unnormalized().try_normalize(f64::EPSILON * f64::EPSILON)
    }

    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    /// Closest point on the triangle to `p`.
    ///
    /// Voronoi-region walk from Ericson, "Real-Time Collision Detection" 5.1.5.
    pub fn closest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;

        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return a + ab * v;
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return a + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        a + ab * v + ac * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    fn unit_triangle() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn test_vertex_creation() {
        let v = Vertex::from_coords(1.0, 2.0, 3.0);
        assert!(approx_eq(v.position.x, 1.0));
        assert!(approx_eq(v.position.y, 2.0));
        assert!(approx_eq(v.position.z, 3.0));
    }

    #[test]
    fn test_triangle_normal() {
        let normal = unit_triangle().normal().expect("non-degenerate triangle");
        assert!(approx_eq(normal.x, 0.0));
        assert!(approx_eq(normal.y, 0.0));
        assert!(approx_eq(normal.z, 1.0));
    }

    #[test]
    fn test_degenerate_triangle_has_no_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
    }

    #[test]
    fn test_closest_point_regions() {
        let tri = unit_triangle();

        // Above the interior
        let p = tri.closest_point(&Point3::new(0.25, 0.25, 3.0));
        assert!(approx_eq(p.x, 0.25) && approx_eq(p.y, 0.25) && approx_eq(p.z, 0.0));

        // Beyond vertex a
        let p = tri.closest_point(&Point3::new(-1.0, -1.0, 0.0));
        assert!(approx_eq(p.x, 0.0) && approx_eq(p.y, 0.0));

        // Beyond the hypotenuse
        let p = tri.closest_point(&Point3::new(1.0, 1.0, 0.0));
        assert!(approx_eq(p.x, 0.5) && approx_eq(p.y, 0.5));
    }

    #[test]
    fn test_merge_reindexes_faces() {
        let mut a = Mesh::new();
        a.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        a.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        a.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        a.faces.push([0, 1, 2]);

        let mut b = a.clone();
        b.translate(Vector3::new(0.0, 0.0, 5.0));
        a.merge(&b);

        assert_eq!(a.vertex_count(), 6);
        assert_eq!(a.faces[1], [3, 4, 5]);
        assert!(approx_eq(a.height(), 5.0));
        assert_eq!(a.triangles().count(), 2);
    }

    #[test]
    fn test_bounds_empty() {
        assert!(Mesh::new().bounds().is_none());
        assert!(approx_eq(Mesh::new().height(), 0.0));
    }
}
