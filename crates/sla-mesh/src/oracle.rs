//! Collision queries consumed by support generation.
//!
//! The [`CollisionOracle`] trait is the narrow contract between geometry
//! and the support-tree algorithms: "how far can I travel along this ray"
//! and "where is the closest surface point". [`IndexedMesh`](crate::IndexedMesh)
//! is the BVH-backed implementation.

use nalgebra::{Point3, Vector3};

/// Result of a ray query against the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    /// Distance from the ray source to the hit, `f64::INFINITY` on a miss.
    pub distance: f64,
    /// Unit normal of the hit face (zero on a miss).
    pub normal: Vector3<f64>,
    /// Index of the hit face.
    pub face_id: Option<usize>,
    /// Ray source.
    pub source: Point3<f64>,
    /// Unit ray direction.
    pub direction: Vector3<f64>,
}

impl HitResult {
    /// A ray that escaped the mesh.
    pub fn miss(source: Point3<f64>, direction: Vector3<f64>) -> Self {
        Self {
            distance: f64::INFINITY,
            normal: Vector3::zeros(),
            face_id: None,
            source,
            direction,
        }
    }

    /// A synthetic result carrying only a distance.
    ///
    /// Used to mark a sample as fully blocked (distance 0) without
    /// referencing a face.
    pub fn with_distance(distance: f64) -> Self {
        Self {
            distance,
            normal: Vector3::zeros(),
            face_id: None,
            source: Point3::origin(),
            direction: Vector3::zeros(),
        }
    }

    /// True if the ray hit a face.
    #[inline]
    pub fn is_hit(&self) -> bool {
        self.distance.is_finite()
    }

    /// True if the ray started inside the solid (it hit a back face).
    #[inline]
    pub fn is_inside(&self) -> bool {
        self.is_hit() && self.normal.dot(&self.direction) > 0.0
    }

    /// World-space hit position.
    #[inline]
    pub fn position(&self) -> Point3<f64> {
        self.source + self.direction * self.distance
    }
}

/// Closest surface point to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    /// Squared distance from the query to `point`.
    pub distance_sq: f64,
    /// Face that owns `point`.
    pub face_id: usize,
    /// The closest point on the surface.
    pub point: Point3<f64>,
}

/// Read-only collision queries against a model.
///
/// Implementations must be safe to call concurrently from worker threads.
pub trait CollisionOracle: Sync {
    /// Cast a ray and report the first surface hit.
    ///
    /// The cast starts `safety_distance` along `direction` so that a
    /// source lying on the surface does not hit itself; the reported
    /// distance is still measured from `origin`.
    fn ray_hit(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        safety_distance: f64,
    ) -> HitResult;

    /// Closest point on the surface to `point`.
    fn nearest_surface_point(&self, point: &Point3<f64>) -> NearestPoint;

    /// Lowest Z coordinate of the model.
    fn ground_level(&self) -> f64;

    /// Estimated outward surface normal at (or near) `point`.
    ///
    /// `eps` is the distance under which the point counts as lying on
    /// a vertex or an edge, where neighbouring face normals are averaged.
    fn surface_normal(&self, point: &Point3<f64>, eps: f64) -> Vector3<f64>;
}
