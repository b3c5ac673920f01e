//! Triangle mesh types and collision queries for SLA support generation.
//!
//! This crate holds the geometry side of the support pipeline: a plain
//! indexed [`Mesh`], a validated and BVH-accelerated [`IndexedMesh`], and
//! the [`CollisionOracle`] trait that support algorithms query for ray hits,
//! closest surface points and surface normals.
//!
//! # Units and Coordinates
//!
//! **This library assumes millimeter (mm) units.** The coordinate system is
//! right-handed with Z pointing up; the lowest Z of the model is treated as
//! its ground level. Face winding is counter-clockwise when viewed from
//! outside, so face normals point outward.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::{Point3, Vector3};
//! use sla_mesh::{CollisionOracle, IndexedMesh, Mesh, Vertex};
//!
//! let mut mesh = Mesh::new();
//! mesh.vertices = vec![
//!     Vertex::from_coords(0.0, 0.0, 0.0),
//!     Vertex::from_coords(1.0, 0.0, 0.0),
//!     Vertex::from_coords(0.0, 1.0, 0.0),
//! ];
//! mesh.faces = vec![[0, 1, 2]];
//!
//! let index = IndexedMesh::new(mesh).unwrap();
//! let hit = index.ray_hit(&Point3::new(0.2, 0.2, 5.0), &-Vector3::z(), 0.0);
//! assert!((hit.distance - 5.0).abs() < 1e-9);
//! ```
//!
//! # Errors
//!
//! Index construction validates the input and reports problems as
//! [`MeshError`] values with `MESH-XXXX` codes and recovery suggestions.

pub mod error;
pub mod index;
pub mod normals;
pub mod oracle;
pub mod progress;
pub mod tracing_ext;
pub mod types;

pub use error::{ErrorCode, MeshError, MeshResult, RecoverySuggestion};
pub use index::IndexedMesh;
pub use normals::{estimate_normals, surface_normal};
pub use oracle::{CollisionOracle, HitResult, NearestPoint};
pub use progress::{Progress, ProgressCallback, ProgressTracker};
pub use types::{Mesh, Triangle, Vertex};
