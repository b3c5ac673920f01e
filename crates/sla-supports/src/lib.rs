//! Support tree generation for SLA resin printing.
//!
//! Given a model mesh and a list of points that need support, this crate
//! grows a tree of printable support geometry underneath the model:
//!
//! - **Heads**: pin tips that touch the model at a support point
//! - **Pillars**: vertical columns down to the bed, with a conical base
//! - **Bridges**: sloped rods joining heads and pillars, and bracing
//!   pillars to each other
//! - **Pedestals**: upside-down heads that let a pillar stand on the model
//! - **Compact bridges**: short sticks for points too cramped for a head
//!
//! Points that cannot be supported are reported, never silently dropped.
//!
//! # Quick Start
//!
//! ```
//! use sla_mesh::{Mesh, Vertex};
//! use sla_supports::{SupportGenerator, SupportPoint};
//!
//! // A 10 mm cube resting on z = 0
//! let mut mesh = Mesh::new();
//! for &(x, y, z) in &[
//!     (0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (10.0, 10.0, 0.0), (0.0, 10.0, 0.0),
//!     (0.0, 0.0, 10.0), (10.0, 0.0, 10.0), (10.0, 10.0, 10.0), (0.0, 10.0, 10.0),
//! ] {
//!     mesh.vertices.push(Vertex::from_coords(x, y, z));
//! }
//! mesh.faces = vec![
//!     [0, 2, 1], [0, 3, 2], [4, 5, 6], [4, 6, 7], [0, 1, 5], [0, 5, 4],
//!     [2, 3, 7], [2, 7, 6], [1, 2, 6], [1, 6, 5], [3, 0, 4], [3, 4, 7],
//! ];
//!
//! let points = [
//!     SupportPoint::at(4.0, 5.0, 0.0),
//!     SupportPoint::at(5.0, 5.0, 0.0),
//!     SupportPoint::at(6.0, 5.0, 0.0),
//! ];
//! let tree = SupportGenerator::new(&mesh, &points).generate().unwrap();
//!
//! // The three heads share one pillar
//! assert_eq!(tree.stats.heads, 3);
//! assert_eq!(tree.stats.pillars, 1);
//! assert!(!tree.mesh.is_empty());
//! ```
//!
//! # Pipeline
//!
//! Generation runs these steps in order, reporting each one to the
//! progress callback ([`BuildStep`]):
//!
//! 1. **Filter**: merge near-duplicate points, estimate normals, and pick a
//!    head direction, or mark the point headless
//! 2. **Pinheads**: place the heads
//! 3. **Classify**: split heads into those with a free way down and those
//!    blocked by the model; cluster the free ones
//! 4. **Routing to ground**: one pillar per cluster, other heads bridged
//!    to it, then ring bracing between pillars
//! 5. **Routing to model**: pedestals on the model, or a detour
//! 6. **Cascade**: brace and add helper pillars next to tall pillars
//! 7. **Headless**: compact bridges for headless points
//! 8. **Merge**: triangulate everything into one mesh
//!
//! # Cancellation
//!
//! A run can be stopped with a stop predicate, by returning `false` from
//! the progress callback, or with [`JobControl::cancel`]. A stopped run
//! returns [`SupportError::Stopped`] and keeps nothing.
//!
//! # Units
//!
//! All lengths are millimeters and all angles radians. Z points up.

pub mod builder;
pub mod buildsteps;
pub mod config;
pub mod control;
pub mod error;
pub mod generator;
pub mod nodes;
pub mod primitives;
pub mod spatial;

pub use builder::SupportTreeBuilder;
pub use buildsteps::BuildStep;
pub use config::{PillarConnectionMode, SupportConfig};
pub use control::JobControl;
pub use error::{SupportError, SupportErrorCode, SupportRecoverySuggestion, SupportResult};
pub use generator::{
    SupportGenerator, SupportStats, SupportTree, UnresolvedPoint, UnresolvedReason,
    generate_with_oracle,
};
pub use nodes::{
    Bridge, BridgeLink, CompactBridge, DiffBridge, Head, HeadId, Junction, Pedestal, Pillar,
    PillarBase, PillarId, PillarStart, SupportPoint,
};
