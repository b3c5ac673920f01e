//! Fluent entry point for support generation.
//!
//! # Example
//!
//! ```
//! use sla_mesh::{Mesh, Vertex};
//! use sla_supports::{SupportConfig, SupportGenerator, SupportPoint};
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
//! let points = [SupportPoint::at(5.0, 5.0, 0.0)];
//! let tree = SupportGenerator::new(&mesh, &points)
//!     .config(SupportConfig::default())
//!     .generate()
//!     .unwrap();
//!
//! assert_eq!(tree.stats.pillars, 1);
//! assert!(tree.unresolved.is_empty());
//! println!("{}", tree.stats);
//! ```

use nalgebra::Point3;
use sla_mesh::progress::ProgressCallback;
use sla_mesh::{CollisionOracle, IndexedMesh, Mesh};
use tracing::info;

use crate::buildsteps::BuildContext;
use crate::builder::SupportTreeBuilder;
use crate::config::SupportConfig;
use crate::control::JobControl;
use crate::error::{SupportError, SupportResult};
use crate::nodes::{
    Bridge, CompactBridge, DiffBridge, Head, Junction, Pedestal, Pillar, SupportPoint,
};

/// Why an input point ended up without support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnresolvedReason {
    /// The head is blocked and neither a pedestal, a nearby pillar nor a
    /// sideways escape could carry it.
    NoRoute,
    /// A headless point found no model surface below to anchor to.
    NoHeadlessAnchor,
    /// The head is blocked and routing onto the model is disabled.
    GroundFacingOnly,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnresolvedReason::NoRoute => "no route",
            UnresolvedReason::NoHeadlessAnchor => "no headless anchor",
            UnresolvedReason::GroundFacingOnly => "ground facing only",
        };
        f.write_str(s)
    }
}

/// An input point that received no support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnresolvedPoint {
    /// Index into the input point list.
    pub point_index: usize,
    pub position: Point3<f64>,
    pub reason: UnresolvedReason,
}

/// Node counts of a generated tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupportStats {
    /// Heads connected to a pillar or a bridge.
    pub heads: usize,
    pub pillars: usize,
    pub pillar_bases: usize,
    pub junctions: usize,
    /// Bridges, crossbridges included.
    pub bridges: usize,
    pub crossbridges: usize,
    pub diff_bridges: usize,
    pub compact_bridges: usize,
    pub pedestals: usize,
    pub unresolved: usize,
}

impl std::fmt::Display for SupportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Support tree:")?;
        writeln!(f, "  Heads: {}", self.heads)?;
        writeln!(f, "  Pillars: {} ({} with base)", self.pillars, self.pillar_bases)?;
        writeln!(f, "  Junctions: {}", self.junctions)?;
        writeln!(
            f,
            "  Bridges: {} ({} crossbridges, {} tapered)",
            self.bridges, self.crossbridges, self.diff_bridges
        )?;
        writeln!(f, "  Compact bridges: {}", self.compact_bridges)?;
        writeln!(f, "  Pedestals: {}", self.pedestals)?;
        write!(f, "  Unresolved points: {}", self.unresolved)
    }
}

/// A finished support tree.
#[derive(Debug, Clone)]
pub struct SupportTree {
    /// Every node triangulated into one mesh.
    pub mesh: Mesh,
    /// Heads connected to a pillar or a bridge.
    pub heads: Vec<Head>,
    pub pillars: Vec<Pillar>,
    pub junctions: Vec<Junction>,
    pub bridges: Vec<Bridge>,
    pub diff_bridges: Vec<DiffBridge>,
    pub compact_bridges: Vec<CompactBridge>,
    pub pedestals: Vec<Pedestal>,
    /// Z of the print bed the pillars stand on.
    pub ground_level: f64,
    /// Height of `mesh`.
    pub mesh_height: f64,
    pub unresolved: Vec<UnresolvedPoint>,
    pub stats: SupportStats,
}

impl SupportTree {
    fn collect(
        builder: &SupportTreeBuilder,
        unresolved: Vec<UnresolvedPoint>,
        steps: u32,
    ) -> Self {
        let mesh = builder.merged_mesh(steps);
        let heads: Vec<Head> = builder
            .heads()
            .into_iter()
            .filter(|h| h.is_valid() && h.is_routed())
            .collect();
        let pillars = builder.pillars();
        let junctions = builder.junctions();
        let bridges = builder.bridges();
        let diff_bridges = builder.diff_bridges();
        let compact_bridges = builder.compact_bridges();
        let pedestals = builder.pedestals();

        let stats = SupportStats {
            heads: heads.len(),
            pillars: pillars.len(),
            pillar_bases: pillars.iter().filter(|p| p.base.is_some()).count(),
            junctions: junctions.len(),
            bridges: bridges.len(),
            crossbridges: builder.crossbridge_count(),
            diff_bridges: diff_bridges.len(),
            compact_bridges: compact_bridges.len(),
            pedestals: pedestals.len(),
            unresolved: unresolved.len(),
        };

        Self {
            mesh,
            heads,
            pillars,
            junctions,
            bridges,
            diff_bridges,
            compact_bridges,
            pedestals,
            ground_level: builder.ground_level(),
            mesh_height: builder.mesh_height(),
            unresolved,
            stats,
        }
    }

    /// True if no support geometry was generated.
    pub fn is_empty(&self) -> bool {
        self.mesh.is_empty()
    }
}

/// Fluent builder for support generation.
///
/// Holds the inputs and run hooks; [`SupportGenerator::generate`] indexes
/// the mesh and runs the pipeline.
pub struct SupportGenerator<'a> {
    mesh: &'a Mesh,
    points: &'a [SupportPoint],
    config: SupportConfig,
    control: JobControl,
}

impl<'a> SupportGenerator<'a> {
    /// Support `points` on `mesh` with the default configuration.
    pub fn new(mesh: &'a Mesh, points: &'a [SupportPoint]) -> Self {
        Self {
            mesh,
            points,
            config: SupportConfig::default(),
            control: JobControl::new(),
        }
    }

    /// Replace the configuration.
    pub fn config(mut self, config: SupportConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive step transitions. Returning `false` from the callback
    /// cancels the run.
    ///
    /// ```
    /// use sla_mesh::Mesh;
    /// use sla_mesh::progress::ProgressCallback;
    /// use sla_supports::SupportGenerator;
    ///
    /// let callback: ProgressCallback = Box::new(|progress| {
    ///     println!("{}%: {}", progress.percent(), progress.message);
    ///     true
    /// });
    ///
    /// let mesh = Mesh::new();
    /// let generator = SupportGenerator::new(&mesh, &[]).with_progress(callback);
    /// # let _ = generator;
    /// ```
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.control = self.control.with_progress(callback);
        self
    }

    /// Cancel as soon as `predicate` returns true.
    pub fn with_stop_predicate(mut self, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.control = self.control.with_stop_predicate(predicate);
        self
    }

    /// Hold between steps while `predicate` returns true.
    pub fn with_pause_predicate(
        mut self,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.control = self.control.with_pause_predicate(predicate);
        self
    }

    /// Use a fully configured [`JobControl`], replacing any hooks set so far.
    pub fn with_control(mut self, control: JobControl) -> Self {
        self.control = control;
        self
    }

    /// Run the pipeline.
    ///
    /// # Errors
    ///
    /// - [`SupportError::InvalidConfig`] if the configuration is out of range
    /// - [`SupportError::EmptyMesh`] if the mesh has no faces
    /// - [`SupportError::MeshError`] if the mesh cannot be indexed
    /// - [`SupportError::Stopped`] if the run was cancelled
    pub fn generate(self) -> SupportResult<SupportTree> {
        self.config.validate()?;
        if self.mesh.is_empty() {
            return Err(SupportError::EmptyMesh);
        }
        let index = IndexedMesh::new(self.mesh.clone())?;
        generate_with_oracle(&index, self.points, &self.config, &self.control)
    }
}

/// Run the pipeline against any collision oracle.
///
/// The bed sits `object_elevation_mm` below the oracle's ground level.
pub fn generate_with_oracle<O: CollisionOracle + ?Sized>(
    oracle: &O,
    points: &[SupportPoint],
    config: &SupportConfig,
    control: &JobControl,
) -> SupportResult<SupportTree> {
    config.validate()?;

    let ground_level = oracle.ground_level() - config.object_elevation_mm;
    info!(
        points = points.len(),
        ground_level,
        elevation = config.object_elevation_mm,
        "Generating supports"
    );

    let builder = SupportTreeBuilder::new(ground_level, config);
    let unresolved = BuildContext::new(oracle, config, points, &builder, control).execute()?;
    let tree = SupportTree::collect(&builder, unresolved, config.mesh_steps);

    info!(
        heads = tree.stats.heads,
        pillars = tree.stats.pillars,
        bridges = tree.stats.bridges,
        unresolved = tree.stats.unresolved,
        "Support tree ready"
    );
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mesh_is_rejected() {
        let mesh = Mesh::new();
        let points = [SupportPoint::at(0.0, 0.0, 0.0)];
        let err = SupportGenerator::new(&mesh, &points).generate().unwrap_err();
        assert!(matches!(err, SupportError::EmptyMesh));
    }

    #[test]
    fn test_invalid_config_checked_first() {
        let mesh = Mesh::new();
        let config = SupportConfig::default().with_bridge_slope(0.0);
        let err = SupportGenerator::new(&mesh, &[])
            .config(config)
            .generate()
            .unwrap_err();
        assert!(matches!(err, SupportError::InvalidConfig { .. }));
    }

    #[test]
    fn test_stats_display() {
        let stats = SupportStats {
            heads: 2,
            pillars: 1,
            pillar_bases: 1,
            bridges: 1,
            unresolved: 1,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Heads: 2"));
        assert!(text.contains("Pillars: 1 (1 with base)"));
        assert!(text.contains("Unresolved points: 1"));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(UnresolvedReason::NoHeadlessAnchor.to_string(), "no headless anchor");
    }
}
