//! The support generation pipeline.
//!
//! Generation runs as an explicit state machine. Every state carries the
//! output of the step before it, so a step can only start once its
//! predecessor has finished:
//!
//! ```text
//! Begin -> Filter -> Pinheads -> Classify -> RoutingGround
//!       -> RoutingNonGround -> CascadePillars -> Headless -> MergeResult -> Done
//! ```
//!
//! `Halt` (pause) and `Abort` (cancellation) can be entered at any
//! transition. Aborting clears the arena and ends the run with
//! [`SupportError::Stopped`].

mod cascade;
mod classify;
pub mod collision;
mod filter;
mod ground;
mod headless;
mod interconnect;
mod model;

use std::f64::consts::{FRAC_PI_4, PI};

use hashbrown::HashSet;
use nalgebra::{Point3, Vector3};
use sla_mesh::tracing_ext::OperationTimer;
use sla_mesh::{CollisionOracle, HitResult};
use tracing::{debug, info};

use crate::builder::SupportTreeBuilder;
use crate::config::SupportConfig;
use crate::control::JobControl;
use crate::error::{SupportError, SupportResult};
use crate::generator::{UnresolvedPoint, UnresolvedReason};
use crate::nodes::{HeadId, PillarId, SupportPoint};
use crate::spatial::PointIndex;

use self::collision::{bridge_clearance, pinhead_clearance};

/// Straight down.
pub(crate) const DOWN: Vector3<f64> = Vector3::new(0.0, 0.0, -1.0);

/// Small length used to break ties in comparisons.
pub(crate) const EPSILON: f64 = 1e-6;

/// Smallest polar angle (from +Z) a head or an escape bridge may take.
pub(crate) const MIN_POLAR: f64 = 3.0 * FRAC_PI_4;

pub(crate) fn from_spherical(polar: f64, azimuth: f64) -> Vector3<f64> {
    Vector3::new(
        azimuth.cos() * polar.sin(),
        azimuth.sin() * polar.sin(),
        polar.cos(),
    )
    .normalize()
}

/// Grid search for the direction with the highest `score`.
///
/// Polar angles span [`MIN_POLAR`, π]; azimuths go once around starting
/// at `azimuth`. At most `budget` directions are scored.
pub(crate) fn best_direction<F>(budget: u32, azimuth: f64, score: F) -> Option<(Vector3<f64>, f64)>
where
    F: Fn(&Vector3<f64>) -> f64,
{
    let budget = budget.max(2);
    let polar_steps = ((f64::from(budget) / 4.0).sqrt().ceil() as u32).max(2);
    let azimuth_steps = (budget / polar_steps).max(1);

    let mut best: Option<(Vector3<f64>, f64)> = None;
    for i in 0..polar_steps {
        let polar = MIN_POLAR + (PI - MIN_POLAR) * f64::from(i) / f64::from(polar_steps - 1);
        for j in 0..azimuth_steps {
            let az = azimuth + 2.0 * PI * f64::from(j) / f64::from(azimuth_steps);
            let dir = from_spherical(polar, az);
            let t = score(&dir);
            if best.is_none_or(|(_, b)| t > b) {
                best = Some((dir, t));
            }
        }
    }
    best
}

/// Public name of a pipeline step, as reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStep {
    Begin,
    Filter,
    Pinheads,
    Classify,
    RoutingGround,
    RoutingNonGround,
    CascadePillars,
    Headless,
    MergeResult,
    Done,
    Halt,
    Abort,
}

impl BuildStep {
    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            BuildStep::Begin => "Starting",
            BuildStep::Filter => "Filtering",
            BuildStep::Pinheads => "Generate pinheads",
            BuildStep::Classify => "Classification",
            BuildStep::RoutingGround => "Routing to ground",
            BuildStep::RoutingNonGround => "Routing supports to model surface",
            BuildStep::CascadePillars => "Interconnecting pillars",
            BuildStep::Headless => "Processing small holes",
            BuildStep::MergeResult => "Merging support mesh",
            BuildStep::Done => "Done",
            BuildStep::Halt => "Halt",
            BuildStep::Abort => "Abort",
        }
    }

    /// Overall progress when the step starts.
    pub fn percent(self) -> u32 {
        match self {
            BuildStep::Begin => 0,
            BuildStep::Filter => 10,
            BuildStep::Pinheads => 30,
            BuildStep::Classify => 50,
            BuildStep::RoutingGround => 60,
            BuildStep::RoutingNonGround => 70,
            BuildStep::CascadePillars => 75,
            BuildStep::Headless => 80,
            BuildStep::MergeResult => 99,
            BuildStep::Done => 100,
            BuildStep::Halt | BuildStep::Abort => 0,
        }
    }
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A point that passed the filter and gets a pin-head.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeadCandidate {
    pub point_index: usize,
    pub pos: Point3<f64>,
    pub dir: Vector3<f64>,
    pub r_pin: f64,
}

/// A point that is supported by a compact bridge instead of a head.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeadlessPoint {
    pub point_index: usize,
    pub pos: Point3<f64>,
    pub normal: Vector3<f64>,
}

/// A head that cannot drop straight to the bed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockedHead {
    pub head: HeadId,
    /// Downward hit from the head's junction; a miss when the head reached
    /// the bed but no ground pillar could be placed.
    pub hit: HitResult,
}

/// Output of classification.
#[derive(Debug, Default)]
pub(crate) struct Classified {
    /// Ground reaching heads grouped for pillar sharing.
    pub clusters: Vec<Vec<HeadId>>,
    pub blocked: Vec<BlockedHead>,
}

/// Machine state. Each variant holds what the step needs as input.
enum Stage {
    Begin,
    Filter,
    Pinheads(Vec<HeadCandidate>),
    Classify(Vec<HeadId>),
    RoutingGround(Classified),
    RoutingNonGround(Vec<BlockedHead>),
    CascadePillars,
    Headless,
    MergeResult,
    Done,
    Halt(Box<Stage>),
    Abort,
}

impl Stage {
    fn step(&self) -> BuildStep {
        match self {
            Stage::Begin => BuildStep::Begin,
            Stage::Filter => BuildStep::Filter,
            Stage::Pinheads(_) => BuildStep::Pinheads,
            Stage::Classify(_) => BuildStep::Classify,
            Stage::RoutingGround(_) => BuildStep::RoutingGround,
            Stage::RoutingNonGround(_) => BuildStep::RoutingNonGround,
            Stage::CascadePillars => BuildStep::CascadePillars,
            Stage::Headless => BuildStep::Headless,
            Stage::MergeResult => BuildStep::MergeResult,
            Stage::Done => BuildStep::Done,
            Stage::Halt(_) => BuildStep::Halt,
            Stage::Abort => BuildStep::Abort,
        }
    }
}

/// Shared state of one generation run.
pub(crate) struct BuildContext<'a, O: CollisionOracle + ?Sized> {
    oracle: &'a O,
    config: &'a SupportConfig,
    points: &'a [SupportPoint],
    builder: &'a SupportTreeBuilder,
    control: &'a JobControl,
    /// Bed-standing pillars, keyed by their foot position.
    pillar_index: PointIndex<PillarId>,
    /// Pillar pairs that are already braced.
    linked_pairs: HashSet<(PillarId, PillarId)>,
    headless: Vec<HeadlessPoint>,
    unresolved: Vec<UnresolvedPoint>,
}

impl<'a, O: CollisionOracle + ?Sized> BuildContext<'a, O> {
    pub fn new(
        oracle: &'a O,
        config: &'a SupportConfig,
        points: &'a [SupportPoint],
        builder: &'a SupportTreeBuilder,
        control: &'a JobControl,
    ) -> Self {
        Self {
            oracle,
            config,
            points,
            builder,
            control,
            pillar_index: PointIndex::new(),
            linked_pairs: HashSet::new(),
            headless: Vec::new(),
            unresolved: Vec::new(),
        }
    }

    /// Run every step to completion.
    ///
    /// Returns the points that could not be supported. On cancellation the
    /// arena is emptied and [`SupportError::Stopped`] is returned.
    pub fn execute(mut self) -> SupportResult<Vec<UnresolvedPoint>> {
        let _timer = OperationTimer::new("generate_supports");
        let mut stage = Stage::Begin;

        loop {
            if !matches!(stage, Stage::Abort) && self.control.stop_requested() {
                stage = Stage::Abort;
            } else if !matches!(stage, Stage::Halt(_) | Stage::Abort | Stage::Done)
                && self.control.pause_requested()
            {
                stage = Stage::Halt(Box::new(stage));
            }

            let step = stage.step();
            self.control.report(step.percent(), step.label());

            let next = match stage {
                Stage::Begin => Ok(Stage::Filter),
                Stage::Filter => self.filter().map(Stage::Pinheads),
                Stage::Pinheads(candidates) => self.pinheads(&candidates).map(Stage::Classify),
                Stage::Classify(heads) => self.classify(&heads).map(Stage::RoutingGround),
                Stage::RoutingGround(classified) => {
                    self.routing_ground(classified).map(Stage::RoutingNonGround)
                }
                Stage::RoutingNonGround(blocked) => {
                    self.routing_nonground(blocked).map(|()| Stage::CascadePillars)
                }
                Stage::CascadePillars => self.cascade_pillars().map(|()| Stage::Headless),
                Stage::Headless => self.routing_headless().map(|()| Stage::MergeResult),
                Stage::MergeResult => {
                    self.builder.merged_mesh(self.config.mesh_steps);
                    Ok(Stage::Done)
                }
                Stage::Done => {
                    info!(unresolved = self.unresolved.len(), "Support generation finished");
                    return Ok(self.unresolved);
                }
                Stage::Halt(resume) => {
                    debug!(next = %resume.step(), "Support generation paused");
                    self.control.wait_while_paused().map(|()| *resume)
                }
                Stage::Abort => {
                    self.builder.clear();
                    info!("Support generation stopped");
                    return Err(SupportError::Stopped);
                }
            };

            stage = match next {
                Ok(next) => next,
                Err(SupportError::Stopped) => Stage::Abort,
                Err(e) => {
                    self.builder.clear();
                    return Err(e);
                }
            };
        }
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    fn sd(&self) -> f64 {
        self.config.safety_distance_mm
    }

    /// Ring-cast free length for a cylinder of radius `r` along `dir`.
    fn bridge_hit(&self, s: &Point3<f64>, dir: &Vector3<f64>, r: f64) -> HitResult {
        bridge_clearance(self.oracle, self.sd(), s, dir, r, false)
    }

    fn bridge_distance(&self, s: &Point3<f64>, dir: &Vector3<f64>, r: f64) -> f64 {
        self.bridge_hit(s, dir, r).distance
    }

    /// True if a cylinder of radius `r` from `start` to `end` is free.
    fn bridge_is_clear(&self, start: &Point3<f64>, end: &Point3<f64>, r: f64) -> bool {
        let axis = end - start;
        let length = axis.norm();
        match axis.try_normalize(f64::EPSILON) {
            Some(dir) => self.bridge_distance(start, &dir, r) >= length,
            None => true,
        }
    }

    fn pinhead_distance(
        &self,
        s: &Point3<f64>,
        dir: &Vector3<f64>,
        r_pin: f64,
        r_back: f64,
        width: f64,
    ) -> f64 {
        pinhead_clearance(self.oracle, self.sd(), s, dir, r_pin, r_back, width).distance
    }

    fn mark_unresolved(&mut self, point_index: usize, position: Point3<f64>, reason: UnresolvedReason) {
        self.unresolved.push(UnresolvedPoint {
            point_index,
            position,
            reason,
        });
    }
}

/// Order-free key for a pillar pair.
fn pair_key(a: PillarId, b: PillarId) -> (PillarId, PillarId) {
    if a <= b { (a, b) } else { (b, a) }
}
