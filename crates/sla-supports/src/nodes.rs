//! Support tree node types.
//!
//! Nodes refer to each other through typed index handles rather than
//! references, so the arena can grow its storage freely. A link that has
//! not been made yet is `None`.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Point3, Vector3};
use sla_mesh::Mesh;

use crate::primitives::{
    FULL_SPHERE, cylinder, frustum, frustum_between, pinhead, rotation_between, sphere,
};

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl $name {
            /// Index into the owning collection.
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

node_id!(
    /// Handle of a [`Head`].
    HeadId
);
node_id!(
    /// Handle of a [`Pillar`].
    PillarId
);
node_id!(
    /// Handle of a [`Junction`].
    JunctionId
);
node_id!(
    /// Handle of a [`Bridge`].
    BridgeId
);
node_id!(
    /// Handle of a [`DiffBridge`].
    DiffBridgeId
);
node_id!(
    /// Handle of a [`CompactBridge`].
    CompactBridgeId
);
node_id!(
    /// Handle of a [`Pedestal`].
    PedestalId
);

/// Direction pin-head meshes point along in their local frame.
const PINHEAD_LOCAL_DIR: Vector3<f64> = Vector3::new(0.0, 0.0, -1.0);

fn place_pinhead(
    pos: &Point3<f64>,
    dir: &Vector3<f64>,
    r_pin: f64,
    r_back: f64,
    width: f64,
    penetration: f64,
    steps: u32,
) -> Mesh {
    let mut mesh = pinhead(r_pin, r_back, width, penetration, steps);
    if !mesh.is_empty() {
        mesh.transform(&rotation_between(&PINHEAD_LOCAL_DIR, dir), pos.coords);
    }
    mesh
}

/// Bridge a head or pedestal is connected through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeLink {
    /// Constant radius bridge.
    Uniform(BridgeId),
    /// Tapered bridge into a thicker pillar.
    Tapered(DiffBridgeId),
}

/// A pin-head touching the model at a support point.
#[derive(Debug, Clone, PartialEq)]
pub struct Head {
    pub id: HeadId,
    /// Index of the support point this head serves.
    pub point_index: usize,
    /// Contact point on the model surface.
    pub pos: Point3<f64>,
    /// Unit direction from the surface into free space.
    pub dir: Vector3<f64>,
    pub r_back: f64,
    pub r_pin: f64,
    pub width: f64,
    pub penetration: f64,
    pub pillar_id: Option<PillarId>,
    pub bridge_id: Option<BridgeLink>,
    valid: bool,
}

impl Head {
    /// Create an unlinked head. The id is assigned by the arena.
    pub fn new(
        point_index: usize,
        pos: Point3<f64>,
        dir: Vector3<f64>,
        r_pin: f64,
        r_back: f64,
        width: f64,
        penetration: f64,
    ) -> Self {
        Self {
            id: HeadId(0),
            point_index,
            pos,
            dir,
            r_back,
            r_pin,
            width,
            penetration,
            pillar_id: None,
            bridge_id: None,
            valid: true,
        }
    }

    /// Length from pin tip to the back of the back sphere.
    pub fn fullwidth(&self) -> f64 {
        2.0 * self.r_pin + self.width + 2.0 * self.r_back - self.penetration
    }

    /// Center of the back sphere, where pillars and bridges attach.
    pub fn junction_point(&self) -> Point3<f64> {
        self.pos + self.dir * (2.0 * self.r_pin + self.width + self.r_back - self.penetration)
    }

    /// Pillar radius usable under this head.
    pub fn request_pillar_radius(&self, radius: f64) -> f64 {
        if radius > 0.0 && radius < self.r_back {
            radius
        } else {
            self.r_back
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the head as dropped. It is kept for reporting but not meshed.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.pillar_id = None;
        self.bridge_id = None;
    }

    /// True if the head is held by a pillar or a bridge.
    pub fn is_routed(&self) -> bool {
        self.pillar_id.is_some() || self.bridge_id.is_some()
    }

    pub fn mesh(&self, steps: u32) -> Mesh {
        place_pinhead(
            &self.pos,
            &self.dir,
            self.r_pin,
            self.r_back,
            self.width,
            self.penetration,
            steps,
        )
    }
}

/// What a pillar springs from at its top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PillarStart {
    Head(HeadId),
    Junction(JunctionId),
    /// Top is joined only by bridges.
    Free,
}

/// Conical foot of a pillar standing on the bed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PillarBase {
    pub radius: f64,
    pub height: f64,
}

/// A vertical column from a head or junction down to the bed or the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Pillar {
    pub id: PillarId,
    /// Bottom end.
    pub endpoint: Point3<f64>,
    pub height: f64,
    pub r: f64,
    pub start: PillarStart,
    /// Lateral bridges attached to this pillar.
    pub bridges: u32,
    /// Pillars this one is braced to.
    pub links: u32,
    pub base: Option<PillarBase>,
    /// Set when the pillar rests on the model instead of the bed.
    pub pedestal_id: Option<PedestalId>,
}

impl Pillar {
    /// Create a pillar whose top is at `top` and bottom at height `bottom_z`.
    pub fn new(top: &Point3<f64>, bottom_z: f64, r: f64, start: PillarStart) -> Self {
        Self {
            id: PillarId(0),
            endpoint: Point3::new(top.x, top.y, bottom_z),
            height: top.z - bottom_z,
            r,
            start,
            bridges: 0,
            links: 0,
            base: None,
            pedestal_id: None,
        }
    }

    /// Top end.
    pub fn start_point(&self) -> Point3<f64> {
        self.endpoint + Vector3::z() * self.height
    }

    pub fn starts_from_head(&self) -> bool {
        matches!(self.start, PillarStart::Head(_))
    }

    pub fn mesh(&self, steps: u32) -> Mesh {
        let mut mesh = cylinder(self.r, self.height, steps);
        if !mesh.is_empty() {
            mesh.translate(self.endpoint.coords);
        }

        if let Some(base) = self.base {
            let mut foot = frustum(self.r, base.radius, base.height, steps);
            foot.translate(self.endpoint.coords);
            mesh.merge(&foot);
        }

        mesh
    }
}

/// A sphere smoothing a connection point.
#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub id: JunctionId,
    pub pos: Point3<f64>,
    pub r: f64,
    /// Pillar that continues downward from this junction.
    pub pillar_id: Option<PillarId>,
}

impl Junction {
    pub fn new(pos: Point3<f64>, r: f64) -> Self {
        Self {
            id: JunctionId(0),
            pos,
            r,
            pillar_id: None,
        }
    }

    pub fn mesh(&self, steps: u32) -> Mesh {
        let mut mesh = sphere(self.r, FULL_SPHERE, 2.0 * PI / steps.max(3) as f64);
        mesh.translate(self.pos.coords);
        mesh
    }
}

/// Angle between the segment `start`-`end` and the horizontal plane.
pub fn segment_slope(start: &Point3<f64>, end: &Point3<f64>) -> f64 {
    let d = end - start;
    let len = d.norm();
    if len == 0.0 {
        return 0.0;
    }
    (d.z.abs() / len).clamp(0.0, 1.0).asin()
}

/// A constant radius strut between two points.
#[derive(Debug, Clone, PartialEq)]
pub struct Bridge {
    pub id: BridgeId,
    pub start: Point3<f64>,
    pub end: Point3<f64>,
    pub r: f64,
}

impl Bridge {
    pub fn new(start: Point3<f64>, end: Point3<f64>, r: f64) -> Self {
        Self {
            id: BridgeId(0),
            start,
            end,
            r,
        }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    /// Angle to the horizontal plane.
    pub fn slope(&self) -> f64 {
        segment_slope(&self.start, &self.end)
    }

    pub fn mesh(&self, steps: u32) -> Mesh {
        frustum_between(&self.start, &self.end, self.r, self.r, steps)
    }
}

/// A tapered strut, thin at the start and thicker at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffBridge {
    pub id: DiffBridgeId,
    pub start: Point3<f64>,
    pub end: Point3<f64>,
    pub r_start: f64,
    pub r_end: f64,
}

impl DiffBridge {
    pub fn new(start: Point3<f64>, end: Point3<f64>, r_start: f64, r_end: f64) -> Self {
        Self {
            id: DiffBridgeId(0),
            start,
            end,
            r_start,
            r_end,
        }
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    pub fn slope(&self) -> f64 {
        segment_slope(&self.start, &self.end)
    }

    pub fn mesh(&self, steps: u32) -> Mesh {
        frustum_between(&self.start, &self.end, self.r_start, self.r_end, steps)
    }
}

/// A thin strut for a headless point, with rounded ends.
///
/// `sp` lies slightly inside the model; `n` is the outward surface normal
/// at the original support point.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactBridge {
    pub id: CompactBridgeId,
    /// Index of the support point this strut serves.
    pub point_index: usize,
    pub sp: Point3<f64>,
    pub ep: Point3<f64>,
    pub n: Vector3<f64>,
    pub r: f64,
}

impl CompactBridge {
    pub fn new(
        point_index: usize,
        sp: Point3<f64>,
        ep: Point3<f64>,
        n: Vector3<f64>,
        r: f64,
    ) -> Self {
        Self {
            id: CompactBridgeId(0),
            point_index,
            sp,
            ep,
            n,
            r,
        }
    }

    pub fn mesh(&self, steps: u32) -> Mesh {
        let Some(dir) = (self.ep - self.sp).try_normalize(f64::EPSILON) else {
            return Mesh::new();
        };
        let fa = 2.0 * PI / steps.max(3) as f64;

        let startp = self.sp + self.n * self.r;
        let endp = self.ep - dir * self.r;
        let mut mesh = frustum_between(&startp, &endp, self.r, self.r, steps);

        let mut upper = sphere(self.r, (FRAC_PI_2 - fa, PI), fa);
        upper.translate(startp.coords);
        mesh.merge(&upper);

        let mut lower = sphere(self.r, (0.0, FRAC_PI_2 + 2.0 * fa), fa);
        lower.translate(endp.coords);
        mesh.merge(&lower);

        mesh
    }
}

/// A flipped pin-head standing on the model, carrying a pillar.
#[derive(Debug, Clone, PartialEq)]
pub struct Pedestal {
    pub id: PedestalId,
    /// Contact point on the model surface.
    pub pos: Point3<f64>,
    /// Always pointing up, away from the supporting surface.
    pub dir: Vector3<f64>,
    pub r_back: f64,
    pub r_pin: f64,
    pub width: f64,
    pub penetration: f64,
    pub pillar_id: Option<PillarId>,
}

impl Pedestal {
    pub fn new(pos: Point3<f64>, r_pin: f64, r_back: f64, width: f64, penetration: f64) -> Self {
        Self {
            id: PedestalId(0),
            pos,
            dir: Vector3::z(),
            r_back,
            r_pin,
            width,
            penetration,
            pillar_id: None,
        }
    }

    pub fn fullwidth(&self) -> f64 {
        2.0 * self.r_pin + self.width + 2.0 * self.r_back - self.penetration
    }

    /// Where the pillar above meets the pedestal.
    pub fn junction_point(&self) -> Point3<f64> {
        self.pos + self.dir * (2.0 * self.r_pin + self.width + self.r_back - self.penetration)
    }

    pub fn mesh(&self, steps: u32) -> Mesh {
        place_pinhead(
            &self.pos,
            &self.dir,
            self.r_pin,
            self.r_back,
            self.width,
            self.penetration,
            steps,
        )
    }
}

/// An input point that needs support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPoint {
    pub pos: Point3<f64>,
    /// Requested pin radius; non-positive means "use the configured one".
    pub head_radius_hint: f64,
    pub is_new_island: bool,
}

impl SupportPoint {
    pub fn new(pos: Point3<f64>, head_radius_hint: f64, is_new_island: bool) -> Self {
        Self {
            pos,
            head_radius_hint,
            is_new_island,
        }
    }

    /// A point with no radius hint.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z), 0.0, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn default_head(dir: Vector3<f64>) -> Head {
        Head::new(0, Point3::new(1.0, 2.0, 10.0), dir, 0.2, 0.5, 1.0, 0.5)
    }

    #[test]
    fn test_head_geometry() {
        let head = default_head(-Vector3::z());
        assert_relative_eq!(head.fullwidth(), 1.9, epsilon = 1e-12);
        // 2 * 0.2 + 1.0 + 0.5 - 0.5 = 1.4 below the contact point
        assert_relative_eq!(head.junction_point().z, 8.6, epsilon = 1e-12);
        assert_relative_eq!(head.request_pillar_radius(0.3), 0.3);
        assert_relative_eq!(head.request_pillar_radius(0.0), 0.5);
        assert_relative_eq!(head.request_pillar_radius(2.0), 0.5);
    }

    #[test]
    fn test_head_mesh_follows_direction() {
        let head = default_head(-Vector3::z());
        let (min, max) = head.mesh(16).bounds().unwrap();
        // Pin sinks half a millimeter into the surface above
        assert_relative_eq!(max.z, 10.5, epsilon = 1e-9);
        assert_relative_eq!(min.z, 10.0 - head.fullwidth(), epsilon = 1e-9);
    }

    #[test]
    fn test_invalidate_clears_links() {
        let mut head = default_head(-Vector3::z());
        head.pillar_id = Some(PillarId(3));
        assert!(head.is_routed());
        head.invalidate();
        assert!(!head.is_valid());
        assert!(!head.is_routed());
    }

    #[test]
    fn test_pillar_points() {
        let pillar = Pillar::new(&Point3::new(1.0, 1.0, 8.0), -5.0, 0.5, PillarStart::Free);
        assert_relative_eq!(pillar.height, 13.0);
        assert_relative_eq!(pillar.start_point().z, 8.0);
        assert!(!pillar.starts_from_head());
    }

    #[test]
    fn test_pillar_mesh_includes_base() {
        let mut pillar = Pillar::new(&Point3::new(0.0, 0.0, 5.0), 0.0, 0.5, PillarStart::Free);
        let bare = pillar.mesh(12).face_count();
        pillar.base = Some(PillarBase {
            radius: 2.0,
            height: 1.0,
        });
        let mesh = pillar.mesh(12);
        assert!(mesh.face_count() > bare);
        let (min, _) = mesh.bounds().unwrap();
        assert_relative_eq!(min.x, -2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bridge_slope_and_length() {
        let bridge = Bridge::new(Point3::new(0.0, 0.0, 3.0), Point3::new(3.0, 0.0, 0.0), 0.3);
        assert_relative_eq!(bridge.length(), 18f64.sqrt());
        assert_relative_eq!(bridge.slope(), PI / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pedestal_points_up() {
        let pedestal = Pedestal::new(Point3::new(0.0, 0.0, 2.0), 0.2, 0.5, 1.0, 0.5);
        assert_relative_eq!(pedestal.junction_point().z, 3.4, epsilon = 1e-12);
        let (min, _) = pedestal.mesh(16).bounds().unwrap();
        assert_relative_eq!(min.z, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_compact_bridge_mesh() {
        let cb = CompactBridge::new(
            0,
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(0.0, 0.0, 1.0),
            -Vector3::z(),
            0.4,
        );
        let mesh = cb.mesh(16);
        assert!(!mesh.is_empty());
        let degenerate = CompactBridge::new(0, Point3::origin(), Point3::origin(), Vector3::z(), 0.4);
        assert!(degenerate.mesh(16).is_empty());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(PillarId(4).to_string(), "PillarId#4");
        assert_eq!(HeadId(2).index(), 2);
    }
}
