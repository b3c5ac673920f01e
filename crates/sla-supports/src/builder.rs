//! The support arena: owner of every generated node.
//!
//! All mutation goes through `&self` methods that take an internal lock, so
//! routing code running on worker threads can add nodes concurrently. Nodes
//! are handed out as clones; cross references are ids. The merged output
//! mesh is cached and dropped by every mutating call.

use std::sync::{Mutex, MutexGuard};

use nalgebra::Point3;
use rayon::prelude::*;
use sla_mesh::Mesh;
use sla_mesh::tracing_ext::OperationTimer;
use tracing::debug;

use crate::config::SupportConfig;
use crate::nodes::{
    Bridge, BridgeId, BridgeLink, CompactBridge, CompactBridgeId, DiffBridge, DiffBridgeId, Head,
    HeadId, Junction, JunctionId, Pedestal, PedestalId, Pillar, PillarBase, PillarId, PillarStart,
};

#[derive(Debug, Default)]
struct Nodes {
    heads: Vec<Head>,
    pillars: Vec<Pillar>,
    junctions: Vec<Junction>,
    bridges: Vec<Bridge>,
    crossbridge_count: usize,
    diff_bridges: Vec<DiffBridge>,
    compact_bridges: Vec<CompactBridge>,
    pedestals: Vec<Pedestal>,
    mesh_cache: Option<Mesh>,
    mesh_height: f64,
}

impl Nodes {
    fn node_count(&self) -> usize {
        self.heads.len()
            + self.pillars.len()
            + self.junctions.len()
            + self.bridges.len()
            + self.diff_bridges.len()
            + self.compact_bridges.len()
            + self.pedestals.len()
    }
}

/// Thread-safe arena of support tree nodes.
#[derive(Debug)]
pub struct SupportTreeBuilder {
    nodes: Mutex<Nodes>,
    ground_level: f64,
    max_bridges_on_pillar: u32,
    max_links_on_pillar: u32,
}

impl SupportTreeBuilder {
    /// Create an empty arena for a bed at `ground_level`.
    pub fn new(ground_level: f64, config: &SupportConfig) -> Self {
        Self {
            nodes: Mutex::new(Nodes::default()),
            ground_level,
            max_bridges_on_pillar: config.max_bridges_on_pillar,
            max_links_on_pillar: config.pillar_cascade_neighbors,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Nodes> {
        // Nodes stay consistent between statements, so a poisoned lock is usable.
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock for mutation and drop the cached mesh.
    fn lock_mut(&self) -> MutexGuard<'_, Nodes> {
        let mut nodes = self.lock();
        nodes.mesh_cache = None;
        nodes
    }

    /// Z coordinate of the print bed.
    pub fn ground_level(&self) -> f64 {
        self.ground_level
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    pub fn add_head(&self, mut head: Head) -> HeadId {
        let mut nodes = self.lock_mut();
        let id = HeadId(nodes.heads.len());
        head.id = id;
        nodes.heads.push(head);
        id
    }

    /// Pillar from a head's junction point down to `bottom_z`.
    pub fn add_pillar_from_head(&self, head_id: HeadId, bottom_z: f64, r: f64) -> PillarId {
        let mut nodes = self.lock_mut();
        let top = nodes.heads[head_id.index()].junction_point();
        let id = PillarId(nodes.pillars.len());
        let mut pillar = Pillar::new(&top, bottom_z, r, PillarStart::Head(head_id));
        pillar.id = id;
        nodes.pillars.push(pillar);
        nodes.heads[head_id.index()].pillar_id = Some(id);
        id
    }

    /// Pillar from `top` down to `bottom_z`.
    pub fn add_pillar(
        &self,
        top: &Point3<f64>,
        bottom_z: f64,
        r: f64,
        start: PillarStart,
    ) -> PillarId {
        let mut nodes = self.lock_mut();
        let id = PillarId(nodes.pillars.len());
        let mut pillar = Pillar::new(top, bottom_z, r, start);
        pillar.id = id;
        nodes.pillars.push(pillar);
        match start {
            PillarStart::Head(h) => nodes.heads[h.index()].pillar_id = Some(id),
            PillarStart::Junction(j) => nodes.junctions[j.index()].pillar_id = Some(id),
            PillarStart::Free => {}
        }
        id
    }

    /// Give a pillar a conical foot.
    pub fn add_pillar_base(&self, pillar_id: PillarId, height: f64, radius: f64) {
        let mut nodes = self.lock_mut();
        nodes.pillars[pillar_id.index()].base = Some(PillarBase { radius, height });
    }

    pub fn add_junction(&self, pos: Point3<f64>, r: f64) -> JunctionId {
        let mut nodes = self.lock_mut();
        let id = JunctionId(nodes.junctions.len());
        let mut junction = Junction::new(pos, r);
        junction.id = id;
        nodes.junctions.push(junction);
        id
    }

    pub fn add_bridge(&self, start: Point3<f64>, end: Point3<f64>, r: f64) -> BridgeId {
        let mut nodes = self.lock_mut();
        push_bridge(&mut nodes, Bridge::new(start, end, r))
    }

    /// Bridge from a head's junction point to `end`; the head records it.
    pub fn add_bridge_from_head(&self, head_id: HeadId, end: Point3<f64>, r: f64) -> BridgeId {
        let mut nodes = self.lock_mut();
        let start = nodes.heads[head_id.index()].junction_point();
        let id = push_bridge(&mut nodes, Bridge::new(start, end, r));
        nodes.heads[head_id.index()].bridge_id = Some(BridgeLink::Uniform(id));
        id
    }

    /// Bracing bridge between two pillars.
    pub fn add_crossbridge(&self, start: Point3<f64>, end: Point3<f64>, r: f64) -> BridgeId {
        let mut nodes = self.lock_mut();
        nodes.crossbridge_count += 1;
        push_bridge(&mut nodes, Bridge::new(start, end, r))
    }

    pub fn add_diff_bridge(
        &self,
        start: Point3<f64>,
        end: Point3<f64>,
        r_start: f64,
        r_end: f64,
    ) -> DiffBridgeId {
        let mut nodes = self.lock_mut();
        push_diff_bridge(&mut nodes, DiffBridge::new(start, end, r_start, r_end))
    }

    /// Tapered bridge from a head's junction point into a thicker pillar.
    pub fn add_diff_bridge_from_head(
        &self,
        head_id: HeadId,
        end: Point3<f64>,
        r_start: f64,
        r_end: f64,
    ) -> DiffBridgeId {
        let mut nodes = self.lock_mut();
        let start = nodes.heads[head_id.index()].junction_point();
        let bridge = DiffBridge::new(start, end, r_start, r_end);
        let id = push_diff_bridge(&mut nodes, bridge);
        nodes.heads[head_id.index()].bridge_id = Some(BridgeLink::Tapered(id));
        id
    }

    pub fn add_compact_bridge(&self, mut bridge: CompactBridge) -> CompactBridgeId {
        let mut nodes = self.lock_mut();
        let id = CompactBridgeId(nodes.compact_bridges.len());
        bridge.id = id;
        nodes.compact_bridges.push(bridge);
        id
    }

    pub fn add_pedestal(&self, mut pedestal: Pedestal) -> PedestalId {
        let mut nodes = self.lock_mut();
        let id = PedestalId(nodes.pedestals.len());
        pedestal.id = id;
        nodes.pedestals.push(pedestal);
        id
    }

    /// Record that `pillar_id` stands on `pedestal_id`.
    pub fn link_pedestal(&self, pillar_id: PillarId, pedestal_id: PedestalId) {
        let mut nodes = self.lock_mut();
        nodes.pillars[pillar_id.index()].pedestal_id = Some(pedestal_id);
        nodes.pedestals[pedestal_id.index()].pillar_id = Some(pillar_id);
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Count one more bridge on a pillar. Refuses at the configured cap.
    pub fn increment_bridges(&self, pillar_id: PillarId) -> bool {
        let mut nodes = self.lock();
        let pillar = &mut nodes.pillars[pillar_id.index()];
        if pillar.bridges < self.max_bridges_on_pillar {
            pillar.bridges += 1;
            true
        } else {
            false
        }
    }

    /// Count one more link on a pillar. Refuses at the configured cap.
    pub fn increment_links(&self, pillar_id: PillarId) -> bool {
        let mut nodes = self.lock();
        let pillar = &mut nodes.pillars[pillar_id.index()];
        if pillar.links < self.max_links_on_pillar {
            pillar.links += 1;
            true
        } else {
            false
        }
    }

    /// Count a link on both pillars, or on neither if either is at the cap.
    pub fn increment_links_pair(&self, a: PillarId, b: PillarId) -> bool {
        let mut nodes = self.lock();
        let cap = self.max_links_on_pillar;
        if nodes.pillars[a.index()].links < cap && nodes.pillars[b.index()].links < cap {
            nodes.pillars[a.index()].links += 1;
            nodes.pillars[b.index()].links += 1;
            true
        } else {
            false
        }
    }

    /// True while the pillar can take another link.
    pub fn accepts_link(&self, pillar_id: PillarId) -> bool {
        self.lock().pillars[pillar_id.index()].links < self.max_links_on_pillar
    }

    /// True while the pillar can take another bridge.
    pub fn accepts_bridge(&self, pillar_id: PillarId) -> bool {
        self.lock().pillars[pillar_id.index()].bridges < self.max_bridges_on_pillar
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn head(&self, id: HeadId) -> Head {
        self.lock().heads[id.index()].clone()
    }

    pub fn pillar(&self, id: PillarId) -> Pillar {
        self.lock().pillars[id.index()].clone()
    }

    pub fn junction(&self, id: JunctionId) -> Junction {
        self.lock().junctions[id.index()].clone()
    }

    /// Pillar directly under a head, if any.
    pub fn head_pillar(&self, head_id: HeadId) -> Option<Pillar> {
        let nodes = self.lock();
        let pid = nodes.heads[head_id.index()].pillar_id?;
        Some(nodes.pillars[pid.index()].clone())
    }

    pub fn pillar_count(&self) -> usize {
        self.lock().pillars.len()
    }

    pub fn bridge_count_of(&self, pillar_id: PillarId) -> u32 {
        self.lock().pillars[pillar_id.index()].bridges
    }

    pub fn links_of(&self, pillar_id: PillarId) -> u32 {
        self.lock().pillars[pillar_id.index()].links
    }

    /// Drop a head that cannot be supported.
    pub fn invalidate_head(&self, head_id: HeadId) {
        self.lock_mut().heads[head_id.index()].invalidate();
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn heads(&self) -> Vec<Head> {
        self.lock().heads.clone()
    }

    pub fn pillars(&self) -> Vec<Pillar> {
        self.lock().pillars.clone()
    }

    pub fn junctions(&self) -> Vec<Junction> {
        self.lock().junctions.clone()
    }

    pub fn bridges(&self) -> Vec<Bridge> {
        self.lock().bridges.clone()
    }

    pub fn crossbridge_count(&self) -> usize {
        self.lock().crossbridge_count
    }

    pub fn diff_bridges(&self) -> Vec<DiffBridge> {
        self.lock().diff_bridges.clone()
    }

    pub fn compact_bridges(&self) -> Vec<CompactBridge> {
        self.lock().compact_bridges.clone()
    }

    pub fn pedestals(&self) -> Vec<Pedestal> {
        self.lock().pedestals.clone()
    }

    /// Remove every node.
    pub fn clear(&self) {
        *self.lock() = Nodes::default();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().node_count() == 0
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Triangulate every node into one mesh.
    ///
    /// Heads that were never connected to a pillar or bridge are left out.
    ///
    /// The result is cached until the next mutation.
    pub fn merged_mesh(&self, steps: u32) -> Mesh {
        let mut nodes = self.lock();
        if let Some(mesh) = &nodes.mesh_cache {
            return mesh.clone();
        }

        let _timer = OperationTimer::new("merge_support_mesh");

        let parts: Vec<Mesh> = {
            let n = &*nodes;
            let heads = n
                .heads
                .par_iter()
                .filter(|h| h.is_valid() && h.is_routed())
                .map(|h| h.mesh(steps));
            let pillars = n.pillars.par_iter().map(|p| p.mesh(steps));
            let junctions = n.junctions.par_iter().map(|j| j.mesh(steps));
            let compact = n.compact_bridges.par_iter().map(|c| c.mesh(steps));
            let bridges = n.bridges.par_iter().map(|b| b.mesh(steps));
            let diff = n.diff_bridges.par_iter().map(|b| b.mesh(steps));
            let pedestals = n.pedestals.par_iter().map(|p| p.mesh(steps));

            heads
                .chain(pillars)
                .chain(junctions)
                .chain(compact)
                .chain(bridges)
                .chain(diff)
                .chain(pedestals)
                .collect()
        };

        let mut merged = Mesh::with_capacity(
            parts.iter().map(Mesh::vertex_count).sum(),
            parts.iter().map(Mesh::face_count).sum(),
        );
        for part in &parts {
            merged.merge(part);
        }

        nodes.mesh_height = merged.height();
        debug!(
            parts = parts.len(),
            faces = merged.face_count(),
            height = nodes.mesh_height,
            "Merged support mesh"
        );
        nodes.mesh_cache = Some(merged.clone());
        merged
    }

    /// Height of the last merged mesh, 0.0 before the first merge.
    pub fn mesh_height(&self) -> f64 {
        self.lock().mesh_height
    }
}

fn push_bridge(nodes: &mut Nodes, mut bridge: Bridge) -> BridgeId {
    let id = BridgeId(nodes.bridges.len());
    bridge.id = id;
    nodes.bridges.push(bridge);
    id
}

fn push_diff_bridge(nodes: &mut Nodes, mut bridge: DiffBridge) -> DiffBridgeId {
    let id = DiffBridgeId(nodes.diff_bridges.len());
    bridge.id = id;
    nodes.diff_bridges.push(bridge);
    id
}
