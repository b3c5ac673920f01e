//! Bracing between bed-standing pillars.

use nalgebra::Point3;
use sla_mesh::CollisionOracle;
use tracing::debug;

use super::{BuildContext, pair_key};
use crate::config::PillarConnectionMode;
use crate::error::SupportResult;
use crate::nodes::{Pillar, PillarId};
use crate::spatial::{PointIndex, convex_hull_rings, distance_2d};

impl<O: CollisionOracle + ?Sized> BuildContext<'_, O> {
    /// Brace ground pillars ring by ring.
    ///
    /// Pillar feet are peeled into nested convex hulls. Neighbours along a
    /// ring are braced, and every pillar of a ring is braced to the
    /// nearest pillar of the ring inside it.
    pub(super) fn interconnect_rings(&mut self) -> SupportResult<()> {
        let feet: Vec<(Point3<f64>, PillarId)> = self.pillar_index.entries().to_vec();
        let members: Vec<usize> = (0..feet.len()).collect();
        let rings = convex_hull_rings(&members, |i| feet[i].0);

        let mut outer: Option<&Vec<usize>> = None;
        for ring in &rings {
            self.control.check_now()?;

            if let Some(outer) = outer {
                let mut inner = PointIndex::new();
                for &m in ring {
                    inner.insert(feet[m].0, feet[m].1);
                }
                for &m in outer {
                    if let Some((_, nearest)) = inner.nearest(&feet[m].0) {
                        self.link_pillars(feet[m].1, nearest);
                    }
                }
            }

            for pair in ring.windows(2) {
                self.link_pillars(feet[pair[0]].1, feet[pair[1]].1);
            }
            outer = Some(ring);
        }

        debug!(
            rings = rings.len(),
            links = self.linked_pairs.len(),
            "Interconnected pillar rings"
        );
        Ok(())
    }

    /// Brace two pillars and count the link on both. Does nothing when the
    /// pair is already braced or either pillar has all the links it may take.
    pub(super) fn link_pillars(&mut self, a: PillarId, b: PillarId) -> bool {
        if a == b || self.linked_pairs.contains(&pair_key(a, b)) {
            return false;
        }
        if !self.builder.accepts_link(a) || !self.builder.accepts_link(b) {
            return false;
        }

        let (pa, pb) = (self.builder.pillar(a), self.builder.pillar(b));
        if !self.interconnect(&pa, &pb) {
            return false;
        }
        self.linked_pairs.insert(pair_key(a, b));
        self.builder.increment_links_pair(a, b)
    }

    /// Zig-zag crossbridges between two pillars, from the lower top down
    /// to the higher bottom.
    ///
    /// Each bridge falls at exactly the minimum slope. Returns true if at
    /// least one bridge was placed.
    pub(super) fn interconnect(&self, a: &Pillar, b: &Pillar) -> bool {
        let c = self.config;
        let sa = a.start_point();
        let sb = b.start_point();

        let d = distance_2d(&sa, &sb);
        if d < 2.0 * c.head_back_radius_mm
            || d > c.max_pillar_link_distance_mm
            || d > c.max_bridge_length_mm
        {
            return false;
        }

        let slope = c.bridge_slope;
        let zstep = d * slope.tan();
        let r = a.r.min(b.r);
        let lowest = a
            .endpoint
            .z
            .max(b.endpoint.z)
            .max(self.builder.ground_level() + c.base_height_mm);

        let cross = match c.pillar_connection_mode {
            PillarConnectionMode::ZigZag => false,
            PillarConnectionMode::Cross => true,
            PillarConnectionMode::Dynamic => d > 2.0 * c.base_radius_mm,
        };

        let (mut from, mut to) = ((sa.x, sa.y), (sb.x, sb.y));
        let mut z = sa.z.min(sb.z);
        let mut connected = false;

        while z - zstep >= lowest {
            let start = Point3::new(from.0, from.1, z);
            let end = Point3::new(to.0, to.1, z - zstep);
            if self.bridge_is_clear(&start, &end, r) {
                self.builder.add_crossbridge(start, end, r);
                connected = true;
            }

            if cross {
                let back_start = Point3::new(to.0, to.1, z);
                let back_end = Point3::new(from.0, from.1, z - zstep);
                if self.bridge_is_clear(&back_start, &back_end, r) {
                    self.builder.add_crossbridge(back_start, back_end, r);
                    connected = true;
                }
            }

            std::mem::swap(&mut from, &mut to);
            z -= zstep;
        }

        connected
    }
}
