//! Compact bridges for points too cramped for a pin-head.

use rayon::prelude::*;
use sla_mesh::CollisionOracle;
use tracing::{debug, warn};

use super::collision::bridge_clearance;
use super::{BuildContext, DOWN, HeadlessPoint};
use crate::error::SupportResult;
use crate::generator::UnresolvedReason;
use crate::nodes::CompactBridge;

impl<O: CollisionOracle + ?Sized> BuildContext<'_, O> {
    /// Support headless points with short sticks sunk into the surface.
    pub(super) fn routing_headless(&mut self) -> SupportResult<()> {
        let headless = std::mem::take(&mut self.headless);

        let this = &*self;
        let sticks: Vec<Option<CompactBridge>> = headless
            .par_iter()
            .enumerate()
            .map(|(i, point)| {
                this.control.check(i)?;
                Ok(this.plan_stick(point))
            })
            .collect::<SupportResult<_>>()?;

        let mut placed = 0;
        for (i, (point, stick)) in headless.iter().zip(sticks).enumerate() {
            self.control.check(i)?;
            match stick {
                Some(stick) => {
                    self.builder.add_compact_bridge(stick);
                    placed += 1;
                }
                None => {
                    warn!(point = point.point_index, "Cannot find route for headless support stick");
                    self.mark_unresolved(
                        point.point_index,
                        point.pos,
                        UnresolvedReason::NoHeadlessAnchor,
                    );
                }
            }
        }

        debug!(headless = headless.len(), placed, "Processed headless points");
        Ok(())
    }

    /// Stick from just under the surface down onto the model below.
    ///
    /// `None` when there is no model below, or it is closer than two
    /// stick radii.
    fn plan_stick(&self, point: &HeadlessPoint) -> Option<CompactBridge> {
        let r = self.config.headless_pillar_radius_mm;
        let sink = r / 3.0;
        let n = point.normal;

        let sp = point.pos - n * sink;
        let sj = sp + n * r;

        let wall = bridge_clearance(self.oracle, self.sd(), &point.pos, &DOWN, r, true).distance;
        let below = self.oracle.ray_hit(&sj, &DOWN, self.sd()).distance;
        let usable = |d: f64| d.is_finite() && d >= 2.0 * r;
        if !usable(wall) || !usable(below) {
            return None;
        }

        let ep = sj + DOWN * (below + sink);
        Some(CompactBridge::new(point.point_index, sp, ep, n, r))
    }
}
