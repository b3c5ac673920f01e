//! Sorting heads into ground reaching clusters and blocked heads.

use nalgebra::Point3;
use rayon::prelude::*;
use sla_mesh::{CollisionOracle, HitResult};
use tracing::{debug, warn};

use super::{BlockedHead, BuildContext, Classified, DOWN};
use crate::error::SupportResult;
use crate::generator::UnresolvedReason;
use crate::nodes::{Head, HeadId};
use crate::spatial::{cluster, distance_2d};

impl<O: CollisionOracle + ?Sized> BuildContext<'_, O> {
    /// Split heads into those that can drop straight to the bed and those
    /// blocked by the model, and group the former for pillar sharing.
    pub(super) fn classify(&mut self, ids: &[HeadId]) -> SupportResult<Classified> {
        let heads: Vec<Head> = ids.iter().map(|&id| self.builder.head(id)).collect();

        let this = &*self;
        let hits: Vec<HitResult> = heads
            .par_iter()
            .enumerate()
            .map(|(i, head)| {
                this.control.check(i)?;
                Ok(this.bridge_hit(&head.junction_point(), &DOWN, head.r_back))
            })
            .collect::<SupportResult<_>>()?;

        let mut ground: Vec<&Head> = Vec::new();
        let mut blocked = Vec::new();
        for (head, hit) in heads.iter().zip(hits) {
            if !hit.is_hit() {
                ground.push(head);
            } else if self.config.ground_facing_only {
                warn!(head = %head.id, "Head is blocked by the model and only ground routing is enabled");
                self.builder.invalidate_head(head.id);
                self.mark_unresolved(head.point_index, head.pos, UnresolvedReason::GroundFacingOnly);
            } else {
                blocked.push(BlockedHead { head: head.id, hit });
            }
        }

        let junctions: Vec<Point3<f64>> = ground.iter().map(|h| h.junction_point()).collect();
        let reach = self.config.max_bridge_length_mm;
        let spread = 2.0 * self.config.base_radius_mm;
        let groups = cluster(
            &junctions,
            reach,
            self.config.max_bridges_on_pillar as usize,
            |a, b| distance_2d(a, b) < spread && (a - b).norm() < reach,
        );
        self.control.check_now()?;

        let clusters: Vec<Vec<HeadId>> = groups
            .into_iter()
            .map(|g| g.into_iter().map(|i| ground[i].id).collect())
            .collect();

        debug!(
            ground = ground.len(),
            clusters = clusters.len(),
            blocked = blocked.len(),
            "Classified heads"
        );
        Ok(Classified { clusters, blocked })
    }
}
