//! Linkage reinforcement for tall pillars.

use std::f64::consts::PI;

use nalgebra::Point3;
use sla_mesh::CollisionOracle;
use tracing::debug;

use super::{BuildContext, DOWN, EPSILON, pair_key};
use crate::error::SupportResult;
use crate::nodes::{Pillar, PillarId, PillarStart};

/// A link only counts for a pillar when its neighbour is at least this
/// fraction of its height.
const MIN_HEIGHT_RATIO: f64 = 0.5;

/// Azimuths tried when placing helper pillars.
const HELPER_ANGLE_STEPS: u32 = 20;

impl<O: CollisionOracle + ?Sized> BuildContext<'_, O> {
    /// Brace pillars with their neighbours, then add helper pillars next
    /// to the tall ones that are still short of links.
    pub(super) fn cascade_pillars(&mut self) -> SupportResult<()> {
        self.cascade_neighbours()?;

        let c = self.config;
        let count = self.builder.pillar_count();
        let mut helpers = 0;
        for i in 0..count {
            self.control.check(i)?;
            let pillar = self.builder.pillar(PillarId(i));

            let needed = if pillar.height > c.max_dual_pillar_height_mm && pillar.links < 2 {
                2 - pillar.links
            } else if pillar.height > c.max_solo_pillar_height_mm && pillar.links < 1 {
                1
            } else {
                0
            };
            if needed == 0 {
                continue;
            }

            let Some(spots) = self.helper_spots(&pillar, needed) else {
                debug!(pillar = %pillar.id, height = pillar.height, "No room for helper pillars");
                continue;
            };
            let added = self.add_helper_pillars(&pillar, &spots);
            if added > 0 {
                helpers += added;
                self.cascade_neighbours()?;
            }
        }

        debug!(helpers, crossbridges = self.builder.crossbridge_count(), "Cascaded pillars");
        Ok(())
    }

    /// Connect each ground pillar to neighbours in reach, nearest first,
    /// until it has `pillar_cascade_neighbors` links.
    fn cascade_neighbours(&mut self) -> SupportResult<()> {
        let c = self.config;
        let cap = c.pillar_cascade_neighbors;
        let feet: Vec<(Point3<f64>, PillarId)> = self.pillar_index.entries().to_vec();

        for (i, (foot, id)) in feet.iter().enumerate() {
            self.control.check(i)?;
            let pillar = self.builder.pillar(*id);
            if pillar.links >= cap {
                continue;
            }

            let reach = if c.head_back_radius_mm > 0.0 {
                c.max_pillar_link_distance_mm * pillar.r / c.head_back_radius_mm
            } else {
                c.max_pillar_link_distance_mm
            };

            for (_, other) in self.pillar_index.within(foot, reach) {
                if other == *id || self.linked_pairs.contains(&pair_key(*id, other)) {
                    continue;
                }
                let neighbour = self.builder.pillar(other);
                if neighbour.links >= cap || neighbour.r + EPSILON < pillar.r {
                    continue;
                }

                if self.interconnect(&pillar, &neighbour) {
                    self.linked_pairs.insert(pair_key(*id, other));
                    let h1 = c.max_solo_pillar_height_mm;
                    if pillar.height < h1 || neighbour.height / pillar.height > MIN_HEIGHT_RATIO {
                        self.builder.increment_links(*id);
                    }
                    if neighbour.height < h1 || pillar.height / neighbour.height > MIN_HEIGHT_RATIO {
                        self.builder.increment_links(other);
                    }
                }

                if !self.builder.accepts_link(*id) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Find `needed` spots around a pillar where helper pillars can stand.
    ///
    /// Spots sit `2 * base_radius` away from the pillar axis, π/3 apart,
    /// one minimum-slope bridge below the pillar top. The ring is turned in
    /// steps of 0.1π until every spot has a clear way down, clearance
    /// from the model at bed level, and a clear bridge from the parent top.
    fn helper_spots(&self, pillar: &Pillar, needed: u32) -> Option<Vec<Point3<f64>>> {
        let c = self.config;
        let radius = 2.0 * c.base_radius_mm;
        let bridge_len = radius / c.bridge_slope.cos();
        if bridge_len > c.max_bridge_length_mm {
            return None;
        }

        let top = pillar.start_point();
        let z = top.z - radius * c.bridge_slope.tan();
        let ground = self.builder.ground_level();
        if z <= ground + c.base_height_mm {
            return None;
        }
        let min_dist = c.pillar_base_safety_distance_mm + c.base_radius_mm + EPSILON;

        for step in 0..HELPER_ANGLE_STEPS {
            let alpha = f64::from(step) * 0.1 * PI;
            let spots: Vec<Point3<f64>> = (0..needed)
                .map(|n| {
                    let a = alpha + f64::from(n) * PI / 3.0;
                    Point3::new(top.x + a.cos() * radius, top.y + a.sin() * radius, z)
                })
                .collect();

            let fits = spots.iter().all(|s| {
                let floor = Point3::new(s.x, s.y, ground);
                !self.bridge_hit(s, &DOWN, pillar.r).is_hit()
                    && self.oracle.nearest_surface_point(&floor).distance_sq.sqrt() > min_dist
                    && self.bridge_is_clear(&top, s, pillar.r)
            });
            if fits {
                return Some(spots);
            }
        }
        None
    }

    /// Stand helper pillars at `spots`, each hung from the parent's top,
    /// and brace the helpers to each other. Returns how many were added.
    fn add_helper_pillars(&mut self, parent: &Pillar, spots: &[Point3<f64>]) -> usize {
        let c = self.config;
        let ground = self.builder.ground_level();
        let top = parent.start_point();

        let mut added: Vec<PillarId> = Vec::with_capacity(spots.len());
        for spot in spots {
            if !self.builder.accepts_link(parent.id) {
                break;
            }
            let junction = self.builder.add_junction(*spot, parent.r);
            let helper = self
                .builder
                .add_pillar(spot, ground, parent.r, PillarStart::Junction(junction));
            self.builder
                .add_pillar_base(helper, c.base_height_mm, c.base_radius_mm);
            self.builder.add_bridge(top, *spot, parent.r);
            self.pillar_index
                .insert(Point3::new(spot.x, spot.y, ground), helper);

            self.builder.increment_links_pair(parent.id, helper);
            self.linked_pairs.insert(pair_key(parent.id, helper));
            added.push(helper);
        }

        for pair in added.windows(2) {
            self.link_pillars(pair[0], pair[1]);
        }
        added.len()
    }
}
