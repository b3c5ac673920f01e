//! Routing heads to the print bed.

use std::f64::consts::FRAC_PI_2;

use hashbrown::HashSet;
use nalgebra::{Point3, Vector3};
use sla_mesh::{CollisionOracle, HitResult};
use tracing::{debug, warn};

use super::{BlockedHead, BuildContext, Classified, DOWN, EPSILON, from_spherical};
use crate::error::SupportResult;
use crate::nodes::{Head, HeadId, PillarId, PillarStart};
use crate::spatial::{cluster_centroid, distance_2d};

/// Where a ground pillar will stand.
#[derive(Debug, Clone, Copy)]
pub(super) struct GroundFoot {
    /// Top of the bed-standing pillar. Differs from the requested top when
    /// the foot had to move away from the model.
    pub top: Point3<f64>,
    pub with_base: bool,
}

impl<O: CollisionOracle + ?Sized> BuildContext<'_, O> {
    /// Give every ground cluster a pillar and hang the other members on it.
    ///
    /// Returns the blocked heads from classification plus any ground head
    /// that could not be given a pillar.
    pub(super) fn routing_ground(&mut self, classified: Classified) -> SupportResult<Vec<BlockedHead>> {
        let Classified { clusters, mut blocked } = classified;
        let mut centroids: Vec<Option<(HeadId, PillarId)>> = Vec::with_capacity(clusters.len());

        for (i, members) in clusters.iter().enumerate() {
            self.control.check(i)?;
            let junctions: Vec<Point3<f64>> = members
                .iter()
                .map(|&h| self.builder.head(h).junction_point())
                .collect();
            let order: Vec<usize> = (0..members.len()).collect();
            let Some(c) = cluster_centroid(&order, |k| junctions[k], distance_2d) else {
                centroids.push(None);
                continue;
            };

            let head = self.builder.head(members[c]);
            let r = head.request_pillar_radius(self.config.pillar_radius_mm);
            if let Some(pillar) =
                self.create_ground_pillar(&head.junction_point(), &head.dir, r, PillarStart::Head(head.id))
            {
                centroids.push(Some((head.id, pillar)));
            } else {
                warn!(head = %head.id, "Pillar cannot be created for support point");
                blocked.push(BlockedHead {
                    head: head.id,
                    hit: HitResult::miss(head.junction_point(), DOWN),
                });
                centroids.push(None);
            }
        }

        for (i, (members, centroid)) in clusters.iter().zip(&centroids).enumerate() {
            self.control.check(i)?;
            let center_pillar = centroid.map(|(_, p)| p);

            for &id in members {
                if centroid.is_some_and(|(h, _)| h == id) {
                    continue;
                }
                let side = self.builder.head(id);
                if center_pillar.is_some_and(|p| self.connect_to_nearpillar(&side, p))
                    || self.search_pillar_and_connect(&side)?
                {
                    continue;
                }

                let r = side.request_pillar_radius(self.config.pillar_radius_mm);
                if self
                    .create_ground_pillar(&side.junction_point(), &side.dir, r, PillarStart::Head(id))
                    .is_none()
                {
                    blocked.push(BlockedHead {
                        head: id,
                        hit: HitResult::miss(side.junction_point(), DOWN),
                    });
                }
            }
        }

        debug!(
            pillars = self.pillar_index.len(),
            bridges = self.builder.bridges().len(),
            "Routed heads to ground"
        );

        self.interconnect_rings()?;
        Ok(blocked)
    }

    /// Drop a pillar from `top` to the bed, with a base when it is thick
    /// enough. The pillar is registered for nearest-pillar searches.
    ///
    /// With the object on the bed the foot may have to move away from the
    /// model. It then stands under the end of a bridge that leaves `top` at
    /// the minimum slope, heading along `dir` in plan view. `None` when no
    /// foot within reach keeps clear of the model.
    pub(super) fn create_ground_pillar(
        &mut self,
        top: &Point3<f64>,
        dir: &Vector3<f64>,
        r: f64,
        start: PillarStart,
    ) -> Option<PillarId> {
        let foot = self.plan_ground_foot(top, dir, r)?;
        Some(self.build_ground_pillar(top, &foot, r, start))
    }

    pub(super) fn plan_ground_foot(
        &self,
        top: &Point3<f64>,
        dir: &Vector3<f64>,
        r: f64,
    ) -> Option<GroundFoot> {
        let c = self.config;
        let can_base = r >= c.head_back_radius_mm - EPSILON;
        if c.object_elevation_mm >= EPSILON {
            return Some(GroundFoot {
                top: *top,
                with_base: can_base,
            });
        }

        let corrector = from_spherical(FRAC_PI_2 + c.bridge_slope, dir.y.atan2(dir.x));
        let ground = self.builder.ground_level();
        let attempts: &[bool] = if can_base { &[true, false] } else { &[false] };

        attempts.iter().find_map(|&with_base| {
            let (min_dist, lowest) = if with_base {
                (c.pillar_base_safety_distance_mm + c.base_radius_mm + EPSILON, ground)
            } else {
                (c.pillar_base_safety_distance_mm + EPSILON, ground + r)
            };
            self.dodge_walk(top, &corrector, r, min_dist, lowest)
                .map(|p| GroundFoot { top: p, with_base })
        })
    }

    /// Step from `top` along `dir` until the bed under the walker is at
    /// least `min_dist` from the model and nothing blocks the drop.
    fn dodge_walk(
        &self,
        top: &Point3<f64>,
        dir: &Vector3<f64>,
        r: f64,
        min_dist: f64,
        lowest: f64,
    ) -> Option<Point3<f64>> {
        let ground = self.builder.ground_level();
        let step = r.max(EPSILON);
        let mut t = 0.0;
        loop {
            let p = top + dir * t;
            if t > self.config.max_bridge_length_mm || p.z < lowest {
                return None;
            }
            let floor = Point3::new(p.x, p.y, ground);
            let clearance = self.oracle.nearest_surface_point(&floor).distance_sq.sqrt();
            if clearance >= min_dist && !self.bridge_hit(&p, &DOWN, r).is_hit() {
                return (t == 0.0 || self.bridge_is_clear(top, &p, r)).then_some(p);
            }
            t += step;
        }
    }

    /// Add the pillar planned by [`plan_ground_foot`](Self::plan_ground_foot),
    /// bridging over to it when the foot moved.
    pub(super) fn build_ground_pillar(
        &mut self,
        top: &Point3<f64>,
        foot: &GroundFoot,
        r: f64,
        start: PillarStart,
    ) -> PillarId {
        let ground = self.builder.ground_level();
        let pillar = if (foot.top - top).norm() < EPSILON {
            self.builder.add_pillar(top, ground, r, start)
        } else {
            match start {
                PillarStart::Head(h) => self.builder.add_bridge_from_head(h, foot.top, r),
                PillarStart::Junction(_) | PillarStart::Free => {
                    self.builder.add_bridge(*top, foot.top, r)
                }
            };
            let junction = self.builder.add_junction(foot.top, r);
            debug!(
                dx = foot.top.x - top.x,
                dy = foot.top.y - top.y,
                "Pillar foot moved away from the model"
            );
            self.builder
                .add_pillar(&foot.top, ground, r, PillarStart::Junction(junction))
        };

        if foot.with_base {
            let c = self.config;
            self.builder
                .add_pillar_base(pillar, c.base_height_mm, c.base_radius_mm);
        }
        self.pillar_index
            .insert(Point3::new(foot.top.x, foot.top.y, ground), pillar);
        pillar
    }

    /// Bridge a head into the side (or top) of an existing pillar.
    ///
    /// If the head sits so low that a bridge at the minimum slope would
    /// miss the pillar top, a short pillar is first dropped under the head
    /// and the bridge starts from its bottom.
    pub(super) fn connect_to_nearpillar(&self, head: &Head, pillar_id: PillarId) -> bool {
        let c = self.config;
        if !self.builder.accepts_bridge(pillar_id) {
            return false;
        }
        let pillar = self.builder.pillar(pillar_id);

        let head_jp = head.junction_point();
        let top = pillar.start_point();
        let bottom = pillar.endpoint;
        let r = head.request_pillar_radius(c.pillar_radius_mm);

        let d2d = distance_2d(&head_jp, &top);
        let d3d = (top - head_jp).norm();
        let slope = (top.z - head_jp.z).atan2(d2d);
        let max_len = if c.head_back_radius_mm > 0.0 {
            r * c.max_bridge_length_mm / c.head_back_radius_mm
        } else {
            c.max_bridge_length_mm
        };
        let min_slope = c.bridge_slope;

        let mut start = head_jp;
        let mut end = top;
        let mut zdiff = 0.0;

        if d3d > max_len || slope > -min_slope {
            // Touch the pillar where a bridge at the minimum slope lands.
            let mut zdown = head_jp.z - d2d * min_slope.tan();
            let length = d2d / min_slope.cos();
            zdiff = zdown - top.z;

            if zdiff > 0.0 {
                zdown -= zdiff;
                start.z -= zdiff;
                if self.bridge_distance(&head_jp, &DOWN, r) < zdiff {
                    return false;
                }
            }

            if zdown <= top.z && zdown >= bottom.z && length < max_len {
                end.z = zdown;
            } else {
                return false;
            }
        }

        if end.z < self.builder.ground_level() + 4.0 * head.r_back {
            return false;
        }
        if !self.bridge_is_clear(&start, &end, r) {
            return false;
        }
        if !self.builder.increment_bridges(pillar_id) {
            return false;
        }

        let tapered = pillar.r > r + EPSILON;
        if zdiff > 0.0 {
            self.builder
                .add_pillar(&head_jp, start.z, r, PillarStart::Head(head.id));
            self.builder.add_junction(start, r);
            if tapered {
                self.builder.add_diff_bridge(start, end, r, pillar.r);
            } else {
                self.builder.add_bridge(start, end, r);
            }
        } else if tapered {
            self.builder
                .add_diff_bridge_from_head(head.id, end, r, pillar.r);
        } else {
            self.builder.add_bridge_from_head(head.id, end, r);
        }
        true
    }

    /// Try bed-standing pillars nearest first until one takes the head.
    ///
    /// Pillars thinner than the head's pillar radius are skipped.
    pub(super) fn search_pillar_and_connect(&self, head: &Head) -> SupportResult<bool> {
        let jp = head.junction_point();
        let query = Point3::new(jp.x, jp.y, self.builder.ground_level());
        let r = head.request_pillar_radius(self.config.pillar_radius_mm);

        let mut tried: HashSet<PillarId> = HashSet::new();
        let mut iteration = 0;
        while let Some((_, candidate)) = self.pillar_index.nearest_excluding(&query, &tried) {
            self.control.check(iteration)?;
            iteration += 1;

            if self.builder.pillar(candidate).r + EPSILON >= r
                && self.connect_to_nearpillar(head, candidate)
            {
                return Ok(true);
            }
            tried.insert(candidate);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_4;

    use super::*;
    use crate::builder::SupportTreeBuilder;
    use crate::config::SupportConfig;
    use crate::control::JobControl;
    use sla_mesh::{IndexedMesh, Mesh, Vertex};

    /// Wall standing on the bed, spanning x in [0, 4].
    fn wall() -> IndexedMesh {
        let mut mesh = Mesh::new();
        for &(x, y, z) in &[
            (0.0, 0.0, 0.0),
            (4.0, 0.0, 0.0),
            (4.0, 20.0, 0.0),
            (0.0, 20.0, 0.0),
            (0.0, 0.0, 20.0),
            (4.0, 0.0, 20.0),
            (4.0, 20.0, 20.0),
            (0.0, 20.0, 20.0),
        ] {
            mesh.vertices.push(Vertex::from_coords(x, y, z));
        }
        mesh.faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        IndexedMesh::new(mesh).unwrap()
    }

    /// Ground pillar under (6, 10, 10), two millimetres from the wall, with
    /// the object resting on the bed.
    fn pillar_beside_wall(dir: Vector3<f64>) -> (SupportTreeBuilder, Option<PillarId>) {
        let oracle = wall();
        let config = SupportConfig::default().with_object_elevation(0.0);
        let builder = SupportTreeBuilder::new(0.0, &config);
        let control = JobControl::new();
        let pillar = {
            let mut ctx = BuildContext::new(&oracle, &config, &[], &builder, &control);
            ctx.create_ground_pillar(&Point3::new(6.0, 10.0, 10.0), &dir, 0.5, PillarStart::Free)
        };
        (builder, pillar)
    }

    #[test]
    fn test_foot_dodges_away_from_wall() {
        let (builder, pillar) = pillar_beside_wall(Vector3::x());
        let pillar = builder.pillar(pillar.unwrap());

        // Two half-millimetre steps at 45 degrees clear base radius plus gap
        assert!((pillar.endpoint.x - (6.0 + FRAC_PI_4.cos())).abs() < 1e-9);
        assert!(pillar.endpoint.x - 4.0 >= 2.5);
        assert!(pillar.endpoint.z.abs() < 1e-9);
        assert!(pillar.base.is_some());
        assert!(matches!(pillar.start, PillarStart::Junction(_)));

        let bridges = builder.bridges();
        assert_eq!(bridges.len(), 1);
        assert!((bridges[0].slope() - FRAC_PI_4).abs() < 1e-9);
        assert_eq!(builder.junctions().len(), 1);
    }

    #[test]
    fn test_foot_without_base_when_dodge_fails() {
        // Walking towards the wall never finds room for a base
        let (builder, pillar) = pillar_beside_wall(-Vector3::x());
        let pillar = builder.pillar(pillar.unwrap());

        assert!((pillar.endpoint.x - 6.0).abs() < 1e-9);
        assert!(pillar.base.is_none());
        assert!(matches!(pillar.start, PillarStart::Free));
        assert!(builder.bridges().is_empty());
    }

    #[test]
    fn test_elevated_object_drops_straight() {
        let oracle = wall();
        let config = SupportConfig::default();
        let builder = SupportTreeBuilder::new(-5.0, &config);
        let control = JobControl::new();
        let ctx = BuildContext::new(&oracle, &config, &[], &builder, &control);

        let top = Point3::new(4.5, 10.0, 10.0);
        let foot = ctx.plan_ground_foot(&top, &Vector3::x(), 0.5).unwrap();
        assert_eq!(foot.top, top);
        assert!(foot.with_base);
    }
}
