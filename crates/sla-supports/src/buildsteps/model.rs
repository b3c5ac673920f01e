//! Routing heads that cannot reach the bed directly.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use sla_mesh::CollisionOracle;
use tracing::{debug, info, warn};

use super::{BlockedHead, BuildContext, DOWN, EPSILON, best_direction};
use crate::error::SupportResult;
use crate::generator::UnresolvedReason;
use crate::nodes::{Head, Pedestal, PillarStart, segment_slope};

impl<O: CollisionOracle + ?Sized> BuildContext<'_, O> {
    /// Stand blocked heads on the model through a pedestal, or failing
    /// that hang them on a nearby pillar or walk them sideways until the
    /// way down is clear.
    pub(super) fn routing_nonground(&mut self, blocked: Vec<BlockedHead>) -> SupportResult<()> {
        if self.config.ground_facing_only {
            for b in &blocked {
                let head = self.builder.head(b.head);
                self.mark_unresolved(head.point_index, head.pos, UnresolvedReason::NoRoute);
            }
            info!(skipped = blocked.len(), "Model facing routing is disabled");
            return Ok(());
        }

        let heads: Vec<Head> = blocked.iter().map(|b| self.builder.head(b.head)).collect();

        let this = &*self;
        let pedestals: Vec<Option<Pedestal>> = heads
            .par_iter()
            .zip(blocked.par_iter())
            .enumerate()
            .map(|(i, (head, b))| {
                this.control.check(i)?;
                Ok(b.hit.is_hit().then(|| this.plan_pedestal(head, b.hit.distance)).flatten())
            })
            .collect::<SupportResult<_>>()?;

        let mut on_model = 0;
        for (i, (head, pedestal)) in heads.iter().zip(pedestals).enumerate() {
            self.control.check(i)?;

            if let Some(pedestal) = pedestal {
                self.place_on_pedestal(head, pedestal);
                on_model += 1;
                continue;
            }
            if self.search_pillar_and_connect(head)? || self.route_sideways(head)? {
                continue;
            }

            warn!(head = %head.id, point = head.point_index, "Failed to route model facing support point");
            self.mark_unresolved(head.point_index, head.pos, UnresolvedReason::NoRoute);
        }

        debug!(
            blocked = heads.len(),
            on_model,
            pedestals = self.builder.pedestals().len(),
            "Routed heads to model"
        );
        Ok(())
    }

    /// Pedestal under a head whose downward cast hit the model after
    /// `gap` millimetres.
    ///
    /// The pedestal shaft shrinks to fit the gap. `None` when it cannot
    /// fit, when the surface right under the head is far from the ring
    /// hit, or when its top would rise above the head junction.
    fn plan_pedestal(&self, head: &Head, gap: f64) -> Option<Pedestal> {
        let c = self.config;
        let jp = head.junction_point();

        let centre = self.oracle.ray_hit(&jp, &DOWN, self.sd());
        let gap = if centre.is_hit() && (centre.distance - gap).abs() < 2.0 * head.r_back {
            centre.distance
        } else {
            return None;
        };

        let fixed = 2.0 * head.r_pin + 2.0 * head.r_back - c.head_penetration_mm;
        let width = if gap < fixed + c.head_width_mm {
            gap - fixed
        } else {
            c.head_width_mm
        };
        if width < 0.0 {
            return None;
        }

        let pedestal = Pedestal::new(
            Point3::new(jp.x, jp.y, jp.z - gap),
            head.r_pin,
            head.r_back,
            width,
            c.head_penetration_mm,
        );
        (pedestal.junction_point().z <= jp.z).then_some(pedestal)
    }

    fn place_on_pedestal(&mut self, head: &Head, pedestal: Pedestal) {
        let r = head.request_pillar_radius(self.config.pillar_radius_mm);
        let bottom = pedestal.junction_point().z;
        let pedestal_id = self.builder.add_pedestal(pedestal);
        let pillar = self
            .builder
            .add_pillar(&head.junction_point(), bottom, r, PillarStart::Head(head.id));
        self.builder.link_pedestal(pillar, pedestal_id);
    }

    /// Bridge out along the head direction to a spot with a clear drop.
    /// When that fails, look for the direction with the most room out of
    /// the cavity and try again along it.
    fn route_sideways(&mut self, head: &Head) -> SupportResult<bool> {
        if self.connect_to_ground(head, &head.dir)? {
            return Ok(true);
        }

        let c = self.config;
        let r = head.request_pillar_radius(c.pillar_radius_mm);
        let jp = head.junction_point();
        let escape = best_direction(c.optimizer_max_iterations, head.dir.y.atan2(head.dir.x), |n| {
            if segment_slope(&jp, &(jp + n)) + EPSILON < c.bridge_slope {
                f64::NEG_INFINITY
            } else {
                self.bridge_distance(&jp, n, r)
            }
        });
        self.control.check_now()?;

        match escape {
            Some((dir, room)) if room > 0.0 => {
                debug!(head = %head.id, room, "Trying escape direction");
                self.connect_to_ground(head, &dir)
            }
            _ => Ok(false),
        }
    }

    /// Walk from the head junction along `dir` until a downward cast is
    /// clear, then bridge there and drop a ground pillar.
    fn connect_to_ground(&mut self, head: &Head, dir: &Vector3<f64>) -> SupportResult<bool> {
        let c = self.config;
        let r = head.request_pillar_radius(c.pillar_radius_mm);
        let jp = head.junction_point();

        if dir.z >= 0.0 || segment_slope(&jp, &(jp + dir)) + EPSILON < c.bridge_slope {
            return Ok(false);
        }
        let max_len = if c.head_back_radius_mm > 0.0 {
            c.max_bridge_length_mm * r / c.head_back_radius_mm
        } else {
            c.max_bridge_length_mm
        };
        let reach = self.bridge_distance(&jp, dir, r).min(max_len);
        let step = r.max(EPSILON);

        let mut d = 0.0;
        let mut iteration = 0;
        let end = loop {
            self.control.check(iteration)?;
            iteration += 1;

            let p = jp + dir * d;
            if !self.bridge_hit(&p, &DOWN, r).is_hit() {
                break p;
            }
            d += step;
            if d >= reach {
                return Ok(false);
            }
        };
        if end.z <= self.builder.ground_level() + c.base_height_mm {
            return Ok(false);
        }

        if d < EPSILON {
            return Ok(self
                .create_ground_pillar(&jp, dir, r, PillarStart::Head(head.id))
                .is_some());
        }
        let Some(foot) = self.plan_ground_foot(&end, dir, r) else {
            return Ok(false);
        };
        self.builder.add_bridge_from_head(head.id, end, r);
        let junction = self.builder.add_junction(end, r);
        self.build_ground_pillar(&end, &foot, r, PillarStart::Junction(junction));
        Ok(true)
    }
}
