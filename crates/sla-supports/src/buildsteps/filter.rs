//! Point filtering and head placement.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use sla_mesh::{CollisionOracle, estimate_normals};
use tracing::debug;

use super::{BuildContext, HeadCandidate, HeadlessPoint, MIN_POLAR, best_direction, from_spherical};
use crate::error::SupportResult;
use crate::nodes::{Head, HeadId};
use crate::spatial::cluster;

/// Points closer than this are merged.
pub(crate) const D_SP: f64 = 0.1;

/// Most points merged into one.
const MERGE_LIMIT: usize = 2;

enum PointClass {
    Headed(HeadCandidate),
    Headless(HeadlessPoint),
}

impl<O: CollisionOracle + ?Sized> BuildContext<'_, O> {
    /// Merge near-duplicate points and sort the rest into headed and
    /// headless. Headless points are kept on the context for later.
    pub(super) fn filter(&mut self) -> SupportResult<Vec<HeadCandidate>> {
        let positions: Vec<Point3<f64>> = self.points.iter().map(|p| p.pos).collect();
        let groups = cluster(&positions, D_SP, MERGE_LIMIT, |a, b| (a - b).norm() < D_SP);
        self.control.check_now()?;

        let mut kept: Vec<usize> = groups.iter().filter_map(|g| g.first().copied()).collect();
        kept.sort_unstable();
        let kept_positions: Vec<Point3<f64>> = kept.iter().map(|&i| positions[i]).collect();

        let control = self.control;
        let normals = estimate_normals(
            self.oracle,
            &kept_positions,
            self.config.head_front_radius_mm,
            |i| control.check(i),
        )?;

        let this = &*self;
        let classes: Vec<PointClass> = kept
            .par_iter()
            .zip(normals.par_iter())
            .enumerate()
            .map(|(i, (&index, normal))| {
                this.control.check(i)?;
                Ok(this.classify_point(index, normal))
            })
            .collect::<SupportResult<_>>()?;

        let mut heads = Vec::new();
        for class in classes {
            match class {
                PointClass::Headed(c) => heads.push(c),
                PointClass::Headless(h) => self.headless.push(h),
            }
        }

        debug!(
            input = self.points.len(),
            merged = self.points.len() - kept.len(),
            headed = heads.len(),
            headless = self.headless.len(),
            "Filtered support points"
        );
        Ok(heads)
    }

    fn pin_radius(&self, index: usize) -> f64 {
        let hint = self.points[index].head_radius_hint;
        if hint > 0.0 {
            hint
        } else {
            self.config.head_front_radius_mm
        }
    }

    fn head_fullwidth(&self, r_pin: f64) -> f64 {
        let c = self.config;
        2.0 * r_pin + c.head_width_mm + 2.0 * c.head_back_radius_mm - c.head_penetration_mm
    }

    fn head_clearance(&self, pos: &Point3<f64>, dir: &Vector3<f64>, r_pin: f64) -> f64 {
        self.pinhead_distance(
            pos,
            dir,
            r_pin,
            self.config.head_back_radius_mm,
            self.config.head_width_mm,
        )
    }

    fn classify_point(&self, index: usize, normal: &Vector3<f64>) -> PointClass {
        let pos = self.points[index].pos;
        let normal = if normal.iter().all(|v| v.is_finite()) && normal.norm() > 0.0 {
            *normal
        } else {
            -Vector3::z()
        };
        let headless = |n: Vector3<f64>| {
            PointClass::Headless(HeadlessPoint {
                point_index: index,
                pos,
                normal: n,
            })
        };

        let polar = normal.z.clamp(-1.0, 1.0).acos();
        let azimuth = normal.y.atan2(normal.x);
        if polar < PI - self.config.normal_cutoff_angle {
            return headless(normal);
        }

        let r_pin = self.pin_radius(index);
        let width = self.head_fullwidth(r_pin);
        let threshold = 2.0 * width;

        let mut dir = from_spherical(polar.max(MIN_POLAR), azimuth);
        let mut free = self.head_clearance(&pos, &dir, r_pin);
        if free <= threshold
            && let Some((better, t)) = self.search_direction(&pos, r_pin, azimuth)
            && t > threshold
        {
            dir = better;
            free = t;
        }

        if free > threshold && pos.z + width * dir.z >= self.builder.ground_level() {
            PointClass::Headed(HeadCandidate {
                point_index: index,
                pos,
                dir,
                r_pin,
            })
        } else {
            headless(dir)
        }
    }

    /// Grid search for the head direction with the most clearance.
    fn search_direction(
        &self,
        pos: &Point3<f64>,
        r_pin: f64,
        azimuth: f64,
    ) -> Option<(Vector3<f64>, f64)> {
        best_direction(self.config.optimizer_max_iterations, azimuth, |dir| {
            self.head_clearance(pos, dir, r_pin)
        })
    }

    /// Put a pin-head on every headed point.
    pub(super) fn pinheads(&mut self, candidates: &[HeadCandidate]) -> SupportResult<Vec<HeadId>> {
        let c = self.config;
        let mut ids = Vec::with_capacity(candidates.len());
        for (i, cand) in candidates.iter().enumerate() {
            self.control.check(i)?;
            ids.push(self.builder.add_head(Head::new(
                cand.point_index,
                cand.pos,
                cand.dir,
                cand.r_pin,
                c.head_back_radius_mm,
                c.head_width_mm,
                c.head_penetration_mm,
            )));
        }
        debug!(heads = ids.len(), "Placed pin-heads");
        Ok(ids)
    }
}
