//! Clearance checks for support shapes.
//!
//! A support element is approximated by a ring of rays shot along its
//! axis. The smallest hit distance over the ring is the free length in
//! that direction.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use sla_mesh::{CollisionOracle, HitResult};

/// Rays per ring.
pub const RING_SAMPLES: usize = 8;

/// Two unit vectors perpendicular to `v` and to each other.
pub fn orthonormal_basis(v: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if v.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let a = v.cross(&helper).normalize();
    let b = v.cross(&a).normalize();
    (a, b)
}

fn ring_angles() -> impl Iterator<Item = f64> {
    (0..RING_SAMPLES).map(|i| i as f64 * 2.0 * PI / RING_SAMPLES as f64)
}

fn closest(hits: impl Iterator<Item = HitResult>) -> HitResult {
    hits.min_by(|a, b| a.distance.total_cmp(&b.distance))
        .unwrap_or_else(|| HitResult::with_distance(f64::INFINITY))
}

/// Free length in front of a pin-head placed at `s` pointing along `dir`.
///
/// Rays run from a ring around the pin tip (radius `r_pin + sd`) to a ring
/// around the back sphere centre (radius `r_back + sd`, `width` along
/// `dir`). A ray that starts inside the model is re-cast from where it
/// leaves; if the model is thicker than the pin, the sample counts as
/// fully blocked.
#[allow(clippy::too_many_arguments)]
pub fn pinhead_clearance<O: CollisionOracle + ?Sized>(
    oracle: &O,
    sd: f64,
    s: &Point3<f64>,
    dir: &Vector3<f64>,
    r_pin: f64,
    r_back: f64,
    width: f64,
) -> HitResult {
    let (a, b) = orthonormal_basis(dir);
    let c = s + dir * width;

    closest(ring_angles().map(|phi| {
        let radial = a * phi.cos() + b * phi.sin();
        let ps = s + radial * (sd + r_pin);
        let p = c + radial * (sd + r_back);
        let Some(n) = (p - ps).try_normalize(f64::EPSILON) else {
            return HitResult::with_distance(0.0);
        };

        let hit = oracle.ray_hit(&ps, &n, sd);
        if !hit.is_inside() {
            return hit;
        }
        if hit.distance > r_pin + sd {
            return HitResult::with_distance(0.0);
        }
        oracle.ray_hit(&(ps + n * (hit.distance + 2.0 * sd)), &n, 0.0)
    }))
}

/// Free length for a cylinder of radius `r` starting at `s` along `dir`.
///
/// With `inside_check`, samples starting inside the model are re-cast
/// from where they leave it, and count as blocked when the wall is
/// thicker than `2r + sd`.
pub fn bridge_clearance<O: CollisionOracle + ?Sized>(
    oracle: &O,
    sd: f64,
    s: &Point3<f64>,
    dir: &Vector3<f64>,
    r: f64,
    inside_check: bool,
) -> HitResult {
    let (a, b) = orthonormal_basis(dir);

    closest(ring_angles().map(|phi| {
        let p = s + (a * phi.cos() + b * phi.sin()) * (sd + r);
        let hit = oracle.ray_hit(&p, dir, sd);
        if !(inside_check && hit.is_inside()) {
            return hit;
        }
        if hit.distance > 2.0 * r + sd {
            return HitResult::with_distance(0.0);
        }
        let restart = hit.distance + 2.0 * sd;
        let again = oracle.ray_hit(&(p + dir * restart), dir, 0.0);
        HitResult {
            distance: again.distance + restart,
            ..again
        }
    }))
}
