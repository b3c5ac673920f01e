//! Parametric meshes for support tree nodes.
//!
//! Every generator returns an indexed [`Mesh`] in a local frame; node types
//! rotate and translate the result into place. Degenerate inputs (tiny or
//! non-finite radii, zero heights) yield an empty mesh instead of an error.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Point3, UnitQuaternion, Vector3};
use sla_mesh::{Mesh, Vertex};

/// Radii at or below this are treated as zero.
const DEGENERATE_RADIUS: f64 = 1e-6;

/// Polar range of a sphere, measured in radians from the south pole.
pub type Portion = (f64, f64);

/// The whole sphere.
pub const FULL_SPHERE: Portion = (0.0, PI);

fn is_degenerate(r: f64) -> bool {
    !r.is_finite() || r.abs() <= DEGENERATE_RADIUS
}

/// Push a horizontal ring of `steps` vertices and return the index of the first.
fn push_ring(mesh: &mut Mesh, radius: f64, z: f64, steps: u32) -> u32 {
    let first = mesh.vertices.len() as u32;
    for i in 0..steps {
        let angle = 2.0 * PI * i as f64 / steps as f64;
        mesh.vertices.push(Vertex::from_coords(
            radius * angle.cos(),
            radius * angle.sin(),
            z,
        ));
    }
    first
}

/// Quad strip between a lower and an upper ring, facing outward.
fn join_rings(mesh: &mut Mesh, lower: u32, upper: u32, steps: u32) {
    for i in 0..steps {
        let j = (i + 1) % steps;
        let (l0, l1) = (lower + i, lower + j);
        let (u0, u1) = (upper + i, upper + j);
        mesh.faces.push([l0, l1, u1]);
        mesh.faces.push([l0, u1, u0]);
    }
}

/// Fan from a pole vertex below the ring.
fn close_bottom(mesh: &mut Mesh, pole: u32, ring: u32, steps: u32) {
    for i in 0..steps {
        let j = (i + 1) % steps;
        mesh.faces.push([pole, ring + j, ring + i]);
    }
}

/// Fan from a pole vertex above the ring.
fn close_top(mesh: &mut Mesh, pole: u32, ring: u32, steps: u32) {
    for i in 0..steps {
        let j = (i + 1) % steps;
        mesh.faces.push([ring + i, ring + j, pole]);
    }
}

/// Number of circle segments for an angular resolution `fa`.
fn segments_for(fa: f64) -> u32 {
    if !fa.is_finite() || fa <= 0.0 {
        return 3;
    }
    ((2.0 * PI / fa).round() as u32).max(3)
}

/// Rings of a sphere portion as (ring start index, polar angle).
fn sphere_rings(mesh: &mut Mesh, rho: f64, portion: Portion, fa: f64) -> Vec<u32> {
    let (a, b) = portion;
    let steps = segments_for(fa);
    let polar_steps = (((b - a) / fa).ceil() as u32).max(1);

    let mut rings = Vec::with_capacity(polar_steps as usize + 1);
    for k in 0..=polar_steps {
        let theta = a + (b - a) * k as f64 / polar_steps as f64;
        rings.push(push_ring(
            mesh,
            rho * theta.sin(),
            -rho * theta.cos(),
            steps,
        ));
    }
    rings
}

/// Sphere of radius `rho` centered at the origin, limited to `portion`.
///
/// `fa` is the angular resolution in radians. Open ends of a partial
/// sphere are left open; a portion that reaches a pole is closed with a fan.
pub fn sphere(rho: f64, portion: Portion, fa: f64) -> Mesh {
    let (a, b) = portion;
    if is_degenerate(rho) || !(0.0..=PI).contains(&a) || !(a..=PI).contains(&b) || a == b {
        return Mesh::new();
    }

    let steps = segments_for(fa);
    let mut mesh = Mesh::new();

    let south = (a <= DEGENERATE_RADIUS).then(|| {
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, -rho));
        mesh.vertices.len() as u32 - 1
    });

    // Pole rings collapse to a point, so skip them when a pole vertex exists
    let a_ring = if south.is_some() { a.max(fa.min(b - a) * 0.5) } else { a };
    let b_ring = if b >= PI - DEGENERATE_RADIUS {
        b.min(PI - fa.min(b - a) * 0.5)
    } else {
        b
    };
    let rings = sphere_rings(&mut mesh, rho, (a_ring, b_ring), fa);

    for pair in rings.windows(2) {
        join_rings(&mut mesh, pair[0], pair[1], steps);
    }

    if let (Some(pole), Some(&first)) = (south, rings.first()) {
        close_bottom(&mut mesh, pole, first, steps);
    }

    if b >= PI - DEGENERATE_RADIUS
        && let Some(&last) = rings.last()
    {
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, rho));
        let pole = mesh.vertices.len() as u32 - 1;
        close_top(&mut mesh, pole, last, steps);
    }

    mesh
}

/// Open cylinder wall of radius `r` from z = 0 to z = `h`.
pub fn cylinder(r: f64, h: f64, steps: u32) -> Mesh {
    if is_degenerate(r) || !h.is_finite() || h.abs() <= DEGENERATE_RADIUS || steps < 3 {
        return Mesh::new();
    }

    let mut mesh = Mesh::with_capacity(2 * steps as usize, 2 * steps as usize);
    let bottom = push_ring(&mut mesh, r, 0.0, steps);
    let top = push_ring(&mut mesh, r, h, steps);
    join_rings(&mut mesh, bottom, top, steps);
    mesh
}

/// Closed cone frustum standing on z = 0 with height `h`.
pub fn frustum(r_top: f64, r_bottom: f64, h: f64, steps: u32) -> Mesh {
    if is_degenerate(r_top.max(r_bottom))
        || !r_top.is_finite()
        || !r_bottom.is_finite()
        || !h.is_finite()
        || h.abs() <= DEGENERATE_RADIUS
        || steps < 3
    {
        return Mesh::new();
    }

    let mut mesh = Mesh::with_capacity(2 * steps as usize + 2, 4 * steps as usize);
    let bottom = push_ring(&mut mesh, r_bottom.max(0.0), 0.0, steps);
    let top = push_ring(&mut mesh, r_top.max(0.0), h, steps);
    join_rings(&mut mesh, bottom, top, steps);

    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
    close_bottom(&mut mesh, bottom + 2 * steps, bottom, steps);
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, h));
    close_top(&mut mesh, bottom + 2 * steps + 1, top, steps);

    mesh
}

/// Frustum whose axis runs from `start` to `end`.
///
/// Used for tapered bridges and cylinders between arbitrary points.
pub fn frustum_between(
    start: &Point3<f64>,
    end: &Point3<f64>,
    r_start: f64,
    r_end: f64,
    steps: u32,
) -> Mesh {
    let axis = end - start;
    let length = axis.norm();
    let mut mesh = frustum(r_end, r_start, length, steps);
    if mesh.is_empty() {
        return mesh;
    }
    mesh.transform(&rotation_from_z(&axis), start.coords);
    mesh
}

/// Rotation taking +Z onto `dir`, well defined for the antiparallel case.
pub fn rotation_from_z(dir: &Vector3<f64>) -> UnitQuaternion<f64> {
    rotation_between(&Vector3::z(), dir)
}

/// Rotation taking `from` onto `to`.
///
/// `UnitQuaternion::rotation_between` has no answer for opposite vectors;
/// fall back to a half turn about the X axis then.
pub fn rotation_between(from: &Vector3<f64>, to: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::rotation_between(from, to)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI))
}

/// Pin-head in its local frame, pointing along -Z.
///
/// The pin sphere sits on top, the back sphere below, and a tangent robe
/// joins them. The pin tip is at z = `penetration`, so after placing the
/// head at a surface point the pin sinks `penetration` into the model.
pub fn pinhead(r_pin: f64, r_back: f64, width: f64, penetration: f64, steps: u32) -> Mesh {
    if is_degenerate(r_pin) || is_degenerate(r_back) || !width.is_finite() || steps < 3 {
        return Mesh::new();
    }

    let fa = 2.0 * PI / steps as f64;
    let h = r_back + r_pin + width;
    let ratio = (r_back - r_pin) / h;
    if !(-1.0..=1.0).contains(&ratio) {
        return Mesh::new();
    }
    let phi = FRAC_PI_2 - ratio.acos();
    let seam = FRAC_PI_2 + phi;

    let mut back = sphere(r_back, (0.0, seam), fa);
    let mut pin = sphere(r_pin, (seam, PI), fa);
    if back.is_empty() || pin.is_empty() {
        return Mesh::new();
    }
    pin.translate(Vector3::new(0.0, 0.0, h));

    // The back sphere's last ring and the pin's first ring form the robe
    let back_seam = back.vertices.len() as u32 - steps;
    let offset = back.vertices.len() as u32;
    back.merge(&pin);
    join_rings(&mut back, back_seam, offset, steps);

    back.translate(Vector3::new(0.0, 0.0, -(h + r_pin - penetration)));
    back
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sla_mesh::IndexedMesh;

    fn is_closed(mesh: &Mesh) -> bool {
        let mut edges = hashbrown::HashMap::new();
        for f in &mesh.faces {
            for (a, b) in [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])] {
                *edges.entry((a.min(b), a.max(b))).or_insert(0u32) += 1;
            }
        }
        edges.values().all(|&c| c == 2)
    }

    #[test]
    fn test_full_sphere_is_closed_and_round() {
        let mesh = sphere(2.0, FULL_SPHERE, 2.0 * PI / 24.0);
        assert!(is_closed(&mesh));
        for v in &mesh.vertices {
            assert_relative_eq!(v.position.coords.norm(), 2.0, epsilon = 1e-9);
        }
        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(min.z, -2.0, epsilon = 1e-9);
        assert_relative_eq!(max.z, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sphere_normals_point_outward() {
        let mesh = sphere(1.0, FULL_SPHERE, 2.0 * PI / 16.0);
        for tri in mesh.triangles() {
            if let Some(n) = tri.normal() {
                assert!(n.dot(&tri.centroid().coords) > 0.0);
            }
        }
    }

    #[test]
    fn test_degenerate_inputs_are_empty() {
        assert!(sphere(0.0, FULL_SPHERE, 0.3).is_empty());
        assert!(sphere(1.0, (1.0, 1.0), 0.3).is_empty());
        assert!(cylinder(1e-9, 5.0, 12).is_empty());
        assert!(cylinder(1.0, 0.0, 12).is_empty());
        assert!(frustum(1.0, 2.0, f64::NAN, 12).is_empty());
        assert!(pinhead(0.0, 0.5, 1.0, 0.5, 12).is_empty());
    }

    #[test]
    fn test_cylinder_extent() {
        let mesh = cylinder(0.5, 3.0, 16);
        assert_eq!(mesh.vertex_count(), 32);
        assert_eq!(mesh.face_count(), 32);
        assert_relative_eq!(mesh.height(), 3.0);
    }

    #[test]
    fn test_frustum_closed_and_indexable() {
        let mesh = frustum(0.5, 2.0, 1.0, 24);
        assert!(is_closed(&mesh));
        let (min, max) = mesh.bounds().unwrap();
        assert_relative_eq!(max.x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(min.z, 0.0);
        assert_relative_eq!(max.z, 1.0);
        assert!(IndexedMesh::new(mesh).is_ok());
    }

    #[test]
    fn test_frustum_between_points() {
        let start = Point3::new(1.0, 1.0, 1.0);
        let end = Point3::new(1.0, 4.0, 5.0);
        let mesh = frustum_between(&start, &end, 0.3, 0.3, 12);
        for v in &mesh.vertices {
            // Every vertex is within the radius of the axis segment
            let t = ((v.position - start).dot(&(end - start)) / 25.0).clamp(0.0, 1.0);
            let closest = start + (end - start) * t;
            assert!((v.position - closest).norm() <= 0.3 + 1e-9);
        }
    }

    #[test]
    fn test_rotation_antiparallel() {
        let q = rotation_from_z(&-Vector3::z());
        let v = q * Vector3::z();
        assert_relative_eq!(v.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pinhead_extent() {
        let (r_pin, r_back, width, pen) = (0.2, 0.5, 1.0, 0.5);
        let mesh = pinhead(r_pin, r_back, width, pen, 24);
        assert!(is_closed(&mesh));

        let (min, max) = mesh.bounds().unwrap();
        // Pin tip sits at the penetration depth above the origin
        assert_relative_eq!(max.z, pen, epsilon = 1e-9);
        // Back of the back sphere is a full head length below the tip
        let fullwidth = 2.0 * r_pin + width + 2.0 * r_back - pen;
        assert_relative_eq!(min.z, -fullwidth, epsilon = 1e-9);
    }
}
