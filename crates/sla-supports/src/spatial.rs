//! Point queries and grouping used by the routing steps.
//!
//! - [`PointIndex`]: k-d tree of positions tagged with an id, with
//!   exclusion for "nearest, but not these" searches
//! - [`cluster`]: grouping of nearby points under a size cap
//! - [`cluster_centroid`]: the most central member of a group
//! - [`convex_hull_rings`]: Jarvis march hull used for ring interconnection

use std::cmp::Ordering;

use hashbrown::HashSet;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point2, Point3, Rotation3};

/// Orientation tolerance for hull construction.
const HULL_EPS: f64 = 1e-3;

/// Euler angles of the frame tree keys are stored in. A bucket of the k-d
/// tree cannot split more than its capacity of equal values on one axis,
/// and pillar feet or points on a flat face all share z in model space.
const KEY_FRAME: (f64, f64, f64) = (0.613, 0.377, 0.229);

/// A spatial index over `(position, id)` entries.
#[derive(Debug, Clone)]
pub struct PointIndex<T: Copy> {
    tree: KdTree<f64, 3>,
    frame: Rotation3<f64>,
    entries: Vec<(Point3<f64>, T)>,
}

impl<T: Copy> Default for PointIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> PointIndex<T> {
    pub fn new() -> Self {
        let (roll, pitch, yaw) = KEY_FRAME;
        Self {
            tree: KdTree::new(),
            frame: Rotation3::from_euler_angles(roll, pitch, yaw),
            entries: Vec::new(),
        }
    }

    /// Rotated coordinates of `p`. Distances are unchanged.
    fn key(&self, p: &Point3<f64>) -> [f64; 3] {
        let k = self.frame * p;
        [k.x, k.y, k.z]
    }

    pub fn insert(&mut self, pos: Point3<f64>, id: T) {
        let slot = self.entries.len() as u64;
        self.tree.add(&self.key(&pos), slot);
        self.entries.push((pos, id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[(Point3<f64>, T)] {
        &self.entries
    }

    /// Entries closer than `radius` to `query`, nearest first.
    pub fn within(&self, query: &Point3<f64>, radius: f64) -> Vec<(Point3<f64>, T)> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let r2 = radius * radius;
        let mut found: Vec<(f64, usize)> = self
            .tree
            .within::<SquaredEuclidean>(&self.key(query), r2 * (1.0 + 1e-9))
            .into_iter()
            .map(|n| {
                let slot = n.item as usize;
                ((self.entries[slot].0 - query).norm_squared(), slot)
            })
            .filter(|&(d2, _)| d2 <= r2)
            .collect();
        found.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        found
            .into_iter()
            .map(|(_, slot)| self.entries[slot])
            .collect()
    }

    /// Closest entry whose id is not in `excluded`.
    pub fn nearest_excluding(
        &self,
        query: &Point3<f64>,
        excluded: &HashSet<T>,
    ) -> Option<(Point3<f64>, T)>
    where
        T: Eq + std::hash::Hash,
    {
        let total = self.entries.len();
        if total == 0 {
            return None;
        }

        let q = self.key(query);
        let mut k = (excluded.len() + 1).min(total);
        loop {
            let candidates = self.tree.nearest_n::<SquaredEuclidean>(&q, k);
            let hit = candidates
                .iter()
                .map(|n| self.entries[n.item as usize])
                .find(|(_, id)| !excluded.contains(id));
            if hit.is_some() || k == total {
                return hit;
            }
            k = (k * 2).min(total);
        }
    }

    /// Closest entry overall.
    pub fn nearest(&self, query: &Point3<f64>) -> Option<(Point3<f64>, T)> {
        if self.entries.is_empty() {
            return None;
        }
        let nearest = self
            .tree
            .nearest_one::<SquaredEuclidean>(&self.key(query));
        Some(self.entries[nearest.item as usize])
    }
}

impl PointIndex<usize> {
    /// Index every point, tagging each with its slice position.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut index = Self::new();
        for (i, p) in points.iter().enumerate() {
            index.insert(*p, i);
        }
        index
    }
}

/// Lexicographic (x, y, z) order of two points.
pub fn lex_cmp(a: &Point3<f64>, b: &Point3<f64>) -> Ordering {
    a.x.total_cmp(&b.x)
        .then(a.y.total_cmp(&b.y))
        .then(a.z.total_cmp(&b.z))
}

/// Group points so that each group is connected under `linked`.
///
/// Every group starts from an untaken seed, which joins unconditionally.
/// Candidates for a point are looked up within `radius` and kept when
/// `linked(point, candidate)` holds. A group never grows past
/// `max_points` members. Seeds and neighbours are taken in lexicographic
/// position order, so groups do not depend on the order of `points`.
///
/// Returns groups of indices into `points`; every index appears in exactly
/// one group.
pub fn cluster<F>(points: &[Point3<f64>], radius: f64, max_points: usize, linked: F) -> Vec<Vec<usize>>
where
    F: Fn(&Point3<f64>, &Point3<f64>) -> bool,
{
    let max_points = max_points.max(1);
    let index = PointIndex::<usize>::from_points(points);
    let mut taken = vec![false; points.len()];

    let mut seeds: Vec<usize> = (0..points.len()).collect();
    seeds.sort_by(|&a, &b| lex_cmp(&points[a], &points[b]).then(a.cmp(&b)));

    let mut groups = Vec::new();
    for seed in seeds {
        if taken[seed] {
            continue;
        }
        let mut group = vec![seed];
        if max_points > 1 {
            grow(&index, points, &taken, &[seed], &mut group, radius, max_points, &linked);
        }
        for &i in &group {
            taken[i] = true;
        }
        groups.push(group);
    }
    groups
}

#[allow(clippy::too_many_arguments)]
fn grow<F>(
    index: &PointIndex<usize>,
    points: &[Point3<f64>],
    taken: &[bool],
    frontier: &[usize],
    group: &mut Vec<usize>,
    radius: f64,
    max_points: usize,
    linked: &F,
) where
    F: Fn(&Point3<f64>, &Point3<f64>) -> bool,
{
    for &p in frontier {
        if group.len() >= max_points {
            return;
        }
        let origin = points[p];
        let mut fresh: Vec<usize> = index
            .within(&origin, radius)
            .into_iter()
            .map(|(_, i)| i)
            .filter(|&i| !taken[i] && !group.contains(&i) && linked(&origin, &points[i]))
            .collect();
        fresh.sort_by(|&a, &b| lex_cmp(&points[a], &points[b]).then(a.cmp(&b)));
        fresh.truncate(max_points - group.len());

        group.extend_from_slice(&fresh);
        if !fresh.is_empty() && group.len() < max_points {
            grow(index, points, taken, &fresh, group, radius, max_points, linked);
        }
    }
}

/// Position (within `members`) of the member with the smallest summed
/// distance to all others. Groups of one or two have no centre; the first
/// member is returned. `None` for an empty group.
pub fn cluster_centroid<P, D>(members: &[usize], position: P, distance: D) -> Option<usize>
where
    P: Fn(usize) -> Point3<f64>,
    D: Fn(&Point3<f64>, &Point3<f64>) -> f64,
{
    match members.len() {
        0 => return None,
        1 | 2 => return Some(0),
        _ => {}
    }

    let pts: Vec<Point3<f64>> = members.iter().map(|&m| position(m)).collect();
    let mut sums = vec![0.0; pts.len()];
    for i in 0..pts.len() {
        for j in (i + 1)..pts.len() {
            let d = distance(&pts[i], &pts[j]);
            sums[i] += d;
            sums[j] += d;
        }
    }

    sums.iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Distance in the XY plane.
pub fn distance_2d(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (Point2::new(a.x, a.y) - Point2::new(b.x, b.y)).norm()
}

fn orientation(p: &Point2<f64>, q: &Point2<f64>, r: &Point2<f64>) -> Ordering {
    let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    if val.abs() < HULL_EPS {
        Ordering::Equal
    } else if val > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Convex hull of `members` in the XY plane, as a list of members.
///
/// The hull is walked counter-clockwise from the leftmost (then lowest)
/// point and closed by repeating its first member. Fewer than three
/// members are returned unchanged. Collinear input comes back sorted by
/// distance from the leftmost point, without closing.
pub fn convex_hull<P>(members: &[usize], position: P) -> Vec<usize>
where
    P: Fn(usize) -> Point3<f64>,
{
    let n = members.len();
    if n < 3 {
        return members.to_vec();
    }

    let pts: Vec<Point2<f64>> = members
        .iter()
        .map(|&m| {
            let p = position(m);
            Point2::new(p.x, p.y)
        })
        .collect();

    let collinear = pts
        .windows(3)
        .all(|w| orientation(&w[0], &w[1], &w[2]) == Ordering::Equal);

    let mut left = 0;
    for i in 1..n {
        if (pts[i].x - pts[left].x).abs() < HULL_EPS {
            if pts[i].y < pts[left].y {
                left = i;
            }
        } else if pts[i].x < pts[left].x {
            left = i;
        }
    }

    if collinear {
        let origin = pts[left];
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            (pts[a] - origin)
                .norm()
                .total_cmp(&(pts[b] - origin).norm())
        });
        return order.into_iter().map(|i| members[i]).collect();
    }

    let mut hull = Vec::new();
    let mut p = left;
    // Bounded so near-degenerate input cannot spin forever.
    for _ in 0..=n {
        hull.push(members[p]);
        let mut q = (p + 1) % n;
        for i in 0..n {
            if orientation(&pts[p], &pts[i], &pts[q]) == Ordering::Less {
                q = i;
            }
        }
        p = q;
        if p == left {
            break;
        }
    }

    hull.push(hull[0]);
    hull
}

/// Peel `members` into nested hull rings, outermost first.
///
/// Each ring is a closed hull of what the previous rings left over; the
/// last ring may be a short open chain.
pub fn convex_hull_rings<P>(members: &[usize], position: P) -> Vec<Vec<usize>>
where
    P: Fn(usize) -> Point3<f64>,
{
    let mut remaining: Vec<usize> = members.to_vec();
    remaining.sort_unstable();
    remaining.dedup();

    let mut rings = Vec::new();
    while !remaining.is_empty() {
        let ring = convex_hull(&remaining, &position);
        let on_ring: HashSet<usize> = ring.iter().copied().collect();
        let before = remaining.len();
        remaining.retain(|m| !on_ring.contains(m));
        rings.push(ring);
        if remaining.len() == before {
            break;
        }
    }
    rings
}
