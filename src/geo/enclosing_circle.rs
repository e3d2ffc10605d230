//! Smallest enclosing circle of a set of points via Welzl's randomized incremental algorithm.
//!
//! The recursion of the textbook algorithm is unrolled into three nested loops, one for each
//! number of points known to lie on the boundary. Expected running time is linear in the number
//! of points after the input is randomly shuffled.
use crate::error::ClusterError;
use rand::Rng;
use rustc_hash::FxHashMap as HashMap;

/// Tolerance, relative to the squared radius, for deciding if a point is inside a circle.
const CONTAINS_EPSILON: f64 = 1.0e-12;
/// Three points are treated as collinear when the determinant is this small relative to the
/// squared size of the triangle.
const COLLINEAR_EPSILON: f64 = 1.0e-10;
/// The memo is cleared when it holds this many circles.
const MEMO_CAPACITY: usize = 4_096;

/// A point in a 2D Cartesian frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_squared(other).sqrt()
    }

    fn midpoint(&self, other: &Point) -> Point {
        Point {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }

    fn key(&self) -> (u64, u64) {
        (self.x.to_bits(), self.y.to_bits())
    }
}

/// A circle in the same frame as the points it was built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    /// Check if a point is inside or on the circle.
    pub fn contains(&self, point: Point) -> bool {
        let d2 = self.center.distance_squared(&point);
        let r2 = self.radius * self.radius;

        // Purely relative so the test means the same thing in any frame and at any scale.
        d2 <= r2 * (1.0 + CONTAINS_EPSILON)
    }

    fn from_one(p: Point) -> Self {
        Circle {
            center: p,
            radius: 0.0,
        }
    }

    fn from_two(a: Point, b: Point) -> Self {
        let center = a.midpoint(&b);
        let radius = center.distance(&a).max(center.distance(&b));

        Circle { center, radius }
    }

    fn from_three(a: Point, b: Point, c: Point) -> Self {
        match Self::circumcircle(a, b, c) {
            Some(circle) => circle,
            None => Self::collinear_fallback(a, b, c),
        }
    }

    /// The circle through all three points, `None` if they are (nearly) collinear.
    fn circumcircle(a: Point, b: Point, c: Point) -> Option<Self> {
        // Shift to the middle of the points for numerical stability.
        let ox = (a.x.min(b.x).min(c.x) + a.x.max(b.x).max(c.x)) / 2.0;
        let oy = (a.y.min(b.y).min(c.y) + a.y.max(b.y).max(c.y)) / 2.0;

        let (ax, ay) = (a.x - ox, a.y - oy);
        let (bx, by) = (b.x - ox, b.y - oy);
        let (cx, cy) = (c.x - ox, c.y - oy);

        let a2 = ax * ax + ay * ay;
        let b2 = bx * bx + by * by;
        let c2 = cx * cx + cy * cy;

        let d = (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by)) * 2.0;
        if d.abs() <= COLLINEAR_EPSILON * a2.max(b2).max(c2) {
            return None;
        }

        let x = (a2 * (by - cy) + b2 * (cy - ay) + c2 * (ay - by)) / d;
        let y = (a2 * (cx - bx) + b2 * (ax - cx) + c2 * (bx - ax)) / d;

        let center = Point::new(ox + x, oy + y);
        let radius = center
            .distance(&a)
            .max(center.distance(&b))
            .max(center.distance(&c));

        Some(Circle { center, radius })
    }

    /// The smallest two point circle that also holds the remaining point.
    fn collinear_fallback(a: Point, b: Point, c: Point) -> Self {
        let candidates = [
            (Self::from_two(a, b), c),
            (Self::from_two(a, c), b),
            (Self::from_two(b, c), a),
        ];

        let best = candidates
            .iter()
            .filter(|(circle, third)| circle.contains(*third))
            .map(|(circle, _)| *circle)
            .min_by(|l, r| l.radius.total_cmp(&r.radius));

        match best {
            Some(circle) => circle,
            None => {
                // A tiny, nearly degenerate triangle where no diameter circle reaches the third
                // point. Grow the widest one until it does.
                let (mut widest, third) = candidates
                    .iter()
                    .copied()
                    .max_by(|l, r| l.0.radius.total_cmp(&r.0.radius))
                    .unwrap_or((Self::from_two(a, b), c));

                widest.radius = widest.radius.max(widest.center.distance(&third));
                widest
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MemoKey {
    Two([(u64, u64); 2]),
    Three([(u64, u64); 3]),
}

/// Circles already built from two or three boundary points during a single call.
struct CircleMemo {
    cache: HashMap<MemoKey, Circle>,
}

impl CircleMemo {
    fn new() -> Self {
        CircleMemo {
            cache: HashMap::default(),
        }
    }

    fn two(&mut self, a: Point, b: Point) -> Circle {
        let mut key = [a.key(), b.key()];
        key.sort_unstable();

        self.get_or_insert(MemoKey::Two(key), || Circle::from_two(a, b))
    }

    fn three(&mut self, a: Point, b: Point, c: Point) -> Circle {
        let mut key = [a.key(), b.key(), c.key()];
        key.sort_unstable();

        self.get_or_insert(MemoKey::Three(key), || Circle::from_three(a, b, c))
    }

    fn get_or_insert<F: FnOnce() -> Circle>(&mut self, key: MemoKey, build: F) -> Circle {
        if let Some(circle) = self.cache.get(&key) {
            return *circle;
        }

        if self.cache.len() >= MEMO_CAPACITY {
            self.cache.clear();
        }

        let circle = build();
        self.cache.insert(key, circle);
        circle
    }
}

/// Find the smallest circle containing every point, shuffling with the thread local RNG.
///
/// A single point (or many copies of one point) gives a circle with a radius of zero.
pub fn enclosing_circle(points: &[Point]) -> Result<Circle, ClusterError> {
    enclosing_circle_with_rng(points, &mut rand::thread_rng())
}

/// Find the smallest circle containing every point using the provided source of randomness.
///
/// The shuffle order only affects running time, never the answer, so a seeded generator is
/// useful for reproducible benchmarks and tests.
pub fn enclosing_circle_with_rng<R: Rng + ?Sized>(
    points: &[Point],
    rng: &mut R,
) -> Result<Circle, ClusterError> {
    if points.is_empty() {
        return Err(ClusterError::EmptyPointSet);
    }

    if let Some((index, p)) = points.iter().enumerate().find(|(_, p)| !p.is_finite()) {
        return Err(ClusterError::NonFinitePoint {
            index,
            x: p.x,
            y: p.y,
        });
    }

    Ok(welzl(points.to_vec(), rng))
}

/// Welzl's algorithm on points already checked to be finite.
///
/// An empty list gives the degenerate zero radius circle at the origin.
pub(crate) fn welzl<R: Rng + ?Sized>(mut points: Vec<Point>, rng: &mut R) -> Circle {
    debug_assert!(points.iter().all(Point::is_finite));

    if points.is_empty() {
        return Circle::from_one(Point::new(0.0, 0.0));
    }

    // Fisher-Yates shuffle.
    for i in (1..points.len()).rev() {
        let j = rng.gen_range(0..=i);
        points.swap(i, j);
    }

    let mut memo = CircleMemo::new();

    let mut circle = Circle::from_one(points[0]);
    for i in 1..points.len() {
        let p = points[i];
        if !circle.contains(p) {
            circle = with_one_boundary_point(&points[..i], p, &mut memo);
        }
    }

    circle
}

// `p` is known to be on the boundary of the enclosing circle of `points` plus `p`.
fn with_one_boundary_point(points: &[Point], p: Point, memo: &mut CircleMemo) -> Circle {
    let mut circle = Circle::from_one(p);

    for (j, &q) in points.iter().enumerate() {
        if !circle.contains(q) {
            circle = with_two_boundary_points(&points[..j], p, q, memo);
        }
    }

    circle
}

// Both `p` and `q` are on the boundary.
fn with_two_boundary_points(
    points: &[Point],
    p: Point,
    q: Point,
    memo: &mut CircleMemo,
) -> Circle {
    let mut circle = memo.two(p, q);

    for &r in points {
        if !circle.contains(r) {
            circle = memo.three(p, q, r);
        }
    }

    circle
}
