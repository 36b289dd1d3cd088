//! Polygon geometry primitives.
//!
//! Plane fitting, ear-clip triangulation, polygon clipping, and the small
//! closest-point routines the editing operators lean on. Everything here is
//! pure: no topology, no streams, just points.

use nalgebra::{Point2, Point3, Vector2, Vector3};

/// Tolerance used by the ear-clip sign tests.
const EAR_EPS: f64 = 1e-7;

/// A plane in normal-distance form: `dot(normal, p) + distance = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Signed distance term.
    pub distance: f64,
}

impl Plane {
    /// Fit a plane to a polygon with Newell's method.
    ///
    /// The normal is the sum of successive edge cross products, the distance
    /// comes from the vertex centroid. Returns `None` when the polygon has no
    /// area to speak of.
    pub fn fit_newell(points: &[Point3<f64>]) -> Option<Plane> {
        if points.len() < 3 {
            return None;
        }

        let mut normal = Vector3::<f64>::zeros();
        let mut centroid = Vector3::<f64>::zeros();
        for (i, p) in points.iter().enumerate() {
            let q = &points[(i + 1) % points.len()];
            normal.x += (p.y - q.y) * (p.z + q.z);
            normal.y += (p.z - q.z) * (p.x + q.x);
            normal.z += (p.x - q.x) * (p.y + q.y);
            centroid += p.coords;
        }

        let len = normal.norm();
        if len < 1e-12 {
            return None;
        }
        // The epsilon keeps the division sane for nearly-degenerate input.
        let normal = normal / (len + f64::EPSILON);
        centroid /= points.len() as f64;

        Some(Plane {
            normal,
            distance: -centroid.dot(&normal),
        })
    }

    /// Signed distance of a point from the plane.
    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.distance
    }

    /// Orthogonal projection of a point onto the plane.
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }
}

/// Axis index (0 = X, 1 = Y, 2 = Z) with the largest normal component.
pub fn dominant_axis(normal: &Vector3<f64>) -> usize {
    let (ax, ay, az) = (normal.x.abs(), normal.y.abs(), normal.z.abs());
    if ax >= ay && ax >= az {
        0
    } else if ay >= az {
        1
    } else {
        2
    }
}

/// Drop the given axis to get a 2D projection of a point.
pub fn drop_axis(p: &Point3<f64>, axis: usize) -> Point2<f64> {
    match axis {
        0 => Point2::new(p.y, p.z),
        1 => Point2::new(p.z, p.x),
        _ => Point2::new(p.x, p.y),
    }
}

/// 2D cross product (z of the 3D cross of the embedded vectors).
#[inline]
pub fn cross_2d(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Signed area of a 2D polygon (positive = counter-clockwise).
pub fn polygon_area_2d(points: &[Point2<f64>]) -> f64 {
    let mut area = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        area += p.x * q.y - q.x * p.y;
    }
    area * 0.5
}

/// Area of a 3D triangle.
pub fn triangle_area(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> f64 {
    (p1 - p0).cross(&(p2 - p0)).norm() * 0.5
}

/// Point-in-triangle test with sign tolerance. `winding` is +1 for CCW
/// triangles, -1 for CW.
pub fn point_in_triangle_2d(
    p: &Point2<f64>,
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
    winding: f64,
) -> bool {
    let s0 = cross_2d(&(b - a), &(p - a)) * winding;
    let s1 = cross_2d(&(c - b), &(p - b)) * winding;
    let s2 = cross_2d(&(a - c), &(p - c)) * winding;
    s0 > EAR_EPS && s1 > EAR_EPS && s2 > EAR_EPS
}

/// Crossing-number point-in-polygon test for a simple 2D polygon.
pub fn point_in_polygon_2d(p: &Point2<f64>, poly: &[Point2<f64>]) -> bool {
    let mut inside = false;
    for (i, a) in poly.iter().enumerate() {
        let b = &poly[(i + 1) % poly.len()];
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Triangulate an approximately-planar polygon by ear clipping.
///
/// Input points are projected onto the axis plane best aligned with the
/// polygon normal; ears are located with reflex detection and
/// point-in-triangle tests. Returns index triples into the input slice:
/// `n - 2` triangles for a simple polygon, or an empty vector when the input
/// is degenerate.
pub fn triangulate(points: &[Point3<f64>]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }
    if n == 3 {
        // Even a collinear triangle triangulates to itself; downstream
        // consumers drop zero-area output.
        return vec![[0, 1, 2]];
    }

    let plane = match Plane::fit_newell(points) {
        Some(p) => p,
        None => return Vec::new(),
    };
    let axis = dominant_axis(&plane.normal);
    let flat: Vec<Point2<f64>> = points.iter().map(|p| drop_axis(p, axis)).collect();

    let area = polygon_area_2d(&flat);
    if area.abs() < EAR_EPS {
        return Vec::new();
    }
    let winding = area.signum();

    let mut remaining: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while remaining.len() > 3 {
        let m = remaining.len();
        let mut clipped = false;

        for i in 0..m {
            let ia = remaining[(i + m - 1) % m];
            let ib = remaining[i];
            let ic = remaining[(i + 1) % m];
            let (a, b, c) = (&flat[ia], &flat[ib], &flat[ic]);

            // Reflex corners cannot be ears.
            let turn = cross_2d(&(b - a), &(c - b)) * winding;
            if turn < EAR_EPS {
                continue;
            }

            // No other remaining vertex may sit inside the candidate ear.
            let blocked = remaining.iter().any(|&j| {
                j != ia && j != ib && j != ic && point_in_triangle_2d(&flat[j], a, b, c, winding)
            });
            if blocked {
                continue;
            }

            triangles.push([ia, ib, ic]);
            remaining.remove(i);
            clipped = true;
            break;
        }

        if !clipped {
            // Numerically stuck (collinear runs, self-touching input): clip
            // the flattest corner so the loop still terminates.
            let mut best = 0;
            let mut best_turn = f64::NEG_INFINITY;
            for i in 0..m {
                let ia = remaining[(i + m - 1) % m];
                let ib = remaining[i];
                let ic = remaining[(i + 1) % m];
                let turn =
                    cross_2d(&(&flat[ib] - &flat[ia]), &(&flat[ic] - &flat[ib])) * winding;
                if turn > best_turn {
                    best_turn = turn;
                    best = i;
                }
            }
            if best_turn <= -EAR_EPS {
                // Everything is reflex: the projection was not simple.
                return Vec::new();
            }
            let ia = remaining[(best + m - 1) % m];
            let ib = remaining[best];
            let ic = remaining[(best + 1) % m];
            triangles.push([ia, ib, ic]);
            remaining.remove(best);
        }
    }

    triangles.push([remaining[0], remaining[1], remaining[2]]);
    triangles
}

/// Clip a simple 2D polygon against the half-plane left of the directed line
/// `a -> b`. Returns the surviving vertex loop.
pub fn clip_polygon_by_line(
    poly: &[Point2<f64>],
    a: &Point2<f64>,
    b: &Point2<f64>,
) -> Vec<Point2<f64>> {
    let dir = b - a;
    let side = |p: &Point2<f64>| cross_2d(&dir, &(p - a));

    let mut out = Vec::with_capacity(poly.len() + 2);
    for (i, p) in poly.iter().enumerate() {
        let q = &poly[(i + 1) % poly.len()];
        let (sp, sq) = (side(p), side(q));

        if sp >= 0.0 {
            out.push(*p);
        }
        if (sp > 0.0 && sq < 0.0) || (sp < 0.0 && sq > 0.0) {
            let t = sp / (sp - sq);
            out.push(p + (q - p) * t);
        }
    }
    out
}

/// Closest point on the segment `a..b` to `p`.
pub fn closest_point_on_segment(
    a: &Point3<f64>,
    b: &Point3<f64>,
    p: &Point3<f64>,
) -> Point3<f64> {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < 1e-30 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Parameters `(s1, s2)` of the closest points between two lines
/// `p1 + s1*d1` and `p2 + s2*d2`. `None` when the lines are near-parallel.
pub fn closest_params_between_lines(
    p1: &Point3<f64>,
    d1: &Vector3<f64>,
    p2: &Point3<f64>,
    d2: &Vector3<f64>,
) -> Option<(f64, f64)> {
    let r = p1 - p2;
    let a = d1.dot(d1);
    let b = d1.dot(d2);
    let c = d2.dot(d2);
    let d = d1.dot(&r);
    let e = d2.dot(&r);

    let denom = a * c - b * b;
    if denom.abs() < 1e-6 {
        return None;
    }
    Some(((b * e - c * d) / denom, (a * e - b * d) / denom))
}

/// Intersection of the ray `origin + t*dir` (t >= 0) with the segment
/// `a..b` in 2D. Returns `(t_ray, t_seg)` with `t_seg` in `[0, 1]`.
pub fn ray_segment_intersection_2d(
    origin: &Point2<f64>,
    dir: &Vector2<f64>,
    a: &Point2<f64>,
    b: &Point2<f64>,
) -> Option<(f64, f64)> {
    let seg = b - a;
    let denom = cross_2d(dir, &seg);
    if denom.abs() < 1e-12 {
        return None;
    }
    let diff = a - origin;
    let t_ray = cross_2d(&diff, &seg) / denom;
    let t_seg = cross_2d(&diff, dir) / denom;
    if t_ray >= 0.0 && (-1e-9..=1.0 + 1e-9).contains(&t_seg) {
        Some((t_ray, t_seg.clamp(0.0, 1.0)))
    } else {
        None
    }
}
