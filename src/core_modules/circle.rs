// THEORY:
// Circle fitting turns one contour (the outer border of a connected mask
// region) into the geometric summary the census counts.
//
// 1.  **Minimum enclosing circle**: the smallest circle containing every border
//     point. Its radius is what the acceptance band tests, so a speckle yields
//     a tiny circle and two touching balls yield one oversized circle.
// 2.  **Area moments**: the contour is treated as a closed polygon and its
//     zeroth and first moments are integrated with Green's theorem. The
//     centroid `(m10 / m00, m01 / m00)` marks the blob's center of mass. A
//     polygon with no area has no centroid, and the caller drops it.
//
// Fitting runs on the convex hull of the contour (the enclosing circle of a
// point set equals the enclosing circle of its hull), visited in a strided
// order so the incremental construction stays close to linear on border
// chains. Contours arrive as `imageproc` integer points, and the hull and
// signed area come from `imageproc::geometry`.

use imageproc::geometry::{convex_hull, oriented_contour_area};
use imageproc::point::Point;

/// A blob accepted as a ball candidate, in region-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedCircle {
    /// Center of the minimum enclosing circle.
    pub center: (f64, f64),
    /// Radius of the minimum enclosing circle.
    pub radius: f64,
    /// Center of mass of the contour polygon.
    pub centroid: (f64, f64),
}

/// A plain circle used while fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: (f64, f64),
    pub radius: f64,
}

const CONTAINMENT_TOLERANCE: f64 = 1e-7;

impl Circle {
    fn contains(&self, point: (f64, f64)) -> bool {
        distance(self.center, point) <= self.radius * (1.0 + CONTAINMENT_TOLERANCE) + CONTAINMENT_TOLERANCE
    }

    fn through_two(a: (f64, f64), b: (f64, f64)) -> Self {
        let center = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
        Self {
            center,
            radius: distance(a, b) / 2.0,
        }
    }

    fn through_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let (bx, by) = (b.0 - a.0, b.1 - a.1);
        let (cx, cy) = (c.0 - a.0, c.1 - a.1);
        let determinant = 2.0 * (bx * cy - by * cx);

        if determinant.abs() < 1e-12 {
            // Collinear: the widest pair spans the other point.
            return [Self::through_two(a, b), Self::through_two(a, c), Self::through_two(b, c)]
                .into_iter()
                .fold(Self::through_two(a, b), |widest, candidate| {
                    if candidate.radius > widest.radius {
                        candidate
                    } else {
                        widest
                    }
                });
        }

        let b_squared = bx * bx + by * by;
        let c_squared = cx * cx + cy * cy;
        let ux = (cy * b_squared - by * c_squared) / determinant;
        let uy = (bx * c_squared - cx * b_squared) / determinant;
        let center = (a.0 + ux, a.1 + uy);
        Self {
            center,
            radius: distance(center, a),
        }
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

fn as_f64(point: Point<i32>) -> (f64, f64) {
    (f64::from(point.x), f64::from(point.y))
}

/// Visits `0..len` with a step coprime to `len`, a cheap deterministic shuffle.
fn strided_order(len: usize) -> impl Iterator<Item = usize> {
    const STEPS: [usize; 4] = [7919, 104_729, 15_485_863, 1];
    let step = STEPS
        .into_iter()
        .find(|step| len == 0 || gcd(*step % len.max(1), len) == 1)
        .unwrap_or(1);
    (0..len).map(move |i| (i * step) % len)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Smallest circle containing every point. `None` for an empty set.
pub fn min_enclosing_circle(points: &[Point<i32>]) -> Option<Circle> {
    let hull = convex_hull(points);
    let ordered: Vec<(f64, f64)> = strided_order(hull.len()).map(|i| as_f64(hull[i])).collect();
    let first = *ordered.first()?;

    let mut circle = Circle {
        center: first,
        radius: 0.0,
    };
    for i in 1..ordered.len() {
        if circle.contains(ordered[i]) {
            continue;
        }
        circle = Circle {
            center: ordered[i],
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(ordered[j]) {
                continue;
            }
            circle = Circle::through_two(ordered[i], ordered[j]);
            for k in 0..j {
                if !circle.contains(ordered[k]) {
                    circle = Circle::through_three(ordered[i], ordered[j], ordered[k]);
                }
            }
        }
    }
    Some(circle)
}

/// Zeroth and first area moments of a closed polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl AreaMoments {
    /// Integrates the polygon through its vertices in order. The result is
    /// orientation-independent: `m00` is always non-negative.
    pub fn of_polygon(points: &[Point<i32>]) -> Self {
        let m00 = oriented_contour_area(points);
        if m00 == 0.0 {
            return Self {
                m00,
                m10: 0.0,
                m01: 0.0,
            };
        }

        let mut m10 = 0.0;
        let mut m01 = 0.0;
        if let Some(&last) = points.last() {
            let mut previous = as_f64(last);
            for current in points.iter().copied().map(as_f64) {
                let cross = previous.0 * current.1 - current.0 * previous.1;
                m10 += cross * (previous.0 + current.0);
                m01 += cross * (previous.1 + current.1);
                previous = current;
            }
        }

        let sign = m00.signum();
        Self {
            m00: m00.abs(),
            m10: sign * m10 / 6.0,
            m01: sign * m01 / 6.0,
        }
    }

    /// Center of mass, or `None` for a degenerate (zero-area) polygon.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00.abs() < f64::EPSILON {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }
}

/// Fits one contour. Degenerate contours yield `None`.
pub fn fit_contour(points: &[Point<i32>]) -> Option<DetectedCircle> {
    let centroid = AreaMoments::of_polygon(points).centroid()?;
    let circle = min_enclosing_circle(points)?;
    Some(DetectedCircle {
        center: circle.center,
        radius: circle.radius,
        centroid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn points(coords: &[(i32, i32)]) -> Vec<Point<i32>> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn square_corners_share_one_circle() {
        let square = points(&[(0, 0), (4, 0), (4, 4), (0, 4)]);
        let circle = min_enclosing_circle(&square).unwrap();
        assert!(approx(circle.center.0, 2.0));
        assert!(approx(circle.center.1, 2.0));
        assert!(approx(circle.radius, 8.0_f64.sqrt()));
    }

    #[test]
    fn interior_points_do_not_grow_the_circle() {
        let mut cloud = points(&[(-5, 0), (5, 0)]);
        cloud.extend((-3..=3).flat_map(|x| [Point::new(x, 1), Point::new(x, -1)]));
        let circle = min_enclosing_circle(&cloud).unwrap();
        assert!(approx(circle.radius, 5.0));
        assert!(approx(circle.center.0, 0.0));
        assert!(approx(circle.center.1, 0.0));
    }

    #[test]
    fn circle_covers_every_point_of_a_ring() {
        let ring: Vec<Point<i32>> = (0..360)
            .map(|deg| {
                let theta = f64::from(deg).to_radians();
                Point::new(
                    (100.0 + 60.0 * theta.cos()).round() as i32,
                    (200.0 + 60.0 * theta.sin()).round() as i32,
                )
            })
            .collect();
        let circle = min_enclosing_circle(&ring).unwrap();
        assert!((circle.radius - 60.0).abs() < 1.0);
        assert!((circle.center.0 - 100.0).abs() < 1.0);
        assert!((circle.center.1 - 200.0).abs() < 1.0);
        assert!(ring.iter().all(|p| circle.contains(as_f64(*p))));
    }

    #[test]
    fn collinear_border_spans_its_endpoints() {
        let line = points(&[(0, 0), (1, 0), (2, 0), (3, 0), (4, 0), (2, 0)]);
        let circle = min_enclosing_circle(&line).unwrap();
        assert!(approx(circle.center.0, 2.0));
        assert!(approx(circle.radius, 2.0));
    }

    #[test]
    fn empty_set_has_no_circle() {
        assert!(min_enclosing_circle(&[]).is_none());
    }

    #[test]
    fn polygon_moments_give_the_centroid() {
        let rectangle = points(&[(2, 1), (6, 1), (6, 3), (2, 3)]);
        let moments = AreaMoments::of_polygon(&rectangle);
        assert!(approx(moments.m00, 8.0));
        let (cx, cy) = moments.centroid().unwrap();
        assert!(approx(cx, 4.0));
        assert!(approx(cy, 2.0));

        let reversed: Vec<_> = rectangle.iter().rev().copied().collect();
        assert_eq!(AreaMoments::of_polygon(&reversed).centroid(), moments.centroid());
    }

    #[test]
    fn zero_area_contours_are_skipped() {
        assert!(fit_contour(&points(&[(3, 3)])).is_none());
        assert!(fit_contour(&points(&[(0, 0), (1, 0), (2, 0), (1, 0)])).is_none());
    }

    #[test]
    fn fitted_contour_reports_circle_and_centroid() {
        let diamond = points(&[(10, 5), (15, 10), (10, 15), (5, 10)]);
        let fitted = fit_contour(&diamond).unwrap();
        assert!(approx(fitted.radius, 5.0));
        assert!(approx(fitted.center.0, 10.0));
        assert!(approx(fitted.center.1, 10.0));
        assert!(approx(fitted.centroid.0, 10.0));
        assert!(approx(fitted.centroid.1, 10.0));
    }

    #[test]
    fn strided_order_is_a_permutation() {
        for len in [0usize, 1, 2, 7919, 7920, 100] {
            let mut seen: Vec<usize> = strided_order(len).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..len).collect::<Vec<_>>());
        }
    }
}
