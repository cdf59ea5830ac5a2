use geoprompt_core::{AffineTransform, BoundingBox, Crs};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Simple polygon with optional holes, in world coordinates of `crs`.
///
/// Rings are closed (last vertex equals the first). The exterior ring is
/// counter-clockwise and holes are clockwise, measured in the CRS's own
/// y-up frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point2<f64>>,
    pub holes: Vec<Vec<Point2<f64>>>,
    pub crs: Crs,
}

/// Shoelace area, positive for counter-clockwise rings in a y-up frame.
pub fn signed_ring_area(ring: &[Point2<f64>]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for (p, q) in ring.iter().zip(ring.iter().cycle().skip(1)) {
        acc += p.x * q.y - q.x * p.y;
    }
    0.5 * acc
}

/// Even-odd crossing test against one ring.
fn ring_contains(ring: &[Point2<f64>], x: f64, y: f64) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (ring[i], ring[j]);
        if (pi.y > y) != (pj.y > y) && x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn closed(mut ring: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

fn oriented(mut ring: Vec<Point2<f64>>, ccw: bool) -> Vec<Point2<f64>> {
    if (signed_ring_area(&ring) > 0.0) != ccw {
        ring.reverse();
    }
    ring
}

impl Polygon {
    /// Build a polygon, closing rings and normalizing their orientation.
    pub fn new(exterior: Vec<Point2<f64>>, holes: Vec<Vec<Point2<f64>>>, crs: Crs) -> Self {
        Self {
            exterior: oriented(closed(exterior), true),
            holes: holes
                .into_iter()
                .map(|h| oriented(closed(h), false))
                .collect(),
            crs,
        }
    }

    /// Axis-aligned rectangle as a polygon.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self::new(
            vec![
                Point2::new(bbox.x_min, bbox.y_min),
                Point2::new(bbox.x_max, bbox.y_min),
                Point2::new(bbox.x_max, bbox.y_max),
                Point2::new(bbox.x_min, bbox.y_max),
            ],
            Vec::new(),
            bbox.crs.clone(),
        )
    }

    #[inline]
    pub fn hole_count(&self) -> usize {
        self.holes.len()
    }

    /// Exterior area minus hole area.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| signed_ring_area(h).abs()).sum();
        signed_ring_area(&self.exterior).abs() - holes
    }

    /// Area-weighted centroid of the polygon with holes removed.
    pub fn centroid(&self) -> Option<Point2<f64>> {
        let mut a_sum = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        let rings = std::iter::once(&self.exterior).chain(self.holes.iter());
        for ring in rings {
            for (p, q) in ring.iter().zip(ring.iter().skip(1)) {
                let cross = p.x * q.y - q.x * p.y;
                a_sum += cross;
                cx += (p.x + q.x) * cross;
                cy += (p.y + q.y) * cross;
            }
        }
        // holes are stored clockwise, so their contributions subtract
        if a_sum.abs() < f64::EPSILON {
            return None;
        }
        let a = 0.5 * a_sum;
        Some(Point2::new(cx / (6.0 * a), cy / (6.0 * a)))
    }

    pub fn bounds(&self) -> BoundingBox {
        let mut b = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
            self.crs.clone(),
        );
        for p in &self.exterior {
            b.x_min = b.x_min.min(p.x);
            b.y_min = b.y_min.min(p.y);
            b.x_max = b.x_max.max(p.x);
            b.y_max = b.y_max.max(p.y);
        }
        b
    }

    /// Point-in-polygon test; points inside a hole are outside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        ring_contains(&self.exterior, x, y) && !self.holes.iter().any(|h| ring_contains(h, x, y))
    }

    /// Map every vertex through `t` and relabel with `crs`.
    pub fn transformed(&self, t: &AffineTransform, crs: Crs) -> Polygon {
        let map = |ring: &Vec<Point2<f64>>| -> Vec<Point2<f64>> {
            ring.iter()
                .map(|p| {
                    let (x, y) = t.apply(p.x, p.y);
                    Point2::new(x, y)
                })
                .collect()
        };
        Polygon::new(
            map(&self.exterior),
            self.holes.iter().map(map).collect(),
            crs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square(x0: f64, y0: f64, s: f64) -> Vec<Point2<f64>> {
        vec![
            Point2::new(x0, y0),
            Point2::new(x0, y0 + s),
            Point2::new(x0 + s, y0 + s),
            Point2::new(x0 + s, y0),
        ]
    }

    #[test]
    fn rings_are_closed_and_oriented() {
        let p = Polygon::new(square(0.0, 0.0, 10.0), vec![square(3.0, 3.0, 4.0)], Crs::epsg(3857));
        assert_eq!(p.exterior.first(), p.exterior.last());
        assert_eq!(p.exterior.len(), 5);
        assert!(signed_ring_area(&p.exterior) > 0.0);
        assert!(signed_ring_area(&p.holes[0]) < 0.0);
        assert_abs_diff_eq!(p.area(), 84.0);
    }

    #[test]
    fn centroid_accounts_for_holes() {
        let p = Polygon::new(square(0.0, 0.0, 10.0), Vec::new(), Crs::epsg(3857));
        let c = p.centroid().unwrap();
        assert_abs_diff_eq!(c.x, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.y, 5.0, epsilon = 1e-12);

        // hole in the right half pulls the centroid left
        let q = Polygon::new(square(0.0, 0.0, 10.0), vec![square(6.0, 4.0, 2.0)], Crs::epsg(3857));
        assert!(q.centroid().unwrap().x < 5.0);
    }

    #[test]
    fn contains_excludes_holes() {
        let p = Polygon::new(square(0.0, 0.0, 10.0), vec![square(3.0, 3.0, 4.0)], Crs::epsg(3857));
        assert!(p.contains(1.0, 1.0));
        assert!(!p.contains(5.0, 5.0));
        assert!(!p.contains(11.0, 5.0));
    }

    #[test]
    fn transform_keeps_orientation_convention() {
        let p = Polygon::new(square(0.0, 0.0, 2.0), Vec::new(), Crs::new("pixel"));
        let t = AffineTransform::from_bounds(100.0, 100.0, 110.0, 110.0, 10, 10);
        let w = p.transformed(&t, Crs::epsg(3857));
        assert!(signed_ring_area(&w.exterior) > 0.0);
        assert_abs_diff_eq!(w.area(), 4.0);
        let b = w.bounds();
        assert_eq!((b.x_min, b.y_max), (100.0, 110.0));
    }
}
