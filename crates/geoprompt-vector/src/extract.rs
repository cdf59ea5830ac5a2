//! Mask to polygon extraction.
//!
//! 1. Label 4-connected components of equal non-zero value, scanning rows
//!    top to bottom (first-seen order is the output order).
//! 2. Collect the directed cell edges that separate each component from
//!    everything else, oriented so the component lies on the right of the
//!    edge in the y-down pixel frame.
//! 3. Link edges into closed rings. At a vertex with two candidate exits the
//!    tracer turns right first, which keeps diagonally touching cells apart
//!    (4-connectivity).
//! 4. The ring through the top edge of a component's first cell is its
//!    exterior; every other ring is a hole.
//! 5. Drop collinear vertices and map the rings through the affine.

use std::collections::{HashMap, VecDeque};

use geoprompt_core::{AffineTransform, Crs, Mask};
use log::trace;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::Polygon;

/// A polygon together with the mask value it was traced from.
#[derive(Clone, Debug, PartialEq)]
pub struct ValuedPolygon {
    pub value: u8,
    pub polygon: Polygon,
}

/// Directions in the y-down pixel frame, clockwise.
const DIRS: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

type Vertex = (i64, i64);

/// Per-component edge set: outgoing edge directions per start vertex.
struct EdgeSet {
    out: HashMap<Vertex, [bool; 4]>,
    order: Vec<(Vertex, usize)>,
}

impl EdgeSet {
    fn new() -> Self {
        Self {
            out: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn push(&mut self, v: Vertex, dir: usize) {
        self.out.entry(v).or_insert([false; 4])[dir] = true;
        self.order.push((v, dir));
    }

    fn has(&self, v: Vertex, dir: usize) -> bool {
        self.out.get(&v).is_some_and(|d| d[dir])
    }

    fn take(&mut self, v: Vertex, dir: usize) {
        if let Some(d) = self.out.get_mut(&v) {
            d[dir] = false;
        }
    }
}

/// Label 4-connected components; `0` means background.
fn label_components(mask: &Mask) -> (Vec<u32>, Vec<(usize, u8)>) {
    let (w, h) = (mask.width, mask.height);
    let mut labels = vec![0u32; w * h];
    // first cell index and value per component, in discovery order
    let mut seeds = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..w * h {
        let value = mask.data[start];
        if value == 0 || labels[start] != 0 {
            continue;
        }
        let id = seeds.len() as u32 + 1;
        seeds.push((start, value));
        labels[start] = id;
        queue.push_back(start);
        while let Some(i) = queue.pop_front() {
            let (x, y) = ((i % w) as i64, (i / w) as i64);
            for (dx, dy) in DIRS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if labels[j] == 0 && mask.data[j] == value {
                    labels[j] = id;
                    queue.push_back(j);
                }
            }
        }
    }
    (labels, seeds)
}

/// Boundary edges of every component in one row-major pass; entry `k`
/// belongs to label `k + 1`.
fn component_edges(labels: &[u32], w: usize, h: usize, count: usize) -> Vec<EdgeSet> {
    let label_at = |x: i64, y: i64| -> u32 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0
        } else {
            labels[y as usize * w + x as usize]
        }
    };
    let mut sets: Vec<EdgeSet> = (0..count).map(|_| EdgeSet::new()).collect();
    for (i, &id) in labels.iter().enumerate() {
        if id == 0 {
            continue;
        }
        let edges = &mut sets[id as usize - 1];
        let (x, y) = ((i % w) as i64, (i / w) as i64);
        if label_at(x, y - 1) != id {
            edges.push((x, y), 0);
        }
        if label_at(x + 1, y) != id {
            edges.push((x + 1, y), 1);
        }
        if label_at(x, y + 1) != id {
            edges.push((x + 1, y + 1), 2);
        }
        if label_at(x - 1, y) != id {
            edges.push((x, y + 1), 3);
        }
    }
    sets
}

/// Follow edges from `(start, dir)` until the ring closes. Consumes the edges.
fn trace_ring(edges: &mut EdgeSet, start: Vertex, start_dir: usize) -> Vec<Vertex> {
    let mut ring = vec![start];
    let mut dir = start_dir;
    let mut at = (start.0 + DIRS[dir].0, start.1 + DIRS[dir].1);
    loop {
        // right turn, straight, left turn
        let next = [(dir + 1) % 4, dir, (dir + 3) % 4]
            .into_iter()
            .find(|&d| edges.has(at, d));
        let Some(next) = next else {
            break;
        };
        if at == start && next == start_dir {
            break;
        }
        edges.take(at, next);
        ring.push(at);
        dir = next;
        at = (at.0 + DIRS[dir].0, at.1 + DIRS[dir].1);
    }
    edges.take(start, start_dir);
    simplify_ring(ring)
}

/// Remove vertices where the boundary does not turn.
fn simplify_ring(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring;
    }
    (0..n)
        .filter(|&i| {
            let p = ring[(i + n - 1) % n];
            let c = ring[i];
            let q = ring[(i + 1) % n];
            (c.0 - p.0) * (q.1 - c.1) - (c.1 - p.1) * (q.0 - c.0) != 0
        })
        .map(|i| ring[i])
        .collect()
}

fn to_world(ring: &[Vertex], transform: &AffineTransform) -> Vec<Point2<f64>> {
    ring.iter()
        .map(|&(c, r)| {
            let (x, y) = transform.apply(c as f64, r as f64);
            Point2::new(x, y)
        })
        .collect()
}

/// Trace every non-zero region of `mask` into polygons in `crs`.
///
/// `transform` maps mask pixel corners to world coordinates of `crs`. Output
/// order is the row-major order in which components are first seen, so the
/// result is deterministic for a given mask.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = mask.width, height = mask.height))
)]
pub fn extract_polygons(mask: &Mask, transform: &AffineTransform, crs: &Crs) -> Vec<ValuedPolygon> {
    let (w, h) = (mask.width, mask.height);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let (labels, seeds) = label_components(mask);
    trace!("mask {w}x{h}: {} components", seeds.len());

    let edge_sets = component_edges(&labels, w, h, seeds.len());

    seeds
        .iter()
        .zip(edge_sets)
        .map(|(&(first, value), mut edges)| {
            let origin = ((first % w) as i64, (first / w) as i64);
            let exterior = trace_ring(&mut edges, origin, 0);

            let mut holes = Vec::new();
            let order = std::mem::take(&mut edges.order);
            for (v, d) in order {
                if edges.has(v, d) {
                    holes.push(trace_ring(&mut edges, v, d));
                }
            }

            let polygon = Polygon::new(
                to_world(&exterior, transform),
                holes.iter().map(|r| to_world(r, transform)).collect(),
                crs.clone(),
            );
            ValuedPolygon { value, polygon }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pixel_crs() -> Crs {
        Crs::new("LOCAL:pixel")
    }

    #[test]
    fn filled_square_gives_one_polygon() {
        let mut m = Mask::new(20, 20);
        m.fill_rect(5, 5, 15, 15, 1);
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 1);
        let p = &polys[0].polygon;
        assert_eq!(polys[0].value, 1);
        assert_eq!(p.hole_count(), 0);
        assert_abs_diff_eq!(p.area(), 100.0);
        // four corners plus the closing vertex
        assert_eq!(p.exterior.len(), 5);
    }

    #[test]
    fn square_with_hole_gives_one_hole() {
        let mut m = Mask::new(20, 20);
        m.fill_rect(5, 5, 15, 15, 1);
        m.fill_rect(8, 8, 12, 12, 0);
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 1);
        let p = &polys[0].polygon;
        assert_eq!(p.hole_count(), 1);
        assert_abs_diff_eq!(p.area(), 84.0);
    }

    #[test]
    fn empty_mask_gives_nothing() {
        let m = Mask::new(8, 8);
        assert!(extract_polygons(&m, &AffineTransform::identity(), &pixel_crs()).is_empty());
        let none = Mask::new(0, 0);
        assert!(extract_polygons(&none, &AffineTransform::identity(), &pixel_crs()).is_empty());
    }

    #[test]
    fn diagonal_cells_stay_separate() {
        let mut m = Mask::new(4, 4);
        m.set(1, 1, 1);
        m.set(2, 2, 1);
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 2);
        for p in &polys {
            assert_abs_diff_eq!(p.polygon.area(), 1.0);
        }
    }

    #[test]
    fn different_values_never_merge() {
        let mut m = Mask::new(6, 3);
        m.fill_rect(0, 0, 3, 3, 1);
        m.fill_rect(3, 0, 6, 3, 2);
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 2);
        assert_eq!((polys[0].value, polys[1].value), (1, 2));
        assert_abs_diff_eq!(polys[0].polygon.area(), 9.0);
        assert_abs_diff_eq!(polys[1].polygon.area(), 9.0);
    }

    #[test]
    fn island_in_hole_is_its_own_polygon() {
        let mut m = Mask::new(9, 9);
        m.fill_rect(0, 0, 9, 9, 1);
        m.fill_rect(2, 2, 7, 7, 0);
        m.fill_rect(4, 4, 5, 5, 1);
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 2);
        assert_eq!(polys[0].polygon.hole_count(), 1);
        assert_abs_diff_eq!(polys[0].polygon.area(), 81.0 - 25.0);
        assert_abs_diff_eq!(polys[1].polygon.area(), 1.0);
    }

    #[test]
    fn separate_holes_stay_separate() {
        let rows = ["11100", "10100", "11111", "00101", "00111"];
        let m = Mask::from_fn(5, 5, |x, y| rows[y].as_bytes()[x] - b'0');
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 1);
        let p = &polys[0].polygon;
        assert_eq!(p.hole_count(), 2);
        assert_abs_diff_eq!(p.area(), m.count_nonzero() as f64);
    }

    #[test]
    fn hole_touching_outside_at_a_corner_keeps_cell_area() {
        // background cells (1,1) and (2,2) meet at a single vertex
        let rows = ["111", "101", "110"];
        let m = Mask::from_fn(3, 3, |x, y| rows[y].as_bytes()[x] - b'0');
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 1);
        assert_abs_diff_eq!(polys[0].polygon.area(), 7.0);
    }

    #[test]
    fn output_is_deterministic_and_row_major() {
        let mut m = Mask::new(10, 10);
        m.fill_rect(6, 0, 8, 2, 3);
        m.fill_rect(0, 4, 2, 6, 1);
        m.fill_rect(5, 7, 9, 9, 2);
        let a = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        let b = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(a, b);
        let values: Vec<u8> = a.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![3, 1, 2]);
    }

    #[test]
    fn speckle_mask_gives_one_polygon_per_cell() {
        // isolated pixels on every other row and column
        let m = Mask::from_fn(200, 200, |x, y| u8::from(x % 2 == 0 && y % 2 == 0));
        let polys = extract_polygons(&m, &AffineTransform::identity(), &pixel_crs());
        assert_eq!(polys.len(), 100 * 100);
        assert!(polys.iter().all(|p| p.polygon.hole_count() == 0));
        assert!(polys.iter().all(|p| p.polygon.exterior.len() == 5));
        let first = polys[1].polygon.bounds();
        assert_eq!((first.x_min, first.y_min), (2.0, 0.0));
    }

    #[test]
    fn affine_maps_to_world_units() {
        let mut m = Mask::new(20, 20);
        m.fill_rect(0, 0, 10, 10, 1);
        let t = AffineTransform::from_bounds(1000.0, 2000.0, 1040.0, 2040.0, 20, 20);
        let polys = extract_polygons(&m, &t, &Crs::epsg(3857));
        let p = &polys[0].polygon;
        assert_abs_diff_eq!(p.area(), 400.0);
        let b = p.bounds();
        assert_eq!((b.x_min, b.y_min, b.x_max, b.y_max), (1000.0, 2020.0, 1020.0, 2040.0));
        assert_eq!(p.crs, Crs::epsg(3857));
    }
}
