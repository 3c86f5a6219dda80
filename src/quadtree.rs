//! Static, bulk-insertable 2-D spatial index keyed on [`Point`](crate::geometry::Point).
//!
//! Re-architected from the source's shared-pointer-with-weak-parent design
//! into an arena: nodes live in one `Vec` and reference children by index,
//! with no parent back-reference (nothing here ever needs to walk upward).

use crate::error::{PolytraceError, Result};
use crate::geometry::{Point, Rect};

const NE: usize = 0;
const NW: usize = 1;
const SW: usize = 2;
const SE: usize = 3;

struct Node {
    bounds: Rect,
    level: usize,
    children: Option<[usize; 4]>,
    objects: Vec<(usize, Point)>,
}

/// A bulk-insertable quadtree over `(id, Point)` entries.
///
/// Safe to share across threads for concurrent `search` calls once built:
/// nothing mutates the tree after the last `insert`.
pub struct QuadTree {
    nodes: Vec<Node>,
    max_objects: usize,
    max_levels: usize,
}

impl QuadTree {
    pub fn new(bounds: Rect, max_objects: usize, max_levels: usize) -> Self {
        QuadTree {
            nodes: vec![Node {
                bounds,
                level: 0,
                children: None,
                objects: Vec::new(),
            }],
            max_objects,
            max_levels,
        }
    }

    /// Inserts `point` under `id`. Fails if `point` falls outside the root
    /// bounds.
    pub fn insert(&mut self, id: usize, point: Point) -> Result<()> {
        let mut node_idx = 0;
        loop {
            let children = self.nodes[node_idx].children;
            match children {
                Some(children) => {
                    match Self::child_index(&self.nodes[node_idx].bounds, point, 0.0) {
                        Some(pos) => {
                            node_idx = children[pos];
                        }
                        None => break,
                    }
                }
                None => break,
            }
        }

        if !self.nodes[node_idx].bounds.contains_point(point) {
            return Err(PolytraceError::OutOfBounds { point });
        }

        self.nodes[node_idx].objects.push((id, point));

        let should_split = self.nodes[node_idx].objects.len() > self.max_objects
            && self.nodes[node_idx].level < self.max_levels
            && self.nodes[node_idx].children.is_none();

        if should_split {
            self.split(node_idx);
            let objects = std::mem::take(&mut self.nodes[node_idx].objects);
            let children = self.nodes[node_idx].children.expect("just split");
            let bounds = self.nodes[node_idx].bounds;
            let mut retained = Vec::new();
            for (oid, p) in objects {
                match Self::child_index(&bounds, p, 0.0) {
                    Some(pos) => self.nodes[children[pos]].objects.push((oid, p)),
                    None => retained.push((oid, p)),
                }
            }
            self.nodes[node_idx].objects = retained;
        }

        Ok(())
    }

    /// Every `(id, Point)` within `radius` of `center`, by true L2 distance.
    pub fn search(&self, center: Point, radius: f64) -> Vec<(usize, Point)> {
        let mut candidates = Vec::new();
        self.search_node(0, center, radius, &mut candidates);
        candidates
            .into_iter()
            .filter(|(_, p)| Point::distance(center, *p) < radius)
            .collect()
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[0].bounds
    }

    fn search_node(&self, node_idx: usize, point: Point, radius: f64, out: &mut Vec<(usize, Point)>) {
        let node = &self.nodes[node_idx];
        out.extend(node.objects.iter().copied());

        let Some(children) = node.children else {
            return;
        };

        match Self::child_index(&node.bounds, point, radius) {
            Some(pos) => self.search_node(children[pos], point, radius, out),
            None => {
                let query_bounds = Rect::new(
                    point - Point::new(radius, radius),
                    radius * 2.0,
                    radius * 2.0,
                );
                for &child in children.iter() {
                    if Rect::intersection(&self.nodes[child].bounds, &query_bounds).area() > 1.0 {
                        self.search_node(child, point, radius, out);
                    }
                }
            }
        }
    }

    fn split(&mut self, node_idx: usize) {
        let bounds = self.nodes[node_idx].bounds;
        let level = self.nodes[node_idx].level + 1;
        let center = bounds.center();

        let nw = Rect::from_corners(bounds.tl(), center);
        let ne = Rect::from_corners(bounds.tr(), center);
        let sw = Rect::from_corners(bounds.bl(), center);
        let se = Rect::from_corners(bounds.br(), center);

        let base = self.nodes.len();
        self.nodes.push(Node {
            bounds: ne,
            level,
            children: None,
            objects: Vec::new(),
        });
        self.nodes.push(Node {
            bounds: nw,
            level,
            children: None,
            objects: Vec::new(),
        });
        self.nodes.push(Node {
            bounds: sw,
            level,
            children: None,
            objects: Vec::new(),
        });
        self.nodes.push(Node {
            bounds: se,
            level,
            children: None,
            objects: Vec::new(),
        });

        self.nodes[node_idx].children = Some([base + NE, base + NW, base + SW, base + SE]);
    }

    /// Quadrant housing a `point`-centered box of side `radius` (zero for a
    /// bare point), or `None` if it straddles more than one quadrant and
    /// therefore belongs at the current level.
    fn child_index(bounds: &Rect, point: Point, radius: f64) -> Option<usize> {
        let center = bounds.center();
        let nw_bbox = Rect::from_corners(bounds.tl(), center);
        let ne_bbox = Rect::from_corners(bounds.tr(), center);
        let sw_bbox = Rect::from_corners(bounds.bl(), center);
        let se_bbox = Rect::from_corners(bounds.br(), center);

        let obj_bounds = Rect::new(
            point - Point::new(radius / 2.0, radius / 2.0),
            radius,
            radius,
        );

        if nw_bbox.contains_rect(&obj_bounds) {
            Some(NW)
        } else if ne_bbox.contains_rect(&obj_bounds) {
            Some(NE)
        } else if sw_bbox.contains_rect(&obj_bounds) {
            Some(SW)
        } else if se_bbox.contains_rect(&obj_bounds) {
            Some(SE)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_grid() -> QuadTree {
        let mut tree = QuadTree::new(Rect::new(Point::new(-10.0, -10.0), 20.0, 20.0), 5, 5);
        let mut id = 0;
        for i in 1..=10 {
            let i = i as f64;
            for (x, y) in [(i, i), (i, -i), (-i, i), (-i, -i)] {
                tree.insert(id, Point::new(x, y)).unwrap();
                id += 1;
            }
        }
        tree
    }

    #[test]
    fn search_small_scale_counts_match() {
        let tree = build_grid();
        assert_eq!(tree.search(Point::new(0.0, 0.0), 1.5).len(), 4);
        assert_eq!(tree.search(Point::new(-8.0, 6.0), 3.0).len(), 3);
    }

    #[test]
    fn search_zero_radius_returns_nothing() {
        let tree = build_grid();
        assert_eq!(tree.search(Point::new(1.0, 1.0), 0.0).len(), 0);
    }

    #[test]
    fn search_around_inserted_point_with_small_epsilon_finds_it() {
        let mut tree = QuadTree::new(Rect::new(Point::new(-1.0, -1.0), 2.0, 2.0), 5, 5);
        tree.insert(0, Point::new(0.25, 0.25)).unwrap();
        let found = tree.search(Point::new(0.25, 0.25), 1e-6);
        assert!(found.iter().any(|(id, _)| *id == 0));
    }

    #[test]
    fn insert_outside_root_bounds_is_an_error() {
        let mut tree = QuadTree::new(Rect::new(Point::new(0.0, 0.0), 1.0, 1.0), 5, 5);
        let result = tree.insert(0, Point::new(50.0, 50.0));
        assert!(matches!(result, Err(PolytraceError::OutOfBounds { .. })));
    }

    #[test]
    fn splitting_redistributes_objects_into_children() {
        let mut tree = QuadTree::new(Rect::new(Point::new(0.0, 0.0), 100.0, 100.0), 2, 5);
        for i in 0..10 {
            tree.insert(i, Point::new(10.0 + i as f64, 10.0 + i as f64))
                .unwrap();
        }
        assert!(tree.nodes[0].children.is_some());
    }
}
