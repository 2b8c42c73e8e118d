//! Region quad tree rebuilt on every update.
//!
//! Insertion is loose: a box no larger than a quadrant is pushed down into
//! every quadrant it overlaps, and a larger box is kept at the node where it
//! stopped. Small boxes still reach the leaves, while a long sweep is
//! stored once near the root instead of in every leaf along its path. A query
//! collects the entries of every node it overlaps on the way down, so a pair
//! whose boxes overlap is always found.

use nalgebra::Vector2;
use orbital_types::{BodyId, PhysicsError, Result};
use tracing::{trace, warn};

use super::{snapshot, within_radius, Aabb, BodyProxy, BroadPhase};
use crate::body::Body;

/// Depth at which subdivision stops regardless of the minimum cell size.
pub const MAX_DEPTH: usize = 24;

/// Smallest root extent; keeps coincident bodies from producing a zero-area
/// root.
const MIN_ROOT_EXTENT: f64 = 0.01;

/// A node in the quad tree.
#[derive(Debug, Clone)]
struct QuadNode {
    /// Region covered by this node.
    bounds: Aabb,
    /// Tree depth (root is 0).
    depth: usize,
    /// Proxy indices stored at this node.
    entries: Vec<usize>,
    /// Quadrant children, created on first descent.
    children: Option<[usize; 4]>,
}

/// Quad tree broad phase with AABB insertion.
///
/// The root covers every body's swept box. A box descends into every
/// quadrant it overlaps for as long as it fits inside a quadrant and the
/// quadrant's smaller side stays above the minimum cell size; it is stored
/// at the node where the descent stops. Each box therefore touches at most
/// four nodes per level.
#[derive(Debug, Clone)]
pub struct QuadTreeBroadPhase {
    min_cell_size: f64,
    nodes: Vec<QuadNode>,
    proxies: Vec<BodyProxy>,
    boxes: Vec<Aabb>,
    initialized: bool,
    depth_capped: bool,
}

impl QuadTreeBroadPhase {
    /// Create a quad tree whose leaves are no smaller than `min_cell_size`.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidCellSize`] unless `min_cell_size` is
    /// positive and finite.
    pub fn new(min_cell_size: f64) -> Result<Self> {
        if !min_cell_size.is_finite() || min_cell_size <= 0.0 {
            return Err(PhysicsError::InvalidCellSize(min_cell_size));
        }
        Ok(Self::empty(min_cell_size))
    }

    fn empty(min_cell_size: f64) -> Self {
        Self {
            min_cell_size,
            nodes: Vec::new(),
            proxies: Vec::new(),
            boxes: Vec::new(),
            initialized: false,
            depth_capped: false,
        }
    }

    /// Minimum leaf side length.
    #[must_use]
    pub fn min_cell_size(&self) -> f64 {
        self.min_cell_size
    }

    /// Number of allocated nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the root node, if any body was inserted.
    #[must_use]
    pub fn root_bounds(&self) -> Option<&Aabb> {
        self.nodes.first().map(|node| &node.bounds)
    }

    fn root_bounds_for(boxes: &[Aabb]) -> Option<Aabb> {
        let first = *boxes.first()?;
        let total = boxes[1..].iter().fold(first, |acc, aabb| acc.union(aabb));

        // 1% padding per axis
        let half = Vector2::new(
            total.width().max(MIN_ROOT_EXTENT),
            total.height().max(MIN_ROOT_EXTENT),
        ) * 0.505;
        Some(Aabb::from_center(total.center(), half))
    }

    fn push_node(&mut self, bounds: Aabb, depth: usize) -> usize {
        self.nodes.push(QuadNode {
            bounds,
            depth,
            entries: Vec::new(),
            children: None,
        });
        self.nodes.len() - 1
    }

    fn can_split(&mut self, bounds: &Aabb, depth: usize) -> bool {
        if bounds.width().min(bounds.height()) / 2.0 < self.min_cell_size {
            return false;
        }
        if depth >= MAX_DEPTH {
            self.depth_capped = true;
            return false;
        }
        true
    }

    fn insert(&mut self, node: usize, entry: usize, aabb: &Aabb) {
        let (bounds, depth, children) = {
            let current = &self.nodes[node];
            (current.bounds, current.depth, current.children)
        };
        if !bounds.overlaps(aabb) {
            return;
        }

        let fits = aabb.width() <= bounds.width() / 2.0 && aabb.height() <= bounds.height() / 2.0;
        if !fits || !self.can_split(&bounds, depth) {
            self.nodes[node].entries.push(entry);
            return;
        }

        let children = match children {
            Some(children) => children,
            None => {
                let created = bounds
                    .quadrants()
                    .map(|quadrant| self.push_node(quadrant, depth + 1));
                self.nodes[node].children = Some(created);
                created
            }
        };
        for child in children {
            self.insert(child, entry, aabb);
        }
    }

    fn query(&self, node: usize, aabb: &Aabb, results: &mut Vec<usize>) {
        let current = &self.nodes[node];
        if !current.bounds.overlaps(aabb) {
            return;
        }

        results.extend_from_slice(&current.entries);
        if let Some(children) = current.children {
            for child in children {
                self.query(child, aabb, results);
            }
        }
    }

    /// Proxy indices stored in nodes overlapping `aabb`, each once.
    fn candidates(&self, aabb: &Aabb) -> Vec<usize> {
        let mut results = Vec::new();
        if !self.nodes.is_empty() {
            self.query(0, aabb, &mut results);
        }
        results.sort_unstable();
        results.dedup();
        results
    }
}

impl BroadPhase for QuadTreeBroadPhase {
    fn name(&self) -> &'static str {
        "quad tree"
    }

    fn update_bodies(&mut self, bodies: &[Body]) {
        self.proxies = snapshot(bodies);
        self.boxes = self.proxies.iter().map(BodyProxy::aabb).collect();
        self.nodes.clear();
        self.depth_capped = false;
        self.initialized = true;

        let Some(root) = Self::root_bounds_for(&self.boxes) else {
            return;
        };
        let root = self.push_node(root, 0);
        for entry in 0..self.boxes.len() {
            let aabb = self.boxes[entry];
            self.insert(root, entry, &aabb);
        }

        if self.depth_capped {
            warn!(
                max_depth = MAX_DEPTH,
                min_cell_size = self.min_cell_size,
                "quad tree depth cap reached; leaves are larger than the minimum cell size"
            );
        }
        trace!(
            bodies = self.proxies.len(),
            nodes = self.nodes.len(),
            "quad tree rebuilt"
        );
    }

    fn collisions(&mut self) -> Result<Vec<(BodyId, BodyId)>> {
        if !self.initialized {
            return Err(PhysicsError::not_initialized(self.name()));
        }

        let mut pairs = Vec::new();
        for (i, aabb) in self.boxes.iter().enumerate() {
            for j in self.candidates(aabb) {
                if j > i && aabb.overlaps(&self.boxes[j]) {
                    pairs.push((self.proxies[i].id, self.proxies[j].id));
                }
            }
        }
        Ok(pairs)
    }

    fn nearest(&self, body: &Body, radius: f64) -> Result<Vec<BodyId>> {
        if !self.initialized {
            return Err(PhysicsError::not_initialized(self.name()));
        }

        let reach = Aabb::from_center(body.position, Vector2::repeat(radius.max(0.0)));
        let candidates = self.candidates(&reach);
        Ok(within_radius(&self.proxies, candidates, body, radius))
    }

    fn fresh(&self) -> Box<dyn BroadPhase> {
        Box::new(Self::empty(self.min_cell_size))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use crate::broad_phase::tests::{check_scene, normalized, resting_body};
    use orbital_types::Matter;

    #[test]
    fn test_rejects_bad_cell_size() {
        assert!(QuadTreeBroadPhase::new(-1.0).is_err());
        assert!(QuadTreeBroadPhase::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_scene() {
        check_scene(&mut QuadTreeBroadPhase::new(5.0).unwrap());
        check_scene(&mut QuadTreeBroadPhase::new(1000.0).unwrap());
    }

    #[test]
    fn test_empty_world() {
        let mut tree = QuadTreeBroadPhase::new(1.0).unwrap();
        tree.update_bodies(&[]);
        assert!(tree.collisions().unwrap().is_empty());
        assert!(tree.root_bounds().is_none());
    }

    #[test]
    fn test_root_covers_every_body() {
        let bodies = vec![resting_body(1, -20.0, 5.0), resting_body(2, 30.0, -7.0)];
        let mut tree = QuadTreeBroadPhase::new(2.0).unwrap();
        tree.update_bodies(&bodies);

        let root = *tree.root_bounds().unwrap();
        for body in &bodies {
            let aabb = body.aabb();
            assert!(root.contains_point(&aabb.min) && root.contains_point(&aabb.max));
        }
    }

    #[test]
    fn test_body_spanning_leaves_reported_once() {
        // A long sweep crosses many leaves that also hold the resting body.
        let mut mover = resting_body(1, -10.0, 0.0);
        mover.previous_position = nalgebra::Point2::new(-10.0, 0.0);
        mover.position = nalgebra::Point2::new(10.0, 0.0);
        let bodies = vec![mover, resting_body(2, 0.0, 0.5)];

        let mut tree = QuadTreeBroadPhase::new(0.5).unwrap();
        tree.update_bodies(&bodies);
        let pairs = tree.collisions().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(normalized(&pairs).len(), 1);
    }

    #[test]
    fn test_wide_box_stays_at_internal_node() {
        let mut mover = resting_body(1, -20.0, 0.0);
        mover.position = nalgebra::Point2::new(20.0, 0.0);
        let bodies = vec![
            mover,
            resting_body(2, -15.0, 0.5),
            resting_body(3, 15.0, 10.0),
            resting_body(4, 0.0, -10.0),
        ];

        let mut tree = QuadTreeBroadPhase::new(0.5).unwrap();
        tree.update_bodies(&bodies);

        assert_eq!(tree.nodes[0].entries, vec![0]);
        assert!(tree.nodes[1..].iter().all(|node| !node.entries.contains(&0)));
        assert!(tree.nodes[1..].iter().any(|node| node.entries.contains(&1)));

        let pairs = normalized(&tree.collisions().unwrap());
        assert_eq!(pairs.into_iter().collect::<Vec<_>>(), vec![(1, 2)]);
    }

    #[test]
    fn test_coincident_bodies_stay_at_root() {
        let bodies: Vec<_> = (1..=3).map(|id| resting_body(id, 0.0, 0.0)).collect();
        let mut tree = QuadTreeBroadPhase::new(1e-12).unwrap();
        tree.update_bodies(&bodies);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(normalized(&tree.collisions().unwrap()).len(), 3);
    }

    #[test]
    fn test_point_bodies_stop_at_depth_cap() {
        let bodies: Vec<_> = [(1, 0.0, 0.0), (2, 1.0, 1.0)]
            .into_iter()
            .map(|(id, x, y)| {
                let mut body = Body::new(nalgebra::Point2::new(x, y), Matter::new());
                body.set_id(BodyId::new(id));
                body.step(1.0);
                body
            })
            .collect();
        let mut tree = QuadTreeBroadPhase::new(1e-12).unwrap();
        tree.update_bodies(&bodies);

        assert!(tree.depth_capped);
        // bounded by the depth cap, not by the cell size
        assert!(tree.node_count() <= 1 + 2 * 16 * MAX_DEPTH);
        assert!(tree.collisions().unwrap().is_empty());
    }

    #[test]
    fn test_small_bodies_descend() {
        let bodies: Vec<_> = (0..16)
            .map(|i| resting_body(i + 1, (i % 4) as f64 * 10.0, (i / 4) as f64 * 10.0))
            .collect();
        let mut tree = QuadTreeBroadPhase::new(1.0).unwrap();
        tree.update_bodies(&bodies);

        assert!(tree.node_count() > 1);
        assert!(tree.collisions().unwrap().is_empty());
    }

    #[test]
    fn test_nearest() {
        let bodies: Vec<_> = (0..5)
            .map(|i| resting_body(i + 1, 0.0, i as f64 * 4.0))
            .collect();
        let mut tree = QuadTreeBroadPhase::new(1.0).unwrap();
        tree.update_bodies(&bodies);

        let mut near = tree.nearest(&bodies[0], 8.0).unwrap();
        near.sort();
        assert_eq!(near, vec![BodyId::new(2), BodyId::new(3)]);
    }
}
