//! Arena-based mass-aggregating quad tree for Barnes-Hut.
//!
//! Nodes live contiguously in a `Vec` and refer to their children by index.
//! The tree is built in one pass from a point set: a region holding a single
//! point becomes a leaf, a region holding more is split into four quadrants
//! until every point is alone. Points that cannot be separated within
//! [`MAX_DEPTH`] levels (coincident bodies) share a bucket leaf.
//!
//! Every node caches the [`CenterOfMass`] of its subtree, aggregated bottom-up
//! from its children.

use nalgebra::{Point2, Vector2};

use crate::body::Body;
use crate::broad_phase::Aabb;

/// Depth at which splitting stops and remaining points share a bucket.
pub const MAX_DEPTH: usize = 24;

/// Smallest root extent per axis.
const MIN_EXTENT: f64 = 0.01;

/// Aggregate position and mass of a set of point masses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterOfMass {
    /// Mass-weighted mean position.
    pub position: Point2<f64>,
    /// Total mass.
    pub mass: f64,
}

impl CenterOfMass {
    /// A point mass.
    #[must_use]
    pub const fn new(position: Point2<f64>, mass: f64) -> Self {
        Self { position, mass }
    }

    /// Combine several aggregates. Massless input yields zero mass at
    /// `fallback`.
    #[must_use]
    pub fn combine<'a>(
        parts: impl IntoIterator<Item = &'a CenterOfMass>,
        fallback: Point2<f64>,
    ) -> Self {
        let (mass, weighted) = parts
            .into_iter()
            .fold((0.0, Vector2::zeros()), |(mass, weighted), part| {
                (mass + part.mass, weighted + part.position.coords * part.mass)
            });

        if mass > 0.0 {
            Self::new(Point2::from(weighted / mass), mass)
        } else {
            Self::new(fallback, 0.0)
        }
    }
}

impl From<&Body> for CenterOfMass {
    fn from(body: &Body) -> Self {
        Self::new(body.position, body.mass())
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    /// Exactly one point.
    Leaf(usize),
    /// Several points that could not be separated.
    Bucket(Vec<usize>),
    /// Four quadrants, bottom-left, bottom-right, top-left, top-right.
    Internal([Option<usize>; 4]),
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    center_of_mass: CenterOfMass,
    kind: NodeKind,
}

/// Quad tree over a set of point masses.
#[derive(Debug, Clone, Default)]
pub struct QuadTree {
    nodes: Vec<Node>,
    points: Vec<CenterOfMass>,
    root: Option<usize>,
}

impl QuadTree {
    /// Build a tree over `points`.
    #[must_use]
    pub fn build(points: Vec<CenterOfMass>) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(points.len() * 2),
            points,
            root: None,
        };

        if let Some(bounds) = Self::bounds_for(&tree.points) {
            let indices: Vec<usize> = (0..tree.points.len()).collect();
            tree.root = tree.build_recursive(&indices, bounds, 0);
        }
        tree
    }

    /// Build a tree over the bodies' current positions and masses.
    #[must_use]
    pub fn from_bodies(bodies: &[Body]) -> Self {
        Self::build(bodies.iter().map(CenterOfMass::from).collect())
    }

    /// Bounding box of the points, padded by 1% per axis and at least
    /// [`MIN_EXTENT`] wide so collinear or coincident points still split.
    fn bounds_for(points: &[CenterOfMass]) -> Option<Aabb> {
        let first = points.first()?.position;
        let (min, max) = points.iter().fold((first, first), |(min, max), point| {
            let p = point.position;
            (
                Point2::new(min.x.min(p.x), min.y.min(p.y)),
                Point2::new(max.x.max(p.x), max.y.max(p.y)),
            )
        });

        let width = (max.x - min.x).max(MIN_EXTENT);
        let height = (max.y - min.y).max(MIN_EXTENT);
        let pad = Vector2::new(width * 0.01, height * 0.01);
        Some(Aabb::new(min - pad, Point2::new(min.x + width, min.y + height) + pad))
    }

    /// Quadrant index of `point`, matching [`Aabb::quadrants`].
    fn quadrant(bounds: &Aabb, point: &Point2<f64>) -> usize {
        let center = bounds.center();
        let x_bit = usize::from(point.x > center.x);
        let y_bit = usize::from(point.y > center.y);
        x_bit | (y_bit << 1)
    }

    fn build_recursive(&mut self, indices: &[usize], bounds: Aabb, depth: usize) -> Option<usize> {
        let (center_of_mass, kind) = match indices {
            [] => return None,
            [single] => (self.points[*single], NodeKind::Leaf(*single)),
            _ if depth >= MAX_DEPTH => (
                CenterOfMass::combine(indices.iter().map(|&i| &self.points[i]), bounds.center()),
                NodeKind::Bucket(indices.to_vec()),
            ),
            _ => {
                let mut quadrants: [Vec<usize>; 4] = Default::default();
                for &i in indices {
                    quadrants[Self::quadrant(&bounds, &self.points[i].position)].push(i);
                }

                let regions = bounds.quadrants();
                let mut children = [None; 4];
                for (q, members) in quadrants.iter().enumerate() {
                    children[q] = self.build_recursive(members, regions[q], depth + 1);
                }

                let center_of_mass = CenterOfMass::combine(
                    children.iter().flatten().map(|&c| &self.nodes[c].center_of_mass),
                    bounds.center(),
                );
                (center_of_mass, NodeKind::Internal(children))
            }
        };

        self.nodes.push(Node {
            bounds,
            center_of_mass,
            kind,
        });
        Some(self.nodes.len() - 1)
    }

    /// Number of points in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tree holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of allocated nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the root node.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        self.root.map(|root| self.nodes[root].bounds)
    }

    /// Aggregate of every point in the tree.
    #[must_use]
    pub fn center_of_mass(&self) -> Option<CenterOfMass> {
        self.root.map(|root| self.nodes[root].center_of_mass)
    }

    /// Sum `pull` over the tree as seen from `at`.
    ///
    /// A node is collapsed into its center of mass when it does not contain
    /// `at` and `size / distance < theta`, where `size` is the node's larger
    /// side. Point `skip` (the querying body itself) is left out.
    pub fn acceleration<F>(
        &self,
        at: Point2<f64>,
        skip: Option<usize>,
        theta: f64,
        pull: &F,
    ) -> Vector2<f64>
    where
        F: Fn(&CenterOfMass) -> Vector2<f64>,
    {
        self.root.map_or_else(Vector2::zeros, |root| {
            self.accumulate(root, at, skip, theta, pull)
        })
    }

    fn accumulate<F>(
        &self,
        node: usize,
        at: Point2<f64>,
        skip: Option<usize>,
        theta: f64,
        pull: &F,
    ) -> Vector2<f64>
    where
        F: Fn(&CenterOfMass) -> Vector2<f64>,
    {
        let node = &self.nodes[node];
        if node.center_of_mass.mass <= 0.0 {
            return Vector2::zeros();
        }

        match &node.kind {
            NodeKind::Leaf(index) => {
                if skip == Some(*index) {
                    Vector2::zeros()
                } else {
                    pull(&self.points[*index])
                }
            }
            NodeKind::Bucket(indices) => indices
                .iter()
                .filter(|&&i| skip != Some(i))
                .map(|&i| pull(&self.points[i]))
                .fold(Vector2::zeros(), |acc, a| acc + a),
            NodeKind::Internal(children) => {
                let size = node.bounds.width().max(node.bounds.height());
                let distance = (node.center_of_mass.position - at).norm();

                if !node.bounds.contains_point(&at) && distance > 0.0 && size / distance < theta {
                    pull(&node.center_of_mass)
                } else {
                    children
                        .iter()
                        .flatten()
                        .map(|&child| self.accumulate(child, at, skip, theta, pull))
                        .fold(Vector2::zeros(), |acc, a| acc + a)
                }
            }
        }
    }
}
