//! Sweep-and-Prune (Sort-and-Sweep) on both axes.
//!
//! Each body contributes a start and an end endpoint per axis. The endpoint
//! lists are kept sorted between updates: while the body set is unchanged an
//! insertion sort restores order in close to linear time, since bodies rarely
//! pass each other within one step. Any change in the body set triggers a
//! full rebuild.

use std::cmp::Ordering;

use hashbrown::HashSet;
use orbital_types::{BodyId, PhysicsError, Result};
use tracing::{debug, trace};

use super::{snapshot, within_radius, Aabb, BodyProxy, BroadPhase};
use crate::body::Body;

/// One end of a body's interval on an axis.
#[derive(Debug, Clone, Copy)]
struct Endpoint {
    value: f64,
    /// Index into the proxy list.
    proxy: usize,
    is_start: bool,
}

impl Endpoint {
    /// Ascending by value; at equal values starts sort before ends so that
    /// touching intervals count as overlapping.
    fn order(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.is_start.cmp(&self.is_start))
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn bounds(self, aabb: &Aabb) -> (f64, f64) {
        match self {
            Self::X => (aabb.min.x, aabb.max.x),
            Self::Y => (aabb.min.y, aabb.max.y),
        }
    }
}

/// Sweep-and-Prune broad phase over swept body boxes.
#[derive(Debug, Clone, Default)]
pub struct SweepAndPrune {
    x: Vec<Endpoint>,
    y: Vec<Endpoint>,
    proxies: Vec<BodyProxy>,
    boxes: Vec<Aabb>,
    initialized: bool,
}

impl SweepAndPrune {
    /// Create an empty sweep-and-prune broad phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bodies from the last update.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Whether the last update had no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    fn same_body_set(&self, proxies: &[BodyProxy]) -> bool {
        self.initialized
            && self.proxies.len() == proxies.len()
            && self
                .proxies
                .iter()
                .zip(proxies)
                .all(|(old, new)| old.id == new.id)
    }

    fn endpoints(boxes: &[Aabb], axis: Axis) -> Vec<Endpoint> {
        let mut endpoints = Vec::with_capacity(boxes.len() * 2);
        for (proxy, aabb) in boxes.iter().enumerate() {
            let (min, max) = axis.bounds(aabb);
            endpoints.push(Endpoint {
                value: min,
                proxy,
                is_start: true,
            });
            endpoints.push(Endpoint {
                value: max,
                proxy,
                is_start: false,
            });
        }
        endpoints.sort_by(Endpoint::order);
        endpoints
    }

    fn refresh(endpoints: &mut [Endpoint], boxes: &[Aabb], axis: Axis) -> usize {
        for endpoint in endpoints.iter_mut() {
            let (min, max) = axis.bounds(&boxes[endpoint.proxy]);
            endpoint.value = if endpoint.is_start { min } else { max };
        }
        insertion_sort(endpoints)
    }

    /// Every pair whose intervals overlap on one axis, as `(lower, higher)`
    /// proxy indices.
    fn sweep(endpoints: &[Endpoint]) -> Vec<(usize, usize)> {
        let mut active: Vec<usize> = Vec::new();
        let mut pairs = Vec::new();

        for endpoint in endpoints {
            if endpoint.is_start {
                for &other in &active {
                    pairs.push((other.min(endpoint.proxy), other.max(endpoint.proxy)));
                }
                active.push(endpoint.proxy);
            } else if let Some(slot) = active.iter().position(|&p| p == endpoint.proxy) {
                active.swap_remove(slot);
            }
        }

        pairs
    }
}

/// Stable insertion sort; returns the number of swaps.
fn insertion_sort(endpoints: &mut [Endpoint]) -> usize {
    let mut swaps = 0;
    for i in 1..endpoints.len() {
        let mut j = i;
        while j > 0 && endpoints[j - 1].order(&endpoints[j]) == Ordering::Greater {
            endpoints.swap(j - 1, j);
            swaps += 1;
            j -= 1;
        }
    }
    swaps
}

impl BroadPhase for SweepAndPrune {
    fn name(&self) -> &'static str {
        "sweep and prune"
    }

    fn update_bodies(&mut self, bodies: &[Body]) {
        let proxies = snapshot(bodies);
        self.boxes = proxies.iter().map(BodyProxy::aabb).collect();

        if self.same_body_set(&proxies) {
            let swaps = Self::refresh(&mut self.x, &self.boxes, Axis::X)
                + Self::refresh(&mut self.y, &self.boxes, Axis::Y);
            trace!(bodies = proxies.len(), swaps, "sweep and prune resorted");
        } else {
            self.x = Self::endpoints(&self.boxes, Axis::X);
            self.y = Self::endpoints(&self.boxes, Axis::Y);
            debug!(bodies = proxies.len(), "sweep and prune rebuilt");
        }

        self.proxies = proxies;
        self.initialized = true;
    }

    fn collisions(&mut self) -> Result<Vec<(BodyId, BodyId)>> {
        if !self.initialized {
            return Err(PhysicsError::not_initialized(self.name()));
        }

        let on_x: HashSet<(usize, usize)> = Self::sweep(&self.x).into_iter().collect();
        Ok(Self::sweep(&self.y)
            .into_iter()
            .filter(|pair| on_x.contains(pair))
            .map(|(i, j)| (self.proxies[i].id, self.proxies[j].id))
            .collect())
    }

    fn nearest(&self, body: &Body, radius: f64) -> Result<Vec<BodyId>> {
        if !self.initialized {
            return Err(PhysicsError::not_initialized(self.name()));
        }

        let reach = radius.max(0.0);
        let (low, high) = (body.position.x - reach, body.position.x + reach);
        let end = self.x.partition_point(|e| e.value <= high);
        let candidates = self.x[..end]
            .iter()
            .filter(|e| e.is_start && self.boxes[e.proxy].max.x >= low)
            .map(|e| e.proxy);

        Ok(within_radius(&self.proxies, candidates, body, radius))
    }

    fn fresh(&self) -> Box<dyn BroadPhase> {
        Box::new(Self::new())
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
    use crate::broad_phase::tests::{check_scene, moving_body, normalized, resting_body};
    use nalgebra::Vector2;

    #[test]
    fn test_scene() {
        check_scene(&mut SweepAndPrune::new());
    }

    #[test]
    fn test_requires_overlap_on_both_axes() {
        // Overlap on X only.
        let bodies = vec![resting_body(1, 0.0, 0.0), resting_body(2, 0.5, 10.0)];
        let mut sap = SweepAndPrune::new();
        sap.update_bodies(&bodies);
        assert!(sap.collisions().unwrap().is_empty());
    }

    #[test]
    fn test_touching_boxes_are_candidates() {
        let bodies = vec![resting_body(1, 0.0, 0.0), resting_body(2, 2.0, 0.0)];
        let mut sap = SweepAndPrune::new();
        sap.update_bodies(&bodies);
        assert_eq!(normalized(&sap.collisions().unwrap()).len(), 1);
    }

    #[test]
    fn test_incremental_resort_tracks_crossing_bodies() {
        // 1 and 2 start far apart and swap order on X over several steps.
        let mut bodies = vec![
            moving_body(1, 0.0, 0.0, Vector2::new(3.0, 0.0)),
            moving_body(2, 20.0, 0.0, Vector2::new(-3.0, 0.0)),
        ];
        let mut sap = SweepAndPrune::new();
        sap.update_bodies(&bodies);
        assert!(sap.collisions().unwrap().is_empty());

        let mut seen = false;
        for _ in 0..6 {
            for body in &mut bodies {
                body.step(1.0);
            }
            sap.update_bodies(&bodies);
            seen |= !sap.collisions().unwrap().is_empty();
        }
        assert!(seen, "crossing pair must be reported");

        // Now moving apart again.
        for _ in 0..5 {
            for body in &mut bodies {
                body.step(1.0);
            }
        }
        sap.update_bodies(&bodies);
        assert!(sap.collisions().unwrap().is_empty());
        assert!(sap.x.windows(2).all(|w| w[0].value <= w[1].value));
    }

    #[test]
    fn test_rebuild_on_body_set_change() {
        let mut sap = SweepAndPrune::new();
        sap.update_bodies(&[resting_body(1, 0.0, 0.0)]);
        assert_eq!(sap.len(), 1);

        let bodies = vec![resting_body(1, 0.0, 0.0), resting_body(7, 1.0, 1.0)];
        sap.update_bodies(&bodies);
        assert_eq!(sap.len(), 2);
        assert_eq!(
            sap.collisions().unwrap(),
            vec![(BodyId::new(1), BodyId::new(7))]
        );
    }

    #[test]
    fn test_insertion_sort_counts_swaps() {
        let mut endpoints: Vec<Endpoint> = [3.0, 1.0, 2.0]
            .iter()
            .enumerate()
            .map(|(proxy, &value)| Endpoint {
                value,
                proxy,
                is_start: true,
            })
            .collect();
        assert_eq!(insertion_sort(&mut endpoints), 2);
        assert_eq!(insertion_sort(&mut endpoints), 0);
    }

    #[test]
    fn test_nearest() {
        let bodies: Vec<_> = (0..8)
            .map(|i| resting_body(i + 1, i as f64 * 5.0, 0.0))
            .collect();
        let mut sap = SweepAndPrune::new();
        sap.update_bodies(&bodies);

        let mut near = sap.nearest(&bodies[2], 5.0).unwrap();
        near.sort();
        assert_eq!(near, vec![BodyId::new(2), BodyId::new(4)]);
        assert!(sap.nearest(&bodies[2], 1.0).unwrap().is_empty());
    }
}
