//! Spatial hashing with a one-step background look-ahead.
//!
//! Every [`collisions`](BroadPhase::collisions) call hands back the pairs
//! predicted during the previous call and immediately starts predicting the
//! next step on a background task. The pipeline depth is exactly one: the
//! producer writes into a single-slot channel and the next call blocks on it.
//!
//! Predictions are computed from each body's projected sweep (current
//! position to `projected_next_position`). Forces or impulses applied after
//! the prediction was launched are not seen, so a pair can be missed for one
//! step. Detection runs every step, so such a pair is normally picked up on
//! the following one.
//!
//! A prediction is only used by the call that follows exactly one
//! [`update_bodies`](BroadPhase::update_bodies) after its launch, with the
//! same body set. Anything else (several updates in between, none at all,
//! bodies added or removed) falls back to a synchronous pass.

use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;

use hashbrown::HashMap;
use orbital_types::{BodyId, PhysicsError, Result};
use tracing::{debug, trace, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::hash_grid::{build_grid, grid_candidates, grid_index_pairs, grid_pairs};
use super::{within_radius, BodyProxy, BroadPhase, HashGrid};
use crate::body::{swept_collision_t, Body};

type PairList = Vec<(BodyId, BodyId)>;

/// An in-flight look-ahead.
#[derive(Debug)]
struct Prediction {
    /// Body ids the prediction was computed for, in snapshot order.
    ids: Vec<BodyId>,
    /// Update count when the prediction was launched.
    launched_at: u64,
    receiver: Receiver<PairList>,
}

/// Double-buffered spatial hash with asynchronous prediction.
#[derive(Debug)]
pub struct PredictiveSpatialHashing {
    cell_size: f64,
    current: Option<HashGrid>,
    proxies: Arc<Vec<BodyProxy>>,
    pending: Option<Prediction>,
    updates: u64,
}

impl PredictiveSpatialHashing {
    /// Create a predictive spatial hash with the given cell size.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::InvalidCellSize`] unless `cell_size` is
    /// positive and finite.
    pub fn new(cell_size: f64) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(PhysicsError::InvalidCellSize(cell_size));
        }
        Ok(Self::empty(cell_size))
    }

    fn empty(cell_size: f64) -> Self {
        Self {
            cell_size,
            current: None,
            proxies: Arc::new(Vec::new()),
            pending: None,
            updates: 0,
        }
    }

    /// Grid cell size.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Whether a look-ahead is in flight.
    #[must_use]
    pub fn has_pending_prediction(&self) -> bool {
        self.pending.is_some()
    }

    /// A prediction covers exactly the step after its launch, for the same
    /// bodies.
    fn is_usable(&self, prediction: &Prediction) -> bool {
        self.updates == prediction.launched_at + 1 && self.same_body_set(&prediction.ids)
    }

    fn same_body_set(&self, ids: &[BodyId]) -> bool {
        ids.len() == self.proxies.len() && ids.iter().zip(self.proxies.iter()).all(|(a, p)| *a == p.id)
    }

    /// Keep predicted pairs whose current swept boxes still overlap.
    fn confirm(&self, predicted: PairList) -> PairList {
        let index: HashMap<BodyId, usize> = self
            .proxies
            .iter()
            .enumerate()
            .map(|(i, proxy)| (proxy.id, i))
            .collect();

        predicted
            .into_iter()
            .filter(|(a, b)| match (index.get(a), index.get(b)) {
                (Some(&i), Some(&j)) => self.proxies[i].aabb().overlaps(&self.proxies[j].aabb()),
                _ => false,
            })
            .collect()
    }

    fn launch_prediction(&mut self) {
        let proxies = Arc::clone(&self.proxies);
        let cell_size = self.cell_size;
        let ids = proxies.iter().map(|proxy| proxy.id).collect();
        let (sender, receiver) = sync_channel(1);

        let produce = move || {
            // The receiver is gone if this broad phase was dropped meanwhile.
            let _ = sender.send(predict(cell_size, &proxies));
        };

        #[cfg(feature = "parallel")]
        rayon::spawn(produce);
        #[cfg(not(feature = "parallel"))]
        produce();

        self.pending = Some(Prediction {
            ids,
            launched_at: self.updates,
            receiver,
        });
    }
}

/// Pairs whose projected sweeps actually touch within the next step.
fn predict(cell_size: f64, proxies: &[BodyProxy]) -> PairList {
    let grid = build_grid(cell_size, proxies, BodyProxy::projected_aabb);
    let candidates = grid_index_pairs(&grid, proxies, BodyProxy::projected_aabb);

    let touches = |&(i, j): &(usize, usize)| {
        let (a, b) = (&proxies[i], &proxies[j]);
        swept_collision_t(
            a.position,
            a.projected_next_position,
            a.radius,
            b.position,
            b.projected_next_position,
            b.radius,
        )
        .is_some()
    };

    #[cfg(feature = "parallel")]
    let hits: Vec<(usize, usize)> = candidates.into_par_iter().filter(touches).collect();
    #[cfg(not(feature = "parallel"))]
    let hits: Vec<(usize, usize)> = candidates.into_iter().filter(touches).collect();

    hits.into_iter()
        .map(|(i, j)| (proxies[i].id, proxies[j].id))
        .collect()
}

impl BroadPhase for PredictiveSpatialHashing {
    fn name(&self) -> &'static str {
        "predictive spatial hashing"
    }

    fn update_bodies(&mut self, bodies: &[Body]) {
        let proxies: Vec<BodyProxy> = bodies.iter().map(Body::proxy).collect();
        let grid = build_grid(self.cell_size, &proxies, BodyProxy::aabb);
        trace!(
            bodies = proxies.len(),
            cells = grid.occupied_cells(),
            "predictive hash rebuilt"
        );
        self.proxies = Arc::new(proxies);
        self.current = Some(grid);
        self.updates += 1;
    }

    fn collisions(&mut self) -> Result<Vec<(BodyId, BodyId)>> {
        let grid = self
            .current
            .as_ref()
            .ok_or(PhysicsError::not_initialized(self.name()))?;

        let pairs = match self.pending.take() {
            Some(prediction) if self.is_usable(&prediction) => {
                match prediction.receiver.recv() {
                    Ok(predicted) => self.confirm(predicted),
                    Err(_) => {
                        warn!("predictive broad phase lost its producer; computing synchronously");
                        grid_pairs(grid, &self.proxies, BodyProxy::aabb)
                    }
                }
            }
            Some(prediction) => {
                debug!(
                    launched_at = prediction.launched_at,
                    updates = self.updates,
                    "prediction does not cover this step; computing synchronously"
                );
                grid_pairs(grid, &self.proxies, BodyProxy::aabb)
            }
            None => grid_pairs(grid, &self.proxies, BodyProxy::aabb),
        };

        self.launch_prediction();
        Ok(pairs)
    }

    fn nearest(&self, body: &Body, radius: f64) -> Result<Vec<BodyId>> {
        let grid = self
            .current
            .as_ref()
            .ok_or(PhysicsError::not_initialized(self.name()))?;
        let candidates = grid_candidates(grid, body.position, radius);
        Ok(within_radius(&self.proxies, candidates, body, radius))
    }

    fn fresh(&self) -> Box<dyn BroadPhase> {
        Box::new(Self::empty(self.cell_size))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::broad_phase::tests::{check_scene, moving_body, normalized, resting_body};
    use nalgebra::{Point2, Vector2};

    fn step_all(bodies: &mut [Body]) {
        for body in bodies {
            body.step(1.0);
        }
    }

    #[test]
    fn test_scene() {
        check_scene(&mut PredictiveSpatialHashing::new(4.0).unwrap());
    }

    #[test]
    fn test_first_call_is_synchronous_then_predicts() {
        let mut hash = PredictiveSpatialHashing::new(4.0).unwrap();
        hash.update_bodies(&[resting_body(1, 0.0, 0.0), resting_body(2, 1.0, 0.0)]);

        assert!(!hash.has_pending_prediction());
        assert_eq!(hash.collisions().unwrap().len(), 1);
        assert!(hash.has_pending_prediction());
    }

    #[test]
    fn test_predicted_pair_is_delivered_next_step() {
        // Closing at 6 per step from 10 apart: touch during the second step.
        let mut bodies = vec![
            moving_body(1, 0.0, 0.0, Vector2::new(3.0, 0.0)),
            moving_body(2, 10.0, 0.0, Vector2::new(-3.0, 0.0)),
        ];
        let mut hash = PredictiveSpatialHashing::new(4.0).unwrap();
        hash.update_bodies(&bodies);
        assert!(hash.collisions().unwrap().is_empty());

        step_all(&mut bodies);
        hash.update_bodies(&bodies);
        let pairs = normalized(&hash.collisions().unwrap());
        assert!(pairs.contains(&(1, 2)));
    }

    #[test]
    fn test_prediction_is_one_step_stale() {
        let mut bodies = vec![resting_body(1, 0.0, 0.0), resting_body(2, 50.0, 0.0)];
        let mut hash = PredictiveSpatialHashing::new(4.0).unwrap();
        hash.update_bodies(&bodies);
        assert!(hash.collisions().unwrap().is_empty());

        // Teleport body 2 onto body 1; the in-flight prediction cannot see it.
        let target = Point2::new(0.5, 0.0);
        bodies[1].position = target;
        bodies[1].previous_position = target;
        bodies[1].projected_next_position = target;
        hash.update_bodies(&bodies);
        assert!(hash.collisions().unwrap().is_empty());

        hash.update_bodies(&bodies);
        assert_eq!(normalized(&hash.collisions().unwrap()).len(), 1);
    }

    #[test]
    fn test_body_set_change_discards_prediction() {
        let mut bodies = vec![resting_body(1, 0.0, 0.0)];
        let mut hash = PredictiveSpatialHashing::new(4.0).unwrap();
        hash.update_bodies(&bodies);
        hash.collisions().unwrap();

        bodies.push(resting_body(2, 0.5, 0.0));
        hash.update_bodies(&bodies);
        assert_eq!(normalized(&hash.collisions().unwrap()).len(), 1);
    }

    /// Update both broad phases and check that they agree; true on a hit.
    fn agree(
        bodies: &[Body],
        exact: &mut crate::broad_phase::SpatialHashing,
        hash: &mut PredictiveSpatialHashing,
    ) -> bool {
        exact.update_bodies(bodies);
        hash.update_bodies(bodies);
        let expected = normalized(&exact.collisions().unwrap());
        assert_eq!(normalized(&hash.collisions().unwrap()), expected);
        !expected.is_empty()
    }

    #[test]
    fn test_several_updates_between_calls_fall_back_to_current_grid() {
        // 1 rests at the origin; 2 closes at 50 per step and starts at 175.
        let mut bodies = vec![
            resting_body(1, 0.0, 0.0),
            moving_body(2, 225.0, 0.0, Vector2::new(-50.0, 0.0)),
        ];
        let mut exact = crate::broad_phase::SpatialHashing::new(10.0).unwrap();
        let mut hash = PredictiveSpatialHashing::new(10.0).unwrap();

        step_all(&mut bodies);
        assert!(!agree(&bodies, &mut exact, &mut hash));
        step_all(&mut bodies);
        assert!(!agree(&bodies, &mut exact, &mut hash));

        // 75 -> 25 without a call, then 25 -> -25 through body 1.
        step_all(&mut bodies);
        hash.update_bodies(&bodies);
        step_all(&mut bodies);
        assert!(agree(&bodies, &mut exact, &mut hash));

        // One update per call again.
        step_all(&mut bodies);
        assert!(!agree(&bodies, &mut exact, &mut hash));
        assert!(hash.has_pending_prediction());
    }

    #[test]
    fn test_call_without_update_recomputes() {
        let bodies = vec![resting_body(1, 0.0, 0.0), resting_body(2, 1.0, 0.0)];
        let mut hash = PredictiveSpatialHashing::new(4.0).unwrap();
        hash.update_bodies(&bodies);

        assert_eq!(hash.collisions().unwrap().len(), 1);
        assert_eq!(hash.collisions().unwrap().len(), 1);
    }

    #[test]
    fn test_nearest_uses_current_grid() {
        let bodies = vec![
            resting_body(1, 0.0, 0.0),
            resting_body(2, 3.0, 0.0),
            resting_body(3, 30.0, 0.0),
        ];
        let mut hash = PredictiveSpatialHashing::new(4.0).unwrap();
        assert!(hash.nearest(&bodies[0], 5.0).is_err());

        hash.update_bodies(&bodies);
        assert_eq!(hash.nearest(&bodies[0], 5.0).unwrap(), vec![BodyId::new(2)]);
    }
}
