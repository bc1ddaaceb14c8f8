use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trait_move::Move;

/// Holds the move set of a simulation and selects moves by weight.
///
/// Selection walks the cumulative weight table, which is re-normalized on
/// every addition and removal.
pub struct MoveManager {
    moves: Vec<Box<dyn Move>>,
    weights: Vec<u32>,
    cumulative: Vec<u64>,
    total_weight: u64,
    rng: SmallRng,
}

impl MoveManager {
    pub fn new(seed: u64) -> MoveManager {
        MoveManager {
            moves: Vec::new(),
            weights: Vec::new(),
            cumulative: Vec::new(),
            total_weight: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Adds a move with a positive selection weight.
    pub fn add_move(&mut self, mv: Box<dyn Move>, weight: u32) {
        assert!(weight > 0, "move weight must be positive");
        self.moves.push(mv);
        self.weights.push(weight);
        self.rebuild_cumulative();
    }

    /// Removes the move at an index.
    pub fn remove_move(&mut self, index: usize) -> Box<dyn Move> {
        let mv = self.moves.remove(index);
        self.weights.remove(index);
        self.rebuild_cumulative();
        mv
    }

    fn rebuild_cumulative(&mut self) {
        self.cumulative.clear();
        let mut sum = 0u64;
        for &w in &self.weights {
            sum += w as u64;
            self.cumulative.push(sum);
        }
        self.total_weight = sum;
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn get_move(&self, index: usize) -> &dyn Move {
        self.moves[index].as_ref()
    }

    /// Draws a move with probability proportional to its weight.
    pub fn select_random_move(&mut self) -> &mut Box<dyn Move> {
        assert!(!self.moves.is_empty(), "no moves registered");
        let ticket = self.rng.gen_range(0..self.total_weight);
        let idx = match self.cumulative.binary_search(&(ticket + 1)) {
            Ok(i) => i,
            Err(i) => i,
        };
        &mut self.moves[idx]
    }

    /// Acceptance ratios per move, keyed by name.
    pub fn acceptance_map(&self) -> Vec<(&'static str, f64)> {
        self.moves.iter().map(|m| (m.name(), m.acceptance_ratio())).collect()
    }

    /// Resets every move's acceptance counters.
    pub fn reset_acceptances(&mut self) {
        for m in self.moves.iter_mut() {
            m.reset_acceptance_ratio();
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Move>> {
        self.moves.iter_mut()
    }
}

impl Clone for MoveManager {
    fn clone(&self) -> MoveManager {
        MoveManager {
            moves: self.moves.clone(),
            weights: self.weights.clone(),
            cumulative: self.cumulative.clone(),
            total_weight: self.total_weight,
            rng: self.rng.clone(),
        }
    }
}
