use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use mcshell_ff::ForceFieldManager;
use mcshell_moves::{MoveManager, MoveOverride};
use mcshell_system::WorldManager;

use crate::trait_observer::{ObserverSet, SimState};

/// The Metropolis driver: depending on the registered moves this samples
/// NVT, NPT, grand-canonical or Gibbs ensembles.
///
/// Each iteration performs weighted random moves, as many as the
/// moves-per-iteration count (the total particle count unless overridden),
/// then notifies observers. A shared stop flag is honored between
/// iterations so cancellation never interrupts a move.
pub struct StandardSimulation {
    worlds: WorldManager,
    ffm: ForceFieldManager,
    moves: MoveManager,
    observers: ObserverSet,
    iteration: usize,
    moves_per_iteration: Option<usize>,
    stop: Arc<AtomicBool>,
}

impl StandardSimulation {
    /// Builds the driver and seeds every world's accumulated energy and
    /// pressure from a full evaluation.
    pub fn new(mut worlds: WorldManager, ffm: ForceFieldManager, moves: MoveManager) -> StandardSimulation {
        for w in worlds.worlds_mut() {
            let ep = ffm.evaluate_world(w);
            w.set_energy(ep.energy);
            w.set_pressure(ep.pressure);
        }
        StandardSimulation {
            worlds,
            ffm,
            moves,
            observers: ObserverSet::new(),
            iteration: 0,
            moves_per_iteration: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn crate::Observer>, lag_time: usize) {
        self.observers.add_observer(observer, lag_time);
    }

    /// Overrides the default moves-per-iteration (the total particle count).
    pub fn set_moves_per_iteration(&mut self, mpi: usize) {
        self.moves_per_iteration = Some(mpi);
    }

    /// Flag that cancels the run at the next iteration boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn worlds(&self) -> &WorldManager {
        &self.worlds
    }

    pub fn worlds_mut(&mut self) -> &mut WorldManager {
        &mut self.worlds
    }

    pub fn forcefields(&self) -> &ForceFieldManager {
        &self.ffm
    }

    pub fn moves_mut(&mut self) -> &mut MoveManager {
        &mut self.moves
    }

    pub fn acceptance_map(&self) -> Vec<(&'static str, f64)> {
        self.moves.acceptance_map()
    }

    fn current_mpi(&self) -> usize {
        self.moves_per_iteration.unwrap_or_else(|| {
            self.worlds
                .worlds()
                .iter()
                .map(|w| w.particle_count())
                .sum::<usize>()
                .max(1)
        })
    }

    /// Runs for a number of iterations (sweeps), notifying observers after
    /// each one.
    pub fn run(&mut self, iterations: usize) {
        info!("running Metropolis driver for {} iterations", iterations);
        for _ in 0..iterations {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop flag raised; ending run at iteration {}", self.iteration);
                break;
            }
            let mpi = self.current_mpi();
            for _ in 0..mpi {
                let mv = self.moves.select_random_move();
                mv.perform(&mut self.worlds, &self.ffm, MoveOverride::None);
            }
            self.iteration += 1;

            let acceptance = self.moves.acceptance_map();
            let state = SimState {
                iteration: self.iteration,
                worlds: self.worlds.worlds(),
                acceptance: &acceptance,
                dos: None,
            };
            self.observers.notify(&state);
        }
        self.observers.flush_all();
    }
}
