use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_moves::{MoveManager, MoveOverride};
use mcshell_system::World;

use crate::trait_observer::{DosState, ObserverSet, SimState};

/// Wang-Landau style density-of-states driver over a single world.
///
/// A sweep repeats iterations until the visit histogram is flat to the
/// target (minimum bin count over mean bin count at least the target
/// fraction); every attempted move deposits the convergence factor into
/// the log-DOS at the current order-parameter bin. On reaching flatness
/// the counts are reset and the convergence factor is multiplied by the
/// reduction factor. `run(n)` performs `n` such reductions.
///
/// Wang & Landau, Phys. Rev. Lett. 86, 2050 (2001).
pub struct DosSimulation {
    world: World,
    ffm: ForceFieldManager,
    moves: MoveManager,
    op: Box<dyn DosOrderParameter>,
    observers: ObserverSet,
    convergence_factor: f64,
    reduction_factor: f64,
    target_flatness: f64,
    histogram_reset_frequency: usize,
    iteration: usize,
    flatness: f64,
    op_value: f64,
    stop: Arc<AtomicBool>,
}

impl DosSimulation {
    /// Builds the driver and seeds the world's accumulated energy and
    /// pressure from a full evaluation.
    pub fn new(
        mut world: World,
        ffm: ForceFieldManager,
        moves: MoveManager,
        op: Box<dyn DosOrderParameter>,
    ) -> DosSimulation {
        let ep = ffm.evaluate_world(&world);
        world.set_energy(ep.energy);
        world.set_pressure(ep.pressure);
        DosSimulation {
            world,
            ffm,
            moves,
            op,
            observers: ObserverSet::new(),
            convergence_factor: 1.0,
            reduction_factor: 0.5,
            target_flatness: 0.8,
            histogram_reset_frequency: 0,
            iteration: 0,
            flatness: 0.0,
            op_value: 0.0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn crate::Observer>, lag_time: usize) {
        self.observers.add_observer(observer, lag_time);
    }

    pub fn set_target_flatness(&mut self, target: f64) {
        self.target_flatness = target;
    }

    pub fn target_flatness(&self) -> f64 {
        self.target_flatness
    }

    pub fn set_convergence_factor(&mut self, f: f64) {
        self.convergence_factor = f;
    }

    pub fn convergence_factor(&self) -> f64 {
        self.convergence_factor
    }

    /// Multiplier applied to the convergence factor after each flat sweep.
    pub fn set_reduction_factor(&mut self, factor: f64) {
        self.reduction_factor = factor;
    }

    pub fn reduction_factor(&self) -> f64 {
        self.reduction_factor
    }

    /// Resets histogram counts every `n` iterations inside a sweep; zero
    /// disables the periodic reset.
    pub fn set_histogram_reset_frequency(&mut self, n: usize) {
        self.histogram_reset_frequency = n;
    }

    pub fn flatness(&self) -> f64 {
        self.flatness
    }

    pub fn op_value(&self) -> f64 {
        self.op_value
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn order_parameter(&self) -> &dyn DosOrderParameter {
        self.op.as_ref()
    }

    pub fn order_parameter_mut(&mut self) -> &mut dyn DosOrderParameter {
        self.op.as_mut()
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn acceptance_map(&self) -> Vec<(&'static str, f64)> {
        self.moves.acceptance_map()
    }

    /// One iteration: moves-per-iteration biased moves with log-DOS
    /// deposits, then flatness bookkeeping and observer notification.
    pub(crate) fn sweep_iteration(&mut self) {
        self.moves.reset_acceptances();
        let mpi = self.world.particle_count().max(1);
        for _ in 0..mpi {
            let mv = self.moves.select_random_move();
            mv.perform_dos(&mut self.world, &self.ffm, self.op.as_mut(), MoveOverride::None);

            self.op_value = self.op.evaluate(&mut self.world);
            let f = self.convergence_factor;
            let hist = self.op.histogram_mut();
            if let Some(bin) = hist.record(self.op_value) {
                hist.add_value(bin, f);
            }
        }

        self.iteration += 1;
        if self.histogram_reset_frequency != 0
            && self.iteration % self.histogram_reset_frequency == 0
        {
            self.op.histogram_mut().reset_counts();
        }
        self.flatness = self.op.histogram().flatness();

        let acceptance = self.moves.acceptance_map();
        let state = SimState {
            iteration: self.iteration,
            worlds: std::slice::from_ref(&self.world),
            acceptance: &acceptance,
            dos: Some(DosState {
                flatness: self.flatness,
                convergence_factor: self.convergence_factor,
                op_value: self.op_value,
                histogram: self.op.histogram(),
            }),
        };
        self.observers.notify(&state);
    }

    /// Iterates until the histogram reaches the target flatness.
    pub(crate) fn sweep_to_flatness(&mut self) {
        self.flatness = self.op.histogram().flatness();
        while self.flatness < self.target_flatness {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }
            self.sweep_iteration();
        }
    }

    /// Multiplies the convergence factor by the reduction factor.
    pub fn reduce_convergence_factor(&mut self) {
        self.convergence_factor *= self.reduction_factor;
    }

    /// Runs the Wang-Landau schedule for a number of convergence-factor
    /// reductions.
    pub fn run(&mut self, reductions: usize) {
        info!("running DOS driver for {} convergence reductions", reductions);
        for i in 0..reductions {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop flag raised; ending DOS run after {} reductions", i);
                break;
            }
            self.sweep_to_flatness();
            self.op.histogram_mut().reset_counts();
            self.reduce_convergence_factor();
        }
        self.observers.flush_all();
    }
}
