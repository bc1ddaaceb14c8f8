use log::error;
use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_numerical::random_unit_vector;
use mcshell_system::{units, ParticleRef, World, WorldManager};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::rotate::PoseSnapshot;
use crate::trait_move::{decide, uniform_position, Move, MoveOverride, MoveStatistics};

/// Configurational-bias regrowth of a chain molecule.
///
/// The old chain is retraced to accumulate its Rosenbluth weight
/// `$W_{old} = \prod_b \sum_k e^{-\beta U_{k}}$`; the new chain places each
/// bead by drawing `k` candidates on a spherical shell of radius
/// `$[r_{min}, r_{max}]$` about the last placed bead and selecting one with
/// probability `$e^{-\beta U}/\sum$`. Acceptance is
/// `$\min(1, W_{new}/W_{old})$`; the trial energies carry the full local
/// interaction of each bead.
#[derive(Clone)]
pub struct CbmcMove {
    trials: usize,
    rmin: f64,
    rmax: f64,
    species: Vec<u32>,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl CbmcMove {
    /// # Arguments
    /// * `trials` - number of trial directions per bond step
    /// * `rmin`, `rmax` - bond-length shell for candidate placement
    /// * `species` - molecule species eligible for regrowth; empty means any
    pub fn new(trials: usize, rmin: f64, rmax: f64, species: Vec<u32>, seed: u64) -> CbmcMove {
        assert!(trials > 0, "CBMC needs at least one trial direction");
        assert!(rmax >= rmin && rmin > 0.0, "invalid CBMC bond shell");
        CbmcMove {
            trials,
            rmin,
            rmax,
            species,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    /// Runs one Rosenbluth pass over the chain. With `retrace` the first
    /// trial of every bead is its current position and that position is
    /// kept; otherwise a trial is selected by roulette on the Boltzmann
    /// weights.
    fn rosenbluth(
        &mut self,
        w: &mut World,
        ffm: &ForceFieldManager,
        chain: &[ParticleRef],
        retrace: bool,
    ) -> f64 {
        let beta = 1.0 / (units().kb * w.temperature());
        let mut weight = 1.0;

        for (idx, &bead) in chain.iter().enumerate() {
            let current = w.particle(bead).position();
            let anchor = if idx == 0 {
                None
            } else {
                Some(w.particle(chain[idx - 1]).position())
            };

            let mut trial_weights = Vec::with_capacity(self.trials);
            let mut trial_positions = Vec::with_capacity(self.trials);
            for t in 0..self.trials {
                let pos = if retrace && t == 0 {
                    current
                } else {
                    match anchor {
                        None => uniform_position(&mut self.rng, w),
                        Some(a) => {
                            let r = self.rmin
                                + self.rng.gen_range(0.0..1.0) * (self.rmax - self.rmin);
                            let mut p = a + r * random_unit_vector(&mut self.rng);
                            w.apply_periodic(&mut p);
                            p
                        }
                    }
                };
                w.set_position(bead, pos);
                w.update_particle_neighbors(bead);
                let energy = ffm.evaluate_particle(w, bead).energy.total();
                trial_weights.push((-beta * energy).exp());
                trial_positions.push(pos);
            }

            let sum: f64 = trial_weights.iter().sum();
            weight *= sum;

            let chosen = if retrace || sum == 0.0 {
                0
            } else {
                let ticket = self.rng.gen_range(0.0..1.0) * sum;
                let mut acc = 0.0;
                let mut pick = self.trials - 1;
                for (t, &tw) in trial_weights.iter().enumerate() {
                    acc += tw;
                    if ticket < acc {
                        pick = t;
                        break;
                    }
                }
                pick
            };
            w.set_position(bead, trial_positions[chosen]);
            w.update_particle_neighbors(bead);
        }
        weight
    }
}

impl Move for CbmcMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);

        let drawn = if self.species.is_empty() {
            w.random_particle()
        } else {
            w.random_particle_from_list(&self.species)
        };
        let Some(p) = drawn else { return };
        let chain = w.particle(p).children().to_vec();
        if chain.len() < 2 {
            return;
        }

        let snapshot = PoseSnapshot::take(w, p);
        let ei = ffm.evaluate_particle(w, p);

        let w_old = self.rosenbluth(w, ffm, &chain, true);
        let w_new = self.rosenbluth(w, ffm, &chain, false);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;

        let pacc = if w_old > 0.0 { w_new / w_old } else { 0.0 };

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
            w.check_neighbor_update(p);
        } else {
            snapshot.restore(w);
            w.update_particle_neighbors(p);
            self.stats.rejected += 1;
        }
    }

    fn perform_dos(
        &mut self,
        _world: &mut World,
        _ffm: &ForceFieldManager,
        _op: &mut dyn DosOrderParameter,
        _ov: MoveOverride,
    ) {
        error!("configurational-bias regrowth does not support the flat-histogram path");
    }

    fn acceptance_ratio(&self) -> f64 {
        self.stats.acceptance_ratio()
    }

    fn reset_acceptance_ratio(&mut self) {
        self.stats.reset();
    }

    fn name(&self) -> &'static str {
        "Cbmc"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
