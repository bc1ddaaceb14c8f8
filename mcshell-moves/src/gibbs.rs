use log::error;
use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_system::{units, World, WorldManager};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trait_move::{decide, Move, MoveOverride, MoveStatistics};

/// Gibbs-ensemble particle transfer: removes a random particle from one
/// world and inserts it at a uniform position in another, accepted with
/// `$P = \min(1, \frac{N_1 V_2}{(N_2 + 1) V_1} e^{-\beta \Delta U})$`.
///
/// The two worlds are always distinct; an empty source world makes the
/// move a no-op with no attempt counted.
#[derive(Clone)]
pub struct ParticleSwapMove {
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl ParticleSwapMove {
    pub fn new(seed: u64) -> ParticleSwapMove {
        ParticleSwapMove {
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for ParticleSwapMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some((i, j)) = wm.random_world_pair() else {
            error!("cannot perform a particle swap with fewer than two worlds");
            return;
        };
        let (w1, w2) = wm.pair_mut(i, j);
        let Some(p) = w1.random_particle() else { return };

        let n1 = w1.particle_count() as f64;
        let n2 = w2.particle_count() as f64;
        let v1 = w1.volume();
        let v2 = w2.volume();

        let ei = ffm.evaluate_particle(w1, p);
        let proto = w1.extract_particle(p);

        let u = nalgebra::Vector3::new(
            self.rng.gen_range(0.0..1.0),
            self.rng.gen_range(0.0..1.0),
            self.rng.gen_range(0.0..1.0),
        );
        let pos = w2.h_matrix() * u;
        let q = w2.add_particle(&proto.clone().with_position(pos));
        w2.update_particle_neighbors(q);
        let ef = ffm.evaluate_particle(w2, q);
        self.stats.performed += 1;

        let beta = 1.0 / (units().kb * w1.temperature());
        let pacc = (n1 * v2) / ((n2 + 1.0) * v1)
            * (-beta * (ef.energy.total() - ei.energy.total())).exp();

        if decide(pacc, &mut self.rng, ov) {
            w1.increment_energy(-ei.energy);
            w1.increment_pressure(-ei.pressure);
            w2.increment_energy(ef.energy);
            w2.increment_pressure(ef.pressure);
        } else {
            w2.remove_particle(q);
            let restored = w1.add_particle(&proto);
            w1.update_particle_neighbors(restored);
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
        error!("particle swap requires two worlds and does not support the flat-histogram path");
    }

    fn acceptance_ratio(&self) -> f64 {
        self.stats.acceptance_ratio()
    }

    fn reset_acceptance_ratio(&mut self) {
        self.stats.reset();
    }

    fn name(&self) -> &'static str {
        "ParticleSwap"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
