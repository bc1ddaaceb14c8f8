use log::error;
use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_system::{units, World, WorldManager};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trait_move::{decide, Move, MoveOverride, MoveStatistics};

/// Isothermal-isobaric volume move: proposes
/// `$\ln V' = \ln V + \mathcal{U}(-\tfrac{1}{2},\tfrac{1}{2})\, \delta v$`
/// and rescales the box with particle scaling. Follows Algorithm 11 in
/// Frenkel & Smit.
#[derive(Clone)]
pub struct VolumeScaleMove {
    external_pressure: f64,
    dvmax: f64,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl VolumeScaleMove {
    pub fn new(external_pressure: f64, dvmax: f64, seed: u64) -> VolumeScaleMove {
        VolumeScaleMove {
            external_pressure,
            dvmax,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    fn propose_volume(&mut self, v: f64) -> f64 {
        ((v.ln()) + (self.rng.gen_range(0.0..1.0) - 0.5) * self.dvmax).exp()
    }
}

impl Move for VolumeScaleMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);

        let vi = w.volume();
        let ei = w.energy();
        let n = w.particle_count() as f64;

        let vf = self.propose_volume(vi);
        w.set_volume(vf, true);
        self.stats.performed += 1;

        let ef = ffm.evaluate_world(w);
        let de = ef.energy - ei;

        let beta = 1.0 / (units().kb * w.temperature());
        let arg = -beta * (de.total() + self.external_pressure * (vf - vi))
            + (n + 1.0) * (vf / vi).ln();
        let pacc = arg.exp();

        if decide(pacc, &mut self.rng, ov) {
            w.set_energy(ef.energy);
            w.set_pressure(ef.pressure);
        } else {
            w.set_volume(vi, true);
            self.stats.rejected += 1;
        }
    }

    fn perform_dos(
        &mut self,
        world: &mut World,
        ffm: &ForceFieldManager,
        op: &mut dyn DosOrderParameter,
        ov: MoveOverride,
    ) {
        let vi = world.volume();
        let ei = world.energy();
        let pi = world.pressure();
        let n = world.particle_count() as f64;
        let opi = op.evaluate(world);

        let vf = self.propose_volume(vi);
        world.set_volume(vf, true);
        self.stats.performed += 1;

        let ef = ffm.evaluate_world(world);
        world.set_energy(ef.energy);
        world.set_pressure(ef.pressure);
        let opf = op.evaluate(world);

        let beta = 1.0 / (units().kb * world.temperature());
        let prefactor = (-beta * self.external_pressure * (vf - vi)
            + (n + 1.0) * (vf / vi).ln())
        .exp();
        let pacc = op.acceptance_probability(&ei, &ef.energy, opi, opf, world) * prefactor;

        if !decide(pacc, &mut self.rng, ov) {
            world.set_volume(vi, true);
            world.set_energy(ei);
            world.set_pressure(pi);
            self.stats.rejected += 1;
            op.evaluate(world);
        }
    }

    fn acceptance_ratio(&self) -> f64 {
        self.stats.acceptance_ratio()
    }

    fn reset_acceptance_ratio(&mut self) {
        self.stats.reset();
    }

    fn name(&self) -> &'static str {
        "VolumeScale"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Gibbs-ensemble volume exchange between two worlds at fixed total volume:
/// proposes `$\ln(V_1/V_2)$` uniformly, rescales both boxes isotropically
/// and re-evaluates both full energies. Follows Algorithm 18 in
/// Frenkel & Smit.
#[derive(Clone)]
pub struct VolumeSwapMove {
    dvmax: f64,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl VolumeSwapMove {
    pub fn new(dvmax: f64, seed: u64) -> VolumeSwapMove {
        VolumeSwapMove {
            dvmax,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for VolumeSwapMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some((i, j)) = wm.random_world_pair() else {
            error!("cannot perform a volume swap with fewer than two worlds");
            return;
        };

        let (w1, w2) = wm.pair_mut(i, j);

        let vi1 = w1.volume();
        let vi2 = w2.volume();
        let ei1 = w1.energy();
        let ei2 = w2.energy();
        let n1 = w1.particle_count() as f64;
        let n2 = w2.particle_count() as f64;

        let total = vi1 + vi2;
        let lnvn = (vi1 / vi2).ln() + (self.rng.gen_range(0.0..1.0) - 0.5) * self.dvmax;
        let vf1 = total * lnvn.exp() / (1.0 + lnvn.exp());
        let vf2 = total - vf1;

        w1.set_volume(vf1, true);
        w2.set_volume(vf2, true);
        self.stats.performed += 1;

        let ef1 = ffm.evaluate_world(w1);
        let ef2 = ffm.evaluate_world(w2);
        let de1 = ef1.energy.total() - ei1.total();
        let de2 = ef2.energy.total() - ei2.total();

        let beta = 1.0 / (units().kb * w1.temperature());
        let arg = -beta * (de1 + de2)
            + (n1 + 1.0) * (vf1 / vi1).ln()
            + (n2 + 1.0) * (vf2 / vi2).ln();
        let pacc = arg.exp();

        if decide(pacc, &mut self.rng, ov) {
            w1.set_energy(ef1.energy);
            w1.set_pressure(ef1.pressure);
            w2.set_energy(ef2.energy);
            w2.set_pressure(ef2.pressure);
        } else {
            w1.set_volume(vi1, true);
            w2.set_volume(vi2, true);
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
        error!("volume swap requires two worlds and does not support the flat-histogram path");
    }

    fn acceptance_ratio(&self) -> f64 {
        self.stats.acceptance_ratio()
    }

    fn reset_acceptance_ratio(&mut self) {
        self.stats.reset();
    }

    fn name(&self) -> &'static str {
        "VolumeSwap"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
