use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_numerical::{rotation_about_axis, Axis};
use mcshell_system::{units, EPTuple, ParticleRef, World, WorldManager};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::rotate::rotate_particle;
use crate::trait_move::{decide, uniform_position, Move, MoveOverride, MoveStatistics};

/// Places an unstashed particle at a uniform position with a random
/// orientation and rebuilds its neighbor entries.
fn place_randomly(w: &mut World, p: ParticleRef, rng: &mut SmallRng) {
    let pos = uniform_position(rng, w);
    w.set_position(p, pos);
    let axis = Axis::random(rng);
    let angle = (4.0 * rng.gen_range(0.0..1.0) - 2.0) * PI;
    rotate_particle(w, p, &rotation_about_axis(axis, angle));
    w.update_particle_neighbors(p);
}

/// Grand-canonical insertion from the world stash.
///
/// Single mode inserts one particle of a uniformly chosen registered
/// species; multi mode inserts one of every registered species atomically.
/// Acceptance per inserted particle of species `s` carries the prefactor
/// `$V / (\lambda_s^3 (N_s + 1)) \, e^{\beta \mu_s}$`.
#[derive(Clone)]
pub struct InsertParticleMove {
    species: Vec<u32>,
    multi_insert: bool,
    op_prefactor: bool,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl InsertParticleMove {
    pub fn new(species: Vec<u32>, multi_insert: bool, seed: u64) -> InsertParticleMove {
        assert!(!species.is_empty(), "insertion move needs at least one species");
        InsertParticleMove {
            species,
            multi_insert,
            op_prefactor: true,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    /// Toggles the ensemble prefactor on the flat-histogram path.
    pub fn set_order_parameter_prefactor(&mut self, flag: bool) {
        self.op_prefactor = flag;
    }

    fn chosen_species(&mut self) -> Vec<u32> {
        if self.multi_insert {
            self.species.clone()
        } else {
            vec![self.species[self.rng.gen_range(0..self.species.len())]]
        }
    }

    /// Unstashes, places and evaluates the chosen species one at a time so
    /// no pair between fresh particles is counted twice. Returns the placed
    /// refs, the ensemble prefactor and the accumulated energy.
    fn insert_all(
        &mut self,
        w: &mut World,
        ffm: &ForceFieldManager,
        species: &[u32],
    ) -> Option<(Vec<ParticleRef>, f64, EPTuple)> {
        let beta = 1.0 / (units().kb * w.temperature());
        let v = w.volume();
        let mut placed = Vec::with_capacity(species.len());
        let mut prefactor = 1.0;
        let mut ef = EPTuple::default();

        for &s in species {
            let Some(p) = w.unstash(s) else {
                for &q in placed.iter().rev() {
                    w.stash_particle(q);
                }
                return None;
            };
            place_randomly(w, p, &mut self.rng);

            let n = w.species_count(s) as f64;
            let mu = w.chemical_potential(s);
            let lambda = w.wavelength(s);
            prefactor *= v / (lambda * lambda * lambda * n) * (beta * mu).exp();

            ef += ffm.evaluate_particle(w, p);
            placed.push(p);
        }
        Some((placed, prefactor, ef))
    }
}

impl Move for InsertParticleMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);

        let species = self.chosen_species();
        let Some((placed, prefactor, ef)) = self.insert_all(w, ffm, &species) else { return };
        self.stats.performed += 1;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = prefactor * (-beta * ef.energy.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(ef.energy);
            w.increment_pressure(ef.pressure);
        } else {
            for &p in placed.iter().rev() {
                w.stash_particle(p);
            }
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
        let ei = world.energy();
        let opi = op.evaluate(world);

        let species = self.chosen_species();
        let Some((placed, prefactor, ef)) = self.insert_all(world, ffm, &species) else { return };
        self.stats.performed += 1;

        world.increment_energy(ef.energy);
        world.increment_pressure(ef.pressure);
        let opf = op.evaluate(world);

        let e_after = world.energy();
        let mut pacc = op.acceptance_probability(&ei, &e_after, opi, opf, world);
        if self.op_prefactor {
            pacc *= prefactor;
        }

        if !decide(pacc, &mut self.rng, ov) {
            for &p in placed.iter().rev() {
                world.stash_particle(p);
            }
            world.increment_energy(-ef.energy);
            world.increment_pressure(-ef.pressure);
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
        "InsertParticle"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Grand-canonical deletion of a random particle of a listed species;
/// accepted particles return to the stash. Acceptance carries
/// `$\lambda^3 N / V \, e^{\beta(U_p - \mu)}$` where `$U_p$` is the
/// particle's local energy.
#[derive(Clone)]
pub struct DeleteParticleMove {
    species: Vec<u32>,
    op_prefactor: bool,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl DeleteParticleMove {
    pub fn new(species: Vec<u32>, seed: u64) -> DeleteParticleMove {
        assert!(!species.is_empty(), "deletion move needs at least one species");
        DeleteParticleMove {
            species,
            op_prefactor: true,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    /// Toggles the ensemble prefactor on the flat-histogram path.
    pub fn set_order_parameter_prefactor(&mut self, flag: bool) {
        self.op_prefactor = flag;
    }
}

impl Move for DeleteParticleMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);

        let s = self.species[self.rng.gen_range(0..self.species.len())];
        if w.species_count(s) == 0 {
            return;
        }
        let Some(p) = w.random_particle_by_species(s) else { return };

        let v = w.volume();
        let mu = w.chemical_potential(s);
        let lambda = w.wavelength(s);
        let n = w.species_count(s) as f64;

        let ei = ffm.evaluate_particle(w, p);
        self.stats.performed += 1;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (lambda * lambda * lambda * n) / v * (beta * (ei.energy.total() - mu)).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.stash_particle(p);
            w.increment_energy(-ei.energy);
            w.increment_pressure(-ei.pressure);
        } else {
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
        let s = self.species[self.rng.gen_range(0..self.species.len())];
        if world.species_count(s) == 0 {
            return;
        }
        let Some(p) = world.random_particle_by_species(s) else { return };

        let v = world.volume();
        let mu = world.chemical_potential(s);
        let lambda = world.wavelength(s);
        let n = world.species_count(s) as f64;

        let ei = ffm.evaluate_particle(world, p);
        let e_before = world.energy();
        let opi = op.evaluate(world);
        let pos = world.particle(p).position();

        world.stash_particle(p);
        self.stats.performed += 1;
        world.increment_energy(-ei.energy);
        world.increment_pressure(-ei.pressure);
        let opf = op.evaluate(world);
        let e_after = world.energy();

        let mut pacc = op.acceptance_probability(&e_before, &e_after, opi, opf, world);
        if self.op_prefactor {
            let beta = 1.0 / (units().kb * world.temperature());
            pacc *= (lambda * lambda * lambda * n) / v * (-beta * mu).exp();
        }

        if !decide(pacc, &mut self.rng, ov) {
            if let Some(restored) = world.unstash(s) {
                world.set_position(restored, pos);
                world.update_particle_neighbors(restored);
            }
            world.increment_energy(ei.energy);
            world.increment_pressure(ei.pressure);
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
        "DeleteParticle"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Widom test-particle insertion: accumulates
/// `$\langle e^{-\beta \Delta U} \rangle$` from ghost insertions and writes
/// `$\mu_{ex} = -k_B T \ln \langle e^{-\beta \Delta U} \rangle$` into the
/// world's per-species chemical potential. The particle count is never
/// modified.
#[derive(Clone)]
pub struct WidomInsertionMove {
    species: Vec<u32>,
    sum_boltzmann: f64,
    samples: u64,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl WidomInsertionMove {
    pub fn new(species: Vec<u32>, seed: u64) -> WidomInsertionMove {
        assert!(!species.is_empty(), "Widom move needs at least one species");
        WidomInsertionMove {
            species,
            sum_boltzmann: 0.0,
            samples: 0,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    /// The running excess chemical potential estimate.
    pub fn excess_chemical_potential(&self, kbt: f64) -> f64 {
        -kbt * (self.sum_boltzmann / self.samples as f64).ln()
    }
}

impl Move for WidomInsertionMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, _ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);

        let kbt = units().kb * w.temperature();
        let beta = 1.0 / kbt;

        let mut ghosts = Vec::with_capacity(self.species.len());
        let mut ef = EPTuple::default();
        for &s in &self.species {
            let Some(p) = w.unstash(s) else {
                for &q in ghosts.iter().rev() {
                    w.stash_particle(q);
                }
                return;
            };
            place_randomly(w, p, &mut self.rng);
            ef += ffm.evaluate_particle(w, p);
            ghosts.push(p);
        }

        self.sum_boltzmann += (-beta * ef.energy.total()).exp();
        self.samples += 1;
        self.stats.performed += 1;

        let mu = self.excess_chemical_potential(kbt);
        for &p in ghosts.iter().rev() {
            let s = w.particle(p).species();
            w.set_chemical_potential(s, mu);
            w.stash_particle(p);
        }
    }

    fn perform_dos(
        &mut self,
        _world: &mut World,
        _ffm: &ForceFieldManager,
        _op: &mut dyn DosOrderParameter,
        _ov: MoveOverride,
    ) {
        log::error!("Widom insertion does not support the flat-histogram path");
    }

    fn acceptance_ratio(&self) -> f64 {
        self.stats.acceptance_ratio()
    }

    fn reset_acceptance_ratio(&mut self) {
        self.stats.reset();
        self.sum_boltzmann = 0.0;
        self.samples = 0;
    }

    fn name(&self) -> &'static str {
        "WidomInsertion"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
