use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_system::{units, Energy, World, WorldManager};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trait_move::{decide, uniform_position, Move, MoveOverride, MoveStatistics};

/// Swaps the charges of two children of a randomly drawn composite.
/// Equal charges make the move a no-op that counts no attempt.
#[derive(Clone)]
pub struct AnnealChargeMove {
    species: Vec<u32>,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl AnnealChargeMove {
    pub fn new(species: Vec<u32>, seed: u64) -> AnnealChargeMove {
        AnnealChargeMove {
            species,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for AnnealChargeMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };
        if !self.species.is_empty() && !self.species.contains(&w.particle(p).species()) {
            return;
        }
        let children = w.particle(p).children().to_vec();
        if children.len() < 2 {
            return;
        }

        let c1 = children[self.rng.gen_range(0..children.len())];
        let mut c2 = children[self.rng.gen_range(0..children.len())];
        while c2 == c1 {
            c2 = children[self.rng.gen_range(0..children.len())];
        }
        let q1 = w.particle(c1).charge();
        let q2 = w.particle(c2).charge();
        if q1 == q2 {
            return;
        }

        let ei = ffm.evaluate_particle(w, p);
        w.set_charge(c1, q2);
        w.set_charge(c2, q1);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_charge(c1, q1);
            w.set_charge(c2, q2);
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
        let Some(p) = world.random_particle() else { return };
        if !self.species.is_empty() && !self.species.contains(&world.particle(p).species()) {
            return;
        }
        let children = world.particle(p).children().to_vec();
        if children.len() < 2 {
            return;
        }

        let c1 = children[self.rng.gen_range(0..children.len())];
        let mut c2 = children[self.rng.gen_range(0..children.len())];
        while c2 == c1 {
            c2 = children[self.rng.gen_range(0..children.len())];
        }
        let q1 = world.particle(c1).charge();
        let q2 = world.particle(c2).charge();
        if q1 == q2 {
            return;
        }

        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);
        world.set_charge(c1, q2);
        world.set_charge(c2, q1);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;

        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_charge(c1, q1);
            world.set_charge(c2, q2);
            world.increment_energy(-de);
            world.increment_pressure(ei.pressure - ef.pressure);
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
        "AnnealCharge"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Swaps the charges of two randomly drawn primitives; the energy change is
/// evaluated from the two particles' local energies.
#[derive(Clone)]
pub struct ChargeSwapMove {
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl ChargeSwapMove {
    pub fn new(seed: u64) -> ChargeSwapMove {
        ChargeSwapMove {
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for ChargeSwapMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        if w.primitive_count() < 2 {
            return;
        }
        let Some(p1) = w.random_primitive() else { return };
        let mut p2 = match w.random_primitive() {
            Some(p) => p,
            None => return,
        };
        while p2 == p1 {
            p2 = match w.random_primitive() {
                Some(p) => p,
                None => return,
            };
        }

        let q1 = w.particle(p1).charge();
        let q2 = w.particle(p2).charge();
        let ei = ffm.evaluate_particle(w, p1) + ffm.evaluate_particle(w, p2);
        w.set_charge(p1, q2);
        w.set_charge(p2, q1);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(w, p1) + ffm.evaluate_particle(w, p2);
        let de = ef.energy - ei.energy;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_charge(p1, q1);
            w.set_charge(p2, q2);
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
        if world.primitive_count() < 2 {
            return;
        }
        let Some(p1) = world.random_primitive() else { return };
        let mut p2 = match world.random_primitive() {
            Some(p) => p,
            None => return,
        };
        while p2 == p1 {
            p2 = match world.random_primitive() {
                Some(p) => p,
                None => return,
            };
        }

        let q1 = world.particle(p1).charge();
        let q2 = world.particle(p2).charge();
        let ei = ffm.evaluate_particle(world, p1) + ffm.evaluate_particle(world, p2);
        let opi = op.evaluate(world);
        world.set_charge(p1, q2);
        world.set_charge(p2, q1);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(world, p1) + ffm.evaluate_particle(world, p2);
        let de = ef.energy - ei.energy;

        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_charge(p1, q1);
            world.set_charge(p2, q2);
            world.increment_energy(-de);
            world.increment_pressure(ei.pressure - ef.pressure);
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
        "ChargeSwap"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Implicit-proton titration: toggles a random child of a drawn composite
/// between its protonated and deprotonated states, shifting its charge by
/// `$\pm q_H$` and adding `$\mp \mu$` to the acceptance exponent.
#[derive(Clone)]
pub struct AcidTitrationMove {
    species: Vec<u32>,
    proton_charge: f64,
    mu: f64,
    /// Whether bonded terms enter the energy difference.
    include_bonded: bool,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl AcidTitrationMove {
    pub fn new(species: Vec<u32>, proton_charge: f64, mu: f64, seed: u64) -> AcidTitrationMove {
        AcidTitrationMove {
            species,
            proton_charge,
            mu,
            include_bonded: true,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    pub fn set_include_bonded(&mut self, include: bool) {
        self.include_bonded = include;
    }

    fn effective_delta(&self, mut de: Energy) -> f64 {
        if !self.include_bonded {
            de.bonded = 0.0;
        }
        de.total()
    }
}

impl Move for AcidTitrationMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };
        if !self.species.contains(&w.particle(p).species()) {
            return;
        }
        let children = w.particle(p).children().to_vec();
        if children.is_empty() {
            return;
        }
        let child = children[self.rng.gen_range(0..children.len())];

        let old_charge = w.particle(child).charge();
        let was_protonated = w.particle(child).protonated();

        let ei = ffm.evaluate_particle(w, p);
        let adjusted_mu;
        if was_protonated {
            w.set_charge(child, old_charge - self.proton_charge);
            w.set_protonated(child, false);
            adjusted_mu = -self.mu;
        } else {
            w.set_charge(child, old_charge + self.proton_charge);
            w.set_protonated(child, true);
            adjusted_mu = self.mu;
        }
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;

        let kbt = units().kb * w.temperature();
        let pacc = ((-self.effective_delta(de) - adjusted_mu) / kbt).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_charge(child, old_charge);
            w.set_protonated(child, was_protonated);
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
        let Some(p) = world.random_particle() else { return };
        if !self.species.contains(&world.particle(p).species()) {
            return;
        }
        let children = world.particle(p).children().to_vec();
        if children.is_empty() {
            return;
        }
        let child = children[self.rng.gen_range(0..children.len())];

        let old_charge = world.particle(child).charge();
        let was_protonated = world.particle(child).protonated();

        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);
        let adjusted_mu;
        if was_protonated {
            world.set_charge(child, old_charge - self.proton_charge);
            world.set_protonated(child, false);
            adjusted_mu = -self.mu;
        } else {
            world.set_charge(child, old_charge + self.proton_charge);
            world.set_protonated(child, true);
            adjusted_mu = self.mu;
        }
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;
        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let kbt = units().kb * world.temperature();
        let mut pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        pacc *= (-adjusted_mu / kbt).exp();

        if !decide(pacc, &mut self.rng, ov) {
            world.set_charge(child, old_charge);
            world.set_protonated(child, was_protonated);
            world.increment_energy(-de);
            world.increment_pressure(ei.pressure - ef.pressure);
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
        "AcidTitration"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Forward/reverse acid dissociation following chemical-reaction Monte
/// Carlo: the forward branch deprotonates a random child of an acid
/// composite and inserts a counter-ion at a uniform position; the reverse
/// branch re-protonates and deletes an ion. The chemical drive is
/// `$\mu = k_B T \ln(10) (\mathrm{pH} - \mathrm{p}K_o)$`.
#[derive(Clone)]
pub struct AcidReactionMove {
    acid_species: Vec<u32>,
    ion_species: u32,
    proton_charge: f64,
    ph: f64,
    pko: f64,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl AcidReactionMove {
    pub fn new(
        acid_species: Vec<u32>,
        ion_species: u32,
        proton_charge: f64,
        ph: f64,
        pko: f64,
        seed: u64,
    ) -> AcidReactionMove {
        AcidReactionMove {
            acid_species,
            ion_species,
            proton_charge,
            ph,
            pko,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    fn reaction_mu(&self, w: &World) -> f64 {
        units().kb * w.temperature() * 10f64.ln() * (self.ph - self.pko)
    }
}

impl Move for AcidReactionMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let forward = self.rng.gen_range(0.0..1.0) < 0.5;
        let kbt = units().kb * w.temperature();
        let beta = 1.0 / kbt;
        let mu = self.reaction_mu(w);
        let v = w.volume();
        let lambda = w.wavelength(self.ion_species);
        let lambda3 = lambda * lambda * lambda;

        let Some(p) = w.random_particle_from_list(&self.acid_species) else { return };
        let children = w.particle(p).children().to_vec();
        if children.is_empty() {
            return;
        }
        let child = children[self.rng.gen_range(0..children.len())];
        let old_charge = w.particle(child).charge();
        let was_protonated = w.particle(child).protonated();

        if forward {
            if !was_protonated {
                return;
            }
            let ei_acid = ffm.evaluate_particle(w, p);
            w.set_charge(child, -self.proton_charge);
            w.set_protonated(child, false);
            let ef_acid = ffm.evaluate_particle(w, p);

            let Some(ion) = w.unstash(self.ion_species) else {
                // No counter-ion prototype registered; revert silently.
                w.set_charge(child, old_charge);
                w.set_protonated(child, was_protonated);
                return;
            };
            let pos = uniform_position(&mut self.rng, w);
            w.set_position(ion, pos);
            w.update_particle_neighbors(ion);
            let e_ion = ffm.evaluate_particle(w, ion);
            self.stats.performed += 1;

            let n_after = w.species_count(self.ion_species) as f64;
            let de = (ef_acid.energy - ei_acid.energy) + e_ion.energy;
            let prefactor = v / (lambda3 * n_after);
            let pacc = prefactor * (beta * mu - beta * de.total()).exp();

            if decide(pacc, &mut self.rng, ov) {
                w.increment_energy(de);
                w.increment_pressure((ef_acid.pressure - ei_acid.pressure) + e_ion.pressure);
            } else {
                w.stash_particle(ion);
                w.set_charge(child, old_charge);
                w.set_protonated(child, was_protonated);
                self.stats.rejected += 1;
            }
        } else {
            if was_protonated {
                return;
            }
            let n_ion = w.species_count(self.ion_species) as f64;
            let Some(ion) = w.random_particle_by_species(self.ion_species) else { return };

            // Mirror the forward branch: acid energies are taken without
            // the ion present, the cross term lives in the ion's energy.
            let e_ion = ffm.evaluate_particle(w, ion);
            let ion_pos = w.particle(ion).position();
            w.stash_particle(ion);
            let ei_acid = ffm.evaluate_particle(w, p);
            w.set_charge(child, old_charge + self.proton_charge);
            w.set_protonated(child, true);
            let ef_acid = ffm.evaluate_particle(w, p);
            self.stats.performed += 1;

            let de = (ef_acid.energy - ei_acid.energy) - e_ion.energy;
            let prefactor = lambda3 * n_ion / v;
            let pacc = prefactor * (-beta * mu - beta * de.total()).exp();

            if decide(pacc, &mut self.rng, ov) {
                w.increment_energy(de);
                w.increment_pressure((ef_acid.pressure - ei_acid.pressure) - e_ion.pressure);
            } else {
                w.set_charge(child, old_charge);
                w.set_protonated(child, false);
                if let Some(restored) = w.unstash(self.ion_species) {
                    w.set_position(restored, ion_pos);
                    w.update_particle_neighbors(restored);
                }
                self.stats.rejected += 1;
            }
        }
    }

    fn perform_dos(
        &mut self,
        _world: &mut World,
        _ffm: &ForceFieldManager,
        _op: &mut dyn DosOrderParameter,
        _ov: MoveOverride,
    ) {
        log::error!("acid reaction move does not support the flat-histogram path");
    }

    fn acceptance_ratio(&self) -> f64 {
        self.stats.acceptance_ratio()
    }

    fn reset_acceptance_ratio(&mut self) {
        self.stats.reset();
    }

    fn name(&self) -> &'static str {
        "AcidReaction"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
