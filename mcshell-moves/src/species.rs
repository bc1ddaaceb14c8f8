use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_system::{species_count, units, ParticleRef, World, WorldManager};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trait_move::{decide, Move, MoveOverride, MoveStatistics};

/// Swaps the species identifiers of two primitives, optionally also their
/// mass and charge. Intended for lattice and single-site systems.
///
/// The pair can be restricted to one particle of each of two given species,
/// or drawn freely; a particle is never swapped with itself.
#[derive(Clone)]
pub struct SpeciesSwapMove {
    restriction: Option<(u32, u32)>,
    swap_properties: bool,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl SpeciesSwapMove {
    pub fn new(restriction: Option<(u32, u32)>, swap_properties: bool, seed: u64) -> SpeciesSwapMove {
        SpeciesSwapMove {
            restriction,
            swap_properties,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    fn draw_pair(&mut self, w: &mut World) -> Option<(ParticleRef, ParticleRef)> {
        match self.restriction {
            Some((a, b)) => {
                let p1 = w.random_particle_by_species(a)?;
                let p2 = w.random_particle_by_species(b)?;
                if p1 == p2 {
                    return None;
                }
                Some((p1, p2))
            }
            None => {
                if w.primitive_count() < 2 {
                    return None;
                }
                let p1 = w.random_primitive()?;
                let mut p2 = w.random_primitive()?;
                while p2 == p1 {
                    p2 = w.random_primitive()?;
                }
                Some((p1, p2))
            }
        }
    }

    fn swap(&self, w: &mut World, p1: ParticleRef, p2: ParticleRef) {
        let s1 = w.particle(p1).species();
        let s2 = w.particle(p2).species();
        w.set_species(p1, s2);
        w.set_species(p2, s1);
        if self.swap_properties {
            let q1 = w.particle(p1).charge();
            let q2 = w.particle(p2).charge();
            w.set_charge(p1, q2);
            w.set_charge(p2, q1);
            let m1 = w.particle(p1).mass();
            let m2 = w.particle(p2).mass();
            w.set_mass(p1, m2);
            w.set_mass(p2, m1);
        }
    }
}

impl Move for SpeciesSwapMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some((p1, p2)) = self.draw_pair(w) else { return };

        let ei = ffm.evaluate_particle(w, p1) + ffm.evaluate_particle(w, p2);
        self.swap(w, p1, p2);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(w, p1) + ffm.evaluate_particle(w, p2);
        let de = ef.energy - ei.energy;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            self.swap(w, p1, p2);
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
        let Some((p1, p2)) = self.draw_pair(world) else { return };

        let ei = ffm.evaluate_particle(world, p1) + ffm.evaluate_particle(world, p2);
        let opi = op.evaluate(world);
        self.swap(world, p1, p2);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(world, p1) + ffm.evaluate_particle(world, p2);
        let de = ef.energy - ei.energy;

        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            self.swap(world, p1, p2);
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
        "SpeciesSwap"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Reassigns a random particle's species to a random element of an allowed
/// species list.
#[derive(Clone)]
pub struct RandomIdentityMove {
    species: Vec<u32>,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl RandomIdentityMove {
    pub fn new(species: Vec<u32>, seed: u64) -> RandomIdentityMove {
        assert!(!species.is_empty(), "identity move needs at least one species");
        RandomIdentityMove {
            species,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for RandomIdentityMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };

        let old = w.particle(p).species();
        let new = self.species[self.rng.gen_range(0..self.species.len())];

        let ei = ffm.evaluate_particle(w, p);
        w.set_species(p, new);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_species(p, old);
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

        let old = world.particle(p).species();
        let new = self.species[self.rng.gen_range(0..self.species.len())];

        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);
        world.set_species(p, new);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;

        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_species(p, old);
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
        "RandomIdentity"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Reassigns a random particle's species to a uniform draw over every
/// interned species.
#[derive(Clone)]
pub struct IdentityChangeMove {
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl IdentityChangeMove {
    pub fn new(seed: u64) -> IdentityChangeMove {
        IdentityChangeMove {
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for IdentityChangeMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };

        let n = species_count() as u32;
        if n == 0 {
            return;
        }
        let old = w.particle(p).species();
        let new = self.rng.gen_range(0..n);

        let ei = ffm.evaluate_particle(w, p);
        w.set_species(p, new);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_species(p, old);
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

        let n = species_count() as u32;
        if n == 0 {
            return;
        }
        let old = world.particle(p).species();
        let new = self.rng.gen_range(0..n);

        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);
        world.set_species(p, new);
        self.stats.performed += 1;
        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;

        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_species(p, old);
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
        "IdentityChange"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
