use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_system::{units, World, WorldManager};
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trait_move::{decide, Move, MoveOverride, MoveStatistics};

/// Translates a random particle by a vector drawn uniformly from
/// `[-dx/2, dx/2]^3`; `$P = \min(1, e^{-\beta \Delta U})$` with the energy
/// difference taken from the particle's local evaluation only.
#[derive(Clone)]
pub struct TranslateMove {
    dx: f64,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl TranslateMove {
    pub fn new(dx: f64, seed: u64) -> TranslateMove {
        TranslateMove {
            dx,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    pub fn max_displacement(&self) -> f64 {
        self.dx
    }

    fn displacement(&mut self) -> Vector3<f64> {
        Vector3::new(
            self.dx * (self.rng.gen_range(0.0..1.0) - 0.5),
            self.dx * (self.rng.gen_range(0.0..1.0) - 0.5),
            self.dx * (self.rng.gen_range(0.0..1.0) - 0.5),
        )
    }
}

impl Move for TranslateMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };

        let posi = w.particle(p).position();
        let ei = ffm.evaluate_particle(w, p);

        let mut pos = posi + self.displacement();
        w.apply_periodic(&mut pos);
        w.set_position(p, pos);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;
        w.check_neighbor_update(p);

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_position(p, posi);
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

        let posi = world.particle(p).position();
        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);

        let mut pos = posi + self.displacement();
        world.apply_periodic(&mut pos);
        world.set_position(p, pos);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;

        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);
        world.check_neighbor_update(p);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_position(p, posi);
            world.increment_energy(-de);
            world.increment_pressure(ei.pressure - ef.pressure);
            self.stats.rejected += 1;
            // The undo is itself a change the order parameter must see.
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
        "Translate"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Translates a random primitive site, leaving the rest of its composite in
/// place; the composite centroid follows automatically.
#[derive(Clone)]
pub struct TranslatePrimitiveMove {
    dx: f64,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl TranslatePrimitiveMove {
    pub fn new(dx: f64, seed: u64) -> TranslatePrimitiveMove {
        TranslatePrimitiveMove {
            dx,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    fn displacement(&mut self) -> Vector3<f64> {
        Vector3::new(
            self.dx * (self.rng.gen_range(0.0..1.0) - 0.5),
            self.dx * (self.rng.gen_range(0.0..1.0) - 0.5),
            self.dx * (self.rng.gen_range(0.0..1.0) - 0.5),
        )
    }
}

impl Move for TranslatePrimitiveMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_primitive() else { return };

        let posi = w.particle(p).position();
        let ei = ffm.evaluate_particle(w, p);

        let mut pos = posi + self.displacement();
        w.apply_periodic(&mut pos);
        w.set_position(p, pos);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;
        w.check_neighbor_update(p);

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_position(p, posi);
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
        let Some(p) = world.random_primitive() else { return };

        let posi = world.particle(p).position();
        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);

        let mut pos = posi + self.displacement();
        world.apply_periodic(&mut pos);
        world.set_position(p, pos);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;

        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);
        world.check_neighbor_update(p);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_position(p, posi);
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
        "TranslatePrimitive"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
