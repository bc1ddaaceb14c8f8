use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_numerical::{random_unit_vector, rotation_about_axis, Axis};
use mcshell_system::{units, ParticleRef, World, WorldManager};
use nalgebra::{Matrix3, Vector3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::trait_move::{decide, Move, MoveOverride, MoveStatistics};

/// Rotates a particle with a precomputed matrix: the director always, and
/// for composites each child's position about the composite centroid along
/// with the child's director.
pub(crate) fn rotate_particle(world: &mut World, p: ParticleRef, r: &Matrix3<f64>) {
    let dir = world.particle(p).director();
    world.set_director(p, r * dir);

    let com = world.particle(p).position();
    for c in world.particle(p).children().to_vec() {
        let pos = world.particle(c).position();
        world.set_position(c, r * (pos - com) + com);
        let cdir = world.particle(c).director();
        world.set_director(c, r * cdir);
    }
}

/// Snapshot of a particle's positions and directors for exact rollback.
pub(crate) struct PoseSnapshot {
    refs: Vec<ParticleRef>,
    positions: Vec<Vector3<f64>>,
    directors: Vec<Vector3<f64>>,
}

impl PoseSnapshot {
    pub(crate) fn take(world: &World, p: ParticleRef) -> PoseSnapshot {
        let refs = world.subtree(p);
        let positions = refs.iter().map(|&r| world.particle(r).position()).collect();
        let directors = refs.iter().map(|&r| world.particle(r).director()).collect();
        PoseSnapshot { refs, positions, directors }
    }

    /// Restores the saved pose; children first so the composite centroid is
    /// not re-derived from half-restored state.
    pub(crate) fn restore(&self, world: &mut World) {
        for i in (0..self.refs.len()).rev() {
            world.set_position(self.refs[i], self.positions[i]);
            world.set_director(self.refs[i], self.directors[i]);
        }
    }
}

/// Rotates a random particle about a random axis by a uniform angle in
/// `[-dmax, dmax]`.
#[derive(Clone)]
pub struct RotateMove {
    dmax: f64,
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl RotateMove {
    pub fn new(max_angle: f64, seed: u64) -> RotateMove {
        RotateMove {
            dmax: max_angle,
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }

    pub fn max_angle(&self) -> f64 {
        self.dmax
    }

    fn random_rotation(&mut self) -> Matrix3<f64> {
        let axis = Axis::random(&mut self.rng);
        let angle = (2.0 * self.rng.gen_range(0.0..1.0) - 1.0) * self.dmax;
        rotation_about_axis(axis, angle)
    }
}

impl Move for RotateMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };

        let snapshot = PoseSnapshot::take(w, p);
        let ei = ffm.evaluate_particle(w, p);

        let r = self.random_rotation();
        rotate_particle(w, p, &r);
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
            snapshot.restore(w);
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

        let snapshot = PoseSnapshot::take(world, p);
        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);

        let r = self.random_rotation();
        rotate_particle(world, p, &r);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;
        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);
        world.check_neighbor_update(p);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            snapshot.restore(world);
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
        "Rotate"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Replaces a random particle's director with a fresh uniform sample on the
/// unit sphere (Marsaglia method).
#[derive(Clone)]
pub struct DirectorRotateMove {
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl DirectorRotateMove {
    pub fn new(seed: u64) -> DirectorRotateMove {
        DirectorRotateMove {
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for DirectorRotateMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };

        let old = w.particle(p).director();
        let ei = ffm.evaluate_particle(w, p);

        let dir = random_unit_vector(&mut self.rng);
        w.set_director(p, dir);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_director(p, old);
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

        let old = world.particle(p).director();
        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);

        let dir = random_unit_vector(&mut self.rng);
        world.set_director(p, dir);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;
        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_director(p, old);
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
        "DirectorRotate"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}

/// Negates a random particle's director, the spin-flip of lattice models.
#[derive(Clone)]
pub struct FlipSpinMove {
    rng: SmallRng,
    stats: MoveStatistics,
    seed: u64,
}

impl FlipSpinMove {
    pub fn new(seed: u64) -> FlipSpinMove {
        FlipSpinMove {
            rng: SmallRng::seed_from_u64(seed),
            stats: MoveStatistics::default(),
            seed,
        }
    }
}

impl Move for FlipSpinMove {
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride) {
        let Some(wi) = wm.random_world() else { return };
        let w = wm.world_mut(wi);
        let Some(p) = w.random_particle() else { return };

        let old = w.particle(p).director();
        let ei = ffm.evaluate_particle(w, p);

        w.set_director(p, -old);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(w, p);
        let de = ef.energy - ei.energy;

        let beta = 1.0 / (units().kb * w.temperature());
        let pacc = (-beta * de.total()).exp();

        if decide(pacc, &mut self.rng, ov) {
            w.increment_energy(de);
            w.increment_pressure(ef.pressure - ei.pressure);
        } else {
            w.set_director(p, old);
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

        let old = world.particle(p).director();
        let ei = ffm.evaluate_particle(world, p);
        let opi = op.evaluate(world);

        world.set_director(p, -old);
        self.stats.performed += 1;

        let ef = ffm.evaluate_particle(world, p);
        let de = ef.energy - ei.energy;
        world.increment_energy(de);
        world.increment_pressure(ef.pressure - ei.pressure);
        let opf = op.evaluate(world);

        let pacc = op.acceptance_probability(&ei.energy, &ef.energy, opi, opf, world);
        if !decide(pacc, &mut self.rng, ov) {
            world.set_director(p, old);
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
        "FlipSpin"
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn box_clone(&self) -> Box<dyn Move> {
        Box::new(self.clone())
    }
}
