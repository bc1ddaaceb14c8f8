use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use mcshell_system::{find_species, EPTuple, Particle, ParticleRef, World};
use rayon::prelude::*;
use thiserror::Error;

use crate::bonded::BondedFF;
use crate::constraint::ConstraintFF;
use crate::electrostatic::ElectrostaticFF;
use crate::nonbonded::NonbondedFF;

/// Raised when a forcefield is registered against a species that has not
/// been interned yet.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("unknown species \"{0}\"; register particles before adding forcefields")]
    UnknownSpecies(String),
}

/// Composes per-species-pair forcefields into world and particle energies.
///
/// Pair forcefields are held in two forms: a symmetric lookup map (both
/// `(a, b)` and `(b, a)` resolve to the same entry) and a unique list used
/// to enumerate distinct pair types for tail corrections.
#[derive(Clone, Debug, Default)]
pub struct ForceFieldManager {
    nonbonded: Vec<((u32, u32), NonbondedFF)>,
    nonbonded_lookup: HashMap<(u32, u32), usize>,
    bonded: Vec<((u32, u32), BondedFF)>,
    bonded_lookup: HashMap<(u32, u32), usize>,
    electrostatic: Vec<((u32, u32), ElectrostaticFF)>,
    electrostatic_lookup: HashMap<(u32, u32), usize>,
    constraints: Vec<(u32, ConstraintFF)>,
}

impl ForceFieldManager {
    pub fn new() -> ForceFieldManager {
        ForceFieldManager::default()
    }

    /*
     * Registration
     */

    pub fn add_nonbonded(&mut self, s1: &str, s2: &str, ff: NonbondedFF) -> Result<(), RegisterError> {
        let a = find_species(s1).ok_or_else(|| RegisterError::UnknownSpecies(s1.into()))?;
        let b = find_species(s2).ok_or_else(|| RegisterError::UnknownSpecies(s2.into()))?;
        self.add_nonbonded_by_id(a, b, ff);
        Ok(())
    }

    pub fn add_nonbonded_by_id(&mut self, a: u32, b: u32, ff: NonbondedFF) {
        if let Some(&idx) = self.nonbonded_lookup.get(&(a, b)) {
            self.nonbonded[idx].1 = ff;
            return;
        }
        let idx = self.nonbonded.len();
        self.nonbonded.push(((a, b), ff));
        self.nonbonded_lookup.insert((a, b), idx);
        self.nonbonded_lookup.insert((b, a), idx);
    }

    pub fn add_bonded(&mut self, s1: &str, s2: &str, ff: BondedFF) -> Result<(), RegisterError> {
        let a = find_species(s1).ok_or_else(|| RegisterError::UnknownSpecies(s1.into()))?;
        let b = find_species(s2).ok_or_else(|| RegisterError::UnknownSpecies(s2.into()))?;
        self.add_bonded_by_id(a, b, ff);
        Ok(())
    }

    pub fn add_bonded_by_id(&mut self, a: u32, b: u32, ff: BondedFF) {
        if let Some(&idx) = self.bonded_lookup.get(&(a, b)) {
            self.bonded[idx].1 = ff;
            return;
        }
        let idx = self.bonded.len();
        self.bonded.push(((a, b), ff));
        self.bonded_lookup.insert((a, b), idx);
        self.bonded_lookup.insert((b, a), idx);
    }

    pub fn add_electrostatic(
        &mut self,
        s1: &str,
        s2: &str,
        ff: ElectrostaticFF,
    ) -> Result<(), RegisterError> {
        let a = find_species(s1).ok_or_else(|| RegisterError::UnknownSpecies(s1.into()))?;
        let b = find_species(s2).ok_or_else(|| RegisterError::UnknownSpecies(s2.into()))?;
        self.add_electrostatic_by_id(a, b, ff);
        Ok(())
    }

    pub fn add_electrostatic_by_id(&mut self, a: u32, b: u32, ff: ElectrostaticFF) {
        if let Some(&idx) = self.electrostatic_lookup.get(&(a, b)) {
            self.electrostatic[idx].1 = ff;
            return;
        }
        let idx = self.electrostatic.len();
        self.electrostatic.push(((a, b), ff));
        self.electrostatic_lookup.insert((a, b), idx);
        self.electrostatic_lookup.insert((b, a), idx);
    }

    pub fn add_constraint(&mut self, species: &str, c: ConstraintFF) -> Result<(), RegisterError> {
        let s = find_species(species).ok_or_else(|| RegisterError::UnknownSpecies(species.into()))?;
        self.constraints.push((s, c));
        Ok(())
    }

    pub fn add_constraint_by_id(&mut self, species: u32, c: ConstraintFF) {
        self.constraints.push((species, c));
    }

    pub fn nonbonded_count(&self) -> usize {
        self.nonbonded.len()
    }

    pub fn bonded_count(&self) -> usize {
        self.bonded.len()
    }

    pub fn electrostatic_count(&self) -> usize {
        self.electrostatic.len()
    }

    /*
     * Evaluation
     */

    /// Energy and pressure contribution of a single particle against the
    /// rest of the world: non-bonded and electrostatic terms over its
    /// neighbor list, bonded terms over its bonded list, constraint terms,
    /// and this particle's share of the tail correction. Composites recurse
    /// into their children with no pair counted twice.
    pub fn evaluate_particle(&self, world: &World, p: ParticleRef) -> EPTuple {
        let mut ep = EPTuple::default();
        let members: HashSet<ParticleRef> = world.subtree(p).into_iter().collect();
        self.subtree_terms(world, p, &members, &mut ep);
        self.add_tail_share(world, &members, &mut ep);
        self.finish_pressure(world.volume(), &mut ep);
        ep
    }

    /// Full-world energy and pressure: all primitive pairs counted once in
    /// id order, every bond once, constraint and reciprocal-space terms,
    /// and tail corrections from the world composition.
    ///
    /// The per-particle summation runs as a parallel reduction; the world
    /// is read-only for the duration of the call.
    pub fn evaluate_world(&self, world: &World) -> EPTuple {
        let mut ep = world
            .primitives()
            .par_iter()
            .map(|&p| {
                let mut local = EPTuple::default();
                let particle = world.particle(p);
                for &nb in particle.neighbors() {
                    if world.particle(nb).id() > particle.id() {
                        self.pair_terms(world, particle, nb, &mut local);
                    }
                }
                for &bn in particle.bonded_neighbors() {
                    if world.particle(bn).id() > particle.id() {
                        self.bond_terms(world, particle, bn, &mut local);
                    }
                }
                self.constraint_terms(particle, &mut local);
                local
            })
            .reduce(EPTuple::default, |a, b| a + b);

        for (_, ff) in &self.electrostatic {
            ep.energy.inter_electrostatic += ff.reciprocal_space(world);
        }

        let volume = world.volume();
        let wid = world.id();
        for &((a, b), ref ff) in &self.nonbonded {
            let na = world.species_count(a) as f64;
            let nb = world.species_count(b) as f64;
            ep.energy.tail += 2.0 * PI * na * nb / volume * ff.energy_tail(wid);
            ep.pressure.ptail +=
                4.0 * PI * na * nb / (3.0 * volume * volume) * ff.pressure_tail(wid);
        }

        self.finish_pressure(volume, &mut ep);
        ep
    }

    fn subtree_terms(
        &self,
        world: &World,
        p: ParticleRef,
        members: &HashSet<ParticleRef>,
        ep: &mut EPTuple,
    ) {
        let particle = world.particle(p);
        if particle.has_children() {
            for &c in particle.children() {
                self.subtree_terms(world, c, members, ep);
            }
            return;
        }

        for &nb in particle.neighbors() {
            // Pairs internal to the evaluated subtree are counted once.
            if members.contains(&nb) && world.particle(nb).id() <= particle.id() {
                continue;
            }
            self.pair_terms(world, particle, nb, ep);
        }
        for &bn in particle.bonded_neighbors() {
            if members.contains(&bn) && world.particle(bn).id() <= particle.id() {
                continue;
            }
            self.bond_terms(world, particle, bn, ep);
        }
        self.constraint_terms(particle, ep);
    }

    fn pair_terms(&self, world: &World, particle: &Particle, nb: ParticleRef, ep: &mut EPTuple) {
        let other = world.particle(nb);
        let mut rij = other.position() - particle.position();
        world.minimum_image(&mut rij);

        let intra = match (particle.parent(), other.parent()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        let key = (particle.species(), other.species());
        let wid = world.id();

        if let Some(&idx) = self.nonbonded_lookup.get(&key) {
            let i = self.nonbonded[idx].1.evaluate(particle, other, &rij, wid);
            if intra {
                ep.energy.intra_vdw += i.energy;
            } else {
                ep.energy.inter_vdw += i.energy;
            }
            accumulate_virial(ep, i.virial, &rij);
        }
        if let Some(&idx) = self.electrostatic_lookup.get(&key) {
            let i = self.electrostatic[idx].1.evaluate(particle, other, &rij, wid);
            if intra {
                ep.energy.intra_electrostatic += i.energy;
            } else {
                ep.energy.inter_electrostatic += i.energy;
            }
            accumulate_virial(ep, i.virial, &rij);
        }
    }

    fn bond_terms(&self, world: &World, particle: &Particle, bn: ParticleRef, ep: &mut EPTuple) {
        let other = world.particle(bn);
        let mut rij = other.position() - particle.position();
        world.minimum_image(&mut rij);
        let key = (particle.species(), other.species());
        if let Some(&idx) = self.bonded_lookup.get(&key) {
            let i = self.bonded[idx].1.evaluate(particle, other, &rij, world.id());
            ep.energy.bonded += i.energy;
            accumulate_virial(ep, i.virial, &rij);
        }
    }

    fn constraint_terms(&self, particle: &Particle, ep: &mut EPTuple) {
        for (species, c) in &self.constraints {
            if *species == particle.species() {
                ep.energy.connectivity += c.evaluate(particle);
            }
        }
    }

    /// The tail-correction share of a particle: the difference between the
    /// full correction with and without its primitives, so accumulated
    /// per-move deltas stay consistent with full-world evaluations.
    fn add_tail_share(&self, world: &World, members: &HashSet<ParticleRef>, ep: &mut EPTuple) {
        if self.nonbonded.is_empty() {
            return;
        }
        let mut removed: HashMap<u32, f64> = HashMap::new();
        for &m in members {
            *removed.entry(world.particle(m).species()).or_insert(0.0) += 1.0;
        }

        let volume = world.volume();
        let wid = world.id();
        for &((a, b), ref ff) in &self.nonbonded {
            let na = world.species_count(a) as f64;
            let nb = world.species_count(b) as f64;
            let na_out = na - removed.get(&a).copied().unwrap_or(0.0);
            let nb_out = nb - removed.get(&b).copied().unwrap_or(0.0);
            ep.energy.tail += 2.0 * PI * (na * nb - na_out * nb_out) / volume * ff.energy_tail(wid);
            ep.pressure.ptail += 4.0 * PI * (na * nb - na_out * nb_out)
                / (3.0 * volume * volume)
                * ff.pressure_tail(wid);
        }
    }

    fn finish_pressure(&self, volume: f64, ep: &mut EPTuple) {
        ep.pressure.pxx /= volume;
        ep.pressure.pxy /= volume;
        ep.pressure.pxz /= volume;
        ep.pressure.pyy /= volume;
        ep.pressure.pyz /= volume;
        ep.pressure.pzz /= volume;
    }
}

fn accumulate_virial(ep: &mut EPTuple, virial: f64, rij: &nalgebra::Vector3<f64>) {
    ep.pressure.pxx -= virial * rij.x * rij.x;
    ep.pressure.pxy -= virial * rij.x * rij.y;
    ep.pressure.pxz -= virial * rij.x * rij.z;
    ep.pressure.pyy -= virial * rij.y * rij.y;
    ep.pressure.pyz -= virial * rij.y * rij.z;
    ep.pressure.pzz -= virial * rij.z * rij.z;
}
