use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use nalgebra::{Matrix3, Vector3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::arena::ParticleArena;
use crate::errors::DomainError;
use crate::nblist::CellGrid;
use crate::particle::{Particle, ParticleChange, ParticleEvent, ParticlePrototype, ParticleRef};
use crate::properties::{Energy, Pressure};
use crate::units::units;

static NEXT_WORLD_ID: AtomicUsize = AtomicUsize::new(0);

/// The spatial container of a simulation: an orthorhombic periodic cell, a
/// particle arena, neighbor lists and the running energy/pressure state.
///
/// Positions are folded into the primary image `[0, L)` on every boundary
/// application. Neighbor lists are per-primitive and rebuilt from scratch
/// with a linked-cell grid whenever any particle has strayed more than half
/// the skin from its checkpoint.
#[derive(Clone, Debug)]
pub struct World {
    id: usize,
    h: Matrix3<f64>,
    periodic: [bool; 3],
    temperature: f64,
    energy: Energy,
    pressure: Pressure,
    cutoff: f64,
    skin: f64,
    cell_ratio: f64,
    arena: ParticleArena,
    roots: Vec<ParticleRef>,
    primitives: Vec<ParticleRef>,
    species_roots: HashMap<u32, Vec<ParticleRef>>,
    composition: BTreeMap<u32, u64>,
    stash: HashMap<u32, Vec<ParticleRef>>,
    prototypes: HashMap<u32, ParticlePrototype>,
    chemical_potential: HashMap<u32, f64>,
    wavelength: HashMap<u32, f64>,
    rng: SmallRng,
    events: Vec<ParticleEvent>,
    record_events: bool,
}

impl World {
    /// Creates an empty world.
    ///
    /// # Arguments
    /// * `lengths` - box edge lengths
    /// * `cutoff` - forcefield cutoff radius
    /// * `skin` - neighbor list skin thickness; the neighbor radius is `cutoff + skin`
    /// * `seed` - seed of the world-owned random source
    pub fn new(lengths: [f64; 3], cutoff: f64, skin: f64, seed: u64) -> Result<World, DomainError> {
        let volume = lengths[0] * lengths[1] * lengths[2];
        if !(volume > 0.0) {
            return Err(DomainError::NonPositiveVolume { volume });
        }
        if skin < 0.0 || skin > cutoff {
            return Err(DomainError::BadSkinThickness { skin, cutoff });
        }
        let radius = cutoff + skin;
        let half_box = 0.5 * lengths[0].min(lengths[1]).min(lengths[2]);
        if radius > half_box {
            return Err(DomainError::CutoffExceedsBox { radius, half_box });
        }

        Ok(World {
            id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            h: Matrix3::from_diagonal(&Vector3::new(lengths[0], lengths[1], lengths[2])),
            periodic: [true; 3],
            temperature: 0.0,
            energy: Energy::default(),
            pressure: Pressure::default(),
            cutoff,
            skin,
            cell_ratio: 0.2,
            arena: ParticleArena::new(),
            roots: Vec::new(),
            primitives: Vec::new(),
            species_roots: HashMap::new(),
            composition: BTreeMap::new(),
            stash: HashMap::new(),
            prototypes: HashMap::new(),
            chemical_potential: HashMap::new(),
            wavelength: HashMap::new(),
            rng: SmallRng::seed_from_u64(seed),
            events: Vec::new(),
            record_events: false,
        })
    }

    /*
     * Geometry
     */

    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    /// The box H-matrix; diagonal for the orthorhombic worlds built here.
    pub fn h_matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    pub fn box_lengths(&self) -> [f64; 3] {
        [self.h[(0, 0)], self.h[(1, 1)], self.h[(2, 2)]]
    }

    pub fn volume(&self) -> f64 {
        self.h.determinant()
    }

    pub fn density(&self) -> f64 {
        self.roots.len() as f64 / self.volume()
    }

    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    pub fn set_periodic(&mut self, x: bool, y: bool, z: bool) {
        self.periodic = [x, y, z];
    }

    pub fn cutoff_radius(&self) -> f64 {
        self.cutoff
    }

    pub fn skin_thickness(&self) -> f64 {
        self.skin
    }

    pub fn neighbor_radius(&self) -> f64 {
        self.cutoff + self.skin
    }

    /// Cell-edge to neighbor-radius ratio of the linked-cell grid.
    pub fn set_cell_ratio(&mut self, ratio: f64) {
        self.cell_ratio = ratio.clamp(0.2, 1.0);
    }

    /// Folds a position into the primary image along each periodic axis.
    pub fn apply_periodic(&self, position: &mut Vector3<f64>) {
        let l = self.box_lengths();
        for axis in 0..3 {
            if self.periodic[axis] {
                position[axis] -= l[axis] * (position[axis] / l[axis]).floor();
            }
        }
    }

    /// Folds a displacement to its minimum-image representative.
    pub fn minimum_image(&self, dr: &mut Vector3<f64>) {
        let l = self.box_lengths();
        for axis in 0..3 {
            if self.periodic[axis] {
                if dr[axis] > 0.5 * l[axis] {
                    dr[axis] -= l[axis];
                } else if dr[axis] < -0.5 * l[axis] {
                    dr[axis] += l[axis];
                }
            }
        }
    }

    /// Minimum-image displacement from `p2` to `p1`.
    pub fn pair_displacement(&self, p1: ParticleRef, p2: ParticleRef) -> Vector3<f64> {
        let mut dr = self.arena.get(p1).position - self.arena.get(p2).position;
        self.minimum_image(&mut dr);
        dr
    }

    /// Rescales the box isotropically to a new volume.
    ///
    /// With `scale` set, every particle position is scaled by the same factor
    /// (composites move rigidly with their scaled centroid); otherwise
    /// positions are merely folded back into the new box. The neighbor list
    /// is always rebuilt.
    pub fn set_volume(&mut self, new_volume: f64, scale: bool) {
        let factor = (new_volume / self.volume()).cbrt();
        self.h *= factor;
        let roots = self.roots.clone();
        if scale {
            for r in roots {
                let pos = self.arena.get(r).position * factor;
                self.set_position(r, pos);
            }
        } else {
            for r in roots {
                let mut pos = self.arena.get(r).position;
                self.apply_periodic(&mut pos);
                self.set_position(r, pos);
            }
        }
        self.update_neighbor_list();
    }

    /*
     * Thermodynamic state
     */

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    pub fn energy(&self) -> Energy {
        self.energy
    }

    pub fn set_energy(&mut self, energy: Energy) {
        self.energy = energy;
    }

    pub fn increment_energy(&mut self, delta: Energy) {
        self.energy += delta;
    }

    /// The world pressure with the ideal-gas part recomputed from the
    /// current particle count, temperature and volume.
    pub fn pressure(&self) -> Pressure {
        let mut p = self.pressure;
        p.ideal = self.roots.len() as f64 * units().kb * self.temperature / self.volume();
        p
    }

    pub fn set_pressure(&mut self, pressure: Pressure) {
        self.pressure = pressure;
    }

    pub fn increment_pressure(&mut self, delta: Pressure) {
        self.pressure += delta;
    }

    /// Per-species chemical potential used by insertion and deletion moves.
    pub fn chemical_potential(&self, species: u32) -> f64 {
        self.chemical_potential.get(&species).copied().unwrap_or(0.0)
    }

    pub fn set_chemical_potential(&mut self, species: u32, mu: f64) {
        self.chemical_potential.insert(species, mu);
    }

    /// Per-species thermal de Broglie wavelength; defaults to one.
    pub fn wavelength(&self, species: u32) -> f64 {
        self.wavelength.get(&species).copied().unwrap_or(1.0)
    }

    pub fn set_wavelength(&mut self, species: u32, lambda: f64) {
        self.wavelength.insert(species, lambda);
    }

    /*
     * Particle access
     */

    pub fn particle(&self, p: ParticleRef) -> &Particle {
        self.arena.get(p)
    }

    /// Number of top-level particles.
    pub fn particle_count(&self) -> usize {
        self.roots.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Top-level particles in insertion order.
    pub fn particles(&self) -> &[ParticleRef] {
        &self.roots
    }

    /// Primitive (childless) particles in insertion order.
    pub fn primitives(&self) -> &[ParticleRef] {
        &self.primitives
    }

    /// Count of active particles per species, maintained across add/remove
    /// and species-change operations.
    pub fn composition(&self) -> &BTreeMap<u32, u64> {
        &self.composition
    }

    pub fn species_count(&self, species: u32) -> u64 {
        self.composition.get(&species).copied().unwrap_or(0)
    }

    /// Draws a top-level particle uniformly at random; `None` when empty.
    pub fn random_particle(&mut self) -> Option<ParticleRef> {
        if self.roots.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..self.roots.len());
        Some(self.roots[i])
    }

    /// Draws a top-level particle of a given species; `None` when none exist.
    pub fn random_particle_by_species(&mut self, species: u32) -> Option<ParticleRef> {
        let refs = self.species_roots.get(&species)?;
        if refs.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..refs.len());
        Some(refs[i])
    }

    /// Draws a top-level particle whose species is in the given list.
    pub fn random_particle_from_list(&mut self, species: &[u32]) -> Option<ParticleRef> {
        let total: usize = species
            .iter()
            .map(|s| self.species_roots.get(s).map_or(0, |v| v.len()))
            .sum();
        if total == 0 {
            return None;
        }
        let mut i = self.rng.gen_range(0..total);
        for s in species {
            if let Some(refs) = self.species_roots.get(s) {
                if i < refs.len() {
                    return Some(refs[i]);
                }
                i -= refs.len();
            }
        }
        None
    }

    /// Draws a primitive particle uniformly at random.
    pub fn random_primitive(&mut self) -> Option<ParticleRef> {
        if self.primitives.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..self.primitives.len());
        Some(self.primitives[i])
    }

    /// Uniform sample from `[0, 1)` drawn from the world-owned random source.
    pub fn random_unit(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }

    /*
     * Mutation with change events
     */

    /// Moves a particle; a composite translates rigidly, a primitive also
    /// refreshes its parent's mass-weighted centroid.
    pub fn set_position(&mut self, p: ParticleRef, position: Vector3<f64>) {
        let old = self.arena.get(p).position;
        if self.arena.get(p).has_children() {
            let delta = position - old;
            let children = self.arena.get(p).children.clone();
            for c in children {
                self.translate_subtree(c, delta);
            }
            self.arena.get_mut(p).position = position;
            self.push_event(p, ParticleChange::Position { old });
        } else {
            self.arena.get_mut(p).position = position;
            self.push_event(p, ParticleChange::Position { old });
            self.refresh_ancestor_centroids(p);
        }
    }

    fn translate_subtree(&mut self, p: ParticleRef, delta: Vector3<f64>) {
        let children = self.arena.get(p).children.clone();
        for c in children {
            self.translate_subtree(c, delta);
        }
        let old = self.arena.get(p).position;
        self.arena.get_mut(p).position = old + delta;
        self.push_event(p, ParticleChange::Position { old });
    }

    fn refresh_ancestor_centroids(&mut self, p: ParticleRef) {
        let mut current = self.arena.get(p).parent;
        while let Some(parent) = current {
            let mut centroid = Vector3::zeros();
            let mut mass = 0.0;
            for &c in self.arena.get(parent).children.iter() {
                let child = self.arena.get(c);
                centroid += child.position * child.mass;
                mass += child.mass;
            }
            if mass > 0.0 {
                centroid /= mass;
            }
            let old = self.arena.get(parent).position;
            self.arena.get_mut(parent).position = centroid;
            self.push_event(parent, ParticleChange::Position { old });
            current = self.arena.get(parent).parent;
        }
    }

    pub fn set_director(&mut self, p: ParticleRef, director: Vector3<f64>) {
        let old = self.arena.get(p).director;
        self.arena.get_mut(p).director = director;
        self.push_event(p, ParticleChange::Director { old });
    }

    /// Sets the charge of a primitive and refreshes ancestor charge sums.
    ///
    /// Asking a composite to change its charge directly is a programmer
    /// error and panics.
    pub fn set_charge(&mut self, p: ParticleRef, charge: f64) {
        if self.arena.get(p).has_children() {
            panic!("cannot set the charge of a composite directly");
        }
        let old = self.arena.get(p).charge;
        self.arena.get_mut(p).charge = charge;
        self.push_event(p, ParticleChange::Charge { old });

        let mut current = self.arena.get(p).parent;
        while let Some(parent) = current {
            let sum: f64 = self
                .arena
                .get(parent)
                .children
                .iter()
                .map(|&c| self.arena.get(c).charge)
                .sum();
            let old = self.arena.get(parent).charge;
            self.arena.get_mut(parent).charge = sum;
            self.push_event(parent, ParticleChange::Charge { old });
            current = self.arena.get(parent).parent;
        }
    }

    /// Sets the mass of a primitive; composites derive theirs from children.
    pub fn set_mass(&mut self, p: ParticleRef, mass: f64) {
        if self.arena.get(p).has_children() {
            panic!("cannot set the mass of a composite directly");
        }
        self.arena.get_mut(p).mass = mass;
        let mut current = self.arena.get(p).parent;
        while let Some(parent) = current {
            let sum: f64 = self
                .arena
                .get(parent)
                .children
                .iter()
                .map(|&c| self.arena.get(c).mass)
                .sum();
            self.arena.get_mut(parent).mass = sum;
            current = self.arena.get(parent).parent;
        }
    }

    pub fn set_species(&mut self, p: ParticleRef, species: u32) {
        let old = self.arena.get(p).species;
        if old == species {
            return;
        }
        let active = self.is_active(p);
        if active {
            self.decrement_composition(old);
            *self.composition.entry(species).or_insert(0) += 1;
            if self.arena.get(p).parent.is_none() {
                if let Some(refs) = self.species_roots.get_mut(&old) {
                    if let Some(pos) = refs.iter().position(|&r| r == p) {
                        refs.swap_remove(pos);
                    }
                }
                self.species_roots.entry(species).or_default().push(p);
            }
        }
        self.arena.get_mut(p).species = species;
        self.push_event(p, ParticleChange::Species { old });
    }

    pub fn set_protonated(&mut self, p: ParticleRef, protonated: bool) {
        self.arena.get_mut(p).protonated = protonated;
    }

    fn is_active(&self, p: ParticleRef) -> bool {
        let mut root = p;
        while let Some(parent) = self.arena.get(root).parent {
            root = parent;
        }
        self.roots.contains(&root)
    }

    fn push_event(&mut self, p: ParticleRef, change: ParticleChange) {
        if !self.record_events {
            return;
        }
        let particle = self.arena.get(p);
        self.events.push(ParticleEvent {
            id: particle.id,
            particle: p,
            position: particle.position,
            director: particle.director,
            change,
        });
    }

    /// Turns change-event recording on or off; off by default.
    pub fn set_event_recording(&mut self, record: bool) {
        self.record_events = record;
        if !record {
            self.events.clear();
        }
    }

    /// Takes all change events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<ParticleEvent> {
        std::mem::take(&mut self.events)
    }

    /*
     * Adding, removing, stashing
     */

    /// Instantiates a prototype as an active particle; returns its reference.
    pub fn add_particle(&mut self, prototype: &ParticlePrototype) -> ParticleRef {
        let at = prototype.position;
        let root = self.instantiate(prototype, None);
        self.activate(root, Some(at));
        root
    }

    /// Removes a particle and its descendants, scrubbing every neighbor
    /// list that referenced them, and frees their arena slots.
    pub fn remove_particle(&mut self, p: ParticleRef) {
        self.deactivate(p);
        self.free_subtree(p);
    }

    /// Detaches a particle into a prototype (children relative to the
    /// centroid) and frees its arena slots. Used by inter-world transfers.
    pub fn extract_particle(&mut self, p: ParticleRef) -> ParticlePrototype {
        self.deactivate(p);
        let proto = self.subtree_prototype(p);
        self.free_subtree(p);
        proto
    }

    /// Registers a species prototype and pre-instantiates `count` stashed
    /// copies for allocation-free insertion moves.
    pub fn register_prototype(&mut self, prototype: &ParticlePrototype, count: usize) {
        let species = prototype.species;
        self.prototypes.insert(species, prototype.clone());
        for _ in 0..count {
            let root = self.instantiate(prototype, None);
            self.stash.entry(species).or_default().push(root);
        }
    }

    /// Draws a pre-constructed particle of a species from the stash and
    /// activates it; refills from the prototype on exhaustion.
    ///
    /// Returns `None` when no prototype of that species was registered.
    pub fn unstash(&mut self, species: u32) -> Option<ParticleRef> {
        let root = match self.stash.get_mut(&species).and_then(|pool| pool.pop()) {
            Some(r) => r,
            None => {
                let prototype = self.prototypes.get(&species)?.clone();
                debug!("stash exhausted for species {}; refilling", species);
                self.instantiate(&prototype, None)
            }
        };
        self.activate(root, None);
        Some(root)
    }

    /// Deactivates a particle and returns it to the stash of its species.
    pub fn stash_particle(&mut self, p: ParticleRef) {
        self.deactivate(p);
        let species = self.arena.get(p).species;
        self.stash.entry(species).or_default().push(p);
    }

    /// Number of stashed copies currently pooled for a species.
    pub fn stash_count(&self, species: u32) -> usize {
        self.stash.get(&species).map_or(0, |pool| pool.len())
    }

    fn instantiate(&mut self, prototype: &ParticlePrototype, parent: Option<ParticleRef>) -> ParticleRef {
        let mut record = Particle::new(prototype.species);
        record.position = prototype.position;
        record.director = prototype.director;
        record.charge = prototype.charge;
        record.mass = prototype.mass;
        record.protonated = prototype.protonated;
        record.parent = parent;
        let root = self.arena.insert(record);

        if !prototype.children.is_empty() {
            let mut refs = Vec::with_capacity(prototype.children.len());
            for child in &prototype.children {
                let mut offset_child = child.clone();
                offset_child.position += prototype.position;
                refs.push(self.instantiate(&offset_child, Some(root)));
            }
            for &(a, b) in &prototype.bonds {
                let (ra, rb) = (refs[a], refs[b]);
                if !self.arena.get(ra).bonded.contains(&rb) {
                    self.arena.get_mut(ra).bonded.push(rb);
                    self.arena.get_mut(rb).bonded.push(ra);
                }
            }
            // Derived composite state.
            let mut centroid = Vector3::zeros();
            let mut mass = 0.0;
            let mut charge = 0.0;
            for &c in &refs {
                let child = self.arena.get(c);
                centroid += child.position * child.mass;
                mass += child.mass;
                charge += child.charge;
            }
            if mass > 0.0 {
                centroid /= mass;
            }
            let record = self.arena.get_mut(root);
            record.children = refs;
            record.position = centroid;
            record.mass = mass;
            record.charge = charge;
        }
        root
    }

    /// All records of a particle's subtree, the particle itself first.
    pub fn subtree(&self, p: ParticleRef) -> Vec<ParticleRef> {
        self.subtree_refs(p)
    }

    fn subtree_refs(&self, p: ParticleRef) -> Vec<ParticleRef> {
        let mut out = vec![p];
        let mut i = 0;
        while i < out.len() {
            out.extend_from_slice(&self.arena.get(out[i]).children);
            i += 1;
        }
        out
    }

    fn subtree_prototype(&self, p: ParticleRef) -> ParticlePrototype {
        let particle = self.arena.get(p);
        let mut proto = ParticlePrototype {
            species: particle.species,
            position: particle.position,
            director: particle.director,
            charge: particle.charge,
            mass: particle.mass,
            protonated: particle.protonated,
            children: Vec::new(),
            bonds: Vec::new(),
        };
        for &c in &particle.children {
            let mut child = self.subtree_prototype(c);
            child.position -= particle.position;
            proto.children.push(child);
        }
        for (i, &a) in particle.children.iter().enumerate() {
            for (j, &b) in particle.children.iter().enumerate().skip(i + 1) {
                if self.arena.get(a).bonded.contains(&b) {
                    proto.bonds.push((i, j));
                }
            }
        }
        proto
    }

    fn activate(&mut self, root: ParticleRef, at: Option<Vector3<f64>>) {
        if let Some(target) = at {
            // Plain translation; the particle is not yet active so no
            // events or centroid refresh are wanted here.
            let delta = target - self.arena.get(root).position;
            for r in self.subtree_refs(root) {
                let pos = self.arena.get(r).position;
                self.arena.get_mut(r).position = pos + delta;
            }
        }
        self.roots.push(root);
        let species = self.arena.get(root).species;
        self.species_roots.entry(species).or_default().push(root);
        for r in self.subtree_refs(root) {
            let s = self.arena.get(r).species;
            *self.composition.entry(s).or_insert(0) += 1;
            if !self.arena.get(r).has_children() {
                self.primitives.push(r);
            }
        }
    }

    fn deactivate(&mut self, root: ParticleRef) {
        if let Some(pos) = self.roots.iter().position(|&r| r == root) {
            self.roots.swap_remove(pos);
        }
        let species = self.arena.get(root).species;
        if let Some(refs) = self.species_roots.get_mut(&species) {
            if let Some(pos) = refs.iter().position(|&r| r == root) {
                refs.swap_remove(pos);
            }
        }
        for r in self.subtree_refs(root) {
            let s = self.arena.get(r).species;
            self.decrement_composition(s);
            if !self.arena.get(r).has_children() {
                if let Some(pos) = self.primitives.iter().position(|&q| q == r) {
                    self.primitives.swap_remove(pos);
                }
                self.scrub_neighbors(r);
            }
        }
    }

    fn free_subtree(&mut self, root: ParticleRef) {
        for r in self.subtree_refs(root) {
            self.arena.remove(r);
        }
    }

    fn decrement_composition(&mut self, species: u32) {
        if let Some(count) = self.composition.get_mut(&species) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.composition.remove(&species);
            }
        }
    }

    fn scrub_neighbors(&mut self, p: ParticleRef) {
        let neighbors = std::mem::take(&mut self.arena.get_mut(p).neighbors);
        for nb in neighbors {
            let list = &mut self.arena.get_mut(nb).neighbors;
            if let Some(pos) = list.iter().position(|&q| q == p) {
                list.swap_remove(pos);
            }
        }
    }

    /*
     * Neighbor lists
     */

    /// Rebuilds every primitive's neighbor list from scratch with the
    /// linked-cell grid and records fresh checkpoints.
    ///
    /// Particles are enumerated in global-id order so the resulting lists
    /// are deterministic for a given seed.
    pub fn update_neighbor_list(&mut self) {
        let radius = self.neighbor_radius();
        let radius_sq = radius * radius;

        let mut order: Vec<ParticleRef> = self.primitives.clone();
        order.sort_by_key(|&p| self.arena.get(p).id);

        for &p in &order {
            self.arena.get_mut(p).neighbors.clear();
        }
        let roots = self.roots.clone();
        for r in roots {
            self.set_checkpoint(r);
        }

        let grid = CellGrid::build(self.box_lengths(), self.periodic, radius, self.cell_ratio);
        let cell_count = grid.cell_count();
        let mut cells: Vec<Vec<ParticleRef>> = vec![Vec::new(); cell_count];
        for &p in &order {
            let mut pos = self.arena.get(p).position;
            self.apply_periodic(&mut pos);
            cells[grid.cell_index(pos.x, pos.y, pos.z)].push(p);
        }

        for m in 0..cell_count {
            for n1 in 0..cells[m].len() {
                let i = cells[m][n1];
                // Remaining atoms of the same cell.
                for n2 in n1 + 1..cells[m].len() {
                    self.try_pair(i, cells[m][n2], radius_sq);
                }
                // Atoms in the stripe cells.
                for &(start, end) in grid.stripes() {
                    let m1 = m + start;
                    if m1 >= cell_count {
                        continue;
                    }
                    let m2 = (m + end).min(cell_count - 1);
                    for mc in m1..=m2 {
                        for n2 in 0..cells[mc].len() {
                            self.try_pair(i, cells[mc][n2], radius_sq);
                        }
                    }
                }
            }
        }
    }

    fn try_pair(&mut self, i: ParticleRef, j: ParticleRef, radius_sq: f64) {
        let mut dr = self.arena.get(i).position - self.arena.get(j).position;
        self.minimum_image(&mut dr);
        if dr.norm_squared() <= radius_sq {
            self.arena.get_mut(i).neighbors.push(j);
            self.arena.get_mut(j).neighbors.push(i);
        }
    }

    fn set_checkpoint(&mut self, p: ParticleRef) {
        let pos = self.arena.get(p).position;
        self.arena.get_mut(p).checkpoint = pos;
        let children = self.arena.get(p).children.clone();
        for c in children {
            self.set_checkpoint(c);
        }
    }

    /// Rebuilds the neighbor lists of a single particle's primitives by a
    /// direct scan over the world, leaving all other lists untouched.
    ///
    /// Insertion-style moves call this after placing a stashed or
    /// transferred particle; a full rebuild would discard every checkpoint
    /// for the sake of one newcomer.
    pub fn update_particle_neighbors(&mut self, p: ParticleRef) {
        let radius = self.neighbor_radius();
        let radius_sq = radius * radius;
        let subtree: Vec<ParticleRef> = self
            .subtree_refs(p)
            .into_iter()
            .filter(|&r| !self.arena.get(r).has_children())
            .collect();

        for &r in &subtree {
            self.scrub_neighbors(r);
        }
        for (i, &r) in subtree.iter().enumerate() {
            for q_idx in 0..self.primitives.len() {
                let q = self.primitives[q_idx];
                if q == r {
                    continue;
                }
                // Pairs internal to the subtree are handled once, by the
                // later of the two primitives.
                if let Some(j) = subtree.iter().position(|&m| m == q) {
                    if j < i {
                        continue;
                    }
                }
                self.try_pair(r, q, radius_sq);
            }
        }
        self.set_checkpoint(p);
    }

    /// Triggers a full rebuild when the particle (or any of its primitives)
    /// has strayed more than half the skin from its checkpoint.
    pub fn check_neighbor_update(&mut self, p: ParticleRef) {
        let threshold = 0.5 * self.skin;
        let threshold_sq = threshold * threshold;
        for r in self.subtree_refs(p) {
            if self.arena.get(r).checkpoint_distance().norm_squared() > threshold_sq {
                self.update_neighbor_list();
                return;
            }
        }
    }

    /*
     * Packing helpers
     */

    /// Packs `n` particles cloned from the prototypes onto the smallest
    /// enclosing cubic lattice at the requested number density. The box is
    /// resized accordingly.
    pub fn pack_world(
        &mut self,
        prototypes: &[ParticlePrototype],
        fractions: &[f64],
        n: usize,
        density: f64,
    ) {
        assert_eq!(prototypes.len(), fractions.len(), "prototype and fraction count mismatch");
        let norm: f64 = fractions.iter().sum();
        let mut counts: Vec<usize> = fractions
            .iter()
            .take(prototypes.len() - 1)
            .map(|f| (f / norm * n as f64).round() as usize)
            .collect();
        let assigned: usize = counts.iter().sum();
        counts.push(n - assigned);

        let volume = n as f64 / density;
        let l = volume.cbrt();
        self.h = Matrix3::from_diagonal(&Vector3::new(l, l, l));

        let mut n_cube = 2usize;
        while n_cube.pow(3) < n {
            n_cube += 1;
        }

        let spacing = l / n_cube as f64;
        let (mut x, mut y, mut z) = (0usize, 0usize, 0usize);
        for _ in 0..n {
            for (j, count) in counts.iter_mut().enumerate() {
                if *count > 0 {
                    let pos = Vector3::new(
                        spacing * (x as f64 + 0.5),
                        spacing * (y as f64 + 0.5),
                        spacing * (z as f64 + 0.5),
                    );
                    let proto = prototypes[j].clone().with_position(pos);
                    self.add_particle(&proto);
                    *count -= 1;
                    break;
                }
            }
            x += 1;
            if x == n_cube {
                x = 0;
                y += 1;
                if y == n_cube {
                    y = 0;
                    z += 1;
                }
            }
        }
    }

    /// Fills a unit-spaced lattice spanning the whole box with clones of the
    /// prototypes, in the given composition. Used by lattice spin models.
    pub fn fill_lattice(&mut self, prototypes: &[ParticlePrototype], fractions: &[f64]) {
        assert_eq!(prototypes.len(), fractions.len(), "prototype and fraction count mismatch");
        let l = self.box_lengths();
        let (nx, ny, nz) = (l[0].round() as usize, l[1].round() as usize, l[2].round() as usize);
        let sites = nx * ny * nz;

        let norm: f64 = fractions.iter().sum();
        let mut counts: Vec<usize> = fractions
            .iter()
            .take(prototypes.len() - 1)
            .map(|f| (f / norm * sites as f64).round() as usize)
            .collect();
        let assigned: usize = counts.iter().sum();
        counts.push(sites - assigned);

        for ix in 0..nx {
            for iy in 0..ny {
                for iz in 0..nz {
                    let pos = Vector3::new(ix as f64 + 0.5, iy as f64 + 0.5, iz as f64 + 0.5);
                    for (j, count) in counts.iter_mut().enumerate() {
                        if *count > 0 {
                            let proto = prototypes[j].clone().with_position(pos);
                            self.add_particle(&proto);
                            *count -= 1;
                            break;
                        }
                    }
                }
            }
        }
    }
}
