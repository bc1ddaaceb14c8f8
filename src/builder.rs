use std::collections::HashMap;

use log::info;
use nalgebra::Vector3;
use thiserror::Error;

use mcshell_dos::{
    ChargeFractionOP, DosOrderParameter, ElasticCoeffOP, ElasticMode, ParticleDistanceOP,
    RadiusOfGyrationOP, WangLandauOP,
};
use mcshell_ff::{BondedFF, ConstraintFF, ElectrostaticFF, ForceFieldManager, NonbondedFF};
use mcshell_moves::{
    AcidReactionMove, AcidTitrationMove, AnnealChargeMove, CbmcMove, ChargeSwapMove,
    DeleteParticleMove, DirectorRotateMove, FlipSpinMove, IdentityChangeMove, InsertParticleMove,
    Move, MoveManager, ParticleSwapMove, RandomIdentityMove, RotateMove, SpeciesSwapMove,
    TranslateMove, TranslatePrimitiveMove, VolumeScaleMove, VolumeSwapMove, WidomInsertionMove,
};
use mcshell_sim::{
    ConsoleObserver, DlmFileObserver, DosSimulation, MultiWalkerDos, Observer, ObserverFlags,
    StandardSimulation,
};
use mcshell_statistics::Histogram;
use mcshell_system::{
    find_species, set_units, species_id, DomainError, ParticlePrototype, ParticleRef, Units,
    World, WorldManager,
};

use crate::config::{
    BlueprintConfig, Config, MoveConfig, ObserverConfig, PairFFConfig, WorldConfig,
};

/// A configuration problem, carrying the JSON path it was found at.
///
/// Building never stops at the first problem; all errors are aggregated so
/// the user sees the complete list at once.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{path}: unknown type \"{kind}\"")]
    UnknownType { path: String, kind: String },
    #[error("{path}: unknown species \"{name}\"")]
    UnknownSpecies { path: String, name: String },
    #[error("{path}: {message}")]
    BadValue { path: String, message: String },
    #[error("{path}: {source}")]
    Domain { path: String, source: DomainError },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A fully assembled simulation, ready to run for its configured sweeps.
pub enum Engine {
    Standard { simulation: StandardSimulation, sweeps: usize },
    Dos { simulation: DosSimulation, sweeps: usize },
    MultiDos { simulation: MultiWalkerDos, sweeps: usize },
}

impl Engine {
    /// Runs the configured number of sweeps (iterations for the Metropolis
    /// driver, convergence-factor reductions for DOS).
    pub fn run(&mut self) {
        match self {
            Engine::Standard { simulation, sweeps } => simulation.run(*sweeps),
            Engine::Dos { simulation, sweeps } => simulation.run(*sweeps),
            Engine::MultiDos { simulation, sweeps } => simulation.run(*sweeps),
        }
    }
}

/// Parsed form of one blueprint site row.
struct SiteRow {
    id: i64,
    species: String,
    position: Vector3<f64>,
    director: Option<Vector3<f64>>,
    charge: Option<f64>,
    mass: Option<f64>,
}

fn parse_vec3(value: &serde_json::Value) -> Option<Vector3<f64>> {
    let arr = value.as_array()?;
    if arr.len() != 3 {
        return None;
    }
    Some(Vector3::new(arr[0].as_f64()?, arr[1].as_f64()?, arr[2].as_f64()?))
}

fn parse_site_row(value: &serde_json::Value, path: &str) -> Result<SiteRow, BuildError> {
    let bad = |message: &str| BuildError::BadValue {
        path: path.to_string(),
        message: message.to_string(),
    };
    let arr = value.as_array().ok_or_else(|| bad("site entry must be an array"))?;
    if arr.len() < 3 {
        return Err(bad("site entry needs at least [id, species, [x,y,z]]"));
    }
    let id = arr[0].as_i64().ok_or_else(|| bad("site id must be an integer"))?;
    let species = arr[1]
        .as_str()
        .ok_or_else(|| bad("site species must be a string"))?
        .to_string();
    let position = parse_vec3(&arr[2]).ok_or_else(|| bad("site position must be a 3-array"))?;

    let mut director = None;
    let mut charge = None;
    let mut mass = None;
    let mut next = 3;
    if arr.len() > next && arr[next].is_array() {
        director = Some(parse_vec3(&arr[next]).ok_or_else(|| bad("site director must be a 3-array"))?);
        next += 1;
    }
    if arr.len() > next {
        charge = Some(arr[next].as_f64().ok_or_else(|| bad("site charge must be a number"))?);
        next += 1;
    }
    if arr.len() > next {
        mass = Some(arr[next].as_f64().ok_or_else(|| bad("site mass must be a number"))?);
    }
    Ok(SiteRow { id, species, position, director, charge, mass })
}

/// Interns every species named anywhere in the configuration. Species must
/// exist before forcefields and moves resolve them.
fn register_species(config: &Config) {
    for (name, bp) in &config.blueprints {
        species_id(name);
        for child in &bp.children {
            species_id(&child.species);
        }
    }
    for world in &config.worlds {
        for (name, _) in &world.components {
            species_id(name);
        }
    }
}

fn build_world(
    cfg: &WorldConfig,
    blueprints: &HashMap<String, BlueprintConfig>,
    path: &str,
    errors: &mut Vec<BuildError>,
) -> Option<(World, HashMap<i64, ParticleRef>)> {
    if cfg.world_type != "Simple" {
        errors.push(BuildError::UnknownType {
            path: format!("{}/type", path),
            kind: cfg.world_type.clone(),
        });
        return None;
    }

    let mut world = match World::new(cfg.dimensions, cfg.nlist_cutoff, cfg.skin_thickness, cfg.seed)
    {
        Ok(w) => w,
        Err(source) => {
            errors.push(BuildError::Domain { path: path.to_string(), source });
            return None;
        }
    };
    world.set_temperature(cfg.temperature);
    world.set_cell_ratio(cfg.cell_ratio);
    if let Some(p) = &cfg.periodic {
        world.set_periodic(p.x, p.y, p.z);
    }

    // Walk the flat site list, consuming one row per site and as many rows
    // as a blueprint has children for molecular components.
    let mut id_map = HashMap::new();
    let mut row_index = 0usize;
    for (ci, (species_name, count)) in cfg.components.iter().enumerate() {
        let species = species_id(species_name);
        let blueprint = blueprints.get(species_name);
        let sites_per_particle = blueprint.map_or(1, |bp| bp.children.len());

        for _ in 0..*count {
            let remaining = cfg.particles.len() - row_index.min(cfg.particles.len());
            if remaining < sites_per_particle {
                errors.push(BuildError::BadValue {
                    path: format!("{}/components/{}", path, ci),
                    message: format!(
                        "expected {} more site rows for component \"{}\"",
                        sites_per_particle, species_name
                    ),
                });
                return None;
            }

            let mut rows = Vec::with_capacity(sites_per_particle);
            for _ in 0..sites_per_particle {
                let row_path = format!("{}/particles/{}", path, row_index);
                match parse_site_row(&cfg.particles[row_index], &row_path) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        errors.push(e);
                        return None;
                    }
                }
                row_index += 1;
            }

            let root = match blueprint {
                None => {
                    let row = &rows[0];
                    if row.species != *species_name {
                        errors.push(BuildError::BadValue {
                            path: format!("{}/particles/{}", path, row_index - 1),
                            message: format!(
                                "expected species \"{}\" but got \"{}\"",
                                species_name, row.species
                            ),
                        });
                        return None;
                    }
                    let mut proto = ParticlePrototype::site(species).with_position(row.position);
                    if let Some(d) = row.director {
                        proto = proto.with_director(d);
                    }
                    if let Some(q) = row.charge {
                        proto = proto.with_charge(q);
                    }
                    if let Some(m) = row.mass {
                        proto = proto.with_mass(m);
                    }
                    world.add_particle(&proto)
                }
                Some(bp) => {
                    // Mass-weighted centroid of the rows anchors the
                    // molecule; children are stored relative to it.
                    let mut centroid = Vector3::zeros();
                    let mut total_mass = 0.0;
                    for (row, site) in rows.iter().zip(bp.children.iter()) {
                        let m = row.mass.unwrap_or(site.mass);
                        centroid += row.position * m;
                        total_mass += m;
                    }
                    if total_mass > 0.0 {
                        centroid /= total_mass;
                    }

                    let mut children = Vec::with_capacity(rows.len());
                    for (row, site) in rows.iter().zip(bp.children.iter()) {
                        if row.species != site.species {
                            errors.push(BuildError::BadValue {
                                path: format!("{}/particles", path),
                                message: format!(
                                    "expected species \"{}\" but got \"{}\"",
                                    site.species, row.species
                                ),
                            });
                            return None;
                        }
                        let child_species = species_id(&site.species);
                        let mut proto = ParticlePrototype::site(child_species)
                            .with_position(row.position - centroid)
                            .with_charge(row.charge.unwrap_or(site.charge))
                            .with_mass(row.mass.unwrap_or(site.mass));
                        if let Some(d) = row.director {
                            proto = proto.with_director(d);
                        }
                        children.push(proto);
                    }
                    let proto = ParticlePrototype::molecule(species, children, bp.bonds.clone())
                        .with_position(centroid);
                    world.add_particle(&proto)
                }
            };

            // Remember row ids so order-parameter groups can refer to them.
            let subtree = world.subtree(root);
            if blueprint.is_some() {
                for (row, &child) in rows.iter().zip(subtree[1..].iter()) {
                    id_map.insert(row.id, child);
                }
            } else {
                id_map.insert(rows[0].id, root);
            }
        }
    }

    for (name, mu) in &cfg.chemical_potentials {
        match find_species(name) {
            Some(s) => world.set_chemical_potential(s, *mu),
            None => errors.push(BuildError::UnknownSpecies {
                path: format!("{}/chemical_potentials", path),
                name: name.clone(),
            }),
        }
    }
    for (name, lambda) in &cfg.wavelengths {
        match find_species(name) {
            Some(s) => world.set_wavelength(s, *lambda),
            None => errors.push(BuildError::UnknownSpecies {
                path: format!("{}/wavelengths", path),
                name: name.clone(),
            }),
        }
    }

    world.update_neighbor_list();
    Some((world, id_map))
}

fn pair_species(cfg: &PairFFConfig, path: &str) -> Result<(String, String), BuildError> {
    match cfg.species.len() {
        1 => Ok((cfg.species[0].clone(), cfg.species[0].clone())),
        2 => Ok((cfg.species[0].clone(), cfg.species[1].clone())),
        n => Err(BuildError::BadValue {
            path: format!("{}/species", path),
            message: format!("expected 1 or 2 species, got {}", n),
        }),
    }
}

fn require_cutoffs(cfg: &PairFFConfig, path: &str) -> Result<Vec<f64>, BuildError> {
    if cfg.rcut.is_empty() {
        return Err(BuildError::BadValue {
            path: format!("{}/rcut", path),
            message: "at least one per-world cutoff is required".to_string(),
        });
    }
    Ok(cfg.rcut.clone())
}

fn build_forcefields(config: &Config, errors: &mut Vec<BuildError>) -> ForceFieldManager {
    let mut ffm = ForceFieldManager::new();

    for (i, cfg) in config.forcefields.nonbonded.iter().enumerate() {
        let path = format!("#/forcefields/nonbonded/{}", i);
        let ff = match cfg.ff_type.as_str() {
            "LennardJones" => require_cutoffs(cfg, &path).map(|cutoffs| NonbondedFF::LennardJones {
                epsilon: cfg.epsilon,
                sigma: cfg.sigma,
                cutoffs,
            }),
            "LennardJonesTS" => {
                require_cutoffs(cfg, &path).map(|cutoffs| NonbondedFF::LennardJonesTS {
                    epsilon: cfg.epsilon,
                    sigma: cfg.sigma,
                    cutoffs,
                })
            }
            "LebwohlLasher" => Ok(NonbondedFF::LebwohlLasher {
                epsilon: cfg.epsilon,
                gamma: cfg.gamma,
            }),
            "IsingSpin" => Ok(NonbondedFF::IsingSpin { j: cfg.j }),
            other => Err(BuildError::UnknownType { path: path.clone(), kind: other.to_string() }),
        };
        match (ff, pair_species(cfg, &path)) {
            (Ok(ff), Ok((a, b))) => {
                if let Err(e) = ffm.add_nonbonded(&a, &b, ff) {
                    errors.push(BuildError::UnknownSpecies { path, name: e.to_string() });
                }
            }
            (ff, species) => {
                if let Err(e) = ff {
                    errors.push(e);
                }
                if let Err(e) = species {
                    errors.push(e);
                }
            }
        }
    }

    for (i, cfg) in config.forcefields.bonded.iter().enumerate() {
        let path = format!("#/forcefields/bonded/{}", i);
        let ff = match cfg.ff_type.as_str() {
            "Harmonic" => Ok(BondedFF::Harmonic { k: cfg.k, r0: cfg.r0 }),
            "FENE" => Ok(BondedFF::Fene { k: cfg.k, rmax: cfg.rmax }),
            other => Err(BuildError::UnknownType { path: path.clone(), kind: other.to_string() }),
        };
        match (ff, pair_species(cfg, &path)) {
            (Ok(ff), Ok((a, b))) => {
                if let Err(e) = ffm.add_bonded(&a, &b, ff) {
                    errors.push(BuildError::UnknownSpecies { path, name: e.to_string() });
                }
            }
            (ff, species) => {
                if let Err(e) = ff {
                    errors.push(e);
                }
                if let Err(e) = species {
                    errors.push(e);
                }
            }
        }
    }

    for (i, cfg) in config.forcefields.electrostatic.iter().enumerate() {
        let path = format!("#/forcefields/electrostatic/{}", i);
        let ff = match cfg.ff_type.as_str() {
            "Ewald" => require_cutoffs(cfg, &path).map(|cutoffs| ElectrostaticFF::Ewald {
                alpha: cfg.alpha,
                kmax: cfg.kmax,
                cutoffs,
            }),
            "DSF" => require_cutoffs(cfg, &path).map(|cutoffs| ElectrostaticFF::Dsf {
                alpha: cfg.alpha,
                cutoffs,
            }),
            "DebyeHuckel" => require_cutoffs(cfg, &path).map(|cutoffs| {
                ElectrostaticFF::DebyeHuckel { debye: cfg.debye, cutoffs }
            }),
            other => Err(BuildError::UnknownType { path: path.clone(), kind: other.to_string() }),
        };
        match (ff, pair_species(cfg, &path)) {
            (Ok(ff), Ok((a, b))) => {
                if let Err(e) = ffm.add_electrostatic(&a, &b, ff) {
                    errors.push(BuildError::UnknownSpecies { path, name: e.to_string() });
                }
            }
            (ff, species) => {
                if let Err(e) = ff {
                    errors.push(e);
                }
                if let Err(e) = species {
                    errors.push(e);
                }
            }
        }
    }

    for (i, cfg) in config.forcefields.constraints.iter().enumerate() {
        let path = format!("#/forcefields/constraints/{}", i);
        match cfg.constraint_type.as_str() {
            "DirectorRestriction" => {
                let d = cfg.director;
                let c = ConstraintFF::DirectorRestriction {
                    coeff: cfg.coefficient,
                    director: Vector3::new(d[0], d[1], d[2]),
                    axis: cfg.index.min(2),
                    limits: cfg.limits,
                };
                for name in &cfg.species {
                    if let Err(e) = ffm.add_constraint(name, c.clone()) {
                        errors.push(BuildError::UnknownSpecies {
                            path: path.clone(),
                            name: e.to_string(),
                        });
                    }
                }
            }
            other => errors.push(BuildError::UnknownType {
                path,
                kind: other.to_string(),
            }),
        }
    }

    ffm
}

fn resolve_species_list(names: &[String], path: &str, errors: &mut Vec<BuildError>) -> Vec<u32> {
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        match find_species(name) {
            Some(s) => out.push(s),
            None => errors.push(BuildError::UnknownSpecies {
                path: path.to_string(),
                name: name.clone(),
            }),
        }
    }
    out
}

fn build_move(
    cfg: &MoveConfig,
    seed: u64,
    path: &str,
    errors: &mut Vec<BuildError>,
) -> Option<Box<dyn Move>> {
    let mv: Box<dyn Move> = match cfg.move_type.as_str() {
        "Translate" => Box::new(TranslateMove::new(cfg.dx, seed)),
        "TranslatePrimitive" => Box::new(TranslatePrimitiveMove::new(cfg.dx, seed)),
        "Rotate" => Box::new(RotateMove::new(cfg.maxangle, seed)),
        "DirectorRotate" => Box::new(DirectorRotateMove::new(seed)),
        "FlipSpin" => Box::new(FlipSpinMove::new(seed)),
        "IdentityChange" => Box::new(IdentityChangeMove::new(seed)),
        "ChargeSwap" => Box::new(ChargeSwapMove::new(seed)),
        "ParticleSwap" => Box::new(ParticleSwapMove::new(seed)),
        "VolumeScale" => Box::new(VolumeScaleMove::new(cfg.pressure, cfg.dv, seed)),
        "VolumeSwap" => Box::new(VolumeSwapMove::new(cfg.dv, seed)),
        "SpeciesSwap" => {
            let restriction = match cfg.species.len() {
                0 => None,
                2 => {
                    let ids = resolve_species_list(&cfg.species, path, errors);
                    if ids.len() != 2 {
                        return None;
                    }
                    Some((ids[0], ids[1]))
                }
                n => {
                    errors.push(BuildError::BadValue {
                        path: format!("{}/species", path),
                        message: format!("expected 0 or 2 species, got {}", n),
                    });
                    return None;
                }
            };
            Box::new(SpeciesSwapMove::new(restriction, cfg.deep_swap, seed))
        }
        "RandomIdentity" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            if ids.is_empty() {
                return None;
            }
            Box::new(RandomIdentityMove::new(ids, seed))
        }
        "AnnealCharge" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            Box::new(AnnealChargeMove::new(ids, seed))
        }
        "AcidTitration" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            if ids.is_empty() {
                return None;
            }
            let mut mv = AcidTitrationMove::new(ids, cfg.proton_charge, cfg.mu, seed);
            mv.set_include_bonded(cfg.include_bonded);
            Box::new(mv)
        }
        "AcidReaction" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            let Some(ion_name) = &cfg.ion else {
                errors.push(BuildError::BadValue {
                    path: format!("{}/ion", path),
                    message: "a counter-ion species is required".to_string(),
                });
                return None;
            };
            let Some(ion) = find_species(ion_name) else {
                errors.push(BuildError::UnknownSpecies {
                    path: format!("{}/ion", path),
                    name: ion_name.clone(),
                });
                return None;
            };
            if ids.is_empty() {
                return None;
            }
            Box::new(AcidReactionMove::new(ids, ion, cfg.proton_charge, cfg.ph, cfg.pko, seed))
        }
        "InsertParticle" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            if ids.is_empty() {
                return None;
            }
            Box::new(InsertParticleMove::new(ids, cfg.multi_insertion, seed))
        }
        "DeleteParticle" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            if ids.is_empty() {
                return None;
            }
            Box::new(DeleteParticleMove::new(ids, seed))
        }
        "WidomInsertion" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            if ids.is_empty() {
                return None;
            }
            Box::new(WidomInsertionMove::new(ids, seed))
        }
        "CBMC" => {
            let ids = resolve_species_list(&cfg.species, path, errors);
            Box::new(CbmcMove::new(cfg.trials, cfg.rmin, cfg.rmax, ids, seed))
        }
        other => {
            errors.push(BuildError::UnknownType {
                path: path.to_string(),
                kind: other.to_string(),
            });
            return None;
        }
    };
    Some(mv)
}

/// Species whose prototypes must be stashed in every world for the given
/// move (insertions, ghost insertions, deletions and counter-ions).
fn stash_species(cfg: &MoveConfig) -> Vec<(String, usize)> {
    match cfg.move_type.as_str() {
        "InsertParticle" | "WidomInsertion" | "DeleteParticle" => cfg
            .species
            .iter()
            .map(|s| (s.clone(), cfg.stash_count))
            .collect(),
        "AcidReaction" => cfg
            .ion
            .iter()
            .map(|s| (s.clone(), cfg.stash_count))
            .collect(),
        _ => Vec::new(),
    }
}

fn prototype_for(species_name: &str, blueprints: &HashMap<String, BlueprintConfig>) -> ParticlePrototype {
    let species = species_id(species_name);
    match blueprints.get(species_name) {
        None => ParticlePrototype::site(species),
        Some(bp) => {
            let children = bp
                .children
                .iter()
                .map(|site| {
                    ParticlePrototype::site(species_id(&site.species))
                        .with_position(Vector3::new(
                            site.position[0],
                            site.position[1],
                            site.position[2],
                        ))
                        .with_director(Vector3::new(
                            site.director[0],
                            site.director[1],
                            site.director[2],
                        ))
                        .with_charge(site.charge)
                        .with_mass(site.mass)
                })
                .collect();
            ParticlePrototype::molecule(species, children, bp.bonds.clone())
        }
    }
}

fn build_observer(
    cfg: &ObserverConfig,
    path: &str,
    errors: &mut Vec<BuildError>,
) -> Option<(Box<dyn Observer>, usize)> {
    if cfg.frequency == 0 {
        errors.push(BuildError::BadValue {
            path: format!("{}/frequency", path),
            message: "observer frequency must be positive".to_string(),
        });
        return None;
    }
    match cfg.observer_type.as_str() {
        "DLMFile" => {
            let Some(prefix) = &cfg.file_prefix else {
                errors.push(BuildError::BadValue {
                    path: format!("{}/file_prefix", path),
                    message: "a file prefix is required".to_string(),
                });
                return None;
            };
            let mut flags = ObserverFlags::default();
            if let Some(f) = &cfg.flags {
                flags = ObserverFlags {
                    iteration: f.iteration,
                    temperature: f.temperature,
                    volume: f.volume,
                    density: f.density,
                    energy: f.energy,
                    pressure: f.pressure,
                    composition: f.composition,
                    acceptance: f.acceptance,
                    dos: f.dos,
                    particles: f.particles,
                };
            }
            Some((Box::new(DlmFileObserver::new(prefix, flags)), cfg.frequency))
        }
        "Console" => Some((Box::new(ConsoleObserver), cfg.frequency)),
        other => {
            errors.push(BuildError::UnknownType {
                path: path.to_string(),
                kind: other.to_string(),
            });
            None
        }
    }
}

fn build_order_parameter(
    cfg: &crate::config::DosConfig,
    hist: Histogram,
    world: &mut World,
    id_map: &HashMap<i64, ParticleRef>,
    errors: &mut Vec<BuildError>,
) -> Option<Box<dyn DosOrderParameter>> {
    let path = "#/simulation/dos/order_parameter";
    let op = &cfg.order_parameter;

    let resolve_group = |ids: &[i64], errors: &mut Vec<BuildError>| -> Option<Vec<ParticleRef>> {
        let mut group = Vec::with_capacity(ids.len());
        for id in ids {
            match id_map.get(id) {
                Some(&r) => group.push(r),
                None => {
                    errors.push(BuildError::BadValue {
                        path: path.to_string(),
                        message: format!("unknown particle id {}", id),
                    });
                    return None;
                }
            }
        }
        Some(group)
    };

    match op.op_type.as_str() {
        "WangLandau" => Some(Box::new(WangLandauOP::new(hist))),
        "ParticleDistance" => {
            let g1 = resolve_group(&op.group1, errors)?;
            let g2 = resolve_group(&op.group2, errors)?;
            Some(Box::new(ParticleDistanceOP::new(hist, g1, g2)))
        }
        "Rg" => {
            let g1 = resolve_group(&op.group1, errors)?;
            Some(Box::new(RadiusOfGyrationOP::new(hist, g1)))
        }
        "ChargeFraction" => {
            let g1 = resolve_group(&op.group1, errors)?;
            Some(Box::new(ChargeFractionOP::new(hist, g1, op.charge)))
        }
        "ElasticCoeff" => {
            let mode = match op.mode.as_str() {
                "splay" => ElasticMode::Splay,
                "twist" => ElasticMode::Twist,
                "bend" => ElasticMode::Bend,
                other => {
                    errors.push(BuildError::UnknownType {
                        path: format!("{}/mode", path),
                        kind: other.to_string(),
                    });
                    return None;
                }
            };
            let [xmin, xmax] = op.xrange;
            if xmin >= xmax {
                errors.push(BuildError::BadValue {
                    path: format!("{}/xrange", path),
                    message: "xmin must be below xmax".to_string(),
                });
                return None;
            }
            // The last layer is anchored; the derivative spans the distance
            // from the slab midpoint to the far wall.
            let dxj = world.h_matrix()[(0, 0)] - 0.5 * (xmax + xmin);
            Some(Box::new(ElasticCoeffOP::new(hist, world, dxj, [xmin, xmax], mode)))
        }
        other => {
            errors.push(BuildError::UnknownType {
                path: path.to_string(),
                kind: other.to_string(),
            });
            None
        }
    }
}

fn build_histogram(cfg: &crate::config::DosConfig, errors: &mut Vec<BuildError>) -> Option<Histogram> {
    let path = "#/simulation/dos";
    let [min, max] = cfg.interval;
    if min >= max {
        errors.push(BuildError::BadValue {
            path: format!("{}/interval", path),
            message: "minimum must be less than maximum".to_string(),
        });
        return None;
    }
    let mut hist = match (cfg.bin_count, cfg.bin_width) {
        (0, w) if w > 0.0 => Histogram::with_bin_width(min, max, w),
        (n, w) if n > 0 && w == 0.0 => Histogram::new(min, max, n),
        _ => {
            errors.push(BuildError::BadValue {
                path: path.to_string(),
                message: "exactly one of bin_count and bin_width must be given".to_string(),
            });
            return None;
        }
    };

    if let Some(values) = &cfg.values {
        if values.len() != hist.bin_count() {
            errors.push(BuildError::BadValue {
                path: format!("{}/values", path),
                message: format!("expected {} values", hist.bin_count()),
            });
            return None;
        }
        hist.set_values(values);
    }
    if let Some(counts) = &cfg.counts {
        if counts.len() != hist.bin_count() {
            errors.push(BuildError::BadValue {
                path: format!("{}/counts", path),
                message: format!("expected {} counts", hist.bin_count()),
            });
            return None;
        }
        for (bin, &c) in counts.iter().enumerate() {
            hist.set_count(bin, c);
        }
    }
    Some(hist)
}

/// Assembles a runnable engine from a parsed configuration.
///
/// Every detected problem is collected; the caller gets either a complete
/// engine or the full error list.
pub fn build_engine(config: &Config) -> Result<Engine, Vec<BuildError>> {
    let mut errors = Vec::new();

    match config.simulation.units.as_str() {
        "reduced" => {
            let _ = set_units(Units::reduced());
        }
        "real" => {
            let _ = set_units(Units::real());
        }
        other => errors.push(BuildError::UnknownType {
            path: "#/simulation/units".to_string(),
            kind: other.to_string(),
        }),
    }

    register_species(config);

    let mut worlds = Vec::new();
    let mut id_maps = Vec::new();
    for (i, cfg) in config.worlds.iter().enumerate() {
        let path = format!("#/worlds/{}", i);
        if let Some((world, id_map)) = build_world(cfg, &config.blueprints, &path, &mut errors) {
            worlds.push(world);
            id_maps.push(id_map);
        }
    }
    if worlds.is_empty() {
        errors.push(BuildError::BadValue {
            path: "#/worlds".to_string(),
            message: "at least one world is required".to_string(),
        });
    }

    let ffm = build_forcefields(config, &mut errors);

    let mut moves = MoveManager::new(config.simulation.seed);
    for (i, cfg) in config.moves.iter().enumerate() {
        let path = format!("#/moves/{}", i);
        if cfg.weight == 0 {
            errors.push(BuildError::BadValue {
                path: format!("{}/weight", path),
                message: "move weight must be a positive integer".to_string(),
            });
            continue;
        }
        let seed = cfg
            .seed
            .unwrap_or_else(|| config.simulation.seed.wrapping_add(7919 * (i as u64 + 1)));
        if let Some(mv) = build_move(cfg, seed, &path, &mut errors) {
            moves.add_move(mv, cfg.weight);
        }
        for (species_name, count) in stash_species(cfg) {
            if find_species(&species_name).is_none() {
                continue;
            }
            let proto = prototype_for(&species_name, &config.blueprints);
            for world in worlds.iter_mut() {
                world.register_prototype(&proto, count);
            }
        }
    }
    if config.moves.is_empty() {
        errors.push(BuildError::BadValue {
            path: "#/moves".to_string(),
            message: "at least one move is required".to_string(),
        });
    }

    let mut observers = Vec::new();
    for (i, cfg) in config.observers.iter().enumerate() {
        let path = format!("#/observers/{}", i);
        if let Some(obs) = build_observer(cfg, &path, &mut errors) {
            observers.push(obs);
        }
    }

    let sweeps = config.simulation.sweeps;
    match config.simulation.sim_type.as_str() {
        "Standard" => {
            if !errors.is_empty() {
                return Err(errors);
            }
            let mut manager = WorldManager::new(config.simulation.seed);
            for world in worlds {
                manager.add_world(world);
            }
            let mut simulation = StandardSimulation::new(manager, ffm, moves);
            for (obs, freq) in observers {
                simulation.add_observer(obs, freq);
            }
            info!("built Metropolis engine with {} sweeps", sweeps);
            Ok(Engine::Standard { simulation, sweeps })
        }
        "DOS" => {
            let Some(dos) = &config.simulation.dos else {
                errors.push(BuildError::BadValue {
                    path: "#/simulation".to_string(),
                    message: "DOS simulations need a dos sub-configuration".to_string(),
                });
                return Err(errors);
            };
            if worlds.len() != 1 {
                errors.push(BuildError::BadValue {
                    path: "#/worlds".to_string(),
                    message: "DOS sampling drives exactly one world".to_string(),
                });
            }
            let walker_count = dos.walkers.max(1);
            if dos.bin_count > 0 && dos.bin_count % walker_count != 0 {
                errors.push(BuildError::BadValue {
                    path: "#/simulation/dos/walkers".to_string(),
                    message: "bin count must divide evenly among walkers".to_string(),
                });
            }
            if !errors.is_empty() {
                return Err(errors);
            }

            let base_world = worlds.remove(0);
            let id_map = id_maps.remove(0);
            let [min, max] = dos.interval;
            let window = (max - min) / walker_count as f64;

            let mut walkers = Vec::with_capacity(walker_count);
            for wi in 0..walker_count {
                let mut world = base_world.clone();
                // Each walker samples its own sub-interval of the order
                // parameter range.
                let sub = crate::config::DosConfig {
                    interval: [min + wi as f64 * window, min + (wi + 1) as f64 * window],
                    bin_count: if dos.bin_count > 0 { dos.bin_count / walker_count } else { 0 },
                    bin_width: dos.bin_width,
                    scale_factor: dos.scale_factor,
                    target_flatness: dos.target_flatness,
                    reset_freq: dos.reset_freq,
                    sync_frequency: dos.sync_frequency,
                    walkers: walker_count,
                    // Preloaded bins only make sense for a single walker;
                    // windows would need re-slicing.
                    values: if walker_count == 1 { dos.values.clone() } else { None },
                    counts: if walker_count == 1 { dos.counts.clone() } else { None },
                    order_parameter: crate::config::OrderParameterConfig {
                        op_type: dos.order_parameter.op_type.clone(),
                        group1: dos.order_parameter.group1.clone(),
                        group2: dos.order_parameter.group2.clone(),
                        charge: dos.order_parameter.charge,
                        xrange: dos.order_parameter.xrange,
                        mode: dos.order_parameter.mode.clone(),
                    },
                };
                let Some(hist) = build_histogram(&sub, &mut errors) else {
                    return Err(errors);
                };
                let Some(op) = build_order_parameter(&sub, hist, &mut world, &id_map, &mut errors)
                else {
                    return Err(errors);
                };

                let mut walker = DosSimulation::new(world, ffm.clone(), moves.clone(), op);
                walker.set_target_flatness(dos.target_flatness);
                walker.set_reduction_factor(dos.scale_factor);
                walker.set_histogram_reset_frequency(dos.reset_freq);
                walkers.push(walker);
            }

            if walker_count == 1 {
                let mut simulation = walkers.pop().unwrap();
                for (obs, freq) in observers {
                    simulation.add_observer(obs, freq);
                }
                info!("built DOS engine with {} reductions", sweeps);
                Ok(Engine::Dos { simulation, sweeps })
            } else {
                // The master walker carries the observers.
                for (obs, freq) in observers {
                    walkers[0].add_observer(obs, freq);
                }
                info!(
                    "built multi-walker DOS engine: {} walkers, {} reductions",
                    walker_count, sweeps
                );
                Ok(Engine::MultiDos {
                    simulation: MultiWalkerDos::new(walkers, dos.sync_frequency),
                    sweeps,
                })
            }
        }
        other => {
            errors.push(BuildError::UnknownType {
                path: "#/simulation/type".to_string(),
                kind: other.to_string(),
            });
            Err(errors)
        }
    }
}
