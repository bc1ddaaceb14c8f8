use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// The full simulation input document.
///
/// One JSON object drives the engine: worlds, forcefields, moves, the
/// simulation schedule and observers. Site entries inside a world are
/// heterogeneous arrays `[id, species, [x,y,z], [ux,uy,uz]?, charge?,
/// mass?]` and are resolved by the builder.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub worlds: Vec<WorldConfig>,
    #[serde(default)]
    pub forcefields: ForcefieldsConfig,
    #[serde(default)]
    pub moves: Vec<MoveConfig>,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub observers: Vec<ObserverConfig>,
    #[serde(default)]
    pub blueprints: HashMap<String, BlueprintConfig>,
}

impl Config {
    /// Parses a configuration from a JSON string.
    pub fn from_json(text: &str) -> Result<Config, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldConfig {
    #[serde(rename = "type", default = "default_world_type")]
    pub world_type: String,
    pub dimensions: [f64; 3],
    pub nlist_cutoff: f64,
    #[serde(default)]
    pub skin_thickness: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub temperature: f64,
    #[serde(default)]
    pub periodic: Option<PeriodicConfig>,
    #[serde(default = "default_cell_ratio")]
    pub cell_ratio: f64,
    /// `[species, count]` pairs describing the composition.
    #[serde(default)]
    pub components: Vec<(String, usize)>,
    /// Site rows `[id, species, [x,y,z], [ux,uy,uz]?, charge?, mass?]`.
    #[serde(default)]
    pub particles: Vec<Value>,
    /// Per-species chemical potentials for insertion/deletion moves.
    #[serde(default)]
    pub chemical_potentials: HashMap<String, f64>,
    /// Per-species thermal de Broglie wavelengths.
    #[serde(default)]
    pub wavelengths: HashMap<String, f64>,
}

fn default_world_type() -> String {
    "Simple".to_string()
}

fn default_seed() -> u64 {
    1090
}

fn default_cell_ratio() -> f64 {
    0.2
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodicConfig {
    #[serde(default = "default_true")]
    pub x: bool,
    #[serde(default = "default_true")]
    pub y: bool,
    #[serde(default = "default_true")]
    pub z: bool,
}

fn default_true() -> bool {
    true
}

/// A molecule blueprint: child sites with relative positions and bonds
/// among them by child index.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlueprintConfig {
    pub children: Vec<BlueprintSite>,
    #[serde(default)]
    pub bonds: Vec<(usize, usize)>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlueprintSite {
    pub species: String,
    #[serde(default)]
    pub position: [f64; 3],
    #[serde(default = "default_director")]
    pub director: [f64; 3],
    #[serde(default)]
    pub charge: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
}

fn default_director() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

fn default_mass() -> f64 {
    1.0
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForcefieldsConfig {
    #[serde(default)]
    pub nonbonded: Vec<PairFFConfig>,
    #[serde(default)]
    pub bonded: Vec<PairFFConfig>,
    #[serde(default)]
    pub electrostatic: Vec<PairFFConfig>,
    #[serde(default)]
    pub constraints: Vec<ConstraintConfig>,
}

/// A pair forcefield entry; `parameters` are interpreted per `type`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairFFConfig {
    #[serde(rename = "type")]
    pub ff_type: String,
    pub species: Vec<String>,
    #[serde(default)]
    pub epsilon: f64,
    #[serde(default)]
    pub sigma: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub j: f64,
    #[serde(default)]
    pub k: f64,
    #[serde(default)]
    pub r0: f64,
    #[serde(default)]
    pub rmax: f64,
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub kmax: i32,
    #[serde(default)]
    pub debye: f64,
    /// Per-world cutoff list.
    #[serde(default)]
    pub rcut: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintConfig {
    #[serde(rename = "type")]
    pub constraint_type: String,
    pub species: Vec<String>,
    #[serde(default)]
    pub coefficient: f64,
    #[serde(default = "default_director")]
    pub director: [f64; 3],
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub limits: [f64; 2],
}

/// One move entry, dispatched by `type`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoveConfig {
    #[serde(rename = "type")]
    pub move_type: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub dx: f64,
    #[serde(default)]
    pub dv: f64,
    #[serde(default)]
    pub maxangle: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub species: Vec<String>,
    #[serde(default)]
    pub ion: Option<String>,
    #[serde(default = "default_proton_charge")]
    pub proton_charge: f64,
    #[serde(default)]
    pub mu: f64,
    #[serde(default)]
    pub ph: f64,
    #[serde(default)]
    pub pko: f64,
    #[serde(default = "default_true")]
    pub include_bonded: bool,
    #[serde(default)]
    pub multi_insertion: bool,
    #[serde(default = "default_stash_count")]
    pub stash_count: usize,
    #[serde(default)]
    pub deep_swap: bool,
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default)]
    pub rmin: f64,
    #[serde(default)]
    pub rmax: f64,
}

fn default_weight() -> u32 {
    1
}

fn default_proton_charge() -> f64 {
    1.0
}

fn default_stash_count() -> usize {
    100
}

fn default_trials() -> usize {
    8
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(rename = "type")]
    pub sim_type: String,
    pub sweeps: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default)]
    pub dos: Option<DosConfig>,
}

fn default_units() -> String {
    "reduced".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DosConfig {
    pub interval: [f64; 2],
    #[serde(default)]
    pub bin_count: usize,
    #[serde(default)]
    pub bin_width: f64,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default = "default_target_flatness")]
    pub target_flatness: f64,
    #[serde(default)]
    pub reset_freq: usize,
    #[serde(default = "default_sync_frequency")]
    pub sync_frequency: usize,
    #[serde(default = "default_walkers")]
    pub walkers: usize,
    /// Pre-loaded log-DOS values, e.g. to continue a previous estimate.
    #[serde(default)]
    pub values: Option<Vec<f64>>,
    /// Pre-loaded bin counts.
    #[serde(default)]
    pub counts: Option<Vec<u64>>,
    pub order_parameter: OrderParameterConfig,
}

fn default_scale_factor() -> f64 {
    0.5
}

fn default_target_flatness() -> f64 {
    0.8
}

fn default_sync_frequency() -> usize {
    100
}

fn default_walkers() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderParameterConfig {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub group1: Vec<i64>,
    #[serde(default)]
    pub group2: Vec<i64>,
    #[serde(default)]
    pub charge: f64,
    #[serde(default)]
    pub xrange: [f64; 2],
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "twist".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObserverConfig {
    #[serde(rename = "type")]
    pub observer_type: String,
    pub frequency: usize,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub flags: Option<ObserverFlagsConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObserverFlagsConfig {
    #[serde(default = "default_true")]
    pub iteration: bool,
    #[serde(default = "default_true")]
    pub temperature: bool,
    #[serde(default = "default_true")]
    pub volume: bool,
    #[serde(default = "default_true")]
    pub density: bool,
    #[serde(default = "default_true")]
    pub energy: bool,
    #[serde(default = "default_true")]
    pub pressure: bool,
    #[serde(default = "default_true")]
    pub composition: bool,
    #[serde(default)]
    pub acceptance: bool,
    #[serde(default)]
    pub dos: bool,
    #[serde(default)]
    pub particles: bool,
}
