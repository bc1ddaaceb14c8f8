use nalgebra::Vector3;
use std::sync::atomic::{AtomicU32, Ordering};

/// Index of a particle record inside a world's arena.
pub type ParticleRef = usize;

static NEXT_GLOBAL_ID: AtomicU32 = AtomicU32::new(0);

pub(crate) fn next_global_id() -> u32 {
    NEXT_GLOBAL_ID.fetch_add(1, Ordering::Relaxed)
}

/// A particle record: either a primitive site or a composite whose state is
/// derived from its children.
///
/// Records live in a per-world arena and reference each other by
/// [`ParticleRef`] indices. A composite's position is the mass-weighted
/// centroid of its children; its mass and charge are the sums over children.
/// All mutation goes through the owning [`World`](crate::World) so that
/// composite invariants, composition counts and change events stay
/// consistent.
#[derive(Clone, Debug)]
pub struct Particle {
    pub(crate) id: u32,
    pub(crate) species: u32,
    pub(crate) position: Vector3<f64>,
    pub(crate) director: Vector3<f64>,
    pub(crate) checkpoint: Vector3<f64>,
    pub(crate) charge: f64,
    pub(crate) mass: f64,
    pub(crate) protonated: bool,
    pub(crate) parent: Option<ParticleRef>,
    pub(crate) children: Vec<ParticleRef>,
    pub(crate) neighbors: Vec<ParticleRef>,
    pub(crate) bonded: Vec<ParticleRef>,
}

impl Particle {
    pub(crate) fn new(species: u32) -> Particle {
        Particle {
            id: next_global_id(),
            species,
            position: Vector3::zeros(),
            director: Vector3::new(0.0, 0.0, 1.0),
            checkpoint: Vector3::zeros(),
            charge: 0.0,
            mass: 1.0,
            protonated: false,
            parent: None,
            children: Vec::new(),
            neighbors: Vec::with_capacity(64),
            bonded: Vec::new(),
        }
    }

    /// Process-wide unique identifier of this record.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Integer species id (see [`species_id`](crate::species_id)).
    pub fn species(&self) -> u32 {
        self.species
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn director(&self) -> Vector3<f64> {
        self.director
    }

    /// Position recorded at the last neighbor-list rebuild.
    pub fn checkpoint(&self) -> Vector3<f64> {
        self.checkpoint
    }

    /// Displacement accumulated since the last neighbor-list rebuild.
    pub fn checkpoint_distance(&self) -> Vector3<f64> {
        self.position - self.checkpoint
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Protonation flag used by the titration and reaction moves.
    pub fn protonated(&self) -> bool {
        self.protonated
    }

    pub fn parent(&self) -> Option<ParticleRef> {
        self.parent
    }

    pub fn children(&self) -> &[ParticleRef] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Non-bonded neighbors within the neighbor radius.
    pub fn neighbors(&self) -> &[ParticleRef] {
        &self.neighbors
    }

    /// Bonded neighbors; bonds carry no cutoff.
    pub fn bonded_neighbors(&self) -> &[ParticleRef] {
        &self.bonded
    }
}

/// Which property of a particle changed, with the value it had before.
#[derive(Clone, Copy, Debug)]
pub enum ParticleChange {
    Position { old: Vector3<f64> },
    Director { old: Vector3<f64> },
    Charge { old: f64 },
    Species { old: u32 },
}

/// A change event published by a world when particle state mutates.
///
/// Events carry the particle's current position and director alongside the
/// old value of the changed property, so subscribers can update incremental
/// state (such as a Q-tensor average) without touching the world.
#[derive(Clone, Copy, Debug)]
pub struct ParticleEvent {
    pub id: u32,
    pub particle: ParticleRef,
    pub position: Vector3<f64>,
    pub director: Vector3<f64>,
    pub change: ParticleChange,
}

/// A detached particle description: a blueprint used for stashed prototypes,
/// configuration input and cross-world transfer.
///
/// For a composite the `position` field is ignored on insertion; the
/// centroid is derived from the children, whose positions are interpreted
/// relative to it. `bonds` lists bonded pairs among children by index.
#[derive(Clone, Debug)]
pub struct ParticlePrototype {
    pub species: u32,
    pub position: Vector3<f64>,
    pub director: Vector3<f64>,
    pub charge: f64,
    pub mass: f64,
    pub protonated: bool,
    pub children: Vec<ParticlePrototype>,
    pub bonds: Vec<(usize, usize)>,
}

impl ParticlePrototype {
    /// A primitive site of a given species with unit mass and no charge.
    pub fn site(species: u32) -> ParticlePrototype {
        ParticlePrototype {
            species,
            position: Vector3::zeros(),
            director: Vector3::new(0.0, 0.0, 1.0),
            charge: 0.0,
            mass: 1.0,
            protonated: false,
            children: Vec::new(),
            bonds: Vec::new(),
        }
    }

    /// A composite of the given children; mass and charge are derived on insertion.
    pub fn molecule(
        species: u32,
        children: Vec<ParticlePrototype>,
        bonds: Vec<(usize, usize)>,
    ) -> ParticlePrototype {
        ParticlePrototype {
            species,
            position: Vector3::zeros(),
            director: Vector3::new(0.0, 0.0, 1.0),
            charge: 0.0,
            mass: 0.0,
            protonated: false,
            children,
            bonds,
        }
    }

    pub fn with_position(mut self, position: Vector3<f64>) -> ParticlePrototype {
        self.position = position;
        self
    }

    pub fn with_director(mut self, director: Vector3<f64>) -> ParticlePrototype {
        self.director = director;
        self
    }

    pub fn with_charge(mut self, charge: f64) -> ParticlePrototype {
        self.charge = charge;
        self
    }

    pub fn with_mass(mut self, mass: f64) -> ParticlePrototype {
        self.mass = mass;
        self
    }

    pub fn with_protonated(mut self, protonated: bool) -> ParticlePrototype {
        self.protonated = protonated;
        self
    }
}
