use mcshell_dos::DosOrderParameter;
use mcshell_ff::ForceFieldManager;
use mcshell_system::{World, WorldManager};
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::Rng;

/// Test hook forcing the outcome of a move regardless of the acceptance
/// probability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOverride {
    None,
    ForceAccept,
    ForceReject,
}

/// Counts attempted and rejected perturbations of a move.
#[derive(Clone, Copy, Debug, Default)]
pub struct MoveStatistics {
    pub performed: u64,
    pub rejected: u64,
}

impl MoveStatistics {
    /// Fraction of attempts that were accepted; 0 before the first attempt.
    pub fn acceptance_ratio(&self) -> f64 {
        if self.performed == 0 {
            return 0.0;
        }
        1.0 - self.rejected as f64 / self.performed as f64
    }

    pub fn reset(&mut self) {
        self.performed = 0;
        self.rejected = 0;
    }
}

/// A single-step Monte Carlo perturbation with its ensemble-specific
/// accept/reject rule.
///
/// Every move follows a strict propose/commit/rollback protocol: on
/// rejection all mutated state is restored to its pre-move value. Moves
/// that cannot draw the objects they need return without counting an
/// attempt. Moves are `Send` so density-of-states walkers can own their
/// move sets on worker threads.
pub trait Move: Send {
    /// Metropolis path: perturb a world drawn from the manager.
    fn perform(&mut self, wm: &mut WorldManager, ffm: &ForceFieldManager, ov: MoveOverride);

    /// Flat-histogram path: perturb one world under an order-parameter bias.
    fn perform_dos(
        &mut self,
        world: &mut World,
        ffm: &ForceFieldManager,
        op: &mut dyn DosOrderParameter,
        ov: MoveOverride,
    );

    fn acceptance_ratio(&self) -> f64;

    fn reset_acceptance_ratio(&mut self);

    fn name(&self) -> &'static str;

    fn seed(&self) -> u64;

    fn box_clone(&self) -> Box<dyn Move>;
}

impl Clone for Box<dyn Move> {
    fn clone(&self) -> Box<dyn Move> {
        self.box_clone()
    }
}

/// Applies the override, otherwise accepts with probability `p`.
pub(crate) fn decide(p: f64, rng: &mut SmallRng, ov: MoveOverride) -> bool {
    match ov {
        MoveOverride::ForceAccept => true,
        MoveOverride::ForceReject => false,
        MoveOverride::None => rng.gen_range(0.0..1.0) < p.min(1.0),
    }
}

/// Uniform position inside the box, `H u` with `u ~ U(0,1)^3`.
pub(crate) fn uniform_position(rng: &mut SmallRng, world: &World) -> Vector3<f64> {
    let u = Vector3::new(
        rng.gen_range(0.0..1.0),
        rng.gen_range(0.0..1.0),
        rng.gen_range(0.0..1.0),
    );
    world.h_matrix() * u
}
