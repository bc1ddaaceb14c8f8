use mcshell_system::Particle;
use nalgebra::Vector3;

use crate::interaction::Interaction;

/// Bonded pair forcefields, evaluated over bonded-neighbor lists with no cutoff.
#[derive(Clone, Debug)]
pub enum BondedFF {
    /// Harmonic spring `$u = \tfrac{1}{2} k (r - r_0)^2$`.
    Harmonic { k: f64, r0: f64 },
    /// Finitely extensible nonlinear elastic bond,
    /// `$u = -\tfrac{1}{2} k r_{max}^2 \ln(1 - (r/r_{max})^2)$`.
    /// See Kremer & Grest, J. Chem. Phys. 92, 5057 (1990).
    Fene { k: f64, rmax: f64 },
}

impl BondedFF {
    pub fn evaluate(
        &self,
        _p1: &Particle,
        _p2: &Particle,
        rij: &Vector3<f64>,
        _world_id: usize,
    ) -> Interaction {
        let r = rij.norm();
        match self {
            BondedFF::Harmonic { k, r0 } => {
                let energy = 0.5 * k * (r - r0) * (r - r0);
                let virial = k * (r - r0) / r;
                Interaction::new(energy, virial)
            }
            BondedFF::Fene { k, rmax } => {
                let x = (r / rmax) * (r / rmax);
                if x >= 1.0 {
                    // Overstretched bond: infinitely penalized, the move
                    // proposing it is always rejected.
                    return Interaction::new(f64::INFINITY, 0.0);
                }
                let energy = -0.5 * k * rmax * rmax * (1.0 - x).ln();
                let virial = k / (1.0 - x);
                Interaction::new(energy, virial)
            }
        }
    }
}
