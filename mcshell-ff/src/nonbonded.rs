use mcshell_system::Particle;
use nalgebra::Vector3;

use crate::interaction::Interaction;

/// Pairwise non-bonded forcefields.
///
/// The variant tag selects the evaluator; every variant receives the
/// minimum-image displacement between the two primitives. Forcefields with
/// a cutoff carry one cutoff per world so multi-world simulations can use
/// distinct radii.
#[derive(Clone, Debug)]
pub enum NonbondedFF {
    /// Classic 12-6 Lennard-Jones potential.
    LennardJones {
        epsilon: f64,
        sigma: f64,
        cutoffs: Vec<f64>,
    },
    /// Lennard-Jones truncated at the cutoff and shifted to zero there.
    LennardJonesTS {
        epsilon: f64,
        sigma: f64,
        cutoffs: Vec<f64>,
    },
    /// Lebwohl-Lasher anisotropic potential between neighboring directors.
    LebwohlLasher { epsilon: f64, gamma: f64 },
    /// Ising-type spin coupling `$u = -J\,\mathbf{n}_1 \cdot \mathbf{n}_2$`
    /// between neighboring directors.
    IsingSpin { j: f64 },
}

fn world_cutoff(cutoffs: &[f64], world_id: usize) -> f64 {
    cutoffs
        .get(world_id)
        .or_else(|| cutoffs.last())
        .copied()
        .unwrap_or(f64::INFINITY)
}

fn lj_terms(epsilon: f64, sigma: f64, rsq: f64) -> (f64, f64) {
    let sr6 = (sigma * sigma / rsq).powi(3);
    let energy = 4.0 * epsilon * (sr6 * sr6 - sr6);
    let virial = 24.0 * epsilon * (sr6 - 2.0 * sr6 * sr6) / rsq;
    (energy, virial)
}

impl NonbondedFF {
    /// Evaluates the pair energy and virial for a minimum-image displacement `rij`.
    pub fn evaluate(
        &self,
        p1: &Particle,
        p2: &Particle,
        rij: &Vector3<f64>,
        world_id: usize,
    ) -> Interaction {
        match self {
            NonbondedFF::LennardJones { epsilon, sigma, cutoffs } => {
                let rc = world_cutoff(cutoffs, world_id);
                let rsq = rij.norm_squared();
                if rsq >= rc * rc {
                    return Interaction::default();
                }
                let (energy, virial) = lj_terms(*epsilon, *sigma, rsq);
                Interaction::new(energy, virial)
            }
            NonbondedFF::LennardJonesTS { epsilon, sigma, cutoffs } => {
                let rc = world_cutoff(cutoffs, world_id);
                let rsq = rij.norm_squared();
                if rsq >= rc * rc {
                    return Interaction::default();
                }
                let (energy, virial) = lj_terms(*epsilon, *sigma, rsq);
                let (shift, _) = lj_terms(*epsilon, *sigma, rc * rc);
                Interaction::new(energy - shift, virial)
            }
            NonbondedFF::LebwohlLasher { epsilon, gamma } => {
                let dot = p1.director().dot(&p2.director());
                Interaction::new(-(epsilon * (1.5 * dot * dot - 0.5) + gamma), 0.0)
            }
            NonbondedFF::IsingSpin { j } => {
                let dot = p1.director().dot(&p2.director());
                Interaction::new(-j * dot, 0.0)
            }
        }
    }

    /// The energy tail integral of this forcefield for a given world.
    ///
    /// The manager multiplies it by `$2\pi n_a n_b / V$`.
    pub fn energy_tail(&self, world_id: usize) -> f64 {
        match self {
            NonbondedFF::LennardJones { epsilon, sigma, cutoffs } => {
                let rc = world_cutoff(cutoffs, world_id);
                let sig3 = sigma.powi(3);
                let x3 = sig3 / rc.powi(3);
                4.0 / 3.0 * epsilon * sig3 * (x3 * x3 * x3 / 3.0 - x3)
            }
            _ => 0.0,
        }
    }

    /// The pressure tail integral of this forcefield for a given world.
    ///
    /// The manager multiplies it by `$4\pi n_a n_b / (3 V^2)$`.
    pub fn pressure_tail(&self, world_id: usize) -> f64 {
        match self {
            NonbondedFF::LennardJones { epsilon, sigma, cutoffs } => {
                let rc = world_cutoff(cutoffs, world_id);
                let sig3 = sigma.powi(3);
                let x3 = sig3 / rc.powi(3);
                4.0 * epsilon * sig3 * (2.0 / 3.0 * x3 * x3 * x3 - x3)
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcshell_numerical::assert_eq_float;
    use mcshell_system::{species_id, ParticlePrototype, World};

    fn two_particles(separation: f64) -> (World, Vector3<f64>) {
        let s = species_id("nbtest-lj");
        let mut w = World::new([20.0, 20.0, 20.0], 5.0, 0.0, 1).unwrap();
        w.add_particle(&ParticlePrototype::site(s).with_position(Vector3::new(1.0, 1.0, 1.0)));
        w.add_particle(
            &ParticlePrototype::site(s).with_position(Vector3::new(1.0 + separation, 1.0, 1.0)),
        );
        let ps = w.particles().to_vec();
        let rij = w.pair_displacement(ps[0], ps[1]);
        (w, rij)
    }

    #[test]
    fn lj_minimum_sits_at_two_to_the_sixth() {
        let rmin = 2f64.powf(1.0 / 6.0);
        let (w, rij) = two_particles(rmin);
        let ff = NonbondedFF::LennardJones { epsilon: 1.0, sigma: 1.0, cutoffs: vec![5.0] };
        let ps = w.particles();
        let i = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        assert_eq_float!(i.energy, -1.0, 1e-12);
        assert_eq_float!(i.virial, 0.0, 1e-10);
    }

    #[test]
    fn lj_vanishes_beyond_cutoff() {
        let (w, rij) = two_particles(5.5);
        let ff = NonbondedFF::LennardJones { epsilon: 1.0, sigma: 1.0, cutoffs: vec![5.0] };
        let ps = w.particles();
        let i = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        assert_eq!(i, Interaction::default());
    }

    #[test]
    fn truncated_shifted_lj_is_zero_at_cutoff() {
        let rc = 3.0;
        let (w, rij) = two_particles(rc - 1e-9);
        let ff = NonbondedFF::LennardJonesTS { epsilon: 1.0, sigma: 1.0, cutoffs: vec![rc] };
        let ps = w.particles();
        let i = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        assert_eq_float!(i.energy, 0.0, 1e-6);
    }

    #[test]
    fn lebwohl_lasher_prefers_aligned_directors() {
        let (mut w, rij) = two_particles(1.0);
        let ff = NonbondedFF::LebwohlLasher { epsilon: 1.0, gamma: 0.0 };
        let ps = w.particles().to_vec();

        let aligned = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        assert_eq_float!(aligned.energy, -1.0, 1e-12);

        w.set_director(ps[1], Vector3::new(1.0, 0.0, 0.0));
        let orthogonal = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        assert_eq_float!(orthogonal.energy, 0.5, 1e-12);
    }

    #[test]
    fn per_world_cutoffs_fall_back_to_last() {
        let ff = NonbondedFF::LennardJones { epsilon: 1.0, sigma: 1.0, cutoffs: vec![3.0, 4.0] };
        assert_eq_float!(ff.energy_tail(1), ff.energy_tail(7), 1e-15);
        assert!(ff.energy_tail(0) != ff.energy_tail(1));
    }
}
