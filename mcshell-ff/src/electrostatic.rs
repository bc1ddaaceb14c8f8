use std::f64::consts::PI;

use libm::erfc;
use mcshell_system::{units, Particle, World};
use nalgebra::Vector3;

use crate::interaction::Interaction;

/// Electrostatic pair forcefields.
///
/// Besides the real-space pair term each variant may expose a
/// reciprocal-space contribution evaluated once per full-world energy;
/// short-range-only methods return zero there.
#[derive(Clone, Debug)]
pub enum ElectrostaticFF {
    /// Ewald summation: screened real-space term with an implicit
    /// intramolecular correction for same-parent pairs, plus self-energy
    /// and a k-space sum in [`ElectrostaticFF::reciprocal_space`].
    Ewald {
        alpha: f64,
        kmax: i32,
        cutoffs: Vec<f64>,
    },
    /// Damped-shifted-force point charge interaction; discards reciprocal
    /// space entirely. See Fennell & Gezelter, J. Chem. Phys. 124, 234104
    /// (2006).
    Dsf { alpha: f64, cutoffs: Vec<f64> },
    /// Screened Coulomb (Debye-Hueckel) interaction.
    DebyeHuckel { debye: f64, cutoffs: Vec<f64> },
}

fn world_cutoff(cutoffs: &[f64], world_id: usize) -> f64 {
    cutoffs
        .get(world_id)
        .or_else(|| cutoffs.last())
        .copied()
        .unwrap_or(f64::INFINITY)
}

impl ElectrostaticFF {
    pub fn evaluate(
        &self,
        p1: &Particle,
        p2: &Particle,
        rij: &Vector3<f64>,
        world_id: usize,
    ) -> Interaction {
        let qq = units().charge_conv * p1.charge() * p2.charge();
        if qq == 0.0 {
            return Interaction::default();
        }
        let r = rij.norm();
        match self {
            ElectrostaticFF::Ewald { alpha, cutoffs, .. } => {
                let rc = world_cutoff(cutoffs, world_id);
                if r >= rc {
                    return Interaction::default();
                }
                let erfcr = erfc(alpha * r);
                let mut energy = qq * erfcr / r;
                let gauss = 2.0 * alpha / PI.sqrt() * (-alpha * alpha * r * r).exp();
                let mut virial = -qq * (erfcr / (r * r) + gauss / r) / r;

                // The k-space sum covers intramolecular pairs in full;
                // subtract the unscreened part for primitives sharing a
                // composite parent.
                let same_parent = match (p1.parent(), p2.parent()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                };
                if same_parent {
                    energy -= qq * (1.0 - erfcr) / r;
                    virial -= -qq * ((1.0 - erfcr) / (r * r) - gauss / r) / r;
                }
                Interaction::new(energy, virial)
            }
            ElectrostaticFF::Dsf { alpha, cutoffs } => {
                let rc = world_cutoff(cutoffs, world_id);
                if r >= rc {
                    return Interaction::default();
                }
                let gauss = |x: f64| 2.0 * alpha / PI.sqrt() * (-alpha * alpha * x * x).exp();
                let f_shift = erfc(alpha * rc) / (rc * rc) + gauss(rc) / rc;
                let energy = qq
                    * (erfc(alpha * r) / r - erfc(alpha * rc) / rc + f_shift * (r - rc));
                let force = qq * (erfc(alpha * r) / (r * r) + gauss(r) / r - f_shift);
                Interaction::new(energy, -force / r)
            }
            ElectrostaticFF::DebyeHuckel { debye, cutoffs } => {
                let rc = world_cutoff(cutoffs, world_id);
                if r >= rc {
                    return Interaction::default();
                }
                let screened = (-r / debye).exp();
                let energy = qq * screened / r;
                let virial = -qq * screened * (1.0 / (r * r) + 1.0 / (debye * r)) / r;
                Interaction::new(energy, virial)
            }
        }
    }

    /// Reciprocal-space energy of the whole world; zero for short-range methods.
    pub fn reciprocal_space(&self, world: &World) -> f64 {
        match self {
            ElectrostaticFF::Ewald { alpha, kmax, .. } => {
                let conv = units().charge_conv;
                let mut u = 0.0;

                // Self-energy.
                for &p in world.primitives() {
                    let q = world.particle(p).charge();
                    u -= alpha / PI.sqrt() * q * q;
                }

                let h = world.h_matrix();
                let coeff = 0.5 / (PI * world.volume());
                for kx in -kmax..*kmax {
                    for ky in -kmax..*kmax {
                        for kz in -kmax..*kmax {
                            if kx == 0 && ky == 0 && kz == 0 {
                                continue;
                            }
                            let ksq = (kx * kx + ky * ky + kz * kz) as f64;
                            if ksq > (kmax * kmax + 2) as f64 {
                                continue;
                            }
                            let hx = kx as f64 / h[(0, 0)];
                            let hy = ky as f64 / h[(1, 1)];
                            let hz = kz as f64 / h[(2, 2)];
                            let hsq = hx * hx + hy * hy + hz * hz;

                            let mut csum = 0.0;
                            let mut ssum = 0.0;
                            for &p in world.primitives() {
                                let particle = world.particle(p);
                                let q = particle.charge();
                                let x = particle.position();
                                let phase = 2.0 * PI * (x.x * hx + x.y * hy + x.z * hz);
                                csum += q * phase.cos();
                                ssum += q * phase.sin();
                            }
                            u += coeff / hsq
                                * (-PI * PI * hsq / (alpha * alpha)).exp()
                                * (csum * csum + ssum * ssum);
                        }
                    }
                }
                conv * u
            }
            ElectrostaticFF::Dsf { .. } | ElectrostaticFF::DebyeHuckel { .. } => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcshell_numerical::assert_eq_float;
    use mcshell_system::{species_id, ParticlePrototype, World};

    fn charged_pair(separation: f64, q1: f64, q2: f64) -> (World, Vec<usize>) {
        let s = species_id("elec-test-ion");
        let mut w = World::new([40.0, 40.0, 40.0], 12.0, 0.0, 1).unwrap();
        w.add_particle(
            &ParticlePrototype::site(s)
                .with_position(Vector3::new(10.0, 10.0, 10.0))
                .with_charge(q1),
        );
        w.add_particle(
            &ParticlePrototype::site(s)
                .with_position(Vector3::new(10.0 + separation, 10.0, 10.0))
                .with_charge(q2),
        );
        let ps = w.particles().to_vec();
        (w, ps)
    }

    #[test]
    fn dsf_energy_vanishes_at_cutoff() {
        let rc = 10.0;
        let (w, ps) = charged_pair(rc - 1e-9, 1.0, -1.0);
        let ff = ElectrostaticFF::Dsf { alpha: 0.2, cutoffs: vec![rc] };
        let rij = w.pair_displacement(ps[0], ps[1]);
        let i = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        assert_eq_float!(i.energy, 0.0, 1e-8);
    }

    #[test]
    fn ewald_real_space_is_screened_coulomb() {
        let (w, ps) = charged_pair(2.0, 1.0, -1.0);
        let ff = ElectrostaticFF::Ewald { alpha: 0.3, kmax: 5, cutoffs: vec![10.0] };
        let rij = w.pair_displacement(ps[0], ps[1]);
        let i = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        let expected = -erfc(0.3 * 2.0) / 2.0;
        assert_eq_float!(i.energy, expected, 1e-12);
    }

    #[test]
    fn ewald_self_energy_is_negative_for_charged_systems() {
        let (w, _) = charged_pair(2.0, 1.0, 1.0);
        let ff = ElectrostaticFF::Ewald { alpha: 0.3, kmax: 0, cutoffs: vec![10.0] };
        // kmax = 0 keeps only the self-energy part.
        let u = ff.reciprocal_space(&w);
        assert_eq_float!(u, -2.0 * 0.3 / std::f64::consts::PI.sqrt(), 1e-12);
    }

    #[test]
    fn neutral_pairs_do_not_interact() {
        let (w, ps) = charged_pair(2.0, 0.0, 1.0);
        let ff = ElectrostaticFF::DebyeHuckel { debye: 1.0, cutoffs: vec![10.0] };
        let rij = w.pair_displacement(ps[0], ps[1]);
        let i = ff.evaluate(w.particle(ps[0]), w.particle(ps[1]), &rij, 0);
        assert_eq!(i, Interaction::default());
    }
}
