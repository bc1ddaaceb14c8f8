use mcshell_statistics::Histogram;
use mcshell_system::{ParticleRef, World};

use crate::trait_order_parameter::DosOrderParameter;

/// Order parameter: the absolute mean charge of a group relative to a base
/// charge, `$|\sum_i q_i / (n\, q_{base})|$`.
pub struct ChargeFractionOP {
    hist: Histogram,
    group: Vec<ParticleRef>,
    base_charge: f64,
}

impl ChargeFractionOP {
    pub fn new(hist: Histogram, group: Vec<ParticleRef>, base_charge: f64) -> ChargeFractionOP {
        ChargeFractionOP { hist, group, base_charge }
    }
}

impl DosOrderParameter for ChargeFractionOP {
    fn evaluate(&mut self, world: &mut World) -> f64 {
        let total: f64 = self.group.iter().map(|&p| world.particle(p).charge()).sum();
        (total / (self.group.len() as f64 * self.base_charge)).abs()
    }

    fn histogram(&self) -> &Histogram {
        &self.hist
    }

    fn histogram_mut(&mut self) -> &mut Histogram {
        &mut self.hist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcshell_numerical::assert_eq_float;
    use mcshell_system::{species_id, ParticlePrototype, World};
    use nalgebra::Vector3;

    #[test]
    fn fraction_is_mean_charge_over_base() {
        let s = species_id("cftest-acid");
        let mut w = World::new([10.0, 10.0, 10.0], 2.0, 0.0, 1).unwrap();
        let mut group = vec![];
        for i in 0..4 {
            let q = if i < 3 { -1.0 } else { 0.0 };
            group.push(w.add_particle(
                &ParticlePrototype::site(s)
                    .with_position(Vector3::new(1.0 + i as f64, 5.0, 5.0))
                    .with_charge(q),
            ));
        }
        let mut op = ChargeFractionOP::new(Histogram::new(0.0, 1.0, 10), group, -1.0);
        assert_eq_float!(op.evaluate(&mut w), 0.75, 1e-12);
    }
}
