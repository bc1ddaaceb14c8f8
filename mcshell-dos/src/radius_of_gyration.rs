use mcshell_statistics::Histogram;
use mcshell_system::{ParticleRef, World};
use nalgebra::Vector3;

use crate::trait_order_parameter::DosOrderParameter;

/// Order parameter: the mass-weighted radius of gyration of a particle group.
pub struct RadiusOfGyrationOP {
    hist: Histogram,
    group: Vec<ParticleRef>,
}

impl RadiusOfGyrationOP {
    pub fn new(hist: Histogram, group: Vec<ParticleRef>) -> RadiusOfGyrationOP {
        RadiusOfGyrationOP { hist, group }
    }
}

impl DosOrderParameter for RadiusOfGyrationOP {
    fn evaluate(&mut self, world: &mut World) -> f64 {
        let mut centroid = Vector3::zeros();
        let mut mass = 0.0;
        for &p in &self.group {
            let particle = world.particle(p);
            centroid += particle.position() * particle.mass();
            mass += particle.mass();
        }
        if mass > 0.0 {
            centroid /= mass;
        }

        let mut rg2 = 0.0;
        for &p in &self.group {
            let particle = world.particle(p);
            let mut dr = particle.position() - centroid;
            world.minimum_image(&mut dr);
            rg2 += particle.mass() * dr.norm_squared();
        }
        (rg2 / mass).sqrt()
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

    #[test]
    fn symmetric_pair_has_half_separation_gyration() {
        let s = species_id("rgtest-site");
        let mut w = World::new([10.0, 10.0, 10.0], 2.0, 0.0, 1).unwrap();
        let a = w.add_particle(&ParticlePrototype::site(s).with_position(Vector3::new(4.0, 5.0, 5.0)));
        let b = w.add_particle(&ParticlePrototype::site(s).with_position(Vector3::new(6.0, 5.0, 5.0)));
        let mut op = RadiusOfGyrationOP::new(Histogram::new(0.0, 5.0, 10), vec![a, b]);
        assert_eq_float!(op.evaluate(&mut w), 1.0, 1e-12);
    }
}
