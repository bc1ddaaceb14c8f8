use mcshell_statistics::Histogram;
use mcshell_system::{ParticleRef, World};
use nalgebra::Vector3;

use crate::trait_order_parameter::DosOrderParameter;

/// Order parameter: the minimum-image distance between the mass-weighted
/// centroids of two particle groups.
pub struct ParticleDistanceOP {
    hist: Histogram,
    group1: Vec<ParticleRef>,
    group2: Vec<ParticleRef>,
}

fn group_centroid(world: &World, group: &[ParticleRef]) -> Vector3<f64> {
    let mut centroid = Vector3::zeros();
    let mut mass = 0.0;
    for &p in group {
        let particle = world.particle(p);
        centroid += particle.position() * particle.mass();
        mass += particle.mass();
    }
    if mass > 0.0 {
        centroid /= mass;
    }
    centroid
}

impl ParticleDistanceOP {
    pub fn new(hist: Histogram, group1: Vec<ParticleRef>, group2: Vec<ParticleRef>) -> ParticleDistanceOP {
        ParticleDistanceOP { hist, group1, group2 }
    }
}

impl DosOrderParameter for ParticleDistanceOP {
    fn evaluate(&mut self, world: &mut World) -> f64 {
        let mut r = group_centroid(world, &self.group2) - group_centroid(world, &self.group1);
        world.minimum_image(&mut r);
        r.norm()
    }

    fn histogram(&self) -> &Histogram {
        &self.hist
    }

    fn histogram_mut(&mut self) -> &mut Histogram {
        &mut self.hist
    }
}
