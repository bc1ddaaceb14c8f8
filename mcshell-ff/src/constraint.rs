use mcshell_system::{Particle, World};
use nalgebra::Vector3;

/// Soft constraint potentials evaluated per particle and summed into the
/// connectivity energy channel.
#[derive(Clone, Debug)]
pub enum ConstraintFF {
    /// Couples particle directors to a preferred axis inside a spatial slab:
    /// `$u = -c\,P_2(\mathbf{u} \cdot \mathbf{n})$` for particles whose
    /// coordinate along `axis` lies within `limits`.
    DirectorRestriction {
        coeff: f64,
        director: Vector3<f64>,
        axis: usize,
        limits: [f64; 2],
    },
}

impl ConstraintFF {
    /// Constraint energy of a single particle; zero outside the region.
    pub fn evaluate(&self, particle: &Particle) -> f64 {
        match self {
            ConstraintFF::DirectorRestriction { coeff, director, axis, limits } => {
                let coord = particle.position()[*axis];
                if coord < limits[0] || coord > limits[1] {
                    return 0.0;
                }
                let dot = particle.director().dot(director);
                -coeff * (1.5 * dot * dot - 0.5)
            }
        }
    }

    /// Constraint energy summed over all primitives of a world.
    pub fn evaluate_world(&self, world: &World) -> f64 {
        world
            .primitives()
            .iter()
            .map(|&p| self.evaluate(world.particle(p)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcshell_numerical::assert_eq_float;
    use mcshell_system::{species_id, ParticlePrototype, World};

    #[test]
    fn restriction_applies_only_inside_the_slab() {
        let s = species_id("ctest-rod");
        let mut w = World::new([10.0, 10.0, 10.0], 2.0, 0.0, 1).unwrap();
        let inside = w.add_particle(
            &ParticlePrototype::site(s)
                .with_position(Vector3::new(1.0, 5.0, 5.0))
                .with_director(Vector3::new(0.0, 0.0, 1.0)),
        );
        let outside = w.add_particle(
            &ParticlePrototype::site(s)
                .with_position(Vector3::new(8.0, 5.0, 5.0))
                .with_director(Vector3::new(0.0, 0.0, 1.0)),
        );
        let c = ConstraintFF::DirectorRestriction {
            coeff: 2.0,
            director: Vector3::new(0.0, 0.0, 1.0),
            axis: 0,
            limits: [0.0, 2.0],
        };
        assert_eq_float!(c.evaluate(w.particle(inside)), -2.0, 1e-12);
        assert_eq_float!(c.evaluate(w.particle(outside)), 0.0, 1e-12);
        assert_eq_float!(c.evaluate_world(&w), -2.0, 1e-12);

        // A perpendicular director is penalized instead.
        w.set_director(inside, Vector3::new(1.0, 0.0, 0.0));
        assert_eq_float!(c.evaluate(w.particle(inside)), 1.0, 1e-12);
    }
}
