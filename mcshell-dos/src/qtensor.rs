use log::warn;
use nalgebra::{Matrix3, Vector3};

use mcshell_system::{ParticleChange, ParticleEvent, World};

/// Running average of the nematic Q-tensor over a spatial slab, updated
/// incrementally from particle change events.
///
/// The slab selects particles whose coordinate along `axis` lies within
/// `limits`. The leading eigenvector of the averaged tensor is the regional
/// director.
#[derive(Clone, Debug)]
pub struct QTensorAccumulator {
    q: Matrix3<f64>,
    axis: usize,
    limits: [f64; 2],
    count: usize,
    director: Vector3<f64>,
    warned: bool,
}

fn outer(u: &Vector3<f64>) -> Matrix3<f64> {
    u * u.transpose()
}

impl QTensorAccumulator {
    /// Initializes the average over all primitives currently in the slab.
    pub fn new(world: &World, axis: usize, limits: [f64; 2]) -> QTensorAccumulator {
        let mut q = Matrix3::zeros();
        let mut count = 0usize;
        for &p in world.primitives() {
            let particle = world.particle(p);
            if limits[0] <= particle.position()[axis] && particle.position()[axis] <= limits[1] {
                count += 1;
                q += outer(&particle.director()) - Matrix3::identity() / 3.0;
            }
        }
        if count > 0 {
            q *= 3.0 / (2.0 * count as f64);
        }
        let mut acc = QTensorAccumulator {
            q,
            axis,
            limits,
            count,
            director: Vector3::new(0.0, 0.0, 1.0),
            warned: false,
        };
        acc.refresh();
        acc
    }

    fn in_region(&self, position: &Vector3<f64>) -> bool {
        let c = position[self.axis];
        self.limits[0] <= c && c <= self.limits[1]
    }

    /// Folds one particle change event into the running average.
    pub fn apply(&mut self, event: &ParticleEvent) {
        match event.change {
            ParticleChange::Director { old } => {
                if self.in_region(&event.position) && self.count > 0 {
                    let n = self.count as f64;
                    self.q += 3.0 / (2.0 * n) * (outer(&event.director) - outer(&old));
                    self.refresh();
                }
            }
            ParticleChange::Position { old } => {
                let was_in = self.in_region(&old);
                let is_in = self.in_region(&event.position);
                if !was_in && is_in {
                    let n = self.count as f64;
                    self.q *= n / (n + 1.0);
                    self.count += 1;
                    let n = self.count as f64;
                    self.q += 3.0 / (2.0 * n) * (outer(&event.director) - Matrix3::identity() / 3.0);
                    self.refresh();
                } else if was_in && !is_in && self.count > 1 {
                    let n = self.count as f64;
                    self.q *= n / (n - 1.0);
                    self.count -= 1;
                    let n = self.count as f64;
                    self.q -= 3.0 / (2.0 * n) * (outer(&event.director) - Matrix3::identity() / 3.0);
                    self.refresh();
                }
            }
            _ => {}
        }
    }

    fn refresh(&mut self) {
        let eigen = self.q.symmetric_eigen();
        let mut imax = 0;
        for i in 1..3 {
            if eigen.eigenvalues[i] > eigen.eigenvalues[imax] {
                imax = i;
            }
        }
        // A degenerate leading eigenvalue leaves the director undefined;
        // keep the previous eigenpair in place.
        let mut sorted = [eigen.eigenvalues[0], eigen.eigenvalues[1], eigen.eigenvalues[2]];
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        if (sorted[0] - sorted[1]).abs() < 1e-12 {
            if !self.warned {
                warn!("degenerate Q-tensor spectrum; keeping previous director");
                self.warned = true;
            }
            return;
        }
        self.director = eigen.eigenvectors.column(imax).into_owned();
    }

    /// The current regional director: the leading eigenvector of the
    /// averaged Q-tensor.
    pub fn director(&self) -> Vector3<f64> {
        self.director
    }

    /// Number of particles currently inside the slab.
    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcshell_numerical::assert_eq_float;
    use mcshell_system::{species_id, ParticlePrototype, World};

    fn aligned_world(n: usize, director: Vector3<f64>) -> World {
        let s = species_id("qtest-rod");
        let mut w = World::new([10.0, 10.0, 10.0], 2.0, 0.0, 1).unwrap();
        for i in 0..n {
            w.add_particle(
                &ParticlePrototype::site(s)
                    .with_position(Vector3::new(1.0 + i as f64, 5.0, 5.0))
                    .with_director(director),
            );
        }
        w
    }

    #[test]
    fn aligned_directors_give_a_sharp_director() {
        let w = aligned_world(6, Vector3::new(0.0, 0.0, 1.0));
        let acc = QTensorAccumulator::new(&w, 0, [0.0, 10.0]);
        assert_eq!(acc.count(), 6);
        assert_eq_float!(acc.director().z.abs(), 1.0, 1e-10);
    }

    #[test]
    fn incremental_updates_track_a_rebuild() {
        let mut w = aligned_world(6, Vector3::new(0.0, 0.0, 1.0));
        let mut acc = QTensorAccumulator::new(&w, 0, [0.0, 10.0]);
        w.set_event_recording(true);

        let p = w.particles()[2];
        w.set_director(p, Vector3::new(1.0, 0.0, 0.0));
        for event in w.drain_events() {
            acc.apply(&event);
        }

        let fresh = QTensorAccumulator::new(&w, 0, [0.0, 10.0]);
        for i in 0..3 {
            assert_eq_float!(acc.director()[i].abs(), fresh.director()[i].abs(), 1e-9);
        }
    }

    #[test]
    fn slab_membership_follows_position_events() {
        let mut w = aligned_world(4, Vector3::new(0.0, 0.0, 1.0));
        let mut acc = QTensorAccumulator::new(&w, 0, [0.0, 3.0]);
        assert_eq!(acc.count(), 3);
        w.set_event_recording(true);

        // Move a particle out of the slab, then back in.
        let p = w.particles()[0];
        w.set_position(p, Vector3::new(8.0, 5.0, 5.0));
        for event in w.drain_events() {
            acc.apply(&event);
        }
        assert_eq!(acc.count(), 2);

        w.set_position(p, Vector3::new(2.0, 5.0, 5.0));
        for event in w.drain_events() {
            acc.apply(&event);
        }
        assert_eq!(acc.count(), 3);
    }
}
