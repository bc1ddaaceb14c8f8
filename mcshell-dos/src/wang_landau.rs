use mcshell_statistics::Histogram;
use mcshell_system::{Energy, World};

use crate::trait_order_parameter::DosOrderParameter;

/// Wang-Landau order parameter: the total accumulated energy of the world.
///
/// Acceptance uses the histogram values (the log-DOS estimate) directly,
/// with no Boltzmann factor.
/// Wang & Landau, Phys. Rev. Lett. 86, 2050 (2001).
pub struct WangLandauOP {
    hist: Histogram,
}

impl WangLandauOP {
    pub fn new(hist: Histogram) -> WangLandauOP {
        WangLandauOP { hist }
    }
}

impl DosOrderParameter for WangLandauOP {
    fn evaluate(&mut self, world: &mut World) -> f64 {
        world.energy().total()
    }

    fn histogram(&self) -> &Histogram {
        &self.hist
    }

    fn histogram_mut(&mut self) -> &mut Histogram {
        &mut self.hist
    }

    fn calc_acceptance(&self, _ei: &Energy, _ef: &Energy, opi: f64, opf: f64, _world: &World) -> f64 {
        let p = (self.hist.value_at(opi) - self.hist.value_at(opf)).exp();
        p.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcshell_numerical::assert_eq_float;
    use mcshell_system::World;

    #[test]
    fn acceptance_prefers_rarely_visited_bins() {
        let mut hist = Histogram::new(0.0, 10.0, 10);
        hist.set_value(2, 5.0);
        hist.set_value(7, 1.0);
        let op = WangLandauOP::new(hist);
        let w = World::new([10.0, 10.0, 10.0], 2.0, 0.0, 1).unwrap();
        let e = Energy::default();

        // Downhill in log-DOS is always taken.
        assert_eq_float!(op.acceptance_probability(&e, &e, 2.5, 7.5, &w), 1.0, 1e-12);
        // Uphill is exponentially suppressed.
        assert_eq_float!(op.acceptance_probability(&e, &e, 7.5, 2.5, &w), (-4.0f64).exp(), 1e-12);
    }

    #[test]
    fn out_of_range_moves_drive_toward_the_interval() {
        let hist = Histogram::new(0.0, 10.0, 10);
        let op = WangLandauOP::new(hist);
        let w = World::new([10.0, 10.0, 10.0], 2.0, 0.0, 1).unwrap();
        let e = Energy::default();

        assert_eq_float!(op.acceptance_probability(&e, &e, -5.0, -2.0, &w), 1.0, 1e-12);
        assert_eq_float!(op.acceptance_probability(&e, &e, -2.0, -5.0, &w), 0.0, 1e-12);
        assert_eq_float!(op.acceptance_probability(&e, &e, 12.0, 11.0, &w), 1.0, 1e-12);
        assert_eq_float!(op.acceptance_probability(&e, &e, 12.0, 13.0, &w), 0.0, 1e-12);
    }
}
