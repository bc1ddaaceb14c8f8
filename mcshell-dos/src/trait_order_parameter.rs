use mcshell_statistics::Histogram;
use mcshell_system::{units, Energy, World};

/// A reaction coordinate with the acceptance rule of biased flat-histogram
/// sampling.
///
/// Implementations own the histogram whose value slots hold the running
/// log-density-of-states; the simulation driver reaches it through
/// [`DosOrderParameter::histogram_mut`] to record visits and update values.
/// Order parameters are `Send` so each multi-walker thread can own one.
pub trait DosOrderParameter: Send {
    /// The order parameter of the current world state.
    ///
    /// Takes the world mutably so incremental implementations can drain
    /// pending change events before answering.
    fn evaluate(&mut self, world: &mut World) -> f64;

    fn histogram(&self) -> &Histogram;

    fn histogram_mut(&mut self) -> &mut Histogram;

    /// Acceptance probability for a move that changed the energy from `ei`
    /// to `ef` and the order parameter from `opi` to `opf`.
    ///
    /// An out-of-range `opf` is accepted unconditionally iff it moves
    /// toward the sampled interval and rejected otherwise; in-range values
    /// delegate to [`DosOrderParameter::calc_acceptance`].
    fn acceptance_probability(
        &self,
        ei: &Energy,
        ef: &Energy,
        opi: f64,
        opf: f64,
        world: &World,
    ) -> f64 {
        let hist = self.histogram();
        if hist.bin_of(opf).is_none() {
            if opi < hist.min() && opf > opi {
                return 1.0;
            }
            if opi >= hist.max() && opf < opi {
                return 1.0;
            }
            return 0.0;
        }
        self.calc_acceptance(ei, ef, opi, opf, world)
    }

    /// The in-range acceptance rule. The default combines the Boltzmann
    /// factor with the log-DOS difference,
    /// `$P = \min(1, e^{-\beta \Delta E + g(op_i) - g(op_f)})$`.
    fn calc_acceptance(&self, ei: &Energy, ef: &Energy, opi: f64, opf: f64, world: &World) -> f64 {
        let de = ef.total() - ei.total();
        let beta = 1.0 / (units().kb * world.temperature());
        let bias = self.histogram().value_at(opi) - self.histogram().value_at(opf);
        let p = (-beta * de + bias).exp();
        p.min(1.0)
    }
}
