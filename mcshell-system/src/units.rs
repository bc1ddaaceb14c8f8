use std::sync::OnceLock;

/// Physical constants of the active unit system.
///
/// The engine defaults to reduced units where the Boltzmann constant and the
/// charge-energy conversion factor are both one. Real units express energies
/// in J/mol with temperatures in K and distances in angstroms.
#[derive(Clone, Copy, Debug)]
pub struct Units {
    /// Boltzmann constant
    pub kb: f64,
    /// Converts a charge product over a distance into an energy
    pub charge_conv: f64,
}

impl Units {
    pub fn reduced() -> Units {
        Units { kb: 1.0, charge_conv: 1.0 }
    }

    pub fn real() -> Units {
        Units {
            kb: 8.314459848,
            charge_conv: 1.389354578390845e+06,
        }
    }
}

static UNITS: OnceLock<Units> = OnceLock::new();

/// The process-wide unit system; reduced units unless [`set_units`] ran first.
pub fn units() -> Units {
    *UNITS.get_or_init(Units::reduced)
}

/// Selects the unit system for this process.
///
/// Must be called before any simulation starts; once the first reader has
/// observed the units they stay fixed and this call reports failure.
pub fn set_units(u: Units) -> Result<(), Units> {
    UNITS.set(u)
}
