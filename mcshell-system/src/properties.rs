use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Energy of a world or a single particle, decomposed by channel.
///
/// All channels are additive; [`Energy::total`] is their sum. Pairwise van
/// der Waals and electrostatic contributions are split into intra- and
/// inter-molecular buckets depending on whether the interacting primitives
/// share a composite parent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Energy {
    pub inter_vdw: f64,
    pub intra_vdw: f64,
    pub inter_electrostatic: f64,
    pub intra_electrostatic: f64,
    pub bonded: f64,
    pub connectivity: f64,
    pub tail: f64,
}

impl Energy {
    pub fn total(&self) -> f64 {
        self.inter_vdw
            + self.intra_vdw
            + self.inter_electrostatic
            + self.intra_electrostatic
            + self.bonded
            + self.connectivity
            + self.tail
    }
}

impl Add for Energy {
    type Output = Energy;
    fn add(mut self, rhs: Energy) -> Energy {
        self += rhs;
        self
    }
}

impl AddAssign for Energy {
    fn add_assign(&mut self, rhs: Energy) {
        self.inter_vdw += rhs.inter_vdw;
        self.intra_vdw += rhs.intra_vdw;
        self.inter_electrostatic += rhs.inter_electrostatic;
        self.intra_electrostatic += rhs.intra_electrostatic;
        self.bonded += rhs.bonded;
        self.connectivity += rhs.connectivity;
        self.tail += rhs.tail;
    }
}

impl Sub for Energy {
    type Output = Energy;
    fn sub(mut self, rhs: Energy) -> Energy {
        self -= rhs;
        self
    }
}

impl SubAssign for Energy {
    fn sub_assign(&mut self, rhs: Energy) {
        self.inter_vdw -= rhs.inter_vdw;
        self.intra_vdw -= rhs.intra_vdw;
        self.inter_electrostatic -= rhs.inter_electrostatic;
        self.intra_electrostatic -= rhs.intra_electrostatic;
        self.bonded -= rhs.bonded;
        self.connectivity -= rhs.connectivity;
        self.tail -= rhs.tail;
    }
}

impl Neg for Energy {
    type Output = Energy;
    fn neg(self) -> Energy {
        self * -1.0
    }
}

impl Mul<f64> for Energy {
    type Output = Energy;
    fn mul(self, rhs: f64) -> Energy {
        Energy {
            inter_vdw: self.inter_vdw * rhs,
            intra_vdw: self.intra_vdw * rhs,
            inter_electrostatic: self.inter_electrostatic * rhs,
            intra_electrostatic: self.intra_electrostatic * rhs,
            bonded: self.bonded * rhs,
            connectivity: self.connectivity * rhs,
            tail: self.tail * rhs,
        }
    }
}

/// Pressure tensor of a world.
///
/// The ideal-gas part is recomputed on demand by the world from its current
/// composition and temperature; this struct holds the configurational tensor
/// accumulated from pair virials, plus the tail correction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pressure {
    pub ideal: f64,
    pub pxx: f64,
    pub pxy: f64,
    pub pxz: f64,
    pub pyy: f64,
    pub pyz: f64,
    pub pzz: f64,
    pub ptail: f64,
}

impl Pressure {
    /// Isotropic pressure: trace over three plus ideal and tail parts.
    pub fn isotropic(&self) -> f64 {
        self.ideal + (self.pxx + self.pyy + self.pzz) / 3.0 + self.ptail
    }
}

impl Add for Pressure {
    type Output = Pressure;
    fn add(mut self, rhs: Pressure) -> Pressure {
        self += rhs;
        self
    }
}

impl AddAssign for Pressure {
    fn add_assign(&mut self, rhs: Pressure) {
        self.ideal += rhs.ideal;
        self.pxx += rhs.pxx;
        self.pxy += rhs.pxy;
        self.pxz += rhs.pxz;
        self.pyy += rhs.pyy;
        self.pyz += rhs.pyz;
        self.pzz += rhs.pzz;
        self.ptail += rhs.ptail;
    }
}

impl Sub for Pressure {
    type Output = Pressure;
    fn sub(mut self, rhs: Pressure) -> Pressure {
        self -= rhs;
        self
    }
}

impl SubAssign for Pressure {
    fn sub_assign(&mut self, rhs: Pressure) {
        self.ideal -= rhs.ideal;
        self.pxx -= rhs.pxx;
        self.pxy -= rhs.pxy;
        self.pxz -= rhs.pxz;
        self.pyy -= rhs.pyy;
        self.pyz -= rhs.pyz;
        self.pzz -= rhs.pzz;
        self.ptail -= rhs.ptail;
    }
}

impl Neg for Pressure {
    type Output = Pressure;
    fn neg(self) -> Pressure {
        self * -1.0
    }
}

impl Mul<f64> for Pressure {
    type Output = Pressure;
    fn mul(self, rhs: f64) -> Pressure {
        Pressure {
            ideal: self.ideal * rhs,
            pxx: self.pxx * rhs,
            pxy: self.pxy * rhs,
            pxz: self.pxz * rhs,
            pyy: self.pyy * rhs,
            pyz: self.pyz * rhs,
            pzz: self.pzz * rhs,
            ptail: self.ptail * rhs,
        }
    }
}

/// An energy together with the matching pressure contribution, as returned
/// by the forcefield evaluators.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EPTuple {
    pub energy: Energy,
    pub pressure: Pressure,
}

impl Add for EPTuple {
    type Output = EPTuple;
    fn add(mut self, rhs: EPTuple) -> EPTuple {
        self += rhs;
        self
    }
}

impl AddAssign for EPTuple {
    fn add_assign(&mut self, rhs: EPTuple) {
        self.energy += rhs.energy;
        self.pressure += rhs.pressure;
    }
}

impl Sub for EPTuple {
    type Output = EPTuple;
    fn sub(mut self, rhs: EPTuple) -> EPTuple {
        self.energy -= rhs.energy;
        self.pressure -= rhs.pressure;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_total_sums_all_channels() {
        let e = Energy {
            inter_vdw: 1.0,
            intra_vdw: 2.0,
            inter_electrostatic: 3.0,
            intra_electrostatic: 4.0,
            bonded: 5.0,
            connectivity: 6.0,
            tail: 7.0,
        };
        assert_eq!(e.total(), 28.0);
    }

    #[test]
    fn energy_arithmetic_round_trips() {
        let a = Energy { inter_vdw: 1.5, bonded: -0.5, ..Default::default() };
        let b = Energy { inter_vdw: 0.25, tail: 2.0, ..Default::default() };
        let c = a + b - b;
        assert_eq!(c, a);
        assert_eq!((-a) + a, Energy::default());
    }

    #[test]
    fn isotropic_pressure_averages_diagonal() {
        let p = Pressure { ideal: 1.0, pxx: 3.0, pyy: 6.0, pzz: 0.0, ptail: 0.5, ..Default::default() };
        assert_eq!(p.isotropic(), 1.0 + 3.0 + 0.5);
    }
}
