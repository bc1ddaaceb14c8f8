use nalgebra::{Matrix3, Vector3};
use rand::Rng;

/// One of the three Cartesian axes of a simulation box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Draws one of the three axes uniformly at random.
    pub fn random<R: Rng>(rng: &mut R) -> Axis {
        match rng.gen_range(0..3) {
            0 => Axis::X,
            1 => Axis::Y,
            _ => Axis::Z,
        }
    }
}

/// Builds the matrix of a rotation by `angle` radians about a given Cartesian axis.
///
/// # Arguments
/// * `axis` - the rotation axis
/// * `angle` - rotation angle in radians
pub fn rotation_about_axis(axis: Axis, angle: f64) -> Matrix3<f64> {
    let c = angle.cos();
    let s = angle.sin();
    match axis {
        Axis::X => Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c),
        Axis::Y => Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c),
        Axis::Z => Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0),
    }
}

/// Rotates `point` about `origin` with a precomputed rotation matrix.
pub fn rotate_about(r: &Matrix3<f64>, origin: &Vector3<f64>, point: &Vector3<f64>) -> Vector3<f64> {
    r * (point - origin) + origin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;
    use crate::assert_eq_vec3;
    use std::f64::consts::PI;

    #[test]
    fn rotation_matrices_are_orthogonal() {
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let r = rotation_about_axis(axis, 0.731);
            let rrt = r * r.transpose();
            assert_eq_float!(rrt.determinant(), 1.0, 1e-12);
            for i in 0..3 {
                for j in 0..3 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_eq_float!(rrt[(i, j)], expected, 1e-12);
                }
            }
        }
    }

    #[test]
    fn quarter_turn_about_z() {
        let r = rotation_about_axis(Axis::Z, PI / 2.0);
        let v = r * Vector3::new(1.0, 0.0, 0.0);
        assert_eq_vec3!(v, Vector3::new(0.0, 1.0, 0.0), 1e-12);
    }

    #[test]
    fn rotate_about_preserves_origin() {
        let r = rotation_about_axis(Axis::Y, 1.234);
        let origin = Vector3::new(3.0, -1.0, 2.5);
        let v = rotate_about(&r, &origin, &origin);
        assert_eq_vec3!(v, origin, 1e-12);
    }
}
