use nalgebra::Vector3;
use rand::Rng;

/// Samples a unit vector uniformly on the unit sphere.
///
/// Uses the Marsaglia (1972) rejection method: draw `$(v_1, v_2)$` uniformly
/// in `$[-1, 1]^2$` until `$s = v_1^2 + v_2^2 < 1$`, then map to
/// `$(2 v_1 \sqrt{1-s},\; 2 v_2 \sqrt{1-s},\; 1 - 2 s)$`.
pub fn random_unit_vector<R: Rng>(rng: &mut R) -> Vector3<f64> {
    loop {
        let v1: f64 = 2.0 * rng.gen_range(0.0..1.0) - 1.0;
        let v2: f64 = 2.0 * rng.gen_range(0.0..1.0) - 1.0;
        let s = v1 * v1 + v2 * v2;
        if s < 1.0 {
            let root = (1.0 - s).sqrt();
            return Vector3::new(2.0 * v1 * root, 2.0 * v2 * root, 1.0 - 2.0 * s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_float;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn sampled_vectors_have_unit_length() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..1000 {
            let v = random_unit_vector(&mut rng);
            assert_eq_float!(v.norm(), 1.0, 1e-12);
        }
    }

    #[test]
    fn sampled_vectors_cover_both_hemispheres() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut mean_z = 0.0;
        let n = 20000;
        for _ in 0..n {
            mean_z += random_unit_vector(&mut rng).z;
        }
        mean_z /= n as f64;
        assert!(mean_z.abs() < 0.02, "biased z component: {}", mean_z);
    }
}
