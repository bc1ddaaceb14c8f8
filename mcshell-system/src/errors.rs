use thiserror::Error;

/// Geometry violations detected when a world is constructed.
///
/// These are never recoverable: a simulation must not start from an
/// inconsistent box.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("simulation box must have positive volume, got {volume}")]
    /// The product of the box vectors is not positive
    NonPositiveVolume { volume: f64 },
    #[error("neighbor radius {radius} exceeds half the shortest box vector {half_box}")]
    /// The neighbor list cutoff does not fit in the box
    CutoffExceedsBox { radius: f64, half_box: f64 },
    #[error("skin thickness {skin} must be non-negative and not exceed the cutoff {cutoff}")]
    /// The neighbor list skin is negative or thicker than the cutoff itself
    BadSkinThickness { skin: f64, cutoff: f64 },
}
