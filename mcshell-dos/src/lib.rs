mod charge_fraction;
mod elastic_coeff;
mod particle_distance;
mod qtensor;
mod radius_of_gyration;
mod trait_order_parameter;
mod wang_landau;

pub use charge_fraction::*;
pub use elastic_coeff::*;
pub use particle_distance::*;
pub use qtensor::*;
pub use radius_of_gyration::*;
pub use trait_order_parameter::*;
pub use wang_landau::*;
