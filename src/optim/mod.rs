pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use crate::layers::param::Param;

/// Updates parameters in place from their accumulated gradients.
pub trait Optimizer {
    fn step(&mut self, params: Vec<&mut Param>);
}
