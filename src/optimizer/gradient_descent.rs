use ndarray::Array2;

use crate::optimizer::Optimizer;

/// Plain gradient descent: `step = -learning_rate * gradient`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientDescent;

impl Optimizer for GradientDescent {
    fn step(
        &mut self,
        learning_rate: f64,
        gradient: &Array2<f64>,
        _: usize,
        _: usize,
    ) -> Array2<f64> {
        gradient * -learning_rate
    }
}
