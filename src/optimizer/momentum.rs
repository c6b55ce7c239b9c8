use ndarray::Array2;

use crate::optimizer::{Optimizer, PerLayer};

/// Gradient descent with momentum: `v = beta * v - learning_rate * gradient`, `step = v`.
#[derive(Debug, Clone)]
pub struct Momentum {
    beta: f64,
    velocities: PerLayer<Array2<f64>>,
}

impl Momentum {
    pub fn new(beta: f64) -> Self {
        Self {
            beta,
            velocities: PerLayer::default(),
        }
    }
}

impl Default for Momentum {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl Optimizer for Momentum {
    fn step(
        &mut self,
        learning_rate: f64,
        gradient: &Array2<f64>,
        layer_index: usize,
        _: usize,
    ) -> Array2<f64> {
        let velocity = self
            .velocities
            .entry(layer_index, || Array2::zeros(gradient.raw_dim()));
        *velocity = &*velocity * self.beta - gradient * learning_rate;
        velocity.clone()
    }
}
