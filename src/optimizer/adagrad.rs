use ndarray::{Array2, Zip};

use crate::optimizer::{Optimizer, PerLayer, EPSILON};

/// Adagrad: accumulates squared gradients and divides the step by their square root.
#[derive(Debug, Clone, Default)]
pub struct Adagrad {
    accumulated: PerLayer<Array2<f64>>,
}

impl Adagrad {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Optimizer for Adagrad {
    fn step(
        &mut self,
        learning_rate: f64,
        gradient: &Array2<f64>,
        layer_index: usize,
        _: usize,
    ) -> Array2<f64> {
        let accumulated = self
            .accumulated
            .entry(layer_index, || Array2::zeros(gradient.raw_dim()));
        Zip::from(&mut *accumulated)
            .and(gradient)
            .for_each(|a, &g| *a += g * g);

        Zip::from(&*accumulated)
            .and(gradient)
            .map_collect(|&a, &g| -learning_rate * g / (a + EPSILON).sqrt())
    }
}
