use ndarray::{Array2, Zip};

use crate::optimizer::{Optimizer, PerLayer, EPSILON};

/// RMSProp: keeps an exponential moving average of squared gradients with decay `rho`.
#[derive(Debug, Clone)]
pub struct RmsProp {
    rho: f64,
    averages: PerLayer<Array2<f64>>,
}

impl RmsProp {
    pub fn new(rho: f64) -> Self {
        Self {
            rho,
            averages: PerLayer::default(),
        }
    }
}

impl Default for RmsProp {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl Optimizer for RmsProp {
    fn step(
        &mut self,
        learning_rate: f64,
        gradient: &Array2<f64>,
        layer_index: usize,
        _: usize,
    ) -> Array2<f64> {
        let rho = self.rho;
        let average = self
            .averages
            .entry(layer_index, || Array2::zeros(gradient.raw_dim()));
        Zip::from(&mut *average)
            .and(gradient)
            .for_each(|a, &g| *a = rho * *a + (1.0 - rho) * g * g);

        Zip::from(&*average)
            .and(gradient)
            .map_collect(|&a, &g| -learning_rate * g / (a + EPSILON).sqrt())
    }
}
