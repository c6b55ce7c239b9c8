use ndarray::{Array2, Zip};

use crate::optimizer::{Optimizer, PerLayer, EPSILON};

/// The learning rate is bias-corrected only during the first epochs.
const BIAS_CORRECTION_EPOCHS: usize = 100;

/// Adam: combines a moving average of gradients (decay `beta`) with a moving average of squared
/// gradients (decay `rho`).
#[derive(Debug, Clone)]
pub struct Adam {
    beta: f64,
    rho: f64,
    moments: PerLayer<(Array2<f64>, Array2<f64>)>,
}

impl Adam {
    pub fn new(beta: f64, rho: f64) -> Self {
        Self {
            beta,
            rho,
            moments: PerLayer::default(),
        }
    }

    fn corrected_learning_rate(&self, learning_rate: f64, epoch: usize) -> f64 {
        if epoch >= BIAS_CORRECTION_EPOCHS {
            return learning_rate;
        }
        let t = epoch.max(1) as i32;
        learning_rate * (1.0 - self.rho.powi(t)).sqrt() / (1.0 - self.beta.powi(t))
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.7, 0.9)
    }
}

impl Optimizer for Adam {
    fn step(
        &mut self,
        learning_rate: f64,
        gradient: &Array2<f64>,
        layer_index: usize,
        epoch: usize,
    ) -> Array2<f64> {
        let alpha = self.corrected_learning_rate(learning_rate, epoch);
        let (beta, rho) = (self.beta, self.rho);
        let (first, second) = self.moments.entry(layer_index, || {
            (
                Array2::zeros(gradient.raw_dim()),
                Array2::zeros(gradient.raw_dim()),
            )
        });

        Zip::from(&mut *first)
            .and(&mut *second)
            .and(gradient)
            .for_each(|v, a, &g| {
                *v = beta * *v + (1.0 - beta) * g;
                *a = rho * *a + (1.0 - rho) * g * g;
            });

        Zip::from(&*first)
            .and(&*second)
            .map_collect(|&v, &a| -alpha * v / (a + EPSILON).sqrt())
    }
}
