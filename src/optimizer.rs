mod adagrad;
mod adam;
mod gradient_descent;
mod momentum;
mod rmsprop;

use ndarray::Array2;

pub use adagrad::Adagrad;
pub use adam::Adam;
pub use gradient_descent::GradientDescent;
pub use momentum::Momentum;
pub use rmsprop::RmsProp;

/// Guards the adaptive optimizers against division by zero.
pub const EPSILON: f64 = 1e-8;

/// Trait to abstract optimizers.
///
/// An optimizer maps the gradient of one layer's parameters to the step added to them. The
/// trainer keeps one optimizer for weights and another for biases, and calls each once per
/// layer per update, so state can be keyed by `layer_index`. `epoch` starts at 1.
pub trait Optimizer {
    fn step(
        &mut self,
        learning_rate: f64,
        gradient: &Array2<f64>,
        layer_index: usize,
        epoch: usize,
    ) -> Array2<f64>;
}

impl<F> Optimizer for F
where
    F: FnMut(f64, &Array2<f64>, usize, usize) -> Array2<f64>,
{
    fn step(
        &mut self,
        learning_rate: f64,
        gradient: &Array2<f64>,
        layer_index: usize,
        epoch: usize,
    ) -> Array2<f64> {
        self(learning_rate, gradient, layer_index, epoch)
    }
}

/// Optimizer state indexed like the layers of the network, created on first use.
#[derive(Debug, Clone)]
pub struct PerLayer<T> {
    states: Vec<Option<T>>,
}

impl<T> Default for PerLayer<T> {
    fn default() -> Self {
        Self { states: Vec::new() }
    }
}

impl<T> PerLayer<T> {
    /// Return the state of `layer_index`, initializing it with `init` when missing.
    pub fn entry<F>(&mut self, layer_index: usize, init: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        if self.states.len() <= layer_index {
            self.states.resize_with(layer_index + 1, || None);
        }
        self.states[layer_index].get_or_insert_with(init)
    }

    pub fn get(&self, layer_index: usize) -> Option<&T> {
        self.states.get(layer_index).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::arr2;

    #[test]
    fn closures_are_optimizers() {
        let mut calls = 0;
        let mut halve = |_: f64, gradient: &Array2<f64>, _: usize, _: usize| {
            calls += 1;
            gradient * -0.5
        };
        let step = halve.step(1.0, &arr2(&[[2.0]]), 0, 1);
        assert_eq!(arr2(&[[-1.0]]), step);
        assert_eq!(1, calls);
    }

    #[test]
    fn per_layer_state_is_created_on_demand() {
        let mut state = PerLayer::<usize>::default();
        *state.entry(2, || 5) += 1;
        assert_eq!(None, state.get(0));
        assert_eq!(None, state.get(1));
        assert_eq!(Some(&6), state.get(2));
        assert_eq!(6, *state.entry(2, || 0));
    }
}
