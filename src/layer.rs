use ndarray::{Array, Array1, Array2, Axis};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

use crate::activation::Activation;
use crate::error::{Error, Result};

/// Dense layer computing `activation(W * input + b)` for every column of the input.
#[derive(Debug, Clone)]
pub struct Layer {
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
    keep_probability: f64,
}

impl Layer {
    /// Create a layer from explicit parameters. `weights` has one row per neuron and one column
    /// per input.
    pub fn new(activation: Activation, weights: Array2<f64>, biases: Array1<f64>) -> Result<Self> {
        if weights.nrows() != biases.len() {
            return Err(Error::DimensionMismatch(format!(
                "the weight matrix has {} rows but the bias vector has {} elements",
                weights.nrows(),
                biases.len()
            )));
        }

        Ok(Self {
            weights,
            biases,
            activation,
            keep_probability: 1.0,
        })
    }

    /// Create a layer whose weights are drawn uniformly from `[-range, range)` and whose biases
    /// are zero. `range` must be positive and finite.
    pub fn random<R: Rng + ?Sized>(
        inputs: usize,
        neurons: usize,
        activation: Activation,
        range: f64,
        rng: &mut R,
    ) -> Result<Self> {
        if !(range > 0.0 && range.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "weight range must be positive and finite, got {}",
                range
            )));
        }

        let weights = Array::random_using((neurons, inputs), Uniform::new(-range, range), rng);
        Ok(Self {
            weights,
            biases: Array1::zeros(neurons),
            activation,
            keep_probability: 1.0,
        })
    }

    /// Set the probability that a unit of this layer is kept during a training forward pass.
    pub fn with_dropout(self, keep_probability: f64) -> Result<Self> {
        if !(keep_probability > 0.0 && keep_probability <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "keep probability must be in (0, 1], got {}",
                keep_probability
            )));
        }
        Ok(Self {
            keep_probability,
            ..self
        })
    }

    /// Return the pre-activations `z` and the activations `y` for `input`.
    pub fn output(&self, input: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        if self.weights.ncols() != input.nrows() {
            return Err(Error::DimensionMismatch(format!(
                "wrong input dimensions, expected {} rows but the input has {}",
                self.weights.ncols(),
                input.nrows()
            )));
        }

        let z = self.weights.dot(input) + &self.biases.view().insert_axis(Axis(1));
        let y = self.activation.compute(&z)?;
        Ok((z, y))
    }

    pub fn neurons(&self) -> usize {
        self.weights.nrows()
    }

    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn biases(&self) -> &Array1<f64> {
        &self.biases
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn keep_probability(&self) -> f64 {
        self.keep_probability
    }

    /// Add optimizer steps to the parameters in place.
    pub(crate) fn update(&mut self, weights_step: &Array2<f64>, biases_step: &Array1<f64>) {
        self.weights += weights_step;
        self.biases += biases_step;
    }
}
