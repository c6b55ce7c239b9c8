use ndarray::{Array2, Zip};

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::network::MultilayerPerceptron;

/// Keeps the entropy based losses away from `log(0)` and division by zero.
pub const EPSILON: f64 = 1e-8;

/// Cost of the network output against the expected targets.
///
/// The per-element loss is summed over outputs and averaged over instances (columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostFunction {
    #[default]
    Quadratic,
    CrossEntropy,
    Log,
}

impl CostFunction {
    /// Loss of a single output against its expected value.
    pub fn loss(&self, expected: f64, output: f64) -> f64 {
        match self {
            Self::Quadratic => 0.5 * (output - expected).powi(2),
            Self::CrossEntropy => {
                -(expected * (output + EPSILON).ln()
                    + (1.0 - expected) * (1.0 - output + EPSILON).ln())
            }
            Self::Log => -expected * (output + EPSILON).ln(),
        }
    }

    /// Derivative of `loss` with respect to `output`.
    pub fn derivative(&self, expected: f64, output: f64) -> f64 {
        match self {
            Self::Quadratic => output - expected,
            Self::CrossEntropy => {
                -(expected / (output + EPSILON)) + (1.0 - expected) / (1.0 - output + EPSILON)
            }
            Self::Log => -expected / (output + EPSILON),
        }
    }

    /// Mean cost over the instances of a batch.
    pub fn cost(&self, expected: &Array2<f64>, output: &Array2<f64>) -> Result<f64> {
        check_shapes(expected, output)?;

        let total = Zip::from(expected)
            .and(output)
            .fold(0.0, |total, &expected, &output| {
                total + self.loss(expected, output)
            });
        Ok(total / expected.ncols() as f64)
    }

    /// Elementwise gradient of the cost with respect to the output, used to seed the backward
    /// pass.
    pub fn gradient(&self, expected: &Array2<f64>, output: &Array2<f64>) -> Result<Array2<f64>> {
        check_shapes(expected, output)?;

        Ok(Zip::from(expected)
            .and(output)
            .map_collect(|&expected, &output| self.derivative(expected, output)))
    }

    /// Evaluate `network` on `dataset` and return the mean cost.
    pub fn cost_of(&self, network: &MultilayerPerceptron, dataset: &Dataset) -> Result<f64> {
        let output = network.output(dataset.x())?;
        self.cost(dataset.t(), &output)
    }
}

/// Fail unless the targets and the network output have the same shape.
pub(crate) fn check_shapes(expected: &Array2<f64>, output: &Array2<f64>) -> Result<()> {
    if expected.shape() != output.shape() {
        return Err(Error::DimensionMismatch(format!(
            "expected values have shape {:?} but the output has shape {:?}",
            expected.shape(),
            output.shape()
        )));
    }
    Ok(())
}
