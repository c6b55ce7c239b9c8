use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Pre-activations beyond this magnitude saturate the logistic function to exactly 0 or 1.
const LOGISTIC_SATURATION: f64 = 45.0;

/// Pointwise nonlinearity applied by a layer to its pre-activations.
///
/// Every variant except `Softmax` acts on each unit independently, so its Jacobian is
/// diagonal. `Softmax` couples all units of a column and only has a vector form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Logistic,
    Tanh,
    Relu,
    Softmax,
}

fn logistic(z: f64) -> f64 {
    if z >= LOGISTIC_SATURATION {
        1.0
    } else if z <= -LOGISTIC_SATURATION {
        0.0
    } else {
        1.0 / (1.0 + (-z).exp())
    }
}

fn logistic_prime(z: f64) -> f64 {
    let y = logistic(z);
    y * (1.0 - y)
}

fn tanh_prime(z: f64) -> f64 {
    let y = z.tanh();
    1.0 - y * y
}

fn relu(z: f64) -> f64 {
    z.max(0.0)
}

fn relu_prime(z: f64) -> f64 {
    if z > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn scalar_softmax() -> Error {
    Error::InvalidArgument(
        "softmax can only be applied to vectors or matrices, not to a single value".to_string(),
    )
}

/// Column-wise softmax. The per-column maximum is subtracted before exponentiating.
fn softmax(z: ArrayView2<f64>) -> Result<Array2<f64>> {
    if z.nrows() < 2 {
        return Err(Error::InvalidArgument(
            "softmax is not suitable for single value outputs, use logistic or tanh instead"
                .to_string(),
        ));
    }

    let mut y = z.to_owned();
    for mut column in y.columns_mut() {
        let max = column.fold(f64::NEG_INFINITY, |max, &v| max.max(v));
        column.mapv_inplace(|v| (v - max).exp());
        let sum = column.sum();
        column /= sum;
    }
    Ok(y)
}

impl Activation {
    /// Apply the activation to a single pre-activation.
    pub fn evaluate(&self, z: f64) -> Result<f64> {
        match self {
            Self::Identity => Ok(z),
            Self::Logistic => Ok(logistic(z)),
            Self::Tanh => Ok(z.tanh()),
            Self::Relu => Ok(relu(z)),
            Self::Softmax => Err(scalar_softmax()),
        }
    }

    /// Derivative of `evaluate` at `z`.
    pub fn prime(&self, z: f64) -> Result<f64> {
        match self {
            Self::Identity => Ok(1.0),
            Self::Logistic => Ok(logistic_prime(z)),
            Self::Tanh => Ok(tanh_prime(z)),
            Self::Relu => Ok(relu_prime(z)),
            Self::Softmax => Err(scalar_softmax()),
        }
    }

    /// Apply the activation to a matrix whose columns are instances.
    pub fn compute(&self, z: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Self::Identity => Ok(z.clone()),
            Self::Logistic => Ok(z.mapv(logistic)),
            Self::Tanh => Ok(z.mapv(f64::tanh)),
            Self::Relu => Ok(z.mapv(relu)),
            Self::Softmax => softmax(z.view()),
        }
    }

    /// Elementwise derivative. Only defined for the per-unit variants.
    pub fn derivative(&self, z: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Self::Identity => Ok(z.mapv(|_| 1.0)),
            Self::Logistic => Ok(z.mapv(logistic_prime)),
            Self::Tanh => Ok(z.mapv(tanh_prime)),
            Self::Relu => Ok(z.mapv(relu_prime)),
            Self::Softmax => Err(Error::InvalidArgument(
                "softmax has no elementwise derivative, use the jacobian instead".to_string(),
            )),
        }
    }

    /// Jacobian of the activation at a column of pre-activations.
    ///
    /// Diagonal for the per-unit variants, `diag(y) - y * y^T` for softmax.
    pub fn jacobian(&self, z: ArrayView1<f64>) -> Result<Array2<f64>> {
        match self {
            Self::Softmax => {
                let column = z.insert_axis(Axis(1));
                let y = softmax(column)?;
                let diagonal = Array2::from_diag(&y.column(0));
                Ok(diagonal - y.dot(&y.t()))
            }
            _ => {
                let column = z.to_owned().insert_axis(Axis(1));
                let diagonal = self.derivative(&column)?.remove_axis(Axis(1));
                Ok(Array2::from_diag(&diagonal))
            }
        }
    }

    /// Transform an error with respect to the activations into an error with respect to the
    /// pre-activations `z`, one column (instance) at a time.
    pub fn delta(&self, z: &Array2<f64>, error: &Array2<f64>) -> Result<Array2<f64>> {
        if z.shape() != error.shape() {
            return Err(Error::DimensionMismatch(format!(
                "pre-activations have shape {:?} but the error has shape {:?}",
                z.shape(),
                error.shape()
            )));
        }

        match self {
            Self::Softmax => {
                let mut delta = Array2::zeros(z.raw_dim());
                for ((z, error), mut column) in z
                    .columns()
                    .into_iter()
                    .zip(error.columns())
                    .zip(delta.columns_mut())
                {
                    column.assign(&self.jacobian(z)?.dot(&error));
                }
                Ok(delta)
            }
            _ => Ok(self.derivative(z)? * error),
        }
    }
}
