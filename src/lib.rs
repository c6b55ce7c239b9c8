use std::{collections::HashMap, fmt::Debug, hash::Hash};

use ndarray::Array2;

pub mod activation;
pub mod backpropagation;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod utils;

pub use activation::Activation;
pub use backpropagation::Backpropagation;
pub use data::{Dataset, Orientation};
pub use error::{Error, Result};
pub use layer::Layer;
pub use loss::CostFunction;
pub use network::MultilayerPerceptron;

#[macro_export]
macro_rules! assert_rel_eq_arr1 {
    ($actual:expr, $expected:expr) => {
        match (&$actual, &$expected) {
            (actual, expected) => {
                assert_eq!(actual.shape(), expected.shape());
                ndarray::Zip::from(actual)
                    .and(expected)
                    .for_each(|v, w| {
                        assert_relative_eq!(v, w, epsilon = 1e-12);
                    });
            }
        }
    };
}

#[macro_export]
macro_rules! assert_rel_eq_arr2 {
    ($actual:expr, $expected:expr) => {
        match (&$actual, &$expected) {
            (actual, expected) => {
                assert_eq!(actual.shape(), expected.shape());
                ndarray::Zip::from(actual)
                    .and(expected)
                    .for_each(|v, w| {
                        assert_relative_eq!(v, w, epsilon = 1e-12);
                    });
            }
        }
    };
}

/// Encode labels to one-hot target columns and decode network outputs back to labels.
pub struct OneHotEncoder<Label>
where
    Label: Hash + Eq + Clone,
{
    label_to_id: HashMap<Label, usize>,
    id_to_label: Vec<Label>,
}

impl<Label> OneHotEncoder<Label>
where
    Label: Hash + Eq + Clone + Debug,
{
    /// Record labels to convert. The i-th label is encoded in the i-th row.
    pub fn new(label_kinds: Vec<Label>) -> Self {
        let label_to_id = label_kinds
            .iter()
            .cloned()
            .enumerate()
            .map(|(id, label)| (label, id))
            .collect();
        Self {
            label_to_id,
            id_to_label: label_kinds,
        }
    }

    pub fn classes(&self) -> usize {
        self.id_to_label.len()
    }

    /// Encode labels as a matrix of shape (n_classes, n_instances).
    pub fn encode(&self, labels: &[Label]) -> Result<Array2<f64>> {
        let mut one_hot = Array2::zeros((self.classes(), labels.len()));
        for (instance, label) in labels.iter().enumerate() {
            let id = self
                .label_to_id
                .get(label)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown label {:?}", label)))?;
            one_hot[[*id, instance]] = 1.0;
        }
        Ok(one_hot)
    }

    /// Decode one-hot columns to labels.
    /// Decoded label is determined by an argmax of each column.
    pub fn decode(&self, one_hot_vecs: &Array2<f64>) -> Result<Vec<Label>> {
        if one_hot_vecs.nrows() != self.classes() {
            return Err(Error::DimensionMismatch(format!(
                "the encoder knows {} classes but the matrix has {} rows",
                self.classes(),
                one_hot_vecs.nrows()
            )));
        }

        Ok(one_hot_vecs
            .columns()
            .into_iter()
            .map(|one_hot| self.id_to_label[metrics::argmax(one_hot)].clone())
            .collect())
    }
}
