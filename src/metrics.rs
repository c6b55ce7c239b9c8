use ndarray::{Array2, ArrayView1, Zip};

use crate::data::Dataset;
use crate::error::Result;
use crate::loss::check_shapes;
use crate::network::MultilayerPerceptron;

/// Squared error of the network on `dataset`, halved and averaged over instances.
/// This is the value recorded in the training loss trace.
pub fn mse(network: &MultilayerPerceptron, dataset: &Dataset) -> Result<f64> {
    let output = network.output(dataset.x())?;
    check_shapes(dataset.t(), &output)?;

    let total = Zip::from(&output)
        .and(dataset.t())
        .fold(0.0, |total, &y, &t| total + (y - t).powi(2));
    Ok(total / (2.0 * output.ncols() as f64))
}

/// Build the confusion matrix of the network's predictions on `dataset`.
pub fn evaluate(network: &MultilayerPerceptron, dataset: &Dataset) -> Result<ConfusionMatrix> {
    let output = network.output(dataset.x())?;
    ConfusionMatrix::from_outputs(dataset.t(), &output)
}

/// Index of the largest element of `lane`, the first one on ties.
pub(crate) fn argmax(lane: ArrayView1<f64>) -> usize {
    lane.iter()
        .enumerate()
        .fold(
            (0, f64::NEG_INFINITY),
            |(max_index, max_elem), (index, &elem)| {
                if elem > max_elem {
                    (index, elem)
                } else {
                    (max_index, max_elem)
                }
            },
        )
        .0
}

fn zero_if_nan(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

/// An item in i-th row and j-th column is the number of instances of class i which were
/// predicted as class j. Classes are decided by the argmax of each column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn from_outputs(expected: &Array2<f64>, output: &Array2<f64>) -> Result<Self> {
        check_shapes(expected, output)?;

        let classes = expected.nrows();
        let mut counts = Array2::zeros((classes, classes));
        for (expected, output) in expected.columns().into_iter().zip(output.columns()) {
            counts[[argmax(expected), argmax(output)]] += 1;
        }
        Ok(Self { counts })
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub fn classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    pub fn tp(&self, class: usize) -> usize {
        self.counts[[class, class]]
    }

    pub fn fp(&self, class: usize) -> usize {
        self.counts.column(class).sum() - self.tp(class)
    }

    pub fn fn_(&self, class: usize) -> usize {
        self.counts.row(class).sum() - self.tp(class)
    }

    pub fn tn(&self, class: usize) -> usize {
        self.total() - self.tp(class) - self.fp(class) - self.fn_(class)
    }

    pub fn precision(&self, class: usize) -> f64 {
        let (tp, fp) = (self.tp(class) as f64, self.fp(class) as f64);
        zero_if_nan(tp / (tp + fp))
    }

    pub fn recall(&self, class: usize) -> f64 {
        let (tp, fn_) = (self.tp(class) as f64, self.fn_(class) as f64);
        zero_if_nan(tp / (tp + fn_))
    }

    pub fn specificity(&self, class: usize) -> f64 {
        let (tn, fp) = (self.tn(class) as f64, self.fp(class) as f64);
        zero_if_nan(tn / (tn + fp))
    }

    /// Fraction of instances classified correctly with respect to `class` alone.
    pub fn accuracy(&self, class: usize) -> f64 {
        let correct = (self.tp(class) + self.tn(class)) as f64;
        zero_if_nan(correct / self.total() as f64)
    }

    pub fn f1_score(&self, class: usize) -> f64 {
        let (precision, recall) = (self.precision(class), self.recall(class));
        zero_if_nan(2.0 * precision * recall / (precision + recall))
    }

    /// Fraction of all instances whose predicted class is the expected one.
    pub fn overall_accuracy(&self) -> f64 {
        let correct = self.counts.diag().sum() as f64;
        zero_if_nan(correct / self.total() as f64)
    }
}

#[cfg(test)]
mod tests {
    use crate::{activation::Activation, layer::Layer};

    use super::*;

    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    fn one_hot(classes: &[usize], n_classes: usize) -> Array2<f64> {
        let mut encoded = Array2::zeros((n_classes, classes.len()));
        for (i, &class) in classes.iter().enumerate() {
            encoded[[class, i]] = 1.0;
        }
        encoded
    }

    fn prepare() -> ConfusionMatrix {
        let y_true = one_hot(&[0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2], 3);
        let y_pred = one_hot(&[0, 0, 0, 1, 0, 1, 1, 2, 0, 1, 1, 2], 3) * 0.8;
        ConfusionMatrix::from_outputs(&y_true, &y_pred).unwrap()
    }

    #[test]
    fn test_confusion_matrix() {
        let confusion_matrix = prepare();
        assert_eq!(
            &arr2(&[[3usize, 1, 0], [1, 2, 1], [1, 2, 1]]),
            confusion_matrix.counts()
        );
        assert_eq!(12, confusion_matrix.total());
    }

    #[test]
    fn test_per_class_counts() {
        let confusion_matrix = prepare();
        assert_eq!(3, confusion_matrix.tp(0));
        assert_eq!(2, confusion_matrix.fp(0));
        assert_eq!(1, confusion_matrix.fn_(0));
        assert_eq!(6, confusion_matrix.tn(0));
    }

    #[test]
    fn test_precision_recall() {
        let confusion_matrix = prepare();
        assert_relative_eq!(0.6, confusion_matrix.precision(0));
        assert_relative_eq!(0.75, confusion_matrix.recall(0));
        assert_relative_eq!(0.75, confusion_matrix.specificity(0));
        assert_relative_eq!(0.75, confusion_matrix.accuracy(0));
        assert_relative_eq!(2.0 / 3.0, confusion_matrix.f1_score(0), epsilon = 1e-12);
        assert_relative_eq!(0.5, confusion_matrix.overall_accuracy());
    }

    #[test]
    fn precision_is_0_with_no_prediction_to_label() {
        let y_true = one_hot(&[0, 1, 2], 3);
        let y_pred = one_hot(&[0, 1, 1], 3);
        let confusion_matrix = ConfusionMatrix::from_outputs(&y_true, &y_pred).unwrap();
        assert_relative_eq!(0.0, confusion_matrix.precision(2));
        assert_relative_eq!(0.0, confusion_matrix.f1_score(2));
    }

    #[test]
    fn mse_of_a_network() {
        let mut network = MultilayerPerceptron::new();
        network
            .add(Layer::new(Activation::Identity, arr2(&[[1.0, 0.0]]), arr1(&[0.0])).unwrap())
            .unwrap();
        let dataset = Dataset::new(arr2(&[[1.0, 2.0], [5.0, 5.0]]), arr2(&[[0.0, 0.0]])).unwrap();
        // (1 + 4) / (2 * 2)
        assert_relative_eq!(1.25, mse(&network, &dataset).unwrap());

        let wrong_targets = Dataset::new(arr2(&[[1.0], [5.0]]), arr2(&[[0.0], [1.0]])).unwrap();
        assert!(mse(&network, &wrong_targets).is_err());
    }
}
