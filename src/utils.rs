use ndarray_rand::rand::Rng;

use crate::data::Dataset;
use crate::error::{Error, Result};

/// Shuffle `dataset` and split it into train and test data.
/// `train_ratio` is a ratio of the number of train instances to the whole dataset.
pub fn train_test_split<R: Rng + ?Sized>(
    mut dataset: Dataset,
    train_ratio: f64,
    rng: &mut R,
) -> Result<(Dataset, Dataset)> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(Error::InvalidArgument(format!(
            "train ratio must be in (0, 1), got {}",
            train_ratio
        )));
    }

    let n_trains = (dataset.size() as f64 * train_ratio) as usize;
    dataset.shuffle(rng);
    dataset.split(n_trains)
}
