use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand::{seq::SliceRandom, Rng};

use crate::error::{Error, Result};

/// Which lanes of the feature matrix a normalization function is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Every row, i.e. one feature across all instances.
    Rows,
    /// Every column, i.e. all features of one instance.
    Columns,
}

/// Features `x` (features × instances) and targets `t` (outputs × instances).
/// Column `i` of `x` and column `i` of `t` always describe the same instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array2<f64>,
    t: Array2<f64>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, t: Array2<f64>) -> Result<Self> {
        if x.ncols() != t.ncols() {
            return Err(Error::DimensionMismatch(format!(
                "the feature matrix has {} instances but the target matrix has {}",
                x.ncols(),
                t.ncols()
            )));
        }
        Ok(Self { x, t })
    }

    /// Number of instances.
    pub fn size(&self) -> usize {
        self.x.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn features(&self) -> usize {
        self.x.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.t.nrows()
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn t(&self) -> &Array2<f64> {
        &self.t
    }

    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>) {
        (self.x, self.t)
    }

    fn columns(&self, begin: usize, end: usize) -> Self {
        Self {
            x: self.x.slice(s![.., begin..end]).to_owned(),
            t: self.t.slice(s![.., begin..end]).to_owned(),
        }
    }

    fn check_range(&self, begin: usize, end: usize) -> Result<()> {
        if begin > end || end > self.size() {
            return Err(Error::InvalidArgument(format!(
                "invalid column range {}..{} for a dataset of {} instances",
                begin,
                end,
                self.size()
            )));
        }
        Ok(())
    }

    /// Copy the instances in `begin..end` into a new dataset.
    pub fn slice(&self, begin: usize, end: usize) -> Result<Self> {
        self.check_range(begin, end)?;
        Ok(self.columns(begin, end))
    }

    /// Partition the instances at `position`, which must lie strictly inside the dataset.
    pub fn split(&self, position: usize) -> Result<(Self, Self)> {
        if position == 0 || position >= self.size() {
            return Err(Error::InvalidArgument(format!(
                "invalid split position {} for a dataset of {} instances",
                position,
                self.size()
            )));
        }
        Ok((
            self.columns(0, position),
            self.columns(position, self.size()),
        ))
    }

    /// Take the instances in `begin..end` out of this dataset and return them.
    /// The remaining instances keep their relative order.
    pub fn remove(&mut self, begin: usize, end: usize) -> Result<Self> {
        self.check_range(begin, end)?;
        let removed = self.columns(begin, end);

        let kept = (0..begin).chain(end..self.size()).collect::<Vec<_>>();
        self.x = self.x.select(Axis(1), &kept);
        self.t = self.t.select(Axis(1), &kept);
        Ok(removed)
    }

    /// Apply one random permutation to the instances of both `x` and `t`.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut indices = (0..self.size()).collect::<Vec<_>>();
        indices.shuffle(rng);
        self.x = self.x.select(Axis(1), &indices);
        self.t = self.t.select(Axis(1), &indices);
    }

    /// Replace every row or column of `x` by `normalization` applied to it.
    /// Nothing is written unless every lane was normalized to the right length.
    pub fn normalize<F>(&mut self, orientation: Orientation, mut normalization: F) -> Result<()>
    where
        F: FnMut(ArrayView1<f64>) -> Array1<f64>,
    {
        let axis = match orientation {
            Orientation::Rows => Axis(1),
            Orientation::Columns => Axis(0),
        };

        let mut normalized = Vec::new();
        for lane in self.x.lanes(axis) {
            let values = normalization(lane);
            if values.len() != lane.len() {
                return Err(Error::DimensionMismatch(format!(
                    "normalization returned {} values for a lane of {}",
                    values.len(),
                    lane.len()
                )));
            }
            normalized.push(values);
        }

        for (mut lane, values) in self.x.lanes_mut(axis).into_iter().zip(&normalized) {
            lane.assign(values);
        }
        Ok(())
    }

    /// Iterate over contiguous minibatches of `batch_size` instances.
    /// The last minibatch holds the remaining instances and may be smaller.
    pub fn batches(&self, batch_size: usize) -> Batches<'_> {
        Batches {
            dataset: self,
            batch_size,
            position: 0,
        }
    }
}

/// Batches yields a minibatch each time `Iterator::next()` is called.
/// This struct is created in each epoch in a train phase.
pub struct Batches<'a> {
    dataset: &'a Dataset,
    batch_size: usize,
    position: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Dataset;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_size == 0 || self.position >= self.dataset.size() {
            return None;
        }

        let begin = self.position;
        let end = (begin + self.batch_size).min(self.dataset.size());
        self.position = end;
        Some(self.dataset.columns(begin, end))
    }
}

/// Standardize a lane to zero mean and unit sample standard deviation.
/// A constant lane is only centered.
pub fn zscore(lane: ArrayView1<f64>) -> Array1<f64> {
    let n = lane.len();
    if n == 0 {
        return lane.to_owned();
    }

    let mean = lane.sum() / n as f64;
    let centered = lane.mapv(|v| v - mean);
    if n < 2 {
        return centered;
    }

    let std = (centered.mapv(|v| v * v).sum() / (n - 1) as f64).sqrt();
    if std > 0.0 {
        centered / std
    } else {
        centered
    }
}

/// Rescale a lane linearly onto `[0, 1]`. A constant lane becomes all zeros.
pub fn min_max(lane: ArrayView1<f64>) -> Array1<f64> {
    let min = lane.fold(f64::INFINITY, |min, &v| min.min(v));
    let max = lane.fold(f64::NEG_INFINITY, |max, &v| max.max(v));
    let range = max - min;
    if range > 0.0 {
        lane.mapv(|v| (v - min) / range)
    } else {
        lane.mapv(|_| 0.0)
    }
}
