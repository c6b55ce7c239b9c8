use ndarray::{s, Array, Array1, Array2, Axis};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Bernoulli;
use ndarray_rand::RandomExt;
use tracing::{debug, info, trace};

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::loss::CostFunction;
use crate::metrics::mse;
use crate::network::MultilayerPerceptron;
use crate::optimizer::{GradientDescent, Optimizer};

/// Epochs between two samples of the training loss.
pub const DEFAULT_REPORT_INTERVAL: usize = 100;

/// Regularization term added to the weight gradient of every layer, given its weights.
pub type CostPenalization<'a> = Box<dyn Fn(&Array2<f64>) -> Array2<f64> + 'a>;

/// L2 penalization: `lambda * W`.
pub fn l2_penalization(lambda: f64) -> impl Fn(&Array2<f64>) -> Array2<f64> + Clone {
    move |weights| weights * lambda
}

/// L1 penalization: `lambda * sign(W)`.
pub fn l1_penalization(lambda: f64) -> impl Fn(&Array2<f64>) -> Array2<f64> + Clone {
    move |weights| {
        weights.mapv(|w| {
            if w > 0.0 {
                lambda
            } else if w < 0.0 {
                -lambda
            } else {
                0.0
            }
        })
    }
}

/// Values recorded during a training forward pass, indexed like the layers.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Input each layer received, after the dropout mask of the previous layer.
    pub inputs: Vec<Array2<f64>>,
    pub pre_activations: Vec<Array2<f64>>,
    /// Masked activations of the last layer.
    pub output: Array2<f64>,
}

/// Cost gradients of every layer's parameters, averaged over a minibatch.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Array1<f64>>,
}

/// Trains a `MultilayerPerceptron` on a `Dataset` with minibatch gradient descent.
///
/// Dropout follows the non-inverted convention: a training forward pass zeroes units without
/// rescaling the kept ones, the backward pass scales the propagated error by the keep
/// probability, and `MultilayerPerceptron::output` scales activations at inference time.
pub struct Backpropagation<'a, R: Rng> {
    network: &'a mut MultilayerPerceptron,
    dataset: &'a mut Dataset,
    learning_rate: f64,
    max_epochs: usize,
    batch_size: Option<usize>,
    report_interval: usize,
    stop_below: Option<f64>,
    cost_function: CostFunction,
    weight_optimizer: Box<dyn Optimizer + 'a>,
    bias_optimizer: Box<dyn Optimizer + 'a>,
    cost_penalization: Option<CostPenalization<'a>>,
    rng: R,
}

impl<'a, R: Rng> Backpropagation<'a, R> {
    /// Create a full-batch trainer using the quadratic cost and plain gradient descent.
    /// `rng` drives dataset shuffling and dropout masks.
    pub fn new(
        network: &'a mut MultilayerPerceptron,
        dataset: &'a mut Dataset,
        learning_rate: f64,
        max_epochs: usize,
        rng: R,
    ) -> Self {
        Self {
            network,
            dataset,
            learning_rate,
            max_epochs,
            batch_size: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            stop_below: None,
            cost_function: CostFunction::default(),
            weight_optimizer: Box::new(GradientDescent),
            bias_optimizer: Box::new(GradientDescent),
            cost_penalization: None,
            rng,
        }
    }

    /// Number of instances per minibatch. Values of at least the dataset size mean full batch.
    pub fn batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: Some(batch_size),
            ..self
        }
    }

    pub fn cost_function(self, cost_function: CostFunction) -> Self {
        Self {
            cost_function,
            ..self
        }
    }

    /// Sample the training loss every `report_interval` epochs.
    pub fn report_interval(self, report_interval: usize) -> Self {
        Self {
            report_interval,
            ..self
        }
    }

    /// Stop before the epoch budget is exhausted once the training MSE drops below `threshold`.
    pub fn stop_below(self, threshold: f64) -> Self {
        Self {
            stop_below: Some(threshold),
            ..self
        }
    }

    /// Install `optimizer` for both weights and biases. Each gets its own copy, so their state
    /// is never shared.
    pub fn hook_optimizer<O>(&mut self, optimizer: O)
    where
        O: Optimizer + Clone + 'a,
    {
        self.weight_optimizer = Box::new(optimizer.clone());
        self.bias_optimizer = Box::new(optimizer);
    }

    pub fn hook_weight_optimizer<O: Optimizer + 'a>(&mut self, optimizer: O) {
        self.weight_optimizer = Box::new(optimizer);
    }

    pub fn hook_bias_optimizer<O: Optimizer + 'a>(&mut self, optimizer: O) {
        self.bias_optimizer = Box::new(optimizer);
    }

    /// Install a regularization term added to every weight gradient before the optimizer step.
    pub fn hook_cost_penalization<F>(&mut self, penalization: F)
    where
        F: Fn(&Array2<f64>) -> Array2<f64> + 'a,
    {
        self.cost_penalization = Some(Box::new(penalization));
    }

    fn validate(&self) -> Result<()> {
        let input_width = self.network.input_width().ok_or_else(|| {
            Error::InvalidArgument("cannot train a network without layers".to_string())
        })?;
        if input_width != self.dataset.features() {
            return Err(Error::DimensionMismatch(format!(
                "the network expects {} features but the dataset has {}",
                input_width,
                self.dataset.features()
            )));
        }

        let output_width = self.network.output_width().unwrap_or_default();
        if output_width != self.dataset.outputs() {
            return Err(Error::DimensionMismatch(format!(
                "the network produces {} outputs but the dataset has {} targets",
                output_width,
                self.dataset.outputs()
            )));
        }

        if self.dataset.is_empty() {
            return Err(Error::InvalidArgument(
                "cannot train on an empty dataset".to_string(),
            ));
        }
        if self.batch_size == Some(0) {
            return Err(Error::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.report_interval == 0 {
            return Err(Error::InvalidArgument(
                "report interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Run the network on `x` as during training, masking every layer with keep probability
    /// below 1 by an independent Bernoulli draw per unit and instance.
    pub fn forward(&mut self, x: &Array2<f64>) -> Result<ForwardPass> {
        let layers = self.network.layers();
        let mut inputs = Vec::with_capacity(layers.len());
        let mut pre_activations = Vec::with_capacity(layers.len());

        let mut input = x.to_owned();
        for layer in layers {
            let (z, mut y) = layer.output(&input)?;
            let keep_probability = layer.keep_probability();
            if keep_probability < 1.0 {
                let distribution = Bernoulli::new(keep_probability).map_err(|e| {
                    Error::InvalidArgument(format!("invalid keep probability: {}", e))
                })?;
                let mask = Array::random_using(y.raw_dim(), distribution, &mut self.rng);
                y.zip_mut_with(&mask, |v, &keep| {
                    if !keep {
                        *v = 0.0;
                    }
                });
            }
            inputs.push(input);
            pre_activations.push(z);
            input = y;
        }

        Ok(ForwardPass {
            inputs,
            pre_activations,
            output: input,
        })
    }

    /// Propagate the cost gradient of `pass` against `expected` back through the layers.
    pub fn backward(&self, pass: &ForwardPass, expected: &Array2<f64>) -> Result<Gradients> {
        let layers = self.network.layers();
        let mut weights = Vec::with_capacity(layers.len());
        let mut biases = Vec::with_capacity(layers.len());

        let mut sigma = self.cost_function.gradient(expected, &pass.output)?;
        for (index, layer) in layers.iter().enumerate().rev() {
            let delta = layer
                .activation()
                .delta(&pass.pre_activations[index], &sigma)?;
            let m = delta.ncols() as f64;
            weights.push(delta.dot(&pass.inputs[index].t()) / m);
            biases.push(delta.sum_axis(Axis(1)) / m);

            if index > 0 {
                sigma = layer.weights().t().dot(&delta) * layer.keep_probability();
            }
        }

        weights.reverse();
        biases.reverse();
        Ok(Gradients { weights, biases })
    }

    /// Add the optimizer steps for `gradients` to every layer.
    pub fn update(&mut self, gradients: &Gradients, epoch: usize) -> Result<()> {
        for (index, layer) in self.network.layers_mut().iter_mut().enumerate() {
            let mut weight_gradient = gradients.weights[index].clone();
            if let Some(penalization) = &self.cost_penalization {
                weight_gradient += &penalization(layer.weights());
            }
            let weights_step =
                self.weight_optimizer
                    .step(self.learning_rate, &weight_gradient, index, epoch);

            let bias_gradient = gradients.biases[index].view().insert_axis(Axis(1)).to_owned();
            let biases_step = self
                .bias_optimizer
                .step(self.learning_rate, &bias_gradient, index, epoch);

            if weights_step.raw_dim() != layer.weights().raw_dim()
                || biases_step.shape() != [layer.neurons(), 1]
            {
                return Err(Error::DimensionMismatch(format!(
                    "optimizer steps of shapes {:?} and {:?} do not fit layer {}",
                    weights_step.shape(),
                    biases_step.shape(),
                    index
                )));
            }
            layer.update(&weights_step, &biases_step.remove_axis(Axis(1)));
        }
        Ok(())
    }

    /// Run all epochs and return the loss trace: row 0 holds the sampled epochs, row 1 the
    /// training MSE after each of them.
    pub fn train(&mut self) -> Result<Array2<f64>> {
        self.validate()?;

        let size = self.dataset.size();
        let batch_size = self.batch_size.unwrap_or(size).min(size);
        let samples = (self.max_epochs + self.report_interval - 1) / self.report_interval;
        let mut losses = Array2::zeros((2, samples));
        let mut recorded = 0;

        debug!(
            layers = self.network.len(),
            instances = size,
            batch_size,
            learning_rate = self.learning_rate,
            max_epochs = self.max_epochs,
            "starting training"
        );

        for epoch in 1..=self.max_epochs {
            if batch_size < size {
                self.dataset.shuffle(&mut self.rng);
            }

            let minibatches = self.dataset.batches(batch_size).collect::<Vec<_>>();
            for minibatch in &minibatches {
                let pass = self.forward(minibatch.x())?;
                let gradients = self.backward(&pass, minibatch.t())?;
                self.update(&gradients, epoch)?;
                trace!(epoch, instances = minibatch.size(), "minibatch done");
            }

            let report = (epoch - 1) % self.report_interval == 0;
            if !report && self.stop_below.is_none() {
                continue;
            }

            let cost = mse(&*self.network, &*self.dataset)?;
            if report {
                losses[[0, recorded]] = epoch as f64;
                losses[[1, recorded]] = cost;
                recorded += 1;
                info!(epoch, mse = cost, "training progress");
            }
            if let Some(threshold) = self.stop_below {
                if cost < threshold {
                    info!(epoch, mse = cost, threshold, "training cost below threshold");
                    break;
                }
            }
        }

        Ok(losses.slice(s![.., ..recorded]).to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use crate::{activation::Activation, assert_rel_eq_arr1, assert_rel_eq_arr2, layer::Layer};

    use super::*;

    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{arr1, arr2};
    use ndarray_rand::rand::{rngs::StdRng, SeedableRng};

    fn network(output: Activation) -> MultilayerPerceptron {
        let mut network = MultilayerPerceptron::new();
        network
            .add(
                Layer::new(
                    Activation::Tanh,
                    arr2(&[[0.3, -0.8], [0.5, 0.1], [-0.6, 0.4]]),
                    arr1(&[0.1, -0.2, 0.05]),
                )
                .unwrap(),
            )
            .unwrap();
        network
            .add(
                Layer::new(
                    output,
                    arr2(&[[0.7, -0.3, 0.2], [-0.4, 0.9, 0.6]]),
                    arr1(&[0.0, 0.1]),
                )
                .unwrap(),
            )
            .unwrap();
        network
    }

    fn dataset() -> Dataset {
        Dataset::new(
            arr2(&[[0.5, -1.0, 0.2], [1.5, 0.3, -0.7]]),
            arr2(&[[1.0, 0.0, 1.0], [0.0, 1.0, 0.0]]),
        )
        .unwrap()
    }

    fn with_weight(
        network: &MultilayerPerceptron,
        index: usize,
        position: [usize; 2],
        h: f64,
    ) -> MultilayerPerceptron {
        let mut perturbed = MultilayerPerceptron::new();
        for (i, layer) in network.layers().iter().enumerate() {
            let mut weights = layer.weights().clone();
            if i == index {
                weights[position] += h;
            }
            let layer = Layer::new(layer.activation(), weights, layer.biases().clone()).unwrap();
            perturbed.add(layer).unwrap();
        }
        perturbed
    }

    fn check_gradients(output: Activation, cost_function: CostFunction) {
        let mut network = network(output);
        let reference = network.clone();
        let mut data = dataset();
        let expected = data.clone();

        let mut backpropagation =
            Backpropagation::new(&mut network, &mut data, 0.1, 1, StdRng::seed_from_u64(0))
                .cost_function(cost_function);
        let pass = backpropagation.forward(expected.x()).unwrap();
        let gradients = backpropagation.backward(&pass, expected.t()).unwrap();

        let h = 1e-6;
        for (index, layer) in reference.layers().iter().enumerate() {
            for ((i, j), gradient) in gradients.weights[index].indexed_iter() {
                assert!(i < layer.neurons() && j < layer.inputs());
                let plus = cost_function
                    .cost_of(&with_weight(&reference, index, [i, j], h), &expected)
                    .unwrap();
                let minus = cost_function
                    .cost_of(&with_weight(&reference, index, [i, j], -h), &expected)
                    .unwrap();
                assert_abs_diff_eq!((plus - minus) / (2.0 * h), *gradient, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn gradients_match_finite_differences() {
        check_gradients(Activation::Logistic, CostFunction::Quadratic);
        check_gradients(Activation::Logistic, CostFunction::CrossEntropy);
        check_gradients(Activation::Softmax, CostFunction::Log);
        check_gradients(Activation::Identity, CostFunction::Quadratic);
    }

    #[test]
    fn bias_gradient_is_the_mean_delta() {
        let mut network = network(Activation::Identity);
        let mut data = dataset();
        let expected = data.clone();
        let mut backpropagation =
            Backpropagation::new(&mut network, &mut data, 0.1, 1, StdRng::seed_from_u64(0));
        let pass = backpropagation.forward(expected.x()).unwrap();
        let gradients = backpropagation.backward(&pass, expected.t()).unwrap();

        // The output layer is linear, so its delta is the quadratic cost gradient.
        let delta = &pass.output - expected.t();
        assert_relative_eq!(
            delta.row(1).mean().unwrap(),
            gradients.biases[1][1],
            epsilon = 1e-12
        );
    }

    #[test]
    fn backward_scales_propagated_error_by_keep_probability() {
        let mut network = MultilayerPerceptron::new();
        let hidden = Layer::new(
            Activation::Logistic,
            arr2(&[[0.3, -0.8], [0.5, 0.1], [-0.6, 0.4]]),
            arr1(&[0.1, -0.2, 0.05]),
        )
        .unwrap()
        .with_dropout(0.5)
        .unwrap();
        network.add(hidden).unwrap();
        network
            .add(
                Layer::new(
                    Activation::Identity,
                    arr2(&[[0.7, -0.3, 0.2], [-0.4, 0.9, 0.6]]),
                    arr1(&[0.0, 0.1]),
                )
                .unwrap(),
            )
            .unwrap();
        let output_weights = network.layers()[1].weights().clone();
        let mut data = dataset();
        let expected = data.clone();

        let mut backpropagation =
            Backpropagation::new(&mut network, &mut data, 0.1, 1, StdRng::seed_from_u64(4));
        let pass = backpropagation.forward(expected.x()).unwrap();
        let gradients = backpropagation.backward(&pass, expected.t()).unwrap();

        let masked = &pass.inputs[1];
        assert!(masked.iter().any(|&v| v == 0.0));
        assert!(masked.iter().any(|&v| v != 0.0));

        // Linear output under the quadratic cost.
        let m = expected.size() as f64;
        let output_delta = &pass.output - expected.t();
        let hidden_error = output_weights.t().dot(&output_delta) * 0.5;
        let hidden_delta =
            hidden_error * Activation::Logistic.derivative(&pass.pre_activations[0]).unwrap();
        assert_rel_eq_arr2!(
            gradients.weights[0],
            hidden_delta.dot(&pass.inputs[0].t()) / m
        );
        assert_rel_eq_arr1!(gradients.biases[0], hidden_delta.sum_axis(Axis(1)) / m);
        assert_rel_eq_arr2!(gradients.weights[1], output_delta.dot(&masked.t()) / m);
    }

    fn ordered() -> Dataset {
        let x = Array::range(0.0, 10.0, 1.0).insert_axis(Axis(0));
        Dataset::new(x.clone(), x).unwrap()
    }

    fn identity() -> MultilayerPerceptron {
        let mut network = MultilayerPerceptron::new();
        network
            .add(Layer::new(Activation::Identity, arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
            .unwrap();
        network
    }

    #[test]
    fn full_batch_keeps_instance_order() {
        for batch_size in [None, Some(10), Some(25)] {
            let mut network = identity();
            let mut data = ordered();
            let mut backpropagation =
                Backpropagation::new(&mut network, &mut data, 0.1, 5, StdRng::seed_from_u64(0));
            if let Some(batch_size) = batch_size {
                backpropagation = backpropagation.batch_size(batch_size);
            }
            backpropagation.train().unwrap();
            drop(backpropagation);
            assert_eq!(ordered(), data);
        }
    }

    #[test]
    fn minibatches_are_reshuffled_every_epoch() {
        let after = |epochs| {
            let mut network = identity();
            let mut data = ordered();
            Backpropagation::new(&mut network, &mut data, 0.1, epochs, StdRng::seed_from_u64(0))
                .batch_size(1)
                .train()
                .unwrap();
            data
        };
        let first = after(1);
        let second = after(2);

        assert_ne!(ordered(), first);
        assert_ne!(first, second);
        assert_eq!(first.x(), first.t());
        assert_eq!(second.x(), second.t());
    }

    #[test]
    fn dropout_masks_units() {
        let mut network = MultilayerPerceptron::new();
        let layer = Layer::new(Activation::Identity, Array2::eye(4), Array1::zeros(4))
            .unwrap()
            .with_dropout(0.5)
            .unwrap();
        network.add(layer).unwrap();
        let mut data = Dataset::new(Array2::ones((4, 50)), Array2::ones((4, 50))).unwrap();

        let mut backpropagation =
            Backpropagation::new(&mut network, &mut data, 0.1, 1, StdRng::seed_from_u64(9));
        let pass = backpropagation.forward(&Array2::ones((4, 50))).unwrap();
        assert!(pass.output.iter().all(|&v| v == 0.0 || v == 1.0));
        let kept = pass.output.sum();
        assert!(kept > 50.0 && kept < 150.0);
        assert_eq!(Array2::<f64>::ones((4, 50)), pass.pre_activations[0]);
    }

    #[test]
    fn mismatched_dataset_fails_before_training() {
        let mut network = network(Activation::Logistic);
        let before = network.layers()[0].weights().clone();
        let mut data = Dataset::new(Array2::zeros((3, 4)), Array2::zeros((2, 4))).unwrap();
        let result =
            Backpropagation::new(&mut network, &mut data, 0.1, 10, StdRng::seed_from_u64(0))
                .train();
        assert!(matches!(result, Err(Error::DimensionMismatch(_))));
        assert_eq!(before, network.layers()[0].weights());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut network = network(Activation::Logistic);
        let mut data = dataset();
        let result =
            Backpropagation::new(&mut network, &mut data, 0.1, 10, StdRng::seed_from_u64(0))
                .batch_size(0)
                .train();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn loss_trace_samples_every_interval() {
        let mut network = network(Activation::Logistic);
        let mut data = dataset();
        let trace =
            Backpropagation::new(&mut network, &mut data, 0.5, 250, StdRng::seed_from_u64(0))
                .train()
                .unwrap();
        assert_eq!(&[2, 3], trace.shape());
        assert_rel_eq_arr1!(trace.row(0).to_owned(), arr1(&[1.0, 101.0, 201.0]));
        assert!(trace[[1, 2]] < trace[[1, 0]]);
    }

    #[test]
    fn training_stops_below_threshold() {
        let mut network = network(Activation::Logistic);
        let mut data = dataset();
        let initial = mse(&network, &data).unwrap();
        let trace =
            Backpropagation::new(&mut network, &mut data, 0.5, 10_000, StdRng::seed_from_u64(0))
                .report_interval(1)
                .stop_below(initial)
                .train()
                .unwrap();
        assert_eq!(1, trace.ncols());
        assert!(trace[[1, 0]] < initial);
    }

    #[test]
    fn l2_penalization_shrinks_weights() {
        let mut network = MultilayerPerceptron::new();
        network
            .add(Layer::new(Activation::Identity, arr2(&[[1.0]]), arr1(&[0.0])).unwrap())
            .unwrap();
        let mut data = Dataset::new(arr2(&[[1.0, 2.0]]), arr2(&[[1.0, 2.0]])).unwrap();

        let mut backpropagation =
            Backpropagation::new(&mut network, &mut data, 0.5, 1, StdRng::seed_from_u64(0));
        backpropagation.hook_cost_penalization(l2_penalization(0.1));
        backpropagation.train().unwrap();
        drop(backpropagation);

        assert_relative_eq!(0.95, network.layers()[0].weights()[[0, 0]]);
        assert_relative_eq!(0.0, network.layers()[0].biases()[0]);
    }

    #[test]
    fn l1_penalization_uses_sign() {
        let penalization = l1_penalization(0.5);
        assert_rel_eq_arr2!(
            penalization(&arr2(&[[2.0, -3.0, 0.0]])),
            arr2(&[[0.5, -0.5, 0.0]])
        );
    }

    #[test]
    fn hooks_see_layer_index_and_epoch() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let recorder = {
            let calls = Rc::clone(&calls);
            move |learning_rate: f64, gradient: &Array2<f64>, layer_index: usize, epoch: usize| {
                calls.borrow_mut().push((layer_index, epoch));
                gradient * -learning_rate
            }
        };

        let mut network = network(Activation::Logistic);
        let mut data = dataset();
        let mut backpropagation =
            Backpropagation::new(&mut network, &mut data, 0.1, 2, StdRng::seed_from_u64(0));
        backpropagation.hook_optimizer(recorder);
        backpropagation.train().unwrap();

        assert_eq!(
            vec![
                (0, 1),
                (0, 1),
                (1, 1),
                (1, 1),
                (0, 2),
                (0, 2),
                (1, 2),
                (1, 2)
            ],
            *calls.borrow()
        );
    }

    #[test]
    fn wrongly_shaped_steps_are_rejected() {
        let mut network = network(Activation::Logistic);
        let mut data = dataset();
        let mut backpropagation =
            Backpropagation::new(&mut network, &mut data, 0.1, 1, StdRng::seed_from_u64(0));
        backpropagation.hook_weight_optimizer(|_: f64, _: &Array2<f64>, _: usize, _: usize| {
            Array2::<f64>::zeros((1, 1))
        });
        assert!(matches!(
            backpropagation.train(),
            Err(Error::DimensionMismatch(_))
        ));
    }
}
