use std::{env, path::Path};

use csv::Reader;
use ndarray::Array2;
use ndarray_rand::rand::{rngs::StdRng, SeedableRng};
use perceptron::{
    data::zscore,
    metrics::evaluate,
    optimizer::{Adam, GradientDescent, Momentum, Optimizer, RmsProp},
    utils::train_test_split,
    Activation, Backpropagation, CostFunction, Dataset, Layer, MultilayerPerceptron,
    OneHotEncoder, Orientation,
};
use tracing_subscriber::{filter::EnvFilter, fmt::format};

// Load iris dataset available here: https://www.kaggle.com/arshid/iris-flower-dataset
fn load_iris(file_path: impl AsRef<Path>) -> (Array2<f64>, Vec<String>) {
    let mut reader = Reader::from_path(file_path).unwrap();
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for row in reader.records() {
        let row = row.unwrap();
        labels.push(row[4].to_string());
        features.extend(row.iter().take(4).map(|r| r.parse::<f64>().unwrap()));
    }
    // Rows are instances in the file, columns are instances in a `Dataset`.
    let x = Array2::from_shape_vec((labels.len(), 4), features)
        .unwrap()
        .reversed_axes();
    (x, labels)
}

fn network(rng: &mut StdRng) -> MultilayerPerceptron {
    let mut network = MultilayerPerceptron::new();
    network
        .add(Layer::random(4, 10, Activation::Tanh, 0.5, rng).unwrap())
        .unwrap();
    network
        .add(
            Layer::random(10, 10, Activation::Relu, 0.5, rng)
                .unwrap()
                .with_dropout(0.9)
                .unwrap(),
        )
        .unwrap();
    network
        .add(Layer::random(10, 3, Activation::Softmax, 0.5, rng).unwrap())
        .unwrap();
    network
}

fn compare<O: Optimizer + Clone + 'static>(
    name: &str,
    optimizer: O,
    train_set: &Dataset,
    test_set: &Dataset,
    epochs: usize,
    learning_rate: f64,
) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut network = network(&mut rng);
    let mut train = train_set.clone();

    let trace = {
        let mut backpropagation =
            Backpropagation::new(&mut network, &mut train, learning_rate, epochs, rng)
                .batch_size(16)
                .cost_function(CostFunction::Log);
        backpropagation.hook_optimizer(optimizer);
        backpropagation.train().unwrap()
    };

    let confusion_matrix = evaluate(&network, test_set).unwrap();
    println!(
        "{}: final mse = {:.5}, test accuracy = {:.3}",
        name,
        trace[[1, trace.ncols() - 1]],
        confusion_matrix.overall_accuracy()
    );
    for class in 0..confusion_matrix.classes() {
        println!(
            "  class {}: precision = {:.3}, recall = {:.3}, f1 = {:.3}",
            class,
            confusion_matrix.precision(class),
            confusion_matrix.recall(class),
            confusion_matrix.f1_score(class)
        );
    }
    println!("{:?}", confusion_matrix.counts());
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .event_format(format().with_target(false).without_time())
        .init();

    let args = env::args().collect::<Vec<_>>();
    let path = args.get(1).map(String::as_str).unwrap_or("./IRIS.csv");
    let epochs = args.get(2).map_or(1000, |epochs| epochs.parse().unwrap());
    let learning_rate = args.get(3).map_or(1e-2, |lr| lr.parse().unwrap());

    let (x, labels) = load_iris(path);
    let encoder = OneHotEncoder::new(
        vec!["Iris-setosa", "Iris-versicolor", "Iris-virginica"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    let t = encoder.encode(&labels).unwrap();

    let mut dataset = Dataset::new(x, t).unwrap();
    dataset.normalize(Orientation::Rows, zscore).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let (train_set, test_set) = train_test_split(dataset, 0.75, &mut rng).unwrap();

    compare("gradient descent", GradientDescent, &train_set, &test_set, epochs, learning_rate);
    compare("momentum", Momentum::default(), &train_set, &test_set, epochs, learning_rate);
    compare("rmsprop", RmsProp::default(), &train_set, &test_set, epochs, learning_rate);
    compare("adam", Adam::default(), &train_set, &test_set, epochs, learning_rate);
}
