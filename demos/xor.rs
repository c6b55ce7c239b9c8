use std::env;

use ndarray::arr2;
use ndarray_rand::rand::{rngs::StdRng, SeedableRng};
use perceptron::{Activation, Backpropagation, Dataset, Layer, MultilayerPerceptron};
use tracing_subscriber::filter::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = env::args().collect::<Vec<_>>();
    let epochs = args.get(1).map_or(5000, |epochs| epochs.parse().unwrap());
    let learning_rate = args.get(2).map_or(1.0, |lr| lr.parse().unwrap());

    let mut dataset = Dataset::new(
        arr2(&[[0.0, 0.0, 1.0, 1.0], [0.0, 1.0, 0.0, 1.0]]),
        arr2(&[[0.0, 1.0, 1.0, 0.0]]),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(1);
    let mut network = MultilayerPerceptron::new();
    network
        .add(Layer::random(2, 3, Activation::Logistic, 1.0, &mut rng).unwrap())
        .unwrap();
    network
        .add(Layer::random(3, 1, Activation::Logistic, 1.0, &mut rng).unwrap())
        .unwrap();

    let trace = Backpropagation::new(&mut network, &mut dataset, learning_rate, epochs, rng)
        .report_interval(500)
        .stop_below(1e-3)
        .train()
        .unwrap();
    println!("loss trace:\n{:.5}", trace);

    let output = network.output(dataset.x()).unwrap();
    for (input, y) in dataset.x().columns().into_iter().zip(output.iter()) {
        println!("{} xor {} = {:.3}", input[0], input[1], y);
    }
}
