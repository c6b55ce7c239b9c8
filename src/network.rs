use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::layer::Layer;

/// Linear stack of dense layers.
#[derive(Debug, Clone, Default)]
pub struct MultilayerPerceptron {
    layers: Vec<Layer>,
}

impl MultilayerPerceptron {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `layer` to the network.
    /// Fails if its input width differs from the number of neurons of the last layer.
    pub fn add(&mut self, layer: Layer) -> Result<()> {
        if let Some(last) = self.layers.last() {
            if last.neurons() != layer.inputs() {
                return Err(Error::DimensionMismatch(format!(
                    "the last layer in the network has {} neurons but the new layer is configured for {} inputs",
                    last.neurons(),
                    layer.inputs()
                )));
            }
        }

        debug!(
            index = self.layers.len(),
            inputs = layer.inputs(),
            neurons = layer.neurons(),
            activation = ?layer.activation(),
            "layer added"
        );
        self.layers.push(layer);
        Ok(())
    }

    /// Evaluate the network at inference time.
    ///
    /// The output of every layer is scaled by its keep probability, since training masks units
    /// without rescaling the surviving ones.
    pub fn output(&self, input: &Array2<f64>) -> Result<Array2<f64>> {
        let mut current = input.to_owned();
        for layer in &self.layers {
            let (_, y) = layer.output(&current)?;
            current = y * layer.keep_probability();
        }
        Ok(current)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of features the first layer expects, if any.
    pub fn input_width(&self) -> Option<usize> {
        self.layers.first().map(Layer::inputs)
    }

    /// Number of neurons of the last layer, if any.
    pub fn output_width(&self) -> Option<usize> {
        self.layers.last().map(Layer::neurons)
    }
}
