use super::Optimizer;
use crate::arch::Layer;

/// Gradient descent optimization algorithm.
#[derive(Debug, Clone, Copy)]
pub struct GradientDescent {
    learning_rate: f64,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `update_layer`.
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }

    /// Returns the configured learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of the gradient. Since the gradient is a sum
    /// over the batch, the step is scaled by `learning_rate / batch_size`.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step.
    /// * `batch_size` - The amount of rows `grad` was summed over.
    fn update_layer(&mut self, params: &mut Layer, grad: &Layer, batch_size: usize) {
        let scale = self.learning_rate / batch_size as f64;

        params.weights.scaled_add(-scale, &grad.weights);
        params.biases.scaled_add(-scale, &grad.biases);
    }
}
