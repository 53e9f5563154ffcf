use ndarray::{Array1, Array2};

/// The parameters of one fully-connected layer: a `(in, out)` weight matrix and an `out`
/// sized bias vector.
///
/// The same shape is used for a layer's parameters and for its gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
}

impl Layer {
    /// Creates a new layer filled with zeros.
    ///
    /// # Arguments
    /// * `dim` - The `(in, out)` dimensions.
    pub fn zeros(dim: (usize, usize)) -> Self {
        Self {
            weights: Array2::zeros(dim),
            biases: Array1::zeros(dim.1),
        }
    }

    /// Returns the `(in, out)` dimensions of the weight matrix.
    pub fn dim(&self) -> (usize, usize) {
        self.weights.dim()
    }
}

/// An independent, point-in-time copy of a model's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    pub layers: Vec<Layer>,
}

/// The summed (not averaged) gradient of one mini-batch, one entry per layer, together with
/// the amount of rows it was computed over.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBatch {
    pub layers: Vec<Layer>,
    pub batch_size: usize,
}
