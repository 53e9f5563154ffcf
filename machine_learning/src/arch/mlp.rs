use ndarray::{Array2, ArrayView2, Axis, linalg};
use ndarray_rand::RandomExt;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

use super::{GradientBatch, Layer, ModelSnapshot, sigmoid, sigmoid_prime};
use crate::{MlErr, Result, optimization::Optimizer};

/// A fully-connected multilayer perceptron with sigmoid activations on every layer.
///
/// Layer `i` maps `sizes[i]` inputs to `sizes[i + 1]` outputs, so the model holds
/// `sizes.len() - 1` layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    sizes: Vec<usize>,
    layers: Vec<Layer>,
}

/// Everything the forward pass computed, kept around for the backward pass.
///
/// `activations[0]` is the input itself and `activations[i + 1] = sigmoid(zs[i])`.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub activations: Vec<Array2<f64>>,
    pub zs: Vec<Array2<f64>>,
}

impl ForwardPass {
    /// Returns the output of the last layer.
    pub fn output(&self) -> &Array2<f64> {
        // The input is always present, so there's at least one activation.
        &self.activations[self.activations.len() - 1]
    }
}

impl Mlp {
    /// Creates a new `Mlp` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `sizes` - The width of every layer, input and output included.
    ///
    /// # Returns
    /// A new `Mlp` or an error if the architecture is invalid.
    pub fn zeros(sizes: Vec<usize>) -> Result<Self> {
        Self::validate_sizes(&sizes)?;

        let layers = sizes.windows(2).map(|w| Layer::zeros((w[0], w[1]))).collect();
        Ok(Self { sizes, layers })
    }

    /// Creates a new `Mlp` with parameters drawn from a standard normal distribution.
    ///
    /// # Arguments
    /// * `sizes` - The width of every layer, input and output included.
    /// * `seed` - Makes the initialization reproducible when given.
    ///
    /// # Returns
    /// A new `Mlp` or an error if the architecture is invalid.
    pub fn random(sizes: Vec<usize>, seed: Option<u64>) -> Result<Self> {
        Self::validate_sizes(&sizes)?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let layers = sizes
            .windows(2)
            .map(|w| Layer {
                weights: Array2::random_using((w[0], w[1]), StandardNormal, &mut rng),
                biases: ndarray::Array1::random_using(w[1], StandardNormal, &mut rng),
            })
            .collect();

        Ok(Self { sizes, layers })
    }

    /// Creates a new `Mlp` out of already existing layers.
    ///
    /// # Arguments
    /// * `sizes` - The width of every layer, input and output included.
    /// * `layers` - The parameters, they must agree with `sizes`.
    pub fn from_layers(sizes: Vec<usize>, layers: Vec<Layer>) -> Result<Self> {
        let mut mlp = Self::zeros(sizes)?;
        mlp.check_layers("weight", &layers)?;
        mlp.layers = layers;
        Ok(mlp)
    }

    fn validate_sizes(sizes: &[usize]) -> Result<()> {
        if sizes.len() < 2 {
            return Err(MlErr::InvalidArchitecture(format!(
                "at least an input and an output size are needed, got {sizes:?}"
            )));
        }

        if sizes.contains(&0) {
            return Err(MlErr::InvalidArchitecture(format!(
                "every layer must have at least one unit, got {sizes:?}"
            )));
        }

        Ok(())
    }

    /// Returns the width of every layer, input and output included.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Returns the parameters of every layer.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Returns the amount of input features the model expects.
    pub fn input_size(&self) -> usize {
        self.sizes[0]
    }

    /// Returns the amount of outputs the model produces.
    pub fn output_size(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }

    /// Verifies that `layers` has exactly the shapes of this model's layers.
    ///
    /// # Arguments
    /// * `what` - What the layers hold, used in the error.
    /// * `layers` - The layers to check.
    pub fn check_layers(&self, what: &'static str, layers: &[Layer]) -> Result<()> {
        if layers.len() != self.layers.len() {
            return Err(MlErr::SizeMismatch {
                what: "layers",
                got: layers.len(),
                expected: self.layers.len(),
            });
        }

        for (i, (layer, own)) in layers.iter().zip(&self.layers).enumerate() {
            if layer.dim() != own.dim() {
                return Err(MlErr::IncompatibleShape {
                    what,
                    layer: i,
                    got: layer.dim(),
                    expected: own.dim(),
                });
            }

            if layer.biases.len() != own.biases.len() {
                return Err(MlErr::IncompatibleShape {
                    what: "bias",
                    layer: i,
                    got: (1, layer.biases.len()),
                    expected: (1, own.biases.len()),
                });
            }
        }

        Ok(())
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `x` - The input data, one row per sample.
    ///
    /// # Returns
    /// Every pre-activation and activation, or an error if `x` has the wrong width.
    pub fn forward(&self, x: ArrayView2<f64>) -> Result<ForwardPass> {
        if x.ncols() != self.input_size() {
            return Err(MlErr::SizeMismatch {
                what: "input features",
                got: x.ncols(),
                expected: self.input_size(),
            });
        }

        let nlayers = self.layers.len();
        let mut activations = Vec::with_capacity(nlayers + 1);
        let mut zs = Vec::with_capacity(nlayers);
        activations.push(x.to_owned());

        for layer in &self.layers {
            let a = &activations[activations.len() - 1];
            let mut z = Array2::zeros((a.nrows(), layer.biases.len()));

            linalg::general_mat_mul(1.0, a, &layer.weights, 0.0, &mut z);
            z += &layer.biases;

            activations.push(z.mapv(sigmoid));
            zs.push(z);
        }

        Ok(ForwardPass { activations, zs })
    }

    /// Computes the model's output for `x`.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let mut pass = self.forward(x)?;
        Ok(pass.activations.pop().unwrap_or_default())
    }

    /// Computes the gradient of the squared error with respect to every parameter over
    /// one mini-batch.
    ///
    /// The gradients are summed over the rows of the batch, scaling them is left to
    /// whoever applies them.
    ///
    /// # Arguments
    /// * `x` - The batch inputs, `(n, sizes[0])`.
    /// * `y` - The batch targets, `(n, sizes[last])`.
    ///
    /// # Returns
    /// The per-layer gradient and the batch size `n`.
    pub fn backward(&self, x: ArrayView2<f64>, y: ArrayView2<f64>) -> Result<GradientBatch> {
        let batch_size = x.nrows();
        if batch_size == 0 {
            return Err(MlErr::EmptyBatch);
        }

        let nlayers = self.layers.len();
        let expected = (batch_size, self.output_size());
        if y.dim() != expected {
            return Err(MlErr::IncompatibleShape {
                what: "target",
                layer: nlayers - 1,
                got: y.dim(),
                expected,
            });
        }

        let ForwardPass { activations, zs } = self.forward(x)?;

        // delta_last = (a_last - y) * sigmoid'(z_last)
        let mut delta = (&activations[nlayers] - &y) * zs[nlayers - 1].mapv(sigmoid_prime);
        let mut grads = Vec::with_capacity(nlayers);

        for i in (0..nlayers).rev() {
            let weights = activations[i].t().dot(&delta);
            let biases = delta.sum_axis(Axis(0));

            if i > 0 {
                delta = delta.dot(&self.layers[i].weights.t()) * zs[i - 1].mapv(sigmoid_prime);
            }

            grads.push(Layer { weights, biases });
        }

        grads.reverse();

        Ok(GradientBatch {
            layers: grads,
            batch_size,
        })
    }

    /// Applies a gradient batch with `optimizer`.
    ///
    /// Every layer shape is checked before touching any parameter, a rejected batch leaves
    /// the model exactly as it was.
    ///
    /// # Arguments
    /// * `batch` - The gradient to apply.
    /// * `optimizer` - The update rule.
    pub fn apply_gradient<O: Optimizer>(
        &mut self,
        batch: &GradientBatch,
        optimizer: &mut O,
    ) -> Result<()> {
        if batch.batch_size == 0 {
            return Err(MlErr::EmptyBatch);
        }

        self.check_layers("gradient", &batch.layers)?;

        for (params, grad) in self.layers.iter_mut().zip(&batch.layers) {
            optimizer.update_layer(params, grad, batch.batch_size);
        }

        Ok(())
    }

    /// Takes a deep copy of the current parameters.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            layers: self.layers.clone(),
        }
    }

    /// Replaces the current parameters with the ones in `snapshot`.
    ///
    /// # Arguments
    /// * `snapshot` - The parameters to install, they must match this model's architecture.
    pub fn install(&mut self, snapshot: ModelSnapshot) -> Result<()> {
        self.check_layers("weight", &snapshot.layers)?;
        self.layers = snapshot.layers;
        Ok(())
    }
}
