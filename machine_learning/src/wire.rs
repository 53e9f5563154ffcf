use comms::msg::{LayerParams, Payload};
use ndarray::{Array1, Array2};

use crate::{
    MlErr, Result,
    arch::{GradientBatch, Layer, ModelSnapshot},
};

impl From<&Layer> for LayerParams {
    fn from(layer: &Layer) -> Self {
        let (rows, cols) = layer.dim();
        Self {
            rows,
            cols,
            weights: layer.weights.iter().copied().collect(),
            biases: layer.biases.to_vec(),
        }
    }
}

impl TryFrom<LayerParams> for Layer {
    type Error = MlErr;

    fn try_from(params: LayerParams) -> Result<Self> {
        let LayerParams {
            rows,
            cols,
            weights,
            biases,
        } = params;

        let got = weights.len();
        let weights = Array2::from_shape_vec((rows, cols), weights).map_err(|_| {
            MlErr::SizeMismatch {
                what: "flattened weights",
                got,
                expected: rows * cols,
            }
        })?;

        Ok(Self {
            weights,
            biases: Array1::from(biases),
        })
    }
}

fn to_layers(params: Vec<LayerParams>) -> Result<Vec<Layer>> {
    params.into_iter().map(Layer::try_from).collect()
}

impl From<&ModelSnapshot> for Payload {
    fn from(snapshot: &ModelSnapshot) -> Self {
        Payload::Weights(snapshot.layers.iter().map(LayerParams::from).collect())
    }
}

impl From<&GradientBatch> for Payload {
    fn from(batch: &GradientBatch) -> Self {
        Payload::Gradient {
            batch_size: batch.batch_size,
            layers: batch.layers.iter().map(LayerParams::from).collect(),
        }
    }
}

impl ModelSnapshot {
    /// Rebuilds a snapshot out of the layers of a `Weights` payload.
    pub fn from_params(params: Vec<LayerParams>) -> Result<Self> {
        Ok(Self {
            layers: to_layers(params)?,
        })
    }
}

impl GradientBatch {
    /// Rebuilds a gradient batch out of the fields of a `Gradient` payload.
    pub fn from_params(batch_size: usize, params: Vec<LayerParams>) -> Result<Self> {
        Ok(Self {
            layers: to_layers(params)?,
            batch_size,
        })
    }
}
