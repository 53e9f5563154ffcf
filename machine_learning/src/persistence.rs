use std::{fs, path::Path};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{
    MlErr, Result,
    arch::{Layer, Mlp},
};

/// The on-disk layout of a model's parameters, one inner vector per layer.
///
/// Weight matrices are stored flattened in row-major order, their shapes come from the
/// architecture the file is loaded with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WeightsFile {
    biases: Vec<Vec<f64>>,
    weights: Vec<Vec<f64>>,
}

impl Mlp {
    /// Writes every weight and bias of the model to `path` as JSON.
    ///
    /// # Arguments
    /// * `path` - Where to write the file, it's overwritten if it exists.
    pub fn write_weights<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = WeightsFile {
            biases: self.layers().iter().map(|l| l.biases.to_vec()).collect(),
            weights: self
                .layers()
                .iter()
                .map(|l| l.weights.iter().copied().collect())
                .collect(),
        };

        fs::write(path, serde_json::to_vec(&file)?)?;
        Ok(())
    }

    /// Reads a model written by `write_weights`.
    ///
    /// # Arguments
    /// * `path` - The weights file.
    /// * `sizes` - The architecture the file was written with.
    ///
    /// # Returns
    /// The loaded model or an error if the file doesn't agree with `sizes`.
    pub fn read_weights<P: AsRef<Path>>(path: P, sizes: Vec<usize>) -> Result<Self> {
        let content = fs::read(path)?;
        let WeightsFile { biases, weights } = serde_json::from_slice(&content)?;

        let nlayers = sizes.len().saturating_sub(1);
        if weights.len() != nlayers || biases.len() != nlayers {
            return Err(MlErr::SizeMismatch {
                what: "stored layers",
                got: weights.len().max(biases.len()),
                expected: nlayers,
            });
        }

        let layers = sizes
            .windows(2)
            .zip(weights.into_iter().zip(biases))
            .enumerate()
            .map(|(i, (w, (weights, biases)))| {
                let dim = (w[0], w[1]);
                let got = weights.len();
                let weights = Array2::from_shape_vec(dim, weights).map_err(|_| {
                    MlErr::IncompatibleShape {
                        what: "stored weight",
                        layer: i,
                        got: (1, got),
                        expected: dim,
                    }
                })?;

                Ok(Layer {
                    weights,
                    biases: Array1::from(biases),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_layers(sizes, layers)
    }
}

#[cfg(test)]
mod tests {
    use std::{env, path::PathBuf, process};

    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        env::temp_dir().join(format!("{name}-{}.json", process::id()))
    }

    #[test]
    fn written_weights_read_back_identical() {
        let path = temp_file("weights-roundtrip");
        let mlp = Mlp::random(vec![4, 3, 2, 1], Some(5)).unwrap();

        mlp.write_weights(&path).unwrap();
        let read = Mlp::read_weights(&path, vec![4, 3, 2, 1]).unwrap();
        fs::remove_file(&path).unwrap();

        for (a, b) in mlp.layers().iter().zip(read.layers()) {
            assert_eq!(a.dim(), b.dim());
            assert!(a.weights.iter().zip(&b.weights).all(|(x, y)| (x - y).abs() < 1e-12));
            assert!(a.biases.iter().zip(&b.biases).all(|(x, y)| (x - y).abs() < 1e-12));
        }
    }

    #[test]
    fn file_layout_is_flat_per_layer() {
        let path = temp_file("weights-layout");
        let mlp = Mlp::zeros(vec![2, 3, 1]).unwrap();
        mlp.write_weights(&path).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(value["weights"][0].as_array().unwrap().len(), 6);
        assert_eq!(value["weights"][1].as_array().unwrap().len(), 3);
        assert_eq!(value["biases"][0].as_array().unwrap().len(), 3);
        assert_eq!(value["biases"][1].as_array().unwrap().len(), 1);
    }

    #[test]
    fn mismatched_architecture_fails_to_load() {
        let path = temp_file("weights-mismatch");
        Mlp::zeros(vec![4, 3, 1]).unwrap().write_weights(&path).unwrap();

        let wider = Mlp::read_weights(&path, vec![4, 5, 1]);
        let deeper = Mlp::read_weights(&path, vec![4, 3, 2, 1]);
        fs::remove_file(&path).unwrap();

        assert!(wider.unwrap_err().is_shape_mismatch());
        assert!(deeper.unwrap_err().is_shape_mismatch());
    }
}
