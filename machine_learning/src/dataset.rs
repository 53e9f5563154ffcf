use std::{fs, num::NonZeroUsize, path::Path};

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{MlErr, Result};

fn is_binary(label: f64) -> bool {
    label == 0.0 || label == 1.0
}

/// A labeled numeric feature table: one fixed-width row per sample and one binary label
/// per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Array1<f64>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `features` - The feature table, one row per sample.
    /// * `labels` - The label of every row.
    ///
    /// # Returns
    /// A new `Dataset` or an error if the amount of rows and labels differ or a label isn't
    /// `0` or `1`.
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: labels.len(),
                expected: features.nrows(),
            });
        }

        if let Some((row, &label)) = labels.iter().enumerate().find(|(_, l)| !is_binary(**l)) {
            return Err(MlErr::InvalidLabel { row, label });
        }

        Ok(Self { features, labels })
    }

    /// Creates a new `Dataset` out of individual rows.
    ///
    /// # Arguments
    /// * `rows` - The feature vectors, all of them must have the same width.
    /// * `labels` - The label of every row.
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or_default();
        let nrows = rows.len();
        let mut data = Vec::with_capacity(nrows * width);

        for row in rows {
            if row.len() != width {
                return Err(MlErr::SizeMismatch {
                    what: "feature row",
                    got: row.len(),
                    expected: width,
                });
            }

            data.extend(row);
        }

        let features = Array2::from_shape_vec((nrows, width), data).map_err(|_| {
            MlErr::SizeMismatch {
                what: "feature table",
                got: nrows,
                expected: nrows,
            }
        })?;

        Self::new(features, Array1::from(labels))
    }

    /// Creates a `Dataset` with no rows.
    ///
    /// # Arguments
    /// * `width` - The amount of features per row.
    pub fn empty(width: usize) -> Self {
        Self {
            features: Array2::zeros((0, width)),
            labels: Array1::zeros(0),
        }
    }

    /// Loads a numeric CSV table where every line is a sample and its last column is the
    /// label. Blank lines and lines starting with `#` are skipped.
    ///
    /// # Arguments
    /// * `path` - The path of the table.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let dataset = Self::parse_csv(&content)?;

        debug!(rows = dataset.len(), width = dataset.width(); "loaded {}", path.display());
        Ok(dataset)
    }

    /// Parses the CSV representation accepted by `from_csv`.
    pub fn parse_csv(content: &str) -> Result<Self> {
        let mut rows = Vec::new();
        let mut labels = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut values = line
                .split(',')
                .map(|v| {
                    v.trim().parse::<f64>().map_err(|e| MlErr::Parse {
                        line: i + 1,
                        detail: format!("{v:?} is not a number: {e}"),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let Some(label) = values.pop() else {
                continue;
            };

            if !is_binary(label) {
                return Err(MlErr::Parse {
                    line: i + 1,
                    detail: format!("label {label} must be 0 or 1"),
                });
            }

            if let Some(first) = rows.first().map(Vec::len)
                && first != values.len()
            {
                return Err(MlErr::Parse {
                    line: i + 1,
                    detail: format!("expected {first} features, got {}", values.len()),
                });
            }

            rows.push(values);
            labels.push(label);
        }

        Self::from_rows(rows, labels)
    }

    /// Returns the amount of rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns the amount of features per row.
    pub fn width(&self) -> usize {
        self.features.ncols()
    }

    /// Returns the feature table.
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Returns the labels as a vector.
    pub fn labels(&self) -> ArrayView1<'_, f64> {
        self.labels.view()
    }

    /// Returns the labels as a `(len, 1)` target matrix.
    pub fn targets(&self) -> ArrayView2<'_, f64> {
        self.labels.view().insert_axis(Axis(1))
    }

    /// Returns a copy of the dataset with its rows permuted by a seeded shuffle.
    ///
    /// # Arguments
    /// * `seed` - The same seed always yields the same permutation.
    pub fn shuffled(&self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut perm: Vec<usize> = (0..self.len()).collect();
        perm.shuffle(&mut rng);

        Self {
            features: self.features.select(Axis(0), &perm),
            labels: self.labels.select(Axis(0), &perm),
        }
    }

    /// Shuffles the dataset and splits it in a training and a validation part.
    ///
    /// The training part takes the first `floor(len * ratio)` shuffled rows and the
    /// validation part the rest, so no row is lost nor duplicated.
    ///
    /// # Arguments
    /// * `ratio` - The fraction of rows that go to the training part, within `[0, 1]`.
    /// * `seed` - The shuffle seed.
    ///
    /// # Returns
    /// A `(train, validation)` tuple.
    pub fn split(&self, ratio: f64, seed: u64) -> Result<(Self, Self)> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(MlErr::InvalidRatio(ratio));
        }

        let shuffled = self.shuffled(seed);
        let ntrain = ((self.len() as f64 * ratio) as usize).min(self.len());

        let train = Self {
            features: shuffled.features.slice(s![..ntrain, ..]).to_owned(),
            labels: shuffled.labels.slice(s![..ntrain]).to_owned(),
        };

        let validation = Self {
            features: shuffled.features.slice(s![ntrain.., ..]).to_owned(),
            labels: shuffled.labels.slice(s![ntrain..]).to_owned(),
        };

        debug!(
            train = train.len(),
            validation = validation.len();
            "split with ratio {ratio} and seed {seed}"
        );
        Ok((train, validation))
    }

    /// Iterates the dataset in order, `batch_size` rows at a time. The last batch holds the
    /// remaining rows and may be smaller.
    ///
    /// # Returns
    /// An iterator of `(features, targets)` views.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f64>, ArrayView2<'_, f64>)> {
        let size = batch_size.get();
        let len = self.len();
        let x = self.features.view();
        let y = self.targets();

        (0..len).step_by(size).map(move |start| {
            let end = (start + size).min(len);
            (
                x.clone().slice_move(s![start..end, ..]),
                y.clone().slice_move(s![start..end, ..]),
            )
        })
    }
}
