use comms::specs::session::ScoresSpec;
use ndarray::ArrayView1;

use crate::{MlErr, Result, arch::Mlp, dataset::Dataset};

/// The output at or above which a sample is predicted as positive.
pub const THRESHOLD: f64 = 0.5;

/// Binary classification scores.
///
/// `precision` and `recall` are fractions in `[0, 1]`, `f1` is a percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Turns a model output into a class.
pub fn prediction(output: f64) -> f64 {
    if output >= THRESHOLD { 1.0 } else { 0.0 }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Scores raw model outputs against their true labels.
///
/// # Arguments
/// * `outputs` - The model outputs, thresholded with `prediction`.
/// * `truths` - The true labels, a label counts as positive when it's `1`.
pub fn score(outputs: ArrayView1<f64>, truths: ArrayView1<f64>) -> Result<Scores> {
    if outputs.len() != truths.len() {
        return Err(MlErr::SizeMismatch {
            what: "truths",
            got: truths.len(),
            expected: outputs.len(),
        });
    }

    let (mut tp, mut fp, mut fn_) = (0, 0, 0);
    for (&out, &truth) in outputs.iter().zip(truths) {
        let positive = truth == 1.0;
        match (prediction(out) == 1.0, positive) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall) * 100.0
    };

    Ok(Scores {
        true_positives: tp,
        false_positives: fp,
        false_negatives: fn_,
        precision,
        recall,
        f1,
    })
}

impl Mlp {
    /// Runs the model over `dataset` and scores its first output against the labels.
    ///
    /// # Arguments
    /// * `dataset` - The labeled samples, it must not be empty.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<Scores> {
        if dataset.is_empty() {
            return Err(MlErr::EmptyDataset);
        }

        let outputs = self.predict(dataset.features())?;
        score(outputs.column(0), dataset.labels())
    }
}

impl From<Scores> for ScoresSpec {
    fn from(value: Scores) -> Self {
        Self {
            true_positives: value.true_positives,
            false_positives: value.false_positives,
            false_negatives: value.false_negatives,
            precision: value.precision,
            recall: value.recall,
            f1: value.f1,
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, array};

    use super::*;

    #[test]
    fn perfect_predictions() {
        let scores = score(array![0.9, 0.4, 0.6, 0.1].view(), array![1., 0., 1., 0.].view()).unwrap();

        assert_eq!(scores.true_positives, 2);
        assert_eq!(scores.false_positives, 0);
        assert_eq!(scores.false_negatives, 0);
        assert_eq!(scores.precision, 1.0);
        assert_eq!(scores.recall, 1.0);
        assert_eq!(scores.f1, 100.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(prediction(0.5), 1.0);
        assert_eq!(prediction(0.4999), 0.0);
    }

    #[test]
    fn mixed_predictions() {
        // tp = 1, fp = 1, fn = 1
        let scores = score(array![0.8, 0.7, 0.2, 0.1].view(), array![1., 0., 1., 0.].view()).unwrap();

        assert_eq!(scores.precision, 0.5);
        assert_eq!(scores.recall, 0.5);
        assert!((scores.f1 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn no_positives_scores_zero() {
        let scores = score(array![0.1, 0.2].view(), array![0., 0.].view()).unwrap();

        assert_eq!(scores.precision, 0.0);
        assert_eq!(scores.recall, 0.0);
        assert_eq!(scores.f1, 0.0);
    }

    #[test]
    fn evaluate_refuses_empty_dataset() {
        let mlp = Mlp::zeros(vec![2, 1]).unwrap();
        assert!(matches!(
            mlp.evaluate(&Dataset::empty(2)),
            Err(MlErr::EmptyDataset)
        ));
    }

    #[test]
    fn zero_model_predicts_everything_positive() {
        // sigmoid(0) = 0.5 which is at the threshold.
        let mlp = Mlp::zeros(vec![2, 1]).unwrap();
        let dataset = Dataset::new(Array2::zeros((3, 2)), Array1::from(vec![1., 0., 1.])).unwrap();

        let scores = mlp.evaluate(&dataset).unwrap();
        assert_eq!(scores.true_positives, 2);
        assert_eq!(scores.false_positives, 1);
    }
}
