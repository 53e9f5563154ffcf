use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    InvalidArchitecture(String),
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    IncompatibleShape {
        what: &'static str,
        layer: usize,
        got: (usize, usize),
        expected: (usize, usize),
    },
    EmptyBatch,
    EmptyDataset,
    InvalidRatio(f64),
    InvalidLabel {
        row: usize,
        label: f64,
    },
    Parse {
        line: usize,
        detail: String,
    },
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::InvalidArchitecture(detail) => write!(f, "invalid architecture: {detail}"),
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::IncompatibleShape {
                what,
                layer,
                got,
                expected,
            } => write!(
                f,
                "Incompatible {what} shape at layer {layer}, got {got:?} and expected {expected:?}"
            ),
            MlErr::EmptyBatch => write!(f, "a gradient batch must be computed over at least one row"),
            MlErr::EmptyDataset => write!(f, "the dataset has no rows"),
            MlErr::InvalidRatio(ratio) => write!(f, "split ratio {ratio} is outside [0, 1]"),
            MlErr::InvalidLabel { row, label } => {
                write!(f, "row {row} is labeled {label}, labels must be 0 or 1")
            }
            MlErr::Parse { line, detail } => write!(f, "line {line}: {detail}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl MlErr {
    /// Whether this error comes from dimensions disagreeing with a model's architecture.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            MlErr::SizeMismatch { .. } | MlErr::IncompatibleShape { .. }
        )
    }
}
