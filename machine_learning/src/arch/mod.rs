mod activations;
mod layer;
mod mlp;

pub use activations::{sigmoid, sigmoid_prime};
pub use layer::{GradientBatch, Layer, ModelSnapshot};
pub use mlp::{ForwardPass, Mlp};
