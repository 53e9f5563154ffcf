use crate::arch::Layer;

/// An update rule for a model's parameters.
pub trait Optimizer {
    /// Updates one layer's parameters given its gradient summed over `batch_size` rows.
    fn update_layer(&mut self, params: &mut Layer, grad: &Layer, batch_size: usize);
}
