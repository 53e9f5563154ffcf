/// The logistic function, `1 / (1 + e^-z)`.
pub fn sigmoid(z: f64) -> f64 {
    1. / (1. + (-z).exp())
}

/// The derivative of `sigmoid` evaluated at the pre-activation `z`.
pub fn sigmoid_prime(z: f64) -> f64 {
    let s = sigmoid(z);
    s * (1. - s)
}
