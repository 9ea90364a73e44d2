//! Plain gradient descent with weight decay
//!
//! The simplest update rule: `w -= lr * (g + wd * w)`. Gradients are
//! clipped first. No per-parameter state is kept, so the same `ParamState`
//! layout carries only the gradient buffer.

use crate::matrix::Matrix;
use crate::optimizers::{clip_gradients, GRAD_MAX, GRAD_MIN};

/// Update all weights in `w` from the corresponding gradients in `g`.
///
/// # Panics
///
/// Panics if `w` and `g` have different shapes.
pub fn sgd_update(w: &mut Matrix, g: &mut Matrix, learning_rate: f32, weight_decay: f32) {
    assert_eq!(w.rows(), g.rows(), "weight/gradient shape mismatch");
    assert_eq!(w.cols(), g.cols(), "weight/gradient shape mismatch");

    clip_gradients(g, GRAD_MIN, GRAD_MAX);

    for (wi, &gi) in w.as_mut_slice().iter_mut().zip(g.as_slice().iter()) {
        *wi -= learning_rate * (gi + weight_decay * *wi);
    }
}
