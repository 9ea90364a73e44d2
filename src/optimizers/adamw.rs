//! AdamW: adaptive moment estimation with decoupled weight decay
//!
//! Implements Algorithm 2 of "Decoupled Weight Decay Regularization"
//! (Loshchilov & Hutter, <https://arxiv.org/pdf/1711.05101.pdf>).
//! Per parameter:
//!
//! ```text
//! m = β1 * m + (1 - β1) * g
//! v = β2 * v + (1 - β2) * g²
//! m̂ = m / (1 - β1^t),  v̂ = v / (1 - β2^t)
//! w -= lr * (m̂ / (√v̂ + ε) + wd * w)
//! ```
//!
//! The step count `t` comes from the model's update counter; the moment
//! buffers live in the parameter's [`ParamState`].

use crate::matrix::Matrix;
use crate::optimizers::{clip_gradients, ParamState, GRAD_MAX, GRAD_MIN};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1.0e-7;

/// Update all weights in `w` using the AdamW rule.
///
/// `step` is the 1-based update count shared by every parameter of the
/// model, feeding the bias-correction terms.
///
/// # Panics
///
/// Panics if `w` and the state buffers have different shapes, and when a
/// stored second moment has gone negative, the unrecoverable signature of
/// a weight or gradient explosion.
pub fn adamw_update(
    w: &mut Matrix,
    state: &mut ParamState,
    learning_rate: f32,
    weight_decay: f32,
    step: usize,
) {
    assert_eq!(w.rows(), state.grad.rows(), "weight/gradient shape mismatch");
    assert_eq!(w.cols(), state.grad.cols(), "weight/gradient shape mismatch");
    assert_eq!(w.rows(), state.m1.rows(), "weight/moment shape mismatch");
    assert_eq!(w.rows(), state.m2.rows(), "weight/moment shape mismatch");

    clip_gradients(&mut state.grad, GRAD_MIN, GRAD_MAX);

    let bias1 = 1.0 - BETA1.powi(step as i32);
    let bias2 = 1.0 - BETA2.powi(step as i32);

    let ws = w.as_mut_slice();
    let gs = state.grad.as_slice();
    let ms = state.m1.as_mut_slice();
    let vs = state.m2.as_mut_slice();
    for i in 0..ws.len() {
        if vs[i] < 0.0 {
            panic!("adamw: weight or gradient explosion");
        }
        let g = gs[i];
        ms[i] = BETA1 * ms[i] + (1.0 - BETA1) * g;
        vs[i] = BETA2 * vs[i] + (1.0 - BETA2) * g * g;
        let mh = ms[i] / bias1;
        let vh = vs[i] / bias2;
        let ag = mh / (vh.sqrt() + EPSILON);
        ws[i] -= learning_rate * (ag + weight_decay * ws[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::OptimizerKind;

    #[test]
    fn test_adamw_first_step_direction() {
        let mut w = Matrix::from_vec(1, 2, vec![1.0, -1.0]);
        let mut state = ParamState::new(1, 2, OptimizerKind::AdamW);
        state.grad.as_mut_slice().copy_from_slice(&[1.0, -1.0]);
        adamw_update(&mut w, &mut state, 0.01, 0.0, 1);
        // Positive gradient decreases the weight, negative increases it
        assert!(w[(0, 0)] < 1.0);
        assert!(w[(0, 1)] > -1.0);
    }

    #[test]
    fn test_adamw_moments_accumulate() {
        let mut w = Matrix::from_vec(1, 1, vec![1.0]);
        let mut state = ParamState::new(1, 1, OptimizerKind::AdamW);
        state.grad.as_mut_slice()[0] = 0.5;
        adamw_update(&mut w, &mut state, 0.01, 0.0, 1);
        let m_after_first = state.m1[(0, 0)];
        let v_after_first = state.m2[(0, 0)];
        assert!((m_after_first - 0.05).abs() < 1e-6);
        assert!((v_after_first - 0.25e-3).abs() < 1e-7);

        state.grad.as_mut_slice()[0] = 0.5;
        adamw_update(&mut w, &mut state, 0.01, 0.0, 2);
        assert!(state.m1[(0, 0)] > m_after_first);
        assert!(state.m2[(0, 0)] > v_after_first);
    }

    #[test]
    fn test_adamw_bias_correction_first_step_near_lr() {
        // With a constant gradient the bias-corrected first step has
        // magnitude close to the learning rate
        let mut w = Matrix::from_vec(1, 1, vec![0.0]);
        let mut state = ParamState::new(1, 1, OptimizerKind::AdamW);
        state.grad.as_mut_slice()[0] = 3.0;
        adamw_update(&mut w, &mut state, 0.01, 0.0, 1);
        assert!((w[(0, 0)] + 0.01).abs() < 1e-4);
    }

    #[test]
    fn test_adamw_weight_decay_pulls_toward_zero() {
        let mut w = Matrix::from_vec(1, 1, vec![10.0]);
        let mut state = ParamState::new(1, 1, OptimizerKind::AdamW);
        state.grad.as_mut_slice()[0] = 1.0e-20; // at the clipping floor
        adamw_update(&mut w, &mut state, 0.1, 0.5, 1);
        assert!(w[(0, 0)] < 10.0 - 0.4);
    }

    #[test]
    #[should_panic(expected = "weight or gradient explosion")]
    fn test_adamw_negative_second_moment_is_fatal() {
        let mut w = Matrix::from_vec(1, 1, vec![1.0]);
        let mut state = ParamState::new(1, 1, OptimizerKind::AdamW);
        state.m2.as_mut_slice()[0] = -1.0;
        adamw_update(&mut w, &mut state, 0.01, 0.0, 1);
    }
}
