//! Optimizers for model parameter updates
//!
//! Two update rules are provided: plain gradient descent with weight decay
//! (`sgd`) and AdamW (`adamw`). Both clip gradients first, rescaling every
//! element's magnitude into `[GRAD_MIN, GRAD_MAX]` with the sign preserved.
//!
//! Optimizer state lives next to the gradient it belongs to: each trainable
//! parameter matrix gets a [`ParamState`] holding its gradient buffer and,
//! for AdamW, the first and second moment estimates. The model allocates
//! these once at compile time and the update step counter that feeds the
//! AdamW bias correction is owned by the model.

pub mod adamw;
pub mod sgd;

pub use adamw::adamw_update;
pub use sgd::sgd_update;

use crate::matrix::Matrix;

/// Smallest gradient magnitude kept after clipping.
pub const GRAD_MIN: f32 = 1.0e-12;
/// Largest gradient magnitude kept after clipping.
pub const GRAD_MAX: f32 = 10.0;

/// Optimizer selected at model compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    /// Plain gradient descent with weight decay.
    Sgd,
    /// Adam with decoupled weight decay.
    AdamW,
}

impl OptimizerKind {
    /// Parse an optimizer name, case-insensitively.
    ///
    /// Accepts `"sgd"` and `"adamw"`.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adamw" => Ok(OptimizerKind::AdamW),
            _ => Err(format!(
                "invalid optimizer '{}'; must be one of: sgd, adamw",
                name
            )),
        }
    }
}

/// Gradient and optimizer state for one trainable parameter matrix.
///
/// `m1`/`m2` hold the AdamW first/second moment estimates and are empty
/// (0 × 0) under plain SGD.
pub struct ParamState {
    pub grad: Matrix,
    pub m1: Matrix,
    pub m2: Matrix,
}

impl ParamState {
    /// Allocate state for a `rows` × `cols` parameter matrix.
    pub fn new(rows: usize, cols: usize, kind: OptimizerKind) -> Self {
        let (m1, m2) = match kind {
            OptimizerKind::Sgd => (Matrix::zeros(0, 0), Matrix::zeros(0, 0)),
            OptimizerKind::AdamW => (Matrix::zeros(rows, cols), Matrix::zeros(rows, cols)),
        };
        Self {
            grad: Matrix::zeros(rows, cols),
            m1,
            m2,
        }
    }
}

/// Clip gradient magnitudes into `[gmin, gmax]`, preserving sign.
///
/// Bounds both "exploding" gradients, which destabilize the update, and
/// "vanishing" gradients, which stall convergence.
pub fn clip_gradients(g: &mut Matrix, gmin: f32, gmax: f32) {
    for v in g.as_mut_slice().iter_mut() {
        let m = v.abs();
        if m > gmax {
            *v = if *v > 0.0 { gmax } else { -gmax };
        } else if m < gmin {
            *v = if *v > 0.0 { gmin } else { -gmin };
        }
    }
}

/// Apply one optimizer step to a parameter matrix.
///
/// Dispatches to the selected update rule; `step` is the model's update
/// counter (1-based), consumed only by AdamW's bias correction.
pub fn apply_update(
    kind: OptimizerKind,
    w: &mut Matrix,
    state: &mut ParamState,
    learning_rate: f32,
    weight_decay: f32,
    step: usize,
) {
    match kind {
        OptimizerKind::Sgd => sgd_update(w, &mut state.grad, learning_rate, weight_decay),
        OptimizerKind::AdamW => adamw_update(w, state, learning_rate, weight_decay, step),
    }
}
