//! Dense (feed forward) layer
//!
//! Performs the transformation `h = activate(x @ Wx)`. The input dimension
//! includes the bias column, so the weight row multiplying it acts as a
//! learned additive offset; there is no separate bias vector.

use crate::matrix::{self, Matrix, MatrixView};
use crate::utils::{Activation, SimpleRng};

/// Dense (fully connected) layer.
///
/// Weights are `input_dim × units` row-major; the per-batch output buffer
/// is `batch_size × units` and is the only buffer `forward` writes.
pub struct Dense {
    input_dim: usize,
    units: usize,
    batch_size: usize,
    activation: Activation,
    /// Activated output [B][S], owned by the layer
    h: Matrix,
    /// Weights [D][S]
    wx: Matrix,
}

impl Dense {
    /// Create a dense layer with Glorot-normal initialized weights.
    ///
    /// `input_dim` must include the bias dimension when one is in use.
    pub fn new(
        units: usize,
        activation: Activation,
        input_dim: usize,
        batch_size: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(units > 0, "dense layer needs at least one unit");
        assert!(input_dim > 0, "dense layer input dimension must be positive");
        let mut wx = Matrix::zeros(input_dim, units);
        let scale = (2.0 / (input_dim + units) as f32).sqrt();
        for w in wx.as_mut_slice().iter_mut() {
            *w = rng.gen_normal(0.0, scale);
        }
        Self {
            input_dim,
            units,
            batch_size,
            activation,
            h: Matrix::zeros(batch_size, units),
            wx,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_dim
    }

    pub fn output_size(&self) -> usize {
        self.units
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn parameter_count(&self) -> usize {
        self.input_dim * self.units
    }

    pub fn weights(&self) -> &Matrix {
        &self.wx
    }

    pub fn weights_mut(&mut self) -> &mut Matrix {
        &mut self.wx
    }

    /// Reallocate the per-batch output buffer for a new batch size.
    ///
    /// Weights are untouched. With an unchanged size the buffer is cleared.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        if batch_size != self.batch_size {
            self.batch_size = batch_size;
            self.h = Matrix::zeros(batch_size, self.units);
        } else {
            self.h.fill(0.0);
        }
    }

    /// Forward pass: `h = activate(x @ Wx)`.
    pub fn forward(&mut self, x: MatrixView) {
        assert_eq!(x.rows(), self.batch_size, "dense input batch mismatch");
        assert_eq!(x.cols(), self.input_dim, "dense input dimension mismatch");
        matrix::matmul(&mut self.h, x, self.wx.view());
        self.activation
            .apply(self.h.as_mut_slice(), self.batch_size, self.units);
    }

    /// The activated output of the last forward pass.
    pub fn output(&self) -> MatrixView<'_> {
        self.h.view()
    }

    /// Backward pass.
    ///
    /// Writes the weight gradient `gwx = xᵀ @ dy` and, when `dx` is given,
    /// the input gradient `dx = (dy @ Wxᵀ) ⊙ act'(x)`. The derivative is
    /// evaluated at `x`, which for a hidden layer is the previous layer's
    /// already-activated output; the softmax derivative is not applied.
    pub fn backward(
        &self,
        dy: MatrixView,
        x: MatrixView,
        gwx: &mut Matrix,
        dx: Option<&mut Matrix>,
    ) {
        assert_eq!(dy.rows(), self.batch_size, "dense grad batch mismatch");
        assert_eq!(dy.cols(), self.units, "dense grad dimension mismatch");
        assert_eq!(x.cols(), self.input_dim, "dense input dimension mismatch");
        matrix::matmul_ta(gwx, x, dy);
        if let Some(dx) = dx {
            matrix::matmul_tb(dx, dy, self.wx.view());
            self.activation.mul_derivative(dx.as_mut_slice(), x.as_slice());
        }
    }
}
