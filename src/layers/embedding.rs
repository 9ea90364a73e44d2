//! Embedding layer
//!
//! Maps a context of token indices to the sum of their embedding vectors.
//! Input rows hold `context_len` token indices (as f32 values); the output
//! is one `embedding_dim` vector per sample. A configurable pad index is
//! skipped in both directions and its embedding row stays zero.

use crate::matrix::{Matrix, MatrixView};
use crate::utils::SimpleRng;

/// Embedding layer.
pub struct Embedding {
    vocab_size: usize,
    embedding_dim: usize,
    context_len: usize,
    batch_size: usize,
    pad_index: Option<usize>,
    /// Output buffer [B][E]
    h: Matrix,
    /// Embedding table [vocab][E]
    wx: Matrix,
}

impl Embedding {
    /// Create an embedding layer.
    ///
    /// The table is initialized uniformly in ±0.5; the pad row, when
    /// configured, is cleared to zero and never trained.
    pub fn new(
        embedding_dim: usize,
        context_len: usize,
        pad_index: Option<usize>,
        vocab_size: usize,
        batch_size: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(embedding_dim > 0, "embedding dimension must be positive");
        assert!(context_len > 0, "context length must be positive");
        assert!(vocab_size > 0, "vocabulary size must be positive");
        let mut wx = Matrix::zeros(vocab_size, embedding_dim);
        for v in wx.as_mut_slice().iter_mut() {
            *v = rng.gen_range_f32(-0.5, 0.5);
        }
        if let Some(pad) = pad_index {
            if pad < vocab_size {
                wx.row_mut(pad).fill(0.0);
            }
        }
        Self {
            vocab_size,
            embedding_dim,
            context_len,
            batch_size,
            pad_index,
            h: Matrix::zeros(batch_size, embedding_dim),
            wx,
        }
    }

    pub fn input_size(&self) -> usize {
        self.context_len
    }

    pub fn output_size(&self) -> usize {
        self.embedding_dim
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn parameter_count(&self) -> usize {
        self.vocab_size * self.embedding_dim
    }

    pub fn weights(&self) -> &Matrix {
        &self.wx
    }

    pub fn weights_mut(&mut self) -> &mut Matrix {
        &mut self.wx
    }

    /// Reallocate the per-batch output buffer for a new batch size.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        if batch_size != self.batch_size {
            self.batch_size = batch_size;
            self.h = Matrix::zeros(batch_size, self.embedding_dim);
        } else {
            self.h.fill(0.0);
        }
    }

    /// Forward pass: sum the embedding rows of each sample's context.
    ///
    /// Token values are rounded down to indices; pad tokens are skipped.
    pub fn forward(&mut self, x: MatrixView) {
        assert_eq!(x.rows(), self.batch_size, "embedding input batch mismatch");
        assert_eq!(
            x.cols(),
            self.context_len,
            "embedding context length mismatch"
        );
        self.h.fill(0.0);
        for i in 0..self.batch_size {
            let tokens = x.row(i);
            let hi = self.h.row_mut(i);
            for &tok in tokens {
                let tok = tok as usize;
                if Some(tok) == self.pad_index {
                    continue;
                }
                assert!(tok < self.vocab_size, "token index out of vocabulary");
                for (hv, &wv) in hi.iter_mut().zip(self.wx.row(tok).iter()) {
                    *hv += wv;
                }
            }
        }
    }

    /// The summed context vectors of the last forward pass.
    pub fn output(&self) -> MatrixView<'_> {
        self.h.view()
    }

    /// Backward pass.
    ///
    /// Distributes each sample's output gradient into the rows of every
    /// non-pad context token, scaled by `1 / context_len`. When `dx` is
    /// given, each context position receives the mean-scaled gradient sum.
    pub fn backward(
        &self,
        dy: MatrixView,
        x: MatrixView,
        gwx: &mut Matrix,
        dx: Option<&mut Matrix>,
    ) {
        assert_eq!(dy.rows(), self.batch_size, "embedding grad batch mismatch");
        assert_eq!(
            dy.cols(),
            self.embedding_dim,
            "embedding grad dimension mismatch"
        );
        assert_eq!(
            x.cols(),
            self.context_len,
            "embedding context length mismatch"
        );
        let scale = 1.0 / self.context_len as f32;
        gwx.fill(0.0);
        for i in 0..self.batch_size {
            let dyi = dy.row(i);
            for &tok in x.row(i) {
                let tok = tok as usize;
                if Some(tok) == self.pad_index {
                    continue;
                }
                let grow = gwx.row_mut(tok);
                for (gv, &dv) in grow.iter_mut().zip(dyi.iter()) {
                    *gv += dv * scale;
                }
            }
        }
        if let Some(dx) = dx {
            dx.fill(0.0);
            for i in 0..self.batch_size {
                let sum: f32 = dy.row(i).iter().sum();
                let dxi = dx.row_mut(i);
                for v in dxi.iter_mut() {
                    *v = sum * scale;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_creation_zeroes_pad_row() {
        let mut rng = SimpleRng::new(42);
        let l = Embedding::new(4, 3, Some(0), 10, 2, &mut rng);
        assert_eq!(l.output_size(), 4);
        assert_eq!(l.parameter_count(), 40);
        assert!(l.weights().row(0).iter().all(|&v| v == 0.0));
        assert!(l.weights().row(1).iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_forward_sums_context_rows() {
        let mut rng = SimpleRng::new(42);
        let mut l = Embedding::new(2, 2, None, 4, 1, &mut rng);
        *l.weights_mut() = Matrix::from_vec(
            4,
            2,
            vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );
        let x = Matrix::from_vec(1, 2, vec![1.0, 2.0]);
        l.forward(x.view());
        assert_eq!(l.output().row(0), &[4.0, 6.0]);
    }

    #[test]
    fn test_forward_skips_pad_tokens() {
        let mut rng = SimpleRng::new(42);
        let mut l = Embedding::new(2, 3, Some(0), 4, 1, &mut rng);
        *l.weights_mut() = Matrix::from_vec(
            4,
            2,
            vec![9.0, 9.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );
        let x = Matrix::from_vec(1, 3, vec![1.0, 0.0, 2.0]);
        l.forward(x.view());
        // Pad row values never reach the sum
        assert_eq!(l.output().row(0), &[4.0, 6.0]);
    }

    #[test]
    fn test_backward_scatters_scaled_gradient() {
        let mut rng = SimpleRng::new(42);
        let mut l = Embedding::new(2, 2, Some(0), 4, 1, &mut rng);
        let x = Matrix::from_vec(1, 2, vec![1.0, 3.0]);
        l.forward(x.view());
        let dy = Matrix::from_vec(1, 2, vec![1.0, -2.0]);
        let mut gwx = Matrix::zeros(4, 2);
        l.backward(dy.view(), x.view(), &mut gwx, None);
        assert_eq!(gwx.row(1), &[0.5, -1.0]);
        assert_eq!(gwx.row(3), &[0.5, -1.0]);
        assert_eq!(gwx.row(0), &[0.0, 0.0]);
        assert_eq!(gwx.row(2), &[0.0, 0.0]);
    }

    #[test]
    fn test_backward_pad_row_untouched() {
        let mut rng = SimpleRng::new(42);
        let mut l = Embedding::new(2, 2, Some(0), 4, 1, &mut rng);
        let x = Matrix::from_vec(1, 2, vec![0.0, 1.0]);
        l.forward(x.view());
        let dy = Matrix::from_vec(1, 2, vec![1.0, 1.0]);
        let mut gwx = Matrix::zeros(4, 2);
        l.backward(dy.view(), x.view(), &mut gwx, None);
        assert_eq!(gwx.row(0), &[0.0, 0.0]);
        assert_eq!(gwx.row(1), &[0.5, 0.5]);
    }

    #[test]
    fn test_repeated_token_accumulates() {
        let mut rng = SimpleRng::new(42);
        let mut l = Embedding::new(1, 2, None, 3, 1, &mut rng);
        let x = Matrix::from_vec(1, 2, vec![2.0, 2.0]);
        l.forward(x.view());
        let dy = Matrix::from_vec(1, 1, vec![1.0]);
        let mut gwx = Matrix::zeros(3, 1);
        l.backward(dy.view(), x.view(), &mut gwx, None);
        assert_eq!(gwx.row(2), &[1.0]);
    }
}
