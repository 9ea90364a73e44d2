//! Loss functions and their gradients
//!
//! Pure functions over shape-carrying views: each takes predictions and
//! targets for one batch and returns either the summed loss value or the
//! gradient with respect to the predictions. The caller divides by the
//! sample count when averaging across batches.

use crate::matrix::{Matrix, MatrixView};

/// Loss function selected at model compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    MeanSquareError,
    CrossEntropy,
    Ctc,
}

impl Loss {
    /// Parse a loss-function name, case-insensitively.
    ///
    /// Accepts `"mean-square-error"`, `"cross-entropy"`, and `"ctc"`.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_lowercase().as_str() {
            "mean-square-error" => Ok(Loss::MeanSquareError),
            "cross-entropy" => Ok(Loss::CrossEntropy),
            "ctc" => Ok(Loss::Ctc),
            _ => Err(format!(
                "invalid loss function '{}'; must be one of: mean-square-error, cross-entropy, ctc",
                name
            )),
        }
    }
}

/// Root of the summed squared error over the first `m` rows.
pub fn mean_square_error(yp: MatrixView, yt: MatrixView, m: usize) -> f32 {
    assert_eq!(yp.cols(), yt.cols(), "mse dimension mismatch");
    assert!(m <= yp.rows() && m <= yt.rows(), "mse row count mismatch");
    let mut error = 0.0;
    for i in 0..m {
        for (&p, &t) in yp.row(i).iter().zip(yt.row(i).iter()) {
            let d = p - t;
            error += d * d;
        }
    }
    error.sqrt()
}

/// Gradient of the mean square error: dy = 2 (yp - yt) / N / M.
pub fn d_mean_square_error(yp: MatrixView, yt: MatrixView, dy: &mut Matrix, m: usize) {
    let n = yp.cols();
    assert_eq!(n, yt.cols(), "mse gradient dimension mismatch");
    assert_eq!(n, dy.cols(), "mse gradient output mismatch");
    assert!(m <= yp.rows() && m <= dy.rows(), "mse gradient row mismatch");
    dy.fill(0.0);
    let scale = 2.0 / n as f32 / m as f32;
    for i in 0..m {
        let dyi = dy.row_mut(i);
        for (j, d) in dyi.iter_mut().enumerate() {
            *d = scale * (yp.at(i, j) - yt.at(i, j));
        }
    }
}

/// Summed cross-entropy loss over the first `m` rows of one-hot targets.
pub fn cross_entropy_loss(yp: MatrixView, yt: MatrixView, m: usize) -> f32 {
    assert_eq!(yp.cols(), yt.cols(), "cross-entropy dimension mismatch");
    assert!(
        m <= yp.rows() && m <= yt.rows(),
        "cross-entropy row count mismatch"
    );
    let mut loss = 0.0;
    for i in 0..m {
        for (&p, &t) in yp.row(i).iter().zip(yt.row(i).iter()) {
            loss += -t * (p + 1e-8).ln();
        }
    }
    loss
}

/// Gradient of the cross-entropy loss: dy = (yp - yt) / K.
pub fn d_cross_entropy_loss(yp: MatrixView, yt: MatrixView, dy: &mut Matrix, m: usize) {
    let k = yp.cols();
    assert_eq!(k, yt.cols(), "cross-entropy gradient dimension mismatch");
    assert_eq!(k, dy.cols(), "cross-entropy gradient output mismatch");
    assert!(
        m <= yp.rows() && m <= dy.rows(),
        "cross-entropy gradient row mismatch"
    );
    dy.fill(0.0);
    for i in 0..m {
        let dyi = dy.row_mut(i);
        for (j, d) in dyi.iter_mut().enumerate() {
            *d = (yp.at(i, j) - yt.at(i, j)) / k as f32;
        }
    }
}

/// Summed cross-entropy loss over class-index targets.
pub fn sparse_cross_entropy_loss(yp: MatrixView, yt: &[usize], m: usize) -> f32 {
    assert!(m <= yp.rows() && m <= yt.len(), "sparse ce row count mismatch");
    let mut loss = 0.0;
    for (i, &label) in yt.iter().enumerate().take(m) {
        loss += -(yp.at(i, label) + 1e-8).ln();
    }
    loss
}

/// Gradient of the sparse cross-entropy loss.
pub fn d_sparse_cross_entropy_loss(yp: MatrixView, yt: &[usize], dy: &mut Matrix, m: usize) {
    let k = yp.cols();
    assert_eq!(k, dy.cols(), "sparse ce gradient output mismatch");
    assert!(
        m <= yp.rows() && m <= yt.len() && m <= dy.rows(),
        "sparse ce gradient row mismatch"
    );
    dy.fill(0.0);
    for (i, &label) in yt.iter().enumerate().take(m) {
        let dyi = dy.row_mut(i);
        for (j, d) in dyi.iter_mut().enumerate() {
            let t = if j == label { 1.0 } else { 0.0 };
            *d = (yp.at(i, j) - t) / k as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_parse() {
        assert_eq!(
            Loss::parse("Mean-Square-Error").unwrap(),
            Loss::MeanSquareError
        );
        assert_eq!(Loss::parse("cross-entropy").unwrap(), Loss::CrossEntropy);
        assert_eq!(Loss::parse("CTC").unwrap(), Loss::Ctc);
        assert!(Loss::parse("hinge").is_err());
    }

    #[test]
    fn test_mse_zero_for_equal() {
        let yp = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mean_square_error(yp.view(), yp.view(), 2), 0.0);
    }

    #[test]
    fn test_mse_known_value() {
        let yp = Matrix::from_vec(1, 2, vec![1.0, 2.0]);
        let yt = Matrix::from_vec(1, 2, vec![4.0, 6.0]);
        // sqrt(9 + 16) = 5
        assert!((mean_square_error(yp.view(), yt.view(), 1) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_mse_gradient_sign_and_scale() {
        let yp = Matrix::from_vec(1, 2, vec![1.0, 0.0]);
        let yt = Matrix::from_vec(1, 2, vec![0.0, 1.0]);
        let mut dy = Matrix::zeros(1, 2);
        d_mean_square_error(yp.view(), yt.view(), &mut dy, 1);
        // 2 * (yp - yt) / N / M with N = 2, M = 1
        assert!((dy[(0, 0)] - 1.0).abs() < 1e-6);
        assert!((dy[(0, 1)] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_confident_correct() {
        let yp = Matrix::from_vec(1, 2, vec![0.999, 0.001]);
        let yt = Matrix::from_vec(1, 2, vec![1.0, 0.0]);
        let loss = cross_entropy_loss(yp.view(), yt.view(), 1);
        assert!(loss > 0.0 && loss < 0.01);
    }

    #[test]
    fn test_cross_entropy_gradient() {
        let yp = Matrix::from_vec(1, 2, vec![0.7, 0.3]);
        let yt = Matrix::from_vec(1, 2, vec![1.0, 0.0]);
        let mut dy = Matrix::zeros(1, 2);
        d_cross_entropy_loss(yp.view(), yt.view(), &mut dy, 1);
        assert!((dy[(0, 0)] + 0.15).abs() < 1e-6);
        assert!((dy[(0, 1)] - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_matches_dense_cross_entropy() {
        let yp = Matrix::from_vec(2, 3, vec![0.7, 0.2, 0.1, 0.1, 0.8, 0.1]);
        let yt = Matrix::from_vec(2, 3, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let dense = cross_entropy_loss(yp.view(), yt.view(), 2);
        let sparse = sparse_cross_entropy_loss(yp.view(), &[0, 1], 2);
        assert!((dense - sparse).abs() < 1e-6);

        let mut dy_dense = Matrix::zeros(2, 3);
        let mut dy_sparse = Matrix::zeros(2, 3);
        d_cross_entropy_loss(yp.view(), yt.view(), &mut dy_dense, 2);
        d_sparse_cross_entropy_loss(yp.view(), &[0, 1], &mut dy_sparse, 2);
        for (a, b) in dy_dense.as_slice().iter().zip(dy_sparse.as_slice()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
