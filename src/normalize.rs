//! Per-feature input normalization
//!
//! Feature vectors are normalized column-wise to zero mean and unit
//! standard deviation. The last column can be excluded so an appended bias
//! column keeps its constant 1.0 value.

use crate::matrix::{Matrix, MatrixView};

/// Column-wise mean and standard deviation of the first `m` rows.
///
/// When `exclude_last` is set, the last column is left out of the
/// calculation and `mean`/`sdev` cover one fewer column.
pub fn compute_mean_sdev(
    x: MatrixView,
    m: usize,
    mean: &mut [f32],
    sdev: &mut [f32],
    exclude_last: bool,
) {
    let dx = x.cols() - usize::from(exclude_last);
    assert_eq!(mean.len(), dx, "mean length mismatch");
    assert_eq!(sdev.len(), dx, "sdev length mismatch");
    assert!(m > 0 && m <= x.rows(), "row count out of range");

    mean.fill(0.0);
    sdev.fill(0.0);
    for i in 0..m {
        for (s, &v) in mean.iter_mut().zip(x.row(i).iter()) {
            *s += v;
        }
    }
    for s in mean.iter_mut() {
        *s /= m as f32;
    }

    for i in 0..m {
        let row = x.row(i);
        for (j, v) in sdev.iter_mut().enumerate() {
            let d = row[j] - mean[j];
            *v += d * d;
        }
    }
    for v in sdev.iter_mut() {
        *v = (*v / m as f32).sqrt();
    }
}

/// Normalize rows of `x` in place using precomputed `mean`/`sdev`.
///
/// Columns with zero standard deviation (all values equal the mean) are
/// set to zero. When `exclude_last` is set, the last column is untouched.
pub fn normalize(x: &mut Matrix, mean: &[f32], sdev: &[f32], exclude_last: bool) {
    let dx = x.cols() - usize::from(exclude_last);
    assert_eq!(mean.len(), dx, "mean length mismatch");
    assert_eq!(sdev.len(), dx, "sdev length mismatch");

    for i in 0..x.rows() {
        let row = x.row_mut(i);
        for j in 0..dx {
            if sdev[j] > 0.0 {
                row[j] = (row[j] - mean[j]) / sdev[j];
            } else {
                row[j] = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_sdev_simple() {
        let x = Matrix::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]);
        let mut mean = vec![0.0];
        let mut sdev = vec![0.0];
        compute_mean_sdev(x.view(), 4, &mut mean, &mut sdev, false);
        assert!((mean[0] - 2.5).abs() < 1e-6);
        // Population standard deviation: sqrt(1.25)
        assert!((sdev[0] - 1.25f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_mean_unit_sdev() {
        let mut x = Matrix::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]);
        let mut mean = vec![0.0];
        let mut sdev = vec![0.0];
        compute_mean_sdev(x.view(), 4, &mut mean, &mut sdev, false);
        normalize(&mut x, &mean, &sdev, false);
        let sum: f32 = x.as_slice().iter().sum();
        assert!(sum.abs() < 1e-6);
    }

    #[test]
    fn test_normalize_excludes_bias_column() {
        let mut x = Matrix::from_vec(2, 2, vec![10.0, 1.0, 20.0, 1.0]);
        let mean = vec![15.0];
        let sdev = vec![5.0];
        normalize(&mut x, &mean, &sdev, true);
        assert_eq!(x.row(0), &[-1.0, 1.0]);
        assert_eq!(x.row(1), &[1.0, 1.0]);
    }

    #[test]
    fn test_normalize_constant_column_goes_to_zero() {
        let mut x = Matrix::from_vec(3, 1, vec![7.0, 7.0, 7.0]);
        let mut mean = vec![0.0];
        let mut sdev = vec![0.0];
        compute_mean_sdev(x.view(), 3, &mut mean, &mut sdev, false);
        normalize(&mut x, &mean, &sdev, false);
        assert_eq!(x.as_slice(), &[0.0, 0.0, 0.0]);
    }
}
