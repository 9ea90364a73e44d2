//! Accuracy numerators and sequence edit distance
//!
//! Each accuracy function returns a value between 0 and the number of
//! samples; the training loop accumulates these across batches and divides
//! by the total sample count at the end of an epoch.

use crate::matrix::MatrixView;

/// R-squared factor numerator for regression accuracy.
///
/// Returns a value between 0 and `m`, where `m` indicates a perfect fit.
pub fn r2_sum(yp: MatrixView, yt: MatrixView, m: usize) -> f32 {
    assert_eq!(yp.cols(), yt.cols(), "r2_sum dimension mismatch");
    assert!(m <= yp.rows() && m <= yt.rows(), "r2_sum row count mismatch");
    let n = yt.cols();
    let mut yt_mean = 0.0;
    for i in 0..m {
        for &t in yt.row(i) {
            yt_mean += t;
        }
    }
    yt_mean /= (m * n) as f32;

    let mut yp_dist = 0.0;
    let mut yt_dist = 0.0;
    for i in 0..m {
        for (&p, &t) in yp.row(i).iter().zip(yt.row(i).iter()) {
            yp_dist += (t - p) * (t - p);
            yt_dist += (t - yt_mean) * (t - yt_mean);
        }
    }
    m as f32 * (1.0 - yp_dist / yt_dist)
}

/// Count of rows whose arg-max prediction matches the one-hot label.
///
/// Assumes each row of `yt` has exactly one element set to 1.
pub fn match_sum(yp: MatrixView, yt: MatrixView, m: usize) -> f32 {
    assert_eq!(yp.cols(), yt.cols(), "match_sum dimension mismatch");
    assert!(
        m <= yp.rows() && m <= yt.rows(),
        "match_sum row count mismatch"
    );
    let k = yp.cols();
    let mut match_cnt = 0;
    for i in 0..m {
        let label = yt.row(i).iter().position(|&v| v != 0.0).unwrap_or(k);
        let mut pred = 0;
        for j in 1..k {
            if yp.at(i, j) > yp.at(i, pred) {
                pred = j;
            }
        }
        if label == pred {
            match_cnt += 1;
        }
    }
    match_cnt as f32
}

/// Levenshtein distance between two label sequences.
///
/// Minimum number of single-token insertions, deletions, or substitutions
/// required to change one sequence into the other.
pub fn edit_distance(p: &[usize], t: &[usize]) -> usize {
    let n = p.len();
    let m = t.len();
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }
    let mut v0: Vec<usize> = (0..=n).collect();
    let mut v1 = vec![0usize; n + 1];

    for (i, &ti) in t.iter().enumerate() {
        v1[0] = i + 1;
        for (j, &pj) in p.iter().enumerate() {
            let del = v0[j + 1] + 1;
            let ins = v1[j] + 1;
            let sub = if pj == ti { v0[j] } else { v0[j] + 1 };
            v1[j + 1] = del.min(ins).min(sub);
        }
        std::mem::swap(&mut v0, &mut v1);
    }
    v0[n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    #[test]
    fn test_r2_perfect_fit() {
        let yt = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]);
        let r2 = r2_sum(yt.view(), yt.view(), 3);
        assert!((r2 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_r2_mean_prediction_is_zero() {
        // Predicting the mean everywhere gives an R-squared of zero
        let yp = Matrix::from_vec(3, 1, vec![2.0, 2.0, 2.0]);
        let yt = Matrix::from_vec(3, 1, vec![1.0, 2.0, 3.0]);
        let r2 = r2_sum(yp.view(), yt.view(), 3);
        assert!(r2.abs() < 1e-5);
    }

    #[test]
    fn test_match_sum_counts_argmax_hits() {
        let yp = Matrix::from_vec(3, 2, vec![0.9, 0.1, 0.2, 0.8, 0.6, 0.4]);
        let yt = Matrix::from_vec(3, 2, vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(match_sum(yp.view(), yt.view(), 3), 2.0);
    }

    #[test]
    fn test_edit_distance_identical() {
        assert_eq!(edit_distance(&[1, 2, 3], &[1, 2, 3]), 0);
    }

    #[test]
    fn test_edit_distance_empty() {
        assert_eq!(edit_distance(&[], &[1, 2]), 2);
        assert_eq!(edit_distance(&[1, 2, 3], &[]), 3);
    }

    #[test]
    fn test_edit_distance_substitution() {
        assert_eq!(edit_distance(&[1, 2, 3], &[1, 9, 3]), 1);
    }

    #[test]
    fn test_edit_distance_mixed_edits() {
        // kitten -> sitting, the classic three-edit case
        let kitten = [10, 8, 19, 19, 4, 13];
        let sitting = [18, 8, 19, 19, 8, 13, 6];
        assert_eq!(edit_distance(&kitten, &sitting), 3);
    }
}
