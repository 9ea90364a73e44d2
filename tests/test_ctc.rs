// CTC loss against hand-computed path sums, plus gradient and accuracy
// properties on small cases.

use approx::assert_relative_eq;
use seqnet::ctc::Ctc;
use seqnet::matrix::Matrix;

fn one_hot(rows: &[usize], l: usize) -> Matrix {
    let mut m = Matrix::zeros(rows.len(), l);
    for (i, &r) in rows.iter().enumerate() {
        m[(i, r)] = 1.0;
    }
    m
}

#[test]
fn test_two_step_loss_matches_path_sum() {
    // T=2, blank=0, label sequence "1". The admissible alignments are
    // (blank,1), (1,blank), (1,1), so
    // P = yp[0][0]*yp[1][1] + yp[0][1]*yp[1][0] + yp[0][1]*yp[1][1]
    // and the per-timestep log-probability equals ln P at every t.
    let mut ctc = Ctc::new(2, 2, 0);
    let yp = Matrix::from_vec(2, 2, vec![0.6, 0.4, 0.3, 0.7]);
    let yt = one_hot(&[1, 0], 2);
    let loss = ctc.loss(yp.view(), yt.view(), 2);
    let p = 0.6 * 0.7 + 0.4 * 0.3 + 0.4 * 0.7;
    assert_relative_eq!(loss, -(p as f32).ln(), epsilon = 1e-5);
}

#[test]
fn test_duplicated_label_padding_matches_blank_padding() {
    // "1 1" and "1 blank" both collapse to the label sequence "1", so the
    // loss must agree
    let yp = Matrix::from_vec(2, 2, vec![0.6, 0.4, 0.3, 0.7]);
    let mut a = Ctc::new(2, 2, 0);
    let la = a.loss(yp.view(), one_hot(&[1, 1], 2).view(), 2);
    let mut b = Ctc::new(2, 2, 0);
    let lb = b.loss(yp.view(), one_hot(&[1, 0], 2).view(), 2);
    assert_relative_eq!(la, lb, epsilon = 1e-6);
}

#[test]
fn test_trivial_single_step_case() {
    // T=1, one real class, blank at 0, prediction all but certain:
    // loss ~ 0 and the gradient at the predicted class ~ 0
    let mut ctc = Ctc::new(1, 2, 0);
    let yp = Matrix::from_vec(1, 2, vec![1e-7, 1.0 - 1e-7]);
    let yt = one_hot(&[1], 2);
    let loss = ctc.loss(yp.view(), yt.view(), 1);
    assert!(loss.abs() < 1e-4);
    let mut dy = Matrix::zeros(1, 2);
    ctc.grad(&mut dy);
    assert!(dy[(0, 1)].abs() < 1e-4);
}

#[test]
fn test_zero_length_sequence_yields_infinity() {
    let mut ctc = Ctc::new(4, 3, 0);
    let yp = Matrix::zeros(4, 3);
    let yt = Matrix::zeros(4, 3);
    let loss = ctc.loss(yp.view(), yt.view(), 0);
    assert!(loss.is_infinite() && loss > 0.0);
}

#[test]
fn test_gradient_matches_softmax_form() {
    // dy[t][l] = yp[t][l] - posterior[t][l]; with rows that sum to one
    // each gradient row sums to zero and every posterior lies in [0, 1]
    let mut ctc = Ctc::new(3, 3, 0);
    let yp = Matrix::from_vec(
        3,
        3,
        vec![0.5, 0.3, 0.2, 0.25, 0.5, 0.25, 0.2, 0.3, 0.5],
    );
    let yt = one_hot(&[1, 2, 0], 3);
    let loss = ctc.loss(yp.view(), yt.view(), 3);
    assert!(loss.is_finite());
    let mut dy = Matrix::zeros(3, 3);
    ctc.grad(&mut dy);
    for t in 0..3 {
        let row_sum: f32 = dy.row(t).iter().sum();
        assert!(row_sum.abs() < 1e-5);
        for l in 0..3 {
            let posterior = yp[(t, l)] - dy[(t, l)];
            assert!(
                (-1e-5..=1.0 + 1e-5).contains(&posterior),
                "posterior {} out of range",
                posterior
            );
        }
    }
}

#[test]
fn test_accuracy_reflects_edit_distance() {
    // Predicted "1 2", true "1 3": distance 1 over max length 2
    let mut ctc = Ctc::new(4, 4, 0);
    let yp = Matrix::from_vec(
        4,
        4,
        vec![
            0.1, 0.7, 0.1, 0.1, //
            0.7, 0.1, 0.1, 0.1, //
            0.1, 0.1, 0.7, 0.1, //
            0.7, 0.1, 0.1, 0.1,
        ],
    );
    let yt = one_hot(&[1, 0, 3, 0], 4);
    ctc.loss(yp.view(), yt.view(), 4);
    assert_eq!(ctc.predicted_labels(), &[1, 2]);
    assert_eq!(ctc.true_labels(), &[1, 3]);
    assert_relative_eq!(ctc.accuracy(), 4.0 * 0.5, epsilon = 1e-6);
}

#[test]
fn test_loss_rewards_confident_correct_alignment() {
    let yt = one_hot(&[1, 0, 2, 0], 3);
    let confident = Matrix::from_vec(
        4,
        3,
        vec![
            0.05, 0.9, 0.05, //
            0.9, 0.05, 0.05, //
            0.05, 0.05, 0.9, //
            0.9, 0.05, 0.05,
        ],
    );
    let uniform = Matrix::from_vec(4, 3, vec![1.0 / 3.0; 12]);
    let mut ctc = Ctc::new(4, 3, 0);
    let good = ctc.loss(confident.view(), yt.view(), 4);
    let bad = ctc.loss(uniform.view(), yt.view(), 4);
    assert!(good < bad, "confident {} not below uniform {}", good, bad);
}

#[test]
fn test_short_batch_timesteps() {
    // The engine is created for the full batch size but fed fewer rows
    // when the final batch is short
    let mut ctc = Ctc::new(8, 3, 0);
    let yp = Matrix::from_vec(3, 3, vec![0.2, 0.6, 0.2, 0.6, 0.2, 0.2, 0.2, 0.2, 0.6]);
    let yt = one_hot(&[1, 0, 2], 3);
    let loss = ctc.loss(yp.view(), yt.view(), 3);
    assert!(loss.is_finite());
    let mut dy = Matrix::zeros(8, 3);
    ctc.grad(&mut dy);
    // Rows past the short batch stay zero
    for t in 3..8 {
        assert!(dy.row(t).iter().all(|&v| v == 0.0));
    }
}
