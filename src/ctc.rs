//! Connectionist Temporal Classification loss
//!
//! Computes the alignment loss between a batch of per-timestep class
//! probabilities and a true label sequence, using the log-domain
//! forward-backward dynamic program over the blank-padded label sequence.
//! All probability arithmetic stays in log space to avoid underflow; the
//! tables are combined with log-sum-exp.
//!
//! References:
//! - <https://www.cs.toronto.edu/~graves/icml_2006.pdf>
//! - <https://www.cs.toronto.edu/~graves/phd.pdf>

use crate::matrix::{Matrix, MatrixView};
use crate::metrics::edit_distance;

/// CTC loss calculator.
///
/// Created once per compiled model with capacity for `timesteps` rows of
/// `num_labels` class probabilities; reused across batches. The tables are
/// derived per `loss` call and consumed by `grad` and `accuracy`.
pub struct Ctc {
    timesteps: usize,
    num_labels: usize,
    blank: usize,
    /// Predictions converted to log scale [T][L]
    log_yp: Matrix,
    /// Collapsed predicted and true label sequences
    pred: Vec<usize>,
    truth: Vec<usize>,
    /// Blank-padded true label sequence, length `padded_len`
    label: Vec<usize>,
    padded_len: usize,
    /// Forward/backward tables, stride `padded_len` per row
    alpha: Vec<f32>,
    beta: Vec<f32>,
    /// Per-timestep log-probability of the label sequence
    log_prob: Vec<f32>,
    /// Timestep count of the last `loss` call
    t_used: usize,
}

/// log(exp(a) + exp(b)) without leaving log space.
fn logsumexp(a: f32, b: f32) -> f32 {
    if a == f32::NEG_INFINITY {
        return b;
    }
    if b == f32::NEG_INFINITY {
        return a;
    }
    if a >= b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

/// Arg-max decode one row per timestep, then merge consecutive duplicates
/// and strip blanks.
fn collapse_labels(yv: MatrixView, t: usize, blank: usize, out: &mut Vec<usize>) {
    out.clear();
    for i in 0..t {
        let row = yv.row(i);
        let mut best = 0;
        for (j, &v) in row.iter().enumerate().skip(1) {
            if v > row[best] {
                best = j;
            }
        }
        out.push(best);
    }
    out.dedup();
    out.retain(|&l| l != blank);
}

impl Ctc {
    /// Create a CTC loss calculator.
    ///
    /// `timesteps` is the batch size fed per call, `num_labels` the class
    /// count including the blank, `blank` the blank's index.
    pub fn new(timesteps: usize, num_labels: usize, blank: usize) -> Self {
        assert!(blank < num_labels, "blank index out of range");
        let max_padded = 2 * timesteps + 1;
        Self {
            timesteps,
            num_labels,
            blank,
            log_yp: Matrix::zeros(timesteps, num_labels),
            pred: Vec::with_capacity(timesteps),
            truth: Vec::with_capacity(timesteps),
            label: vec![0; max_padded],
            padded_len: 0,
            alpha: vec![0.0; timesteps * max_padded],
            beta: vec![0.0; timesteps * max_padded],
            log_prob: vec![0.0; timesteps],
            t_used: 0,
        }
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Collapsed predicted label sequence of the last `loss` call.
    pub fn predicted_labels(&self) -> &[usize] {
        &self.pred
    }

    /// Collapsed true label sequence of the last `loss` call.
    pub fn true_labels(&self) -> &[usize] {
        &self.truth
    }

    /// Compute the CTC loss for `t` timesteps of predictions against
    /// one-hot labels.
    ///
    /// `yt` may pad unused timesteps with blanks or duplicate labels in
    /// place of blanks (already-aligned input); consecutive duplicates are
    /// merged either way. Returns the mean of the negated per-timestep
    /// log-probabilities, or infinity for a zero-length batch.
    pub fn loss(&mut self, yp: MatrixView, yt: MatrixView, t: usize) -> f32 {
        let l = self.num_labels;
        assert!(t <= self.timesteps, "timestep count exceeds capacity");
        assert_eq!(yp.cols(), l, "prediction dimension mismatch");
        assert_eq!(yt.cols(), l, "label dimension mismatch");
        if t == 0 {
            return f32::INFINITY;
        }

        // Keep predictions in log scale for the tables and the gradient
        for i in 0..t {
            let dst = self.log_yp.row_mut(i);
            for (d, &p) in dst.iter_mut().zip(yp.row(i).iter()) {
                *d = p.ln();
            }
        }

        collapse_labels(yp, t, self.blank, &mut self.pred);
        collapse_labels(yt, t, self.blank, &mut self.truth);

        // Padded label: blank between every pair of labels and at both ends
        let blank = self.blank;
        self.label[0] = blank;
        let mut s = 1;
        for &lab in &self.truth {
            if s + 1 >= 2 * t + 1 {
                break;
            }
            self.label[s] = lab;
            self.label[s + 1] = blank;
            s += 2;
        }
        let sl = s;
        self.padded_len = sl;
        self.t_used = t;

        let label = &self.label[..sl];
        for v in self.alpha[..t * sl].iter_mut() {
            *v = f32::NEG_INFINITY;
        }
        for v in self.beta[..t * sl].iter_mut() {
            *v = f32::NEG_INFINITY;
        }

        // Forward table
        self.alpha[0] = self.log_yp[(0, blank)];
        if sl > 1 {
            self.alpha[1] = self.log_yp[(0, label[1])];
        }
        for ti in 1..t {
            // Positions that can still be reached from the start and can
            // still reach the end; everything else stays pruned at -inf
            let start = (sl as isize - 2 * (t - ti) as isize).max(0) as usize;
            let end = (2 * (ti + 1)).min(sl);
            for si in start..end {
                let ls = label[si];
                let prev = &self.alpha[(ti - 1) * sl..ti * sl];
                let mut ats = prev[si];
                if si >= 1 {
                    ats = logsumexp(ats, prev[si - 1]);
                }
                if si >= 2 && !(ls == blank || label[si - 2] == ls) {
                    ats = logsumexp(ats, prev[si - 2]);
                }
                self.alpha[ti * sl + si] = ats + self.log_yp[(ti, ls)];
            }
        }

        // Backward table; transition probabilities are taken at t + 1
        self.beta[(t - 1) * sl + (sl - 1)] = 0.0;
        if sl > 1 {
            self.beta[(t - 1) * sl + (sl - 2)] = 0.0;
        }
        for ti in (0..t.saturating_sub(1)).rev() {
            let start = (sl as isize - 2 * (t - ti) as isize).max(0) as usize;
            let end = (2 * (ti + 1)).min(sl);
            for si in start..end {
                let next = &self.beta[(ti + 1) * sl..(ti + 2) * sl];
                let mut bts = next[si] + self.log_yp[(ti + 1, label[si])];
                if si + 1 < sl {
                    bts = logsumexp(bts, next[si + 1] + self.log_yp[(ti + 1, label[si + 1])]);
                }
                if si + 2 < sl && !(label[si] == blank || label[si + 2] == label[si]) {
                    bts = logsumexp(bts, next[si + 2] + self.log_yp[(ti + 1, label[si + 2])]);
                }
                self.beta[ti * sl + si] = bts;
            }
        }

        // Per-timestep log-probability of the observed label sequence
        for ti in 0..t {
            let mut prob = f32::NEG_INFINITY;
            for si in 0..sl {
                prob = logsumexp(prob, self.alpha[ti * sl + si] + self.beta[ti * sl + si]);
            }
            self.log_prob[ti] = prob;
        }
        let mut loss = 0.0;
        for ti in 0..t {
            loss += -self.log_prob[ti];
        }
        loss / t as f32
    }

    /// Gradient of the loss with respect to the predicted probabilities.
    ///
    /// Must follow a `loss` call, which builds the tables this consumes.
    /// Rows beyond the last call's timestep count are zeroed.
    pub fn grad(&self, dy: &mut Matrix) {
        let t = self.t_used;
        let l = self.num_labels;
        let sl = self.padded_len;
        assert!(t > 0, "grad called before loss");
        assert_eq!(dy.cols(), l, "gradient dimension mismatch");
        dy.fill(0.0);
        for ti in 0..t {
            let dyt = dy.row_mut(ti);
            for (lab, d) in dyt.iter_mut().enumerate() {
                let mut sum = f32::NEG_INFINITY;
                for si in 0..sl {
                    if self.label[si] == lab {
                        sum = logsumexp(
                            sum,
                            self.alpha[ti * sl + si] + self.beta[ti * sl + si],
                        );
                    }
                }
                *d = self.log_yp[(ti, lab)].exp() - (sum - self.log_prob[ti]).exp();
            }
        }
    }

    /// Accuracy numerator for the last `loss` call.
    ///
    /// `timesteps × (1 − editDistance / max(len))` over the collapsed
    /// predicted and true sequences; a perfect match scores the full
    /// timestep count.
    pub fn accuracy(&self) -> f32 {
        let t = self.t_used as f32;
        let fact = self.pred.len().max(self.truth.len());
        if fact == 0 {
            return t;
        }
        let dist = edit_distance(&self.pred, &self.truth) as f32;
        (1.0 - dist / fact as f32) * t
    }
}
