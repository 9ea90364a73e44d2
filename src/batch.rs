//! Batch iteration over training data
//!
//! Turns a flat dataset, optionally split into variable-length sequences,
//! into fixed-size batches. Three mutually exclusive modes are chosen at
//! construction:
//!
//! - sequence-grouped: sequences are shuffled as whole units and a batch
//!   never spans a sequence boundary;
//! - flat-shuffled: a single pool of row indices is shuffled;
//! - flat-sequential: rows come back in their original order.
//!
//! Shuffling runs three full Fisher-Yates passes for extra mixing. A short
//! final batch is padded to the batch size (1.0 for input rows, which
//! covers an implied bias column, 0.0 for label rows) and the true count
//! is returned; `0` signals exhaustion.

use crate::matrix::{Matrix, MatrixView};
use crate::utils::SimpleRng;

const SHUFFLE_PASSES: usize = 3;

/// Batch iterator over one dataset.
pub struct BatchIter<'a> {
    x: MatrixView<'a>,
    y: Option<MatrixView<'a>>,
    batch_size: usize,
    add_bias: bool,
    shuffle: bool,
    /// Sequence-grouped mode: (start, len) per sequence, shuffled as units
    seqs: Option<Vec<(usize, usize)>>,
    /// Flat-shuffled mode: row-index permutation
    order: Option<Vec<usize>>,
    cur_seq: usize,
    cur_vec: usize,
}

impl<'a> BatchIter<'a> {
    /// Create an iterator over `x` (and optionally labels `y`).
    ///
    /// `seq_lens` with two or more entries selects sequence-grouped mode;
    /// otherwise `shuffle` selects flat-shuffled over flat-sequential.
    /// When `add_bias` is set, every emitted input row gets a trailing
    /// 1.0 bias column appended.
    ///
    /// # Panics
    ///
    /// Panics if the sequence lengths do not sum to the number of rows of
    /// `x`, or if `y` has a different row count than `x`.
    pub fn new(
        x: MatrixView<'a>,
        y: Option<MatrixView<'a>>,
        batch_size: usize,
        seq_lens: Option<&[usize]>,
        shuffle: bool,
        add_bias: bool,
    ) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        if let Some(y) = y {
            assert_eq!(y.rows(), x.rows(), "label row count mismatch");
        }
        let mut seqs = None;
        let mut order = None;
        match seq_lens {
            Some(lens) if lens.len() > 1 => {
                let total: usize = lens.iter().sum();
                assert_eq!(total, x.rows(), "sequence lengths do not sum to rows");
                let mut pairs = Vec::with_capacity(lens.len());
                let mut start = 0;
                for &len in lens {
                    pairs.push((start, len));
                    start += len;
                }
                seqs = Some(pairs);
            }
            _ => {
                if shuffle {
                    order = Some((0..x.rows()).collect());
                }
            }
        }
        Self {
            x,
            y,
            batch_size,
            add_bias,
            shuffle,
            seqs,
            order,
            cur_seq: 0,
            cur_vec: 0,
        }
    }

    /// Number of rows in the underlying dataset.
    pub fn total_rows(&self) -> usize {
        self.x.rows()
    }

    /// Rewind to the start of the data and reshuffle when enabled.
    ///
    /// Always resets the cursor, so an unshuffled iterator uses this to
    /// start a new pass.
    pub fn reshuffle(&mut self, rng: &mut SimpleRng) {
        self.cur_seq = 0;
        self.cur_vec = 0;
        if !self.shuffle {
            return;
        }
        if let Some(seqs) = self.seqs.as_mut() {
            for _ in 0..SHUFFLE_PASSES {
                rng.shuffle(seqs);
            }
        } else if let Some(order) = self.order.as_mut() {
            for _ in 0..SHUFFLE_PASSES {
                rng.shuffle(order);
            }
        }
    }

    /// Copy the next batch into the caller's buffers.
    ///
    /// Returns the number of real samples copied; short batches are padded
    /// to the batch size and `0` means the data is exhausted. `y_out` rows
    /// are filled only when labels were supplied at construction.
    pub fn next_batch(&mut self, x_out: &mut Matrix, mut y_out: Option<&mut Matrix>) -> usize {
        let b = self.batch_size;
        let d = self.x.cols();
        let db = d + usize::from(self.add_bias);
        assert_eq!(x_out.rows(), b, "batch buffer row mismatch");
        assert_eq!(x_out.cols(), db, "batch buffer column mismatch");
        if let (Some(y), Some(y_out)) = (self.y.as_ref(), y_out.as_deref_mut()) {
            assert_eq!(y_out.rows(), b, "label buffer row mismatch");
            assert_eq!(y_out.cols(), y.cols(), "label buffer column mismatch");
        }

        let mut picked: Vec<usize> = Vec::with_capacity(b);
        if let Some(seqs) = self.seqs.as_ref() {
            if self.cur_seq < seqs.len() {
                let (start, len) = seqs[self.cur_seq];
                while picked.len() < b && self.cur_vec < len {
                    picked.push(start + self.cur_vec);
                    self.cur_vec += 1;
                }
                if self.cur_vec >= len {
                    self.cur_seq += 1;
                    self.cur_vec = 0;
                }
            }
        } else if let Some(order) = self.order.as_ref() {
            while picked.len() < b && self.cur_vec < order.len() {
                picked.push(order[self.cur_vec]);
                self.cur_vec += 1;
            }
        } else {
            while picked.len() < b && self.cur_vec < self.x.rows() {
                picked.push(self.cur_vec);
                self.cur_vec += 1;
            }
        }

        let cnt = picked.len();
        for (k, &i) in picked.iter().enumerate() {
            let dst = x_out.row_mut(k);
            dst[..d].copy_from_slice(self.x.row(i));
            if self.add_bias {
                dst[d] = 1.0;
            }
        }
        if let (Some(y), Some(y_out)) = (self.y.as_ref(), y_out.as_deref_mut()) {
            for (k, &i) in picked.iter().enumerate() {
                y_out.row_mut(k).copy_from_slice(y.row(i));
            }
        }
        if cnt < b {
            // Pad to batch size
            for k in cnt..b {
                x_out.row_mut(k).fill(1.0);
            }
            if self.y.is_some() {
                if let Some(y_out) = y_out.as_deref_mut() {
                    for k in cnt..b {
                        y_out.row_mut(k).fill(0.0);
                    }
                }
            }
        }
        cnt
    }
}
