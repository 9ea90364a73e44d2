//! LSTM (recurrent) layer
//!
//! A gated recurrent layer with per-gate input kernels `W*` and recurrence
//! matrices `U*`. The candidate, cell, and hidden buffers keep one extra
//! leading row holding the state at time t−1, so timestep t lives at row
//! t+1. When the layer is stateful, the last timestep's hidden and cell
//! rows carry over into the first timestep of the next batch through the
//! `ph`/`pc` vectors; backpropagation through time is truncated at the
//! batch boundary either way.
//!
//! References:
//! - <https://en.wikipedia.org/wiki/Long_short-term_memory>
//! - <https://www.bioinf.jku.at/publications/older/2604.pdf>

use crate::matrix::{self, Matrix, MatrixView};
use crate::optimizers::ParamState;
use crate::utils::activations::{d_tanh, d_tanh_at};
use crate::utils::{Activation, SimpleRng};

/// Named gradient set for the eight LSTM parameter matrices.
pub struct LstmGrads {
    pub wf: ParamState,
    pub wi: ParamState,
    pub wc: ParamState,
    pub wo: ParamState,
    pub uf: ParamState,
    pub ui: ParamState,
    pub uc: ParamState,
    pub uo: ParamState,
}

/// LSTM layer.
pub struct Lstm {
    input_dim: usize,
    units: usize,
    batch_size: usize,
    activation: Activation,
    stateful: bool,
    /// Input kernels [D][S]
    wf: Matrix,
    wi: Matrix,
    wc: Matrix,
    wo: Matrix,
    /// Recurrence matrices [S][S]
    uf: Matrix,
    ui: Matrix,
    uc: Matrix,
    uo: Matrix,
    /// Gate buffers [B][S]
    f: Matrix,
    i: Matrix,
    o: Matrix,
    /// Candidate, cell, and hidden buffers [(B+1)][S]; row 0 is time t-1
    cc: Matrix,
    c: Matrix,
    h: Matrix,
    /// Carry vectors: last timestep's hidden and cell state [S]
    ph: Vec<f32>,
    pc: Vec<f32>,
}

impl Lstm {
    /// Create an LSTM layer.
    ///
    /// Input kernels use Glorot-normal initialization; recurrence matrices
    /// use a uniform draw scaled by `sqrt(6 / 2S)`. `input_dim` must
    /// include the bias dimension when one is in use.
    pub fn new(
        units: usize,
        activation: Activation,
        stateful: bool,
        input_dim: usize,
        batch_size: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(units > 0, "lstm layer needs at least one unit");
        assert!(input_dim > 0, "lstm layer input dimension must be positive");
        let kernel = |rng: &mut SimpleRng| {
            let mut w = Matrix::zeros(input_dim, units);
            let scale = (2.0 / (input_dim + units) as f32).sqrt();
            for v in w.as_mut_slice().iter_mut() {
                *v = rng.gen_normal(0.0, scale);
            }
            w
        };
        let recurrence = |rng: &mut SimpleRng| {
            let mut u = Matrix::zeros(units, units);
            let scale = (6.0 / (units * 2) as f32).sqrt();
            for v in u.as_mut_slice().iter_mut() {
                *v = rng.gen_range_f32(-scale, scale);
            }
            u
        };
        Self {
            input_dim,
            units,
            batch_size,
            activation,
            stateful,
            wf: kernel(rng),
            wi: kernel(rng),
            wc: kernel(rng),
            wo: kernel(rng),
            uf: recurrence(rng),
            ui: recurrence(rng),
            uc: recurrence(rng),
            uo: recurrence(rng),
            f: Matrix::zeros(batch_size, units),
            i: Matrix::zeros(batch_size, units),
            o: Matrix::zeros(batch_size, units),
            cc: Matrix::zeros(batch_size + 1, units),
            c: Matrix::zeros(batch_size + 1, units),
            h: Matrix::zeros(batch_size + 1, units),
            ph: vec![0.0; units],
            pc: vec![0.0; units],
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

    pub fn stateful(&self) -> bool {
        self.stateful
    }

    pub fn parameter_count(&self) -> usize {
        4 * self.input_dim * self.units + 4 * self.units * self.units
    }

    pub fn kernels(&self) -> [&Matrix; 4] {
        [&self.wf, &self.wi, &self.wc, &self.wo]
    }

    pub fn recurrences(&self) -> [&Matrix; 4] {
        [&self.uf, &self.ui, &self.uc, &self.uo]
    }

    pub fn kernels_mut(&mut self) -> [&mut Matrix; 4] {
        [&mut self.wf, &mut self.wi, &mut self.wc, &mut self.wo]
    }

    pub fn recurrences_mut(&mut self) -> [&mut Matrix; 4] {
        [&mut self.uf, &mut self.ui, &mut self.uc, &mut self.uo]
    }

    /// The hidden state carried from the last processed timestep.
    pub fn hidden_state(&self) -> &[f32] {
        &self.ph
    }

    /// The cell state carried from the last processed timestep.
    pub fn cell_state(&self) -> &[f32] {
        &self.pc
    }

    /// Clear the carried hidden and cell state.
    ///
    /// Call at sequence boundaries when the layer is stateful.
    pub fn reset_state(&mut self) {
        self.ph.fill(0.0);
        self.pc.fill(0.0);
    }

    /// Reallocate the per-batch buffers for a new batch size.
    ///
    /// Weights and the carry vectors are untouched. With an unchanged size
    /// the buffers are cleared.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        if batch_size != self.batch_size {
            self.batch_size = batch_size;
            self.f = Matrix::zeros(batch_size, self.units);
            self.i = Matrix::zeros(batch_size, self.units);
            self.o = Matrix::zeros(batch_size, self.units);
            self.cc = Matrix::zeros(batch_size + 1, self.units);
            self.c = Matrix::zeros(batch_size + 1, self.units);
            self.h = Matrix::zeros(batch_size + 1, self.units);
        } else {
            self.f.fill(0.0);
            self.i.fill(0.0);
            self.o.fill(0.0);
            self.cc.fill(0.0);
            self.c.fill(0.0);
            self.h.fill(0.0);
        }
    }

    /// Forward pass over one batch, one row per timestep.
    pub fn forward(&mut self, x: MatrixView) {
        assert_eq!(x.rows(), self.batch_size, "lstm input batch mismatch");
        assert_eq!(x.cols(), self.input_dim, "lstm input dimension mismatch");
        let b = self.batch_size;
        let s = self.units;

        self.f.fill(0.0);
        self.i.fill(0.0);
        self.o.fill(0.0);
        self.cc.fill(0.0);
        self.c.fill(0.0);
        self.h.fill(0.0);
        if self.stateful {
            self.h.row_mut(0).copy_from_slice(&self.ph);
            self.c.row_mut(0).copy_from_slice(&self.pc);
        }

        for t in 0..b {
            let xt = x.row(t);
            // f[t] = activate(x[t] @ Wf + h[t-1] @ Uf), likewise i and o
            {
                let h_prev = self.h.row(t);
                let ft = self.f.row_mut(t);
                matrix::add_row_matmul(ft, xt, self.wf.view());
                matrix::add_row_matmul(ft, h_prev, self.uf.view());
                self.activation.apply(ft, 1, s);
            }
            {
                let h_prev = self.h.row(t);
                let it = self.i.row_mut(t);
                matrix::add_row_matmul(it, xt, self.wi.view());
                matrix::add_row_matmul(it, h_prev, self.ui.view());
                self.activation.apply(it, 1, s);
            }
            {
                let h_prev = self.h.row(t);
                let ot = self.o.row_mut(t);
                matrix::add_row_matmul(ot, xt, self.wo.view());
                matrix::add_row_matmul(ot, h_prev, self.uo.view());
                self.activation.apply(ot, 1, s);
            }
            // cc[t] = tanh(x[t] @ Wc + h[t-1] @ Uc)
            {
                let h_prev = self.h.row(t);
                let cct = self.cc.row_mut(t + 1);
                matrix::add_row_matmul(cct, xt, self.wc.view());
                matrix::add_row_matmul(cct, h_prev, self.uc.view());
                for v in cct.iter_mut() {
                    *v = v.tanh();
                }
            }
            // c[t] = f[t] * c[t-1] + i[t] * cc[t]
            {
                let (c_prev, ct) = self.c.row_pair_mut(t, t + 1);
                let ft = self.f.row(t);
                let it = self.i.row(t);
                let cct = self.cc.row(t + 1);
                for j in 0..s {
                    ct[j] = ft[j] * c_prev[j] + it[j] * cct[j];
                }
            }
            // h[t] = o[t] * tanh(c[t])
            {
                let ht = self.h.row_mut(t + 1);
                let ot = self.o.row(t);
                let ct = self.c.row(t + 1);
                for j in 0..s {
                    ht[j] = ot[j] * ct[j].tanh();
                }
            }
        }
        // Save last timestep state for the next batch
        self.ph.copy_from_slice(self.h.row(b));
        self.pc.copy_from_slice(self.c.row(b));
    }

    /// The hidden-state output of the last forward pass, one row per
    /// timestep (the leading t−1 row is excluded).
    pub fn output(&self) -> MatrixView<'_> {
        self.h.rows_view(1, self.batch_size)
    }

    /// Backward pass through time over one batch.
    ///
    /// Overwrites the eight weight gradients in `g` and, when `dx` is
    /// given, the input gradient. A running hidden/cell gradient is
    /// threaded backward across timesteps; nothing crosses the batch
    /// boundary (truncated BPTT). The candidate and input-gate gradients
    /// use the candidate value cached for the same timestep.
    pub fn backward(
        &mut self,
        dy: MatrixView,
        x: MatrixView,
        g: &mut LstmGrads,
        mut dx: Option<&mut Matrix>,
    ) {
        assert_eq!(dy.rows(), self.batch_size, "lstm grad batch mismatch");
        assert_eq!(dy.cols(), self.units, "lstm grad dimension mismatch");
        assert_eq!(x.cols(), self.input_dim, "lstm input dimension mismatch");
        let b = self.batch_size;
        let s = self.units;

        g.wf.grad.fill(0.0);
        g.wi.grad.fill(0.0);
        g.wc.grad.fill(0.0);
        g.wo.grad.fill(0.0);
        g.uf.grad.fill(0.0);
        g.ui.grad.fill(0.0);
        g.uc.grad.fill(0.0);
        g.uo.grad.fill(0.0);

        // Future timestep gradients
        let mut dh_next = vec![0.0f32; s];
        let mut dc_next = vec![0.0f32; s];
        let mut dh = vec![0.0f32; s];
        let mut dc = vec![0.0f32; s];
        let mut d_o = vec![0.0f32; s];
        let mut d_cc = vec![0.0f32; s];
        let mut d_i = vec![0.0f32; s];
        let mut d_f = vec![0.0f32; s];

        for t in (0..b).rev() {
            let xt = x.row(t);
            let ft = self.f.row(t);
            let it = self.i.row(t);
            let ot = self.o.row(t);
            let cct = self.cc.row(t + 1);
            let ct = self.c.row(t + 1);
            let c_prev = self.c.row(t);
            let h_prev = self.h.row(t);

            // dh = dy[t] + dh_next
            for j in 0..s {
                dh[j] = dy.at(t, j) + dh_next[j];
            }

            // Output gate gradient
            for j in 0..s {
                d_o[j] = dh[j] * ct[j].tanh() * self.activation.derivative_at(ot[j]);
            }
            matrix::add_outer(&mut g.wo.grad, xt, &d_o);
            matrix::add_outer(&mut g.uo.grad, h_prev, &d_o);

            // Cell state gradient: dc = dh * o[t] * d_tanh(c[t]) + dc_next
            for j in 0..s {
                dc[j] = dh[j] * ot[j] * d_tanh(ct[j]) + dc_next[j];
            }

            // cc[t] is stored already activated, so the output-form tanh
            // derivative applies
            for j in 0..s {
                d_cc[j] = dc[j] * it[j] * d_tanh_at(cct[j]);
            }
            matrix::add_outer(&mut g.wc.grad, xt, &d_cc);
            matrix::add_outer(&mut g.uc.grad, h_prev, &d_cc);

            // Input gate gradient
            for j in 0..s {
                d_i[j] = dc[j] * cct[j] * self.activation.derivative_at(it[j]);
            }
            matrix::add_outer(&mut g.wi.grad, xt, &d_i);
            matrix::add_outer(&mut g.ui.grad, h_prev, &d_i);

            // Forget gate gradient
            for j in 0..s {
                d_f[j] = dc[j] * c_prev[j] * self.activation.derivative_at(ft[j]);
            }
            matrix::add_outer(&mut g.wf.grad, xt, &d_f);
            matrix::add_outer(&mut g.uf.grad, h_prev, &d_f);

            // Gradients flowing to the previous timestep
            dh_next.fill(0.0);
            matrix::add_row_matmul_t(&mut dh_next, &d_f, self.uf.view());
            matrix::add_row_matmul_t(&mut dh_next, &d_i, self.ui.view());
            matrix::add_row_matmul_t(&mut dh_next, &d_cc, self.uc.view());
            matrix::add_row_matmul_t(&mut dh_next, &d_o, self.uo.view());
            for j in 0..s {
                dc_next[j] = ft[j] * dc[j];
            }

            if let Some(dx) = dx.as_deref_mut() {
                let dxt = dx.row_mut(t);
                dxt.fill(0.0);
                matrix::add_row_matmul_t(dxt, &d_f, self.wf.view());
                matrix::add_row_matmul_t(dxt, &d_i, self.wi.view());
                matrix::add_row_matmul_t(dxt, &d_cc, self.wc.view());
                matrix::add_row_matmul_t(dxt, &d_o, self.wo.view());
            }
        }
        // Save last timestep state for the next batch
        self.ph.copy_from_slice(self.h.row(b));
        self.pc.copy_from_slice(self.c.row(b));
    }
}
