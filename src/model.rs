//! Multi-layer model orchestrator
//!
//! A [`Model`] owns an ordered list of layers, a loss-function and
//! optimizer selection, optional per-feature input normalization, and the
//! seeded random generator every stochastic step draws from. The lifecycle
//! is: create with a declared layer count, attach layer specs one at a
//! time, compile once (resolving inter-layer dimensions and allocating the
//! gradient sets), then fit/predict repeatedly. Fitting with `final=1`
//! drops the gradient buffers and disallows further training.

use std::io::{self, Write};
use std::time::Instant;

use crate::batch::BatchIter;
use crate::config::FitOptions;
use crate::ctc::Ctc;
use crate::layers::{Layer, LayerGrads, LayerSpec};
use crate::loss::{self, Loss};
use crate::matrix::{Matrix, MatrixView};
use crate::metrics;
use crate::normalize::{compute_mean_sdev, normalize};
use crate::optimizers::OptimizerKind;
use crate::utils::SimpleRng;

/// Per-epoch training history returned by [`Model::fit`].
///
/// `v_losses`/`v_accuracies` are empty when no validation data was given.
/// For regression the accuracy is the R-squared coefficient; for
/// classification the fraction of matching labels; for CTC the
/// edit-distance based sequence accuracy.
#[derive(Debug, Clone, Default)]
pub struct FitReport {
    pub losses: Vec<f32>,
    pub accuracies: Vec<f32>,
    pub v_losses: Vec<f32>,
    pub v_accuracies: Vec<f32>,
}

/// Validation inputs for [`Model::fit`], evaluated forward-only at the end
/// of each epoch.
#[derive(Clone, Copy)]
pub struct ValidationData<'a> {
    pub x: MatrixView<'a>,
    pub y: MatrixView<'a>,
    pub seq_lens: Option<&'a [usize]>,
}

/// Multi-layer neural network model.
pub struct Model {
    num_layers: usize,
    batch_size: usize,
    input_dim: usize,
    add_bias: bool,
    normalize: bool,
    specs: Vec<LayerSpec>,
    layers: Vec<Layer>,
    grads: Vec<LayerGrads>,
    loss: Option<Loss>,
    optimizer: Option<OptimizerKind>,
    output_dim: usize,
    ctc: Option<Ctc>,
    /// Update counter consumed by the AdamW bias correction
    update_count: usize,
    mean: Vec<f32>,
    sdev: Vec<f32>,
    finalized: bool,
    rng: SimpleRng,
}

impl Model {
    /// Create a model container.
    ///
    /// `num_layers` declares how many layers will be attached with
    /// [`add`](Model::add). If `add_bias` is set, a bias column holding
    /// 1.0 is appended to every input row internally; otherwise
    /// `input_dim` already includes the bias dimension. If `normalize` is
    /// set, input features are normalized to zero mean and unit standard
    /// deviation using statistics gathered from the training data.
    ///
    /// The output dimension is determined by the size of the last layer.
    pub fn new(
        num_layers: usize,
        batch_size: usize,
        input_dim: usize,
        add_bias: bool,
        normalize: bool,
    ) -> Self {
        assert!(num_layers >= 1, "model needs at least one layer");
        assert!(batch_size > 0, "batch size must be positive");
        assert!(input_dim > 0, "input dimension must be positive");
        Self {
            num_layers,
            batch_size,
            input_dim,
            add_bias,
            normalize,
            specs: Vec::with_capacity(num_layers),
            layers: Vec::new(),
            grads: Vec::new(),
            loss: None,
            optimizer: None,
            output_dim: 0,
            ctc: None,
            update_count: 0,
            mean: Vec::new(),
            sdev: Vec::new(),
            finalized: false,
            rng: SimpleRng::new(0),
        }
    }

    /// Reseed the model's random generator.
    ///
    /// Seeding before `compile` makes weight initialization, shuffling,
    /// and therefore entire runs reproducible.
    pub fn reseed(&mut self, seed: u64) {
        self.rng.reseed(seed);
    }

    /// Attach the next layer.
    ///
    /// # Panics
    ///
    /// Panics when all declared layers have already been added or the
    /// model is already compiled.
    pub fn add(&mut self, spec: LayerSpec) {
        assert!(self.layers.is_empty(), "model already compiled");
        assert!(
            self.specs.len() < self.num_layers,
            "all layers already added"
        );
        self.specs.push(spec);
    }

    /// Prepare the model for training.
    ///
    /// Resolves each layer's input dimension from the previous layer's
    /// output size, initializes the weights, allocates one gradient set
    /// per layer (one matrix per parameter for SGD, three for AdamW), and
    /// creates the CTC context when the loss is CTC.
    ///
    /// # Panics
    ///
    /// Panics when the attached layer count does not match the declared
    /// count or the model is already compiled.
    pub fn compile(&mut self, loss: Loss, optimizer: OptimizerKind) {
        assert!(self.layers.is_empty(), "model already compiled");
        assert_eq!(
            self.specs.len(),
            self.num_layers,
            "model has {} of {} declared layers",
            self.specs.len(),
            self.num_layers
        );
        if matches!(self.specs[0], LayerSpec::Embedding { .. }) {
            assert!(
                !self.add_bias && !self.normalize,
                "embedding input takes token indices; bias and normalization do not apply"
            );
        }

        let mut d = self.input_dim + usize::from(self.add_bias);
        for spec in &self.specs {
            let layer = spec.build(d, self.batch_size, &mut self.rng);
            d = layer.output_size();
            self.layers.push(layer);
        }
        self.output_dim = d;

        for layer in &self.layers {
            self.grads.push(LayerGrads::for_layer(layer, optimizer));
        }
        if loss == Loss::Ctc {
            self.ctc = Some(Ctc::new(self.batch_size, self.output_dim, 0));
        }
        if self.normalize {
            let dx = if self.add_bias {
                self.input_dim
            } else {
                self.input_dim - 1
            };
            self.mean = vec![0.0; dx];
            self.sdev = vec![0.0; dx];
        }
        self.loss = Some(loss);
        self.optimizer = Some(optimizer);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Columns expected of the raw input data (before the bias column).
    fn input_cols(&self) -> usize {
        match self.layers.first() {
            Some(Layer::Embedding(e)) => e.input_size(),
            _ => self.input_dim,
        }
    }

    /// Change the batch size of a compiled, possibly trained, model.
    ///
    /// Every layer's per-batch buffers are reallocated; weights are
    /// untouched. The CTC context is rebuilt for the new size.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        assert!(batch_size > 0, "batch size must be positive");
        assert!(!self.layers.is_empty(), "model not compiled");
        if batch_size == self.batch_size {
            return;
        }
        self.batch_size = batch_size;
        for layer in self.layers.iter_mut() {
            layer.set_batch_size(batch_size);
        }
        if self.ctc.is_some() {
            self.ctc = Some(Ctc::new(batch_size, self.output_dim, 0));
        }
    }

    /// Change the loss function of a compiled, possibly trained, model.
    ///
    /// Only switching from cross-entropy to CTC is supported, used to
    /// continue a pre-trained classifier with alignment training. Returns
    /// whether the change was applied.
    pub fn set_loss_function(&mut self, loss: Loss) -> bool {
        assert!(!self.layers.is_empty(), "model not compiled");
        if self.loss == Some(Loss::CrossEntropy) && loss == Loss::Ctc {
            self.ctc = Some(Ctc::new(self.batch_size, self.output_dim, 0));
            self.loss = Some(Loss::Ctc);
            return true;
        }
        false
    }

    /// Clear every layer's carried recurrent state.
    pub fn reset_state(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.reset_state();
        }
    }

    /// Train the model.
    ///
    /// `x`/`y` hold one sample per row; `seq_lens` splits the rows into
    /// variable-length sequences (shuffled as whole units), or `None` for
    /// flat data. `validation` adds a forward-only evaluation pass at the
    /// end of each epoch. `kwargs` is a `key=value` string with the
    /// optional keys `shuffle`, `final`, `verbose`, and `schedule` (see
    /// [`FitOptions`]).
    ///
    /// May be called repeatedly to continue training a fitted model.
    ///
    /// # Panics
    ///
    /// Panics when the model is not compiled, was finalized by an earlier
    /// fit, the buffer shapes do not line up, or `kwargs` is malformed.
    #[allow(clippy::too_many_arguments)]
    pub fn fit(
        &mut self,
        x: MatrixView,
        y: MatrixView,
        seq_lens: Option<&[usize]>,
        validation: Option<ValidationData>,
        num_epochs: usize,
        learning_rate: f32,
        weight_decay: f32,
        kwargs: &str,
    ) -> FitReport {
        assert!(!self.layers.is_empty(), "model not compiled");
        assert!(!self.finalized, "model is finalized; cannot be trained");
        let opts = FitOptions::parse(kwargs).unwrap_or_else(|e| panic!("model fit: {}", e));
        let loss_kind = self.loss.unwrap();
        let optimizer = self.optimizer.unwrap();
        let l = self.layers.len();
        let n = self.output_dim;
        let b = self.batch_size;
        let in_cols = self.input_cols();
        assert_eq!(x.cols(), in_cols, "input dimension mismatch");
        assert_eq!(y.cols(), n, "label dimension mismatch");
        assert_eq!(x.rows(), y.rows(), "input/label row count mismatch");

        if self.normalize {
            compute_mean_sdev(x, x.rows(), &mut self.mean, &mut self.sdev, !self.add_bias);
        }

        let mut train = BatchIter::new(x, Some(y), b, seq_lens, opts.shuffle, self.add_bias);
        let mut val = validation.map(|v| {
            assert_eq!(v.x.cols(), in_cols, "validation input dimension mismatch");
            assert_eq!(v.y.cols(), n, "validation label dimension mismatch");
            BatchIter::new(v.x, Some(v.y), b, v.seq_lens, false, self.add_bias)
        });
        let train_total = train.total_rows();

        // Batch buffers and per-layer input gradients
        let mut xb = Matrix::zeros(b, in_cols + usize::from(self.add_bias));
        let mut yt = Matrix::zeros(b, n);
        let mut dy: Vec<Matrix> = self
            .layers
            .iter()
            .map(|layer| Matrix::zeros(b, layer.output_size()))
            .collect();

        let mut report = FitReport::default();
        let start = Instant::now();
        if opts.verbose > 0 {
            println!();
        }

        for epoch in 0..num_epochs {
            let (lr, wd) = match &opts.schedule {
                Some(sch) => sch.params_for_epoch(epoch, learning_rate, weight_decay),
                None => (learning_rate, weight_decay),
            };

            let mut loss_sum = 0.0;
            let mut match_sum = 0.0;
            let mut sample_cnt = 0usize;

            train.reshuffle(&mut self.rng);
            self.reset_state();
            loop {
                let cnt = train.next_batch(&mut xb, Some(&mut yt));
                if cnt == 0 {
                    break;
                }
                if self.normalize {
                    normalize(&mut xb, &self.mean, &self.sdev, true);
                }
                forward_layers(&mut self.layers, xb.view());
                sample_cnt += cnt;

                // Only the real samples of a short batch contribute to the
                // loss and gradients; padded rows get zero gradient
                let yp = self.layers[l - 1].output();
                match loss_kind {
                    Loss::MeanSquareError => {
                        loss_sum += loss::mean_square_error(yp, yt.view(), cnt);
                        match_sum += metrics::r2_sum(yp, yt.view(), cnt);
                        loss::d_mean_square_error(yp, yt.view(), &mut dy[l - 1], cnt);
                    }
                    Loss::CrossEntropy => {
                        loss_sum += loss::cross_entropy_loss(yp, yt.view(), cnt);
                        match_sum += metrics::match_sum(yp, yt.view(), cnt);
                        loss::d_cross_entropy_loss(yp, yt.view(), &mut dy[l - 1], cnt);
                    }
                    Loss::Ctc => {
                        let ctc = self.ctc.as_mut().unwrap();
                        loss_sum += ctc.loss(yp, yt.view(), cnt);
                        match_sum += ctc.accuracy();
                        ctc.grad(&mut dy[l - 1]);
                    }
                }
                backward_layers(&mut self.layers, &mut self.grads, xb.view(), &mut dy);

                if opts.verbose > 0 {
                    print_status(
                        epoch + 1,
                        num_epochs,
                        progress_pct(sample_cnt, b, train_total),
                        start.elapsed().as_secs_f32(),
                        loss_sum / sample_cnt as f32,
                        match_sum / sample_cnt as f32,
                        None,
                        None,
                    );
                }

                self.update_count += 1;
                for (layer, grads) in self.layers.iter_mut().zip(self.grads.iter_mut()) {
                    layer.apply_update(grads, optimizer, lr, wd, self.update_count);
                }
                if cnt < b {
                    // A short batch marks the end of a sequence
                    self.reset_state();
                }
            }
            let epoch_loss = loss_sum / sample_cnt as f32;
            let epoch_acc = match_sum / sample_cnt as f32;
            report.losses.push(epoch_loss);
            report.accuracies.push(epoch_acc);
            if opts.verbose > 0 {
                print_status(
                    epoch + 1,
                    num_epochs,
                    None,
                    start.elapsed().as_secs_f32(),
                    epoch_loss,
                    epoch_acc,
                    None,
                    None,
                );
            }

            if let Some(val_iter) = val.as_mut() {
                let mut v_loss_sum = 0.0;
                let mut v_match_sum = 0.0;
                let mut v_sample_cnt = 0usize;

                val_iter.reshuffle(&mut self.rng); // rewinds; validation data is never shuffled
                self.reset_state();
                loop {
                    let cnt = val_iter.next_batch(&mut xb, Some(&mut yt));
                    if cnt == 0 {
                        break;
                    }
                    if self.normalize {
                        normalize(&mut xb, &self.mean, &self.sdev, true);
                    }
                    forward_layers(&mut self.layers, xb.view());
                    v_sample_cnt += cnt;

                    let yp = self.layers[l - 1].output();
                    match loss_kind {
                        Loss::MeanSquareError => {
                            v_loss_sum += loss::mean_square_error(yp, yt.view(), cnt);
                            v_match_sum += metrics::r2_sum(yp, yt.view(), cnt);
                        }
                        Loss::CrossEntropy => {
                            v_loss_sum += loss::cross_entropy_loss(yp, yt.view(), cnt);
                            v_match_sum += metrics::match_sum(yp, yt.view(), cnt);
                        }
                        Loss::Ctc => {
                            let ctc = self.ctc.as_mut().unwrap();
                            v_loss_sum += ctc.loss(yp, yt.view(), cnt);
                            v_match_sum += ctc.accuracy();
                        }
                    }
                    self.reset_state();
                }
                let v_loss = v_loss_sum / v_sample_cnt as f32;
                let v_acc = v_match_sum / v_sample_cnt as f32;
                report.v_losses.push(v_loss);
                report.v_accuracies.push(v_acc);
                if opts.verbose > 0 {
                    print_status(
                        epoch + 1,
                        num_epochs,
                        None,
                        start.elapsed().as_secs_f32(),
                        epoch_loss,
                        epoch_acc,
                        Some(v_loss),
                        Some(v_acc),
                    );
                }
            }
            if opts.verbose > 1 {
                println!();
            }
        }

        if opts.finalize {
            self.grads.clear();
            self.finalized = true;
        }
        if opts.verbose > 0 {
            println!();
        }
        report
    }

    /// Predict outputs for the samples in `x`, writing them to `y_out`.
    ///
    /// Runs the forward pass only, in batches, with no shuffling. Only the
    /// first `x.rows()` rows of `y_out` are written.
    pub fn predict(&mut self, x: MatrixView, y_out: &mut Matrix) {
        assert!(!self.layers.is_empty(), "model not compiled");
        let l = self.layers.len();
        let n = self.output_dim;
        let b = self.batch_size;
        let in_cols = self.input_cols();
        assert_eq!(x.cols(), in_cols, "input dimension mismatch");
        assert_eq!(y_out.cols(), n, "output dimension mismatch");
        assert!(y_out.rows() >= x.rows(), "output buffer too small");

        let mut xb = Matrix::zeros(b, in_cols + usize::from(self.add_bias));
        let mut iter = BatchIter::new(x, None, b, None, false, self.add_bias);
        self.reset_state();
        let mut written = 0;
        loop {
            let cnt = iter.next_batch(&mut xb, None);
            if cnt == 0 {
                break;
            }
            if self.normalize {
                normalize(&mut xb, &self.mean, &self.sdev, true);
            }
            forward_layers(&mut self.layers, xb.view());
            let yp = self.layers[l - 1].output();
            for k in 0..cnt {
                y_out.row_mut(written + k).copy_from_slice(yp.row(k));
            }
            written += cnt;
        }
    }
}

/// Run the forward pass layer by layer.
///
/// Each layer reads the previous layer's output buffer directly; nothing
/// is copied between layers.
fn forward_layers(layers: &mut [Layer], x: MatrixView) {
    for j in 0..layers.len() {
        let (head, tail) = layers.split_at_mut(j);
        let input = if j == 0 { x } else { head[j - 1].output() };
        tail[0].forward(input);
    }
}

/// Run the backward pass in reverse layer order.
///
/// Each layer receives the following layer's input gradient as its output
/// gradient; the first layer does not propagate an input gradient.
fn backward_layers(
    layers: &mut [Layer],
    grads: &mut [LayerGrads],
    x: MatrixView,
    dy: &mut [Matrix],
) {
    let l = layers.len();
    for j in (1..l).rev() {
        let (head, tail) = layers.split_at_mut(j);
        let input = head[j - 1].output();
        let (dy_head, dy_tail) = dy.split_at_mut(j);
        tail[0].backward(
            dy_tail[0].view(),
            input,
            &mut grads[j],
            Some(&mut dy_head[j - 1]),
        );
    }
    layers[0].backward(dy[0].view(), x, &mut grads[0], None);
}

fn progress_pct(sample_cnt: usize, batch_size: usize, total: usize) -> Option<u32> {
    if batch_size < total {
        Some((sample_cnt * 100 / total) as u32)
    } else {
        None
    }
}

/// Print a carriage-return progress line with the epoch's running numbers.
#[allow(clippy::too_many_arguments)]
fn print_status(
    epoch: usize,
    num_epochs: usize,
    progress: Option<u32>,
    elapsed: f32,
    loss: f32,
    acc: f32,
    v_loss: Option<f32>,
    v_acc: Option<f32>,
) {
    let mut line = format!(
        "Epoch {}/{} Tr loss {:.5} acc {:.4} ",
        epoch, num_epochs, loss, acc
    );
    if let (Some(vl), Some(va)) = (v_loss, v_acc) {
        line.push_str(&format!("Vd loss {:.5} acc {:.4} ", vl, va));
    }
    if let Some(pct) = progress {
        if pct < 100 {
            line.push_str(&format!("{:3}% ", pct));
        }
    }
    if elapsed >= 1.0 {
        line.push_str(&format!("{:.0} seconds", elapsed));
    }
    print!("\r{:<76}", line);
    io::stdout().flush().ok();
}
