//! Layer abstractions
//!
//! Layers come in three variants: `Dense`, `Lstm`, and `Embedding`. A
//! [`LayerSpec`] holds the hyperparameters that are known before the model
//! is wired together; [`Model::compile`](crate::model::Model::compile)
//! resolves each spec's input dimension from the previous layer's output
//! size and builds the initialized [`Layer`]. An uninitialized layer is
//! therefore unrepresentable.
//!
//! [`LayerGrads`] carries the per-layer gradient set the orchestrator
//! allocates at compile time, one named [`ParamState`] per trainable
//! parameter matrix.

pub mod dense;
pub mod embedding;
pub mod lstm;

pub use dense::Dense;
pub use embedding::Embedding;
pub use lstm::{Lstm, LstmGrads};

use crate::matrix::{Matrix, MatrixView};
use crate::optimizers::{self, OptimizerKind, ParamState};
use crate::utils::{Activation, SimpleRng};

/// Hyperparameters of a layer, prior to compilation.
#[derive(Debug, Clone)]
pub enum LayerSpec {
    Dense {
        units: usize,
        activation: Activation,
    },
    Lstm {
        units: usize,
        activation: Activation,
        stateful: bool,
    },
    Embedding {
        embedding_dim: usize,
        context_len: usize,
        pad_index: Option<usize>,
    },
}

impl LayerSpec {
    pub fn dense(units: usize, activation: Activation) -> Self {
        LayerSpec::Dense { units, activation }
    }

    pub fn lstm(units: usize, activation: Activation, stateful: bool) -> Self {
        LayerSpec::Lstm {
            units,
            activation,
            stateful,
        }
    }

    pub fn embedding(embedding_dim: usize, context_len: usize, pad_index: Option<usize>) -> Self {
        LayerSpec::Embedding {
            embedding_dim,
            context_len,
            pad_index,
        }
    }

    /// Output size of the layer this spec will build.
    pub fn output_size(&self) -> usize {
        match self {
            LayerSpec::Dense { units, .. } => *units,
            LayerSpec::Lstm { units, .. } => *units,
            LayerSpec::Embedding { embedding_dim, .. } => *embedding_dim,
        }
    }

    /// Build the initialized layer.
    ///
    /// `input_dim` is the previous layer's output size (for the first
    /// layer, the model input dimension — the vocabulary size for an
    /// embedding layer). Weight initialization draws from `rng`.
    pub(crate) fn build(&self, input_dim: usize, batch_size: usize, rng: &mut SimpleRng) -> Layer {
        match *self {
            LayerSpec::Dense { units, activation } => Layer::Dense(Dense::new(
                units, activation, input_dim, batch_size, rng,
            )),
            LayerSpec::Lstm {
                units,
                activation,
                stateful,
            } => Layer::Lstm(Lstm::new(
                units, activation, stateful, input_dim, batch_size, rng,
            )),
            LayerSpec::Embedding {
                embedding_dim,
                context_len,
                pad_index,
            } => Layer::Embedding(Embedding::new(
                embedding_dim,
                context_len,
                pad_index,
                input_dim,
                batch_size,
                rng,
            )),
        }
    }
}

/// A compiled layer.
pub enum Layer {
    Dense(Dense),
    Lstm(Lstm),
    Embedding(Embedding),
}

impl Layer {
    /// Number of columns the layer reads from its input batch.
    pub fn input_size(&self) -> usize {
        match self {
            Layer::Dense(l) => l.input_size(),
            Layer::Lstm(l) => l.input_size(),
            Layer::Embedding(l) => l.input_size(),
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            Layer::Dense(l) => l.output_size(),
            Layer::Lstm(l) => l.output_size(),
            Layer::Embedding(l) => l.output_size(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            Layer::Dense(l) => l.parameter_count(),
            Layer::Lstm(l) => l.parameter_count(),
            Layer::Embedding(l) => l.parameter_count(),
        }
    }

    /// Forward pass; writes only the layer's own output buffer.
    pub fn forward(&mut self, x: MatrixView) {
        match self {
            Layer::Dense(l) => l.forward(x),
            Layer::Lstm(l) => l.forward(x),
            Layer::Embedding(l) => l.forward(x),
        }
    }

    /// The output of the last forward pass.
    pub fn output(&self) -> MatrixView<'_> {
        match self {
            Layer::Dense(l) => l.output(),
            Layer::Lstm(l) => l.output(),
            Layer::Embedding(l) => l.output(),
        }
    }

    /// Backward pass; overwrites `grads` and optionally the input gradient.
    ///
    /// # Panics
    ///
    /// Panics if `grads` was allocated for a different layer variant.
    pub fn backward(
        &mut self,
        dy: MatrixView,
        x: MatrixView,
        grads: &mut LayerGrads,
        dx: Option<&mut Matrix>,
    ) {
        match (self, grads) {
            (Layer::Dense(l), LayerGrads::Dense { wx }) => l.backward(dy, x, &mut wx.grad, dx),
            (Layer::Lstm(l), LayerGrads::Lstm(g)) => l.backward(dy, x, g, dx),
            (Layer::Embedding(l), LayerGrads::Embedding { wx }) => {
                l.backward(dy, x, &mut wx.grad, dx)
            }
            _ => panic!("layer and gradient set variants do not match"),
        }
    }

    /// Reallocate per-batch buffers for a new batch size; weights untouched.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        match self {
            Layer::Dense(l) => l.set_batch_size(batch_size),
            Layer::Lstm(l) => l.set_batch_size(batch_size),
            Layer::Embedding(l) => l.set_batch_size(batch_size),
        }
    }

    /// Clear carried recurrent state; a no-op for dense and embedding.
    pub fn reset_state(&mut self) {
        if let Layer::Lstm(l) = self {
            l.reset_state();
        }
    }

    /// Apply one optimizer step to every parameter of the layer.
    pub(crate) fn apply_update(
        &mut self,
        grads: &mut LayerGrads,
        kind: OptimizerKind,
        learning_rate: f32,
        weight_decay: f32,
        step: usize,
    ) {
        match (self, grads) {
            (Layer::Dense(l), LayerGrads::Dense { wx }) => {
                optimizers::apply_update(kind, l.weights_mut(), wx, learning_rate, weight_decay, step);
            }
            (Layer::Lstm(l), LayerGrads::Lstm(g)) => {
                let [wf, wi, wc, wo] = l.kernels_mut();
                optimizers::apply_update(kind, wf, &mut g.wf, learning_rate, weight_decay, step);
                optimizers::apply_update(kind, wi, &mut g.wi, learning_rate, weight_decay, step);
                optimizers::apply_update(kind, wc, &mut g.wc, learning_rate, weight_decay, step);
                optimizers::apply_update(kind, wo, &mut g.wo, learning_rate, weight_decay, step);
                let [uf, ui, uc, uo] = l.recurrences_mut();
                optimizers::apply_update(kind, uf, &mut g.uf, learning_rate, weight_decay, step);
                optimizers::apply_update(kind, ui, &mut g.ui, learning_rate, weight_decay, step);
                optimizers::apply_update(kind, uc, &mut g.uc, learning_rate, weight_decay, step);
                optimizers::apply_update(kind, uo, &mut g.uo, learning_rate, weight_decay, step);
            }
            (Layer::Embedding(l), LayerGrads::Embedding { wx }) => {
                optimizers::apply_update(kind, l.weights_mut(), wx, learning_rate, weight_decay, step);
            }
            _ => panic!("layer and gradient set variants do not match"),
        }
    }
}

/// Per-layer gradient set, allocated by the orchestrator at compile time.
pub enum LayerGrads {
    Dense { wx: ParamState },
    Lstm(LstmGrads),
    Embedding { wx: ParamState },
}

impl LayerGrads {
    /// Allocate the gradient set matching `layer` under `kind`.
    pub fn for_layer(layer: &Layer, kind: OptimizerKind) -> Self {
        match layer {
            Layer::Dense(l) => LayerGrads::Dense {
                wx: ParamState::new(l.input_size(), l.output_size(), kind),
            },
            Layer::Lstm(l) => {
                let d = l.input_size();
                let s = l.output_size();
                LayerGrads::Lstm(LstmGrads {
                    wf: ParamState::new(d, s, kind),
                    wi: ParamState::new(d, s, kind),
                    wc: ParamState::new(d, s, kind),
                    wo: ParamState::new(d, s, kind),
                    uf: ParamState::new(s, s, kind),
                    ui: ParamState::new(s, s, kind),
                    uc: ParamState::new(s, s, kind),
                    uo: ParamState::new(s, s, kind),
                })
            }
            Layer::Embedding(l) => LayerGrads::Embedding {
                wx: ParamState::new(l.vocab_size(), l.output_size(), kind),
            },
        }
    }
}
