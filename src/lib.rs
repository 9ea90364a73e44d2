//! Sequence Neural-Network Training Engine
//!
//! A hand-written, single-threaded training engine for small sequence
//! models: dense, LSTM, and embedding layers composed into a trainable
//! pipeline, mean-square-error / cross-entropy / CTC losses, and SGD or
//! AdamW weight updates with gradient clipping.
//!
//! # Modules
//!
//! - `matrix`: row-major buffers and the numeric kernels built on them
//! - `layers`: layer specs, the layer variants, and per-layer gradients
//! - `loss`: elementwise losses and their gradients
//! - `ctc`: the CTC alignment loss (log-domain forward-backward)
//! - `optimizers`: gradient clipping, SGD, and AdamW
//! - `batch`: the three-mode batch iterator
//! - `model`: the orchestrator driving the epoch/batch training loop
//! - `config` / `architecture`: JSON run and layer-stack configuration
//! - `utils`: seeded RNG and the activation-function library
//!
//! # Example
//!
//! ```
//! use seqnet::{Activation, LayerSpec, Loss, Matrix, Model, OptimizerKind};
//!
//! let x = Matrix::from_vec(4, 2, vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
//! let y = Matrix::from_vec(4, 1, vec![0.0, 1.0, 1.0, 0.0]);
//!
//! let mut model = Model::new(2, 4, 2, true, false);
//! model.reseed(42);
//! model.add(LayerSpec::dense(8, Activation::Sigmoid));
//! model.add(LayerSpec::dense(1, Activation::Sigmoid));
//! model.compile(Loss::MeanSquareError, OptimizerKind::AdamW);
//!
//! let report = model.fit(x.view(), y.view(), None, None, 10, 0.05, 0.0, "shuffle=0");
//! assert_eq!(report.losses.len(), 10);
//! ```

pub mod architecture;
pub mod batch;
pub mod config;
pub mod ctc;
pub mod layers;
pub mod loss;
pub mod matrix;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod optimizers;
pub mod utils;

pub use batch::BatchIter;
pub use config::{FitOptions, Schedule, TrainingConfig};
pub use ctc::Ctc;
pub use layers::{Dense, Embedding, Layer, LayerSpec, Lstm};
pub use loss::Loss;
pub use matrix::{Matrix, MatrixView};
pub use model::{FitReport, Model, ValidationData};
pub use optimizers::OptimizerKind;
pub use utils::{Activation, SimpleRng};
