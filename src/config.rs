//! Training configuration
//!
//! Two configuration surfaces exist side by side:
//!
//! - JSON files parsed into [`TrainingConfig`] with serde, for running
//!   experiments without code changes;
//! - the `fit`-time kwargs string of `key=value` pairs separated by
//!   spaces ([`FitOptions`]), with the recognized keys `shuffle`, `final`,
//!   `verbose`, and `schedule`.
//!
//! A schedule string has the form `epochs:lr:wd,epochs:lr:wd,...`; each
//! segment applies for that many additional epochs, and omitted values
//! keep the previous learning rate or weight decay.

use serde::Deserialize;
use std::error::Error;
use std::fs;

use crate::loss::Loss;
use crate::optimizers::OptimizerKind;

/// Configuration for a training run, parsed from a JSON file.
///
/// # Example
///
/// ```json
/// {
///   "loss_function": "cross-entropy",
///   "optimizer": "adamw",
///   "batch_size": 32,
///   "epochs": 20,
///   "learning_rate": 0.001,
///   "weight_decay": 0.01,
///   "schedule": "10:0.001:0.01,10:0.0001:0.01"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Loss function: "mean-square-error", "cross-entropy", or "ctc"
    pub loss_function: String,

    /// Optimizer: "sgd" or "adamw"
    pub optimizer: String,

    /// Number of input vectors processed together between updates
    pub batch_size: usize,

    /// Number of passes over the training data
    pub epochs: usize,

    /// Gradient multiplier controlling the rate of descent
    pub learning_rate: f32,

    /// Multiplier that suppresses weight magnitude
    pub weight_decay: f32,

    /// Optional variable learning-rate/weight-decay schedule
    pub schedule: Option<String>,
}

/// Loads a training configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use seqnet::config::load_config;
///
/// let cfg = load_config("config/train_ctc.json").unwrap();
/// assert_eq!(cfg.loss_function, "ctc");
/// ```
pub fn load_config(path: &str) -> Result<TrainingConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(msg: String) -> Box<dyn Error> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

fn validate_config(config: &TrainingConfig) -> Result<(), Box<dyn Error>> {
    Loss::parse(&config.loss_function).map_err(invalid)?;
    OptimizerKind::parse(&config.optimizer).map_err(invalid)?;
    if config.batch_size == 0 {
        return Err(invalid("batch_size must be greater than 0".into()));
    }
    if config.learning_rate <= 0.0 {
        return Err(invalid("learning_rate must be positive".into()));
    }
    if config.weight_decay < 0.0 {
        return Err(invalid("weight_decay must be non-negative".into()));
    }
    if let Some(ref sch) = config.schedule {
        Schedule::parse(sch).map_err(invalid)?;
    }
    Ok(())
}

/// One schedule segment: a number of epochs with optional overrides.
#[derive(Debug, Clone, PartialEq)]
struct Segment {
    epochs: usize,
    learning_rate: Option<f32>,
    weight_decay: Option<f32>,
}

/// A learning-rate/weight-decay schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    segments: Vec<Segment>,
}

impl Schedule {
    /// Parse a schedule string `epochs:lr:wd,epochs:lr:wd,...`.
    ///
    /// The learning rate and weight decay of a segment may be omitted;
    /// omitted values carry the previous segment's (or the caller's)
    /// value forward.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut fields = part.split(':');
            let epochs = fields
                .next()
                .unwrap_or("")
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid schedule segment '{}'", part))?;
            let learning_rate = match fields.next() {
                Some(f) => Some(
                    f.trim()
                        .parse::<f32>()
                        .map_err(|_| format!("invalid learning rate in segment '{}'", part))?,
                ),
                None => None,
            };
            let weight_decay = match fields.next() {
                Some(f) => Some(
                    f.trim()
                        .parse::<f32>()
                        .map_err(|_| format!("invalid weight decay in segment '{}'", part))?,
                ),
                None => None,
            };
            segments.push(Segment {
                epochs,
                learning_rate,
                weight_decay,
            });
        }
        if segments.is_empty() {
            return Err(format!("empty schedule '{}'", s));
        }
        Ok(Self { segments })
    }

    /// Learning rate and weight decay in effect for `epoch` (0-based).
    ///
    /// Starts from the supplied defaults and walks the segments; past the
    /// end of the schedule the last segment's values stay in effect.
    pub fn params_for_epoch(&self, epoch: usize, mut lr: f32, mut wd: f32) -> (f32, f32) {
        let mut total = 0;
        for seg in &self.segments {
            total += seg.epochs;
            if let Some(v) = seg.learning_rate {
                lr = v;
            }
            if let Some(v) = seg.weight_decay {
                wd = v;
            }
            if epoch < total {
                break;
            }
        }
        (lr, wd)
    }
}

/// Optional `fit` parameters parsed from a `key=value` string.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Shuffle flat data between epochs (default on); sequence-grouped
    /// data shuffles whole sequences under the same switch
    pub shuffle: bool,
    /// Free gradient memory after training and disallow further fitting
    pub finalize: bool,
    /// 0: silent, 1: progress line, >1: one line per epoch
    pub verbose: u32,
    /// Variable learning-rate/weight-decay schedule
    pub schedule: Option<Schedule>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            shuffle: true,
            finalize: false,
            verbose: 0,
            schedule: None,
        }
    }
}

impl FitOptions {
    /// Parse a kwargs string such as `"shuffle=0 verbose=1 schedule=5:0.01"`.
    ///
    /// Unrecognized keys are ignored; recognized keys with malformed
    /// values are an error.
    pub fn parse(kwargs: &str) -> Result<Self, String> {
        let mut opts = FitOptions::default();
        if let Some(v) = find_kwarg(kwargs, "shuffle") {
            opts.shuffle = parse_int(v)? != 0;
        }
        if let Some(v) = find_kwarg(kwargs, "final") {
            opts.finalize = parse_int(v)? != 0;
        }
        if let Some(v) = find_kwarg(kwargs, "verbose") {
            opts.verbose = parse_int(v)?.max(0) as u32;
        }
        if let Some(v) = find_kwarg(kwargs, "schedule") {
            opts.schedule = Some(Schedule::parse(v)?);
        }
        Ok(opts)
    }
}

/// Find the value of `key` in a `key=value` string.
///
/// The key must start the string or follow a space; the value runs to the
/// next space or the end of the string.
fn find_kwarg<'a>(kwargs: &'a str, key: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(pos) = kwargs[search..].find(key) {
        let at = search + pos;
        let at_word_start = at == 0 || kwargs.as_bytes()[at - 1] == b' ';
        let rest = kwargs[at + key.len()..].trim_start();
        if at_word_start {
            if let Some(value) = rest.strip_prefix('=') {
                let value = value.trim_start();
                let end = value.find(' ').unwrap_or(value.len());
                return Some(&value[..end]);
            }
        }
        search = at + key.len();
    }
    None
}

fn parse_int(v: &str) -> Result<i64, String> {
    v.parse::<i64>()
        .map_err(|_| format!("invalid integer value '{}'", v))
}
