//! Shared utilities for the training engine
//!
//! This module provides the seeded random number generator and the
//! activation-function library used across layers and the model.

pub mod activations;
pub mod rng;

pub use activations::Activation;
pub use rng::SimpleRng;
