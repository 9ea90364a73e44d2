//! Architecture configuration
//!
//! Defines network architectures via JSON files so layer stacks can be
//! changed without code changes. A configuration is a sequence of layer
//! entries; each entry names its type and the fields that type requires:
//!
//! - **dense**: `units`, `activation`
//! - **lstm**: `units`, `activation`, optional `stateful` (default false)
//! - **embedding**: `embedding_dim`, `context_len`, optional `pad_index`
//!
//! Input dimensions are not part of the file; the model resolves them at
//! compile time from the previous layer's output size.

use serde::Deserialize;
use std::error::Error;
use std::fs;

use crate::layers::LayerSpec;
use crate::utils::Activation;

/// Configuration for a single layer.
///
/// # Example
///
/// ```json
/// {
///   "layer_type": "lstm",
///   "units": 64,
///   "activation": "sigmoid",
///   "stateful": true
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    /// Type of layer: "dense", "lstm", or "embedding"
    pub layer_type: String,

    /// Number of units for dense and lstm layers
    pub units: Option<usize>,
    /// Activation for dense and lstm layers
    pub activation: Option<String>,

    /// Carry hidden state across batches (lstm only, default false)
    pub stateful: Option<bool>,

    /// Embedding vector dimension (embedding only)
    pub embedding_dim: Option<usize>,
    /// Number of token indices per context (embedding only)
    pub context_len: Option<usize>,
    /// Pad token index skipped by the embedding layer (optional)
    pub pad_index: Option<usize>,
}

/// Configuration for a whole layer stack, applied in order.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "lstm", "units": 64, "activation": "sigmoid", "stateful": true },
///     { "layer_type": "dense", "units": 40, "activation": "softmax" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    /// Sequence of layer configurations defining the network structure
    pub layers: Vec<LayerConfig>,
}

/// Loads an architecture configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use seqnet::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/lstm_ctc.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: &str) -> Result<ArchitectureConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn invalid(msg: String) -> Box<dyn Error> {
    Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

/// Validates an architecture configuration.
///
/// Checks that the architecture has at least one layer and that each
/// layer carries the fields its type requires with valid values.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<(), Box<dyn Error>> {
    if config.layers.is_empty() {
        return Err(invalid(
            "architecture must have at least one layer".into(),
        ));
    }
    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }
    Ok(())
}

fn validate_layer(layer: &LayerConfig, index: usize) -> Result<(), Box<dyn Error>> {
    match layer.layer_type.to_lowercase().as_str() {
        "dense" | "lstm" => {
            let units = layer
                .units
                .ok_or_else(|| invalid(format!("layer {}: missing 'units'", index)))?;
            if units == 0 {
                return Err(invalid(format!(
                    "layer {}: units must be greater than 0",
                    index
                )));
            }
            let activation = layer
                .activation
                .as_deref()
                .ok_or_else(|| invalid(format!("layer {}: missing 'activation'", index)))?;
            Activation::parse(activation)
                .map_err(|e| invalid(format!("layer {}: {}", index, e)))?;
        }
        "embedding" => {
            let dim = layer.embedding_dim.ok_or_else(|| {
                invalid(format!("layer {}: missing 'embedding_dim'", index))
            })?;
            if dim == 0 {
                return Err(invalid(format!(
                    "layer {}: embedding_dim must be greater than 0",
                    index
                )));
            }
            let ctx = layer
                .context_len
                .ok_or_else(|| invalid(format!("layer {}: missing 'context_len'", index)))?;
            if ctx == 0 {
                return Err(invalid(format!(
                    "layer {}: context_len must be greater than 0",
                    index
                )));
            }
        }
        other => {
            return Err(invalid(format!(
                "layer {}: invalid layer type '{}'; must be one of: dense, lstm, embedding",
                index, other
            )));
        }
    }
    Ok(())
}

/// Builds layer specs from an architecture configuration.
///
/// The specs are attached to a model in order; the model's compile step
/// resolves the inter-layer dimensions and initializes the weights.
///
/// # Examples
///
/// ```no_run
/// use seqnet::architecture::{build_specs, load_architecture};
///
/// let config = load_architecture("config/architectures/lstm_ctc.json").unwrap();
/// let specs = build_specs(&config).unwrap();
/// assert_eq!(specs.len(), config.layers.len());
/// ```
pub fn build_specs(config: &ArchitectureConfig) -> Result<Vec<LayerSpec>, Box<dyn Error>> {
    validate_architecture(config)?;
    let mut specs = Vec::with_capacity(config.layers.len());
    for layer in &config.layers {
        match layer.layer_type.to_lowercase().as_str() {
            "dense" => {
                let activation = Activation::parse(layer.activation.as_deref().unwrap())
                    .map_err(invalid)?;
                specs.push(LayerSpec::dense(layer.units.unwrap(), activation));
            }
            "lstm" => {
                let activation = Activation::parse(layer.activation.as_deref().unwrap())
                    .map_err(invalid)?;
                specs.push(LayerSpec::lstm(
                    layer.units.unwrap(),
                    activation,
                    layer.stateful.unwrap_or(false),
                ));
            }
            "embedding" => {
                specs.push(LayerSpec::embedding(
                    layer.embedding_dim.unwrap(),
                    layer.context_len.unwrap(),
                    layer.pad_index,
                ));
            }
            _ => unreachable!("validated above"),
        }
    }
    Ok(specs)
}
