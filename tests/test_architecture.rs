// Configuration loading: architecture and training JSON files parsed from
// disk, validated, and turned into layer specs a model compiles from.

use std::io::Write;
use tempfile::NamedTempFile;

use seqnet::architecture::{build_specs, load_architecture};
use seqnet::config::load_config;
use seqnet::{LayerSpec, Loss, Matrix, Model, OptimizerKind};

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_architecture_round_trip() {
    let file = write_temp(
        r#"{
  "layers": [
    {
      "layer_type": "lstm",
      "units": 64,
      "activation": "sigmoid",
      "stateful": true
    },
    {
      "layer_type": "dense",
      "units": 40,
      "activation": "softmax"
    }
  ]
}"#,
    );
    let config = load_architecture(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.layers.len(), 2);
    assert_eq!(config.layers[0].layer_type, "lstm");
    assert_eq!(config.layers[0].units, Some(64));
    assert_eq!(config.layers[0].stateful, Some(true));
    assert_eq!(config.layers[1].layer_type, "dense");
    assert_eq!(config.layers[1].activation.as_deref(), Some("softmax"));

    let specs = build_specs(&config).unwrap();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].output_size(), 64);
    assert_eq!(specs[1].output_size(), 40);
}

#[test]
fn test_load_architecture_rejects_unknown_type() {
    let file = write_temp(
        r#"{ "layers": [ { "layer_type": "conv2d", "units": 8, "activation": "relu" } ] }"#,
    );
    let err = load_architecture(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("invalid layer type"));
}

#[test]
fn test_load_architecture_rejects_missing_fields() {
    let file = write_temp(r#"{ "layers": [ { "layer_type": "dense", "units": 8 } ] }"#);
    let err = load_architecture(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("missing 'activation'"));
}

#[test]
fn test_load_architecture_rejects_bad_json() {
    let file = write_temp("{ not json");
    assert!(load_architecture(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_load_training_config() {
    let file = write_temp(
        r#"{
  "loss_function": "ctc",
  "optimizer": "adamw",
  "batch_size": 16,
  "epochs": 30,
  "learning_rate": 0.001,
  "weight_decay": 0.01,
  "schedule": "10:0.001:0.01,20:0.0001"
}"#,
    );
    let config = load_config(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.loss_function, "ctc");
    assert_eq!(config.optimizer, "adamw");
    assert_eq!(config.batch_size, 16);
    assert_eq!(config.epochs, 30);
}

#[test]
fn test_load_training_config_rejects_bad_loss() {
    let file = write_temp(
        r#"{
  "loss_function": "hinge",
  "optimizer": "adamw",
  "batch_size": 16,
  "epochs": 30,
  "learning_rate": 0.001,
  "weight_decay": 0.01
}"#,
    );
    let err = load_config(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("invalid loss function"));
}

#[test]
fn test_specs_from_file_compile_and_fit() {
    let file = write_temp(
        r#"{
  "layers": [
    { "layer_type": "dense", "units": 4, "activation": "sigmoid" },
    { "layer_type": "dense", "units": 1, "activation": "sigmoid" }
  ]
}"#,
    );
    let config = load_architecture(file.path().to_str().unwrap()).unwrap();
    let specs: Vec<LayerSpec> = build_specs(&config).unwrap();

    let mut model = Model::new(specs.len(), 4, 2, true, false);
    model.reseed(2);
    for spec in specs {
        model.add(spec);
    }
    model.compile(Loss::MeanSquareError, OptimizerKind::Sgd);

    let x = Matrix::from_vec(4, 2, vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
    let y = Matrix::from_vec(4, 1, vec![0.0, 1.0, 1.0, 0.0]);
    let report = model.fit(x.view(), y.view(), None, None, 2, 0.1, 0.0, "");
    assert_eq!(report.losses.len(), 2);
}
