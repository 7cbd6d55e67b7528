// src/keras.rs
pub mod config;
pub mod convolution;
pub mod core_layers;
pub mod layer;
pub mod model;

pub use config::{KerasImportOptions, KerasLayerConfiguration};
pub use convolution::KerasConvolution2D;
pub use core_layers::{KerasDense, KerasFlatten};
pub use layer::KerasLayer;
pub use model::import_sequential_config;

use crate::core::layers::Layer;
use crate::prelude::*;
use serde_json::Value;

/// Imports a single Keras layer, choosing the importer by `class_name`.
pub fn import_keras_layer(layer_config: &Value, options: &KerasImportOptions) -> Result<Layer> {
    let class_name = layer_config
        .get("class_name")
        .and_then(Value::as_str)
        .ok_or_else(|| NNError::InvalidKerasConfiguration("layer has no class_name".to_string()))?;
    match class_name {
        "Conv2D" | "Convolution2D" => Ok(KerasConvolution2D::new(layer_config, options)?.into_layer()),
        "Dense" => Ok(KerasDense::new(layer_config, options)?.into_layer()),
        "Flatten" => Ok(KerasFlatten::new(layer_config, options)?.into_layer()),
        other => Err(NNError::UnsupportedKerasConfiguration(format!(
            "layer class {}",
            other
        ))),
    }
}
