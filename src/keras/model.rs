use crate::core::layers::{CnnDataFormat, InputType};
use crate::keras::config::{KerasImportOptions, KerasLayerConfiguration};
use crate::keras::import_keras_layer;
use crate::keras::layer::{parse_keras_version, KerasLayer};
use crate::models::SequentialConfig;
use crate::prelude::*;
use log::{info, warn};
use serde_json::Value;

/// Imports the model configuration of a Keras `Sequential` model, as produced
/// by `model.to_json()`.
pub fn import_sequential_config(json: &str, options: &KerasImportOptions) -> Result<SequentialConfig> {
    let model: Value = serde_json::from_str(json)?;
    let obj = model.as_object().ok_or_else(|| {
        NNError::InvalidKerasConfiguration("model configuration must be a JSON object".to_string())
    })?;

    let version = match obj.get("keras_version") {
        Some(v) => parse_keras_version(v)?,
        None => {
            warn!("model configuration has no keras_version, assuming Keras 1");
            1
        }
    };
    let conf = KerasLayerConfiguration::for_version(version)?;

    let class_name = obj
        .get(conf.layer_field_class_name)
        .and_then(Value::as_str)
        .unwrap_or_default();
    if class_name != conf.layer_class_name_sequential {
        return Err(NNError::UnsupportedKerasConfiguration(format!(
            "only {} models can be imported, got {:?}",
            conf.layer_class_name_sequential, class_name
        )));
    }

    let config = obj.get(conf.layer_field_config);
    // Keras 1 stores the layer list directly, Keras 2 under "layers".
    let layer_list = match config {
        Some(Value::Array(layers)) => layers,
        Some(Value::Object(c)) => c.get("layers").and_then(Value::as_array).ok_or_else(|| {
            NNError::InvalidKerasConfiguration("Sequential config has no layers list".to_string())
        })?,
        _ => {
            return Err(NNError::InvalidKerasConfiguration(
                "Sequential model has no config".to_string(),
            ))
        }
    };

    let mut layers = Vec::with_capacity(layer_list.len());
    let mut input_type = None;
    for (i, raw) in layer_list.iter().enumerate() {
        let mut raw = raw.clone();
        let entry = raw.as_object_mut().ok_or_else(|| {
            NNError::InvalidKerasConfiguration(format!("layer {} is not a JSON object", i))
        })?;
        entry
            .entry(conf.layer_field_keras_version)
            .or_insert_with(|| Value::from(version));

        if i == 0 {
            input_type = first_input_type(&KerasLayer::new(&raw, options)?)?;
        }
        layers.push(import_keras_layer(&raw, options)?);
    }

    let model = SequentialConfig::new(layers)?;
    let model = match input_type {
        Some(input_type) => model.with_input_type(input_type)?,
        None => {
            warn!("first layer has no batch_input_shape; layer input sizes are left unset");
            model
        }
    };
    info!(
        "imported Keras {} Sequential model with {} layers ({} parameters)",
        version,
        model.layers.len(),
        model.num_params()
    );
    Ok(model)
}

fn first_input_type(layer: &KerasLayer) -> Result<Option<InputType>> {
    let Some(shape) = layer.batch_input_shape()? else {
        return Ok(None);
    };
    match shape.as_slice() {
        [size] => Ok(Some(InputType::FeedForward { size: *size })),
        [a, b, c] => Ok(Some(match layer.data_format()? {
            CnnDataFormat::Nhwc => InputType::Convolutional { height: *a, width: *b, channels: *c },
            CnnDataFormat::Nchw => InputType::Convolutional { height: *b, width: *c, channels: *a },
        })),
        other => Err(NNError::UnsupportedKerasConfiguration(format!(
            "input shape {:?} of layer {}",
            other, layer.layer_name
        ))),
    }
}
