use crate::core::layers::{DenseLayer, FlattenLayer, Layer};
use crate::keras::config::KerasImportOptions;
use crate::keras::layer::KerasLayer;
use crate::prelude::*;
use serde_json::Value;

/// Imports a Keras `Dense` layer. The input size stays 0 until the layer is
/// placed in a model with a known input type.
#[derive(Debug, Clone)]
pub struct KerasDense {
    layer: DenseLayer,
}

impl KerasDense {
    pub fn new(layer_config: &Value, options: &KerasImportOptions) -> Result<Self> {
        let base = KerasLayer::new(layer_config, options)?;
        if base.class_name != base.conf.layer_class_name_dense {
            return Err(NNError::InvalidKerasConfiguration(format!(
                "expected a Dense layer, got {}",
                base.class_name
            )));
        }
        base.check_training_config()?;

        let mut layer = DenseLayer::new(
            &base.layer_name,
            0,
            base.get_usize(base.conf.layer_field_output_dim)?,
            base.activation()?,
        )?;
        layer.weight_init = base.weight_init()?;
        layer.regularization = base.regularization()?;
        layer.dropout = base.dropout()?;
        layer.has_bias = base.has_bias()?;
        Ok(Self { layer })
    }

    pub fn dense_layer(&self) -> &DenseLayer {
        &self.layer
    }

    pub fn into_layer(self) -> Layer {
        Layer::Dense(self.layer)
    }
}

#[derive(Debug, Clone)]
pub struct KerasFlatten {
    layer: FlattenLayer,
}

impl KerasFlatten {
    pub fn new(layer_config: &Value, options: &KerasImportOptions) -> Result<Self> {
        let base = KerasLayer::new(layer_config, options)?;
        if base.class_name != base.conf.layer_class_name_flatten {
            return Err(NNError::InvalidKerasConfiguration(format!(
                "expected a Flatten layer, got {}",
                base.class_name
            )));
        }
        Ok(Self {
            layer: FlattenLayer {
                layer_name: base.layer_name,
            },
        })
    }

    pub fn into_layer(self) -> Layer {
        Layer::Flatten(self.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::regularization::{Regularizer, WeightInit};
    use serde_json::json;

    #[test]
    fn keras1_dense() {
        let raw = json!({
            "class_name": "Dense",
            "keras_version": 1,
            "config": {
                "name": "out",
                "output_dim": 10,
                "activation": "softmax",
                "init": "lecun_uniform",
                "W_regularizer": {"l2": 0.001, "name": "L1L2Regularizer"},
                "bias": true,
            },
        });
        let dense = KerasDense::new(&raw, &KerasImportOptions::default()).unwrap();
        let layer = dense.dense_layer();
        assert_eq!(layer.layer_name, "out");
        assert_eq!(layer.n_out, 10);
        assert_eq!(layer.n_in, 0);
        assert_eq!(layer.activation, Activation::Softmax);
        assert_eq!(layer.weight_init, WeightInit::LecunUniform);
        assert_eq!(layer.regularization, vec![Regularizer::L2(0.001)]);
    }

    #[test]
    fn keras2_dense_with_zero_units_fails() {
        let raw = json!({
            "class_name": "Dense",
            "keras_version": 2,
            "config": {"name": "d", "units": 0, "activation": "relu", "kernel_initializer": "glorot_uniform"},
        });
        assert!(KerasDense::new(&raw, &KerasImportOptions::default()).is_err());
    }

    #[test]
    fn flatten() {
        let raw = json!({"class_name": "Flatten", "keras_version": 2, "config": {"name": "flat"}});
        let layer = KerasFlatten::new(&raw, &KerasImportOptions::default()).unwrap().into_layer();
        assert_eq!(layer, Layer::Flatten(FlattenLayer { layer_name: "flat".into() }));
    }
}
