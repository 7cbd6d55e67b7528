use crate::core::layers::CnnDataFormat;
use crate::core::regularization::{Dropout, Regularizer, WeightInit};
use crate::keras::config::{KerasImportOptions, KerasLayerConfiguration};
use crate::prelude::*;
use log::warn;
use serde_json::{Map, Value};

/// Reads the Keras major version from a number (`2`) or a version string
/// (`"2.2.4"`).
pub fn parse_keras_version(value: &Value) -> Result<u8> {
    let major = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.split('.').next().and_then(|m| m.trim().parse::<u64>().ok()),
        _ => None,
    };
    match major {
        Some(v @ (1 | 2)) => Ok(v as u8),
        Some(v) => Err(NNError::UnsupportedKerasConfiguration(format!(
            "Keras major version {} is not supported (expected 1 or 2)",
            v
        ))),
        None => Err(NNError::InvalidKerasConfiguration(format!(
            "can't read a Keras version from {}",
            value
        ))),
    }
}

fn value_to_usize(value: &Value, field: &str) -> Result<usize> {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        _ => None,
    };
    parsed.map(|v| v as usize).ok_or_else(|| {
        NNError::InvalidKerasConfiguration(format!(
            "field {} must be a non-negative integer, got {}",
            field, value
        ))
    })
}

/// Fields shared by every Keras layer, plus typed access to the layer's
/// inner `config` object.
#[derive(Debug, Clone)]
pub struct KerasLayer {
    pub conf: KerasLayerConfiguration,
    pub class_name: String,
    pub layer_name: String,
    pub options: KerasImportOptions,
    inner: Map<String, Value>,
}

impl KerasLayer {
    pub fn new(layer_config: &Value, options: &KerasImportOptions) -> Result<Self> {
        let obj = layer_config.as_object().ok_or_else(|| {
            NNError::InvalidKerasConfiguration("layer configuration must be a JSON object".to_string())
        })?;

        let version = obj
            .get("keras_version")
            .ok_or_else(|| {
                NNError::InvalidKerasConfiguration("layer configuration has no keras_version field".to_string())
            })
            .and_then(parse_keras_version)?;
        let conf = KerasLayerConfiguration::for_version(version)?;

        let class_name = obj
            .get(conf.layer_field_class_name)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NNError::InvalidKerasConfiguration(format!(
                    "layer configuration has no {} field",
                    conf.layer_field_class_name
                ))
            })?
            .to_string();

        let inner = obj
            .get(conf.layer_field_config)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                NNError::InvalidKerasConfiguration(format!(
                    "{} layer has no {} object",
                    class_name, conf.layer_field_config
                ))
            })?
            .clone();

        let layer_name = inner
            .get(conf.layer_field_name)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                NNError::InvalidKerasConfiguration(format!("{} layer has no {} field", class_name, conf.layer_field_name))
            })?
            .to_string();

        Ok(Self {
            conf,
            class_name,
            layer_name,
            options: *options,
            inner,
        })
    }

    pub fn keras_major_version(&self) -> u8 {
        self.conf.keras_major_version
    }

    /// A present, non-null field of the inner config.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.inner.get(name).filter(|v| !v.is_null())
    }

    pub fn required(&self, name: &str) -> Result<&Value> {
        self.field(name).ok_or_else(|| {
            NNError::InvalidKerasConfiguration(format!(
                "{} layer {} is missing field {}",
                self.class_name, self.layer_name, name
            ))
        })
    }

    pub fn get_usize(&self, name: &str) -> Result<usize> {
        value_to_usize(self.required(name)?, name)
    }

    /// Reads a two-element size (`[a, b]`, or a single integer used for both).
    pub fn get_usize_pair(&self, name: &str) -> Result<Option<[usize; 2]>> {
        let Some(value) = self.field(name) else {
            return Ok(None);
        };
        match value {
            Value::Array(items) if items.len() == 2 => {
                Ok(Some([value_to_usize(&items[0], name)?, value_to_usize(&items[1], name)?]))
            }
            Value::Number(_) => {
                let v = value_to_usize(value, name)?;
                Ok(Some([v, v]))
            }
            other => Err(NNError::InvalidKerasConfiguration(format!(
                "field {} must hold two integers, got {}",
                name, other
            ))),
        }
    }

    pub fn activation(&self) -> Result<Activation> {
        let name = self
            .required(self.conf.layer_field_activation)?
            .as_str()
            .ok_or_else(|| NNError::InvalidKerasConfiguration("activation must be a string".to_string()))?;
        map_activation(name)
    }

    pub fn weight_init(&self) -> Result<WeightInit> {
        let value = self.required(self.conf.layer_field_init)?;
        let (name, params) = match value {
            Value::String(s) => (s.as_str(), None),
            Value::Object(obj) => {
                let name = obj
                    .get(self.conf.layer_field_class_name)
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        NNError::InvalidKerasConfiguration(format!(
                            "initializer of layer {} has no class_name",
                            self.layer_name
                        ))
                    })?;
                (name, obj.get(self.conf.layer_field_config).and_then(Value::as_object))
            }
            other => {
                return Err(NNError::InvalidKerasConfiguration(format!(
                    "unreadable initializer {}",
                    other
                )))
            }
        };
        map_weight_init(name, params)
    }

    pub fn regularization(&self) -> Result<Vec<Regularizer>> {
        let Some(value) = self.field(self.conf.layer_field_w_regularizer) else {
            return Ok(Vec::new());
        };
        let obj = value.as_object().ok_or_else(|| {
            NNError::InvalidKerasConfiguration(format!("unreadable regularizer {}", value))
        })?;
        // Keras 2 nests the terms: {"class_name": "L1L2", "config": {...}}
        let terms = obj
            .get(self.conf.layer_field_config)
            .and_then(Value::as_object)
            .unwrap_or(obj);

        let (l1_key, l2_key) = (self.conf.regularization_type_l1, self.conf.regularization_type_l2);
        for key in terms.keys() {
            let known = key == l1_key || key == l2_key || key == "name" || key == self.conf.layer_field_class_name;
            if !known {
                self.unsupported(&format!("regularization term {}", key))?;
            }
        }

        let mut regularization = Vec::new();
        for (key, make) in [
            (l1_key, Regularizer::L1 as fn(f64) -> Regularizer),
            (l2_key, Regularizer::L2 as fn(f64) -> Regularizer),
        ] {
            if let Some(v) = terms.get(key).filter(|v| !v.is_null()) {
                let coefficient = v.as_f64().ok_or_else(|| {
                    NNError::InvalidKerasConfiguration(format!("regularization {} must be a number, got {}", key, v))
                })?;
                if coefficient != 0.0 {
                    regularization.push(make(coefficient));
                }
            }
        }
        Ok(regularization)
    }

    /// Keras stores the probability of dropping a unit; the returned dropout
    /// holds the probability of keeping it.
    pub fn dropout(&self) -> Result<Option<Dropout>> {
        let Some(value) = self.field(self.conf.layer_field_dropout) else {
            return Ok(None);
        };
        let drop = value.as_f64().ok_or_else(|| {
            NNError::InvalidKerasConfiguration(format!("dropout must be a number, got {}", value))
        })?;
        if drop <= 0.0 {
            return Ok(None);
        }
        Dropout::new(1.0 - drop).map(Some)
    }

    pub fn has_bias(&self) -> Result<bool> {
        match self.field(self.conf.layer_field_use_bias) {
            None => Ok(true),
            Some(v) => v.as_bool().ok_or_else(|| {
                NNError::InvalidKerasConfiguration(format!("{} must be a boolean, got {}", self.conf.layer_field_use_bias, v))
            }),
        }
    }

    pub fn data_format(&self) -> Result<CnnDataFormat> {
        match self.field(self.conf.layer_field_dim_ordering).and_then(Value::as_str) {
            None | Some("default") => Ok(CnnDataFormat::Nhwc),
            Some(s) if s == self.conf.dim_ordering_channels_last => Ok(CnnDataFormat::Nhwc),
            Some(s) if s == self.conf.dim_ordering_channels_first => Ok(CnnDataFormat::Nchw),
            Some(other) => Err(NNError::UnsupportedKerasConfiguration(format!(
                "unknown data format {}",
                other
            ))),
        }
    }

    /// `batch_input_shape` without the leading batch dimension.
    pub fn batch_input_shape(&self) -> Result<Option<Vec<usize>>> {
        let field = self.conf.layer_field_batch_input_shape;
        let Some(value) = self.field(field) else {
            return Ok(None);
        };
        let dims = value.as_array().ok_or_else(|| {
            NNError::InvalidKerasConfiguration(format!("{} must be a list, got {}", field, value))
        })?;
        dims.iter()
            .skip(1)
            .map(|d| {
                if d.is_null() {
                    Err(NNError::UnsupportedKerasConfiguration(format!(
                        "variable-size input dimension in {} of layer {}",
                        field, self.layer_name
                    )))
                } else {
                    value_to_usize(d, field)
                }
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Rejects or logs training-only settings that have no counterpart here.
    pub fn check_training_config(&self) -> Result<()> {
        for field in [self.conf.layer_field_w_constraint, self.conf.layer_field_activity_regularizer] {
            if self.field(field).is_some() {
                self.unsupported(field)?;
            }
        }
        Ok(())
    }

    fn unsupported(&self, what: &str) -> Result<()> {
        if self.options.enforce_training_config {
            return Err(NNError::UnsupportedKerasConfiguration(format!(
                "{} of layer {} is not supported",
                what, self.layer_name
            )));
        }
        warn!("ignoring {} of Keras layer {}", what, self.layer_name);
        Ok(())
    }
}

pub fn map_activation(keras_name: &str) -> Result<Activation> {
    Ok(match keras_name {
        "linear" => Activation::Identity,
        "relu" => Activation::Relu,
        "sigmoid" => Activation::Sigmoid,
        "tanh" => Activation::Tanh,
        "softmax" => Activation::Softmax,
        "softplus" => Activation::Softplus,
        "hard_sigmoid" => Activation::HardSigmoid,
        "softsign" => Activation::Softsign,
        "elu" => Activation::Elu,
        other => {
            return Err(NNError::UnsupportedKerasConfiguration(format!(
                "unknown Keras activation {}",
                other
            )))
        }
    })
}

/// Maps a Keras initializer name (`glorot_normal` or `GlorotNormal`) and its
/// optional parameters.
pub fn map_weight_init(keras_name: &str, params: Option<&Map<String, Value>>) -> Result<WeightInit> {
    let param = |key: &str, default: f64| params.and_then(|p| p.get(key)).and_then(Value::as_f64).unwrap_or(default);
    let normalized: String = keras_name
        .chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_ascii_lowercase();

    Ok(match normalized.as_str() {
        "glorotnormal" => WeightInit::Xavier,
        "glorotuniform" => WeightInit::XavierUniform,
        "henormal" => WeightInit::Relu,
        "heuniform" => WeightInit::ReluUniform,
        "lecunnormal" => WeightInit::LecunNormal,
        "lecununiform" => WeightInit::LecunUniform,
        "zero" | "zeros" => WeightInit::Zero,
        "one" | "ones" => WeightInit::Ones,
        "uniform" | "randomuniform" => {
            let scale = param("scale", 0.05);
            WeightInit::Uniform {
                lower: param("minval", -scale),
                upper: param("maxval", scale),
            }
        }
        "normal" | "randomnormal" => WeightInit::Normal {
            mean: param("mean", 0.0),
            std: param("stddev", param("scale", 0.05)),
        },
        _ => {
            return Err(NNError::UnsupportedKerasConfiguration(format!(
                "unknown Keras initializer {}",
                keras_name
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(version: u8, config: Value) -> KerasLayer {
        let layer = json!({
            "class_name": "Dense",
            "keras_version": version,
            "config": config,
        });
        KerasLayer::new(&layer, &KerasImportOptions::default()).unwrap()
    }

    #[test]
    fn versions() {
        assert_eq!(parse_keras_version(&json!(1)).unwrap(), 1);
        assert_eq!(parse_keras_version(&json!("2.2.4")).unwrap(), 2);
        assert!(matches!(
            parse_keras_version(&json!("3.0.1")),
            Err(NNError::UnsupportedKerasConfiguration(_))
        ));
        assert!(parse_keras_version(&json!(null)).is_err());
    }

    #[test]
    fn missing_name_is_an_error() {
        let bad = json!({"class_name": "Dense", "keras_version": 2, "config": {}});
        assert!(matches!(
            KerasLayer::new(&bad, &KerasImportOptions::default()),
            Err(NNError::InvalidKerasConfiguration(_))
        ));
    }

    #[test]
    fn activation_names() {
        assert_eq!(map_activation("linear").unwrap(), Activation::Identity);
        assert_eq!(map_activation("hard_sigmoid").unwrap(), Activation::HardSigmoid);
        assert!(map_activation("swish").is_err());
    }

    #[test]
    fn initializers_in_both_formats() {
        let k1 = layer(1, json!({"name": "d", "init": "he_uniform"}));
        assert_eq!(k1.weight_init().unwrap(), WeightInit::ReluUniform);

        let k2 = layer(
            2,
            json!({"name": "d", "kernel_initializer": {"class_name": "RandomUniform", "config": {"minval": -0.1, "maxval": 0.2}}}),
        );
        assert_eq!(k2.weight_init().unwrap(), WeightInit::Uniform { lower: -0.1, upper: 0.2 });

        let unknown = layer(2, json!({"name": "d", "kernel_initializer": {"class_name": "VarianceScaling"}}));
        assert!(unknown.weight_init().is_err());
    }

    #[test]
    fn nested_regularizer_terms() {
        let k2 = layer(
            2,
            json!({"name": "d", "kernel_regularizer": {"class_name": "L1L2", "config": {"l1": 0.0, "l2": 0.5}}}),
        );
        assert_eq!(k2.regularization().unwrap(), vec![Regularizer::L2(0.5)]);

        let none = layer(2, json!({"name": "d", "kernel_regularizer": null}));
        assert!(none.regularization().unwrap().is_empty());
    }

    #[test]
    fn unknown_regularizer_term_depends_on_enforcement() {
        let raw = json!({
            "class_name": "Dense",
            "keras_version": 1,
            "config": {"name": "d", "W_regularizer": {"l1": 0.1, "l3": 2.0}},
        });
        let lenient = KerasLayer::new(&raw, &KerasImportOptions::default()).unwrap();
        assert_eq!(lenient.regularization().unwrap(), vec![Regularizer::L1(0.1)]);

        let strict = KerasLayer::new(&raw, &KerasImportOptions::enforcing()).unwrap();
        assert!(matches!(
            strict.regularization(),
            Err(NNError::UnsupportedKerasConfiguration(_))
        ));
    }

    #[test]
    fn constraints_are_training_config() {
        let raw = json!({
            "class_name": "Dense",
            "keras_version": 2,
            "config": {"name": "d", "kernel_constraint": {"class_name": "MaxNorm"}},
        });
        assert!(KerasLayer::new(&raw, &KerasImportOptions::default())
            .unwrap()
            .check_training_config()
            .is_ok());
        assert!(KerasLayer::new(&raw, &KerasImportOptions::enforcing())
            .unwrap()
            .check_training_config()
            .is_err());
    }

    #[test]
    fn dropout_is_converted_to_retain_probability() {
        let d = layer(2, json!({"name": "d", "rate": 0.25}));
        assert_eq!(d.dropout().unwrap(), Some(Dropout::new(0.75).unwrap()));
        let none = layer(2, json!({"name": "d", "rate": 0.0}));
        assert_eq!(none.dropout().unwrap(), None);
    }

    #[test]
    fn pairs_and_input_shapes() {
        let l = layer(
            2,
            json!({"name": "c", "strides": 2, "kernel_size": [3, 5], "batch_input_shape": [null, 28, 28, 1]}),
        );
        assert_eq!(l.get_usize_pair("strides").unwrap(), Some([2, 2]));
        assert_eq!(l.get_usize_pair("kernel_size").unwrap(), Some([3, 5]));
        assert_eq!(l.get_usize_pair("dilation_rate").unwrap(), None);
        assert_eq!(l.batch_input_shape().unwrap(), Some(vec![28, 28, 1]));

        let variable = layer(2, json!({"name": "c", "batch_input_shape": [null, null, 3]}));
        assert!(variable.batch_input_shape().is_err());
    }

    #[test]
    fn data_formats() {
        assert_eq!(
            layer(1, json!({"name": "c", "dim_ordering": "th"})).data_format().unwrap(),
            CnnDataFormat::Nchw
        );
        assert_eq!(
            layer(2, json!({"name": "c", "data_format": "channels_last"})).data_format().unwrap(),
            CnnDataFormat::Nhwc
        );
        assert_eq!(layer(2, json!({"name": "c"})).data_format().unwrap(), CnnDataFormat::Nhwc);
    }
}
