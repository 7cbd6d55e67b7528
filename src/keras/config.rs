use crate::prelude::*;

/// Field and class names used by one major version of the Keras layer JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerasLayerConfiguration {
    pub keras_major_version: u8,

    pub layer_field_class_name: &'static str,
    pub layer_field_config: &'static str,
    pub layer_field_keras_version: &'static str,
    pub layer_field_name: &'static str,
    pub layer_field_activation: &'static str,
    pub layer_field_batch_input_shape: &'static str,
    pub layer_field_init: &'static str,
    pub layer_field_w_regularizer: &'static str,
    pub layer_field_activity_regularizer: &'static str,
    pub layer_field_w_constraint: &'static str,
    pub layer_field_dropout: &'static str,
    pub layer_field_nb_row: &'static str,
    pub layer_field_nb_col: &'static str,
    pub layer_field_kernel_size: &'static str,
    pub layer_field_convolution_strides: &'static str,
    pub layer_field_dilation_rate: &'static str,
    pub layer_field_nb_filter: &'static str,
    pub layer_field_border_mode: &'static str,
    pub layer_field_use_bias: &'static str,
    pub layer_field_output_dim: &'static str,
    pub layer_field_dim_ordering: &'static str,

    pub layer_class_name_convolution_2d: &'static str,
    pub layer_class_name_dense: &'static str,
    pub layer_class_name_flatten: &'static str,
    pub layer_class_name_sequential: &'static str,

    pub regularization_type_l1: &'static str,
    pub regularization_type_l2: &'static str,

    pub dim_ordering_channels_last: &'static str,
    pub dim_ordering_channels_first: &'static str,

    pub init_glorot_normal: &'static str,
}

impl KerasLayerConfiguration {
    pub fn keras1() -> Self {
        Self {
            keras_major_version: 1,
            layer_field_init: "init",
            layer_field_w_regularizer: "W_regularizer",
            layer_field_activity_regularizer: "activity_regularizer",
            layer_field_w_constraint: "W_constraint",
            layer_field_dropout: "dropout",
            layer_field_convolution_strides: "subsample",
            layer_field_dilation_rate: "atrous_rate",
            layer_field_nb_filter: "nb_filter",
            layer_field_border_mode: "border_mode",
            layer_field_use_bias: "bias",
            layer_field_output_dim: "output_dim",
            layer_field_dim_ordering: "dim_ordering",
            layer_class_name_convolution_2d: "Convolution2D",
            dim_ordering_channels_last: "tf",
            dim_ordering_channels_first: "th",
            ..Self::common()
        }
    }

    pub fn keras2() -> Self {
        Self {
            keras_major_version: 2,
            layer_field_init: "kernel_initializer",
            layer_field_w_regularizer: "kernel_regularizer",
            layer_field_activity_regularizer: "activity_regularizer",
            layer_field_w_constraint: "kernel_constraint",
            layer_field_dropout: "rate",
            layer_field_convolution_strides: "strides",
            layer_field_dilation_rate: "dilation_rate",
            layer_field_nb_filter: "filters",
            layer_field_border_mode: "padding",
            layer_field_use_bias: "use_bias",
            layer_field_output_dim: "units",
            layer_field_dim_ordering: "data_format",
            layer_class_name_convolution_2d: "Conv2D",
            dim_ordering_channels_last: "channels_last",
            dim_ordering_channels_first: "channels_first",
            ..Self::common()
        }
    }

    pub fn for_version(version: u8) -> Result<Self> {
        match version {
            1 => Ok(Self::keras1()),
            2 => Ok(Self::keras2()),
            other => Err(NNError::UnsupportedKerasConfiguration(format!(
                "Keras major version {} is not supported (expected 1 or 2)",
                other
            ))),
        }
    }

    fn common() -> Self {
        Self {
            keras_major_version: 0,
            layer_field_class_name: "class_name",
            layer_field_config: "config",
            layer_field_keras_version: "keras_version",
            layer_field_name: "name",
            layer_field_activation: "activation",
            layer_field_batch_input_shape: "batch_input_shape",
            layer_field_init: "",
            layer_field_w_regularizer: "",
            layer_field_activity_regularizer: "",
            layer_field_w_constraint: "",
            layer_field_dropout: "",
            layer_field_nb_row: "nb_row",
            layer_field_nb_col: "nb_col",
            layer_field_kernel_size: "kernel_size",
            layer_field_convolution_strides: "",
            layer_field_dilation_rate: "",
            layer_field_nb_filter: "",
            layer_field_border_mode: "",
            layer_field_use_bias: "",
            layer_field_output_dim: "",
            layer_field_dim_ordering: "",
            layer_class_name_convolution_2d: "",
            layer_class_name_dense: "Dense",
            layer_class_name_flatten: "Flatten",
            layer_class_name_sequential: "Sequential",
            regularization_type_l1: "l1",
            regularization_type_l2: "l2",
            dim_ordering_channels_last: "",
            dim_ordering_channels_first: "",
            init_glorot_normal: "glorot_normal",
        }
    }
}

/// Import settings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct KerasImportOptions {
    /// Fail on training-only settings that can't be represented (constraints,
    /// activity regularizers, unknown regularizer terms) instead of logging a
    /// warning and skipping them.
    pub enforce_training_config: bool,
}

impl KerasImportOptions {
    pub fn enforcing() -> Self {
        Self {
            enforce_training_config: true,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_specific_field_names() {
        let k1 = KerasLayerConfiguration::keras1();
        let k2 = KerasLayerConfiguration::keras2();
        assert_eq!(k1.layer_field_nb_filter, "nb_filter");
        assert_eq!(k2.layer_field_nb_filter, "filters");
        assert_eq!(k1.layer_class_name_convolution_2d, "Convolution2D");
        assert_eq!(k2.layer_class_name_convolution_2d, "Conv2D");
        assert_eq!(k1.layer_field_class_name, k2.layer_field_class_name);
    }

    #[test]
    fn unsupported_version() {
        assert!(KerasLayerConfiguration::for_version(3).is_err());
        assert_eq!(KerasLayerConfiguration::for_version(2).unwrap().keras_major_version, 2);
    }

    #[test]
    fn options_from_json() {
        assert_eq!(KerasImportOptions::from_json("{}").unwrap(), KerasImportOptions::default());
        assert!(KerasImportOptions::from_json(r#"{"enforce_training_config": true}"#)
            .unwrap()
            .enforce_training_config);
    }
}
