use crate::core::layers::{ConvolutionLayer, ConvolutionMode, InputType, Layer, LayerConfig};
use crate::keras::config::{KerasImportOptions, KerasLayerConfiguration};
use crate::keras::layer::KerasLayer;
use crate::prelude::*;
use log::debug;
use serde_json::Value;

/// Imports a Keras `Convolution2D` (Keras 1) / `Conv2D` (Keras 2) layer.
#[derive(Debug, Clone)]
pub struct KerasConvolution2D {
    layer: ConvolutionLayer,
}

impl KerasConvolution2D {
    pub fn new(layer_config: &Value, options: &KerasImportOptions) -> Result<Self> {
        let base = KerasLayer::new(layer_config, options)?;
        let conf = &base.conf;

        let accepted = [
            KerasLayerConfiguration::keras1().layer_class_name_convolution_2d,
            KerasLayerConfiguration::keras2().layer_class_name_convolution_2d,
        ];
        if !accepted.contains(&base.class_name.as_str()) {
            return Err(NNError::InvalidKerasConfiguration(format!(
                "expected a 2D convolution layer, got {}",
                base.class_name
            )));
        }
        base.check_training_config()?;

        let kernel_size = if base.keras_major_version() == 1 {
            [base.get_usize(conf.layer_field_nb_row)?, base.get_usize(conf.layer_field_nb_col)?]
        } else {
            base.get_usize_pair(conf.layer_field_kernel_size)?.ok_or_else(|| {
                NNError::InvalidKerasConfiguration(format!(
                    "convolution layer {} is missing {}",
                    base.layer_name, conf.layer_field_kernel_size
                ))
            })?
        };
        let stride = base
            .get_usize_pair(conf.layer_field_convolution_strides)?
            .unwrap_or([1, 1]);
        let dilation = base.get_usize_pair(conf.layer_field_dilation_rate)?.unwrap_or([1, 1]);
        let (convolution_mode, padding) = convolution_mode(&base)?;

        let layer = ConvolutionLayer::builder()
            .name(&base.layer_name)
            .n_out(base.get_usize(conf.layer_field_nb_filter)?)
            .kernel_size(kernel_size)
            .stride(stride)
            .dilation(dilation)
            .padding(padding)
            .convolution_mode(convolution_mode)
            .activation(base.activation()?)
            .weight_init(base.weight_init()?)
            .regularization(base.regularization()?)
            .dropout(base.dropout()?)
            .has_bias(base.has_bias()?)
            .data_format(base.data_format()?)
            .build()?;

        debug!(
            "imported Keras {} layer {} (kernel {:?}, stride {:?}, mode {:?})",
            base.class_name, layer.layer_name, layer.kernel_size, layer.stride, layer.convolution_mode
        );
        Ok(Self { layer })
    }

    pub fn convolution2d_layer(&self) -> &ConvolutionLayer {
        &self.layer
    }

    pub fn output_type(&self, input: &InputType) -> Result<InputType> {
        self.layer.output_type(input)
    }

    pub fn into_layer(self) -> Layer {
        Layer::Convolution(self.layer)
    }
}

/// `valid` keeps only full kernel positions; `same` pads implicitly. `full`
/// (and anything else) has no counterpart.
fn convolution_mode(base: &KerasLayer) -> Result<(ConvolutionMode, [usize; 2])> {
    let field = base.conf.layer_field_border_mode;
    let mode = match base.field(field) {
        None => "valid",
        Some(v) => v.as_str().ok_or_else(|| {
            NNError::InvalidKerasConfiguration(format!("{} must be a string, got {}", field, v))
        })?,
    };
    match mode {
        "valid" => Ok((ConvolutionMode::Truncate, [0, 0])),
        "same" => Ok((ConvolutionMode::Same, [0, 0])),
        other => Err(NNError::UnsupportedKerasConfiguration(format!(
            "border mode {} of layer {}",
            other, base.layer_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layers::CnnDataFormat;
    use serde_json::json;

    #[test]
    fn same_padding_and_channels_first() {
        let raw = json!({
            "class_name": "Conv2D",
            "keras_version": "2.1.6",
            "config": {
                "name": "conv",
                "filters": 4,
                "kernel_size": [3, 3],
                "strides": [2, 2],
                "padding": "same",
                "data_format": "channels_first",
                "activation": "relu",
                "use_bias": false,
                "kernel_initializer": {"class_name": "he_normal"},
            },
        });
        let conv = KerasConvolution2D::new(&raw, &KerasImportOptions::default()).unwrap();
        let layer = conv.convolution2d_layer();
        assert_eq!(layer.convolution_mode, ConvolutionMode::Same);
        assert_eq!(layer.data_format, CnnDataFormat::Nchw);
        assert!(!layer.has_bias);
        assert_eq!(layer.dilation, [1, 1]);
        assert_eq!(layer.dropout, None);

        let out = conv
            .output_type(&InputType::Convolutional { height: 9, width: 8, channels: 3 })
            .unwrap();
        assert_eq!(out, InputType::Convolutional { height: 5, width: 4, channels: 4 });
    }

    #[test]
    fn full_border_mode_is_unsupported() {
        let raw = json!({
            "class_name": "Convolution2D",
            "keras_version": 1,
            "config": {
                "name": "conv",
                "nb_filter": 2,
                "nb_row": 3,
                "nb_col": 3,
                "border_mode": "full",
                "activation": "linear",
                "init": "glorot_uniform",
            },
        });
        assert!(matches!(
            KerasConvolution2D::new(&raw, &KerasImportOptions::default()),
            Err(NNError::UnsupportedKerasConfiguration(_))
        ));
    }

    #[test]
    fn wrong_class_is_rejected() {
        let raw = json!({
            "class_name": "Dense",
            "keras_version": 2,
            "config": {"name": "d", "units": 3, "activation": "linear", "kernel_initializer": "zeros"},
        });
        assert!(KerasConvolution2D::new(&raw, &KerasImportOptions::default()).is_err());
    }

    #[test]
    fn missing_kernel_size_is_an_error() {
        let raw = json!({
            "class_name": "Conv2D",
            "keras_version": 2,
            "config": {"name": "c", "filters": 1, "activation": "linear", "kernel_initializer": "zeros"},
        });
        assert!(matches!(
            KerasConvolution2D::new(&raw, &KerasImportOptions::default()),
            Err(NNError::InvalidKerasConfiguration(_))
        ));
    }
}
