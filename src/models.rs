use crate::core::layers::{InputType, Layer, LayerConfig};
use crate::prelude::*;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// An ordered stack of layer configurations, e.g. the result of a Keras import.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SequentialConfig {
    pub layers: Vec<Layer>,
    pub input_type: Option<InputType>,
}

impl SequentialConfig {
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(NNError::EmptyModel);
        }
        Ok(Self {
            layers,
            input_type: None,
        })
    }

    /// Sets the model input and propagates input sizes through every layer.
    pub fn with_input_type(mut self, input_type: InputType) -> Result<Self> {
        let mut current = input_type;
        for layer in self.layers.iter_mut() {
            layer.set_n_in(&current)?;
            current = layer.output_type(&current)?;
        }
        self.input_type = Some(input_type);
        Ok(self)
    }

    /// Output type of every layer, in order. Empty when no input type is set.
    pub fn output_types(&self) -> Result<Vec<InputType>> {
        let Some(mut current) = self.input_type else {
            return Ok(Vec::new());
        };
        let mut types = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            current = layer.output_type(&current)?;
            types.push(current);
        }
        Ok(types)
    }

    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|l| l.num_params()).sum()
    }

    /// Layer table in the style of Keras' `model.summary()`. Output shapes
    /// show as `?` until an input type is set.
    pub fn summary(&self) -> String {
        let output_types = self.output_types().unwrap_or_default();
        let mut res = "\nModel Sequential\n".to_string();
        res.push_str("-------------------------------------------------------------\n");
        res.push_str("Layer (Type)\t\t Output shape\t\t No.of params\n");
        for (i, layer) in self.layers.iter().enumerate() {
            let shape = match output_types.get(i) {
                Some(InputType::FeedForward { size }) => format!("(None, {})", size),
                Some(InputType::Convolutional { height, width, channels }) => {
                    format!("(None, {}, {}, {})", height, width, channels)
                }
                None => "?".to_string(),
            };
            res.push_str(&format!(
                "{} ({})\t\t  {}\t\t  {}\n",
                layer.layer_name(),
                layer.typ(),
                shape,
                layer.num_params()
            ));
        }
        res.push_str("-------------------------------------------------------------\n");
        res.push_str(&format!("Total params: {}\n", self.num_params()));
        res
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let encoded: Vec<u8> = bincode::serialize(self)?;
        File::create(path)?.write_all(&encoded)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut buffer = Vec::new();
        File::open(path)?.read_to_end(&mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layers::{ConvolutionLayer, DenseLayer, FlattenLayer};

    fn model() -> SequentialConfig {
        let conv = ConvolutionLayer::builder()
            .name("conv")
            .n_out(2)
            .kernel_size([3, 3])
            .build()
            .unwrap();
        SequentialConfig::new(vec![
            Layer::Convolution(conv),
            Layer::Flatten(FlattenLayer { layer_name: "flat".into() }),
            Layer::Dense(DenseLayer::new("out", 0, 3, Activation::Sigmoid).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn empty_model_is_rejected() {
        assert!(matches!(SequentialConfig::new(vec![]), Err(NNError::EmptyModel)));
    }

    #[test]
    fn input_sizes_propagate() {
        let m = model()
            .with_input_type(InputType::Convolutional { height: 5, width: 5, channels: 1 })
            .unwrap();
        match &m.layers[2] {
            Layer::Dense(d) => assert_eq!(d.n_in, 3 * 3 * 2),
            other => panic!("unexpected layer {:?}", other),
        }
        assert_eq!(m.num_params(), (9 * 2 + 2) + (18 * 3 + 3));
        let summary = m.summary();
        assert!(summary.contains("conv (Convolution)"));
        assert!(summary.contains("(None, 3)"));
        assert!(summary.contains(&format!("Total params: {}", m.num_params())));
    }

    #[test]
    fn incompatible_input_type_fails() {
        assert!(model()
            .with_input_type(InputType::FeedForward { size: 10 })
            .is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let m = model()
            .with_input_type(InputType::Convolutional { height: 4, width: 4, channels: 3 })
            .unwrap();
        m.save(&path).unwrap();
        assert_eq!(SequentialConfig::load(&path).unwrap(), m);
    }

    #[test]
    fn loaded_layer_with_zero_stride_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        let mut m = model();
        if let Layer::Convolution(conv) = &mut m.layers[0] {
            conv.stride = [0, 1];
        }
        m.save(&path).unwrap();

        let loaded = SequentialConfig::load(&path).unwrap();
        assert!(matches!(
            loaded.with_input_type(InputType::Convolutional { height: 5, width: 5, channels: 1 }),
            Err(NNError::InvalidLayerConfiguration(_))
        ));
    }
}
