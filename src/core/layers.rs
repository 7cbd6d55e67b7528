use crate::core::activations::Activation;
use crate::core::regularization::{Dropout, Regularizer, WeightInit};
use crate::prelude::*;
use rand::Rng;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    FeedForward { size: usize },
    Convolutional { height: usize, width: usize, channels: usize },
}

impl InputType {
    pub fn flattened_size(&self) -> usize {
        match *self {
            InputType::FeedForward { size } => size,
            InputType::Convolutional { height, width, channels } => height * width * channels,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvolutionMode {
    /// No implicit padding; positions that don't fit the kernel are dropped.
    Truncate,
    /// Output size is `ceil(input / stride)`.
    Same,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CnnDataFormat {
    Nchw,
    #[default]
    Nhwc,
}

pub trait LayerConfig {
    fn layer_name(&self) -> &str;

    fn typ(&self) -> String;

    fn output_type(&self, input: &InputType) -> Result<InputType>;

    /// Sets the number of inputs from the type of the incoming activations.
    fn set_n_in(&mut self, input: &InputType) -> Result<()>;

    fn num_params(&self) -> usize;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DenseLayer {
    pub layer_name: String,
    pub n_in: usize,
    pub n_out: usize,
    pub activation: Activation,
    pub weight_init: WeightInit,
    pub regularization: Vec<Regularizer>,
    pub dropout: Option<Dropout>,
    pub has_bias: bool,
}

impl DenseLayer {
    pub fn new(layer_name: &str, n_in: usize, n_out: usize, activation: Activation) -> Result<Self> {
        if n_out == 0 {
            return Err(NNError::InvalidLayerConfiguration(
                "Layer dimensions must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            layer_name: layer_name.to_string(),
            n_in,
            n_out,
            activation,
            weight_init: WeightInit::Xavier,
            regularization: Vec::new(),
            dropout: None,
            has_bias: true,
        })
    }

    /// Draws initial parameters for this configuration.
    pub fn instantiate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Dense> {
        if self.n_in == 0 {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "layer {} has no input size; set n_in first",
                self.layer_name
            )));
        }
        Ok(Dense {
            w: self.weight_init.init(self.n_in, self.n_out, (self.n_in, self.n_out), rng)?,
            b: Array2::zeros((1, self.n_out)),
            activation: self.activation,
        })
    }
}

impl LayerConfig for DenseLayer {
    fn layer_name(&self) -> &str {
        &self.layer_name
    }

    fn typ(&self) -> String {
        "Dense".into()
    }

    fn output_type(&self, input: &InputType) -> Result<InputType> {
        match input {
            InputType::FeedForward { .. } => Ok(InputType::FeedForward { size: self.n_out }),
            other => Err(NNError::InvalidLayerConfiguration(format!(
                "dense layer {} expects feed-forward input, got {:?}",
                self.layer_name, other
            ))),
        }
    }

    fn set_n_in(&mut self, input: &InputType) -> Result<()> {
        match input {
            InputType::FeedForward { size } => {
                self.n_in = *size;
                Ok(())
            }
            other => Err(NNError::InvalidLayerConfiguration(format!(
                "dense layer {} expects feed-forward input, got {:?}",
                self.layer_name, other
            ))),
        }
    }

    fn num_params(&self) -> usize {
        self.n_in * self.n_out + if self.has_bias { self.n_out } else { 0 }
    }
}

/// Parameters of a fully connected layer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dense {
    pub w: Array2<f64>,
    pub b: Array2<f64>,
    pub activation: Activation,
}

impl Dense {
    /// Returns `(z, a)`: the pre-activation and the activation.
    pub fn forward(&self, a: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        if a.ncols() != self.w.nrows() {
            return Err(NNError::ShapeMismatch(format!(
                "input has {} columns, layer expects {}",
                a.ncols(),
                self.w.nrows()
            )));
        }
        let z = a.dot(&self.w) + &self.b;
        let a = self.activation.forward(&z)?;
        Ok((z, a))
    }

    /// Returns `(dw, db, epsilon_prev)` given `epsilon = dL/da` for this layer.
    pub fn backward(
        &self,
        z: &Array2<f64>,
        a_prev: &Array2<f64>,
        epsilon: &Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>, Array2<f64>)> {
        let dz = self.activation.backprop(z, epsilon)?;
        let dw = a_prev.t().dot(&dz);
        let db = dz.sum_axis(Axis(0)).insert_axis(Axis(0));
        let da = dz.dot(&self.w.t());
        Ok((dw, db, da))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConvolutionLayer {
    pub layer_name: String,
    pub n_in: usize,
    pub n_out: usize,
    pub kernel_size: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub convolution_mode: ConvolutionMode,
    pub activation: Activation,
    pub weight_init: WeightInit,
    pub regularization: Vec<Regularizer>,
    pub dropout: Option<Dropout>,
    pub has_bias: bool,
    pub data_format: CnnDataFormat,
}

impl ConvolutionLayer {
    pub fn builder() -> ConvolutionLayerBuilder {
        ConvolutionLayerBuilder::default()
    }

    pub fn l1(&self) -> f64 {
        self.regularization
            .iter()
            .filter_map(|r| match r {
                Regularizer::L1(v) => Some(*v),
                _ => None,
            })
            .sum()
    }

    pub fn l2(&self) -> f64 {
        self.regularization
            .iter()
            .filter_map(|r| match r {
                Regularizer::L2(v) => Some(*v),
                _ => None,
            })
            .sum()
    }

    /// Kernel size, stride and dilation must all be positive.
    fn check_geometry(&self) -> Result<()> {
        for (what, values) in [
            ("kernel size", self.kernel_size),
            ("stride", self.stride),
            ("dilation", self.dilation),
        ] {
            if values.contains(&0) {
                return Err(NNError::InvalidLayerConfiguration(format!(
                    "convolution layer {}: {} must be positive, got {:?}",
                    self.layer_name, what, values
                )));
            }
        }
        Ok(())
    }

    /// Spatial output size along one axis.
    pub fn output_size(&self, input: usize, axis: usize) -> Result<usize> {
        self.check_geometry()?;
        let (k, s, p, d) = (
            self.kernel_size[axis],
            self.stride[axis],
            self.padding[axis],
            self.dilation[axis],
        );
        match self.convolution_mode {
            ConvolutionMode::Same => Ok(input.div_ceil(s)),
            ConvolutionMode::Truncate => {
                let effective_kernel = (k - 1) * d + 1;
                let padded = input + 2 * p;
                if effective_kernel > padded {
                    return Err(NNError::InvalidLayerConfiguration(format!(
                        "layer {}: effective kernel size {} exceeds padded input size {} on axis {}",
                        self.layer_name, effective_kernel, padded, axis
                    )));
                }
                Ok((padded - effective_kernel) / s + 1)
            }
        }
    }
}

impl LayerConfig for ConvolutionLayer {
    fn layer_name(&self) -> &str {
        &self.layer_name
    }

    fn typ(&self) -> String {
        "Convolution".into()
    }

    fn output_type(&self, input: &InputType) -> Result<InputType> {
        match *input {
            InputType::Convolutional { height, width, .. } => Ok(InputType::Convolutional {
                height: self.output_size(height, 0)?,
                width: self.output_size(width, 1)?,
                channels: self.n_out,
            }),
            other => Err(NNError::InvalidLayerConfiguration(format!(
                "convolution layer {} expects convolutional input, got {:?}",
                self.layer_name, other
            ))),
        }
    }

    fn set_n_in(&mut self, input: &InputType) -> Result<()> {
        match *input {
            InputType::Convolutional { channels, .. } => {
                self.n_in = channels;
                Ok(())
            }
            other => Err(NNError::InvalidLayerConfiguration(format!(
                "convolution layer {} expects convolutional input, got {:?}",
                self.layer_name, other
            ))),
        }
    }

    fn num_params(&self) -> usize {
        let weights = self.n_in * self.n_out * self.kernel_size[0] * self.kernel_size[1];
        weights + if self.has_bias { self.n_out } else { 0 }
    }
}

pub struct ConvolutionLayerBuilder {
    layer: ConvolutionLayer,
}

impl Default for ConvolutionLayerBuilder {
    fn default() -> Self {
        Self {
            layer: ConvolutionLayer {
                layer_name: String::new(),
                n_in: 0,
                n_out: 0,
                kernel_size: [5, 5],
                stride: [1, 1],
                padding: [0, 0],
                dilation: [1, 1],
                convolution_mode: ConvolutionMode::Truncate,
                activation: Activation::Identity,
                weight_init: WeightInit::Xavier,
                regularization: Vec::new(),
                dropout: None,
                has_bias: true,
                data_format: CnnDataFormat::Nhwc,
            },
        }
    }
}

impl ConvolutionLayerBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.layer.layer_name = name.to_string();
        self
    }

    pub fn n_in(mut self, n_in: usize) -> Self {
        self.layer.n_in = n_in;
        self
    }

    pub fn n_out(mut self, n_out: usize) -> Self {
        self.layer.n_out = n_out;
        self
    }

    pub fn kernel_size(mut self, kernel_size: [usize; 2]) -> Self {
        self.layer.kernel_size = kernel_size;
        self
    }

    pub fn stride(mut self, stride: [usize; 2]) -> Self {
        self.layer.stride = stride;
        self
    }

    pub fn padding(mut self, padding: [usize; 2]) -> Self {
        self.layer.padding = padding;
        self
    }

    pub fn dilation(mut self, dilation: [usize; 2]) -> Self {
        self.layer.dilation = dilation;
        self
    }

    pub fn convolution_mode(mut self, mode: ConvolutionMode) -> Self {
        self.layer.convolution_mode = mode;
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.layer.activation = activation;
        self
    }

    pub fn weight_init(mut self, weight_init: WeightInit) -> Self {
        self.layer.weight_init = weight_init;
        self
    }

    pub fn regularization(mut self, regularization: Vec<Regularizer>) -> Self {
        self.layer.regularization = regularization;
        self
    }

    pub fn dropout(mut self, dropout: Option<Dropout>) -> Self {
        self.layer.dropout = dropout;
        self
    }

    pub fn has_bias(mut self, has_bias: bool) -> Self {
        self.layer.has_bias = has_bias;
        self
    }

    pub fn data_format(mut self, data_format: CnnDataFormat) -> Self {
        self.layer.data_format = data_format;
        self
    }

    pub fn build(self) -> Result<ConvolutionLayer> {
        let layer = self.layer;
        if layer.n_out == 0 {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "convolution layer {} needs n_out > 0",
                layer.layer_name
            )));
        }
        layer.check_geometry()?;
        Ok(layer)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlattenLayer {
    pub layer_name: String,
}

impl LayerConfig for FlattenLayer {
    fn layer_name(&self) -> &str {
        &self.layer_name
    }

    fn typ(&self) -> String {
        "Flatten".into()
    }

    fn output_type(&self, input: &InputType) -> Result<InputType> {
        Ok(InputType::FeedForward {
            size: input.flattened_size(),
        })
    }

    fn set_n_in(&mut self, _input: &InputType) -> Result<()> {
        Ok(())
    }

    fn num_params(&self) -> usize {
        0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Layer {
    Dense(DenseLayer),
    Convolution(ConvolutionLayer),
    Flatten(FlattenLayer),
}

impl Layer {
    fn inner(&self) -> &dyn LayerConfig {
        match self {
            Layer::Dense(l) => l,
            Layer::Convolution(l) => l,
            Layer::Flatten(l) => l,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn LayerConfig {
        match self {
            Layer::Dense(l) => l,
            Layer::Convolution(l) => l,
            Layer::Flatten(l) => l,
        }
    }
}

impl LayerConfig for Layer {
    fn layer_name(&self) -> &str {
        self.inner().layer_name()
    }

    fn typ(&self) -> String {
        self.inner().typ()
    }

    fn output_type(&self, input: &InputType) -> Result<InputType> {
        self.inner().output_type(input)
    }

    fn set_n_in(&mut self, input: &InputType) -> Result<()> {
        self.inner_mut().set_n_in(input)
    }

    fn num_params(&self) -> usize {
        self.inner().num_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn conv(mode: ConvolutionMode) -> ConvolutionLayer {
        ConvolutionLayer::builder()
            .name("conv")
            .n_out(8)
            .kernel_size([3, 3])
            .stride([2, 2])
            .convolution_mode(mode)
            .build()
            .unwrap()
    }

    #[test]
    fn truncate_output_size() {
        let layer = conv(ConvolutionMode::Truncate);
        let out = layer
            .output_type(&InputType::Convolutional { height: 28, width: 27, channels: 1 })
            .unwrap();
        assert_eq!(out, InputType::Convolutional { height: 13, width: 13, channels: 8 });
    }

    #[test]
    fn same_output_size() {
        let layer = conv(ConvolutionMode::Same);
        let out = layer
            .output_type(&InputType::Convolutional { height: 28, width: 27, channels: 1 })
            .unwrap();
        assert_eq!(out, InputType::Convolutional { height: 14, width: 14, channels: 8 });
    }

    #[test]
    fn dilation_grows_effective_kernel() {
        let mut layer = conv(ConvolutionMode::Truncate);
        layer.dilation = [3, 3];
        // effective kernel 7: (10 - 7) / 2 + 1
        assert_eq!(layer.output_size(10, 0).unwrap(), 2);
        assert!(layer.output_size(6, 0).is_err());
    }

    #[test]
    fn builder_rejects_zero_sizes() {
        assert!(ConvolutionLayer::builder().name("c").n_out(0).build().is_err());
        assert!(ConvolutionLayer::builder().name("c").n_out(3).stride([0, 1]).build().is_err());
    }

    #[test]
    fn zero_sizes_set_after_build_are_errors() {
        for mode in [ConvolutionMode::Truncate, ConvolutionMode::Same] {
            let mut layer = conv(mode);
            layer.stride = [0, 1];
            assert!(matches!(
                layer.output_type(&InputType::Convolutional { height: 5, width: 5, channels: 1 }),
                Err(NNError::InvalidLayerConfiguration(_))
            ));
        }
        let mut layer = conv(ConvolutionMode::Truncate);
        layer.kernel_size = [0, 3];
        assert!(layer.output_size(5, 0).is_err());
    }

    #[test]
    fn param_counts() {
        let mut layer = conv(ConvolutionMode::Truncate);
        layer
            .set_n_in(&InputType::Convolutional { height: 5, width: 5, channels: 3 })
            .unwrap();
        assert_eq!(layer.num_params(), 3 * 8 * 9 + 8);

        let dense = DenseLayer::new("d", 4, 2, Activation::Relu).unwrap();
        assert_eq!(dense.num_params(), 10);
    }

    #[test]
    fn flatten_then_dense() {
        let flatten = Layer::Flatten(FlattenLayer { layer_name: "f".into() });
        let out = flatten
            .output_type(&InputType::Convolutional { height: 2, width: 3, channels: 4 })
            .unwrap();
        assert_eq!(out, InputType::FeedForward { size: 24 });

        let mut dense = Layer::Dense(DenseLayer::new("d", 0, 5, Activation::Sigmoid).unwrap());
        dense.set_n_in(&out).unwrap();
        assert_eq!(dense.num_params(), 24 * 5 + 5);
        assert!(dense
            .output_type(&InputType::Convolutional { height: 1, width: 1, channels: 1 })
            .is_err());
    }

    /// Backward pass agrees with finite differences of a squared-sum objective.
    #[test]
    fn dense_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let config = DenseLayer::new("d", 3, 2, Activation::Tanh).unwrap();
        let layer = config.instantiate(&mut rng).unwrap();
        let x = array![[0.1, -0.4, 0.7], [0.5, 0.2, -0.3]];

        let objective = |layer: &Dense| -> f64 {
            let (_, a) = layer.forward(&x).unwrap();
            a.mapv(|v| 0.5 * v * v).sum()
        };

        let (z, a) = layer.forward(&x).unwrap();
        let (dw, _, _) = layer.backward(&z, &x, &a).unwrap();

        let h = 1e-6;
        for ((i, j), g) in dw.indexed_iter() {
            let mut plus = layer.clone();
            plus.w[[i, j]] += h;
            let mut minus = layer.clone();
            minus.w[[i, j]] -= h;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * h);
            assert_abs_diff_eq!(*g, numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn instantiate_requires_input_size() {
        let mut rng = StdRng::seed_from_u64(0);
        let config = DenseLayer::new("d", 0, 2, Activation::Identity).unwrap();
        assert!(config.instantiate(&mut rng).is_err());
    }
}
