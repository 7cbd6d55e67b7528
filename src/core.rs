// src/core.rs
pub mod activations;
pub mod layers;
pub mod losses;
pub mod masking;
pub mod regularization;

// Re-export commonly used items
pub use activations::Activation;
pub use layers::{
    CnnDataFormat, ConvolutionLayer, ConvolutionMode, Dense, DenseLayer, FlattenLayer, InputType, Layer, LayerConfig,
};
pub use losses::{Loss, LossBinaryXent, LossFunction, LossMse};
pub use masking::{apply_mask, is_per_output_masking};
pub use regularization::{Dropout, Regularizer, WeightInit};
