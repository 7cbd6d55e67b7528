pub mod core;
pub mod error;
pub mod keras;
pub mod models;
pub mod ops;
pub mod prelude;

// Re-export types
pub use crate::core::{Activation, Layer, Loss, LossBinaryXent, LossFunction, LossMse};
pub use crate::error::{NNError, Result};
pub use crate::keras::{import_keras_layer, import_sequential_config, KerasImportOptions};
pub use crate::models::SequentialConfig;
pub use crate::ops::{DynamicCustomOp, OpExecutioner};
