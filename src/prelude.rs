pub use serde::{Deserialize, Serialize};

pub use ndarray::*;

pub use crate::error::*;

// Internal re-exports
pub use crate::core::{Activation, InputType, Layer, LayerConfig, Loss, LossFunction};
