use thiserror::Error;

#[derive(Debug, Error)]
pub enum NNError {
    // Layer related errors
    #[error("Invalid layer configuration: {0}")]
    InvalidLayerConfiguration(String),
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Model has no layers")]
    EmptyModel,

    // Loss related errors
    #[error("Invalid mask: {0}")]
    InvalidMask(String),
    #[error("Invalid loss function configuration: {0}")]
    InvalidLossConfiguration(String),

    #[error("Invalid activation function: {0}")]
    InvalidActivation(String),

    // Keras import
    #[error("Invalid Keras configuration: {0}")]
    InvalidKerasConfiguration(String),
    #[error("Unsupported Keras configuration: {0}")]
    UnsupportedKerasConfiguration(String),

    // Custom op execution
    #[error("Unknown op: {0}")]
    UnknownOp(String),
    #[error("Op {0} is already registered")]
    DuplicateOp(String),
    #[error("Invalid arguments for op {op}: {msg}")]
    InvalidOpArguments { op: String, msg: String },
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    // File operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl NNError {
    pub(crate) fn op_args(op: &str, msg: impl Into<String>) -> Self {
        NNError::InvalidOpArguments {
            op: op.to_string(),
            msg: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NNError>;
