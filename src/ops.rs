// src/ops.rs
pub mod array;
pub mod custom;
pub mod executioner;
pub mod merge;
pub mod scalar;
pub mod transforms;

pub use array::{DataType, TypedArray};
pub use custom::{CustomOp, DynamicCustomOp, OpContext, OpDescriptor, ShapeInfo};
pub use executioner::{OpExecutioner, OpRegistry};
