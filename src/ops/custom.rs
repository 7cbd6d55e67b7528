use crate::ops::array::{DataType, TypedArray};
use crate::prelude::*;

/// Static description of a custom op's signature, checked by the executioner
/// before the kernel runs.
#[derive(Debug, Clone, PartialEq)]
pub struct OpDescriptor {
    /// `-1` for a variadic op (at least one input).
    pub num_inputs: i32,
    pub num_outputs: usize,
    pub allows_inplace: bool,
    pub min_t_args: usize,
    pub min_i_args: usize,
    pub allowed_input_types: &'static [DataType],
    pub allowed_output_types: &'static [DataType],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeInfo {
    pub shape: Vec<usize>,
    pub data_type: DataType,
}

impl ShapeInfo {
    pub fn new(shape: &[usize], data_type: DataType) -> Self {
        Self {
            shape: shape.to_vec(),
            data_type,
        }
    }
}

pub trait CustomOp: Send + Sync {
    fn name(&self) -> &'static str;

    fn synonyms(&self) -> &'static [&'static str] {
        &[]
    }

    fn descriptor(&self) -> OpDescriptor;

    fn output_shapes(&self, ctx: &OpContext) -> Result<Vec<ShapeInfo>>;

    fn execute(&self, ctx: &mut OpContext) -> Result<()>;
}

/// Inputs, outputs and arguments of one op invocation.
///
/// For in-place calls the first `num_outputs` inputs are moved into the output
/// slots; `input(i)` still resolves to them, so kernels read and write the same
/// buffer.
#[derive(Debug)]
pub struct OpContext {
    op_name: String,
    inputs: Vec<TypedArray>,
    outputs: Vec<TypedArray>,
    t_args: Vec<f64>,
    i_args: Vec<i64>,
    inplace: bool,
}

impl OpContext {
    pub(crate) fn new(op_name: &str, inputs: Vec<TypedArray>, t_args: Vec<f64>, i_args: Vec<i64>, inplace: bool) -> Self {
        Self {
            op_name: op_name.to_string(),
            inputs,
            outputs: Vec::new(),
            t_args,
            i_args,
            inplace,
        }
    }

    pub fn op_name(&self) -> &str {
        &self.op_name
    }

    pub fn is_inplace(&self) -> bool {
        self.inplace
    }

    pub fn width(&self) -> usize {
        self.inputs.len() + if self.inplace { self.outputs.len() } else { 0 }
    }

    pub fn input(&self, index: usize) -> Result<&TypedArray> {
        let found = if self.inplace {
            if index < self.outputs.len() {
                self.outputs.get(index)
            } else {
                self.inputs.get(index - self.outputs.len())
            }
        } else {
            self.inputs.get(index)
        };
        found.ok_or_else(|| NNError::op_args(&self.op_name, format!("missing input {}", index)))
    }

    pub fn inputs(&self) -> Result<Vec<&TypedArray>> {
        (0..self.width()).map(|i| self.input(i)).collect()
    }

    pub fn output_mut(&mut self, index: usize) -> Result<&mut TypedArray> {
        let name = &self.op_name;
        self.outputs
            .get_mut(index)
            .ok_or_else(|| NNError::op_args(name, format!("missing output {}", index)))
    }

    pub fn set_output(&mut self, index: usize, value: TypedArray) -> Result<()> {
        let name = self.op_name.clone();
        let slot = self.output_mut(index)?;
        if slot.shape() != value.shape() || slot.data_type() != value.data_type() {
            return Err(NNError::ShapeMismatch(format!(
                "op {} produced {:?} {:?} for an output declared as {:?} {:?}",
                name,
                value.data_type(),
                value.shape(),
                slot.data_type(),
                slot.shape()
            )));
        }
        *slot = value;
        Ok(())
    }

    pub fn t_args(&self) -> &[f64] {
        &self.t_args
    }

    pub fn i_args(&self) -> &[i64] {
        &self.i_args
    }

    pub(crate) fn bind_outputs(&mut self, allocated: Vec<TypedArray>) {
        self.outputs = allocated;
    }

    /// Moves the first `count` inputs into the output slots.
    pub(crate) fn bind_inplace_outputs(&mut self, count: usize) {
        self.outputs = self.inputs.drain(..count).collect();
    }

    pub(crate) fn into_outputs(self) -> Vec<TypedArray> {
        self.outputs
    }
}

/// A named op invocation assembled with [`DynamicCustomOp::builder`] and run
/// by an `OpExecutioner`.
#[derive(Debug, Clone)]
pub struct DynamicCustomOp {
    pub(crate) op_name: String,
    pub(crate) inputs: Vec<TypedArray>,
    pub(crate) t_args: Vec<f64>,
    pub(crate) i_args: Vec<i64>,
    pub(crate) inplace: bool,
}

impl DynamicCustomOp {
    pub fn builder(op_name: &str) -> DynamicCustomOpBuilder {
        DynamicCustomOpBuilder {
            op: DynamicCustomOp {
                op_name: op_name.to_string(),
                inputs: Vec::new(),
                t_args: Vec::new(),
                i_args: Vec::new(),
                inplace: false,
            },
        }
    }

    pub fn op_name(&self) -> &str {
        &self.op_name
    }

    pub fn inputs(&self) -> &[TypedArray] {
        &self.inputs
    }

    pub fn is_inplace(&self) -> bool {
        self.inplace
    }
}

pub struct DynamicCustomOpBuilder {
    op: DynamicCustomOp,
}

impl DynamicCustomOpBuilder {
    pub fn add_input(mut self, input: impl Into<TypedArray>) -> Self {
        self.op.inputs.push(input.into());
        self
    }

    pub fn add_inputs<I, T>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypedArray>,
    {
        self.op.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn call_inplace(mut self, inplace: bool) -> Self {
        self.op.inplace = inplace;
        self
    }

    pub fn add_float_arguments(mut self, args: &[f64]) -> Self {
        self.op.t_args.extend_from_slice(args);
        self
    }

    pub fn add_integer_arguments(mut self, args: &[i64]) -> Self {
        self.op.i_args.extend_from_slice(args);
        self
    }

    pub fn build(self) -> DynamicCustomOp {
        self.op
    }
}
