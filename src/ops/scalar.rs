use crate::ops::array::{TypedArray, ANY};
use crate::ops::custom::{CustomOp, OpContext, OpDescriptor, ShapeInfo};
use crate::prelude::*;
use ndarray::ArrayD;

/// Diagnostic op: a `[1, 1]` array holding the first input element plus two.
/// Used to check that the dispatch path works end to end.
pub struct TestScalar;

impl CustomOp for TestScalar {
    fn name(&self) -> &'static str {
        "test_scalar"
    }

    fn descriptor(&self) -> OpDescriptor {
        OpDescriptor {
            num_inputs: 1,
            num_outputs: 1,
            allows_inplace: false,
            min_t_args: 0,
            min_i_args: 0,
            allowed_input_types: ANY,
            allowed_output_types: ANY,
        }
    }

    fn output_shapes(&self, ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
        Ok(vec![ShapeInfo::new(&[1, 1], ctx.input(0)?.data_type())])
    }

    fn execute(&self, ctx: &mut OpContext) -> Result<()> {
        let input = ctx.input(0)?;
        let data_type = input.data_type();
        let first = input
            .first_f64()
            .ok_or_else(|| NNError::op_args(self.name(), "input is empty"))?;
        let value = ArrayD::from_elem(IxDyn(&[1, 1]), first + 2.0);
        ctx.set_output(0, TypedArray::from_f64(value, data_type))
    }
}
