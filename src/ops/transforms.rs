use crate::ops::array::{DataType, TypedArray, ALL_FLOATS, ANY};
use crate::ops::custom::{CustomOp, OpContext, OpDescriptor, ShapeInfo};
use crate::prelude::*;

fn same_shape(ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
    let input = ctx.input(0)?;
    Ok(vec![ShapeInfo::new(input.shape(), input.data_type())])
}

fn unary_descriptor(allowed: &'static [DataType], min_t_args: usize) -> OpDescriptor {
    OpDescriptor {
        num_inputs: 1,
        num_outputs: 1,
        allows_inplace: true,
        min_t_args,
        min_i_args: 0,
        allowed_input_types: allowed,
        allowed_output_types: allowed,
    }
}

/// Element-wise transform shared by the unary ops. Out-of-place calls copy
/// the input into the freshly allocated output first.
fn apply_unary(ctx: &mut OpContext, f: impl Fn(f64) -> f64) -> Result<()> {
    if !ctx.is_inplace() {
        let input = ctx.input(0)?.clone();
        ctx.set_output(0, input)?;
    }
    ctx.output_mut(0)?.map_inplace(f);
    Ok(())
}

pub struct ClipByValue;

impl CustomOp for ClipByValue {
    fn name(&self) -> &'static str {
        "clipbyvalue"
    }

    fn synonyms(&self) -> &'static [&'static str] {
        &["ClipByValue"]
    }

    fn descriptor(&self) -> OpDescriptor {
        unary_descriptor(ANY, 2)
    }

    fn output_shapes(&self, ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
        same_shape(ctx)
    }

    fn execute(&self, ctx: &mut OpContext) -> Result<()> {
        let (min, max) = (ctx.t_args()[0], ctx.t_args()[1]);
        if min.is_nan() || max.is_nan() || min > max {
            return Err(NNError::op_args(
                self.name(),
                format!("clip range [{}, {}] is empty", min, max),
            ));
        }
        apply_unary(ctx, |v| v.clamp(min, max))
    }
}

pub struct Log;

impl CustomOp for Log {
    fn name(&self) -> &'static str {
        "log"
    }

    fn descriptor(&self) -> OpDescriptor {
        unary_descriptor(ALL_FLOATS, 0)
    }

    fn output_shapes(&self, ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
        same_shape(ctx)
    }

    fn execute(&self, ctx: &mut OpContext) -> Result<()> {
        apply_unary(ctx, f64::ln)
    }
}

/// `x * (1 - x)`
pub struct TimesOneMinus;

impl CustomOp for TimesOneMinus {
    fn name(&self) -> &'static str {
        "timesoneminus"
    }

    fn synonyms(&self) -> &'static [&'static str] {
        &["TimesOneMinus"]
    }

    fn descriptor(&self) -> OpDescriptor {
        unary_descriptor(ALL_FLOATS, 0)
    }

    fn output_shapes(&self, ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
        same_shape(ctx)
    }

    fn execute(&self, ctx: &mut OpContext) -> Result<()> {
        apply_unary(ctx, |v| v * (1.0 - v))
    }
}

/// Softmax along the axis given by integer argument 0 (default: last axis,
/// negative values count from the end).
pub struct Softmax;

impl Softmax {
    fn axis(ctx: &OpContext, rank: usize) -> Result<usize> {
        let dim = ctx.i_args().first().copied().unwrap_or(-1);
        let resolved = if dim < 0 { rank as i64 + dim } else { dim };
        if rank == 0 || resolved < 0 || resolved >= rank as i64 {
            return Err(NNError::op_args(
                "softmax",
                format!("dimension {} is out of range for rank {}", dim, rank),
            ));
        }
        Ok(resolved as usize)
    }
}

impl CustomOp for Softmax {
    fn name(&self) -> &'static str {
        "softmax"
    }

    fn synonyms(&self) -> &'static [&'static str] {
        &["SoftMax"]
    }

    fn descriptor(&self) -> OpDescriptor {
        unary_descriptor(ALL_FLOATS, 0)
    }

    fn output_shapes(&self, ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
        let input = ctx.input(0)?;
        Self::axis(ctx, input.shape().len())?;
        same_shape(ctx)
    }

    fn execute(&self, ctx: &mut OpContext) -> Result<()> {
        let input = ctx.input(0)?;
        let data_type = input.data_type();
        let mut x = input.to_f64();
        let axis = Self::axis(ctx, x.ndim())?;

        for mut lane in x.lanes_mut(Axis(axis)) {
            let max = lane.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            lane.mapv_inplace(|v| (v - max).exp());
            let sum = lane.sum();
            lane.mapv_inplace(|v| v / sum);
        }
        ctx.set_output(0, TypedArray::from_f64(x, data_type))
    }
}
