use crate::ops::array::{DataType, TypedArray, ALL_INDICES, INTS_AND_FLOATS};
use crate::ops::custom::{CustomOp, OpContext, OpDescriptor, ShapeInfo};
use crate::prelude::*;
use ndarray::ArrayD;
use rayon::prelude::*;

/// For every position, the index of the input holding the largest value.
/// Ties go to the lowest input index.
pub struct MergeMaxIndex;

impl MergeMaxIndex {
    fn validate_input_dimensions_match(ctx: &OpContext) -> Result<()> {
        let inputs = ctx.inputs()?;
        let first = inputs[0].shape();
        for (i, input) in inputs.iter().enumerate().skip(1) {
            if input.shape() != first {
                return Err(NNError::ShapeMismatch(format!(
                    "mergemaxindex input {} has shape {:?}, expected {:?}",
                    i,
                    input.shape(),
                    first
                )));
            }
        }
        Ok(())
    }

    fn output_type(ctx: &OpContext) -> Result<DataType> {
        let data_type = match ctx.i_args().first() {
            Some(&code) => DataType::from_code(code)?,
            None => DataType::I32,
        };
        if !ALL_INDICES.contains(&data_type) {
            return Err(NNError::InvalidDataType(format!(
                "mergemaxindex output must be an index type, got {:?}",
                data_type
            )));
        }
        Ok(data_type)
    }
}

impl CustomOp for MergeMaxIndex {
    fn name(&self) -> &'static str {
        "mergemaxindex"
    }

    fn synonyms(&self) -> &'static [&'static str] {
        &["MergeMaxIndex"]
    }

    fn descriptor(&self) -> OpDescriptor {
        OpDescriptor {
            num_inputs: -1,
            num_outputs: 1,
            allows_inplace: false,
            min_t_args: 0,
            min_i_args: 0,
            allowed_input_types: INTS_AND_FLOATS,
            allowed_output_types: ALL_INDICES,
        }
    }

    fn output_shapes(&self, ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
        Self::validate_input_dimensions_match(ctx)?;
        let shape = ctx.input(0)?.shape();
        Ok(vec![ShapeInfo::new(shape, Self::output_type(ctx)?)])
    }

    fn execute(&self, ctx: &mut OpContext) -> Result<()> {
        Self::validate_input_dimensions_match(ctx)?;
        let data_type = Self::output_type(ctx)?;

        let inputs = ctx.inputs()?;
        let shape = inputs[0].shape().to_vec();
        // standard-layout copies so every input shares one flat index space
        let flat: Vec<Vec<f64>> = inputs
            .iter()
            .map(|a| a.to_f64().iter().copied().collect())
            .collect();
        let len = flat[0].len();

        let indices: Vec<f64> = (0..len)
            .into_par_iter()
            .map(|e| {
                let mut best = 0;
                let mut max = flat[0][e];
                for (i, values) in flat.iter().enumerate().skip(1) {
                    if values[e] > max {
                        max = values[e];
                        best = i;
                    }
                }
                best as f64
            })
            .collect();

        let result = ArrayD::from_shape_vec(shape, indices)?;
        ctx.set_output(0, TypedArray::from_f64(result, data_type))
    }
}

#[cfg(test)]
mod tests {
    use crate::ops::array::{DataType, TypedArray};
    use crate::ops::custom::DynamicCustomOp;
    use crate::ops::executioner::OpExecutioner;
    use crate::prelude::*;
    use ndarray::array;

    #[test]
    fn picks_index_of_largest_input() {
        let op = DynamicCustomOp::builder("mergemaxindex")
            .add_input(array![[1.0, 9.0], [3.0, -1.0]])
            .add_input(array![[2.0, 0.0], [3.0, -2.0]])
            .add_input(array![[0.0, 8.0], [4.0, -3.0]])
            .build();
        let out = OpExecutioner::global().exec_and_return(op).unwrap();
        assert_eq!(out, TypedArray::I32(array![[1, 0], [2, 0]].into_dyn()));
    }

    /// Equal values resolve to the first input holding them.
    #[test]
    fn ties_go_to_lowest_index() {
        let op = DynamicCustomOp::builder("MergeMaxIndex")
            .add_inputs(vec![array![[5.0]], array![[5.0]], array![[5.0]]])
            .build();
        let out = OpExecutioner::global().exec_and_return(op).unwrap();
        assert_eq!(out, TypedArray::I32(array![[0]].into_dyn()));
    }

    #[test]
    fn output_type_from_integer_argument() {
        let a = TypedArray::I64(array![1, 7, 3].into_dyn());
        let b = TypedArray::F32(array![2.0f32, 6.0, 3.5].into_dyn());
        let op = DynamicCustomOp::builder("mergemaxindex")
            .add_input(a)
            .add_input(b)
            .add_integer_arguments(&[DataType::I64.code()])
            .build();
        let out = OpExecutioner::global().exec_and_return(op).unwrap();
        assert_eq!(out, TypedArray::I64(array![1, 0, 1].into_dyn()));
    }

    #[test]
    fn float_output_type_is_rejected() {
        let op = DynamicCustomOp::builder("mergemaxindex")
            .add_input(array![[1.0]])
            .add_integer_arguments(&[DataType::F64.code()])
            .build();
        assert!(matches!(
            OpExecutioner::global().exec(op),
            Err(NNError::InvalidDataType(_))
        ));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let op = DynamicCustomOp::builder("mergemaxindex")
            .add_input(array![[1.0, 2.0]])
            .add_input(array![[1.0], [2.0]])
            .build();
        assert!(matches!(
            OpExecutioner::global().exec(op),
            Err(NNError::ShapeMismatch(_))
        ));
    }
}
