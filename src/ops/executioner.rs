use crate::ops::array::TypedArray;
use crate::ops::custom::{CustomOp, DynamicCustomOp, OpContext, ShapeInfo};
use crate::ops::{merge, scalar, transforms};
use crate::prelude::*;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Default, Clone)]
pub struct OpRegistry {
    ops: HashMap<String, Arc<dyn CustomOp>>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in op.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let builtins: Vec<Arc<dyn CustomOp>> = vec![
            Arc::new(transforms::ClipByValue),
            Arc::new(transforms::Log),
            Arc::new(transforms::TimesOneMinus),
            Arc::new(transforms::Softmax),
            Arc::new(merge::MergeMaxIndex),
            Arc::new(scalar::TestScalar),
        ];
        for op in builtins {
            // names are unique among the built-ins
            if let Err(err) = registry.register(op) {
                log::error!("failed to register built-in op: {}", err);
            }
        }
        registry
    }

    pub fn register(&mut self, op: Arc<dyn CustomOp>) -> Result<()> {
        let names: Vec<&str> = std::iter::once(op.name()).chain(op.synonyms().iter().copied()).collect();
        if let Some(taken) = names.iter().find(|n| self.ops.contains_key(**n)) {
            return Err(NNError::DuplicateOp(taken.to_string()));
        }
        for name in names {
            self.ops.insert(name.to_string(), op.clone());
        }
        Ok(())
    }

    /// Looks an op up by name or synonym, falling back to a case-insensitive match.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomOp>> {
        self.ops.get(name).cloned().or_else(|| {
            self.ops
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, op)| op.clone())
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

pub struct OpExecutioner {
    registry: OpRegistry,
}

static GLOBAL: OnceLock<OpExecutioner> = OnceLock::new();

impl OpExecutioner {
    pub fn new(registry: OpRegistry) -> Self {
        Self { registry }
    }

    /// Process-wide executioner over the built-in registry.
    pub fn global() -> &'static OpExecutioner {
        GLOBAL.get_or_init(|| OpExecutioner::new(OpRegistry::builtin()))
    }

    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }

    pub fn calculate_output_shape(&self, op: &DynamicCustomOp) -> Result<Vec<ShapeInfo>> {
        let custom = self.lookup(op.op_name())?;
        let ctx = OpContext::new(
            custom.name(),
            op.inputs.clone(),
            op.t_args.clone(),
            op.i_args.clone(),
            false,
        );
        self.validate(custom.as_ref(), &ctx, op.inplace)?;
        self.checked_output_shapes(custom.as_ref(), &ctx)
    }

    /// Runs `op` and returns its outputs. For in-place calls the returned
    /// arrays are the (mutated) leading inputs.
    pub fn exec(&self, op: DynamicCustomOp) -> Result<Vec<TypedArray>> {
        let custom = self.lookup(&op.op_name)?;
        let DynamicCustomOp {
            inputs,
            t_args,
            i_args,
            inplace,
            ..
        } = op;
        let mut ctx = OpContext::new(custom.name(), inputs, t_args, i_args, inplace);
        self.validate(custom.as_ref(), &ctx, inplace)?;
        let shapes = self.checked_output_shapes(custom.as_ref(), &ctx)?;

        debug!(
            "executing op {} with {} inputs (inplace: {})",
            custom.name(),
            ctx.width(),
            inplace
        );

        if inplace {
            for (i, info) in shapes.iter().enumerate() {
                let input = ctx.input(i)?;
                if input.shape() != info.shape.as_slice() || input.data_type() != info.data_type {
                    return Err(NNError::op_args(
                        custom.name(),
                        format!(
                            "in-place output {} would change {:?} {:?} to {:?} {:?}",
                            i,
                            input.data_type(),
                            input.shape(),
                            info.data_type,
                            info.shape
                        ),
                    ));
                }
            }
            ctx.bind_inplace_outputs(shapes.len());
        } else {
            ctx.bind_outputs(
                shapes
                    .iter()
                    .map(|info| TypedArray::zeros(&info.shape, info.data_type))
                    .collect(),
            );
        }

        custom.execute(&mut ctx)?;
        Ok(ctx.into_outputs())
    }

    /// Runs `op` and returns its first output.
    pub fn exec_and_return(&self, op: DynamicCustomOp) -> Result<TypedArray> {
        let name = op.op_name.clone();
        self.exec(op)?
            .into_iter()
            .next()
            .ok_or_else(|| NNError::op_args(&name, "op produced no outputs"))
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn CustomOp>> {
        self.registry
            .get(name)
            .ok_or_else(|| NNError::UnknownOp(name.to_string()))
    }

    fn validate(&self, op: &dyn CustomOp, ctx: &OpContext, inplace: bool) -> Result<()> {
        let desc = op.descriptor();
        let name = op.name();
        let width = ctx.width();

        if desc.num_inputs < 0 {
            if width == 0 {
                return Err(NNError::op_args(name, "expected at least one input"));
            }
        } else if width != desc.num_inputs as usize {
            return Err(NNError::op_args(
                name,
                format!("expected {} inputs, got {}", desc.num_inputs, width),
            ));
        }

        if ctx.t_args().len() < desc.min_t_args {
            return Err(NNError::op_args(
                name,
                format!("expected at least {} float arguments, got {}", desc.min_t_args, ctx.t_args().len()),
            ));
        }
        if ctx.i_args().len() < desc.min_i_args {
            return Err(NNError::op_args(
                name,
                format!("expected at least {} integer arguments, got {}", desc.min_i_args, ctx.i_args().len()),
            ));
        }

        for (i, input) in ctx.inputs()?.into_iter().enumerate() {
            if !desc.allowed_input_types.contains(&input.data_type()) {
                return Err(NNError::InvalidDataType(format!(
                    "op {} does not accept {:?} for input {}",
                    name,
                    input.data_type(),
                    i
                )));
            }
        }

        if inplace {
            if !desc.allows_inplace {
                return Err(NNError::op_args(name, "op cannot be executed in place"));
            }
            if width < desc.num_outputs {
                return Err(NNError::op_args(name, "not enough inputs to hold in-place outputs"));
            }
        }
        Ok(())
    }

    fn checked_output_shapes(&self, op: &dyn CustomOp, ctx: &OpContext) -> Result<Vec<ShapeInfo>> {
        let desc = op.descriptor();
        let shapes = op.output_shapes(ctx)?;
        if shapes.len() != desc.num_outputs {
            return Err(NNError::op_args(
                op.name(),
                format!("expected {} outputs, shape function produced {}", desc.num_outputs, shapes.len()),
            ));
        }
        for info in &shapes {
            if !desc.allowed_output_types.contains(&info.data_type) {
                return Err(NNError::InvalidDataType(format!(
                    "op {} cannot produce {:?}",
                    op.name(),
                    info.data_type
                )));
            }
        }
        Ok(shapes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::array::DataType;
    use ndarray::array;

    #[test]
    fn builtin_registry_resolves_names_and_synonyms() {
        let registry = OpRegistry::builtin();
        assert!(registry.contains("clipbyvalue"));
        assert!(registry.contains("mergemaxindex"));
        assert!(registry.contains("MergeMaxIndex"));
        assert!(registry.contains("TimesOneMinus"));
        assert!(!registry.contains("conv2d"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = OpRegistry::builtin();
        let err = registry.register(Arc::new(transforms::ClipByValue)).unwrap_err();
        assert!(matches!(err, NNError::DuplicateOp(name) if name == "clipbyvalue"));
    }

    #[test]
    fn unknown_op_is_an_error() {
        let op = DynamicCustomOp::builder("no_such_op")
            .add_input(array![[1.0]])
            .build();
        assert!(matches!(
            OpExecutioner::global().exec(op),
            Err(NNError::UnknownOp(_))
        ));
    }

    #[test]
    fn wrong_input_count_is_rejected() {
        let op = DynamicCustomOp::builder("test_scalar")
            .add_inputs(vec![array![[1.0]], array![[2.0]]])
            .build();
        assert!(matches!(
            OpExecutioner::global().exec(op),
            Err(NNError::InvalidOpArguments { .. })
        ));
    }

    #[test]
    fn missing_float_arguments_are_rejected() {
        let op = DynamicCustomOp::builder("clipbyvalue")
            .add_input(array![[1.0]])
            .add_float_arguments(&[0.0])
            .build();
        assert!(matches!(
            OpExecutioner::global().exec(op),
            Err(NNError::InvalidOpArguments { .. })
        ));
    }

    #[test]
    fn inplace_is_rejected_for_ops_that_forbid_it() {
        let op = DynamicCustomOp::builder("mergemaxindex")
            .add_inputs(vec![array![[1.0]], array![[2.0]]])
            .call_inplace(true)
            .build();
        assert!(OpExecutioner::global().exec(op).is_err());
    }

    #[test]
    fn disallowed_input_type_is_rejected() {
        let op = DynamicCustomOp::builder("log")
            .add_input(TypedArray::zeros(&[2], DataType::I32))
            .build();
        assert!(matches!(
            OpExecutioner::global().exec(op),
            Err(NNError::InvalidDataType(_))
        ));
    }

    #[test]
    fn output_shape_is_computed_without_running() {
        let op = DynamicCustomOp::builder("test_scalar")
            .add_input(TypedArray::zeros(&[3, 4], DataType::F32))
            .build();
        let shapes = OpExecutioner::global().calculate_output_shape(&op).unwrap();
        assert_eq!(shapes, vec![ShapeInfo::new(&[1, 1], DataType::F32)]);
    }
}
