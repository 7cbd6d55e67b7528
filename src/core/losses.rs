use crate::core::masking::{apply_mask, is_per_output_masking};
use crate::ops::{DynamicCustomOp, OpExecutioner};
use crate::prelude::*;
use std::convert::TryFrom;
use std::fmt;

/// Score and gradient of a loss over `[minibatch, nOut]` arrays.
///
/// `pre_output` is the layer output *before* `activation` is applied; the
/// gradient is taken with respect to it. `mask` is either `[minibatch, 1]`
/// (per-example) or the shape of `labels` (per-output).
pub trait LossFunction {
    fn compute_score(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
        average: bool,
    ) -> Result<f64>;

    /// Per-example scores, shape `[minibatch, 1]`.
    fn compute_score_array(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>>;

    fn compute_gradient(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>>;

    fn compute_gradient_and_score(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
        average: bool,
    ) -> Result<(f64, Array2<f64>)> {
        Ok((
            self.compute_score(labels, pre_output, activation, mask, average)?,
            self.compute_gradient(labels, pre_output, activation, mask)?,
        ))
    }

    fn name(&self) -> String;
}

fn check_shapes(labels: &Array2<f64>, pre_output: &Array2<f64>) -> Result<()> {
    if labels.shape() != pre_output.shape() {
        return Err(NNError::ShapeMismatch(format!(
            "Labels and preOutput must have equal shapes: got shapes {:?} vs {:?}",
            labels.shape(),
            pre_output.shape()
        )));
    }
    Ok(())
}

fn negated_row_sums(score: &Array2<f64>) -> Array2<f64> {
    -score.sum_axis(Axis(1)).insert_axis(Axis(1))
}

pub const DEFAULT_CLIPPING_EPSILON: f64 = 1e-5;

/// Binary cross entropy, optionally weighted per output.
///
/// Probabilities are clipped into `[clip_eps, 1 - clip_eps]` before taking
/// logs. A weight vector of ones gives the same results as no weights.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "BinaryXentConfig", into = "BinaryXentConfig")]
pub struct LossBinaryXent {
    weights: Option<Array1<f64>>,
    clip_eps: f64,
}

impl Default for LossBinaryXent {
    fn default() -> Self {
        Self {
            weights: None,
            clip_eps: DEFAULT_CLIPPING_EPSILON,
        }
    }
}

impl LossBinaryXent {
    pub fn new() -> Self {
        Self::default()
    }

    /// `weights` holds one entry per output column.
    pub fn with_weights(weights: Array1<f64>) -> Result<Self> {
        Self::with_clip_eps_and_weights(DEFAULT_CLIPPING_EPSILON, Some(weights))
    }

    pub fn with_clip_eps(clip_eps: f64) -> Result<Self> {
        Self::with_clip_eps_and_weights(clip_eps, None)
    }

    pub fn with_clip_eps_and_weights(clip_eps: f64, weights: Option<Array1<f64>>) -> Result<Self> {
        if !(0.0..=0.5).contains(&clip_eps) {
            return Err(NNError::InvalidLossConfiguration(format!(
                "Invalid clipping epsilon value: epsilon should be >= 0 (but near zero). Got: {}",
                clip_eps
            )));
        }
        Ok(Self { weights, clip_eps })
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    pub fn clip_eps(&self) -> f64 {
        self.clip_eps
    }

    fn check_weights(&self, n_out: usize) -> Result<Option<&Array1<f64>>> {
        match &self.weights {
            Some(w) if w.len() != n_out => Err(NNError::ShapeMismatch(format!(
                "Weights vector (length {}) does not match output.size(1)={}",
                w.len(),
                n_out
            ))),
            other => Ok(other.as_ref()),
        }
    }

    /// Activation output, clipped in place by the `clipbyvalue` op.
    fn activate_and_clip(&self, pre_output: &Array2<f64>, activation: Activation) -> Result<Array2<f64>> {
        let output = activation.forward(pre_output)?;
        if self.clip_eps <= 0.0 {
            return Ok(output);
        }
        let op = DynamicCustomOp::builder("clipbyvalue")
            .add_input(output)
            .call_inplace(true)
            .add_float_arguments(&[self.clip_eps, 1.0 - self.clip_eps])
            .build();
        OpExecutioner::global().exec_and_return(op)?.into_array2()
    }

    fn log_softmax(pre_output: &Array2<f64>) -> Result<Array2<f64>> {
        let executioner = OpExecutioner::global();
        let softmax = executioner.exec_and_return(
            DynamicCustomOp::builder("softmax")
                .add_input(pre_output.clone())
                .add_integer_arguments(&[-1])
                .build(),
        )?;
        executioner
            .exec_and_return(
                DynamicCustomOp::builder("log")
                    .add_input(softmax)
                    .call_inplace(true)
                    .build(),
            )?
            .into_array2()
    }

    fn score_array(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        check_shapes(labels, pre_output)?;

        let mut score = if activation == Activation::Softmax {
            Self::log_softmax(pre_output)? * labels
        } else {
            let output = self.activate_and_clip(pre_output, activation)?;
            let first = output.mapv(f64::ln) * labels;
            let second = output.mapv(|o| (1.0 - o).ln()) * labels.mapv(|l| 1.0 - l);
            first + second
        };

        if let Some(w) = self.check_weights(pre_output.ncols())? {
            score *= w;
        }
        if let Some(mask) = mask {
            apply_mask(&mut score, mask)?;
        }
        Ok(score)
    }
}

impl LossFunction for LossBinaryXent {
    fn compute_score(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
        average: bool,
    ) -> Result<f64> {
        let score_arr = self.score_array(labels, pre_output, activation, mask)?;
        let mut score = -score_arr.sum();
        if average {
            score /= score_arr.nrows() as f64;
        }
        Ok(score)
    }

    fn compute_score_array(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let score_arr = self.score_array(labels, pre_output, activation, mask)?;
        Ok(negated_row_sums(&score_arr))
    }

    fn compute_gradient(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        check_shapes(labels, pre_output)?;

        let output = self.activate_and_clip(pre_output, activation)?;
        let numerator = &output - labels;
        // output * (1 - output)
        let denominator = OpExecutioner::global()
            .exec_and_return(
                DynamicCustomOp::builder("timesoneminus")
                    .add_input(output)
                    .call_inplace(true)
                    .build(),
            )?
            .into_array2()?;
        let mut dl_da = numerator / denominator;

        if let Some(mask) = mask {
            // softmax mixes outputs, so dL/da needs masking as well as dL/dz
            if is_per_output_masking(&dl_da, mask) {
                apply_mask(&mut dl_da, mask)?;
            }
        }

        let mut grad = activation.backprop(pre_output, &dl_da)?;

        if let Some(w) = self.check_weights(pre_output.ncols())? {
            grad *= w;
        }
        if let Some(mask) = mask {
            apply_mask(&mut grad, mask)?;
        }
        Ok(grad)
    }

    fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LossBinaryXent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.weights {
            None => write!(f, "LossBinaryXENT()"),
            Some(w) => write!(f, "LossBinaryXENT(weights={})", w),
        }
    }
}

/// Serialized form of [`LossBinaryXent`]; deserialization goes through the
/// same validation as the constructors.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinaryXentConfig {
    #[serde(default = "default_clip_eps")]
    clip_eps: f64,
    // always written: bincode can't skip fields
    #[serde(default)]
    weights: Option<Vec<f64>>,
}

fn default_clip_eps() -> f64 {
    DEFAULT_CLIPPING_EPSILON
}

impl TryFrom<BinaryXentConfig> for LossBinaryXent {
    type Error = NNError;

    fn try_from(config: BinaryXentConfig) -> Result<Self> {
        LossBinaryXent::with_clip_eps_and_weights(config.clip_eps, config.weights.map(Array1::from))
    }
}

impl From<LossBinaryXent> for BinaryXentConfig {
    fn from(loss: LossBinaryXent) -> Self {
        BinaryXentConfig {
            clip_eps: loss.clip_eps,
            weights: loss.weights.map(|w| w.to_vec()),
        }
    }
}

/// Mean squared error, averaged over the output columns.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct LossMse;

impl LossMse {
    fn score_array(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        check_shapes(labels, pre_output)?;
        let output = activation.forward(pre_output)?;
        let n_out = labels.ncols().max(1) as f64;
        let mut score = (&output - labels).mapv(|d| d * d / n_out);
        if let Some(mask) = mask {
            apply_mask(&mut score, mask)?;
        }
        Ok(score)
    }
}

impl LossFunction for LossMse {
    fn compute_score(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
        average: bool,
    ) -> Result<f64> {
        let score_arr = self.score_array(labels, pre_output, activation, mask)?;
        let mut score = score_arr.sum();
        if average {
            score /= score_arr.nrows() as f64;
        }
        Ok(score)
    }

    fn compute_score_array(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let score_arr = self.score_array(labels, pre_output, activation, mask)?;
        Ok(score_arr.sum_axis(Axis(1)).insert_axis(Axis(1)))
    }

    fn compute_gradient(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        check_shapes(labels, pre_output)?;
        let output = activation.forward(pre_output)?;
        let n_out = labels.ncols().max(1) as f64;
        let mut dl_da = (&output - labels) * (2.0 / n_out);
        if let Some(mask) = mask {
            if is_per_output_masking(&dl_da, mask) {
                apply_mask(&mut dl_da, mask)?;
            }
        }
        let mut grad = activation.backprop(pre_output, &dl_da)?;
        if let Some(mask) = mask {
            apply_mask(&mut grad, mask)?;
        }
        Ok(grad)
    }

    fn name(&self) -> String {
        "LossMSE()".to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Loss {
    BinaryXent(LossBinaryXent),
    Mse(LossMse),
}

impl Loss {
    fn inner(&self) -> &dyn LossFunction {
        match self {
            Loss::BinaryXent(loss) => loss,
            Loss::Mse(loss) => loss,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl LossFunction for Loss {
    fn compute_score(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
        average: bool,
    ) -> Result<f64> {
        self.inner().compute_score(labels, pre_output, activation, mask, average)
    }

    fn compute_score_array(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        self.inner().compute_score_array(labels, pre_output, activation, mask)
    }

    fn compute_gradient(
        &self,
        labels: &Array2<f64>,
        pre_output: &Array2<f64>,
        activation: Activation,
        mask: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        self.inner().compute_gradient(labels, pre_output, activation, mask)
    }

    fn name(&self) -> String {
        self.inner().name()
    }
}

impl From<LossBinaryXent> for Loss {
    fn from(loss: LossBinaryXent) -> Self {
        Loss::BinaryXent(loss)
    }
}

impl From<LossMse> for Loss {
    fn from(loss: LossMse) -> Self {
        Loss::Mse(loss)
    }
}
