use crate::prelude::*;
use ndarray_rand::rand_distr::{Bernoulli, Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum Regularizer {
    L1(f64),
    L2(f64),
}

impl Regularizer {
    pub fn penalty(&self, weights: &Array2<f64>) -> f64 {
        match self {
            Regularizer::L1(lambda) => lambda * weights.mapv(f64::abs).sum(),
            Regularizer::L2(lambda) => 0.5 * lambda * weights.mapv(|x| x.powi(2)).sum(),
        }
    }

    /// Gradient of [`Regularizer::penalty`] with respect to `weights`.
    pub fn gradient(&self, weights: &Array2<f64>) -> Array2<f64> {
        match self {
            Regularizer::L1(lambda) => weights.mapv(|w| {
                if w > 0.0 {
                    *lambda
                } else if w < 0.0 {
                    -*lambda
                } else {
                    0.0
                }
            }),
            Regularizer::L2(lambda) => weights * *lambda,
        }
    }
}

pub fn regularization_score(regularization: &[Regularizer], weights: &Array2<f64>) -> f64 {
    regularization.iter().map(|r| r.penalty(weights)).sum()
}

/// Parameter initialisation schemes. Gaussian schemes use the standard
/// deviation noted on each variant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// N(0, sqrt(2 / (fan_in + fan_out)))
    Xavier,
    /// U(-s, s), s = sqrt(6 / (fan_in + fan_out))
    XavierUniform,
    /// N(0, sqrt(2 / fan_in))
    Relu,
    /// U(-s, s), s = sqrt(6 / fan_in)
    ReluUniform,
    /// N(0, sqrt(1 / fan_in))
    LecunNormal,
    /// U(-s, s), s = sqrt(3 / fan_in)
    LecunUniform,
    Zero,
    Ones,
    Uniform { lower: f64, upper: f64 },
    Normal { mean: f64, std: f64 },
}

impl WeightInit {
    pub fn init<R: Rng + ?Sized>(
        &self,
        fan_in: usize,
        fan_out: usize,
        shape: (usize, usize),
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        if fan_in == 0 {
            return Err(NNError::InvalidLayerConfiguration(
                "fan_in must be greater than 0".to_string(),
            ));
        }
        let (fan_in, fan_out) = (fan_in as f64, fan_out as f64);

        Ok(match *self {
            WeightInit::Xavier => gaussian(0.0, (2.0 / (fan_in + fan_out)).sqrt(), shape, rng)?,
            WeightInit::XavierUniform => symmetric_uniform((6.0 / (fan_in + fan_out)).sqrt(), shape, rng),
            WeightInit::Relu => gaussian(0.0, (2.0 / fan_in).sqrt(), shape, rng)?,
            WeightInit::ReluUniform => symmetric_uniform((6.0 / fan_in).sqrt(), shape, rng),
            WeightInit::LecunNormal => gaussian(0.0, (1.0 / fan_in).sqrt(), shape, rng)?,
            WeightInit::LecunUniform => symmetric_uniform((3.0 / fan_in).sqrt(), shape, rng),
            WeightInit::Zero => Array2::zeros(shape),
            WeightInit::Ones => Array2::ones(shape),
            WeightInit::Uniform { lower, upper } => {
                if !(lower < upper) {
                    return Err(NNError::InvalidLayerConfiguration(format!(
                        "uniform init needs lower < upper, got [{}, {}]",
                        lower, upper
                    )));
                }
                Array2::random_using(shape, Uniform::new(lower, upper), rng)
            }
            WeightInit::Normal { mean, std } => gaussian(mean, std, shape, rng)?,
        })
    }
}

fn gaussian<R: Rng + ?Sized>(mean: f64, std: f64, shape: (usize, usize), rng: &mut R) -> Result<Array2<f64>> {
    let dist = Normal::new(mean, std)
        .map_err(|e| NNError::InvalidLayerConfiguration(format!("normal init: {}", e)))?;
    Ok(Array2::random_using(shape, dist, rng))
}

fn symmetric_uniform<R: Rng + ?Sized>(limit: f64, shape: (usize, usize), rng: &mut R) -> Array2<f64> {
    Array2::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
}

/// Inverted dropout. `p` is the probability of *retaining* an activation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    p: f64,
}

impl Dropout {
    pub fn new(p: f64) -> Result<Self> {
        if !(p > 0.0 && p <= 1.0) {
            return Err(NNError::InvalidLayerConfiguration(format!(
                "dropout retain probability must be in (0, 1], got {}",
                p
            )));
        }
        Ok(Self { p })
    }

    pub fn retain_probability(&self) -> f64 {
        self.p
    }

    pub fn apply<R: Rng + ?Sized>(&self, input: &Array2<f64>, rng: &mut R) -> Result<Array2<f64>> {
        if self.p >= 1.0 {
            return Ok(input.clone());
        }
        let bernoulli = Bernoulli::new(self.p)
            .map_err(|e| NNError::InvalidLayerConfiguration(format!("dropout: {}", e)))?;
        let keep = Array2::random_using(input.raw_dim(), bernoulli, rng);
        let scale = 1.0 / self.p;
        Ok(ndarray::Zip::from(input)
            .and(&keep)
            .map_collect(|&x, &k| if k { x * scale } else { 0.0 }))
    }
}
