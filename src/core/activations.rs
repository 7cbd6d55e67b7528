use crate::prelude::*;
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activation {
    Identity,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Softplus,
    HardSigmoid,
    Softsign,
    Elu,
}

impl Activation {
    pub fn forward(&self, z: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(match self {
            Self::Identity => z.clone(),
            Self::Relu => z.mapv(|z| if z > 0.0 { z } else { 0.0 }),
            Self::Sigmoid => z.mapv(sigmoid),
            Self::Tanh => z.mapv(f64::tanh),
            Self::Softmax => softmax_rows(z),
            Self::Softplus => z.mapv(softplus),
            Self::HardSigmoid => z.mapv(|z| (0.2 * z + 0.5).clamp(0.0, 1.0)),
            Self::Softsign => z.mapv(|z| z / (1.0 + z.abs())),
            Self::Elu => z.mapv(|z| if z > 0.0 { z } else { z.exp() - 1.0 }),
        })
    }

    /// Converts `epsilon = dL/da` into `dL/dz` for the pre-activation `z`.
    pub fn backprop(&self, z: &Array2<f64>, epsilon: &Array2<f64>) -> Result<Array2<f64>> {
        if z.shape() != epsilon.shape() {
            return Err(NNError::ShapeMismatch(format!(
                "pre-activation shape {:?} doesn't match epsilon shape {:?}",
                z.shape(),
                epsilon.shape()
            )));
        }

        Ok(match self {
            Self::Identity => epsilon.clone(),
            Self::Softmax => {
                let a = softmax_rows(z);
                let dot = (&a * epsilon).sum_axis(Axis(1)).insert_axis(Axis(1));
                &a * &(epsilon - &dot)
            }
            _ => epsilon * &self.derivative(z),
        })
    }

    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Relu => z.mapv(|z| if z > 0.0 { 1.0 } else { 0.0 }),
            Self::Sigmoid => z.mapv(|z| {
                let s = sigmoid(z);
                s * (1.0 - s)
            }),
            Self::Tanh => z.mapv(|z| {
                let t = z.tanh();
                1.0 - t * t
            }),
            Self::Softplus => z.mapv(sigmoid),
            Self::HardSigmoid => z.mapv(|z| if z > -2.5 && z < 2.5 { 0.2 } else { 0.0 }),
            Self::Softsign => z.mapv(|z| {
                let d = 1.0 + z.abs();
                1.0 / (d * d)
            }),
            Self::Elu => z.mapv(|z| if z > 0.0 { 1.0 } else { z.exp() }),
            Self::Identity | Self::Softmax => Array2::ones(z.raw_dim()),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Identity => "identity",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
            Self::Softplus => "softplus",
            Self::HardSigmoid => "hardsigmoid",
            Self::Softsign => "softsign",
            Self::Elu => "elu",
        };
        f.write_str(name)
    }
}

impl FromStr for Activation {
    type Err = NNError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "identity" => Self::Identity,
            "relu" => Self::Relu,
            "sigmoid" => Self::Sigmoid,
            "tanh" => Self::Tanh,
            "softmax" => Self::Softmax,
            "softplus" => Self::Softplus,
            "hardsigmoid" => Self::HardSigmoid,
            "softsign" => Self::Softsign,
            "elu" => Self::Elu,
            other => return Err(NNError::InvalidActivation(other.to_string())),
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn softplus(z: f64) -> f64 {
    // ln(1 + e^z) without overflow for large z
    if z > 30.0 {
        z
    } else {
        z.exp().ln_1p()
    }
}

/// Row-wise softmax over a `[minibatch, nOut]` array.
pub(crate) fn softmax_rows(z: &Array2<f64>) -> Array2<f64> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const ALL: [Activation; 9] = [
        Activation::Identity,
        Activation::Relu,
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Softmax,
        Activation::Softplus,
        Activation::HardSigmoid,
        Activation::Softsign,
        Activation::Elu,
    ];

    #[test]
    fn softmax_rows_sum_to_one() {
        let z = array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]];
        let a = Activation::Softmax.forward(&z).unwrap();
        for row in a.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(a[[1, 0]], 1.0 / 3.0, epsilon = 1e-12);
    }

    /// Every analytic gradient must agree with central differences of a
    /// weighted sum of the activations.
    #[test]
    fn backprop_matches_finite_differences() {
        let z = array![[0.3, -1.2, 2.0], [-0.4, 0.9, 0.05]];
        let eps = array![[0.5, -1.0, 0.25], [1.5, 0.2, -0.7]];
        let h = 1e-6;

        for act in ALL {
            let analytic = act.backprop(&z, &eps).unwrap();
            for ((i, j), &g) in analytic.indexed_iter() {
                let mut zp = z.clone();
                zp[[i, j]] += h;
                let mut zm = z.clone();
                zm[[i, j]] -= h;
                let fp = (&act.forward(&zp).unwrap() * &eps).sum();
                let fm = (&act.forward(&zm).unwrap() * &eps).sum();
                let numeric = (fp - fm) / (2.0 * h);
                assert_abs_diff_eq!(g, numeric, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn backprop_rejects_mismatched_epsilon() {
        let z = Array2::<f64>::zeros((2, 3));
        let eps = Array2::<f64>::zeros((3, 2));
        assert!(matches!(
            Activation::Sigmoid.backprop(&z, &eps),
            Err(NNError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn names_round_trip() {
        for act in ALL {
            assert_eq!(act.to_string().parse::<Activation>().unwrap(), act);
        }
        assert_eq!(Activation::Identity.to_string(), "identity");
        assert!("swish".parse::<Activation>().is_err());
    }
}
