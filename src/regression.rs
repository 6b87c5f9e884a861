// Linear regression — a small differentiable problem for driving optimizers
//
//   xs ~ N(0, 1)              (samples × features, seeded)
//   ys = Σ_j xs[:, j] * target
//   loss(w) = mean_i ½ (xs_i · w - ys_i)²
//   ∇loss(w) = xsᵀ (xs w - ys) / samples
//
// The gradient is written out analytically; nothing here differentiates
// automatically. Parameters are a tree with a single leaf, `"w"`.

use ndarray::{Array1, Array2, ArrayView1, Axis, Ix1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::error::{Error, Result};
use crate::params::Params;

/// Name of the weight leaf in the parameter tree.
pub const WEIGHTS: &str = "w";

/// A least-squares problem `xs · w ≈ ys`.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    xs: Array2<f64>,
    ys: Array1<f64>,
}

impl LinearRegression {
    /// Build from explicit data. `xs` must have one row per target.
    pub fn new(xs: Array2<f64>, ys: Array1<f64>) -> Result<Self> {
        if xs.nrows() != ys.len() {
            return Err(Error::ShapeMismatch {
                name: "ys".to_string(),
                expected: vec![xs.nrows()],
                got: vec![ys.len()],
            });
        }
        if xs.nrows() == 0 {
            return Err(Error::invalid("linear regression needs at least one sample"));
        }
        Ok(LinearRegression { xs, ys })
    }

    /// Gaussian inputs from a seeded generator, targets `Σ xs * target`.
    pub fn synthetic(seed: u64, samples: usize, features: usize, target: f64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let xs = Array2::from_shape_simple_fn((samples, features), || {
            rng.sample::<f64, _>(StandardNormal)
        });
        let ys = (&xs * target).sum_axis(Axis(1));
        LinearRegression::new(xs, ys)
    }

    pub fn xs(&self) -> &Array2<f64> {
        &self.xs
    }

    pub fn ys(&self) -> &Array1<f64> {
        &self.ys
    }

    pub fn features(&self) -> usize {
        self.xs.ncols()
    }

    /// All-zero starting parameters.
    pub fn init_params(&self) -> Params {
        Params::new().with(WEIGHTS, Array1::<f64>::zeros(self.features()))
    }

    fn weights<'a>(&self, params: &'a Params) -> Result<ArrayView1<'a, f64>> {
        let leaf = params.get(WEIGHTS).ok_or_else(|| Error::StructureMismatch {
            expected: vec![WEIGHTS.to_string()],
            got: params.names(),
        })?;
        if leaf.shape() != [self.features()] {
            return Err(Error::ShapeMismatch {
                name: WEIGHTS.to_string(),
                expected: vec![self.features()],
                got: leaf.shape().to_vec(),
            });
        }
        leaf.view()
            .into_dimensionality::<Ix1>()
            .map_err(|e| Error::msg(e.to_string()))
    }

    /// `xs · w`
    pub fn predict(&self, params: &Params) -> Result<Array1<f64>> {
        Ok(self.xs.dot(&self.weights(params)?))
    }

    fn residuals(&self, params: &Params) -> Result<Array1<f64>> {
        Ok(self.predict(params)? - &self.ys)
    }

    /// Mean halved squared error.
    pub fn loss(&self, params: &Params) -> Result<f64> {
        let r = self.residuals(params)?;
        Ok(0.5 * r.mapv(|x| x * x).sum() / self.xs.nrows() as f64)
    }

    /// Gradient of [`LinearRegression::loss`] with respect to `w`.
    pub fn grad(&self, params: &Params) -> Result<Params> {
        let r = self.residuals(params)?;
        let g = self.xs.t().dot(&r) / self.xs.nrows() as f64;
        Ok(Params::new().with(WEIGHTS, g))
    }
}
