// RMSProp — Root Mean Square Propagation
//
// RMSProp maintains a running average of squared gradients to normalize the
// gradient, effectively giving each parameter its own adaptive learning rate.
//
// Direction:
//   ν = decay * ν + (1 - decay) * grad²
//   u = grad / √(ν + ε)
//
// Centered variant also tracks the mean and divides by the variance estimate:
//   μ = decay * μ + (1 - decay) * grad
//   u = grad / √(ν - μ² + ε)
//
// With momentum a `trace` stage follows the scaling:
//   rmsprop = chain(scale_by_rms, trace(momentum)?, scale_by_learning_rate(lr))
//
// HYPERPARAMETERS:
//   decay = 0.9, ε = 1e-8, initial_scale = 0, centered = false

use crate::combine::chain;
use crate::error::Result;
use crate::params::Params;
use crate::scale::scale_by_learning_rate;
use crate::schedule::ScalarOrSchedule;
use crate::sgd::trace;
use crate::transform::{state_mismatch, BoxedTransformation, GradientTransformation, TransformState};

/// Divide updates by the root of a running mean of their squares.
#[derive(Debug, Clone, Copy)]
pub struct ScaleByRms {
    decay: f64,
    epsilon: f64,
    initial_scale: f64,
    centered: bool,
}

pub fn scale_by_rms() -> ScaleByRms {
    ScaleByRms {
        decay: 0.9,
        epsilon: 1e-8,
        initial_scale: 0.0,
        centered: false,
    }
}

impl ScaleByRms {
    /// Set the smoothing constant (default: 0.9).
    pub fn decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    /// Set ε (numerical stability, default: 1e-8).
    pub fn epsilon(mut self, eps: f64) -> Self {
        self.epsilon = eps;
        self
    }

    /// Initial value of the squared-gradient accumulator.
    pub fn initial_scale(mut self, initial_scale: f64) -> Self {
        self.initial_scale = initial_scale;
        self
    }

    /// Normalise by the variance instead of the raw second moment.
    pub fn centered(mut self, centered: bool) -> Self {
        self.centered = centered;
        self
    }
}

impl GradientTransformation for ScaleByRms {
    fn name(&self) -> &'static str {
        "scale_by_rms"
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        Ok(TransformState::Rms {
            nu: params.full_like(self.initial_scale),
            mu: self.centered.then(|| params.zeros_like()),
        })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        _params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let (nu, mu) = match state {
            TransformState::Rms { nu, mu } if mu.is_some() == self.centered => (nu, mu),
            other => return Err(state_mismatch(self.name(), other)),
        };
        let (decay, eps) = (self.decay, self.epsilon);

        let nu = updates.zip_map(nu, |g, n| decay * n + (1.0 - decay) * g * g)?;
        let (out, mu) = match mu {
            Some(mu) => {
                let mu = updates.zip_map(mu, |g, m| decay * m + (1.0 - decay) * g)?;
                let variance = nu.zip_map(&mu, |n, m| n - m * m)?;
                let out = updates.zip_map(&variance, |g, var| g / (var + eps).sqrt())?;
                (out, Some(mu))
            }
            None => (updates.zip_map(&nu, |g, n| g / (n + eps).sqrt())?, None),
        };

        Ok((out, TransformState::Rms { nu, mu }))
    }
}

/// RMSProp optimizer with optional momentum.
pub fn rmsprop(
    learning_rate: impl Into<ScalarOrSchedule>,
    decay: f64,
    epsilon: f64,
    momentum: Option<f64>,
) -> BoxedTransformation {
    rmsprop_with(
        learning_rate,
        scale_by_rms().decay(decay).epsilon(epsilon),
        momentum,
    )
}

/// RMSProp with a fully configured scaling stage.
pub fn rmsprop_with(
    learning_rate: impl Into<ScalarOrSchedule>,
    rms: ScaleByRms,
    momentum: Option<f64>,
) -> BoxedTransformation {
    let mut stages: Vec<BoxedTransformation> = vec![Box::new(rms)];
    if let Some(m) = momentum {
        stages.push(Box::new(trace(m, false)));
    }
    stages.push(scale_by_learning_rate(learning_rate));
    Box::new(chain(stages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn first_step_normalises_by_running_rms() {
        let grads = Params::new().with("w", array![2.0]);
        let opt = scale_by_rms().epsilon(0.0);
        let state = opt.init(&grads).unwrap();
        let (u, _) = opt.update(&grads, &state, None).unwrap();
        // ν = 0.1 * 4 = 0.4, u = 2 / √0.4
        assert!((u.get("w").unwrap()[0] - 2.0 / 0.4f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn centered_state_tracks_mean() {
        let grads = Params::new().with("w", array![1.0]);
        let opt = scale_by_rms().centered(true);
        let state = opt.init(&grads).unwrap();
        let (_, state) = opt.update(&grads, &state, None).unwrap();
        match state {
            TransformState::Rms { mu: Some(mu), .. } => {
                assert!((mu.get("w").unwrap()[0] - 0.1).abs() < 1e-12)
            }
            other => panic!("unexpected state {other:?}"),
        }

        // A non-centered stage must not accept centered state.
        let plain = scale_by_rms();
        let centered_state = opt.init(&grads).unwrap();
        assert!(plain.update(&grads, &centered_state, None).is_err());
    }

    #[test]
    fn momentum_adds_trace_stage() {
        let grads = Params::new().with("w", array![1.0]);
        let opt = rmsprop(0.01, 0.9, 1e-8, Some(0.9));
        let state = opt.init(&grads).unwrap();
        assert_eq!(state.stages().unwrap().len(), 3);
        let (u, _) = opt.update(&grads, &state, None).unwrap();
        assert!(u.get("w").unwrap()[0] < 0.0);
    }
}
