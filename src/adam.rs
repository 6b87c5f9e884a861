// Adam / AdamW — Adaptive Moment Estimation
//
// Adam maintains TWO moving averages per parameter:
//
//   m (1st moment): exponential average of gradients (direction)
//   v (2nd moment): exponential average of squared gradients (magnitude)
//
// Update direction (bias-corrected):
//   m_hat = m / (1 - β1^t)
//   v_hat = v / (1 - β2^t)
//   u = m_hat / (√(v_hat + ε_root) + ε)
//
// scale_by_adam produces only that direction. The learning rate and the
// descent sign are separate stages, so the usual optimizer is:
//
//   adam(lr)  = chain(scale_by_adam, scale_by_learning_rate(lr))
//   adamw(lr) = chain(scale_by_adam, add_decayed_weights(wd), scale_by_learning_rate(lr))
//
// AdamW adds weight decay after the adaptive scaling (decoupled), so the
// decay is not rescaled by the second moment.
//
// HYPERPARAMETERS (defaults from the original paper):
//   β1 = 0.9, β2 = 0.999, ε = 1e-8, ε_root = 0, weight_decay = 1e-4

use crate::combine::chain;
use crate::error::Result;
use crate::params::Params;
use crate::scale::{add_decayed_weights, scale_by_learning_rate};
use crate::schedule::ScalarOrSchedule;
use crate::transform::{state_mismatch, BoxedTransformation, GradientTransformation, TransformState};

/// Rescale updates by Adam's bias-corrected moment ratio.
///
/// Standard defaults: β1=0.9, β2=0.999, ε=1e-8, ε_root=0
#[derive(Debug, Clone, Copy)]
pub struct ScaleByAdam {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    eps_root: f64,
}

pub fn scale_by_adam() -> ScaleByAdam {
    ScaleByAdam {
        beta1: 0.9,
        beta2: 0.999,
        epsilon: 1e-8,
        eps_root: 0.0,
    }
}

impl ScaleByAdam {
    /// Set β1 (1st moment decay rate).
    pub fn beta1(mut self, beta1: f64) -> Self {
        self.beta1 = beta1;
        self
    }

    /// Set β2 (2nd moment decay rate).
    pub fn beta2(mut self, beta2: f64) -> Self {
        self.beta2 = beta2;
        self
    }

    /// Set ε (added outside the square root).
    pub fn epsilon(mut self, eps: f64) -> Self {
        self.epsilon = eps;
        self
    }

    /// Set ε_root (added inside the square root).
    pub fn eps_root(mut self, eps_root: f64) -> Self {
        self.eps_root = eps_root;
        self
    }
}

/// Shared moment bookkeeping for Adam and RAdam.
///
/// Returns `(count, mu, nu)` after folding `updates` into the moments.
pub(crate) fn update_moments(
    updates: &Params,
    mu: &Params,
    nu: &Params,
    count: u64,
    beta1: f64,
    beta2: f64,
) -> Result<(u64, Params, Params)> {
    let mu = updates.zip_map(mu, |g, m| beta1 * m + (1.0 - beta1) * g)?;
    let nu = updates.zip_map(nu, |g, v| beta2 * v + (1.0 - beta2) * g * g)?;
    Ok((count.saturating_add(1), mu, nu))
}

/// `1 - β^t`, the bias correction factor.
pub(crate) fn bias_correction(beta: f64, count: u64) -> f64 {
    1.0 - beta.powf(count as f64)
}

impl GradientTransformation for ScaleByAdam {
    fn name(&self) -> &'static str {
        "scale_by_adam"
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        Ok(TransformState::Adam {
            count: 0,
            mu: params.zeros_like(),
            nu: params.zeros_like(),
        })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        _params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let (count, mu, nu) = match state {
            TransformState::Adam { count, mu, nu } => (*count, mu, nu),
            other => return Err(state_mismatch(self.name(), other)),
        };

        let (count, mu, nu) = update_moments(updates, mu, nu, count, self.beta1, self.beta2)?;

        let bc1 = bias_correction(self.beta1, count);
        let bc2 = bias_correction(self.beta2, count);
        let (eps, eps_root) = (self.epsilon, self.eps_root);

        let out = mu.zip_map(&nu, |m, v| {
            let m_hat = m / bc1;
            let v_hat = v / bc2;
            m_hat / ((v_hat + eps_root).sqrt() + eps)
        })?;

        Ok((out, TransformState::Adam { count, mu, nu }))
    }
}

/// Adam optimizer: adaptive moments followed by `-learning_rate` scaling.
pub fn adam(learning_rate: impl Into<ScalarOrSchedule>) -> BoxedTransformation {
    adam_with(learning_rate, scale_by_adam())
}

/// Adam with custom moment hyperparameters.
pub fn adam_with(
    learning_rate: impl Into<ScalarOrSchedule>,
    moments: ScaleByAdam,
) -> BoxedTransformation {
    Box::new(chain(vec![
        Box::new(moments) as BoxedTransformation,
        scale_by_learning_rate(learning_rate),
    ]))
}

/// AdamW optimizer (Adam with decoupled weight decay).
///
/// Requires the current parameters on every update.
pub fn adamw(learning_rate: impl Into<ScalarOrSchedule>, weight_decay: f64) -> BoxedTransformation {
    adamw_with(learning_rate, weight_decay, scale_by_adam())
}

/// AdamW with custom moment hyperparameters.
pub fn adamw_with(
    learning_rate: impl Into<ScalarOrSchedule>,
    weight_decay: f64,
    moments: ScaleByAdam,
) -> BoxedTransformation {
    Box::new(chain(vec![
        Box::new(moments) as BoxedTransformation,
        Box::new(add_decayed_weights(weight_decay)),
        scale_by_learning_rate(learning_rate),
    ]))
}
