// Gradient Accumulation — Simulate larger batch sizes
//
// multi_steps(inner, k) wraps an optimizer so that it only steps every k
// calls. In between it keeps a running mean of the incoming gradients and
// emits zero updates; on the k-th call it runs the inner optimizer on the
// averaged gradient, emits its updates and resets the accumulator.
//
// This is essential when:
//   - memory can only fit small batches
//   - large effective batch sizes are needed (e.g., for Transformers)
//
// State:
//   mini_step      calls since the last real step (0..k)
//   gradient_step  number of real steps taken
//   acc_grads      running mean of the gradients in the current window
//   inner          the wrapped optimizer's state

use log::debug;

use crate::error::{Error, Result};
use crate::params::Params;
use crate::transform::{state_mismatch, BoxedTransformation, GradientTransformation, TransformState};

/// Accumulate `every_k` gradients before each inner update.
pub struct MultiSteps {
    inner: BoxedTransformation,
    every_k: u64,
}

/// Wrap `inner` so that it steps once every `every_k` updates.
///
/// Returns [`Error::InvalidArgument`] when `every_k == 0`.
pub fn multi_steps(
    inner: impl GradientTransformation + 'static,
    every_k: u64,
) -> Result<MultiSteps> {
    if every_k == 0 {
        return Err(Error::invalid("multi_steps requires every_k > 0"));
    }
    Ok(MultiSteps {
        inner: Box::new(inner),
        every_k,
    })
}

impl MultiSteps {
    /// Number of mini-batches per real step.
    pub fn every_k(&self) -> u64 {
        self.every_k
    }

    /// Whether the update that produced `state` ran the inner optimizer.
    pub fn has_updated(state: &TransformState) -> bool {
        matches!(state, TransformState::MultiSteps { mini_step: 0, gradient_step, .. } if *gradient_step > 0)
    }
}

impl GradientTransformation for MultiSteps {
    fn name(&self) -> &'static str {
        "multi_steps"
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        Ok(TransformState::MultiSteps {
            mini_step: 0,
            gradient_step: 0,
            acc_grads: params.zeros_like(),
            inner: Box::new(self.inner.init(params)?),
        })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let (mini_step, gradient_step, acc_grads, inner) = match state {
            TransformState::MultiSteps {
                mini_step,
                gradient_step,
                acc_grads,
                inner,
            } => (*mini_step, *gradient_step, acc_grads, inner),
            other => return Err(state_mismatch(self.name(), other)),
        };

        // Running mean: acc = (g + n * acc) / (n + 1)
        let n = mini_step as f64;
        let acc_grads = updates.zip_map(acc_grads, |g, a| (g + n * a) / (n + 1.0))?;

        if mini_step + 1 < self.every_k {
            let state = TransformState::MultiSteps {
                mini_step: mini_step + 1,
                gradient_step,
                acc_grads,
                inner: inner.clone(),
            };
            return Ok((updates.zeros_like(), state));
        }

        debug!(
            "multi_steps: applying {} after {} accumulated gradients",
            self.inner.name(),
            self.every_k
        );
        let (out, inner) = self.inner.update(&acc_grads, inner, params)?;
        let state = TransformState::MultiSteps {
            mini_step: 0,
            gradient_step: gradient_step.saturating_add(1),
            acc_grads: acc_grads.zeros_like(),
            inner: Box::new(inner),
        };
        Ok((out, state))
    }
}
