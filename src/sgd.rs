// SGD — Stochastic Gradient Descent
//
// The simplest optimizer: θ_new = θ - lr * gradient
//
// With momentum:
//   t = momentum * t_prev + gradient
//   θ_new = θ - lr * t
//
// With Nesterov momentum the emitted direction looks one step ahead:
//   θ_new = θ - lr * (gradient + momentum * t)
//
// The momentum buffer is its own stage (`trace`) so it can be chained with
// anything, e.g. after RMS scaling in `rmsprop`.

use crate::combine::chain;
use crate::error::Result;
use crate::params::Params;
use crate::scale::scale_by_learning_rate;
use crate::schedule::ScalarOrSchedule;
use crate::transform::{
    identity, state_mismatch, BoxedTransformation, GradientTransformation, TransformState,
};

/// Momentum accumulator.
#[derive(Debug, Clone, Copy)]
pub struct Trace {
    decay: f64,
    nesterov: bool,
}

/// Accumulate a momentum trace with coefficient `decay`.
pub fn trace(decay: f64, nesterov: bool) -> Trace {
    Trace { decay, nesterov }
}

impl GradientTransformation for Trace {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        Ok(TransformState::Trace {
            trace: params.zeros_like(),
        })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        _params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let prev = match state {
            TransformState::Trace { trace } => trace,
            other => return Err(state_mismatch(self.name(), other)),
        };
        let decay = self.decay;

        let trace = updates.zip_map(prev, |g, t| g + decay * t)?;
        let out = if self.nesterov {
            updates.zip_map(&trace, |g, t| g + decay * t)?
        } else {
            trace.clone()
        };

        Ok((out, TransformState::Trace { trace }))
    }
}

/// Stochastic gradient descent with optional (Nesterov) momentum.
///
/// # Arguments
/// - `learning_rate`: constant or scheduled step size
/// - `momentum`: momentum factor, `None` for vanilla SGD
/// - `nesterov`: use Nesterov momentum (ignored without momentum)
pub fn sgd(
    learning_rate: impl Into<ScalarOrSchedule>,
    momentum: Option<f64>,
    nesterov: bool,
) -> BoxedTransformation {
    let momentum: BoxedTransformation = match momentum {
        Some(m) => Box::new(trace(m, nesterov)),
        None => Box::new(identity()),
    };
    Box::new(chain(vec![momentum, scale_by_learning_rate(learning_rate)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::apply_updates;
    use ndarray::array;

    fn grads() -> Params {
        Params::new().with("w", array![1.0])
    }

    #[test]
    fn vanilla_sgd_steps_against_gradient() {
        let params = Params::new().with("w", array![1.0]);
        let opt = sgd(0.1, None, false);
        let state = opt.init(&params).unwrap();
        let (u, _) = opt.update(&grads(), &state, Some(&params)).unwrap();
        let next = apply_updates(&params, &u).unwrap();
        assert!((next.get("w").unwrap()[0] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn trace_accumulates_velocity() {
        let opt = trace(0.9, false);
        let mut state = opt.init(&grads()).unwrap();
        let mut last = 0.0;
        for _ in 0..2 {
            let (u, next) = opt.update(&grads(), &state, None).unwrap();
            last = u.get("w").unwrap()[0];
            state = next;
        }
        // 1 + 0.9 * 1
        assert!((last - 1.9).abs() < 1e-12);
    }

    #[test]
    fn nesterov_looks_ahead() {
        let opt = trace(0.5, true);
        let state = opt.init(&grads()).unwrap();
        let (u, state) = opt.update(&grads(), &state, None).unwrap();
        // trace = 1, out = 1 + 0.5 * 1
        assert_eq!(u.get("w").unwrap()[0], 1.5);
        match state {
            TransformState::Trace { trace } => assert_eq!(trace.get("w").unwrap()[0], 1.0),
            other => panic!("unexpected state {}", other.kind()),
        }
    }
}
