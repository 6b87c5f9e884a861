// GradientTransformation — the interface every optimizer stage implements
//
// A transformation is an (init, update) pair:
//
//   init(params)                        → state
//   update(updates, state, Some(params)) → (new_updates, new_state)
//
// DESIGN DECISION: Functional state
//
// update() never mutates anything. It receives the incoming updates (usually
// gradients) and the previous state, and returns the transformed updates plus
// a brand new state. The training loop owns the state and swaps it each step:
//
//   let (updates, next) = opt.update(&grads, &state, Some(&params))?;
//   params = apply_updates(&params, &updates)?;
//   state = next;
//
// Because a transformation never applies its own output, any number of them
// can be chained: clipping, moment estimation, schedule scaling and the final
// sign flip are all separate stages (see `combine`).
//
// State is one serializable enum shared by every transformation. A chain of
// boxed stages holds a `Vec` of it, and a whole optimizer state checkpoints
// as a single value.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::Params;

/// Trait that all gradient transformations implement.
pub trait GradientTransformation: Send + Sync {
    /// Short name used in logs and state mismatch errors.
    fn name(&self) -> &'static str;

    /// Build the initial state for the given parameters.
    fn init(&self, params: &Params) -> Result<TransformState>;

    /// Transform `updates` given the previous `state`.
    ///
    /// `params` are the current parameter values; only transformations that
    /// depend on them (e.g. weight decay) require `Some`.
    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        params: Option<&Params>,
    ) -> Result<(Params, TransformState)>;
}

impl<T: GradientTransformation + ?Sized> GradientTransformation for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        (**self).init(params)
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        (**self).update(updates, state, params)
    }
}

impl<T: GradientTransformation + ?Sized> GradientTransformation for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        (**self).init(params)
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        (**self).update(updates, state, params)
    }
}

/// Boxed, type-erased transformation. Chains and configs are built from these.
pub type BoxedTransformation = Box<dyn GradientTransformation>;

// TransformState — Serializable state of any transformation

/// State of a transformation.
///
/// Each transformation accepts exactly one variant; handing it another one
/// is reported as [`Error::StateMismatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformState {
    /// Stateless transformations.
    Empty,
    /// Step counter (schedule-driven scaling).
    Count { count: u64 },
    /// Momentum trace.
    Trace { trace: Params },
    /// Adam / RAdam first and second moments.
    Adam { count: u64, mu: Params, nu: Params },
    /// RMS second moment, plus the first moment when centered.
    Rms { nu: Params, mu: Option<Params> },
    /// Exponential moving average of updates (not debiased).
    Ema { count: u64, ema: Params },
    /// Gradient accumulation around an inner transformation.
    MultiSteps {
        mini_step: u64,
        gradient_step: u64,
        acc_grads: Params,
        inner: Box<TransformState>,
    },
    /// One state per chained stage, in order.
    Chain { stages: Vec<TransformState> },
    /// Injected hyperparameters and the wrapped transformation's state.
    InjectHyperparams {
        count: u64,
        hyperparams: BTreeMap<String, f64>,
        inner: Box<TransformState>,
    },
}

impl TransformState {
    /// Variant name, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformState::Empty => "empty",
            TransformState::Count { .. } => "count",
            TransformState::Trace { .. } => "trace",
            TransformState::Adam { .. } => "adam",
            TransformState::Rms { .. } => "rms",
            TransformState::Ema { .. } => "ema",
            TransformState::MultiSteps { .. } => "multi_steps",
            TransformState::Chain { .. } => "chain",
            TransformState::InjectHyperparams { .. } => "inject_hyperparams",
        }
    }

    /// Step counter, for the variants that keep one.
    pub fn count(&self) -> Option<u64> {
        match self {
            TransformState::Count { count }
            | TransformState::Adam { count, .. }
            | TransformState::Ema { count, .. }
            | TransformState::InjectHyperparams { count, .. } => Some(*count),
            TransformState::MultiSteps { gradient_step, .. } => Some(*gradient_step),
            _ => None,
        }
    }

    /// Stage states of a chain.
    pub fn stages(&self) -> Option<&[TransformState]> {
        match self {
            TransformState::Chain { stages } => Some(stages),
            _ => None,
        }
    }

    /// Injected hyperparameters, searching through chains and wrappers.
    ///
    /// Returns the first injected set found in depth-first order.
    pub fn hyperparams(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            TransformState::InjectHyperparams { hyperparams, .. } => Some(hyperparams),
            TransformState::MultiSteps { inner, .. } => inner.hyperparams(),
            TransformState::Chain { stages } => stages.iter().find_map(|s| s.hyperparams()),
            _ => None,
        }
    }

    /// Mutable access to injected hyperparameters.
    ///
    /// Constant hyperparameters overwritten here are picked up by the next
    /// update; scheduled ones are recomputed from the step count.
    pub fn hyperparams_mut(&mut self) -> Option<&mut BTreeMap<String, f64>> {
        match self {
            TransformState::InjectHyperparams { hyperparams, .. } => Some(hyperparams),
            TransformState::MultiSteps { inner, .. } => inner.hyperparams_mut(),
            TransformState::Chain { stages } => {
                stages.iter_mut().find_map(|s| s.hyperparams_mut())
            }
            _ => None,
        }
    }

    /// Look up a single injected hyperparameter.
    pub fn hyperparam(&self, name: &str) -> Option<f64> {
        self.hyperparams().and_then(|hp| hp.get(name).copied())
    }
}

pub(crate) fn state_mismatch(transform: &'static str, state: &TransformState) -> Error {
    Error::StateMismatch {
        transform,
        state: state.kind(),
    }
}

// Identity

/// Passes updates through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

/// A transformation that leaves updates untouched.
pub fn identity() -> Identity {
    Identity
}

impl GradientTransformation for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn init(&self, _params: &Params) -> Result<TransformState> {
        Ok(TransformState::Empty)
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        _params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        match state {
            TransformState::Empty => Ok((updates.clone(), TransformState::Empty)),
            other => Err(state_mismatch(self.name(), other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn identity_passes_updates_through() {
        let params = Params::new().with("w", array![1.0, 2.0]);
        let state = identity().init(&params).unwrap();
        let (updates, next) = identity().update(&params, &state, None).unwrap();
        assert_eq!(updates, params);
        assert_eq!(next, TransformState::Empty);
    }

    #[test]
    fn identity_rejects_foreign_state() {
        let params = Params::new().with("w", array![1.0]);
        let err = identity()
            .update(&params, &TransformState::Count { count: 3 }, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StateMismatch {
                transform: "identity",
                state: "count"
            }
        ));
    }

    #[test]
    fn hyperparams_are_found_inside_chains() {
        let mut hp = BTreeMap::new();
        hp.insert("learning_rate".to_string(), 0.1);
        let mut state = TransformState::Chain {
            stages: vec![
                TransformState::Empty,
                TransformState::InjectHyperparams {
                    count: 0,
                    hyperparams: hp,
                    inner: Box::new(TransformState::Empty),
                },
            ],
        };
        assert_eq!(state.hyperparam("learning_rate"), Some(0.1));

        state
            .hyperparams_mut()
            .unwrap()
            .insert("learning_rate".to_string(), 0.01);
        assert_eq!(state.hyperparam("learning_rate"), Some(0.01));
        assert_eq!(state.hyperparam("momentum"), None);
    }

    #[test]
    fn state_serializes_with_kind_tag() {
        let state = TransformState::Count { count: 7 };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["kind"], "count");
        assert_eq!(json["count"], 7);
    }
}
