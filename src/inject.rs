// Hyperparameter injection — expose a transformation's arguments as state
//
// inject_hyperparams wraps a *constructor* rather than a transformation. The
// named arguments it is given (constants or schedules) are evaluated and
// stored in the state, and the inner transformation is rebuilt from those
// stored values on every update:
//
//   init:    hp = { name: value(0) }, inner = factory(hp), state = (0, hp, inner.init)
//   update:  scheduled hp ← schedule(count); constant hp read back from state
//            inner = factory(hp); run inner.update; count += 1
//
// So the current value of every hyperparameter can be read from the state at
// any time, and constant ones can be changed between steps by editing the
// state (`TransformState::hyperparams_mut`).
//
// USAGE:
//   let opt = inject_hyperparams(
//       |hp| Ok(clip_by_global_norm(hp.get("max_norm")?)),
//       [("max_norm", linear_schedule(1.0, 0.0, 99))],
//   );
//   let state = opt.init(&params)?;
//   assert_eq!(state.hyperparam("max_norm"), Some(1.0));

use std::collections::BTreeMap;

use log::debug;

use crate::error::{Error, Result};
use crate::params::Params;
use crate::schedule::{ScalarOrSchedule, Schedule};
use crate::transform::{state_mismatch, BoxedTransformation, GradientTransformation, TransformState};

/// Current values of the injected hyperparameters, handed to the factory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hyperparams {
    values: BTreeMap<String, f64>,
}

impl Hyperparams {
    /// Value of `name`, or [`Error::UnknownHyperparam`].
    pub fn get(&self, name: &str) -> Result<f64> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownHyperparam(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

type Factory = Box<dyn Fn(&Hyperparams) -> Result<BoxedTransformation> + Send + Sync>;

/// A transformation rebuilt each step from injected hyperparameters.
pub struct InjectHyperparams {
    factory: Factory,
    hyperparams: Vec<(String, ScalarOrSchedule)>,
}

/// Wrap `factory` so the given hyperparameters live in the optimizer state.
pub fn inject_hyperparams<F, T, I, S, V>(factory: F, hyperparams: I) -> InjectHyperparams
where
    F: Fn(&Hyperparams) -> Result<T> + Send + Sync + 'static,
    T: GradientTransformation + 'static,
    I: IntoIterator<Item = (S, V)>,
    S: Into<String>,
    V: Into<ScalarOrSchedule>,
{
    InjectHyperparams {
        factory: Box::new(move |hp| Ok(Box::new(factory(hp)?) as BoxedTransformation)),
        hyperparams: hyperparams
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect(),
    }
}

impl InjectHyperparams {
    /// Names of the injected hyperparameters, in injection order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hyperparams.iter().map(|(name, _)| name.as_str())
    }

    fn initial_values(&self) -> BTreeMap<String, f64> {
        self.hyperparams
            .iter()
            .map(|(name, value)| (name.clone(), value.value(0)))
            .collect()
    }

    /// Values for step `count`: schedules are re-evaluated, constants keep
    /// whatever the state currently holds.
    fn values_at(&self, count: u64, stored: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let mut values = stored.clone();
        for (name, value) in &self.hyperparams {
            match value {
                ScalarOrSchedule::Schedule(s) => {
                    values.insert(name.clone(), s.value(count));
                }
                ScalarOrSchedule::Constant(v) => {
                    values.entry(name.clone()).or_insert(*v);
                }
            }
        }
        values
    }
}

impl GradientTransformation for InjectHyperparams {
    fn name(&self) -> &'static str {
        "inject_hyperparams"
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        let values = self.initial_values();
        let inner = (self.factory)(&Hyperparams {
            values: values.clone(),
        })?;
        Ok(TransformState::InjectHyperparams {
            count: 0,
            hyperparams: values,
            inner: Box::new(inner.init(params)?),
        })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let (count, stored, inner_state) = match state {
            TransformState::InjectHyperparams {
                count,
                hyperparams,
                inner,
            } => (*count, hyperparams, inner),
            other => return Err(state_mismatch(self.name(), other)),
        };

        let values = self.values_at(count, stored);
        debug!("inject_hyperparams step {count}: {values:?}");

        let inner = (self.factory)(&Hyperparams {
            values: values.clone(),
        })?;
        let (out, inner_state) = inner.update(updates, inner_state, params)?;

        Ok((
            out,
            TransformState::InjectHyperparams {
                count: count.saturating_add(1),
                hyperparams: values,
                inner: Box::new(inner_state),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::exponential_decay;
    use crate::sgd::sgd;
    use ndarray::array;

    fn grads() -> Params {
        Params::new().with("w", array![1.0])
    }

    #[test]
    fn constant_hyperparams_can_be_overwritten_in_state() {
        let opt = inject_hyperparams(
            |hp| Ok(sgd(hp.get("learning_rate")?, None, false)),
            [("learning_rate", 0.1)],
        );
        let mut state = opt.init(&grads()).unwrap();
        assert_eq!(state.hyperparam("learning_rate"), Some(0.1));

        let (u, mut state2) = opt.update(&grads(), &state, None).unwrap();
        assert!((u.get("w").unwrap()[0] + 0.1).abs() < 1e-12);

        state2
            .hyperparams_mut()
            .unwrap()
            .insert("learning_rate".to_string(), 0.5);
        let (u, _) = opt.update(&grads(), &state2, None).unwrap();
        assert!((u.get("w").unwrap()[0] + 0.5).abs() < 1e-12);

        // cleared constants fall back to their initial values
        state.hyperparams_mut().unwrap().clear();
        let (u, restored) = opt.update(&grads(), &state, None).unwrap();
        assert!((u.get("w").unwrap()[0] + 0.1).abs() < 1e-12);
        assert_eq!(restored.hyperparam("learning_rate"), Some(0.1));
    }

    #[test]
    fn scheduled_hyperparams_follow_count() {
        let opt = inject_hyperparams(
            |hp| Ok(sgd(hp.get("learning_rate")?, hp.get("momentum").ok(), false)),
            [
                ("learning_rate", ScalarOrSchedule::from(exponential_decay(1.0, 1, 0.5))),
                ("momentum", ScalarOrSchedule::from(0.0)),
            ],
        );
        assert_eq!(opt.names().collect::<Vec<_>>(), vec!["learning_rate", "momentum"]);

        let mut state = opt.init(&grads()).unwrap();
        for _ in 0..3 {
            state = opt.update(&grads(), &state, None).unwrap().1;
        }
        // last update evaluated the schedule at count 2
        assert_eq!(state.hyperparam("learning_rate"), Some(0.25));
        assert_eq!(state.count(), Some(3));
    }

    #[test]
    fn factory_errors_surface() {
        let opt = inject_hyperparams(
            |hp| Ok(sgd(hp.get("lr")?, None, false)),
            [("learning_rate", 0.1)],
        );
        let err = opt.init(&grads()).unwrap_err();
        assert!(matches!(err, Error::UnknownHyperparam(name) if name == "lr"));
    }
}
