// Scaling stages
//
//   scale(s)                  u ← s * u
//   scale_by_schedule(f)      u ← f(count) * u,   count += 1
//   scale_by_learning_rate(η) u ← -η * u          (η constant or scheduled)
//   add_decayed_weights(λ)    u ← u + λ * θ       (needs the current params)
//
// The sign flip lives in scale_by_learning_rate: every optimizer alias ends
// with it, so the stages before it work with ascent directions.

use crate::error::{Error, Result};
use crate::params::Params;
use crate::schedule::{ScalarOrSchedule, Schedule, SharedSchedule};
use crate::transform::{state_mismatch, BoxedTransformation, GradientTransformation, TransformState};

// Scale by a constant

/// Multiply updates by a fixed factor.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    step_size: f64,
}

pub fn scale(step_size: f64) -> Scale {
    Scale { step_size }
}

impl GradientTransformation for Scale {
    fn name(&self) -> &'static str {
        "scale"
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
            TransformState::Empty => Ok((updates.scale(self.step_size), TransformState::Empty)),
            other => Err(state_mismatch(self.name(), other)),
        }
    }
}

// Scale by a schedule

/// Multiply updates by `schedule(count)`, where `count` is the number of
/// updates already performed.
#[derive(Debug, Clone)]
pub struct ScaleBySchedule {
    schedule: SharedSchedule,
}

pub fn scale_by_schedule(schedule: impl Schedule + 'static) -> ScaleBySchedule {
    ScaleBySchedule {
        schedule: SharedSchedule::new(schedule),
    }
}

impl GradientTransformation for ScaleBySchedule {
    fn name(&self) -> &'static str {
        "scale_by_schedule"
    }

    fn init(&self, _params: &Params) -> Result<TransformState> {
        Ok(TransformState::Count { count: 0 })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        _params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let count = match state {
            TransformState::Count { count } => *count,
            other => return Err(state_mismatch(self.name(), other)),
        };
        let step_size = self.schedule.value(count);
        Ok((
            updates.scale(step_size),
            TransformState::Count {
                count: count.saturating_add(1),
            },
        ))
    }
}

// Learning rate

/// Scale by `-learning_rate`, turning ascent directions into descent steps.
pub fn scale_by_learning_rate(learning_rate: impl Into<ScalarOrSchedule>) -> BoxedTransformation {
    match learning_rate.into() {
        ScalarOrSchedule::Constant(lr) => Box::new(scale(-lr)),
        ScalarOrSchedule::Schedule(lr) => {
            Box::new(scale_by_schedule(move |count: u64| -lr.value(count)))
        }
    }
}

// Weight decay

/// Add `weight_decay * params` to the updates (decoupled weight decay).
#[derive(Debug, Clone, Copy)]
pub struct AddDecayedWeights {
    weight_decay: f64,
}

pub fn add_decayed_weights(weight_decay: f64) -> AddDecayedWeights {
    AddDecayedWeights { weight_decay }
}

impl GradientTransformation for AddDecayedWeights {
    fn name(&self) -> &'static str {
        "add_decayed_weights"
    }

    fn init(&self, _params: &Params) -> Result<TransformState> {
        Ok(TransformState::Empty)
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        if !matches!(state, TransformState::Empty) {
            return Err(state_mismatch(self.name(), state));
        }
        if self.weight_decay == 0.0 {
            return Ok((updates.clone(), TransformState::Empty));
        }
        let params = params.ok_or(Error::MissingParams("add_decayed_weights"))?;
        let wd = self.weight_decay;
        let updates = updates.zip_map(params, |u, p| u + wd * p)?;
        Ok((updates, TransformState::Empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::linear_schedule;
    use ndarray::array;

    fn grads() -> Params {
        Params::new().with("w", array![1.0, -1.0])
    }

    #[test]
    fn scale_by_schedule_uses_count_before_increment() {
        let opt = scale_by_schedule(linear_schedule(1.0, 0.0, 2));
        let mut state = opt.init(&grads()).unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let (u, next) = opt.update(&grads(), &state, None).unwrap();
            seen.push(u.get("w").unwrap()[0]);
            state = next;
        }
        assert_eq!(seen, vec![1.0, 0.5, 0.0]);
        assert_eq!(state.count(), Some(3));
    }

    #[test]
    fn learning_rate_flips_sign() {
        let opt = scale_by_learning_rate(0.1);
        let state = opt.init(&grads()).unwrap();
        let (u, _) = opt.update(&grads(), &state, None).unwrap();
        assert_eq!(u, grads().scale(-0.1));

        let scheduled = scale_by_learning_rate(linear_schedule(0.2, 0.0, 10));
        let state = scheduled.init(&grads()).unwrap();
        let (u, _) = scheduled.update(&grads(), &state, None).unwrap();
        assert_eq!(u, grads().scale(-0.2));
    }

    #[test]
    fn decayed_weights_need_params() {
        let opt = add_decayed_weights(0.5);
        let state = opt.init(&grads()).unwrap();
        let err = opt.update(&grads(), &state, None).unwrap_err();
        assert!(matches!(err, Error::MissingParams("add_decayed_weights")));

        let params = Params::new().with("w", array![2.0, 4.0]);
        let (u, _) = opt.update(&grads(), &state, Some(&params)).unwrap();
        assert_eq!(u.get("w").unwrap(), &array![2.0, 1.0].into_dyn());
    }
}
