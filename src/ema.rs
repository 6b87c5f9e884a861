// EMA — Exponential Moving Average of updates
//
// Replaces each update with an exponential moving average of all updates
// seen so far:
//
//   ema = decay * ema + (1 - decay) * u
//
// With debiasing, the emitted value is divided by (1 - decay^t) to undo the
// pull toward the zero initialisation, exactly like Adam's bias correction.
// The state always stores the raw (biased) average.
//
// Typical decay: 0.999 (close to 1 means slower update → more smoothing)
//
// Chained after the final scaling stage it turns a noisy optimizer into a
// Polyak-style averaged one; applied to the parameters themselves (by
// feeding parameters as "updates") it yields a smoothed copy of the model
// for evaluation.

use crate::adam::bias_correction;
use crate::error::Result;
use crate::params::Params;
use crate::transform::{state_mismatch, GradientTransformation, TransformState};

/// Exponential moving average of updates.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    decay: f64,
    debias: bool,
}

/// # Arguments
/// - `decay`: decay rate (typical: 0.999 or 0.9999)
/// - `debias`: divide by `1 - decay^t` (skipped while it is zero)
pub fn ema(decay: f64, debias: bool) -> Ema {
    Ema { decay, debias }
}

impl Ema {
    pub fn decay(&self) -> f64 {
        self.decay
    }
}

impl GradientTransformation for Ema {
    fn name(&self) -> &'static str {
        "ema"
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        Ok(TransformState::Ema {
            count: 0,
            ema: params.zeros_like(),
        })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        _params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let (count, prev) = match state {
            TransformState::Ema { count, ema } => (count.saturating_add(1), ema),
            other => return Err(state_mismatch(self.name(), other)),
        };
        let decay = self.decay;

        let ema = updates.zip_map(prev, |u, e| decay * e + (1.0 - decay) * u)?;
        // decay == 1 leaves the average at zero and the correction at 0
        let bc = bias_correction(decay, count);
        let out = if self.debias && bc != 0.0 {
            ema.mapv(|e| e / bc)
        } else {
            ema.clone()
        };

        Ok((out, TransformState::Ema { count, ema }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn debiased_average_of_constant_is_constant() {
        let u = Params::new().with("w", array![2.0]);
        let opt = ema(0.9, true);
        let mut state = opt.init(&u).unwrap();
        for _ in 0..5 {
            let (out, next) = opt.update(&u, &state, None).unwrap();
            assert!((out.get("w").unwrap()[0] - 2.0).abs() < 1e-12);
            state = next;
        }
        assert_eq!(state.count(), Some(5));
    }

    #[test]
    fn unit_decay_stays_finite() {
        let u = Params::new().with("w", array![2.0]);
        let opt = ema(1.0, true);
        let mut state = opt.init(&u).unwrap();
        for _ in 0..3 {
            let (out, next) = opt.update(&u, &state, None).unwrap();
            assert_eq!(out.get("w").unwrap()[0], 0.0);
            state = next;
        }
    }

    #[test]
    fn biased_average_starts_near_zero() {
        let u = Params::new().with("w", array![2.0]);
        let opt = ema(0.9, false);
        let state = opt.init(&u).unwrap();
        let (out, _) = opt.update(&u, &state, None).unwrap();
        assert!((out.get("w").unwrap()[0] - 0.2).abs() < 1e-12);
    }
}
