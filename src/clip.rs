// Gradient Clipping — Prevent exploding gradients during training
//
// Clipping limits the magnitude of the updates before the later stages of a
// chain see them, preventing catastrophically large steps.
//
// Two strategies:
//   1. clip_by_global_norm: scale the whole tree so its global L2 norm ≤ max_norm
//      (used by GPT, BERT, and most modern architectures)
//   2. clip: clamp each element to [-max_delta, max_delta]
//
// USAGE:
//   let opt = chain![clip_by_global_norm(1.0), scale_by_adam(), scale(-1e-3)];

use log::trace;

use crate::error::Result;
use crate::params::Params;
use crate::transform::{state_mismatch, GradientTransformation, TransformState};

// Clip by global L2 norm

/// Rescale updates whose global L2 norm exceeds `max_norm`.
///
/// If the norm is already ≤ `max_norm`, updates pass through unchanged;
/// otherwise every leaf is multiplied by `max_norm / norm`, so the result
/// has norm exactly `max_norm`.
#[derive(Debug, Clone, Copy)]
pub struct ClipByGlobalNorm {
    max_norm: f64,
}

pub fn clip_by_global_norm(max_norm: f64) -> ClipByGlobalNorm {
    ClipByGlobalNorm { max_norm }
}

impl ClipByGlobalNorm {
    pub fn max_norm(&self) -> f64 {
        self.max_norm
    }
}

impl GradientTransformation for ClipByGlobalNorm {
    fn name(&self) -> &'static str {
        "clip_by_global_norm"
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
        if !matches!(state, TransformState::Empty) {
            return Err(state_mismatch(self.name(), state));
        }

        let norm = updates.global_norm();
        if norm <= self.max_norm {
            return Ok((updates.clone(), TransformState::Empty));
        }

        trace!("clipping global norm {norm:.6} to {}", self.max_norm);
        Ok((updates.scale(self.max_norm / norm), TransformState::Empty))
    }
}

// Clip by value

/// Clamp each element to `[-max_delta, max_delta]`.
#[derive(Debug, Clone, Copy)]
pub struct Clip {
    max_delta: f64,
}

pub fn clip(max_delta: f64) -> Clip {
    Clip { max_delta }
}

impl GradientTransformation for Clip {
    fn name(&self) -> &'static str {
        "clip"
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
        if !matches!(state, TransformState::Empty) {
            return Err(state_mismatch(self.name(), state));
        }
        let max = self.max_delta;
        Ok((updates.mapv(|v| v.clamp(-max, max)), TransformState::Empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn big() -> Params {
        // norm 5
        Params::new().with("a", array![3.0]).with("b", array![4.0])
    }

    #[test]
    fn global_norm_clip_rescales_to_max() {
        let opt = clip_by_global_norm(1.0);
        let state = opt.init(&big()).unwrap();
        let (u, _) = opt.update(&big(), &state, None).unwrap();
        assert!((u.global_norm() - 1.0).abs() < 1e-12);
        assert!((u.get("a").unwrap()[0] - 0.6).abs() < 1e-12);
        assert!((u.get("b").unwrap()[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn small_updates_pass_through() {
        let opt = clip_by_global_norm(10.0);
        let state = opt.init(&big()).unwrap();
        let (u, _) = opt.update(&big(), &state, None).unwrap();
        assert_eq!(u, big());
    }

    #[test]
    fn zero_max_norm_zeroes_updates() {
        let opt = clip_by_global_norm(0.0);
        let (u, _) = opt.update(&big(), &TransformState::Empty, None).unwrap();
        assert_eq!(u.global_norm(), 0.0);

        let zeros = big().zeros_like();
        let (u, _) = opt.update(&zeros, &TransformState::Empty, None).unwrap();
        assert_eq!(u, zeros);
    }

    #[test]
    fn clip_by_value_clamps_elements() {
        let opt = clip(3.5);
        let (u, _) = opt.update(&big(), &TransformState::Empty, None).unwrap();
        assert_eq!(u.get("a").unwrap()[0], 3.0);
        assert_eq!(u.get("b").unwrap()[0], 3.5);
    }
}
