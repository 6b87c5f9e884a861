// Training loop — init, then {gradient, update, apply} for a fixed number of steps
//
//   let mut state = optimizer.init(&params)?;
//   for _ in 0..steps {
//       let grads = grad_fn(&params)?;
//       let (updates, next) = optimizer.update(&grads, &state, Some(&params))?;
//       params = apply_updates(&params, &updates)?;
//       state = next;
//   }
//
// `fit` runs exactly that; `fit_from` resumes from an existing state (e.g. a
// loaded checkpoint).

use log::{debug, info};

use crate::error::Result;
use crate::params::{apply_updates, Params};
use crate::transform::{GradientTransformation, TransformState};

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub params: Params,
    pub state: TransformState,
    /// Updates performed in this run.
    pub steps: u64,
}

/// Initialise `optimizer` and run `steps` updates.
///
/// `grad_fn` returns the gradient tree for the current parameters.
pub fn fit<O, G>(optimizer: &O, params: Params, steps: u64, grad_fn: G) -> Result<FitOutcome>
where
    O: GradientTransformation + ?Sized,
    G: FnMut(&Params) -> Result<Params>,
{
    let state = optimizer.init(&params)?;
    fit_from(optimizer, params, state, steps, grad_fn)
}

/// Run `steps` updates starting from an existing optimizer state.
pub fn fit_from<O, G>(
    optimizer: &O,
    mut params: Params,
    mut state: TransformState,
    steps: u64,
    mut grad_fn: G,
) -> Result<FitOutcome>
where
    O: GradientTransformation + ?Sized,
    G: FnMut(&Params) -> Result<Params>,
{
    info!(
        "fitting {} parameters with {} for {steps} steps",
        params.num_elements(),
        optimizer.name()
    );
    let log_every = (steps / 10).max(1);

    for step in 0..steps {
        let grads = grad_fn(&params)?;
        let (updates, next) = optimizer.update(&grads, &state, Some(&params))?;
        params = apply_updates(&params, &updates)?;
        state = next;

        if (step + 1) % log_every == 0 {
            debug!(
                "step {}: grad norm {:.6e}, update norm {:.6e}",
                step + 1,
                grads.global_norm(),
                updates.global_norm()
            );
        }
    }

    Ok(FitOutcome {
        params,
        state,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sgd::sgd;
    use ndarray::array;

    #[test]
    fn fit_runs_requested_steps() {
        let mut calls = 0;
        let outcome = fit(
            &*sgd(0.5, None, false),
            Params::new().with("w", array![4.0]),
            3,
            |p| {
                calls += 1;
                Ok(p.clone())
            },
        )
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(outcome.steps, 3);
        // w ← w - 0.5 w, three times
        assert_eq!(outcome.params.get("w").unwrap()[0], 0.5);
    }

    #[test]
    fn gradient_errors_stop_the_loop() {
        let result = fit(
            &*sgd(0.1, None, false),
            Params::new().with("w", array![1.0]),
            10,
            |_| Ok(Params::new().with("v", array![1.0])),
        );
        assert!(result.is_err());
    }

    #[test]
    fn resume_continues_from_state() {
        let opt = sgd(0.5, Some(0.9), false);
        let start = Params::new().with("w", array![1.0]);
        let grad = |p: &Params| Ok(p.clone());

        let whole = fit(&*opt, start.clone(), 4, grad).unwrap();
        let half = fit(&*opt, start, 2, grad).unwrap();
        let rest = fit_from(&*opt, half.params, half.state, 2, grad).unwrap();
        assert_eq!(whole.params, rest.params);
        assert_eq!(whole.state, rest.state);
    }
}
