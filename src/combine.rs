// Chain — sequential composition of transformations
//
// chain(a, b, c) behaves like a single transformation whose update runs
// a, then b on a's output, then c on b's output. Every stage sees the same
// current parameters. The chain's state is the list of its stages' states.
//
// USAGE:
//   let opt = chain![
//       clip_by_global_norm(1.0),
//       scale_by_adam(),
//       scale_by_schedule(exponential_decay(0.1, 1000, 0.99)),
//       scale(-1.0),
//   ];

use log::trace;

use crate::error::Result;
use crate::params::Params;
use crate::transform::{state_mismatch, BoxedTransformation, GradientTransformation, TransformState};

/// A sequence of transformations applied in order.
pub struct Chain {
    stages: Vec<BoxedTransformation>,
}

/// Compose `stages` into one transformation.
pub fn chain(stages: Vec<BoxedTransformation>) -> Chain {
    Chain { stages }
}

/// Compose transformations of different concrete types into a [`Chain`].
///
/// Each argument is boxed, so anything implementing
/// [`GradientTransformation`](crate::GradientTransformation) can be mixed.
#[macro_export]
macro_rules! chain {
    ($($stage:expr),* $(,)?) => {
        $crate::combine::chain(vec![
            $(Box::new($stage) as $crate::transform::BoxedTransformation),*
        ])
    };
}

impl Chain {
    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Append another stage.
    pub fn then(mut self, stage: impl GradientTransformation + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
}

impl GradientTransformation for Chain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn init(&self, params: &Params) -> Result<TransformState> {
        let stages = self
            .stages
            .iter()
            .map(|stage| stage.init(params))
            .collect::<Result<Vec<_>>>()?;
        Ok(TransformState::Chain { stages })
    }

    fn update(
        &self,
        updates: &Params,
        state: &TransformState,
        params: Option<&Params>,
    ) -> Result<(Params, TransformState)> {
        let states = match state {
            TransformState::Chain { stages } if stages.len() == self.stages.len() => stages,
            other => return Err(state_mismatch(self.name(), other)),
        };

        let mut updates = updates.clone();
        let mut next = Vec::with_capacity(states.len());
        for (stage, stage_state) in self.stages.iter().zip(states) {
            let (out, new_state) = stage.update(&updates, stage_state, params)?;
            trace!("chain stage {} -> norm {:.6}", stage.name(), out.global_norm());
            updates = out;
            next.push(new_state);
        }

        Ok((updates, TransformState::Chain { stages: next }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::scale::scale;
    use crate::transform::identity;
    use ndarray::array;

    fn params() -> Params {
        Params::new().with("w", array![1.0, -2.0, 4.0])
    }

    #[test]
    fn stages_run_in_order() {
        let opt = chain![scale(2.0), scale(-0.5), identity()];
        let state = opt.init(&params()).unwrap();
        assert_eq!(state.stages().unwrap().len(), 3);

        let (updates, _) = opt.update(&params(), &state, None).unwrap();
        assert_eq!(updates, params().scale(-1.0));
    }

    #[test]
    fn nested_chains_match_flat_chain() {
        let flat = chain![scale(2.0), scale(3.0), scale(-1.0)];
        let nested = chain![scale(2.0), chain![scale(3.0), scale(-1.0)]];

        let flat_state = flat.init(&params()).unwrap();
        let nested_state = nested.init(&params()).unwrap();
        let (a, _) = flat.update(&params(), &flat_state, None).unwrap();
        let (b, _) = nested.update(&params(), &nested_state, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_chain_is_identity() {
        let opt = chain(Vec::new());
        assert!(opt.is_empty());
        let state = opt.init(&params()).unwrap();
        let (updates, _) = opt.update(&params(), &state, None).unwrap();
        assert_eq!(updates, params());
    }

    #[test]
    fn wrong_stage_count_is_rejected() {
        let opt = chain![scale(1.0)].then(scale(2.0));
        assert_eq!(opt.len(), 2);
        let state = TransformState::Chain {
            stages: vec![TransformState::Empty],
        };
        let err = opt.update(&params(), &state, None).unwrap_err();
        assert!(matches!(err, Error::StateMismatch { transform: "chain", .. }));
    }
}
