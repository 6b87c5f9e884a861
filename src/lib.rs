//! # shrew-transform
//!
//! Composable gradient transformations for gradient-based training.
//!
//! An optimizer is a [`GradientTransformation`]: an `init` that builds state
//! from the parameters and an `update` that turns gradients into parameter
//! updates. Optimizers are assembled from small stages with [`chain!`], and
//! the parameters are only touched by [`apply_updates`]. The training loop is:
//!
//! 1. `state = optimizer.init(&params)`
//! 2. `grads = grad_fn(&params)`, supplied by the caller
//! 3. `(updates, state) = optimizer.update(&grads, &state, Some(&params))`
//! 4. `params = apply_updates(&params, &updates)`
//!
//! ```ignore
//! let optimizer = chain![
//!     clip_by_global_norm(1.0),
//!     scale_by_adam(),
//!     scale_by_schedule(exponential_decay(0.1, 1000, 0.99)),
//!     scale(-1.0),
//! ];
//! let outcome = fit(&optimizer, problem.init_params(), 1000, |p| problem.grad(p))?;
//! ```
//!
//! Implemented stages and optimizers:
//! - **Scaling**: `scale`, `scale_by_schedule`, `scale_by_learning_rate`
//! - **SGD**: momentum `trace`, `sgd`
//! - **Adam / AdamW**: `scale_by_adam`, `adam`, `adamw`
//! - **RAdam**: Rectified Adam (no warmup needed)
//! - **RMSProp**: `scale_by_rms`, `rmsprop`
//! - **Clipping**: by value and by global norm
//! - **EMA**, **gradient accumulation** (`multi_steps`)
//! - **Hyperparameter injection**: arguments as inspectable, schedulable state

pub mod accumulate;
pub mod adam;
pub mod checkpoint;
pub mod clip;
pub mod combine;
pub mod config;
pub mod ema;
pub mod error;
pub mod inject;
pub mod params;
pub mod radam;
pub mod regression;
pub mod rmsprop;
pub mod scale;
pub mod schedule;
pub mod sgd;
pub mod train;
pub mod transform;

pub use accumulate::{multi_steps, MultiSteps};
pub use adam::{adam, adam_with, adamw, adamw_with, scale_by_adam, ScaleByAdam};
pub use checkpoint::{load_state, save_state, Checkpoint};
pub use clip::{clip, clip_by_global_norm, Clip, ClipByGlobalNorm};
pub use combine::{chain, Chain};
pub use config::{LearningRate, ScheduleConfig, TransformConfig};
pub use ema::{ema, Ema};
pub use error::{Error, Result};
pub use inject::{inject_hyperparams, Hyperparams, InjectHyperparams};
pub use params::{apply_updates, global_norm, Params};
pub use radam::{radam, radam_with, scale_by_radam, ScaleByRAdam};
pub use regression::LinearRegression;
pub use rmsprop::{rmsprop, rmsprop_with, scale_by_rms, ScaleByRms};
pub use scale::{
    add_decayed_weights, scale, scale_by_learning_rate, scale_by_schedule, AddDecayedWeights,
    Scale, ScaleBySchedule,
};
pub use schedule::{
    constant_schedule, cosine_decay_schedule, exponential_decay, join_schedules,
    linear_schedule, piecewise_constant_schedule, polynomial_schedule,
    warmup_cosine_decay_schedule, ScalarOrSchedule, Schedule, SharedSchedule,
};
pub use sgd::{sgd, trace, Trace};
pub use train::{fit, fit_from, FitOutcome};
pub use transform::{identity, BoxedTransformation, GradientTransformation, Identity, TransformState};
