// Optimizer configuration — describe a transformation in JSON
//
// Every transformation and schedule in the crate has a serde counterpart, so
// an optimizer can be picked at run time:
//
//   {
//     "type": "chain",
//     "stages": [
//       { "type": "clip_by_global_norm", "max_norm": 1.0 },
//       { "type": "scale_by_adam" },
//       { "type": "scale_by_schedule",
//         "schedule": { "schedule": "exponential_decay", "init_value": 0.1,
//                       "transition_steps": 1000, "decay_rate": 0.99 } },
//       { "type": "scale", "step_size": -1.0 }
//     ]
//   }
//
// Learning rates accept either a number or a schedule object. Hyperparameter
// injection takes a closure and therefore has no config form.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::accumulate::multi_steps;
use crate::adam::{adam_with, adamw_with, scale_by_adam, ScaleByAdam};
use crate::clip::{clip, clip_by_global_norm};
use crate::combine::chain;
use crate::ema::ema;
use crate::error::{Error, Result};
use crate::radam::{radam_with, scale_by_radam, ScaleByRAdam};
use crate::rmsprop::{rmsprop_with, scale_by_rms, ScaleByRms};
use crate::scale::{add_decayed_weights, scale, scale_by_learning_rate, scale_by_schedule};
use crate::schedule::{
    constant_schedule, cosine_decay_schedule, exponential_decay, piecewise_constant_schedule,
    join_schedules, polynomial_schedule, warmup_cosine_decay_schedule, ScalarOrSchedule,
    SharedSchedule,
};
use crate::sgd::{sgd, trace};
use crate::transform::{identity, BoxedTransformation};

fn default_b1() -> f64 {
    0.9
}

fn default_b2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-8
}

fn default_rms_decay() -> f64 {
    0.9
}

fn default_weight_decay() -> f64 {
    1e-4
}

fn default_threshold() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

// Schedules

/// Serializable description of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schedule", rename_all = "snake_case", deny_unknown_fields)]
pub enum ScheduleConfig {
    Constant {
        value: f64,
    },
    Linear {
        init_value: f64,
        end_value: f64,
        transition_steps: u64,
        #[serde(default)]
        transition_begin: u64,
    },
    Polynomial {
        init_value: f64,
        end_value: f64,
        power: f64,
        transition_steps: u64,
        #[serde(default)]
        transition_begin: u64,
    },
    ExponentialDecay {
        init_value: f64,
        transition_steps: u64,
        decay_rate: f64,
        #[serde(default)]
        transition_begin: u64,
        #[serde(default)]
        staircase: bool,
        #[serde(default)]
        end_value: Option<f64>,
    },
    CosineDecay {
        init_value: f64,
        decay_steps: u64,
        #[serde(default)]
        alpha: f64,
    },
    WarmupCosineDecay {
        init_value: f64,
        peak_value: f64,
        warmup_steps: u64,
        decay_steps: u64,
        #[serde(default)]
        end_value: f64,
    },
    PiecewiseConstant {
        init_value: f64,
        boundaries_and_scales: Vec<(u64, f64)>,
    },
    /// Switch from `schedules[i]` to `schedules[i + 1]` at `boundaries[i]`.
    Join {
        schedules: Vec<ScheduleConfig>,
        boundaries: Vec<u64>,
    },
}

impl ScheduleConfig {
    pub fn build(&self) -> Result<SharedSchedule> {
        let schedule = match *self {
            ScheduleConfig::Constant { value } => SharedSchedule::new(constant_schedule(value)),
            ScheduleConfig::Linear {
                init_value,
                end_value,
                transition_steps,
                transition_begin,
            } => SharedSchedule::new(
                polynomial_schedule(init_value, end_value, 1.0, transition_steps)
                    .transition_begin(transition_begin),
            ),
            ScheduleConfig::Polynomial {
                init_value,
                end_value,
                power,
                transition_steps,
                transition_begin,
            } => SharedSchedule::new(
                polynomial_schedule(init_value, end_value, power, transition_steps)
                    .transition_begin(transition_begin),
            ),
            ScheduleConfig::ExponentialDecay {
                init_value,
                transition_steps,
                decay_rate,
                transition_begin,
                staircase,
                end_value,
            } => {
                if decay_rate <= 0.0 {
                    return Err(Error::invalid(format!(
                        "exponential_decay needs decay_rate > 0, got {decay_rate}"
                    )));
                }
                let mut s = exponential_decay(init_value, transition_steps, decay_rate)
                    .transition_begin(transition_begin)
                    .staircase(staircase);
                if let Some(end) = end_value {
                    s = s.end_value(end);
                }
                SharedSchedule::new(s)
            }
            ScheduleConfig::CosineDecay {
                init_value,
                decay_steps,
                alpha,
            } => SharedSchedule::new(cosine_decay_schedule(init_value, decay_steps, alpha)),
            ScheduleConfig::WarmupCosineDecay {
                init_value,
                peak_value,
                warmup_steps,
                decay_steps,
                end_value,
            } => {
                if warmup_steps > decay_steps {
                    return Err(Error::invalid(format!(
                        "warmup_steps ({warmup_steps}) must be <= decay_steps ({decay_steps})"
                    )));
                }
                SharedSchedule::new(warmup_cosine_decay_schedule(
                    init_value,
                    peak_value,
                    warmup_steps,
                    decay_steps,
                    end_value,
                ))
            }
            ScheduleConfig::PiecewiseConstant {
                init_value,
                ref boundaries_and_scales,
            } => SharedSchedule::new(piecewise_constant_schedule(
                init_value,
                boundaries_and_scales.iter().copied(),
            )),
            ScheduleConfig::Join {
                ref schedules,
                ref boundaries,
            } => SharedSchedule::new(join_schedules(
                schedules.iter().map(|s| s.build()).collect::<Result<Vec<_>>>()?,
                boundaries.clone(),
            )?),
        };
        Ok(schedule)
    }
}

/// A learning rate: a plain number or a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LearningRate {
    Constant(f64),
    Schedule(ScheduleConfig),
}

impl LearningRate {
    pub fn build(&self) -> Result<ScalarOrSchedule> {
        match self {
            LearningRate::Constant(lr) if *lr < 0.0 => Err(Error::invalid(format!(
                "learning rate must be non-negative, got {lr}"
            ))),
            LearningRate::Constant(lr) => Ok(ScalarOrSchedule::Constant(*lr)),
            LearningRate::Schedule(s) => Ok(ScalarOrSchedule::Schedule(s.build()?)),
        }
    }
}

// Transformations

/// Serializable description of a transformation or optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TransformConfig {
    Identity,
    Sgd {
        learning_rate: LearningRate,
        #[serde(default)]
        momentum: Option<f64>,
        #[serde(default)]
        nesterov: bool,
    },
    Adam {
        learning_rate: LearningRate,
        #[serde(default = "default_b1")]
        b1: f64,
        #[serde(default = "default_b2")]
        b2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        eps_root: f64,
    },
    #[serde(rename = "adamw")]
    AdamW {
        learning_rate: LearningRate,
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
        #[serde(default = "default_b1")]
        b1: f64,
        #[serde(default = "default_b2")]
        b2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        eps_root: f64,
    },
    #[serde(rename = "radam")]
    RAdam {
        learning_rate: LearningRate,
        #[serde(default = "default_b1")]
        b1: f64,
        #[serde(default = "default_b2")]
        b2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        eps_root: f64,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    #[serde(rename = "rmsprop")]
    RmsProp {
        learning_rate: LearningRate,
        #[serde(default = "default_rms_decay")]
        decay: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        initial_scale: f64,
        #[serde(default)]
        momentum: Option<f64>,
        #[serde(default)]
        centered: bool,
    },
    Scale {
        step_size: f64,
    },
    ScaleBySchedule {
        schedule: ScheduleConfig,
    },
    ScaleByLearningRate {
        learning_rate: LearningRate,
    },
    ScaleByAdam {
        #[serde(default = "default_b1")]
        b1: f64,
        #[serde(default = "default_b2")]
        b2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        eps_root: f64,
    },
    #[serde(rename = "scale_by_radam")]
    ScaleByRAdam {
        #[serde(default = "default_b1")]
        b1: f64,
        #[serde(default = "default_b2")]
        b2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        eps_root: f64,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    ScaleByRms {
        #[serde(default = "default_rms_decay")]
        decay: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        initial_scale: f64,
        #[serde(default)]
        centered: bool,
    },
    Trace {
        decay: f64,
        #[serde(default)]
        nesterov: bool,
    },
    AddDecayedWeights {
        weight_decay: f64,
    },
    Clip {
        max_delta: f64,
    },
    ClipByGlobalNorm {
        max_norm: f64,
    },
    Ema {
        decay: f64,
        #[serde(default = "default_true")]
        debias: bool,
    },
    Chain {
        stages: Vec<TransformConfig>,
    },
    MultiSteps {
        every_k: u64,
        inner: Box<TransformConfig>,
    },
}

fn check_beta(name: &str, beta: f64) -> Result<()> {
    if (0.0..1.0).contains(&beta) {
        Ok(())
    } else {
        Err(Error::invalid(format!("{name} must be in [0, 1), got {beta}")))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!("{name} must be non-negative, got {value}")))
    }
}

fn check_moments(b1: f64, b2: f64, eps: f64, eps_root: f64) -> Result<()> {
    check_beta("b1", b1)?;
    check_beta("b2", b2)?;
    check_non_negative("eps", eps)?;
    check_non_negative("eps_root", eps_root)
}

fn adam_moments(b1: f64, b2: f64, eps: f64, eps_root: f64) -> Result<ScaleByAdam> {
    check_moments(b1, b2, eps, eps_root)?;
    Ok(scale_by_adam()
        .beta1(b1)
        .beta2(b2)
        .epsilon(eps)
        .eps_root(eps_root))
}

fn radam_moments(
    b1: f64,
    b2: f64,
    eps: f64,
    eps_root: f64,
    threshold: f64,
) -> Result<ScaleByRAdam> {
    check_moments(b1, b2, eps, eps_root)?;
    Ok(scale_by_radam()
        .beta1(b1)
        .beta2(b2)
        .epsilon(eps)
        .eps_root(eps_root)
        .threshold(threshold))
}

fn rms(decay: f64, eps: f64, initial_scale: f64, centered: bool) -> Result<ScaleByRms> {
    check_beta("decay", decay)?;
    check_non_negative("eps", eps)?;
    check_non_negative("initial_scale", initial_scale)?;
    Ok(scale_by_rms()
        .decay(decay)
        .epsilon(eps)
        .initial_scale(initial_scale)
        .centered(centered))
}

impl TransformConfig {
    /// Parse a config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a config from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate and build the transformation.
    pub fn build(&self) -> Result<BoxedTransformation> {
        let built: BoxedTransformation = match self {
            TransformConfig::Identity => Box::new(identity()),
            TransformConfig::Sgd {
                learning_rate,
                momentum,
                nesterov,
            } => {
                if let Some(m) = momentum {
                    check_beta("momentum", *m)?;
                }
                sgd(learning_rate.build()?, *momentum, *nesterov)
            }
            TransformConfig::Adam {
                learning_rate,
                b1,
                b2,
                eps,
                eps_root,
            } => adam_with(
                learning_rate.build()?,
                adam_moments(*b1, *b2, *eps, *eps_root)?,
            ),
            TransformConfig::AdamW {
                learning_rate,
                weight_decay,
                b1,
                b2,
                eps,
                eps_root,
            } => {
                check_non_negative("weight_decay", *weight_decay)?;
                adamw_with(
                    learning_rate.build()?,
                    *weight_decay,
                    adam_moments(*b1, *b2, *eps, *eps_root)?,
                )
            }
            TransformConfig::RAdam {
                learning_rate,
                b1,
                b2,
                eps,
                eps_root,
                threshold,
            } => radam_with(
                learning_rate.build()?,
                radam_moments(*b1, *b2, *eps, *eps_root, *threshold)?,
            ),
            TransformConfig::RmsProp {
                learning_rate,
                decay,
                eps,
                initial_scale,
                momentum,
                centered,
            } => {
                if let Some(m) = momentum {
                    check_beta("momentum", *m)?;
                }
                rmsprop_with(
                    learning_rate.build()?,
                    rms(*decay, *eps, *initial_scale, *centered)?,
                    *momentum,
                )
            }
            TransformConfig::Scale { step_size } => Box::new(scale(*step_size)),
            TransformConfig::ScaleBySchedule { schedule } => {
                Box::new(scale_by_schedule(schedule.build()?))
            }
            TransformConfig::ScaleByLearningRate { learning_rate } => {
                scale_by_learning_rate(learning_rate.build()?)
            }
            TransformConfig::ScaleByAdam {
                b1,
                b2,
                eps,
                eps_root,
            } => Box::new(adam_moments(*b1, *b2, *eps, *eps_root)?),
            TransformConfig::ScaleByRAdam {
                b1,
                b2,
                eps,
                eps_root,
                threshold,
            } => Box::new(radam_moments(*b1, *b2, *eps, *eps_root, *threshold)?),
            TransformConfig::ScaleByRms {
                decay,
                eps,
                initial_scale,
                centered,
            } => Box::new(rms(*decay, *eps, *initial_scale, *centered)?),
            TransformConfig::Trace { decay, nesterov } => {
                check_beta("decay", *decay)?;
                Box::new(trace(*decay, *nesterov))
            }
            TransformConfig::AddDecayedWeights { weight_decay } => {
                Box::new(add_decayed_weights(*weight_decay))
            }
            TransformConfig::Clip { max_delta } => {
                check_non_negative("max_delta", *max_delta)?;
                Box::new(clip(*max_delta))
            }
            TransformConfig::ClipByGlobalNorm { max_norm } => {
                check_non_negative("max_norm", *max_norm)?;
                Box::new(clip_by_global_norm(*max_norm))
            }
            TransformConfig::Ema { decay, debias } => {
                check_beta("decay", *decay)?;
                Box::new(ema(*decay, *debias))
            }
            TransformConfig::Chain { stages } => Box::new(chain(
                stages.iter().map(|s| s.build()).collect::<Result<Vec<_>>>()?,
            )),
            TransformConfig::MultiSteps { every_k, inner } => {
                Box::new(multi_steps(inner.build()?, *every_k)?)
            }
        };
        Ok(built)
    }
}
