// Schedules — pure functions from step count to a scalar
//
// A schedule maps the number of updates performed so far to a value: a
// learning rate, a clipping threshold, a momentum coefficient. Schedules hold
// no mutable state; the step count lives in the state of the transformation
// that evaluates them (scale_by_schedule, inject_hyperparams).
//
// IMPLEMENTED:
//   - constant_schedule
//   - polynomial_schedule / linear_schedule: interpolate init → end
//   - exponential_decay: init * rate^(step / transition_steps), optional staircase
//   - cosine_decay_schedule: cosine from init to alpha * init
//   - warmup_cosine_decay_schedule: linear warmup → cosine decay
//   - piecewise_constant_schedule: multiply by a scale at each boundary
//   - join_schedules: switch between schedules at step boundaries
//
// USAGE:
//   let lr = exponential_decay(0.1, 1000, 0.99);
//   let opt = chain![scale_by_adam(), scale_by_schedule(lr), scale(-1.0)];

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

// Schedule Trait

/// A pure function of the step count.
pub trait Schedule: Send + Sync {
    /// Value of the schedule after `count` updates.
    fn value(&self, count: u64) -> f64;
}

impl<F> Schedule for F
where
    F: Fn(u64) -> f64 + Send + Sync,
{
    fn value(&self, count: u64) -> f64 {
        self(count)
    }
}

/// Shared, type-erased schedule. Cheap to clone.
#[derive(Clone)]
pub struct SharedSchedule(Arc<dyn Schedule>);

impl SharedSchedule {
    pub fn new(schedule: impl Schedule + 'static) -> Self {
        SharedSchedule(Arc::new(schedule))
    }
}

impl Schedule for SharedSchedule {
    fn value(&self, count: u64) -> f64 {
        self.0.value(count)
    }
}

impl fmt::Debug for SharedSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSchedule(..)")
    }
}

// ScalarOrSchedule

/// A hyperparameter that is either fixed or follows a schedule.
#[derive(Clone)]
pub enum ScalarOrSchedule {
    Constant(f64),
    Schedule(SharedSchedule),
}

impl ScalarOrSchedule {
    /// Value after `count` updates.
    pub fn value(&self, count: u64) -> f64 {
        match self {
            ScalarOrSchedule::Constant(v) => *v,
            ScalarOrSchedule::Schedule(s) => s.value(count),
        }
    }

    pub fn is_schedule(&self) -> bool {
        matches!(self, ScalarOrSchedule::Schedule(_))
    }
}

impl fmt::Debug for ScalarOrSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarOrSchedule::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            ScalarOrSchedule::Schedule(_) => f.write_str("Schedule(..)"),
        }
    }
}

impl From<f64> for ScalarOrSchedule {
    fn from(v: f64) -> Self {
        ScalarOrSchedule::Constant(v)
    }
}

impl<S: Schedule + 'static> From<S> for ScalarOrSchedule {
    fn from(s: S) -> Self {
        ScalarOrSchedule::Schedule(SharedSchedule::new(s))
    }
}

// Constant

/// Always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSchedule {
    value: f64,
}

pub fn constant_schedule(value: f64) -> ConstantSchedule {
    ConstantSchedule { value }
}

impl Schedule for ConstantSchedule {
    fn value(&self, _count: u64) -> f64 {
        self.value
    }
}

// Polynomial / Linear

/// Polynomial interpolation from `init_value` to `end_value`.
///
/// ```text
/// t = clamp(count - transition_begin, 0, transition_steps)
/// value = (init - end) * (1 - t / transition_steps)^power + end
/// ```
///
/// Before `transition_begin` the value is `init_value`; after
/// `transition_begin + transition_steps` it stays at `end_value`.
#[derive(Debug, Clone, Copy)]
pub struct PolynomialSchedule {
    init_value: f64,
    end_value: f64,
    power: f64,
    transition_steps: u64,
    transition_begin: u64,
}

pub fn polynomial_schedule(
    init_value: f64,
    end_value: f64,
    power: f64,
    transition_steps: u64,
) -> PolynomialSchedule {
    PolynomialSchedule {
        init_value,
        end_value,
        power,
        transition_steps,
        transition_begin: 0,
    }
}

/// Linear interpolation from `init_value` to `end_value` over `transition_steps`.
///
/// `value(0) == init_value` and `value(transition_steps) == end_value` exactly.
pub fn linear_schedule(init_value: f64, end_value: f64, transition_steps: u64) -> PolynomialSchedule {
    polynomial_schedule(init_value, end_value, 1.0, transition_steps)
}

impl PolynomialSchedule {
    /// Hold `init_value` for the first `steps` updates.
    pub fn transition_begin(mut self, steps: u64) -> Self {
        self.transition_begin = steps;
        self
    }
}

impl Schedule for PolynomialSchedule {
    fn value(&self, count: u64) -> f64 {
        if self.transition_steps == 0 {
            return self.init_value;
        }
        let t = count
            .saturating_sub(self.transition_begin)
            .min(self.transition_steps);
        let frac = 1.0 - t as f64 / self.transition_steps as f64;
        (self.init_value - self.end_value) * frac.powf(self.power) + self.end_value
    }
}

// Exponential decay

/// Exponential decay of `init_value` by `decay_rate` every `transition_steps`.
///
/// ```text
/// p = (count - transition_begin) / transition_steps      (floored if staircase)
/// value = init_value * decay_rate^p
/// ```
///
/// With `end_value` set the result is clamped: a floor when decaying, a
/// ceiling when `decay_rate > 1`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialDecay {
    init_value: f64,
    transition_steps: u64,
    decay_rate: f64,
    transition_begin: u64,
    staircase: bool,
    end_value: Option<f64>,
}

pub fn exponential_decay(init_value: f64, transition_steps: u64, decay_rate: f64) -> ExponentialDecay {
    ExponentialDecay {
        init_value,
        transition_steps,
        decay_rate,
        transition_begin: 0,
        staircase: false,
        end_value: None,
    }
}

impl ExponentialDecay {
    pub fn transition_begin(mut self, steps: u64) -> Self {
        self.transition_begin = steps;
        self
    }

    /// Decay in discrete jumps every `transition_steps`.
    pub fn staircase(mut self, staircase: bool) -> Self {
        self.staircase = staircase;
        self
    }

    /// Bound the decayed value.
    pub fn end_value(mut self, end_value: f64) -> Self {
        self.end_value = Some(end_value);
        self
    }
}

impl Schedule for ExponentialDecay {
    fn value(&self, count: u64) -> f64 {
        if self.transition_steps == 0 {
            return self.init_value;
        }
        let steps = count.saturating_sub(self.transition_begin);
        let mut p = steps as f64 / self.transition_steps as f64;
        if self.staircase {
            p = p.floor();
        }
        let decayed = self.init_value * self.decay_rate.powf(p);
        match self.end_value {
            Some(end) if self.decay_rate < 1.0 => decayed.max(end),
            Some(end) => decayed.min(end),
            None => decayed,
        }
    }
}

// Cosine decay

/// Cosine decay from `init_value` to `alpha * init_value` over `decay_steps`.
///
/// ```text
/// value = init * ((1 - alpha) * 0.5 * (1 + cos(π * min(count, decay_steps) / decay_steps)) + alpha)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CosineDecay {
    init_value: f64,
    decay_steps: u64,
    alpha: f64,
}

pub fn cosine_decay_schedule(init_value: f64, decay_steps: u64, alpha: f64) -> CosineDecay {
    CosineDecay {
        init_value,
        decay_steps,
        alpha,
    }
}

impl Schedule for CosineDecay {
    fn value(&self, count: u64) -> f64 {
        if self.decay_steps == 0 {
            return self.init_value * self.alpha;
        }
        let progress = count.min(self.decay_steps) as f64 / self.decay_steps as f64;
        let cosine = 0.5 * (1.0 + (PI * progress).cos());
        self.init_value * ((1.0 - self.alpha) * cosine + self.alpha)
    }
}

// Warmup + cosine decay

/// Linear warmup from `init_value` to `peak_value`, then cosine decay to
/// `end_value`.
///
/// `decay_steps` counts the whole schedule, warmup included.
#[derive(Debug, Clone, Copy)]
pub struct WarmupCosineDecay {
    warmup: PolynomialSchedule,
    warmup_steps: u64,
    peak_value: f64,
    end_value: f64,
    cosine_steps: u64,
}

pub fn warmup_cosine_decay_schedule(
    init_value: f64,
    peak_value: f64,
    warmup_steps: u64,
    decay_steps: u64,
    end_value: f64,
) -> WarmupCosineDecay {
    WarmupCosineDecay {
        warmup: linear_schedule(init_value, peak_value, warmup_steps),
        warmup_steps,
        peak_value,
        end_value,
        cosine_steps: decay_steps.saturating_sub(warmup_steps),
    }
}

impl Schedule for WarmupCosineDecay {
    fn value(&self, count: u64) -> f64 {
        if count < self.warmup_steps {
            return self.warmup.value(count);
        }
        if self.cosine_steps == 0 {
            return self.end_value;
        }
        let progress = (count - self.warmup_steps).min(self.cosine_steps) as f64
            / self.cosine_steps as f64;
        let cosine = 0.5 * (1.0 + (PI * progress).cos());
        self.end_value + (self.peak_value - self.end_value) * cosine
    }
}

// Piecewise constant

/// Start at `init_value` and multiply by `scale` once `count >= boundary`,
/// for each `(boundary, scale)` pair.
#[derive(Debug, Clone)]
pub struct PiecewiseConstant {
    init_value: f64,
    boundaries_and_scales: Vec<(u64, f64)>,
}

pub fn piecewise_constant_schedule(
    init_value: f64,
    boundaries_and_scales: impl IntoIterator<Item = (u64, f64)>,
) -> PiecewiseConstant {
    let mut boundaries_and_scales: Vec<_> = boundaries_and_scales.into_iter().collect();
    boundaries_and_scales.sort_by_key(|&(boundary, _)| boundary);
    PiecewiseConstant {
        init_value,
        boundaries_and_scales,
    }
}

impl Schedule for PiecewiseConstant {
    fn value(&self, count: u64) -> f64 {
        self.boundaries_and_scales
            .iter()
            .take_while(|&&(boundary, _)| count >= boundary)
            .fold(self.init_value, |v, &(_, scale)| v * scale)
    }
}

// Join

/// Run `schedules[0]` until `boundaries[0]`, then `schedules[1]` restarted at
/// zero, and so on. Requires `boundaries.len() + 1 == schedules.len()`.
#[derive(Clone)]
pub struct JoinSchedules {
    schedules: Vec<SharedSchedule>,
    boundaries: Vec<u64>,
}

pub fn join_schedules(
    schedules: Vec<SharedSchedule>,
    boundaries: Vec<u64>,
) -> crate::error::Result<JoinSchedules> {
    if schedules.len() != boundaries.len() + 1 {
        return Err(crate::error::Error::invalid(format!(
            "join_schedules needs one more schedule than boundaries, got {} and {}",
            schedules.len(),
            boundaries.len()
        )));
    }
    if boundaries.windows(2).any(|w| w[0] > w[1]) {
        return Err(crate::error::Error::invalid(
            "join_schedules boundaries must be non-decreasing",
        ));
    }
    Ok(JoinSchedules {
        schedules,
        boundaries,
    })
}

impl Schedule for JoinSchedules {
    fn value(&self, count: u64) -> f64 {
        let idx = self.boundaries.iter().take_while(|&&b| count >= b).count();
        let offset = if idx == 0 { 0 } else { self.boundaries[idx - 1] };
        self.schedules[idx].value(count - offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_hits_both_endpoints_exactly() {
        let s = linear_schedule(1.0, 0.0, 99);
        assert_eq!(s.value(0), 1.0);
        assert_eq!(s.value(99), 0.0);
        assert_eq!(s.value(500), 0.0);
        assert!((s.value(33) - (1.0 - 33.0 / 99.0)).abs() < 1e-12);
    }

    #[test]
    fn linear_transition_begin_holds_init() {
        let s = linear_schedule(2.0, 4.0, 10).transition_begin(5);
        assert_eq!(s.value(3), 2.0);
        assert_eq!(s.value(5), 2.0);
        assert_eq!(s.value(10), 3.0);
        assert_eq!(s.value(15), 4.0);
    }

    #[test]
    fn polynomial_power_two() {
        let s = polynomial_schedule(1.0, 0.0, 2.0, 10);
        assert!((s.value(5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn exponential_decay_continuous_and_staircase() {
        let s = exponential_decay(0.1, 1000, 0.99);
        assert_eq!(s.value(0), 0.1);
        assert!((s.value(1000) - 0.099).abs() < 1e-12);
        assert!((s.value(500) - 0.1 * 0.99f64.powf(0.5)).abs() < 1e-12);

        let stairs = exponential_decay(1.0, 10, 0.5).staircase(true);
        assert_eq!(stairs.value(9), 1.0);
        assert_eq!(stairs.value(10), 0.5);
        assert_eq!(stairs.value(25), 0.25);
    }

    #[test]
    fn exponential_decay_respects_end_value() {
        let s = exponential_decay(1.0, 1, 0.5).end_value(0.2);
        assert_eq!(s.value(10), 0.2);

        let growth = exponential_decay(1.0, 1, 2.0).end_value(5.0);
        assert_eq!(growth.value(10), 5.0);
    }

    #[test]
    fn zero_transition_steps_yield_init() {
        assert_eq!(linear_schedule(3.0, 0.0, 0).value(10), 3.0);
        assert_eq!(exponential_decay(3.0, 0, 0.5).value(10), 3.0);
    }

    #[test]
    fn cosine_decay_reaches_alpha() {
        let s = cosine_decay_schedule(1.0, 100, 0.1);
        assert_eq!(s.value(0), 1.0);
        assert!((s.value(50) - 0.55).abs() < 1e-12);
        assert!((s.value(100) - 0.1).abs() < 1e-12);
        assert!((s.value(1000) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn warmup_then_cosine() {
        let s = warmup_cosine_decay_schedule(0.0, 1.0, 10, 110, 0.0);
        assert_eq!(s.value(0), 0.0);
        assert!((s.value(5) - 0.5).abs() < 1e-12);
        assert_eq!(s.value(10), 1.0);
        assert!((s.value(60) - 0.5).abs() < 1e-12);
        assert!(s.value(110).abs() < 1e-12);
    }

    #[test]
    fn piecewise_constant_multiplies_at_boundaries() {
        let s = piecewise_constant_schedule(1.0, [(20, 0.1), (10, 0.5)]);
        assert_eq!(s.value(9), 1.0);
        assert_eq!(s.value(10), 0.5);
        assert!((s.value(20) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn join_restarts_each_segment() {
        let warm = SharedSchedule::new(linear_schedule(0.0, 1.0, 4));
        let flat = SharedSchedule::new(constant_schedule(1.0));
        let s = join_schedules(vec![warm, flat], vec![4]).unwrap();
        assert_eq!(s.value(2), 0.5);
        assert_eq!(s.value(4), 1.0);
        assert_eq!(s.value(100), 1.0);

        assert!(join_schedules(Vec::new(), vec![1]).is_err());
    }

    #[test]
    fn closures_are_schedules() {
        let s = ScalarOrSchedule::Schedule(SharedSchedule::new(|c: u64| c as f64 * 2.0));
        assert!(s.is_schedule());
        assert_eq!(s.value(3), 6.0);
        assert_eq!(ScalarOrSchedule::from(0.5).value(100), 0.5);

        let halving = ScalarOrSchedule::from(|c: u64| 0.5f64.powi(c as i32));
        assert!(halving.is_schedule());
        assert_eq!(halving.value(2), 0.25);
    }

    #[test]
    fn join_rejects_decreasing_boundaries() {
        let a = SharedSchedule::new(constant_schedule(1.0));
        let b = SharedSchedule::new(constant_schedule(2.0));
        let c = SharedSchedule::new(constant_schedule(3.0));
        assert!(matches!(
            join_schedules(vec![a, b, c], vec![10, 5]),
            Err(crate::error::Error::InvalidArgument(_))
        ));
    }
}
