//! # Bounded Random Walk
//!
//! The elementary signal behind every simulated quantity: a value drifting
//! toward a randomly chosen target within `[base - variance, base + variance]`,
//! re-targeting after a configurable dwell time or once the target is crossed.

use rand::Rng;

use super::ModelError;

/// A scalar quantity drifting inside a bounded band around its base value.
///
/// Each call to [`advance`](RandomWalk::advance) moves the value a constant
/// fraction of the base-to-target span per unit of dwell time, so the net
/// drift over a given wall-clock duration is independent of how often the
/// walk is ticked (to first order). The value is clamped into the band after
/// every move.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    /// Center value the quantity drifts around.
    base: f64,
    /// Maximum allowed deviation from the base.
    variance: f64,
    /// Time budget before a forced re-target, in seconds.
    dwell_s: f64,
    current: f64,
    target: f64,
    /// Seconds elapsed since the last re-target.
    elapsed_s: f64,
}

impl RandomWalk {
    /// Creates a walk at rest: `current = target = base`.
    ///
    /// # Errors
    ///
    /// Rejects a non-positive or non-finite dwell time (the step formula
    /// divides by it) and a negative variance.
    pub fn new(
        signal: &'static str,
        base: f64,
        variance: f64,
        dwell_s: f64,
    ) -> Result<Self, ModelError> {
        if !(dwell_s.is_finite() && dwell_s > 0.0) {
            return Err(ModelError::InvalidDwell { signal, dwell_s });
        }
        if variance < 0.0 {
            return Err(ModelError::NegativeVariance { signal, variance });
        }
        Ok(Self {
            base,
            variance,
            dwell_s,
            current: base,
            target: base,
            elapsed_s: 0.0,
        })
    }

    /// Advances the walk by `delta_s` seconds and returns the new value.
    ///
    /// A new target is chosen uniformly in the band when no drift is active
    /// yet (`target == base`), when the dwell budget is exhausted, or when
    /// the value has crossed past the target on either side of the base.
    pub fn advance(&mut self, delta_s: f64, rng: &mut impl Rng) -> f64 {
        let crossed_above = self.base < self.target && self.target < self.current;
        let crossed_below = self.base > self.target && self.target > self.current;
        if self.target == self.base
            || self.elapsed_s >= self.dwell_s
            || crossed_above
            || crossed_below
        {
            self.target = self.base + self.variance * (2.0 * rng.gen::<f64>() - 1.0);
            self.elapsed_s = 0.0;
        }

        self.current += delta_s / self.dwell_s * (self.target - self.base);
        self.current = self
            .current
            .clamp(self.base - self.variance, self.base + self.variance);
        self.elapsed_s += delta_s;

        self.current
    }

    /// Current value of the walk.
    pub fn value(&self) -> f64 {
        self.current
    }
}
