//! Scalar Kalman estimator
//!
//! Constant-position model with scalar noise, one measurement per step:
//!
//! ```text
//! predict:      P = P + Q
//! gain:         K = P / (P + R)
//! update:       x = x + K·(z - x)
//! uncertainty:  P = P·(1 - K)
//! ```
//!
//! The first measurement seeds `x` directly so the output does not ramp up
//! from zero at startup.

use thiserror_no_std::Error;

/// Process variance used by the acquisition loop
pub const DEFAULT_PROCESS_VARIANCE: f32 = 0.001;
/// Measurement variance used by the acquisition loop
pub const DEFAULT_MEASUREMENT_VARIANCE: f32 = 0.5;
/// Uncertainty before the first update
pub const INITIAL_UNCERTAINTY: f32 = 1.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterError {
    /// Q must be finite and non-negative, R finite and positive
    #[error("invalid filter variance")]
    InvalidVariance,
}

/// Noise parameters of the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KalmanConfig {
    /// Q
    pub process_variance: f32,
    /// R
    pub measurement_variance: f32,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_variance: DEFAULT_PROCESS_VARIANCE,
            measurement_variance: DEFAULT_MEASUREMENT_VARIANCE,
        }
    }
}

impl KalmanConfig {
    pub fn new(process_variance: f32, measurement_variance: f32) -> Result<Self, FilterError> {
        let config = Self {
            process_variance,
            measurement_variance,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        let q_ok = self.process_variance.is_finite() && self.process_variance >= 0.0;
        let r_ok = self.measurement_variance.is_finite() && self.measurement_variance > 0.0;
        if q_ok && r_ok {
            Ok(())
        } else {
            Err(FilterError::InvalidVariance)
        }
    }
}

/// One-dimensional Kalman filter
#[derive(Debug, Clone)]
pub struct ScalarKalman {
    config: KalmanConfig,
    estimate: Option<f32>,
    uncertainty: f32,
    gain: f32,
}

impl Default for ScalarKalman {
    fn default() -> Self {
        Self::new(KalmanConfig::default())
    }
}

impl ScalarKalman {
    /// Build a filter from an already validated config
    pub fn new(config: KalmanConfig) -> Self {
        Self {
            config,
            estimate: None,
            uncertainty: INITIAL_UNCERTAINTY,
            gain: 0.0,
        }
    }

    /// Feed one raw measurement, returns the new estimate
    pub fn update(&mut self, measurement: f32) -> f32 {
        let Some(estimate) = self.estimate else {
            self.estimate = Some(measurement);
            return measurement;
        };

        self.uncertainty += self.config.process_variance;
        self.gain = self.uncertainty / (self.uncertainty + self.config.measurement_variance);
        let estimate = estimate + self.gain * (measurement - estimate);
        self.uncertainty *= 1.0 - self.gain;

        self.estimate = Some(estimate);
        estimate
    }

    /// Current estimate, `None` before the first measurement
    pub fn estimate(&self) -> Option<f32> {
        self.estimate
    }

    /// Estimate variance after the last update
    pub fn uncertainty(&self) -> f32 {
        self.uncertainty
    }

    /// Gain used by the last update
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Noise parameters the filter was built with
    pub fn config(&self) -> KalmanConfig {
        self.config
    }

    /// Forget all state, the next measurement seeds the estimate again
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }
}
