#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Random straight-line coefficient service.
//!
//! Each accepted request draws a fresh slope and intercept, independently and
//! uniformly, from fixed open intervals. A request whose `ready` flag is
//! `false` is rejected as [`ServiceError::Fatal`]; the hosting node is
//! responsible for shutting down in response.

use fiducial_sim_core::{Coefficients, CoeffsRequest, CoeffsResponse, Service, ServiceError};
use rand::Rng;
use tracing::{debug, error};

/// Lower bound of the slope interval.
pub const DEFAULT_SLOPE_LOW: f32 = 0.1;
/// Upper bound of the slope interval.
pub const DEFAULT_SLOPE_HIGH: f32 = 10.0;
/// Lower bound of the intercept interval.
pub const DEFAULT_INTERCEPT_LOW: f32 = 0.0;
/// Upper bound of the intercept interval.
pub const DEFAULT_INTERCEPT_HIGH: f32 = 0.3;

/// Errors raised while configuring coefficient ranges.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum RangeError {
    /// The bounds are not finite or leave no float strictly between them.
    #[error(
        "invalid {name} range ({low}, {high}): bounds must be finite with a float strictly between them"
    )]
    Invalid {
        /// Coefficient the range belongs to.
        name: &'static str,
        /// Rejected lower bound.
        low: f32,
        /// Rejected upper bound.
        high: f32,
    },
}

/// Open interval `(low, high)` sampled uniformly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OpenRange {
    low: f32,
    high: f32,
}

impl OpenRange {
    /// Creates a range, rejecting non-finite bounds and intervals with no
    /// representable value strictly inside them.
    pub fn new(name: &'static str, low: f32, high: f32) -> Result<Self, RangeError> {
        let valid = low.is_finite()
            && high.is_finite()
            && (high - low).is_finite()
            && next_up(low) < high;
        if !valid {
            return Err(RangeError::Invalid { name, low, high });
        }
        Ok(Self { low, high })
    }

    /// Lower bound, excluded from samples.
    #[must_use]
    pub const fn low(&self) -> f32 {
        self.low
    }

    /// Upper bound, excluded from samples.
    #[must_use]
    pub const fn high(&self) -> f32 {
        self.high
    }

    /// Reports whether `value` lies strictly inside the interval.
    #[must_use]
    pub fn contains(&self, value: f32) -> bool {
        self.low < value && value < self.high
    }

    /// Draws a value strictly inside the interval.
    pub fn sample<R>(&self, rng: &mut R) -> f32
    where
        R: Rng + ?Sized,
    {
        // `gen_range` covers [low, high); resample the rare exact lower bound.
        loop {
            let value = rng.gen_range(self.low..self.high);
            if value > self.low {
                return value;
            }
        }
    }
}

/// Smallest float greater than the finite `value`.
fn next_up(value: f32) -> f32 {
    if value == 0.0 {
        f32::from_bits(1)
    } else if value > 0.0 {
        f32::from_bits(value.to_bits() + 1)
    } else {
        f32::from_bits(value.to_bits() - 1)
    }
}

/// Intervals from which slope and intercept are drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoefficientRanges {
    /// Slope interval.
    pub slope: OpenRange,
    /// Intercept interval.
    pub intercept: OpenRange,
}

impl CoefficientRanges {
    /// Builds ranges from raw bounds.
    pub fn new(slope: (f32, f32), intercept: (f32, f32)) -> Result<Self, RangeError> {
        Ok(Self {
            slope: OpenRange::new("slope", slope.0, slope.1)?,
            intercept: OpenRange::new("intercept", intercept.0, intercept.1)?,
        })
    }
}

impl Default for CoefficientRanges {
    fn default() -> Self {
        Self {
            slope: OpenRange {
                low: DEFAULT_SLOPE_LOW,
                high: DEFAULT_SLOPE_HIGH,
            },
            intercept: OpenRange {
                low: DEFAULT_INTERCEPT_LOW,
                high: DEFAULT_INTERCEPT_HIGH,
            },
        }
    }
}

/// Stateless coefficient generator; only the random source advances between calls.
#[derive(Debug)]
pub struct LineCoefficientService<R> {
    ranges: CoefficientRanges,
    rng: R,
}

impl<R> LineCoefficientService<R>
where
    R: Rng,
{
    /// Creates a service drawing from `rng` within the provided ranges.
    #[must_use]
    pub fn new(ranges: CoefficientRanges, rng: R) -> Self {
        Self { ranges, rng }
    }

    /// Ranges used by the service.
    #[must_use]
    pub fn ranges(&self) -> &CoefficientRanges {
        &self.ranges
    }

    /// Draws an independent slope and intercept.
    pub fn generate(&mut self) -> Coefficients {
        let slope = self.ranges.slope.sample(&mut self.rng);
        let intercept = self.ranges.intercept.sample(&mut self.rng);
        Coefficients { slope, intercept }
    }

    /// Validates the request and answers it with fresh coefficients.
    pub fn handle(&mut self, request: CoeffsRequest) -> Result<CoeffsResponse, ServiceError> {
        if !request.ready {
            error!("ready is false, it must be true");
            return Err(ServiceError::Fatal {
                reason: "ready flag is false".to_owned(),
            });
        }

        let coefficients = self.generate();
        debug!(
            slope = coefficients.slope,
            intercept = coefficients.intercept,
            "generated line coefficients"
        );
        Ok(coefficients.into())
    }
}

impl<R> Service for LineCoefficientService<R>
where
    R: Rng,
{
    type Request = CoeffsRequest;
    type Response = CoeffsResponse;

    fn call(&mut self, request: CoeffsRequest) -> Result<CoeffsResponse, ServiceError> {
        self.handle(request)
    }
}
