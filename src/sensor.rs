//! Simulated light sensor feeding the uplink.
//!
//! Produces 12-bit ADC readings as a bounded random walk, the way a
//! photoresistor divider drifts with ambient light, and enqueues them as
//! `LIGHT_ADC` events while the queue has headroom.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::UplinkError;
use crate::queue::QUEUE_MAX_LEN;
use crate::uplink::UplinkCore;

/// Full-scale value of the 12-bit ADC.
pub const ADC_MAX: u32 = 4095;

/// One light sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Raw ADC value (0..=ADC_MAX)
    pub adc: u32,

    /// Brightness in percent; lower ADC values mean more light
    pub percent: u8,
}

impl Reading {
    /// Wrap a raw ADC value.
    pub fn new(adc: u32) -> Self {
        Self {
            adc,
            percent: light_percent(adc),
        }
    }
}

/// Brightness percentage for a raw reading (0 = dark, 100 = bright).
///
/// Values above [`ADC_MAX`] are treated as full scale.
pub fn light_percent(adc: u32) -> u8 {
    let adc = adc.min(ADC_MAX);
    // adc * 100 / ADC_MAX is at most 100
    (100 - adc * 100 / ADC_MAX) as u8
}

/// Configuration for the simulated sensor.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Reading before the first sample
    pub initial_adc: u32,

    /// Largest change between two consecutive samples
    pub max_step: u32,

    /// Samples are skipped once the queue holds this many events
    pub high_water: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            initial_adc: ADC_MAX / 2,
            max_step: 200,
            // Keep one slot free for other producers
            high_water: QUEUE_MAX_LEN - 1,
        }
    }
}

/// Random-walk light sensor.
#[derive(Debug, Clone)]
pub struct LightSensor {
    config: SensorConfig,
    adc: u32,
}

impl LightSensor {
    /// Create a sensor with the given configuration.
    pub fn new(config: SensorConfig) -> Self {
        let adc = config.initial_adc.min(ADC_MAX);
        Self { config, adc }
    }

    /// Create a sensor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SensorConfig::default())
    }

    /// Last sampled value.
    pub fn current(&self) -> Reading {
        Reading::new(self.adc)
    }

    /// Take a new sample using the thread-local RNG.
    pub fn sample(&mut self) -> Reading {
        self.sample_with(&mut rand::thread_rng())
    }

    /// Take a new sample from `rng`.
    pub fn sample_with(&mut self, rng: &mut impl Rng) -> Reading {
        let step = i64::from(self.config.max_step);
        let delta = rng.gen_range(-step..=step);
        let next = (i64::from(self.adc) + delta).clamp(0, i64::from(ADC_MAX));
        self.adc = next as u32;
        Reading::new(self.adc)
    }

    /// Sample and enqueue the reading if the queue is below the high-water mark.
    ///
    /// Returns the message id, or `None` when the sample was skipped.
    ///
    /// # Errors
    ///
    /// Whatever [`UplinkCore::enqueue_light_adc`] reports.
    pub fn sample_and_enqueue(&mut self, uplink: &UplinkCore) -> Result<Option<u32>, UplinkError> {
        let reading = self.sample();
        self.enqueue(uplink, reading)
    }

    fn enqueue(&self, uplink: &UplinkCore, reading: Reading) -> Result<Option<u32>, UplinkError> {
        let depth = uplink.queue_depth();
        if depth >= self.config.high_water {
            debug!(adc = reading.adc, depth, "Queue near full, skipping sample");
            return Ok(None);
        }

        match uplink.enqueue_light_adc(reading.adc) {
            Ok(id) => {
                debug!(id, adc = reading.adc, percent = reading.percent, "Light sample queued");
                Ok(Some(id))
            }
            Err(e) => {
                warn!(adc = reading.adc, error = %e, "Failed to queue light sample");
                Err(e)
            }
        }
    }
}
