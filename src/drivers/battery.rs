//! battery.rs
//! Battery voltage sensing and the startup charge check.

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::StartupError,
    hal::{AdcChannel, BatteryMonitor},
};

/// Divider and reference of the battery sense input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    pub adc_reference_volts: f64,
    pub adc_full_scale: f64,
    /// (R1 + R2) / R2 of the sense divider.
    pub divider_ratio: f64,
    /// Empirical correction against a multimeter.
    pub correction: f64,
    pub minimum_volts: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            adc_reference_volts: 3.3,
            adc_full_scale: 4_095.0,
            divider_ratio: 58.0 / 20.0,
            correction: 1.125,
            minimum_volts: 6.65,
        }
    }
}

impl BatteryConfig {
    pub fn volts_from_adc(&self, raw: i32) -> f64 {
        f64::from(raw) * (self.adc_reference_volts / self.adc_full_scale) * self.divider_ratio * self.correction
    }

    /// Refuse to start on a pack at or below the minimum.
    pub fn check(&self, volts: f64) -> Result<f64, StartupError> {
        if volts <= self.minimum_volts {
            error!("[Battery] {:.2} V, charge batteries", volts);
            return Err(StartupError::LowBattery {
                volts,
                minimum: self.minimum_volts,
            });
        }
        info!("[Battery] {:.2} V", volts);
        Ok(volts)
    }
}

/// Battery monitor reading through an ADC channel.
pub struct AdcBattery<A: AdcChannel> {
    adc: A,
    config: BatteryConfig,
}

impl<A: AdcChannel> AdcBattery<A> {
    pub fn new(adc: A, config: BatteryConfig) -> Self {
        Self { adc, config }
    }

    pub fn startup_check(&mut self) -> Result<f64, StartupError> {
        let volts = self.volts();
        self.config.check(volts)
    }
}

impl<A: AdcChannel> BatteryMonitor for AdcBattery<A> {
    fn volts(&mut self) -> f64 {
        self.config.volts_from_adc(self.adc.read_raw())
    }
}
