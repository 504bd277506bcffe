//! sensor_array.rs
//! Reflectance array: per-channel calibration, line centroid and thickness.
//!
//! Channels may be unpopulated. They are skipped by index, so the weight of every
//! populated channel still reflects its physical position.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    drivers::light_sensor::LightSensor,
    error::CalibrationError,
    hal::{AdcChannel, EmitterPins},
};

/// Line-width estimate from the total normalized signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Thickness {
    NoLine,
    Normal,
    Thick,
}

impl Thickness {
    pub const fn code(self) -> u8 {
        match self {
            Thickness::NoLine => 0,
            Thickness::Normal => 1,
            Thickness::Thick => 2,
        }
    }
}

/// Empirically tuned for the 13-channel array and this track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThicknessThresholds {
    /// Sum at or below this is too faint to locate a line.
    pub no_line_max: f64,
    /// Sum at or above this is a thick line.
    pub thick_min: f64,
}

impl Default for ThicknessThresholds {
    fn default() -> Self {
        Self {
            no_line_max: 1.0,
            thick_min: 6.5,
        }
    }
}

impl ThicknessThresholds {
    pub fn classify(&self, sum: f64) -> Thickness {
        if sum <= self.no_line_max {
            Thickness::NoLine
        } else if sum >= self.thick_min {
            Thickness::Thick
        } else {
            Thickness::Normal
        }
    }
}

/// One array sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineReading {
    /// Not enough signal; there is no meaningful centroid.
    NoLine,
    Line {
        /// 1-based channel position.
        centroid: f64,
        thickness: Thickness,
    },
}

impl LineReading {
    pub fn thickness(&self) -> Thickness {
        match self {
            LineReading::NoLine => Thickness::NoLine,
            LineReading::Line { thickness, .. } => *thickness,
        }
    }

    pub fn centroid(&self) -> Option<f64> {
        match self {
            LineReading::NoLine => None,
            LineReading::Line { centroid, .. } => Some(*centroid),
        }
    }
}

/// Weighted centroid over `(channel index, normalized reading)` pairs, 1-based weights.
pub fn locate_line<I>(readings: I, thresholds: &ThicknessThresholds) -> LineReading
where
    I: IntoIterator<Item = (usize, f64)>,
{
    let mut weighted = 0.0;
    let mut sum = 0.0;
    for (index, value) in readings {
        weighted += (index + 1) as f64 * value;
        sum += value;
    }

    match thresholds.classify(sum) {
        Thickness::NoLine => LineReading::NoLine,
        thickness => LineReading::Line {
            centroid: weighted / sum,
            thickness,
        },
    }
}

pub struct SensorArray<A: AdcChannel, E: EmitterPins> {
    channels: Vec<Option<LightSensor<A>>>,
    emitters: E,
    thresholds: ThicknessThresholds,
    enabled: bool,
}

impl<A: AdcChannel, E: EmitterPins> SensorArray<A, E> {
    /// `None` entries are unpopulated channels.
    pub fn new(channels: Vec<Option<A>>, emitters: E, thresholds: ThicknessThresholds) -> Self {
        Self {
            channels: channels
                .into_iter()
                .map(|adc| adc.map(LightSensor::new))
                .collect(),
            emitters,
            thresholds,
            enabled: false,
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn populated(&self) -> usize {
        self.channels.iter().flatten().count()
    }

    /// Manual calibration from per-channel arrays (entries for absent channels are ignored).
    pub fn config_all(&mut self, white: &[i32], black: &[i32]) -> Result<(), CalibrationError> {
        for levels in [white, black] {
            if levels.len() != self.channels.len() {
                return Err(CalibrationError::LengthMismatch {
                    expected: self.channels.len(),
                    got: levels.len(),
                });
            }
        }

        for (channel, sensor) in self.channels.iter().enumerate() {
            if sensor.is_some() && white[channel] == black[channel] {
                return Err(CalibrationError::DegenerateLevels {
                    channel,
                    level: white[channel],
                });
            }
        }

        for (i, sensor) in self.channels.iter_mut().enumerate() {
            if let Some(sensor) = sensor {
                sensor.set_white_level(Some(white[i]));
                sensor.set_black_level(Some(black[i]));
            }
        }
        info!("[Array] configured white={:?} black={:?}", white, black);
        Ok(())
    }

    /// Sample every populated channel as its white level. Absent channels report 0.
    pub fn sample_white(&mut self) -> Vec<i32> {
        self.channels
            .iter_mut()
            .map(|s| s.as_mut().map_or(0, |s| s.set_white_level(None)))
            .collect()
    }

    /// Sample every populated channel as its black level. Absent channels report 0.
    pub fn sample_black(&mut self) -> Vec<i32> {
        self.channels
            .iter_mut()
            .map(|s| s.as_mut().map_or(0, |s| s.set_black_level(None)))
            .collect()
    }

    /// Read every populated channel and locate the line.
    pub fn read_line(&mut self) -> LineReading {
        let readings: Vec<(usize, f64)> = self
            .channels
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|s| (i, s.read())))
            .collect();

        let reading = locate_line(readings, &self.thresholds);
        debug!("[Array] {:?}", reading);
        reading
    }

    pub fn enable(&mut self) {
        self.emitters.set_emitters(true);
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.emitters.set_emitters(false);
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn thresholds(&self) -> ThicknessThresholds {
        self.thresholds
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut LightSensor<A>> {
        self.channels.get_mut(index).and_then(Option::as_mut)
    }
}
