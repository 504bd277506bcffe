//! servo.rs
//! Two-position deployable arm on a hobby servo.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::hal::ServoPwm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmPosition {
    /// Upright, clear of the track.
    Stowed,
    /// Swung down to sweep a target.
    Deployed,
}

/// Timer counts at 300 Hz: 10000 ≈ 90°, 14500 ≈ 180°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmPulseWidths {
    pub stowed: u32,
    pub deployed: u32,
}

impl Default for ArmPulseWidths {
    fn default() -> Self {
        Self {
            stowed: 10_000,
            deployed: 14_500,
        }
    }
}

pub struct Arm<P: ServoPwm> {
    pwm: P,
    widths: ArmPulseWidths,
    position: Option<ArmPosition>,
}

impl<P: ServoPwm> Arm<P> {
    pub fn new(pwm: P, widths: ArmPulseWidths) -> Self {
        Self {
            pwm,
            widths,
            position: None,
        }
    }

    pub fn move_to(&mut self, position: ArmPosition) {
        let width = match position {
            ArmPosition::Stowed => self.widths.stowed,
            ArmPosition::Deployed => self.widths.deployed,
        };
        self.pwm.set_pulse_width(width);
        if self.position != Some(position) {
            debug!("[Arm] {:?} ({})", position, width);
        }
        self.position = Some(position);
    }

    /// Last commanded position, `None` before the first command.
    pub fn position(&self) -> Option<ArmPosition> {
        self.position
    }

    pub fn pwm_mut(&mut self) -> &mut P {
        &mut self.pwm
    }
}
