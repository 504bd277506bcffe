//! shares.rs
//! Named shared cells between the control tasks.
//!
//! Every cell has one conceptual writer per protocol step and is polled once per
//! scheduler pass. Nothing here blocks waiting for a value to change.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Cloneable handle to one shared cell.
#[derive(Clone)]
pub struct Share<T: Copy> {
    name: &'static str,
    cell: Arc<Mutex<T>>,
}

impl<T: Copy> Share<T> {
    pub fn new(name: &'static str, initial: T) -> Self {
        Self {
            name,
            cell: Arc::new(Mutex::new(initial)),
        }
    }

    #[inline]
    pub fn get(&self) -> T {
        *self.cell.lock()
    }

    #[inline]
    pub fn put(&self, value: T) {
        *self.cell.lock() = value;
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Share<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.name, self.get())
    }
}

/// Landmark handshake between Tracker and Controller.
///
/// Positive codes are proposals written by the Tracker, negative codes are
/// acknowledgments written by the Controller once its sensors confirm the landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Section {
    #[default]
    Unset,
    /// Course started, look for the thick diamond line.
    Start,
    /// Diamond crossed, follow the line again.
    LineResume,
    /// Look for the thick line that starts the heading section.
    HeadingSearch,
    /// First programmed quarter turn.
    HeadingTurn,
    /// First turn after the wall.
    WallTurnOne,
    /// Second turn after the wall.
    WallTurnTwo,
    /// Course complete.
    Finish,
    /// Controller saw the diamond.
    DiamondAck,
    /// Controller entered the heading phase.
    HeadingAck,
    /// Controller handled the wall bump.
    WallAck,
}

impl Section {
    pub const fn code(self) -> i8 {
        match self {
            Section::Unset => 0,
            Section::Start => 1,
            Section::LineResume => 2,
            Section::HeadingSearch => 3,
            Section::HeadingTurn => 4,
            Section::WallTurnOne => 6,
            Section::WallTurnTwo => 7,
            Section::Finish => 8,
            Section::DiamondAck => -1,
            Section::HeadingAck => -2,
            Section::WallAck => -3,
        }
    }

    pub const fn is_acknowledgment(self) -> bool {
        self.code() < 0
    }
}

impl TryFrom<i8> for Section {
    type Error = i8;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Section::Unset,
            1 => Section::Start,
            2 => Section::LineResume,
            3 => Section::HeadingSearch,
            4 => Section::HeadingTurn,
            6 => Section::WallTurnOne,
            7 => Section::WallTurnTwo,
            8 => Section::Finish,
            -1 => Section::DiamondAck,
            -2 => Section::HeadingAck,
            -3 => Section::WallAck,
            other => return Err(other),
        })
    }
}

/// Per-wheel cells.
#[derive(Debug, Clone)]
pub struct WheelShares {
    /// Velocity setpoint [rad/s], written by the Controller.
    pub velocity: Share<f64>,
    /// Accumulated ticks, written by the wheel loop (wrapping).
    pub position: Share<u32>,
    /// One-shot odometry zero request, set by the Tracker, cleared by the wheel loop.
    pub reset: Share<bool>,
}

impl WheelShares {
    fn new(velocity: &'static str, position: &'static str, reset: &'static str) -> Self {
        Self {
            velocity: Share::new(velocity, 0.0),
            position: Share::new(position, 0),
            reset: Share::new(reset, false),
        }
    }
}

/// The full cross-task table.
#[derive(Debug, Clone)]
pub struct Shares {
    pub enable: Share<bool>,
    pub section: Share<Section>,
    pub right: WheelShares,
    pub left: WheelShares,
}

impl Shares {
    pub fn new() -> Self {
        Self {
            enable: Share::new("enable", false),
            section: Share::new("section", Section::Unset),
            right: WheelShares::new("velocityR", "posR", "resetR"),
            left: WheelShares::new("velocityL", "posL", "resetL"),
        }
    }

    /// Start button: toggles the enable flag.
    pub fn toggle_enable(&self) {
        let current = self.enable.get();
        self.enable.put(!current);
    }

    /// Emergency stop or bump contact.
    pub fn emergency_stop(&self) {
        self.enable.put(false);
    }

    pub fn set_wheel_velocities(&self, right: f64, left: f64) {
        self.right.velocity.put(right);
        self.left.velocity.put(left);
    }

    pub fn request_encoder_reset(&self) {
        self.right.reset.put(true);
        self.left.reset.put(true);
    }
}

impl Default for Shares {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_codes_round_trip_through_wire_value() {
        for section in [
            Section::Unset,
            Section::Start,
            Section::LineResume,
            Section::HeadingSearch,
            Section::HeadingTurn,
            Section::WallTurnOne,
            Section::WallTurnTwo,
            Section::Finish,
            Section::DiamondAck,
            Section::HeadingAck,
            Section::WallAck,
        ] {
            assert_eq!(Section::try_from(section.code()), Ok(section));
        }
        assert_eq!(Section::try_from(5), Err(5));
    }

    #[test]
    fn only_negative_codes_are_acknowledgments() {
        assert!(Section::DiamondAck.is_acknowledgment());
        assert!(Section::WallAck.is_acknowledgment());
        assert!(!Section::Start.is_acknowledgment());
        assert!(!Section::Unset.is_acknowledgment());
    }

    #[test]
    fn cloned_share_sees_writes() {
        let shares = Shares::new();
        let view = shares.clone();
        shares.toggle_enable();
        assert!(view.enable.get());
        view.emergency_stop();
        assert!(!shares.enable.get());
        assert_eq!(shares.enable.name(), "enable");
    }
}
