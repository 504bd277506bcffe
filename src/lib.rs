//! Control core of a two-wheeled line-following robot.
//!
//! Hardware is reached only through the traits in [`hal`]; [`sim`] provides a simulated
//! robot and course so the full task set can run on a desktop.

pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod scheduler;
pub mod shares;
pub mod sim;
pub mod utils;
