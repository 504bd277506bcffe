// Control tasks: the PID building block, the per-wheel velocity loops, the line/heading
// Controller and the landmark Tracker. Each task implements `scheduler::Task`.
pub mod controller;
pub mod pid;
pub mod tracker;
pub mod wheel_loop;
