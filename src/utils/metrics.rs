//! Metrics collection and event recording for the control tasks.
//!
//! Two independent paths:
//! - **EventRecorder:** Lock-free queue (16K capacity) → CSV export (microsecond precision).
//! - **Metrics:** Shared mutex buffer of recent values and per-task overrun counters.
//!
//! Event tracing captures: FSM transitions → section handshakes → wheel commands → overruns.

use std::{
    collections::{BTreeMap, VecDeque},
    fs::File,
    io::{self, BufWriter},
    path::Path,
    sync::{Arc, Mutex},
};

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use serde::Serialize;

/// Traced occurrences. Each variant carries a timestamp in microseconds of the task clock.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A state machine changed state.
    Transition {
        ts_us: u64,
        task: &'static str,
        from: &'static str,
        to: &'static str,
    },
    /// A section code was written to the shared cell.
    SectionWritten {
        ts_us: u64,
        writer: &'static str,
        code: i8,
    },
    /// Controller published wheel setpoints [rad/s].
    WheelSetpoints { ts_us: u64, right: f64, left: f64 },
    /// A wheel loop commanded an effort [%].
    WheelEffort {
        ts_us: u64,
        wheel: &'static str,
        effort: f64,
        velocity: f64,
    },
    /// Heading-phase error after circular correction [IMU units].
    HeadingError { ts_us: u64, target: i32, error: i32 },
    /// Tracker odometry sample used for band checks.
    Distance { ts_us: u64, state: &'static str, average: f64 },
    /// Scheduler saw a task released late or running past its period.
    Overrun { ts_us: u64, task: String, late_us: u64 },
    /// A scheduled step returned an error.
    StepFailed { ts_us: u64, task: String, reason: String },
}

#[derive(Debug, Serialize)]
struct EventRow<'a> {
    ts_us: u64,
    component: &'a str,
    event: &'static str,
    field1: String,
    field2: String,
}

impl Event {
    pub fn ts_us(&self) -> u64 {
        match self {
            Event::Transition { ts_us, .. }
            | Event::SectionWritten { ts_us, .. }
            | Event::WheelSetpoints { ts_us, .. }
            | Event::WheelEffort { ts_us, .. }
            | Event::HeadingError { ts_us, .. }
            | Event::Distance { ts_us, .. }
            | Event::Overrun { ts_us, .. }
            | Event::StepFailed { ts_us, .. } => *ts_us,
        }
    }

    fn to_row(&self) -> EventRow<'_> {
        match self {
            Event::Transition { ts_us, task, from, to } => EventRow {
                ts_us: *ts_us,
                component: task,
                event: "Transition",
                field1: from.to_string(),
                field2: to.to_string(),
            },
            Event::SectionWritten { ts_us, writer, code } => EventRow {
                ts_us: *ts_us,
                component: writer,
                event: "SectionWritten",
                field1: code.to_string(),
                field2: String::new(),
            },
            Event::WheelSetpoints { ts_us, right, left } => EventRow {
                ts_us: *ts_us,
                component: "Controller",
                event: "WheelSetpoints",
                field1: format!("{:.4}", right),
                field2: format!("{:.4}", left),
            },
            Event::WheelEffort { ts_us, wheel, effort, velocity } => EventRow {
                ts_us: *ts_us,
                component: wheel,
                event: "WheelEffort",
                field1: format!("{:.3}", effort),
                field2: format!("{:.3}", velocity),
            },
            Event::HeadingError { ts_us, target, error } => EventRow {
                ts_us: *ts_us,
                component: "Controller",
                event: "HeadingError",
                field1: target.to_string(),
                field2: error.to_string(),
            },
            Event::Distance { ts_us, state, average } => EventRow {
                ts_us: *ts_us,
                component: "Tracker",
                event: "Distance",
                field1: state.to_string(),
                field2: format!("{:.1}", average),
            },
            Event::Overrun { ts_us, task, late_us } => EventRow {
                ts_us: *ts_us,
                component: task,
                event: "Overrun",
                field1: late_us.to_string(),
                field2: String::new(),
            },
            Event::StepFailed { ts_us, task, reason } => EventRow {
                ts_us: *ts_us,
                component: task,
                event: "StepFailed",
                field1: reason.clone(),
                field2: String::new(),
            },
        }
    }
}

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Non-blocking event recorder.
///
/// `record()` appends to a lock-free queue and returns immediately; a full queue drops
/// the event so a control step never blocks on tracing.
pub struct EventRecorder {
    queue: Arc<ArrayQueue<Event>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
        }
    }

    #[inline]
    pub fn record(&self, event: Event) {
        let _ = self.queue.push(event);
    }

    /// Take every queued event, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            events.push(event);
        }
        events
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain queued events to `path` as CSV. Returns the number of rows written.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> io::Result<usize> {
        write_events_csv(path, &self.drain())
    }
}

/// Write `events` to `path` as CSV, one row each.
pub fn write_events_csv(path: impl AsRef<Path>, events: &[Event]) -> io::Result<usize> {
    let file = File::create(path)?;
    let mut writer = Writer::from_writer(BufWriter::new(file));
    for event in events {
        writer.serialize(event.to_row())?;
    }
    writer.flush()?;
    Ok(events.len())
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventRecorder {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

/// Recent control values plus scheduler health.
#[derive(Default, Clone, Debug)]
pub struct Metrics {
    /// Controller wheel setpoints (last 1000)
    pub setpoint_right: VecDeque<f64>,
    pub setpoint_left: VecDeque<f64>,

    /// Wheel efforts (last 1000)
    pub effort_right: VecDeque<f64>,
    pub effort_left: VecDeque<f64>,

    /// Heading error in IMU units (last 1000)
    pub heading_error: VecDeque<f64>,

    /// Overruns per task name
    pub overruns: BTreeMap<String, u64>,
    /// Failed steps per task name
    pub step_errors: BTreeMap<String, u64>,

    pub total_overruns: u64,
    pub total_steps: u64,
    pub passes: u64,
}

impl Metrics {
    pub fn record_overrun(&mut self, task: &str) {
        *self.overruns.entry(task.to_string()).or_insert(0) += 1;
        self.total_overruns += 1;
    }

    pub fn record_step_error(&mut self, task: &str) {
        *self.step_errors.entry(task.to_string()).or_insert(0) += 1;
    }

    /// Fold traced control values into the capped histories.
    pub fn absorb(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::WheelSetpoints { right, left, .. } => {
                    push_capped(&mut self.setpoint_right, *right);
                    push_capped(&mut self.setpoint_left, *left);
                }
                Event::WheelEffort { wheel, effort, .. } => match *wheel {
                    "DriveR" => push_capped(&mut self.effort_right, *effort),
                    "DriveL" => push_capped(&mut self.effort_left, *effort),
                    _ => {}
                },
                Event::HeadingError { error, .. } => push_capped(&mut self.heading_error, *error as f64),
                _ => {}
            }
        }
    }
}

pub type SharedMetrics = Arc<Mutex<Metrics>>;

pub const MAX_POINTS: usize = 1_000;

/// Appends value to metrics buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Lock shared metrics, recovering from a poisoned mutex.
pub fn with_metrics<R>(metrics: &SharedMetrics, f: impl FnOnce(&mut Metrics) -> R) -> R {
    let mut m = match metrics.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut m)
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean for float buffer.
pub fn calculate_stats(data: &VecDeque<f64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}
