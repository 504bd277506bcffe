//! scheduler.rs
//! Cooperative, priority-ordered round robin over the control tasks.
//!
//! Each task is released once per period and runs one discrete state-machine step.
//! Steps never block. Late releases and steps that outlast their period are
//! overruns: they are logged and counted, never silently dropped.

use std::sync::Arc;

use log::{error, warn};

use crate::{
    error::TaskError,
    hal::Clock,
    shares::Shares,
    utils::metrics::{with_metrics, Event, EventRecorder, SharedMetrics},
};

/// One control loop as seen by the scheduler.
pub trait Task {
    /// Run exactly one state-machine step.
    fn step(&mut self, shares: &Shares) -> Result<(), TaskError>;
}

struct Slot {
    name: String,
    priority: u8,
    period_us: u64,
    next_release_us: u64,
    task: Box<dyn Task>,
}

pub struct Scheduler<C: Clock> {
    slots: Vec<Slot>,
    clock: C,
    metrics: SharedMetrics,
    recorder: Arc<EventRecorder>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, metrics: SharedMetrics, recorder: Arc<EventRecorder>) -> Self {
        Self {
            slots: Vec::new(),
            clock,
            metrics,
            recorder,
        }
    }

    /// Register a task. Higher `priority` runs first within a pass; ties keep insertion order.
    pub fn add(&mut self, name: impl Into<String>, priority: u8, period_us: u64, task: Box<dyn Task>) {
        let now = self.clock.now_us();
        self.slots.push(Slot {
            name: name.into(),
            priority,
            period_us: period_us.max(1),
            next_release_us: now,
            task,
        });
        self.slots.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Run every task whose release time has come. Returns how many steps ran.
    pub fn run_pass(&mut self, shares: &Shares) -> usize {
        let mut ran = 0;

        for slot in self.slots.iter_mut() {
            let released = self.clock.now_us();
            if released < slot.next_release_us {
                continue;
            }

            let late_us = released - slot.next_release_us;
            if late_us > slot.period_us {
                warn!("[Scheduler] {} released {} us late", slot.name, late_us);
                with_metrics(&self.metrics, |m| m.record_overrun(&slot.name));
                self.recorder.record(Event::Overrun {
                    ts_us: released,
                    task: slot.name.clone(),
                    late_us,
                });
            }

            if let Err(e) = slot.task.step(shares) {
                error!("[Scheduler] {} step failed: {}", slot.name, e);
                with_metrics(&self.metrics, |m| m.record_step_error(&slot.name));
                self.recorder.record(Event::StepFailed {
                    ts_us: self.clock.now_us(),
                    task: slot.name.clone(),
                    reason: e.to_string(),
                });
            }
            ran += 1;

            let finished = self.clock.now_us();
            let exec_us = finished.saturating_sub(released);
            if exec_us > slot.period_us {
                warn!("[Scheduler] {} step took {} us (period {} us)", slot.name, exec_us, slot.period_us);
                with_metrics(&self.metrics, |m| m.record_overrun(&slot.name));
                self.recorder.record(Event::Overrun {
                    ts_us: finished,
                    task: slot.name.clone(),
                    late_us: exec_us - slot.period_us,
                });
            }

            slot.next_release_us += slot.period_us;
            if slot.next_release_us <= released {
                // missed whole periods: resynchronise instead of bursting
                slot.next_release_us = released + slot.period_us;
            }
        }

        with_metrics(&self.metrics, |m| {
            m.passes += 1;
            m.total_steps += ran as u64;
        });
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::BusError, hal::ManualClock, utils::metrics::Metrics};
    use std::{cell::RefCell, rc::Rc, sync::Mutex};

    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
        fail: bool,
    }

    impl Task for Probe {
        fn step(&mut self, _shares: &Shares) -> Result<(), TaskError> {
            self.log.borrow_mut().push(self.name);
            if self.fail {
                return Err(BusError::Timeout.into());
            }
            Ok(())
        }
    }

    fn probe(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>, fail: bool) -> Box<dyn Task> {
        Box::new(Probe { name, log: log.clone(), fail })
    }

    fn scheduler(clock: &ManualClock) -> (Scheduler<ManualClock>, SharedMetrics) {
        let metrics: SharedMetrics = Arc::new(Mutex::new(Metrics::default()));
        let sched = Scheduler::new(clock.clone(), metrics.clone(), Arc::new(EventRecorder::new()));
        (sched, metrics)
    }

    #[test]
    fn higher_priority_runs_first() {
        let clock = ManualClock::new();
        let (mut sched, _metrics) = scheduler(&clock);
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.add("Tracker", 1, 20_000, probe("Tracker", &log, false));
        sched.add("DriveR", 3, 5_000, probe("DriveR", &log, false));
        sched.add("Control", 2, 10_000, probe("Control", &log, false));

        assert_eq!(sched.run_pass(&Shares::new()), 3);
        assert_eq!(*log.borrow(), vec!["DriveR", "Control", "Tracker"]);
    }

    #[test]
    fn tasks_run_once_per_period() {
        let clock = ManualClock::new();
        let (mut sched, _metrics) = scheduler(&clock);
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.add("fast", 2, 5_000, probe("fast", &log, false));
        sched.add("slow", 1, 20_000, probe("slow", &log, false));
        let shares = Shares::new();

        for _ in 0..20 {
            sched.run_pass(&shares);
            clock.advance_us(1_000);
        }
        let log = log.borrow();
        assert_eq!(log.iter().filter(|n| **n == "fast").count(), 4);
        assert_eq!(log.iter().filter(|n| **n == "slow").count(), 1);
    }

    #[test]
    fn late_release_is_reported_as_overrun() {
        let clock = ManualClock::new();
        let (mut sched, metrics) = scheduler(&clock);
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.add("Control", 2, 10_000, probe("Control", &log, false));
        let shares = Shares::new();

        sched.run_pass(&shares);
        clock.advance_us(35_000);
        sched.run_pass(&shares);

        let m = metrics.lock().unwrap();
        assert_eq!(m.overruns.get("Control"), Some(&1));
        assert_eq!(m.total_overruns, 1);
    }

    #[test]
    fn failed_step_is_counted_and_scheduling_continues() {
        let clock = ManualClock::new();
        let (mut sched, metrics) = scheduler(&clock);
        let log = Rc::new(RefCell::new(Vec::new()));
        sched.add("Control", 2, 10_000, probe("Control", &log, true));
        sched.add("Tracker", 1, 10_000, probe("Tracker", &log, false));

        assert_eq!(sched.run_pass(&Shares::new()), 2);
        let m = metrics.lock().unwrap();
        assert_eq!(m.step_errors.get("Control"), Some(&1));
        assert_eq!(m.total_steps, 2);
    }
}
