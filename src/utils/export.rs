//! Run summaries: per-run statistics and a consolidated table across runs.
//!
//! Outputs, under the chosen directory:
//! - `run_summary_seed_X.csv`: Aggregated stats (min/max/avg) of setpoints, efforts, heading error.
//! - `runs.csv`: One appended row per run: seed, finished, time, overruns, last section.
//! - `wheel_commands.csv`: Appended setpoint/effort histories for trending across runs.

use std::{
    collections::VecDeque,
    fs::{create_dir_all, write, OpenOptions},
    io::Write,
    path::Path,
};

use log::{error, info};

use crate::{
    sim::RunOutcome,
    utils::metrics::{calculate_stats, with_metrics, Metrics, SharedMetrics},
};

fn push_stats(csv: &mut String, name: &str, label: &str, data: &VecDeque<f64>) {
    if let Some(stats) = calculate_stats(data) {
        csv.push_str(&format!("{}_min,{:.3},Minimum {}\n", name, stats.min, label));
        csv.push_str(&format!("{}_max,{:.3},Maximum {}\n", name, stats.max, label));
        csv.push_str(&format!("{}_avg,{:.3},Average {}\n", name, stats.mean, label));
        csv.push_str(&format!("{}_samples,{},{} samples\n", name, stats.count, label));
    }
}

/// Summary table for one run.
pub fn summary_csv(m: &Metrics, outcome: &RunOutcome) -> String {
    let mut csv = String::from("metric,value,description\n");

    csv.push_str(&format!("finished,{},Course completed\n", outcome.finished));
    csv.push_str(&format!("sim_time_s,{:.3},Simulated time\n", outcome.sim_time.as_secs_f64()));
    csv.push_str(&format!("bumps,{},Bump switch contacts\n", outcome.bumps));
    csv.push_str(&format!("passes,{},Scheduler passes\n", m.passes));
    csv.push_str(&format!("steps,{},Task steps run\n", m.total_steps));
    csv.push_str(&format!("overruns,{},Late or long task steps\n", m.total_overruns));
    for (task, count) in &m.step_errors {
        csv.push_str(&format!("step_errors_{},{},Failed steps\n", task, count));
    }

    push_stats(&mut csv, "setpoint_right", "right wheel setpoint [rad/s]", &m.setpoint_right);
    push_stats(&mut csv, "setpoint_left", "left wheel setpoint [rad/s]", &m.setpoint_left);
    push_stats(&mut csv, "effort_right", "right wheel effort [%]", &m.effort_right);
    push_stats(&mut csv, "effort_left", "left wheel effort [%]", &m.effort_left);
    push_stats(&mut csv, "heading_error", "heading error [units]", &m.heading_error);

    let sections: Vec<String> = outcome.sections.iter().map(|s| s.code().to_string()).collect();
    csv.push_str(&format!("sections,{},Section codes in order\n", sections.join(" ")));
    csv
}

/// Write the summary and append the consolidated rows for one run.
pub fn export_run(metrics: &SharedMetrics, outcome: &RunOutcome, seed: u64, dir: &Path) {
    if let Err(e) = create_dir_all(dir) {
        error!("Failed to create export directory: {}", e);
        return;
    }

    let (summary, row) = with_metrics(metrics, |m| {
        let row = format!(
            "{},{},{:.3},{},{},{}\n",
            seed,
            outcome.finished,
            outcome.sim_time.as_secs_f64(),
            m.total_overruns,
            outcome.bumps,
            outcome.sections.last().map_or(0, |s| s.code()),
        );
        append_wheel_commands(&dir.join("wheel_commands.csv"), seed, m);
        (summary_csv(m, outcome), row)
    });

    let summary_path = dir.join(format!("run_summary_seed_{}.csv", seed));
    match write(&summary_path, summary) {
        Ok(_) => info!("Run summary exported to: {:?}", summary_path),
        Err(e) => error!("Failed to export run summary: {}", e),
    }

    append_row(
        &dir.join("runs.csv"),
        "seed,finished,sim_time_s,overruns,bumps,last_section\n",
        &row,
    );
}

fn append_row(path: &Path, header: &str, row: &str) {
    let file_exists = path.exists();

    let mut file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to open {:?}: {}", path, e);
            return;
        }
    };

    if !file_exists {
        if let Err(e) = file.write_all(header.as_bytes()) {
            error!("Failed to write CSV header: {}", e);
            return;
        }
    }

    if let Err(e) = file.write_all(row.as_bytes()) {
        error!("Failed to write CSV row: {}", e);
    }
}

/// Appends seed,sample_index,setpoint_right,setpoint_left,effort_right,effort_left rows.
fn append_wheel_commands(path: &Path, seed: u64, m: &Metrics) {
    let file_exists = path.exists();

    let mut file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to open wheel command CSV: {}", e);
            return;
        }
    };

    if !file_exists {
        if let Err(e) = writeln!(file, "seed,sample_index,setpoint_right,setpoint_left,effort_right,effort_left") {
            error!("Failed to write wheel command CSV header: {}", e);
            return;
        }
    }

    let max_len = m
        .setpoint_right
        .len()
        .max(m.setpoint_left.len())
        .max(m.effort_right.len())
        .max(m.effort_left.len());

    // missing samples are filled with 0.0
    for i in 0..max_len {
        let sr = m.setpoint_right.get(i).copied().unwrap_or(0.0);
        let sl = m.setpoint_left.get(i).copied().unwrap_or(0.0);
        let er = m.effort_right.get(i).copied().unwrap_or(0.0);
        let el = m.effort_left.get(i).copied().unwrap_or(0.0);

        if let Err(e) = writeln!(file, "{},{},{:.4},{:.4},{:.3},{:.3}", seed, i, sr, sl, er, el) {
            error!("Failed to write wheel command CSV row: {}", e);
            return;
        }
    }

    info!("Appended {} wheel command samples to {:?}", max_len, path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        shares::Section,
        sim::world::Pose,
        utils::metrics::push_capped,
    };
    use std::time::Duration;

    fn outcome() -> RunOutcome {
        RunOutcome {
            finished: true,
            sim_time: Duration::from_millis(41_250),
            sections: vec![Section::Unset, Section::Start, Section::DiamondAck],
            bumps: 1,
            final_pose: Pose { x: 0.0, y: 0.0, theta: 0.0 },
        }
    }

    #[test]
    fn summary_lists_outcome_and_stats() {
        let mut m = Metrics::default();
        push_capped(&mut m.setpoint_right, 6.0);
        push_capped(&mut m.setpoint_right, 8.0);
        m.record_overrun("Controller");

        let csv = summary_csv(&m, &outcome());
        assert!(csv.starts_with("metric,value,description\n"));
        assert!(csv.contains("finished,true,"));
        assert!(csv.contains("sim_time_s,41.250,"));
        assert!(csv.contains("overruns,1,"));
        assert!(csv.contains("setpoint_right_avg,7.000,"));
        assert!(!csv.contains("effort_left_avg"));
        assert!(csv.contains("sections,0 1 -1,"));
    }
}
