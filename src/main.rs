//! # Course Simulation Entry Point
//! Runs the full control stack (two wheel loops, Controller, Tracker) against the simulated
//! robot and course, then exports the trace and a run summary.
//!
//! Usage: `trackbot [config.json] [output_dir]`. Without a config file the tuned defaults
//! are used; the output directory defaults to `data/`.
//!
//! ## Modes
//! - **Single Run:** one course with a chosen noise seed.
//! - **Sweep:** the same course over a list of seeds, appending one row per run to `runs.csv`.
//!
//! ## Outputs
//! - `events_seed_X.csv`: Transitions, section handshakes, wheel commands, overruns (µs timestamps).
//! - `run_summary_seed_X.csv`, `runs.csv`, `wheel_commands.csv`: see `utils::export`.

use std::{
    env,
    fs::create_dir_all,
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    process,
    sync::{Arc, Mutex},
};

use log::{error, info, warn};

use trackbot::{
    config::RobotConfig,
    error::SetupError,
    sim::{RunOutcome, SimConfig, Simulation},
    utils::{
        export::export_run,
        metrics::{with_metrics, write_events_csv, EventRecorder, Metrics, SharedMetrics},
    },
};

const SEED_SWEEP: &[u64] = &[1, 2, 3, 5, 7, 11, 13];
const DEFAULT_OUTPUT_DIR: &str = "data";
/// Enough for a full course at the default task rates; the recorder drops beyond this.
const TRACE_CAPACITY: usize = 1 << 18;

fn main() {
    env_logger::init();
    info!("=== TRACKBOT SIMULATION START ===");

    let mut args = env::args().skip(1);
    let robot = match args.next() {
        Some(path) => match RobotConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("[Main] {}: {}", path, e);
                process::exit(1);
            }
        },
        None => {
            info!("[Main] no config file given, using tuned defaults");
            RobotConfig::default()
        }
    };
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()));

    loop {
        let Some(choice) = prompt_menu() else {
            info!("=== TRACKBOT SIMULATION FINISHED ===");
            return;
        };
        match choice.as_str() {
            "1" | "" => {
                let seed = prompt_seed();
                if let Err(e) = run_once(&robot, seed, &out_dir) {
                    error!("[Main] setup failed: {}", e);
                    process::exit(1);
                }
            }
            "2" => {
                println!("Running seed sweep over {:?}", SEED_SWEEP);
                run_sweep(&robot, SEED_SWEEP, &out_dir);
            }
            "3" => {
                println!("Exiting. Goodbye!");
                info!("=== TRACKBOT SIMULATION FINISHED ===");
                return;
            }
            other => {
                println!("Unrecognized option '{}', please try again.", other);
            }
        }
    }
}

/// `None` once stdin is closed.
fn prompt_menu() -> Option<String> {
    println!("\n┌──────────────────────────────────────┐");
    println!("│     SELECT SIMULATION MODE           │");
    println!("├──────────────────────────────────────┤");
    println!("│  1) Single run                       │");
    println!("│  2) Seed sweep                       │");
    println!("│  3) Exit                             │");
    println!("└──────────────────────────────────────┘");
    print!("Select [1/2/3] (default: 1): ");
    let _ = stdout().flush();

    let mut input = String::new();
    match stdin().read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

fn prompt_seed() -> u64 {
    let default_seed = SimConfig::default().seed;
    print!("Enter noise seed [default: {}]: ", default_seed);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().parse::<u64>().unwrap_or(default_seed)
}

fn run_sweep(robot: &RobotConfig, seeds: &[u64], out_dir: &Path) {
    let mut finished = 0;
    for &seed in seeds {
        info!("[SWEEP] Running seed {}", seed);
        match run_once(robot, seed, out_dir) {
            Ok(outcome) if outcome.finished => finished += 1,
            Ok(_) => {}
            Err(e) => {
                error!("[SWEEP] seed {} failed to start: {}", seed, e);
                return;
            }
        }
    }
    info!("[SWEEP] {}/{} runs finished the course", finished, seeds.len());
    println!("Sweep done: {}/{} runs finished", finished, seeds.len());
}

fn run_once(robot: &RobotConfig, seed: u64, out_dir: &Path) -> Result<RunOutcome, SetupError> {
    info!("[Experiment] Starting: seed={}", seed);

    let metrics: SharedMetrics = Arc::new(Mutex::new(Metrics::default()));
    let recorder = Arc::new(EventRecorder::with_capacity(TRACE_CAPACITY));
    let config = SimConfig { seed, ..SimConfig::default() };

    let mut sim = Simulation::new(robot, config, metrics.clone(), recorder.clone())?;
    let outcome = sim.run();

    let events = recorder.drain();
    with_metrics(&metrics, |m| m.absorb(&events));

    create_dir_all(out_dir)?;
    let trace_path = out_dir.join(format!("events_seed_{}.csv", seed));
    match write_events_csv(&trace_path, &events) {
        Ok(rows) => info!("[Main] {} events written to {:?}", rows, trace_path),
        Err(e) => warn!("[Main] could not write {:?}: {}", trace_path, e),
    }
    export_run(&metrics, &outcome, seed, out_dir);

    let codes: Vec<String> = outcome.sections.iter().map(|s| s.code().to_string()).collect();
    println!(
        "seed {}: {} after {:.2} s, sections [{}], bumps {}, final pose ({:.0}, {:.0})",
        seed,
        if outcome.finished { "finished" } else { "did not finish" },
        outcome.sim_time.as_secs_f64(),
        codes.join(", "),
        outcome.bumps,
        outcome.final_pose.x,
        outcome.final_pose.y,
    );
    Ok(outcome)
}
