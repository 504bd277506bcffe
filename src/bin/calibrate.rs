//! Offline calibration tool.
//!
//! Samples white and black reference levels for every populated array channel and
//! reads the IMU coefficient block, outside the scheduled path. Runs against the
//! simulated robot: the prompts move it over white floor, then over a dark patch.
//!
//! Usage: `calibrate [levels.json] [imu_coefficients.bin]`

use std::{
    env, fs,
    io::{stdin, stdout, Write},
    process,
    time::Duration,
};

use log::{error, info};

use trackbot::{
    config::{CalibrationConfig, RobotConfig},
    drivers::{
        imu::{save_coefficients, Imu, OperatingMode},
        sensor_array::SensorArray,
    },
    sim::{
        devices::{SimAdc, SimEmitters, SimImuBus},
        world::{Pose, World},
        SimConfig,
    },
};

/// Array fully over white floor, south of the outbound leg.
const WHITE_POSE: Pose = Pose { x: 0.0, y: -300.0, theta: 0.0 };
/// Array fully over the diamond patch.
const BLACK_POSE: Pose = Pose { x: 665.0, y: 0.0, theta: 0.0 };

fn wait_for_enter(message: &str) {
    print!("{} and press Enter: ", message);
    let _ = stdout().flush();
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
}

fn main() {
    env_logger::init();
    let mut args = env::args().skip(1);
    let levels_path = args.next();
    let coefficients_path = args.next();

    let robot = RobotConfig::default();
    let world = World::new(SimConfig::default(), &robot).shared();

    let template = &robot.calibration;
    let channels = (0..template.channel_count())
        .map(|channel| {
            template
                .is_populated(channel)
                .then(|| SimAdc { world: world.clone(), channel })
        })
        .collect();
    let mut array = SensorArray::new(channels, SimEmitters { world: world.clone() }, robot.line.thresholds);
    array.enable();

    world.lock().place(WHITE_POSE);
    wait_for_enter("Place the array over a white surface");
    let white = array.sample_white();
    info!("[Calibrate] white {:?}", white);

    world.lock().place(BLACK_POSE);
    wait_for_enter("Place the array over a black surface");
    let black = array.sample_black();
    info!("[Calibrate] black {:?}", black);
    array.disable();

    let levels = CalibrationConfig {
        white,
        black,
        absent: template.absent.clone(),
    };
    if let Err(e) = array.config_all(&levels.white, &levels.black) {
        error!("[Calibrate] unusable levels: {}", e);
        process::exit(1);
    }

    let json = match serde_json::to_string_pretty(&levels) {
        Ok(json) => json,
        Err(e) => {
            error!("[Calibrate] cannot encode levels: {}", e);
            process::exit(1);
        }
    };
    println!("{}", json);
    if let Some(path) = levels_path {
        match fs::write(&path, &json) {
            Ok(()) => info!("[Calibrate] levels written to {}", path),
            Err(e) => {
                error!("[Calibrate] cannot write {}: {}", path, e);
                process::exit(1);
            }
        }
    }

    let Some(path) = coefficients_path else {
        return;
    };
    let mut imu = Imu::new(SimImuBus { world: world.clone() });
    let settle = Duration::from_millis(robot.imu.settle_ms);
    let result = imu
        .change_mode(OperatingMode::Config)
        .and_then(|()| {
            spin_sleep::sleep(settle);
            imu.read_coefficients()
        });
    match result {
        Ok(coefficients) => match save_coefficients(&path, &coefficients) {
            Ok(()) => info!("[Calibrate] IMU coefficients written to {}", path),
            Err(e) => {
                error!("[Calibrate] cannot write {}: {}", path, e);
                process::exit(1);
            }
        },
        Err(e) => {
            error!("[Calibrate] IMU: {}", e);
            process::exit(1);
        }
    }
}
