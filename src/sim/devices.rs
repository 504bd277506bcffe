//! Hardware trait implementations backed by the shared [`World`](super::world::World).

use log::trace;

use crate::{
    control::wheel_loop::Side,
    drivers::{battery::BatteryConfig, imu::DEVICE_ADDRESS},
    error::BusError,
    hal::{AdcChannel, CounterSource, EmitterPins, I2cBus, MotorPins, ServoPwm},
    sim::world::SharedWorld,
};

const REG_EULER: u8 = 0x1A;
const REG_GYRO: u8 = 0x14;
const REG_CALIB_STAT: u8 = 0x35;
const REG_OPR_MODE: u8 = 0x3D;
const REG_CALIB_COEFFS: u8 = 0x55;

#[derive(Clone)]
pub struct SimCounter {
    pub world: SharedWorld,
    pub side: Side,
}

impl CounterSource for SimCounter {
    fn count(&self) -> u32 {
        self.world.lock().wheel(self.side).counter()
    }
}

#[derive(Clone)]
pub struct SimMotorPins {
    pub world: SharedWorld,
    pub side: Side,
}

impl MotorPins for SimMotorPins {
    fn set_direction(&mut self, reverse: bool) {
        self.world.lock().wheel_mut(self.side).reverse = reverse;
    }

    fn set_duty_percent(&mut self, duty: f64) {
        self.world.lock().wheel_mut(self.side).duty = duty;
    }

    fn set_sleep(&mut self, asleep: bool) {
        self.world.lock().wheel_mut(self.side).asleep = asleep;
    }
}

/// One reflectance channel.
#[derive(Clone)]
pub struct SimAdc {
    pub world: SharedWorld,
    pub channel: usize,
}

impl AdcChannel for SimAdc {
    fn read_raw(&mut self) -> i32 {
        self.world.lock().read_channel(self.channel)
    }
}

#[derive(Clone)]
pub struct SimEmitters {
    pub world: SharedWorld,
}

impl EmitterPins for SimEmitters {
    fn set_emitters(&mut self, on: bool) {
        self.world.lock().emitters = on;
    }
}

#[derive(Clone)]
pub struct SimServo {
    pub world: SharedWorld,
}

impl ServoPwm for SimServo {
    fn set_pulse_width(&mut self, width: u32) {
        self.world.lock().servo_pulse = width;
    }
}

/// Battery divider ADC: reports the raw count that reads back as the simulated voltage.
#[derive(Clone)]
pub struct SimBatteryAdc {
    pub world: SharedWorld,
    pub config: BatteryConfig,
}

impl AdcChannel for SimBatteryAdc {
    fn read_raw(&mut self) -> i32 {
        let volts = self.world.lock().config.battery_volts;
        (volts / self.config.volts_from_adc(1)).round() as i32
    }
}

/// Register model of the IMU on the I2C bus.
#[derive(Clone)]
pub struct SimImuBus {
    pub world: SharedWorld,
}

impl I2cBus for SimImuBus {
    fn mem_write(&mut self, device: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        if device != DEVICE_ADDRESS {
            return Err(BusError::Nack { device });
        }
        let mut world = self.world.lock();
        match register {
            REG_OPR_MODE => {
                if let Some(&mode) = data.first() {
                    trace!("[SimImu] mode 0x{:02X}", mode);
                    world.imu.mode = mode;
                }
            }
            REG_CALIB_COEFFS => {
                let n = data.len().min(world.imu.coefficients.len());
                world.imu.coefficients[..n].copy_from_slice(&data[..n]);
            }
            _ => {}
        }
        Ok(())
    }

    fn mem_read(&mut self, device: u8, register: u8, buf: &mut [u8]) -> Result<(), BusError> {
        if device != DEVICE_ADDRESS {
            return Err(BusError::Nack { device });
        }
        let world = self.world.lock();
        buf.fill(0);
        match register {
            REG_EULER => copy_prefix(buf, &world.yaw_units().to_le_bytes()),
            REG_GYRO => copy_prefix(buf, &world.yaw_rate_units().to_le_bytes()),
            REG_CALIB_STAT => copy_prefix(buf, &[0xFF]),
            REG_OPR_MODE => copy_prefix(buf, &[world.imu.mode]),
            REG_CALIB_COEFFS => copy_prefix(buf, &world.imu.coefficients),
            _ => {}
        }
        Ok(())
    }
}

fn copy_prefix(buf: &mut [u8], src: &[u8]) {
    let n = buf.len().min(src.len());
    buf[..n].copy_from_slice(&src[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RobotConfig,
        drivers::{
            battery::AdcBattery,
            imu::{Imu, OperatingMode},
        },
        hal::BatteryMonitor,
        sim::{world::World, SimConfig},
    };

    fn world() -> SharedWorld {
        World::new(SimConfig::default(), &RobotConfig::default()).shared()
    }

    #[test]
    fn imu_driver_talks_to_the_register_model() {
        let world = world();
        let mut imu = Imu::new(SimImuBus { world: world.clone() });
        imu.change_mode(OperatingMode::Config).unwrap();
        imu.write_coefficients(&[7; 22]).unwrap();
        assert_eq!(imu.read_coefficients().unwrap(), [7; 22]);
        imu.change_mode(OperatingMode::Imu).unwrap();
        assert_eq!(world.lock().imu.mode, OperatingMode::Imu.register_value());
        assert!(imu.is_fully_calibrated().unwrap());
        assert_eq!(i32::from(imu.read_euler().unwrap().yaw), SimConfig::default().yaw_offset);
    }

    #[test]
    fn wrong_address_is_not_acknowledged() {
        let mut bus = SimImuBus { world: world() };
        let mut buf = [0; 6];
        assert_eq!(bus.mem_read(0x29, REG_EULER, &mut buf), Err(BusError::Nack { device: 0x29 }));
    }

    #[test]
    fn battery_adc_reads_back_the_simulated_voltage() {
        let world = world();
        let config = BatteryConfig::default();
        let mut battery = AdcBattery::new(SimBatteryAdc { world: world.clone(), config }, config);
        let volts = battery.volts();
        assert!((volts - world.lock().config.battery_volts).abs() < 0.01);
        assert!(battery.startup_check().is_ok());
    }

    #[test]
    fn motor_pins_drive_the_wheel_model() {
        let world = world();
        let mut pins = SimMotorPins { world: world.clone(), side: Side::Left };
        pins.set_sleep(false);
        pins.set_direction(true);
        pins.set_duty_percent(40.0);
        let w = world.lock();
        assert!(!w.left.asleep && w.left.reverse);
        assert_eq!(w.left.duty, 40.0);
        assert!(w.right.asleep);
    }
}
