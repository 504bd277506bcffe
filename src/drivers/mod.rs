// Drivers: one struct per physical device, generic over the hal seam it talks through.
pub mod battery;
pub mod encoder;
pub mod imu;
pub mod light_sensor;
pub mod motor;
pub mod sensor_array;
pub mod servo;
