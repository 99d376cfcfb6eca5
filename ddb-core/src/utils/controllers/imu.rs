//! Inertial sensor access for the differential-drive bot.
//!
//! `Mpu6050` talks to the sensor over an exclusively owned I2C bus and converts
//! raw register values into physical units. `SensorReader` wraps any
//! `InertialSensor` so the control loop always gets a sample, falling back to
//! the last good one when the bus misbehaves.

use embedded_hal::{delay::DelayNs, i2c::I2c};
use serde::Deserialize;

/// Default 7-bit address (AD0 tied low).
pub const MPU6050_ADDRESS: u8 = 0x68;

/// Gyroscope sensitivity at the ±250 °/s range, the only range used.
pub const GYRO_SENSITIVITY_250_DPS: f32 = 131.0;
/// Temperature register scale (LSB per °C).
pub const TEMP_SCALE: f32 = 340.0;
/// Temperature offset (°C).
pub const TEMP_OFFSET_C: f32 = 36.53;

const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;
const PWR_DEVICE_RESET: u8 = 0x80;
const WHO_AM_I_MPU6050: u8 = 0x68;

/// A single sensor axis, used to pick the drive input and interlock inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    AccelX,
    AccelY,
    AccelZ,
    GyroX,
    GyroY,
    GyroZ,
}

/// Accelerometer full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelRange {
    #[default]
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    /// LSB per g for this range.
    pub fn sensitivity(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }

    /// `AFS_SEL` field value as written to `ACCEL_CONFIG`.
    fn register_bits(self) -> u8 {
        let code = match self {
            AccelRange::G2 => 0,
            AccelRange::G4 => 1,
            AccelRange::G8 => 2,
            AccelRange::G16 => 3,
        };
        code << 3
    }
}

/// One converted sample: acceleration in g, angular rate in deg/s, temperature in °C.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InertialSample {
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
    pub temperature: f32,
}

impl InertialSample {
    pub const ZERO: Self = Self {
        accel: [0.0; 3],
        gyro: [0.0; 3],
        temperature: 0.0,
    };

    pub fn axis(
        &self,
        axis: Axis,
    ) -> f32 {
        match axis {
            Axis::AccelX => self.accel[0],
            Axis::AccelY => self.accel[1],
            Axis::AccelZ => self.accel[2],
            Axis::GyroX => self.gyro[0],
            Axis::GyroY => self.gyro[1],
            Axis::GyroZ => self.gyro[2],
        }
    }
}

/// Register-level sample as read from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
    pub temperature: i16,
}

impl RawSample {
    /// Decode the 14-byte burst starting at `ACCEL_XOUT_H`.
    pub fn from_registers(buf: &[u8; 14]) -> Self {
        let word = |i: usize| i16::from_be_bytes([buf[i], buf[i + 1]]);
        Self {
            accel: [word(0), word(2), word(4)],
            temperature: word(6),
            gyro: [word(8), word(10), word(12)],
        }
    }

    /// Convert to physical units using the configured accelerometer range.
    pub fn convert(
        &self,
        range: AccelRange,
    ) -> InertialSample {
        let accel_sens = range.sensitivity();
        InertialSample {
            accel: self.accel.map(|v| v as f32 / accel_sens),
            gyro: self.gyro.map(|v| v as f32 / GYRO_SENSITIVITY_250_DPS),
            temperature: self.temperature as f32 / TEMP_SCALE + TEMP_OFFSET_C,
        }
    }
}

/// A source of inertial samples.
pub trait InertialSensor {
    type Error: core::fmt::Debug;

    fn read(&mut self) -> Result<InertialSample, Self::Error>;
}

/// Errors raised by the MPU-6050 driver.
#[derive(Debug)]
pub enum ImuError<E: core::fmt::Debug> {
    Bus(E),
}

/// MPU-6050 six-axis IMU over I2C.
pub struct Mpu6050<I2C> {
    i2c: I2C,
    address: u8,
    range: AccelRange,
}

impl<I2C, E> Mpu6050<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(
        i2c: I2C,
        address: u8,
    ) -> Self {
        Self {
            i2c,
            address,
            range: AccelRange::G2,
        }
    }

    /// Reset the device, wake it, and program the accelerometer range.
    ///
    /// The gyroscope stays at its power-on ±250 °/s range.
    pub fn init(
        &mut self,
        range: AccelRange,
        delay: &mut impl DelayNs,
    ) -> Result<(), ImuError<E>> {
        let id = self.read_register(REG_WHO_AM_I)?;
        if id != WHO_AM_I_MPU6050 {
            tracing::warn!("unexpected WHO_AM_I 0x{:02X}, continuing", id);
        }

        self.write_register(REG_PWR_MGMT_1, PWR_DEVICE_RESET)?;
        delay.delay_ms(100);
        self.write_register(REG_PWR_MGMT_1, 0x00)?;
        self.write_register(REG_ACCEL_CONFIG, range.register_bits())?;
        self.range = range;

        tracing::info!(?range, "MPU-6050 initialized");
        Ok(())
    }

    pub fn range(&self) -> AccelRange {
        self.range
    }

    /// Burst-read accelerometer, temperature and gyroscope registers.
    pub fn read_raw(&mut self) -> Result<RawSample, ImuError<E>> {
        let mut buf = [0u8; 14];
        self.i2c
            .write_read(self.address, &[REG_ACCEL_XOUT_H], &mut buf)
            .map_err(ImuError::Bus)?;
        Ok(RawSample::from_registers(&buf))
    }

    fn read_register(
        &mut self,
        reg: u8,
    ) -> Result<u8, ImuError<E>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(ImuError::Bus)?;
        Ok(buf[0])
    }

    fn write_register(
        &mut self,
        reg: u8,
        value: u8,
    ) -> Result<(), ImuError<E>> {
        self.i2c
            .write(self.address, &[reg, value])
            .map_err(ImuError::Bus)
    }
}

impl<I2C, E> InertialSensor for Mpu6050<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = ImuError<E>;

    fn read(&mut self) -> Result<InertialSample, Self::Error> {
        let range = self.range;
        Ok(self.read_raw()?.convert(range))
    }
}

/// Infallible view over an `InertialSensor`.
///
/// A failed read is logged and answered with the last good sample (all zeros
/// before the first success). Only the most recent good sample is kept.
pub struct SensorReader<S> {
    sensor: S,
    last: InertialSample,
    failures: u32,
}

impl<S: InertialSensor> SensorReader<S> {
    pub fn new(sensor: S) -> Self {
        Self {
            sensor,
            last: InertialSample::ZERO,
            failures: 0,
        }
    }

    pub fn read(&mut self) -> InertialSample {
        match self.sensor.read() {
            Ok(sample) => {
                if self.failures > 0 {
                    tracing::info!(failures = self.failures, "IMU reads recovered");
                }
                self.failures = 0;
                self.last = sample;
            }
            Err(error) => {
                self.failures = self.failures.saturating_add(1);
                tracing::warn!(?error, failures = self.failures, "IMU read failed, reusing last sample");
            }
        }
        self.last
    }

    /// Consecutive failed reads since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted<'a> {
        script: &'a [Result<InertialSample, ()>],
        pos: usize,
    }

    impl InertialSensor for Scripted<'_> {
        type Error = ();

        fn read(&mut self) -> Result<InertialSample, ()> {
            let r = self.script[self.pos];
            self.pos += 1;
            r
        }
    }

    fn sample(ax: f32) -> InertialSample {
        InertialSample {
            accel: [ax, 0.0, 1.0],
            ..InertialSample::ZERO
        }
    }

    #[test]
    fn raw_decoding_is_big_endian_in_register_order() {
        let buf = [
            0x40, 0x00, // ax = 16384
            0xC0, 0x00, // ay = -16384
            0x00, 0x01, // az = 1
            0x00, 0x00, // temp = 0
            0x00, 0x83, // gx = 131
            0xFF, 0x7D, // gy = -131
            0x07, 0xD0, // gz = 2000
        ];
        let raw = RawSample::from_registers(&buf);
        assert_eq!(raw.accel, [16384, -16384, 1]);
        assert_eq!(raw.temperature, 0);
        assert_eq!(raw.gyro, [131, -131, 2000]);
    }

    #[test]
    fn conversion_constants() {
        let raw = RawSample {
            accel: [16384, 8192, -2048],
            gyro: [131, -262, 0],
            temperature: -340,
        };
        let s = raw.convert(AccelRange::G2);
        assert!((s.accel[0] - 1.0).abs() < 1e-6);
        assert!((s.accel[1] - 0.5).abs() < 1e-6);
        assert!((s.accel[2] + 0.125).abs() < 1e-6);
        assert!((s.gyro[0] - 1.0).abs() < 1e-6);
        assert!((s.gyro[1] + 2.0).abs() < 1e-6);
        assert!((s.temperature - 35.53).abs() < 1e-4);

        let s = raw.convert(AccelRange::G16);
        assert!((s.accel[0] - 8.0).abs() < 1e-6);
        assert!((s.accel[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn range_sensitivities() {
        assert_eq!(AccelRange::G2.sensitivity(), 16384.0);
        assert_eq!(AccelRange::G4.sensitivity(), 8192.0);
        assert_eq!(AccelRange::G8.sensitivity(), 4096.0);
        assert_eq!(AccelRange::G16.sensitivity(), 2048.0);
        assert_eq!(AccelRange::G8.register_bits(), 0x10);
    }

    #[test]
    fn axis_selection() {
        let s = InertialSample {
            accel: [1.0, 2.0, 3.0],
            gyro: [4.0, 5.0, 6.0],
            temperature: 20.0,
        };
        assert_eq!(s.axis(Axis::AccelY), 2.0);
        assert_eq!(s.axis(Axis::GyroY), 5.0);
        assert_eq!(s.axis(Axis::GyroZ), 6.0);
    }

    #[test]
    fn reader_falls_back_to_last_good_sample() {
        let script = [Err(()), Ok(sample(0.2)), Err(()), Err(()), Ok(sample(0.4))];
        let mut reader = SensorReader::new(Scripted {
            script: &script,
            pos: 0,
        });

        assert_eq!(reader.read(), InertialSample::ZERO);
        assert_eq!(reader.consecutive_failures(), 1);
        assert_eq!(reader.read(), sample(0.2));
        assert_eq!(reader.consecutive_failures(), 0);
        assert_eq!(reader.read(), sample(0.2));
        assert_eq!(reader.read(), sample(0.2));
        assert_eq!(reader.consecutive_failures(), 2);
        assert_eq!(reader.read(), sample(0.4));
        assert_eq!(reader.consecutive_failures(), 0);
    }
}
